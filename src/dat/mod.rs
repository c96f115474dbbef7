//! Decoder for the protobuf `.dat` rule lists.
//!
//! Two schemas are supported, selected by the caller:
//!
//! - `GeoSiteList`: country/category codes mapped to domain rules
//! - `GeoIPList`: country codes mapped to CIDR ranges
//!
//! Decoding is all-or-nothing: a truncated or otherwise malformed buffer
//! yields a single [`Error::Decode`](crate::Error::Decode) and no entries.

mod model;
pub mod proto;

use std::fs;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use prost::Message;

use crate::error::{Error, Result};

pub use model::{AttributeValue, DomainEntry, DomainRule, IpEntry, MatchKind, RawCidr};

/// Leading bytes of a gzip stream.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Decode a `geosite.dat` buffer.
pub fn decode_geosite(data: &[u8]) -> Result<Vec<DomainEntry>> {
    let list = proto::GeoSiteList::decode(data)?;
    Ok(list.entry.into_iter().map(DomainEntry::from).collect())
}

/// Decode a `geoip.dat` buffer.
pub fn decode_geoip(data: &[u8]) -> Result<Vec<IpEntry>> {
    let list = proto::GeoIpList::decode(data)?;
    Ok(list.entry.into_iter().map(IpEntry::from).collect())
}

/// Read a source file, inflating it when it is gzip-compressed.
pub fn read_source(path: &Path) -> Result<Vec<u8>> {
    let bytes = fs::read(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;

    if !bytes.starts_with(&GZIP_MAGIC) {
        return Ok(bytes);
    }

    let mut decoder = GzDecoder::new(&bytes[..]);
    let mut inflated = Vec::new();
    decoder
        .read_to_end(&mut inflated)
        .map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;

    log::debug!(
        "Inflated {:?}: {} -> {} bytes",
        path,
        bytes.len(),
        inflated.len()
    );
    Ok(inflated)
}
