//! Country lookups against a generated database.

use std::net::IpAddr;
use std::path::Path;

use maxminddb::{MaxMindDBError, Reader};
use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Deserialize)]
struct Country {
    iso_code: Option<String>,
}

#[derive(Deserialize)]
struct CountryRecord {
    country: Option<Country>,
}

/// Read-only view over a country database.
pub struct CountryLookup {
    reader: Reader<Vec<u8>>,
}

impl CountryLookup {
    /// Open a database file.
    pub fn open(path: &Path) -> Result<Self> {
        let reader = Reader::open_readfile(path)
            .map_err(|e| Error::GeoIp(format!("failed to open {}: {}", path.display(), e)))?;
        Ok(Self { reader })
    }

    /// Load a database from bytes.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let reader = Reader::from_source(data)
            .map_err(|e| Error::GeoIp(format!("failed to load MMDB: {}", e)))?;
        Ok(Self { reader })
    }

    /// The `database_type` recorded in the metadata.
    pub fn database_type(&self) -> &str {
        &self.reader.metadata.database_type
    }

    /// Number of search tree nodes recorded in the metadata.
    pub fn node_count(&self) -> u32 {
        self.reader.metadata.node_count
    }

    /// Look up the ISO country code for an address.
    ///
    /// Returns `Ok(None)` when the address has no record.
    pub fn country(&self, ip: IpAddr) -> Result<Option<String>> {
        match self.reader.lookup::<CountryRecord>(ip) {
            Ok(record) => Ok(record.country.and_then(|c| c.iso_code)),
            Err(MaxMindDBError::AddressNotFoundError(_)) => Ok(None),
            Err(e) => Err(Error::GeoIp(format!("lookup of {} failed: {}", ip, e))),
        }
    }
}

/// Look up the ISO country code for an address in a database file.
pub fn lookup_country(path: &Path, ip: IpAddr) -> Result<Option<String>> {
    CountryLookup::open(path)?.country(ip)
}
