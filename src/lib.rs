//! ForgeRules - convert V2Ray-style rule lists to portable formats.
//!
//! This crate decodes the two protobuf rule lists used by traffic-routing
//! tools and re-encodes them:
//!
//! - **geosite.dat** → an indented JSON document of domain rules
//! - **geoip.dat** → a MaxMind DB (MMDB) country database
//!
//! # Features
//!
//! - **Typed decoding**: match kinds with an `unknown` fallback, one-of
//!   attribute values resolved to booleans or integers
//! - **CIDR normalization**: IPv4-mapped IPv6 addresses are stored as IPv4
//! - **Resilient conversion**: malformed or reserved ranges are skipped and
//!   counted instead of failing the whole file
//! - **Pluggable writer**: the IP conversion talks to a [`mmdb::LookupWriter`]
//! - **Batch mode**: many independent jobs from one YAML file
//!
//! # Quick Start
//!
//! ```ignore
//! use forgerules::converter::{convert_geoip_file, convert_geosite_file, ConvertOptions};
//! use std::path::Path;
//!
//! convert_geosite_file(Path::new("geosite.dat"), Path::new("geosite.json"))?;
//!
//! let report = convert_geoip_file(
//!     Path::new("geoip.dat"),
//!     Path::new("geoip.mmdb"),
//!     &ConvertOptions::default(),
//! )?;
//! println!("{}", report);
//! ```
//!
//! # JSON Output
//!
//! ```text
//! {
//!   "geosites": [
//!     {
//!       "country_code": "CN",
//!       "domains": [
//!         { "type": "domain", "value": "baidu.com", "attributes": { "cn": true } }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! # Error Handling
//!
//! A malformed source buffer, an unreadable source or an unwritable
//! destination fails the conversion. Per-CIDR problems are counted in
//! [`GeoIpReport`] and summarized in a single warning.

mod error;
mod report;

pub mod batch;
pub mod converter;
pub mod dat;
pub mod mmdb;

// Re-export core types
pub use error::{CidrError, Error, InsertError, Result};
pub use report::{GeoIpReport, GeoSiteReport};

// Re-export decoded entry types
pub use dat::{AttributeValue, DomainEntry, DomainRule, IpEntry, MatchKind, RawCidr};

// Re-export conversion entry points
pub use converter::{
    convert_geoip, convert_geoip_file, convert_geosite, convert_geosite_file, ConvertOptions,
};

// Re-export writer types
pub use mmdb::{LookupWriter, MmdbWriter, WriterOptions};
