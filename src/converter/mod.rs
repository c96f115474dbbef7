//! Re-encoders from decoded rule lists to their output formats.
//!
//! - [`geosite`]: domain lists to an indented JSON document
//! - [`geoip`]: country CIDR lists to a MaxMind DB

pub mod geoip;
pub mod geosite;

pub use geoip::{convert_geoip, convert_geoip_file, insert_entries, normalize_cidr, ConvertOptions};
pub use geosite::{convert_geosite, convert_geosite_file, DomainJson, GeoSiteDocument, GeoSiteJson};
