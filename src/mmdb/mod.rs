//! MaxMind DB (MMDB) output for country lookups.
//!
//! The IP re-encoder only decides *what* to insert; building the search trie
//! and laying out the file is the job of a [`LookupWriter`]. [`MmdbWriter`] is
//! the bundled implementation.
//!
//! # File Structure
//!
//! ```text
//! +------------------+
//! |   SEARCH TREE    |  node_count * record_size / 4 bytes
//! +------------------+
//! |    SEPARATOR     |  16 zero bytes
//! +------------------+
//! |   DATA SECTION   |  deduplicated records
//! +------------------+
//! | METADATA MARKER  |  "\xAB\xCD\xEFMaxMind.com"
//! +------------------+
//! |     METADATA     |  map
//! +------------------+
//! ```

mod reader;
mod reserved;
mod value;
mod writer;


use ipnet::IpNet;

use crate::error::{InsertError, Result};

pub use reader::{lookup_country, CountryLookup};
pub use reserved::{IPV4_ALIASES, RESERVED_V4, RESERVED_V6};
pub use value::Value;
pub use writer::{MmdbWriter, WriterOptions};

/// Marker preceding the metadata map.
pub const METADATA_START_MARKER: &[u8] = b"\xAB\xCD\xEFMaxMind.com";

/// Zero bytes between the search tree and the data section.
pub const DATA_SECTION_SEPARATOR_SIZE: usize = 16;

/// A longest-prefix-match structure that can be serialized to bytes.
pub trait LookupWriter {
    /// Associate `record` with `network`.
    ///
    /// Fails with [`InsertError::ReservedNetwork`] when the network lies in a
    /// block the writer refuses to populate.
    fn insert(&mut self, network: IpNet, record: Value) -> std::result::Result<(), InsertError>;

    /// Serialize the accumulated structure.
    fn serialize(&self) -> Result<Vec<u8>>;
}

/// Build the `{country: {iso_code}}` record for a country code.
pub fn country_record(iso_code: &str) -> Value {
    Value::map([("country", Value::map([("iso_code", Value::from(iso_code))]))])
}
