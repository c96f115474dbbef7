//! Error types for forgerules.

use std::path::PathBuf;

use ipnet::IpNet;
use thiserror::Error;

/// Error type for forgerules operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed protobuf rule list
    #[error("failed to unmarshal protobuf: {0}")]
    Decode(#[from] prost::DecodeError),

    /// Source file could not be read
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Destination file could not be created or written
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error
    #[error("failed to marshal JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Lookup database writer could not be created or serialized
    #[error("MMDB writer error: {0}")]
    Writer(String),

    /// GeoIP database read error
    #[error("GeoIP error: {0}")]
    GeoIp(String),

    /// Insertion failure promoted to fatal by strict mode
    #[error("failed to insert CIDR: {0}")]
    Insert(#[from] InsertError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for forgerules operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for a single malformed CIDR record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CidrError {
    /// Address is neither 4 nor 16 bytes long
    #[error("invalid IP address length: {0} bytes")]
    InvalidLength(usize),

    /// Prefix length exceeds the address family width
    #[error("invalid prefix length {prefix} for {addr}")]
    InvalidPrefix { addr: std::net::IpAddr, prefix: u32 },
}

/// Error type for lookup database insertions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InsertError {
    /// Network lies inside a reserved, non-routable block
    #[error("attempt to insert {network} into {reserved}, which is a reserved network")]
    ReservedNetwork { network: IpNet, reserved: IpNet },

    /// Network lies inside an IPv6 range aliased to the IPv4 subtree
    #[error("attempt to insert {network} into {alias}, which is an aliased network")]
    AliasedNetwork { network: IpNet, alias: IpNet },

    /// IPv6 network inserted into an IPv4-only tree
    #[error("cannot insert IPv6 network {0} into an IPv4 database")]
    IpVersionMismatch(IpNet),
}

impl InsertError {
    /// Whether this failure is the expected reserved-network condition.
    pub fn is_reserved(&self) -> bool {
        matches!(self, InsertError::ReservedNetwork { .. })
    }
}
