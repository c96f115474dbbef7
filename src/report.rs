//! Conversion reports.

use std::fmt;
use std::path::PathBuf;

/// Outcome of a geosite conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoSiteReport {
    /// Number of country/category entries
    pub entries: usize,
    /// Number of domain rules across all entries
    pub domains: usize,
    /// Where the document was written
    pub output: Option<PathBuf>,
}

impl fmt::Display for GeoSiteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} entries, {} domains", self.entries, self.domains)
    }
}

/// Outcome of a geoip conversion.
///
/// Per-CIDR problems never fail the conversion; they are only counted here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoIpReport {
    /// Number of country entries
    pub entries: usize,
    /// Number of CIDR records seen
    pub cidrs: usize,
    /// CIDRs inserted into the lookup structure
    pub inserted: usize,
    /// CIDRs skipped for a bad address width or prefix
    pub invalid: usize,
    /// CIDRs skipped for lying in a reserved network
    pub reserved: usize,
    /// CIDRs the writer refused for any other reason
    pub failed: usize,
    /// Where the database was written
    pub output: Option<PathBuf>,
}

impl GeoIpReport {
    /// Count of problems worth surfacing to the user.
    ///
    /// Reserved skips are expected and not included.
    pub fn warnings(&self) -> usize {
        self.invalid + self.failed
    }
}

impl fmt::Display for GeoIpReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} entries, {} CIDRs: {} inserted, {} reserved, {} invalid, {} failed",
            self.entries, self.cidrs, self.inserted, self.reserved, self.invalid, self.failed
        )
    }
}
