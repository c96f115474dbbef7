//! `geoip.dat` to MaxMind DB.

use std::fs;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

use ipnet::IpNet;

use crate::dat::{self, IpEntry, RawCidr};
use crate::error::{CidrError, Error, Result};
use crate::mmdb::{country_record, LookupWriter, MmdbWriter, WriterOptions};
use crate::report::GeoIpReport;

/// Options for a geoip conversion.
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Abort on the first non-reserved insertion failure
    pub strict: bool,
    /// Settings for the output database
    pub writer: WriterOptions,
}

/// Turn a raw CIDR record into a network.
///
/// IPv4-mapped IPv6 addresses are reduced to IPv4 first, so the prefix is
/// read as an IPv4 prefix. Host bits are cleared.
pub fn normalize_cidr(cidr: &RawCidr) -> std::result::Result<IpNet, CidrError> {
    let addr = if let Ok(octets) = <[u8; 4]>::try_from(cidr.ip.as_slice()) {
        IpAddr::V4(Ipv4Addr::from(octets))
    } else if let Ok(octets) = <[u8; 16]>::try_from(cidr.ip.as_slice()) {
        let v6 = Ipv6Addr::from(octets);
        match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        }
    } else {
        return Err(CidrError::InvalidLength(cidr.ip.len()));
    };

    let invalid = || CidrError::InvalidPrefix {
        addr,
        prefix: cidr.prefix,
    };
    let prefix = u8::try_from(cidr.prefix).map_err(|_| invalid())?;
    let network = IpNet::new(addr, prefix).map_err(|_| invalid())?;
    Ok(network.trunc())
}

/// Insert every CIDR of `entries` into `writer`.
///
/// A bad CIDR or a refused insertion skips that record only. Reserved
/// networks are skipped silently; other insertion failures are counted and
/// summarized in one warning, or abort the run when `strict` is set.
pub fn insert_entries<W: LookupWriter>(
    entries: &[IpEntry],
    writer: &mut W,
    strict: bool,
) -> Result<GeoIpReport> {
    let mut report = GeoIpReport {
        entries: entries.len(),
        ..Default::default()
    };

    for entry in entries {
        let record = country_record(&entry.country_code);

        for cidr in &entry.cidrs {
            report.cidrs += 1;

            let network = match normalize_cidr(cidr) {
                Ok(network) => network,
                Err(e) => {
                    log::debug!("Skipping invalid CIDR in {}: {}", entry.country_code, e);
                    report.invalid += 1;
                    continue;
                }
            };

            match writer.insert(network, record.clone()) {
                Ok(()) => report.inserted += 1,
                Err(e) if e.is_reserved() => {
                    log::trace!("Skipping reserved network {}", network);
                    report.reserved += 1;
                }
                Err(e) if strict => return Err(Error::Insert(e)),
                Err(e) => {
                    log::debug!("Failed to insert CIDR {}: {}", network, e);
                    report.failed += 1;
                }
            }
        }
    }

    if report.warnings() > 0 {
        log::warn!(
            "Skipped {} invalid and {} rejected CIDRs out of {}",
            report.invalid,
            report.failed,
            report.cidrs
        );
    }

    Ok(report)
}

/// Convert a `geoip.dat` buffer to MMDB bytes.
pub fn convert_geoip(data: &[u8], options: &ConvertOptions) -> Result<(Vec<u8>, GeoIpReport)> {
    let entries = dat::decode_geoip(data)?;
    let mut writer = MmdbWriter::new(options.writer.clone())?;
    let report = insert_entries(&entries, &mut writer, options.strict)?;
    let bytes = writer.serialize()?;
    Ok((bytes, report))
}

/// Convert a `geoip.dat` file into an MMDB file.
pub fn convert_geoip_file(
    input: &Path,
    output: &Path,
    options: &ConvertOptions,
) -> Result<GeoIpReport> {
    let data = dat::read_source(input)?;
    let (bytes, mut report) = convert_geoip(&data, options)?;

    fs::write(output, &bytes).map_err(|source| Error::Write {
        path: output.to_path_buf(),
        source,
    })?;

    log::info!("Converted {:?} -> {:?}: {}", input, output, report);
    report.output = Some(output.to_path_buf());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InsertError;
    use crate::mmdb::Value;

    /// Records insertions instead of building a tree.
    #[derive(Default)]
    struct RecordingWriter {
        inserted: Vec<(IpNet, Value)>,
        refuse: Vec<IpNet>,
    }

    impl LookupWriter for RecordingWriter {
        fn insert(
            &mut self,
            network: IpNet,
            record: Value,
        ) -> std::result::Result<(), InsertError> {
            if network == "127.0.0.0/8".parse::<IpNet>().unwrap() {
                return Err(InsertError::ReservedNetwork {
                    network,
                    reserved: network,
                });
            }
            if self.refuse.contains(&network) {
                return Err(InsertError::IpVersionMismatch(network));
            }
            self.inserted.push((network, record));
            Ok(())
        }

        fn serialize(&self) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    fn raw(ip: &[u8], prefix: u32) -> RawCidr {
        RawCidr {
            ip: ip.to_vec(),
            prefix,
        }
    }

    fn mapped(v4: [u8; 4]) -> Vec<u8> {
        let mut ip = vec![0u8; 10];
        ip.extend_from_slice(&[0xff, 0xff]);
        ip.extend_from_slice(&v4);
        ip
    }

    #[test]
    fn test_normalize_ipv4() {
        let net = normalize_cidr(&raw(&[8, 8, 8, 0], 24)).unwrap();
        assert_eq!(net, "8.8.8.0/24".parse::<IpNet>().unwrap());
    }

    #[test]
    fn test_normalize_clears_host_bits() {
        let net = normalize_cidr(&raw(&[8, 8, 8, 8], 24)).unwrap();
        assert_eq!(net, "8.8.8.0/24".parse::<IpNet>().unwrap());
    }

    #[test]
    fn test_normalize_ipv4_mapped() {
        let net = normalize_cidr(&raw(&mapped([8, 8, 8, 0]), 24)).unwrap();
        assert_eq!(net, "8.8.8.0/24".parse::<IpNet>().unwrap());
    }

    #[test]
    fn test_normalize_ipv6() {
        let ip: Ipv6Addr = "2001:4860::".parse().unwrap();
        let net = normalize_cidr(&raw(&ip.octets(), 32)).unwrap();
        assert_eq!(net, "2001:4860::/32".parse::<IpNet>().unwrap());
    }

    #[test]
    fn test_normalize_rejects_bad_length() {
        assert_eq!(
            normalize_cidr(&raw(&[1, 2, 3, 4, 5], 24)),
            Err(CidrError::InvalidLength(5))
        );
        assert_eq!(normalize_cidr(&raw(&[], 0)), Err(CidrError::InvalidLength(0)));
    }

    #[test]
    fn test_normalize_rejects_bad_prefix() {
        assert!(matches!(
            normalize_cidr(&raw(&[8, 8, 8, 0], 33)),
            Err(CidrError::InvalidPrefix { prefix: 33, .. })
        ));
        // A mapped address takes an IPv4 prefix
        assert!(normalize_cidr(&raw(&mapped([8, 8, 8, 0]), 120)).is_err());
        assert!(normalize_cidr(&raw(&[0; 16], 129)).is_err());
        assert!(normalize_cidr(&raw(&[8, 8, 8, 0], 300)).is_err());
    }

    #[test]
    fn test_partial_failure_resilience() {
        let entries = vec![IpEntry {
            country_code: "US".to_string(),
            cidrs: vec![
                raw(&[8, 8, 8, 0], 24),
                raw(&[1, 2, 3, 4, 5], 24),
                raw(&[8, 8, 4, 0], 24),
                raw(&mapped([9, 9, 9, 0]), 24),
            ],
        }];

        let mut writer = RecordingWriter::default();
        let report = insert_entries(&entries, &mut writer, false).unwrap();

        assert_eq!(report.cidrs, 4);
        assert_eq!(report.inserted, 3);
        assert_eq!(report.invalid, 1);
        assert_eq!(writer.inserted.len(), 3);
        assert_eq!(writer.inserted[2].0, "9.9.9.0/24".parse::<IpNet>().unwrap());
        assert_eq!(writer.inserted[0].1, country_record("US"));
    }

    #[test]
    fn test_reserved_skipped_without_warning() {
        let entries = vec![IpEntry {
            country_code: "ZZ".to_string(),
            cidrs: vec![raw(&[127, 0, 0, 0], 8), raw(&[8, 8, 8, 0], 24)],
        }];

        let mut writer = RecordingWriter::default();
        let report = insert_entries(&entries, &mut writer, true).unwrap();

        assert_eq!(report.reserved, 1);
        assert_eq!(report.inserted, 1);
        assert_eq!(report.warnings(), 0);
    }

    #[test]
    fn test_other_insert_failures_are_counted() {
        let entries = vec![IpEntry {
            country_code: "US".to_string(),
            cidrs: vec![raw(&[8, 8, 8, 0], 24), raw(&[1, 1, 1, 0], 24)],
        }];

        let mut writer = RecordingWriter {
            refuse: vec!["8.8.8.0/24".parse().unwrap()],
            ..Default::default()
        };
        let report = insert_entries(&entries, &mut writer, false).unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.inserted, 1);
    }

    #[test]
    fn test_strict_mode_aborts() {
        let entries = vec![IpEntry {
            country_code: "US".to_string(),
            cidrs: vec![raw(&[8, 8, 8, 0], 24), raw(&[1, 1, 1, 0], 24)],
        }];

        let mut writer = RecordingWriter {
            refuse: vec!["8.8.8.0/24".parse().unwrap()],
            ..Default::default()
        };
        let err = insert_entries(&entries, &mut writer, true).unwrap_err();

        assert!(matches!(err, Error::Insert(InsertError::IpVersionMismatch(_))));
        assert!(writer.inserted.is_empty());
    }

    #[test]
    fn test_entries_processed_in_order() {
        let entries = vec![
            IpEntry {
                country_code: "CN".to_string(),
                cidrs: vec![raw(&[1, 0, 1, 0], 24)],
            },
            IpEntry {
                country_code: "US".to_string(),
                cidrs: vec![raw(&[8, 8, 8, 0], 24)],
            },
        ];

        let mut writer = RecordingWriter::default();
        let report = insert_entries(&entries, &mut writer, false).unwrap();

        assert_eq!(report.entries, 2);
        assert_eq!(writer.inserted[0].1, country_record("CN"));
        assert_eq!(writer.inserted[1].1, country_record("US"));
    }
}
