//! `geosite.dat` to JSON.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::dat::{self, AttributeValue, DomainEntry};
use crate::error::{Error, Result};
use crate::report::GeoSiteReport;

/// Top-level JSON document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoSiteDocument {
    pub geosites: Vec<GeoSiteJson>,
}

/// One country/category entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoSiteJson {
    pub country_code: String,
    pub domains: Vec<DomainJson>,
}

/// One domain rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainJson {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<BTreeMap<String, AttributeValue>>,
}

impl GeoSiteDocument {
    /// Build the document from decoded entries, keeping their order.
    pub fn from_entries(entries: &[DomainEntry]) -> Self {
        let geosites = entries
            .iter()
            .map(|entry| GeoSiteJson {
                country_code: entry.country_code.clone(),
                domains: entry
                    .domains
                    .iter()
                    .map(|rule| DomainJson {
                        kind: rule.kind.as_str(),
                        value: rule.value.clone(),
                        attributes: if rule.attributes.is_empty() {
                            None
                        } else {
                            Some(rule.attributes.iter().cloned().collect())
                        },
                    })
                    .collect(),
            })
            .collect();

        Self { geosites }
    }

    /// Total number of domain rules.
    pub fn domain_count(&self) -> usize {
        self.geosites.iter().map(|g| g.domains.len()).sum()
    }

    /// Render as indented JSON.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

/// Convert a `geosite.dat` buffer to indented JSON.
pub fn convert_geosite(data: &[u8]) -> Result<(Vec<u8>, GeoSiteReport)> {
    let entries = dat::decode_geosite(data)?;
    let document = GeoSiteDocument::from_entries(&entries);
    let json = document.to_json()?;

    let report = GeoSiteReport {
        entries: document.geosites.len(),
        domains: document.domain_count(),
        output: None,
    };
    Ok((json, report))
}

/// Convert a `geosite.dat` file into a JSON file.
pub fn convert_geosite_file(input: &Path, output: &Path) -> Result<GeoSiteReport> {
    let data = dat::read_source(input)?;
    let (json, mut report) = convert_geosite(&data)?;

    fs::write(output, &json).map_err(|source| Error::Write {
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
    use crate::dat::proto;
    use crate::dat::{DomainRule, MatchKind};
    use prost::Message;
    use proto::domain::attribute::TypedValue;
    use tempfile::tempdir;

    fn rule(kind: MatchKind, value: &str, attributes: Vec<(&str, AttributeValue)>) -> DomainRule {
        DomainRule {
            kind,
            value: value.to_string(),
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    #[test]
    fn test_document_shape() {
        let entries = vec![DomainEntry {
            country_code: "CN".to_string(),
            domains: vec![
                rule(MatchKind::Domain, "baidu.com", vec![("cn", AttributeValue::Bool(true))]),
                rule(MatchKind::Full, "www.qq.com", vec![("weight", AttributeValue::Int(5))]),
                rule(MatchKind::Plain, "taobao", vec![]),
            ],
        }];

        let json = GeoSiteDocument::from_entries(&entries).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();

        let domains = &value["geosites"][0]["domains"];
        assert_eq!(value["geosites"][0]["country_code"], "CN");
        assert_eq!(domains[0]["type"], "domain");
        assert_eq!(domains[0]["attributes"], serde_json::json!({"cn": true}));
        assert_eq!(domains[1]["type"], "full");
        assert_eq!(domains[1]["attributes"], serde_json::json!({"weight": 5}));
        assert_eq!(domains[2]["type"], "plain");
        assert!(domains[2].get("attributes").is_none());
    }

    #[test]
    fn test_kind_names() {
        let kinds = [
            (MatchKind::Plain, "plain"),
            (MatchKind::Regex, "regex"),
            (MatchKind::Domain, "domain"),
            (MatchKind::Full, "full"),
            (MatchKind::Unknown, "unknown"),
        ];
        let entries = vec![DomainEntry {
            country_code: "TEST".to_string(),
            domains: kinds.iter().map(|(k, _)| rule(*k, "x", vec![])).collect(),
        }];

        let document = GeoSiteDocument::from_entries(&entries);
        for (domain, (_, name)) in document.geosites[0].domains.iter().zip(kinds) {
            assert_eq!(domain.kind, name);
        }
    }

    #[test]
    fn test_empty_entry_keeps_domains_array() {
        let entries = vec![DomainEntry {
            country_code: "EMPTY".to_string(),
            domains: vec![],
        }];
        let json = GeoSiteDocument::from_entries(&entries).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(value["geosites"][0]["domains"], serde_json::json!([]));
    }

    #[test]
    fn test_output_is_indented() {
        let json = GeoSiteDocument { geosites: vec![] }.to_json().unwrap();
        assert_eq!(String::from_utf8(json).unwrap(), "{\n  \"geosites\": []\n}");
    }

    #[test]
    fn test_convert_geosite_bytes() {
        let list = proto::GeoSiteList {
            entry: vec![proto::GeoSite {
                country_code: "CN".to_string(),
                domain: vec![proto::Domain {
                    r#type: 2,
                    value: "baidu.com".to_string(),
                    attribute: vec![proto::domain::Attribute {
                        key: "cn".to_string(),
                        typed_value: Some(TypedValue::BoolValue(true)),
                    }],
                }],
            }],
        };

        let (json, report) = convert_geosite(&list.encode_to_vec()).unwrap();
        assert_eq!(report.entries, 1);
        assert_eq!(report.domains, 1);
        assert!(String::from_utf8(json).unwrap().contains("\"baidu.com\""));
    }

    #[test]
    fn test_convert_geosite_file_unwritable_destination() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("geosite.dat");
        fs::write(&input, proto::GeoSiteList::default().encode_to_vec()).unwrap();

        let output = dir.path().join("missing").join("geosite.json");
        let err = convert_geosite_file(&input, &output).unwrap_err();
        assert!(matches!(err, Error::Write { .. }));
    }
}
