//! Decoded rule-list entries.

use std::fmt;

use serde::Serialize;

use super::proto;

/// How a domain rule value is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchKind {
    /// Keyword match anywhere in the host
    Plain,
    /// Regular expression
    Regex,
    /// Root domain and all subdomains
    Domain,
    /// Exact host
    Full,
    /// Tag not known to this schema
    Unknown,
}

impl MatchKind {
    /// Map an encoded type tag, falling back to `Unknown` for unrecognized tags.
    pub fn from_tag(tag: i32) -> Self {
        match proto::domain::Type::try_from(tag) {
            Ok(proto::domain::Type::Plain) => MatchKind::Plain,
            Ok(proto::domain::Type::Regex) => MatchKind::Regex,
            Ok(proto::domain::Type::Domain) => MatchKind::Domain,
            Ok(proto::domain::Type::Full) => MatchKind::Full,
            Err(_) => MatchKind::Unknown,
        }
    }

    /// Get the lowercase name used in JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Plain => "plain",
            MatchKind::Regex => "regex",
            MatchKind::Domain => "domain",
            MatchKind::Full => "full",
            MatchKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Typed value of a domain attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
}

impl AttributeValue {
    /// Resolve the protobuf one-of; `None` when neither variant was set.
    pub fn from_typed(value: Option<&proto::domain::attribute::TypedValue>) -> Option<Self> {
        use proto::domain::attribute::TypedValue;

        match value? {
            TypedValue::BoolValue(b) => Some(AttributeValue::Bool(*b)),
            TypedValue::IntValue(i) => Some(AttributeValue::Int(*i)),
        }
    }
}

/// A single domain rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainRule {
    pub kind: MatchKind,
    pub value: String,
    /// Attributes in encoded order; attributes without a value are dropped
    pub attributes: Vec<(String, AttributeValue)>,
}

/// A country/category code and its domain rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainEntry {
    pub country_code: String,
    pub domains: Vec<DomainRule>,
}

/// Raw CIDR record as stored in `geoip.dat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCidr {
    /// 4 or 16 bytes in a well-formed list; not checked at decode time
    pub ip: Vec<u8>,
    pub prefix: u32,
}

/// A country code and its address ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpEntry {
    pub country_code: String,
    pub cidrs: Vec<RawCidr>,
}

impl From<proto::Domain> for DomainRule {
    fn from(domain: proto::Domain) -> Self {
        let attributes = domain
            .attribute
            .iter()
            .filter_map(|attr| {
                AttributeValue::from_typed(attr.typed_value.as_ref())
                    .map(|value| (attr.key.clone(), value))
            })
            .collect();

        Self {
            kind: MatchKind::from_tag(domain.r#type),
            value: domain.value,
            attributes,
        }
    }
}

impl From<proto::GeoSite> for DomainEntry {
    fn from(site: proto::GeoSite) -> Self {
        Self {
            country_code: site.country_code,
            domains: site.domain.into_iter().map(DomainRule::from).collect(),
        }
    }
}

impl From<proto::GeoIp> for IpEntry {
    fn from(geoip: proto::GeoIp) -> Self {
        Self {
            country_code: geoip.country_code,
            cidrs: geoip
                .cidr
                .into_iter()
                .map(|c| RawCidr {
                    ip: c.ip,
                    prefix: c.prefix,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proto::domain::attribute::TypedValue;

    #[test]
    fn test_match_kind_from_tag() {
        assert_eq!(MatchKind::from_tag(0), MatchKind::Plain);
        assert_eq!(MatchKind::from_tag(1), MatchKind::Regex);
        assert_eq!(MatchKind::from_tag(2), MatchKind::Domain);
        assert_eq!(MatchKind::from_tag(3), MatchKind::Full);
        assert_eq!(MatchKind::from_tag(4), MatchKind::Unknown);
        assert_eq!(MatchKind::from_tag(-1), MatchKind::Unknown);
    }

    #[test]
    fn test_match_kind_display() {
        assert_eq!(MatchKind::Plain.to_string(), "plain");
        assert_eq!(MatchKind::Full.to_string(), "full");
        assert_eq!(MatchKind::Unknown.to_string(), "unknown");
    }

    #[test]
    fn test_attribute_value_resolution() {
        assert_eq!(
            AttributeValue::from_typed(Some(&TypedValue::BoolValue(true))),
            Some(AttributeValue::Bool(true))
        );
        assert_eq!(
            AttributeValue::from_typed(Some(&TypedValue::IntValue(-3))),
            Some(AttributeValue::Int(-3))
        );
        assert_eq!(AttributeValue::from_typed(None), None);
    }

    #[test]
    fn test_domain_rule_drops_empty_attributes() {
        let domain = proto::Domain {
            r#type: 2,
            value: "example.com".to_string(),
            attribute: vec![
                proto::domain::Attribute {
                    key: "ads".to_string(),
                    typed_value: None,
                },
                proto::domain::Attribute {
                    key: "cn".to_string(),
                    typed_value: Some(TypedValue::BoolValue(true)),
                },
            ],
        };

        let rule = DomainRule::from(domain);
        assert_eq!(rule.kind, MatchKind::Domain);
        assert_eq!(
            rule.attributes,
            vec![("cn".to_string(), AttributeValue::Bool(true))]
        );
    }
}
