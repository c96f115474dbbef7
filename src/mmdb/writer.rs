//! MaxMind DB writer.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use ahash::AHashMap;
use ipnet::{IpNet, Ipv4Net, Ipv6Net};

use super::reserved::{IPV4_ALIASES, RESERVED_V4, RESERVED_V6};
use super::value::Value;
use super::{LookupWriter, DATA_SECTION_SEPARATOR_SIZE, METADATA_START_MARKER};
use crate::error::{Error, InsertError, Result};

/// Options for a new database.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// `database_type` metadata, e.g. "GeoIP2-Country"
    pub database_type: String,
    /// Description per language code
    pub description: BTreeMap<String, String>,
    /// Languages the records carry names for
    pub languages: Vec<String>,
    /// Bits per search tree record: 24, 28 or 32
    pub record_size: u16,
    /// 4 or 6; IPv4 networks live at `::/96` in an IPv6 tree
    pub ip_version: u16,
    /// Allow data in reserved networks
    pub include_reserved_networks: bool,
    /// Leave `::ffff:0:0/96` and `2002::/16` as ordinary IPv6 space instead
    /// of pointing them at the IPv4 subtree
    pub disable_ipv4_aliasing: bool,
    /// Fixed build timestamp; the current time when `None`
    pub build_epoch: Option<u64>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        let mut description = BTreeMap::new();
        description.insert(
            "en".to_string(),
            "GeoIP database converted from geoip.dat".to_string(),
        );
        Self {
            database_type: "GeoIP2-Country".to_string(),
            description,
            languages: Vec::new(),
            record_size: 28,
            ip_version: 6,
            include_reserved_networks: false,
            disable_ipv4_aliasing: false,
            build_epoch: None,
        }
    }
}

/// A search tree record: the left or right half of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Record {
    Empty,
    /// Pinned empty; insertions inside it are refused
    Reserved,
    Node(usize),
    /// Link to a node owned by another slot; insertions through it are refused
    Alias(usize),
    Data(usize),
}

#[derive(Debug, Clone, Copy)]
struct Node {
    children: [Record; 2],
}

/// Builds a binary trie of networks and serializes it as a MaxMind DB.
///
/// Later insertions replace the data of earlier ones for the range they
/// cover. Reserved blocks stay empty: inserting inside one fails with
/// [`InsertError::ReservedNetwork`], inserting around one fills the rest.
///
/// In IPv6 trees the IPv4-mapped and 6to4 ranges are aliases of the `::/96`
/// subtree, so IPv4 data also answers for those addresses.
pub struct MmdbWriter {
    options: WriterOptions,
    /// Node 0 is the root
    nodes: Vec<Node>,
    values: Vec<Value>,
    /// Node at `::/96` when aliases point at it; never collapsed
    ipv4_root: Option<usize>,
}

impl MmdbWriter {
    /// Create a writer, validating the options.
    pub fn new(options: WriterOptions) -> Result<Self> {
        if !matches!(options.record_size, 24 | 28 | 32) {
            return Err(Error::Writer(format!(
                "unsupported record size: {}",
                options.record_size
            )));
        }
        if !matches!(options.ip_version, 4 | 6) {
            return Err(Error::Writer(format!(
                "unsupported IP version: {}",
                options.ip_version
            )));
        }
        if options.database_type.is_empty() {
            return Err(Error::Writer("database type must not be empty".to_string()));
        }

        let mut writer = Self {
            options,
            nodes: vec![Node {
                children: [Record::Empty; 2],
            }],
            values: Vec::new(),
            ipv4_root: None,
        };

        if !writer.options.include_reserved_networks {
            writer.pin_reserved();
        }
        if writer.options.ip_version == 6 && !writer.options.disable_ipv4_aliasing {
            writer.alias_ipv4();
        }

        Ok(writer)
    }

    /// Create a writer with default options.
    pub fn with_defaults() -> Result<Self> {
        Self::new(WriterOptions::default())
    }

    /// Number of live nodes in the search tree.
    pub fn node_count(&self) -> usize {
        self.numbering().0.len()
    }

    fn tree_depth(&self) -> u8 {
        if self.options.ip_version == 6 {
            128
        } else {
            32
        }
    }

    fn pin_reserved(&mut self) {
        for (addr, prefix) in RESERVED_V4 {
            let depth = if self.options.ip_version == 6 {
                96 + prefix
            } else {
                *prefix
            };
            self.pin(u32::from(*addr) as u128, depth);
        }
        if self.options.ip_version == 6 {
            for (addr, prefix) in RESERVED_V6 {
                self.pin(u128::from(*addr), *prefix);
            }
        }
    }

    /// Mark a slot reserved, discarding whatever was below it.
    fn pin(&mut self, key: u128, prefix: u8) {
        if prefix == 0 {
            self.nodes[0].children = [Record::Reserved; 2];
            return;
        }
        if let Some(parent) = self.node_at(key, prefix - 1) {
            let bit = self.bit(key, prefix - 1);
            self.nodes[parent].children[bit] = Record::Reserved;
        }
    }

    /// Point the alias slots at the `::/96` node.
    fn alias_ipv4(&mut self) {
        let Some(root) = self.node_at(0, 96) else {
            return;
        };
        self.ipv4_root = Some(root);

        for (addr, prefix) in IPV4_ALIASES {
            let key = u128::from(*addr);
            if let Some(parent) = self.node_at(key, prefix - 1) {
                let bit = self.bit(key, prefix - 1);
                self.nodes[parent].children[bit] = Record::Alias(root);
            }
        }
    }

    /// The node reached after `depth` bits of `key`, splitting leaves on the
    /// way. `None` if the path runs into a reserved or aliased slot.
    fn node_at(&mut self, key: u128, depth: u8) -> Option<usize> {
        let mut node = 0;
        for d in 0..depth {
            let bit = self.bit(key, d);
            let child = self.nodes[node].children[bit];
            node = match child {
                Record::Node(i) => i,
                Record::Empty | Record::Data(_) => self.split(node, bit, child),
                Record::Reserved | Record::Alias(_) => return None,
            };
        }
        Some(node)
    }

    /// Translate a network to its trie key and depth.
    fn key_of(&self, network: &IpNet) -> std::result::Result<(u128, u8), InsertError> {
        match network {
            IpNet::V4(net) => {
                let key = u32::from(net.network()) as u128;
                if self.options.ip_version == 6 {
                    Ok((key, 96 + net.prefix_len()))
                } else {
                    Ok((key, net.prefix_len()))
                }
            }
            IpNet::V6(net) => {
                if self.options.ip_version == 4 {
                    return Err(InsertError::IpVersionMismatch(*network));
                }
                Ok((u128::from(net.network()), net.prefix_len()))
            }
        }
    }

    fn bit(&self, key: u128, depth: u8) -> usize {
        let shift = self.tree_depth() - 1 - depth;
        ((key >> shift) & 1) as usize
    }

    /// Replace a leaf child of `node` with a fresh node inheriting the leaf.
    fn split(&mut self, node: usize, bit: usize, leaf: Record) -> usize {
        let index = self.nodes.len();
        self.nodes.push(Node {
            children: [leaf; 2],
        });
        self.nodes[node].children[bit] = Record::Node(index);
        index
    }

    /// Assign `data` to every non-reserved leaf under `record`.
    ///
    /// Subtrees left without a reserved leaf collapse into a single record.
    fn fill(&mut self, record: Record, data: Record) -> Record {
        match record {
            Record::Reserved | Record::Alias(_) => record,
            Record::Node(i) => {
                for bit in 0..2 {
                    let child = self.nodes[i].children[bit];
                    self.nodes[i].children[bit] = self.fill(child, data);
                }
                if self.nodes[i].children == [data; 2] && self.ipv4_root != Some(i) {
                    data
                } else {
                    Record::Node(i)
                }
            }
            Record::Empty | Record::Data(_) => data,
        }
    }

    /// The network a trie slot at `depth` covers, for error reporting.
    fn slot_network(&self, key: u128, depth: u8, fallback: IpNet) -> IpNet {
        let bits = self.tree_depth();
        let top = if depth == 0 {
            0
        } else {
            u128::MAX << (128 - depth as u32)
        };
        let mask = top >> (128 - bits as u32);
        let masked = key & mask;

        let net = if bits == 32 {
            Ipv4Net::new(Ipv4Addr::from(masked as u32), depth).map(IpNet::V4)
        } else if depth >= 96 && masked >> 32 == 0 {
            Ipv4Net::new(Ipv4Addr::from(masked as u32), depth - 96).map(IpNet::V4)
        } else {
            Ipv6Net::new(Ipv6Addr::from(masked), depth).map(IpNet::V6)
        };
        net.unwrap_or(fallback)
    }

    /// Assign search tree indices breadth-first over reachable nodes.
    fn numbering(&self) -> (Vec<usize>, Vec<Option<usize>>) {
        let mut order = vec![0];
        let mut index = vec![None; self.nodes.len()];
        index[0] = Some(0);

        let mut cursor = 0;
        while cursor < order.len() {
            let node = order[cursor];
            cursor += 1;
            for child in self.nodes[node].children {
                if let Record::Node(c) | Record::Alias(c) = child {
                    if index[c].is_none() {
                        index[c] = Some(order.len());
                        order.push(c);
                    }
                }
            }
        }

        (order, index)
    }

    fn metadata(&self, node_count: u32) -> Value {
        let build_epoch = self.options.build_epoch.unwrap_or_else(|| {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs()
        });

        let description = self
            .options
            .description
            .iter()
            .map(|(lang, text)| (lang.clone(), Value::from(text.as_str())))
            .collect();

        let languages = self
            .options
            .languages
            .iter()
            .map(|l| Value::from(l.as_str()))
            .collect();

        Value::map([
            ("binary_format_major_version", Value::Uint16(2)),
            ("binary_format_minor_version", Value::Uint16(0)),
            ("build_epoch", Value::Uint64(build_epoch)),
            ("database_type", Value::from(self.options.database_type.as_str())),
            ("description", Value::Map(description)),
            ("ip_version", Value::Uint16(self.options.ip_version)),
            ("languages", Value::Array(languages)),
            ("node_count", Value::Uint32(node_count)),
            ("record_size", Value::Uint16(self.options.record_size)),
        ])
    }

    fn write_node(&self, buf: &mut Vec<u8>, left: u32, right: u32) {
        match self.options.record_size {
            24 => {
                buf.extend_from_slice(&left.to_be_bytes()[1..]);
                buf.extend_from_slice(&right.to_be_bytes()[1..]);
            }
            28 => {
                let l = left.to_be_bytes();
                let r = right.to_be_bytes();
                buf.extend_from_slice(&l[1..]);
                buf.push(((l[0] & 0x0f) << 4) | (r[0] & 0x0f));
                buf.extend_from_slice(&r[1..]);
            }
            _ => {
                buf.extend_from_slice(&left.to_be_bytes());
                buf.extend_from_slice(&right.to_be_bytes());
            }
        }
    }
}

impl LookupWriter for MmdbWriter {
    fn insert(&mut self, network: IpNet, record: Value) -> std::result::Result<(), InsertError> {
        let (key, prefix) = self.key_of(&network)?;
        let reserved_at = |writer: &MmdbWriter, depth: u8| InsertError::ReservedNetwork {
            network,
            reserved: writer.slot_network(key, depth, network),
        };
        let aliased_at = |writer: &MmdbWriter, depth: u8| InsertError::AliasedNetwork {
            network,
            alias: writer.slot_network(key, depth, network),
        };

        let data = Record::Data(self.values.len());

        if prefix == 0 {
            self.values.push(record);
            for bit in 0..2 {
                let child = self.nodes[0].children[bit];
                self.nodes[0].children[bit] = self.fill(child, data);
            }
            return Ok(());
        }

        let mut node = 0;
        for depth in 0..prefix {
            let bit = self.bit(key, depth);
            let child = self.nodes[node].children[bit];

            if depth + 1 == prefix {
                match child {
                    Record::Reserved => return Err(reserved_at(&*self, depth + 1)),
                    Record::Alias(_) => return Err(aliased_at(&*self, depth + 1)),
                    _ => {}
                }
                self.values.push(record);
                self.nodes[node].children[bit] = self.fill(child, data);
                return Ok(());
            }

            node = match child {
                Record::Node(i) => i,
                Record::Reserved => return Err(reserved_at(&*self, depth + 1)),
                Record::Alias(_) => return Err(aliased_at(&*self, depth + 1)),
                Record::Empty | Record::Data(_) => self.split(node, bit, child),
            };
        }

        Ok(())
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let (order, index) = self.numbering();
        let node_count = order.len();

        // Encode referenced values once, sharing identical encodings
        let mut data_section = Vec::new();
        let mut offsets: AHashMap<Vec<u8>, usize> = AHashMap::new();
        let mut value_offsets: Vec<Option<usize>> = vec![None; self.values.len()];
        for &node in &order {
            for child in self.nodes[node].children {
                let Record::Data(d) = child else { continue };
                if value_offsets[d].is_some() {
                    continue;
                }
                let bytes = self.values[d].to_bytes()?;
                let offset = match offsets.get(&bytes) {
                    Some(&offset) => offset,
                    None => {
                        let offset = data_section.len();
                        data_section.extend_from_slice(&bytes);
                        offsets.insert(bytes, offset);
                        offset
                    }
                };
                value_offsets[d] = Some(offset);
            }
        }

        let limit: u64 = 1 << self.options.record_size;
        let record_value = |record: Record| -> Result<u32> {
            let value = match record {
                Record::Empty | Record::Reserved => node_count,
                Record::Node(c) | Record::Alias(c) => index[c].unwrap_or(node_count),
                Record::Data(d) => {
                    node_count + DATA_SECTION_SEPARATOR_SIZE + value_offsets[d].unwrap_or(0)
                }
            };
            if value as u64 >= limit {
                return Err(Error::Writer(format!(
                    "record value {} does not fit in {} bits",
                    value, self.options.record_size
                )));
            }
            Ok(value as u32)
        };

        let node_bytes = self.options.record_size as usize / 4;
        let mut buf = Vec::with_capacity(
            node_count * node_bytes + DATA_SECTION_SEPARATOR_SIZE + data_section.len() + 512,
        );
        for &node in &order {
            let [left, right] = self.nodes[node].children;
            self.write_node(&mut buf, record_value(left)?, record_value(right)?);
        }

        buf.extend_from_slice(&[0u8; DATA_SECTION_SEPARATOR_SIZE]);
        buf.extend_from_slice(&data_section);
        buf.extend_from_slice(METADATA_START_MARKER);
        self.metadata(node_count as u32).encode(&mut buf)?;

        log::debug!(
            "Serialized MMDB: {} nodes, {} data bytes, {} total bytes",
            node_count,
            data_section.len(),
            buf.len()
        );

        Ok(buf)
    }
}
