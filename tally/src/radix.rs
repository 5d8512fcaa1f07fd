//! Longest-prefix-match resolver from metric names to histogram layouts.
//!
//! [`PrefixResolver`] is a compressed radix tree keyed on the raw bytes of the
//! prefix. Each edge carries a byte label; no two edges leaving a node share a
//! first byte, so a lookup walks at most one edge per level and costs
//! `O(name length)` regardless of how many prefixes are registered.
//!
//! The resolver is populated once by the configuration loader and then only
//! read. Engines hold a shared borrow (`&'r PrefixResolver`) for their whole
//! lifetime and never take ownership of it.

use crate::histogram::HistogramConfig;

#[derive(Debug, Default)]
struct Node {
    config: Option<HistogramConfig>,
    /// Outgoing edges, sorted by the first byte of their label.
    edges: Vec<Edge>,
}

#[derive(Debug)]
struct Edge {
    label: Box<[u8]>,
    child: Node,
}

impl Node {
    const fn empty() -> Self {
        Self {
            config: None,
            edges: Vec::new(),
        }
    }

    fn edge_position(&self, first: u8) -> Result<usize, usize> {
        self.edges.binary_search_by_key(&first, |edge| edge.label[0])
    }
}

/// Maps metric-name prefixes to histogram configurations.
///
/// # Example
///
/// ```rust
/// use tally::{HistogramConfig, PrefixResolver};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut resolver = PrefixResolver::new();
/// resolver.insert(HistogramConfig::new("app.", vec![1.0, 10.0])?);
/// resolver.insert(HistogramConfig::new("app.request.", vec![5.0, 50.0, 500.0])?);
///
/// let config = resolver.lookup("app.request.latency").unwrap();
/// assert_eq!(config.prefix(), "app.request.");
/// assert_eq!(resolver.lookup("app.db.query").unwrap().prefix(), "app.");
/// assert!(resolver.lookup("other.metric").is_none());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct PrefixResolver {
    root: Node,
    len: usize,
}

impl PrefixResolver {
    /// Creates an empty resolver.
    pub const fn new() -> Self {
        Self {
            root: Node::empty(),
            len: 0,
        }
    }

    /// Builds a resolver from a set of configurations.
    ///
    /// Later entries replace earlier ones with the same prefix.
    pub fn from_configs<I>(configs: I) -> Self
    where
        I: IntoIterator<Item = HistogramConfig>,
    {
        let mut resolver = Self::new();
        for config in configs {
            resolver.insert(config);
        }
        resolver
    }

    /// Registers `config` under its prefix, returning any configuration it replaced.
    pub fn insert(&mut self, config: HistogramConfig) -> Option<HistogramConfig> {
        let key = config.prefix().as_bytes().to_vec();
        let mut node = &mut self.root;
        let mut rest: &[u8] = &key;

        while let Some(&first) = rest.first() {
            match node.edge_position(first) {
                Err(position) => {
                    node.edges.insert(
                        position,
                        Edge {
                            label: rest.into(),
                            child: Node::empty(),
                        },
                    );
                    node = &mut node.edges[position].child;
                    rest = &[];
                }
                Ok(position) => {
                    let edge = &mut node.edges[position];
                    let common = common_prefix_len(&edge.label, rest);
                    if common < edge.label.len() {
                        split_edge(edge, common);
                    }
                    rest = &rest[common..];
                    node = &mut node.edges[position].child;
                }
            }
        }

        let replaced = node.config.replace(config);
        if replaced.is_none() {
            self.len += 1;
        }
        replaced
    }

    /// Returns the configuration with the longest prefix of `name`, if any.
    pub fn lookup(&self, name: &str) -> Option<&HistogramConfig> {
        let mut node = &self.root;
        let mut rest = name.as_bytes();
        let mut best = node.config.as_ref();

        while let Some(&first) = rest.first() {
            let Ok(position) = node.edge_position(first) else {
                break;
            };
            let edge = &node.edges[position];
            if !rest.starts_with(&edge.label) {
                break;
            }
            rest = &rest[edge.label.len()..];
            node = &edge.child;
            if node.config.is_some() {
                best = node.config.as_ref();
            }
        }

        best
    }

    /// Number of registered prefixes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no prefix is registered.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Splits `edge` so that its label becomes `label[..at]` with a single child
/// edge carrying `label[at..]` and the original subtree.
fn split_edge(edge: &mut Edge, at: usize) {
    let tail: Box<[u8]> = edge.label[at..].into();
    let head: Box<[u8]> = edge.label[..at].into();
    let old_child = std::mem::replace(&mut edge.child, Node::empty());
    edge.child.edges.push(Edge {
        label: tail,
        child: old_child,
    });
    edge.label = head;
}
