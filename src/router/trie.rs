//! Character trie for HTTP path matching
//!
//! Each HTTP method owns one [`Tree`]. Patterns are decomposed into single characters plus
//! named captures written as `:name`; a capture occupies one dynamic edge that swallows
//! everything up to the next `/`.
//!
//! ## Edges
//!
//! Edges are a tagged [`Edge`] value rather than a sentinel character, so a literal `:`
//! in a request path can never be mistaken for a capture marker.
//!
//! ## Conflicts
//!
//! A node may have literal children or one capture child, never both. Inserting a literal
//! where a capture already sits (or a capture where literals already sit) fails with
//! [`TrieError::Conflict`], naming the existing prefix rebuilt from parent links:
//!
//! ```rust
//! use triemux::router::{Tree, TrieError};
//!
//! let mut tree = Tree::new(false);
//! tree.add("/a/:id", 1).unwrap();
//! let err = tree.add("/a/b", 2).unwrap_err();
//! assert!(matches!(err, TrieError::Conflict { ref existing, .. } if existing == "/a/:id"));
//! ```
//!
//! ## Matching
//!
//! Search walks one character at a time. On a literal miss it falls back to the capture
//! child if one exists. There is no backtracking across siblings and no regex evaluation:
//! a search is O(path length), an insert O(pattern length).
//!
//! Trees are built during startup and read concurrently afterwards. Nothing guards
//! against mutation while requests are being served; that ordering is the caller's job.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::params::ParamSink;

const ROOT: usize = 0;
const SEPARATOR: char = '/';

/// Incoming edge of a trie node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edge {
    /// A single literal character (already case-folded unless the tree is strict).
    Literal(char),
    /// A named capture matching up to the next separator.
    Capture(Arc<str>),
}

/// Error raised while inserting a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrieError {
    /// The pattern was the empty string.
    EmptyPattern,
    /// The pattern could not be decomposed into literals and captures.
    MalformedPattern {
        /// The offending pattern
        pattern: String,
        /// Byte offset of the problem
        position: usize,
        /// What is wrong at that offset
        reason: &'static str,
    },
    /// The pattern mixes a literal and a capture edge at the same trie position.
    Conflict {
        /// Prefix of the already-registered edge that blocks the insert
        existing: String,
        /// The pattern being inserted
        pattern: String,
    },
    /// The exact pattern already carries data.
    Duplicate {
        /// The pattern being inserted
        pattern: String,
    },
}

impl fmt::Display for TrieError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrieError::EmptyPattern => write!(f, "path pattern must not be empty"),
            TrieError::MalformedPattern {
                pattern,
                position,
                reason,
            } => write!(
                f,
                "malformed path pattern '{pattern}' at byte {position}: {reason}"
            ),
            TrieError::Conflict { existing, pattern } => {
                write!(f, "path conflict: '{pattern}' collides with '{existing}'")
            }
            TrieError::Duplicate { pattern } => {
                write!(f, "path pattern '{pattern}' is already registered")
            }
        }
    }
}

impl std::error::Error for TrieError {}

#[derive(Debug, Clone)]
struct Node<T> {
    parent: Option<usize>,
    edge: Option<Edge>,
    literals: HashMap<char, usize>,
    capture: Option<usize>,
    data: Option<T>,
}

impl<T> Node<T> {
    fn new(parent: Option<usize>, edge: Option<Edge>) -> Self {
        Self {
            parent,
            edge,
            literals: HashMap::new(),
            capture: None,
            data: None,
        }
    }
}

/// Per-method character trie mapping path patterns to route data.
///
/// Nodes live in an arena owned by the tree; children and parents are arena indices.
#[derive(Debug, Clone)]
pub struct Tree<T> {
    nodes: Vec<Node<T>>,
    strict: bool,
    len: usize,
}

impl<T> Tree<T> {
    /// Create an empty tree. With `strict == false` both patterns and lookup paths are
    /// case-folded before comparison.
    #[must_use]
    pub fn new(strict: bool) -> Self {
        Self {
            nodes: vec![Node::new(None, None)],
            strict,
            len: 0,
        }
    }

    /// Whether literal comparison is case-sensitive.
    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Number of patterns carrying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert `pattern` and attach `data` to its terminal node.
    ///
    /// Shared prefixes merge into one path. A failed insert leaves the tree unchanged.
    pub fn add(&mut self, pattern: &str, data: T) -> Result<(), TrieError> {
        let edges = parse_pattern(pattern, self.strict)?;
        let (mut current, consumed) = self.locate(&edges, pattern)?;
        for edge in edges.into_iter().skip(consumed) {
            current = self.push_child(current, edge);
        }

        let terminal = &mut self.nodes[current];
        if terminal.data.is_some() {
            return Err(TrieError::Duplicate {
                pattern: pattern.to_string(),
            });
        }
        terminal.data = Some(data);
        self.len += 1;
        Ok(())
    }

    /// Report the error [`add`](Tree::add) would return for `pattern`, without
    /// modifying the tree.
    pub fn check(&self, pattern: &str) -> Result<(), TrieError> {
        let edges = parse_pattern(pattern, self.strict)?;
        let (node, consumed) = self.locate(&edges, pattern)?;
        if consumed == edges.len() && self.nodes[node].data.is_some() {
            return Err(TrieError::Duplicate {
                pattern: pattern.to_string(),
            });
        }
        Ok(())
    }

    // Walk the already-present prefix of `edges`, returning the deepest existing node and
    // the number of edges consumed. Conflicts can only surface on this walk: every node
    // created after it starts out empty.
    fn locate(&self, edges: &[Edge], pattern: &str) -> Result<(usize, usize), TrieError> {
        let mut current = ROOT;
        for (consumed, edge) in edges.iter().enumerate() {
            let node = &self.nodes[current];
            current = match edge {
                Edge::Literal(c) => match (node.literals.get(c), node.capture) {
                    (Some(&child), _) => child,
                    (None, Some(capture)) => return Err(self.conflict(capture, pattern)),
                    (None, None) => return Ok((current, consumed)),
                },
                Edge::Capture(name) => match node.capture {
                    Some(capture) => match &self.nodes[capture].edge {
                        Some(Edge::Capture(existing)) if existing == name => capture,
                        _ => return Err(self.conflict(capture, pattern)),
                    },
                    None => match self.first_literal(current) {
                        Some(literal) => return Err(self.conflict(literal, pattern)),
                        None => return Ok((current, consumed)),
                    },
                },
            };
        }
        Ok((current, edges.len()))
    }

    /// Look up `path`, writing every capture into `sink`.
    ///
    /// Returns `None` when a character has neither a literal nor a capture edge, when a
    /// capture would be empty, or when the path ends on a node without data. Captures
    /// recorded before a miss stay in `sink`.
    pub fn search<S>(&self, path: &str, sink: &mut S) -> Option<&T>
    where
        S: ParamSink + ?Sized,
    {
        let mut current = ROOT;
        let mut offset = 0;

        while let Some(c) = path[offset..].chars().next() {
            if let Some(next) = self.step(current, c) {
                current = next;
                offset += c.len_utf8();
                continue;
            }

            let capture = self.nodes[current].capture?;
            let end = path[offset..]
                .find(SEPARATOR)
                .map_or(path.len(), |rel| offset + rel);
            if end == offset {
                return None;
            }
            if let Some(Edge::Capture(name)) = &self.nodes[capture].edge {
                sink.set(name, &path[offset..end]);
            }
            current = capture;
            offset = end;
        }

        self.nodes[current].data.as_ref()
    }

    fn step(&self, from: usize, c: char) -> Option<usize> {
        if self.strict {
            return self.nodes[from].literals.get(&c).copied();
        }
        let mut current = from;
        for folded in c.to_lowercase() {
            current = *self.nodes[current].literals.get(&folded)?;
        }
        Some(current)
    }

    fn push_child(&mut self, parent: usize, edge: Edge) -> usize {
        let index = self.nodes.len();
        match &edge {
            Edge::Literal(c) => {
                self.nodes[parent].literals.insert(*c, index);
            }
            Edge::Capture(_) => self.nodes[parent].capture = Some(index),
        }
        self.nodes.push(Node::new(Some(parent), Some(edge)));
        index
    }

    // Lowest character wins so conflict messages do not depend on hash order.
    fn first_literal(&self, node: usize) -> Option<usize> {
        self.nodes[node]
            .literals
            .iter()
            .min_by_key(|(c, _)| **c)
            .map(|(_, &index)| index)
    }

    fn conflict(&self, existing: usize, pattern: &str) -> TrieError {
        TrieError::Conflict {
            existing: self.prefix_of(existing),
            pattern: pattern.to_string(),
        }
    }

    fn prefix_of(&self, mut index: usize) -> String {
        let mut parts: Vec<String> = Vec::new();
        while let Some(parent) = self.nodes[index].parent {
            match &self.nodes[index].edge {
                Some(Edge::Literal(c)) => parts.push(c.to_string()),
                Some(Edge::Capture(name)) => parts.push(format!(":{name}")),
                None => {}
            }
            index = parent;
        }
        parts.reverse();
        parts.concat()
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

fn parse_pattern(pattern: &str, strict: bool) -> Result<Vec<Edge>, TrieError> {
    let malformed = |position: usize, reason: &'static str| TrieError::MalformedPattern {
        pattern: pattern.to_string(),
        position,
        reason,
    };

    if pattern.is_empty() {
        return Err(TrieError::EmptyPattern);
    }

    let mut edges = Vec::with_capacity(pattern.len());
    let mut chars = pattern.char_indices().peekable();

    while let Some((position, c)) = chars.next() {
        if c != ':' {
            if matches!(edges.last(), Some(Edge::Capture(_))) && c != SEPARATOR {
                return Err(malformed(position, "a capture must end at '/'"));
            }
            if strict {
                edges.push(Edge::Literal(c));
            } else {
                edges.extend(c.to_lowercase().map(Edge::Literal));
            }
            continue;
        }

        let start = position + 1;
        let mut end = start;
        while let Some(&(i, n)) = chars.peek() {
            if !is_name_char(n) {
                break;
            }
            end = i + n.len_utf8();
            chars.next();
        }
        if end == start {
            return Err(malformed(position, "capture marker without a name"));
        }
        if matches!(edges.last(), Some(Edge::Capture(_))) {
            return Err(malformed(position, "adjacent captures"));
        }
        edges.push(Edge::Capture(Arc::from(&pattern[start..end])));
    }

    Ok(edges)
}
