//! Remote record store
//!
//! Pack metadata, publish keys and users live in a hierarchical key/value
//! store addressed by `/`-separated paths (a Firebase-style realtime
//! database). bitpack only talks to it through the [`RecordStore`] trait:
//!
//! - [`RecordPath`] builds paths from raw segments, escaping characters the
//!   backend forbids in keys
//! - [`MultiUpdate`] builds atomic multi-path updates
//! - [`records`] holds the typed records stored at each path
//! - [`RecordManager`] maps pack/user operations onto paths and records
//! - [`rest`] is the default HTTP implementation
//!
//! # Path layout
//!
//! ```text
//! packs/<type>/<class>/<scope>/<name>/info
//! packs/<type>/<class>/<scope>/<name>/collaborators/<userId>
//! packs/<type>/<class>/<scope>/<name>/versions/<version>
//! packs/<type>/<class>/<scope>/<name>/versionsInfo
//! publishKeys/<key>
//! users/<userId>
//! indexes/usernameToUserId/<username>
//! indexes/emailToUserId/<email>
//! ```

pub mod records;
mod registry;
pub mod rest;

pub use registry::{PackRef, RecordManager};

use crate::context::ContextChain;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;

/// Characters that may not appear in a key, and their escaped forms.
///
/// `(` opens every escape, so it is escaped too.
const ESCAPES: &[(char, &str)] = &[
    ('(', "(OP)"),
    ('.', "(P)"),
    ('@', "(A)"),
    ('!', "(B)"),
    ('#', "(H)"),
    ('$', "(D)"),
    ('%', "(PR)"),
    ('&', "(AN)"),
    ('\'', "(SQ)"),
    ('*', "(ST)"),
    ('+', "(PL)"),
    ('/', "(FS)"),
    ('=', "(E)"),
    ('?', "(Q)"),
    ('^', "(C)"),
    ('`', "(G)"),
    ('{', "(OC)"),
    ('|', "(PI)"),
    ('}', "(CC)"),
];

/// Escape a single path segment.
pub fn escape_path_part(part: &str) -> String {
    let mut escaped = String::with_capacity(part.len());
    for c in part.chars() {
        match ESCAPES.iter().find(|(raw, _)| *raw == c) {
            Some((_, replacement)) => escaped.push_str(replacement),
            None => escaped.push(c),
        }
    }
    escaped
}

/// Reverse [`escape_path_part`].
pub fn unescape_path_part(part: &str) -> String {
    let mut unescaped = String::with_capacity(part.len());
    let mut rest = part;
    'outer: while let Some(c) = rest.chars().next() {
        if c == '(' {
            for (raw, replacement) in ESCAPES {
                if let Some(tail) = rest.strip_prefix(replacement) {
                    unescaped.push(*raw);
                    rest = tail;
                    continue 'outer;
                }
            }
        }
        unescaped.push(c);
        rest = &rest[c.len_utf8()..];
    }
    unescaped
}

/// An escaped path into the record store. The empty path is the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RecordPath {
    segments: Vec<String>,
}

impl RecordPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a path from raw (unescaped) segments.
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            segments: parts.into_iter().map(|p| escape_path_part(p.as_ref())).collect(),
        }
    }

    pub fn child(&self, part: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(escape_path_part(part));
        Self {
            segments,
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// The raw last segment, if any.
    pub fn key(&self) -> Option<String> {
        self.segments.last().map(|s| unescape_path_part(s))
    }
}

impl fmt::Display for RecordPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

/// Builder for an atomic multi-path update.
///
/// Keys of the built map are escaped paths relative to the location the
/// update is applied at; a `null` value removes that path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiUpdate {
    updates: Map<String, Value>,
}

impl MultiUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<S: AsRef<str>>(mut self, parts: &[S], value: impl Into<Value>) -> Self {
        self.updates.insert(RecordPath::new(parts).to_string(), value.into());
        self
    }

    pub fn remove<S: AsRef<str>>(self, parts: &[S]) -> Self {
        self.set(parts, Value::Null)
    }

    /// Set each field of an object individually, leaving siblings untouched.
    pub fn update<S: AsRef<str>>(mut self, parts: &[S], value: Value) -> Self {
        match value {
            Value::Object(fields) => {
                let base = RecordPath::new(parts);
                for (key, field) in fields {
                    self.updates.insert(base.child(&key).to_string(), field);
                }
                self
            }
            other => self.set(parts, other),
        }
    }

    pub fn build(self) -> Map<String, Value> {
        self.updates
    }
}

/// Hierarchical JSON record store.
///
/// Every call receives the operation's [`ContextChain`] so implementations
/// can pick the backend (firebase context) and credentials (user context).
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// The value at `path`, or `None` if nothing is stored there.
    async fn get(&self, chain: &ContextChain, path: &RecordPath) -> Result<Option<Value>>;

    /// Replace the value at `path`.
    async fn set(&self, chain: &ContextChain, path: &RecordPath, value: Value) -> Result<()>;

    /// Apply a [`MultiUpdate`] relative to `path`.
    async fn update(&self, chain: &ContextChain, path: &RecordPath, updates: Map<String, Value>) -> Result<()>;

    /// Remove the value at `path`.
    async fn delete(&self, chain: &ContextChain, path: &RecordPath) -> Result<()>;
}
