//! Cache key definitions.
//!
//! `AssetFile` names a file a rendered resource was built from; `ResourceHash`
//! names one rendered variant of a resource.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::conneg::MediaWriter;

/// A file that rendered output depends on, identified by its path relative to
/// the asset root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetFile(String);

impl AssetFile {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetFile {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Opaque key of one rendered resource variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceHash(String);

impl ResourceHash {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Derive the key for a request against a route.
    ///
    /// The negotiated writer is part of the key so that html and plain-text
    /// renderings of the same path are cached separately.
    pub fn for_request(route: &str, path: &str, query: &str, writer: MediaWriter) -> Self {
        let mut hasher = DefaultHasher::new();
        route.hash(&mut hasher);
        path.hash(&mut hasher);
        query.hash(&mut hasher);
        writer.hash(&mut hasher);
        Self(format!("{:016x}", hasher.finish()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceHash {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
