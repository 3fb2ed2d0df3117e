//! Slash-separated locations in the store tree.

use std::fmt;

use beacon_common::{RecordId, StoreError};

/// Characters the store refuses inside a key.
const RESERVED: &[char] = &['.', '#', '$', '[', ']', '/'];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Split on `/`, ignoring empty segments.
    pub fn parse(s: &str) -> Self {
        Self {
            segments: s
                .split('/')
                .filter(|seg| !seg.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn child(&self, segment: impl AsRef<str>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.as_ref().to_string());
        Self { segments }
    }

    pub fn record(&self, id: &RecordId) -> Self {
        self.child(id.as_str())
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.segments.split_last()?;
        Some(Self {
            segments: rest.to_vec(),
        })
    }

    /// Last segment, `None` at the root.
    pub fn key(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn starts_with(&self, prefix: &StorePath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        for seg in &self.segments {
            if seg.is_empty() || seg.contains(RESERVED) || seg.chars().any(char::is_control) {
                return Err(StoreError::InvalidPath(format!("{self} (bad key {seg:?})")));
            }
        }
        Ok(())
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for seg in &self.segments {
            write!(f, "/{seg}")?;
        }
        Ok(())
    }
}
