//! Synchronization namespaces.
//!
//! A namespace is either a bare device identifier (solo mode) or a shared
//! household identifier. It travels as a single URL path segment, so the
//! accepted alphabet excludes `/` and control characters.

use std::fmt;

use anyhow::{Result, bail};
use serde::Serialize;

pub const MAX_NAMESPACE_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    /// Validate a namespace exactly as given. No case folding is applied.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            bail!("Namespace must not be empty");
        }
        if raw.chars().count() > MAX_NAMESPACE_LEN {
            bail!("Namespace must be at most {MAX_NAMESPACE_LEN} characters");
        }
        if raw.trim() != raw {
            bail!("Namespace must not start or end with whitespace");
        }
        if let Some(c) = raw.chars().find(|c| c.is_control() || *c == '/') {
            bail!("Namespace contains invalid character {c:?}");
        }
        Ok(Self(raw.to_string()))
    }

    /// Normalize a user-entered household identifier: trimmed, uppercased.
    pub fn household(raw: &str) -> Result<Self> {
        Self::parse(&raw.trim().to_uppercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
