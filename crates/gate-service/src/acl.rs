//! Consumer access list.
//!
//! Maps a consumer label to the method patterns it may call. Built once at
//! startup from a JSON object and never mutated afterwards, so lookups need
//! no locking.

use std::collections::HashMap;
use thiserror::Error;

/// Marker terminating a prefix pattern.
pub const WILDCARD: char = '*';

#[derive(Debug, Error)]
pub enum AclError {
    #[error("malformed access list: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Immutable consumer → method-pattern mapping.
#[derive(Debug, Clone, Default)]
pub struct AccessList {
    rules: HashMap<String, Vec<String>>,
}

impl AccessList {
    /// Parse an access list from a JSON object of
    /// `{"consumer": ["/pkg.Service/Method", "/pkg.Service/*"]}`.
    pub fn load(payload: &str) -> Result<Self, AclError> {
        let rules: HashMap<String, Vec<String>> = serde_json::from_str(payload)?;
        Ok(Self { rules })
    }

    /// Whether `consumer` may call the fully-qualified `method`.
    ///
    /// Any wildcard-terminated pattern grants every method to that consumer,
    /// whatever text precedes the wildcard.
    pub fn is_allowed(&self, consumer: &str, method: &str) -> bool {
        let Some(patterns) = self.rules.get(consumer) else {
            return false;
        };

        patterns
            .iter()
            .any(|pattern| pattern.ends_with(WILDCARD) || pattern == method)
    }

    /// Consumer labels present in the list, in no particular order.
    pub fn consumers(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
