use crate::error::{AssemblyError, Result};
use serde::Serialize;
use std::fmt;

const MAX_LEN: usize = 128;

/// Client-chosen session identifier, safe to use as a single path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(AssemblyError::InvalidSession("missing streamId".to_string()));
        }
        if raw.len() > MAX_LEN {
            return Err(AssemblyError::InvalidSession(format!(
                "streamId longer than {} bytes",
                MAX_LEN
            )));
        }
        // Leading dot rules out ".", ".." and hidden names
        if raw.starts_with('.') {
            return Err(AssemblyError::InvalidSession(raw.to_string()));
        }
        let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.');
        if !raw.chars().all(allowed) {
            return Err(AssemblyError::InvalidSession(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
