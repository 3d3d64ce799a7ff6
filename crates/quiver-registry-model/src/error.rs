// SPDX-License-Identifier: Apache-2.0

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub kind: &'static str,
    pub value: String,
    pub reason: &'static str,
}

impl ValidationError {
    #[must_use]
    pub fn new(kind: &'static str, value: impl Into<String>, reason: &'static str) -> Self {
        Self {
            kind,
            value: value.into(),
            reason,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {} `{}`: {}", self.kind, self.value, self.reason)
    }
}

impl std::error::Error for ValidationError {}
