use serde::{Deserialize, Serialize};
use std::fmt;

/// Abstract patch target: a stable id (preferred) and/or a structural path
/// of significant-child indices from the view root (fallback).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub path: Vec<usize>,
}

impl Address {
    pub fn new(id: Option<String>, path: Vec<usize>) -> Self {
        Self { id, path }
    }

    pub fn id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            path: Vec::new(),
        }
    }

    pub fn path(path: impl Into<Vec<usize>>) -> Self {
        Self {
            id: None,
            path: path.into(),
        }
    }

    pub fn root() -> Self {
        Self::default()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "#{}@{:?}", id, self.path),
            None => write!(f, "{:?}", self.path),
        }
    }
}
