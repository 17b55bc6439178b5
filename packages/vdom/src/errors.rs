use crate::address::Address;
use crate::tree::NodeId;
use thiserror::Error;

/// Address resolution failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("address {0} did not resolve to a node")]
    NotFound(Address),

    #[error("path segment {segment} of {path:?} is out of range ({len} significant children)")]
    PathOutOfRange {
        path: Vec<usize>,
        segment: usize,
        len: usize,
    },
}

/// Failure of a single tree mutation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("child index {index} out of range for parent with {len} children")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("node {0:?} is not an element")]
    NotAnElement(NodeId),

    #[error("node {0:?} is not live")]
    Detached(NodeId),

    #[error("refusing unsafe attribute key {0:?}")]
    UnsafeKey(String),

    #[error("the view root cannot be replaced or removed")]
    RootImmutable,
}

/// Markup that does not describe a view.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarkupError {
    #[error("markup contains no element")]
    NoElement,
}
