//! Semantic versioning
//!
//! Version parsing and ordering ([`Version`]) plus range expressions that
//! compile down to conjunctions of primitive comparisons ([`Range`]).

mod range;
mod version;

pub use range::{Constraint, Op, Range};
pub use version::{Identifier, Version};

use thiserror::Error;

/// Errors that can occur during semver parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SemverError {
    /// Invalid version format
    #[error("Invalid version format: {0}")]
    InvalidVersion(String),

    /// Invalid pre-release identifier
    #[error("Invalid pre-release identifier in '{version}': {identifier:?}")]
    InvalidPrerelease { version: String, identifier: String },

    /// Invalid range expression
    #[error("Invalid range expression '{range}': {reason}")]
    InvalidRange { range: String, reason: String },
}
