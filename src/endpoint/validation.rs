//! Boundary checks on a desired-state submission.
//!
//! # Design Decisions
//! - Returns all errors, not just the first
//! - Runs before the engine diffs anything, so a rejected set has no effect

use std::collections::HashSet;

use thiserror::Error;

use crate::endpoint::Endpoint;

/// A malformed desired-state submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DesiredStateError {
    #[error("endpoint name `{0}` appears more than once")]
    DuplicateName(String),

    #[error("endpoint at position {0} has an empty name")]
    EmptyName(usize),
}

/// Check that endpoint names are present and unique.
pub fn validate_desired(desired: &[Endpoint]) -> Result<(), Vec<DesiredStateError>> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();

    for (index, endpoint) in desired.iter().enumerate() {
        if endpoint.name.is_empty() {
            errors.push(DesiredStateError::EmptyName(index));
            continue;
        }
        if !seen.insert(endpoint.name.as_str()) && reported.insert(endpoint.name.as_str()) {
            errors.push(DesiredStateError::DuplicateName(endpoint.name.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
