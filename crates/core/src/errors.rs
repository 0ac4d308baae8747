use thiserror::Error;

use crate::domain::plan::{Operation, ResourceType};
use crate::workspace::ApiError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("Unsupported resource type: {0}")]
    UnsupportedResourceType(ResourceType),
    #[error("Unsupported {resource_type} operation: {operation}")]
    UnsupportedOperation { resource_type: ResourceType, operation: Operation },
    #[error("{resource_type} {operation} requires attribute `{attribute}`")]
    MissingAttribute { resource_type: ResourceType, operation: Operation, attribute: &'static str },
    #[error("invalid {column_type} column value: {reason}")]
    InvalidColumnValue { column_type: String, reason: String },
}

impl DomainError {
    /// True when no handler exists for the plan, as opposed to a plan that
    /// names a supported action but is missing data.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedResourceType(_) | Self::UnsupportedOperation { .. })
    }
}

/// Failure while carrying out a plan: either the plan itself is unusable
/// or the workspace rejected a call.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Remote(#[from] ApiError),
}
