pub mod config;
pub mod domain;
pub mod errors;
pub mod workspace;

pub use domain::column::format_column_value;
pub use domain::memory::{Conversation, MemorySnapshot, RecentCreation, StoredResource};
pub use domain::plan::{Operation, Plan, PlanAction, ResourceType};
pub use domain::report::{AgentStep, ExecutionReport, ResourceRecord};
pub use errors::{ApplicationError, DomainError};
pub use workspace::{ApiError, InMemoryWorkspace, ResourceApi};
