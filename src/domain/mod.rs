//! Domain layer containing core business types, traits, and error definitions.

pub mod error;
pub mod filters;
pub mod manifest;
pub mod model;
pub mod traits;
pub mod types;

pub use error::{
    AppError, ConfigError, DatabaseError, ExternalServiceError, ManifestError, ValidationError,
};
pub use filters::{Filter, SortOrder};
pub use manifest::{Manifest, ManifestIssue, PackageManager, Requirement, Severity};
pub use model::{AuditColumns, ConstraintKind, Model, SqlValue};
pub use traits::{DatabaseClient, Notifier, Repository};
pub use types::{ErrorDetail, ErrorResponse, HealthResponse, HealthStatus};
