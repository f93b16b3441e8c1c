use thiserror::Error;

use crate::column::ColId;

pub type OptResult<T> = anyhow::Result<T>;

/// Recoverable failures raised by the optimizer core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptError {
    #[error("optimization cancelled")]
    Cancelled,
    #[error("no plan found for group {group} with required property {required}")]
    NoPlanFound { group: usize, required: String },
    #[error("column {column} has no mapping")]
    UnmappedColumn { column: ColId },
    #[error("best expression of search stage already set")]
    StageAlreadyCompleted,
}
