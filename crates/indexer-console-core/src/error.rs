use thiserror::Error;

/// Input rejected on the client before any request is sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Missing { field: &'static str },

    #[error("{field} must be a number, got '{value}'")]
    NotNumeric { field: &'static str, value: String },

    #[error("invalid date/time '{0}', expected YYYY-MM-DDTHH:MM")]
    BadDateTime(String),

    #[error("unknown indexer type '{0}'")]
    UnknownType(String),

    #[error("unknown status '{0}'")]
    UnknownStatus(String),

    #[error("page size {0} is not one of 15, 50, 100, 200")]
    PageSize(u32),
}
