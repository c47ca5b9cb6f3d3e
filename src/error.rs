use thiserror::Error;

/// Failure of the remote-shell seam. The payload is the underlying cause and
/// is shown to the candidate unchanged.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("{0}")]
    Connect(String),

    #[error("{0}")]
    Command(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpecError {
    #[error("test spec is missing `{0}`")]
    MissingField(String),
}
