#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("missing required field '{field}'")]
    MissingField { field: &'static str },
    #[error("field '{field}' must not be empty")]
    EmptyField { field: &'static str },
    #[error("invalid document: {message}")]
    InvalidDocument { message: String },
}
