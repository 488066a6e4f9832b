// Shared error type for IR-level failures.

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("tensor error: {0}")]
    Tensor(String),

    #[error("graph error: {0}")]
    Graph(String),

    #[error("configuration error: {0}")]
    Config(String),
}
