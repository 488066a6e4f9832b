pub mod config;
pub mod cut;
pub mod error;
pub mod event;
pub mod graph;
pub mod stage;
pub mod tensor;

pub use error::GraphError;
