pub mod batch;
pub mod errors;
pub mod types;

// Re-export main interfaces
pub use batch::{BacktestService, OptimizeGrid};
pub use errors::ServiceError;
pub use types::*;
