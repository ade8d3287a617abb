// Application layer - use cases and orchestration over a repository.

mod audit;
pub mod error;
mod service;

pub use audit::*;
pub use error::*;
pub use service::*;
