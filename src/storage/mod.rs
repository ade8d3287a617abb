mod config;
mod file;
mod repository;
mod snapshot;

pub use config::*;
pub use file::*;
pub use repository::{AccountRepository, InMemoryRepository};
pub use snapshot::*;
