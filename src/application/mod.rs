// Application layer - use cases and orchestration.
// Every client (CLI, importers, tests) goes through CashBoxService.

pub mod error;
pub mod service;

pub use error::*;
pub use service::*;
