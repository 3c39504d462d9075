// Import and export of cash box data (CSV and JSON)

pub mod export;
pub mod import;

pub use export::*;
pub use import::*;
