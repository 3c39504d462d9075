mod repository;

pub use repository::*;

/// SQL migration for registries, cash boxes, entries and advances
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");
