/// Database model definitions.
pub mod models;
/// Stats storage and retrieval operations.
pub mod stats_store;
/// Storage abstraction layer for database operations.
pub mod storage;
