pub mod memory_handler;
pub mod postgres_handler;
