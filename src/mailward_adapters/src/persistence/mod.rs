pub mod memory_directory;
pub mod postgres_directory;
