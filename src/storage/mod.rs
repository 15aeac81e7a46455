// src/storage/mod.rs
pub mod data_storage;

pub use data_storage::{DataStorage, OutputFiles};
