//! Persistence layer: the sqlite-backed catalog and its data model.

pub mod data;
pub mod library;
pub mod settings;
