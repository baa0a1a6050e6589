//! Conflict-of-interest detection for law-firm case records.

pub mod audit;
pub mod config;
pub mod conflicts;
pub mod db;
pub mod error;
pub mod settings;
