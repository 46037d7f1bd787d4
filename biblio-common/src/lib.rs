//! # Biblio Common Library
//!
//! Shared code for the bibliographic harvesting services:
//! - Error type and result alias
//! - TOML configuration and root folder resolution
//! - SQLite database initialization
//! - Time helpers

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
