//! # Quill Core
//!
//! The domain layer of the Quill blog backend.
//! Entities, errors and the ports that infrastructure adapters implement.
//! No database, HTTP or crypto dependencies live here.

pub mod domain;
pub mod error;
pub mod ports;

pub use error::{DomainError, RepoError};
