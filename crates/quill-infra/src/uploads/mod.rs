//! Cover upload storage.

mod local;

pub use local::{LocalCoverStore, cover_extension};
