//! # Quill Shared
//!
//! Wire types shared between the API server and its clients.
//! Kept free of server-side dependencies so a frontend can reuse it.

pub mod dto;
pub mod response;

pub use response::{ApiResponse, ErrorResponse};
