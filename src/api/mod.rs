//! REST helpers for the backend that issues tokens and serves test data.

pub mod client;
pub mod dto;

pub use client::ApiClient;
pub use dto::ApiResponse;
