// REST client for the league-draw service.

pub mod client;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use client::{DrawApi, HttpDrawApi};
pub use error::ApiError;
