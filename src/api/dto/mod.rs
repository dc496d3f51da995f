//! Data Transfer Objects for REST request/response serialization.
//!
//! Reconciled rows are returned as-is; the types here are request bodies,
//! query parameters and the few views the API enriches.

pub mod command_dto;
pub mod common_dto;
pub mod playlist_dto;
pub mod telemetry_dto;

pub use command_dto::*;
pub use common_dto::*;
pub use playlist_dto::*;
pub use telemetry_dto::*;
