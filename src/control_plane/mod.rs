//! Hosting control plane integration (status and redeploy).

pub mod koyeb;

pub use koyeb::{KoyebClient, RedeployOutcome, ServiceStatus};
