//! harp-environment: environment records for the Harp platform.
//!
//! Sled-backed storage of named environments, exposed over an Axum REST API.
//! Changes are announced on the environment update topic, and the
//! create-organization workflow provisions an environment, a default scenario
//! and an invited user across the sibling services.

pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod organization;
pub mod publisher;
// REST API module: Axum HTTP handlers under /api/v1/environments
pub mod rest;
pub mod schema;
pub mod storage;

pub use error::{EnvironmentError, Result};
