#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

//! Shared types for the relay gateway
//!
//! Holds the request identity model and the `HttpError` trait so that
//! feature crates stay decoupled from the HTTP framework.

mod error;
mod identity;

pub use error::HttpError;
pub use identity::{DEMO_ROLE, DEMO_TENANT, Identity};
