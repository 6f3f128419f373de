//! HTTP surface of the portal.
//!
//! Exposes the configuration endpoints, the session lifecycle and the record
//! lists as JSON, plus the redirect target the identity provider returns to.

mod handlers;
mod server;
pub mod views;

pub use server::{router, serve};
