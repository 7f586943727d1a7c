//! Common types shared across the conference controller workspace.

#![warn(clippy::pedantic)]

/// Identifier and permission types shared by the service and its test utilities
pub mod types;

/// Secret types that prevent accidental logging of platform credentials
pub mod secret;
