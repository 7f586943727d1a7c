//! # CC Test Utilities
//!
//! Shared test utilities for the Conference Controller.
//!
//! This crate provides:
//! - Server test harness (`TestConferenceServer`, backed by the in-memory
//!   media platform)
//! - Eventual consistency helpers for asynchronous fan-out
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cc_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let server = TestConferenceServer::spawn().await?;
//!
//!     let response = server
//!         .client()
//!         .post(format!("{}/v1/conferences/river-otter/participants", server.url()))
//!         .json(&serde_json::json!({}))
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod eventual;
pub mod server_harness;

// Re-export commonly used items
pub use eventual::{assert_eventually, ConsistencyCategory};
pub use server_harness::*;
