//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used for media platform credentials and
//! device tokens. `SecretString` implements `Debug` with redaction, so a struct
//! that derives `Debug` and holds one is safe to log through `{:?}` or
//! `tracing` fields.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct PlatformCredentials {
//!     username: String,
//!     password: SecretString,
//! }
//!
//! let creds = PlatformCredentials {
//!     username: "api-user".to_string(),
//!     password: SecretString::from("hunter2"),
//! };
//!
//! assert!(!format!("{creds:?}").contains("hunter2"));
//! assert_eq!(creds.password.expose_secret(), "hunter2");
//! ```
//!
//! Use `SecretString` for platform passwords and for device tokens handed
//! back to clients; call `expose_secret()` only at the point where the raw
//! value leaves the process (HTTP auth header, response body).

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("hunter2");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("hunter2"));
    }

    #[test]
    fn test_struct_with_secret_is_safe() {
        #[allow(dead_code)]
        #[derive(Debug)]
        struct PlatformCredentials {
            account_id: String,
            password: SecretString,
        }

        let creds = PlatformCredentials {
            account_id: "acct-42".to_string(),
            password: SecretString::from("super-secret"),
        };

        let debug_str = format!("{creds:?}");

        assert!(debug_str.contains("acct-42"));
        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("super-secret"));
    }

    #[test]
    fn test_deserialize_device_token() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct ParticipantGrant {
            participant_id: String,
            token: SecretString,
        }

        let json = r#"{"participant_id": "p-1", "token": "eyJhbGciOi"}"#;
        let grant: ParticipantGrant = serde_json::from_str(json).expect("deserialize");

        assert_eq!(grant.token.expose_secret(), "eyJhbGciOi");
        assert!(!format!("{grant:?}").contains("eyJhbGciOi"));
    }
}
