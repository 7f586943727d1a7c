//! Identifier types for conferences, participants and media streams.
//!
//! All identifiers except join codes and slugs are issued by the external
//! media platform and are opaque to the controller, so they wrap `String`
//! rather than `Uuid`.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a platform-issued identifier.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw identifier.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

opaque_id!(
    /// Platform session identifier (one per live conference).
    SessionId
);

opaque_id!(
    /// Platform participant identifier.
    ParticipantId
);

opaque_id!(
    /// Identifier of one published media stream.
    StreamId
);

/// Media a participant is allowed to publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublishPermission {
    Audio,
    Video,
}

/// How a participant reaches the conference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinMode {
    /// Browser client (audio + video).
    Web,
    /// Telephone caller bridged in by the voice leg (audio only).
    Phone,
}

impl JoinMode {
    /// Publish permissions requested from the platform for this mode.
    #[must_use]
    pub fn publish_permissions(self) -> &'static [PublishPermission] {
        match self {
            JoinMode::Web => &[PublishPermission::Audio, PublishPermission::Video],
            JoinMode::Phone => &[PublishPermission::Audio],
        }
    }

    /// Returns the mode as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            JoinMode::Web => "web",
            JoinMode::Phone => "phone",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_serialize_transparently() {
        let id = SessionId::new("sess-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"sess-1\"");

        let parsed: ParticipantId = serde_json::from_str("\"p-9\"").unwrap();
        assert_eq!(parsed.as_str(), "p-9");
    }

    #[test]
    fn test_publish_permission_wire_format() {
        let json = serde_json::to_string(&[PublishPermission::Audio, PublishPermission::Video])
            .unwrap();
        assert_eq!(json, r#"["AUDIO","VIDEO"]"#);
    }

    #[test]
    fn test_phone_mode_is_audio_only() {
        assert_eq!(
            JoinMode::Phone.publish_permissions(),
            &[PublishPermission::Audio]
        );
        assert_eq!(JoinMode::Web.publish_permissions().len(), 2);
    }
}
