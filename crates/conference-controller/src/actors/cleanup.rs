//! Participant cleanup timers.
//!
//! Every admitted participant gets a safety-net timer. If the platform never
//! reports the participant leaving, the timer removes it so the session can
//! still empty out and be torn down.
//!
//! A timer is a spawned task racing `sleep` against a child
//! `CancellationToken`. On expiry it posts `ExpireParticipant` to its
//! conference actor through a weak sender, so a pending timer never keeps a
//! finished actor's mailbox alive.

use super::messages::ConferenceMessage;
use crate::observability::metrics;
use common::types::ParticipantId;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Handle to an armed cleanup timer. Dropping the handle disarms the timer.
#[derive(Debug)]
pub struct CleanupTimer {
    token: CancellationToken,
}

impl CleanupTimer {
    /// Arm a timer that expires `participant_id` after `after`.
    ///
    /// Cancelling `parent` (conference shutdown) disarms the timer too.
    pub fn arm(
        participant_id: ParticipantId,
        after: Duration,
        conference: mpsc::WeakSender<ConferenceMessage>,
        parent: &CancellationToken,
    ) -> Self {
        let token = parent.child_token();
        let task_token = token.clone();

        tokio::spawn(async move {
            tokio::select! {
                () = task_token.cancelled() => {
                    debug!(
                        target: "cc.actor.cleanup",
                        participant_id = %participant_id,
                        "Cleanup timer disarmed"
                    );
                }
                () = tokio::time::sleep(after) => {
                    metrics::record_cleanup_timer_fired();
                    debug!(
                        target: "cc.actor.cleanup",
                        participant_id = %participant_id,
                        after_secs = after.as_secs(),
                        "Cleanup timer fired"
                    );
                    if let Some(sender) = conference.upgrade() {
                        let _ = sender
                            .send(ConferenceMessage::ExpireParticipant { participant_id })
                            .await;
                    }
                }
            }
        });

        Self { token }
    }

    /// Cancel the timer. Has no effect if it already fired.
    pub fn disarm(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        !self.token.is_cancelled()
    }
}

impl Drop for CleanupTimer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
