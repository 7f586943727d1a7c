//! `ConferenceActor` - one per live platform session.
//!
//! Owns the session's [`ParticipantStore`] and is the only writer to it, so
//! every participant mutation for a session is serialised through this
//! actor's mailbox. Fan-out is computed from the store right after a
//! mutation commits and then runs on a spawned task; the mailbox is never
//! blocked on subscribe calls.
//!
//! When the last participant leaves, or an admission into an empty
//! conference fails, the actor marks itself closing and asks the registry to
//! remove it. Admissions that arrive while closing are
//! refused with [`CcError::ConferenceClosed`].

use super::cleanup::CleanupTimer;
use super::messages::{
    Admission, CloseReason, ConferenceMessage, ConferenceState, FanoutScheduled, LeaveOutcome,
    LeaveReason, ParticipantInfo,
};
use super::metrics::ActorMetrics;
use super::registry::RegistryLink;
use crate::errors::CcError;
use crate::fanout::{self, FanoutTrigger};
use crate::observability::metrics as prom;
use crate::platform::SharedPlatform;
use crate::store::{ParticipantStore, Slug, SubscriptionTarget};
use common::types::{JoinMode, ParticipantId, SessionId, StreamId};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the conference mailbox.
const CONFERENCE_CHANNEL_BUFFER: usize = 500;

/// Per-conference settings shared by every conference actor.
#[derive(Debug, Clone)]
pub struct ConferenceSettings {
    /// Safety-net timeout armed for each admitted participant.
    pub cleanup_after: Duration,
    /// URL the platform posts participant events to.
    pub callback_url: String,
}

/// Handle to a `ConferenceActor`.
#[derive(Debug, Clone)]
pub struct ConferenceActorHandle {
    sender: mpsc::Sender<ConferenceMessage>,
    cancel_token: CancellationToken,
    session_id: SessionId,
}

impl ConferenceActorHandle {
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Send a request and wait for the reply.
    ///
    /// A closed mailbox or a dropped reply both mean the actor has shut
    /// down, which callers see as `ConferenceClosed`.
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ConferenceMessage,
    ) -> Result<T, CcError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| CcError::ConferenceClosed)?;

        rx.await.map_err(|_| CcError::ConferenceClosed)
    }

    /// Admit a new participant.
    pub async fn admit(
        &self,
        mode: JoinMode,
        display_name: Option<String>,
    ) -> Result<Admission, CcError> {
        self.request(|respond_to| ConferenceMessage::Admit {
            mode,
            display_name,
            respond_to,
        })
        .await?
    }

    /// Report that a participant's media connected.
    pub async fn participant_joined(
        &self,
        participant_id: ParticipantId,
    ) -> Result<FanoutScheduled, CcError> {
        self.request(|respond_to| ConferenceMessage::ParticipantJoined {
            participant_id,
            respond_to,
        })
        .await?
    }

    /// Report that a participant published a stream.
    pub async fn stream_published(
        &self,
        participant_id: ParticipantId,
        stream_id: StreamId,
    ) -> Result<FanoutScheduled, CcError> {
        self.request(|respond_to| ConferenceMessage::StreamPublished {
            participant_id,
            stream_id,
            respond_to,
        })
        .await?
    }

    /// Remove a participant. Idempotent.
    pub async fn participant_left(
        &self,
        participant_id: ParticipantId,
        reason: LeaveReason,
    ) -> Result<LeaveOutcome, CcError> {
        self.request(|respond_to| ConferenceMessage::ParticipantLeft {
            participant_id,
            reason,
            respond_to,
        })
        .await?
    }

    /// Get the current conference state.
    pub async fn get_state(&self) -> Result<ConferenceState, CcError> {
        self.request(|respond_to| ConferenceMessage::GetState { respond_to })
            .await
    }

    /// Remove every participant and close the conference.
    pub async fn end_conference(&self) -> Result<(), CcError> {
        self.request(|respond_to| ConferenceMessage::EndConference { respond_to })
            .await?
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The `ConferenceActor` implementation.
pub struct ConferenceActor {
    session_id: SessionId,
    slug: Slug,
    receiver: mpsc::Receiver<ConferenceMessage>,
    /// Handed to cleanup timers; weak so timers never keep the mailbox open.
    self_sender: mpsc::WeakSender<ConferenceMessage>,
    cancel_token: CancellationToken,
    store: ParticipantStore,
    platform: SharedPlatform,
    registry: RegistryLink,
    settings: ConferenceSettings,
    is_closing: bool,
    metrics: Arc<ActorMetrics>,
}

impl ConferenceActor {
    /// Spawn a new conference actor.
    ///
    /// Returns the handle and the task's `JoinHandle` for supervision.
    pub fn spawn(
        session_id: SessionId,
        slug: Slug,
        cancel_token: CancellationToken,
        platform: SharedPlatform,
        registry: RegistryLink,
        settings: ConferenceSettings,
        metrics: Arc<ActorMetrics>,
    ) -> (ConferenceActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(CONFERENCE_CHANNEL_BUFFER);

        let actor = Self {
            session_id: session_id.clone(),
            slug,
            receiver,
            self_sender: sender.downgrade(),
            cancel_token: cancel_token.clone(),
            store: ParticipantStore::new(session_id.clone()),
            platform,
            registry,
            settings,
            is_closing: false,
            metrics,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = ConferenceActorHandle {
            sender,
            cancel_token,
            session_id,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "cc.actor.conference", fields(session_id = %self.session_id, slug = %self.slug))]
    async fn run(mut self) {
        info!(
            target: "cc.actor.conference",
            session_id = %self.session_id,
            slug = %self.slug,
            "ConferenceActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "cc.actor.conference",
                        session_id = %self.session_id,
                        "ConferenceActor received cancellation signal"
                    );
                    self.graceful_shutdown();
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.handle_message(message).await;
                            self.metrics.record_message_processed();
                        }
                        None => {
                            info!(
                                target: "cc.actor.conference",
                                session_id = %self.session_id,
                                "ConferenceActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "cc.actor.conference",
            session_id = %self.session_id,
            "ConferenceActor stopped"
        );
    }

    async fn handle_message(&mut self, message: ConferenceMessage) {
        match message {
            ConferenceMessage::Admit {
                mode,
                display_name,
                respond_to,
            } => {
                let result = self.admit(mode, display_name).await;
                prom::record_admission(mode.as_str(), result.is_ok());
                let abandon = result.is_err() && self.store.is_empty() && !self.is_closing;
                let _ = respond_to.send(result);

                // Nobody else will ever leave this session
                if abandon {
                    self.close(CloseReason::Empty).await;
                }
            }

            ConferenceMessage::ParticipantJoined {
                participant_id,
                respond_to,
            } => {
                let result = self.participant_joined(&participant_id);
                let _ = respond_to.send(result);
            }

            ConferenceMessage::StreamPublished {
                participant_id,
                stream_id,
                respond_to,
            } => {
                let result = self.stream_published(&participant_id, stream_id);
                let _ = respond_to.send(result);
            }

            ConferenceMessage::ParticipantLeft {
                participant_id,
                reason,
                respond_to,
            } => {
                let result = self.participant_left(&participant_id, reason).await;
                let _ = respond_to.send(Ok(result));
            }

            ConferenceMessage::ExpireParticipant { participant_id } => {
                let outcome = self
                    .participant_left(&participant_id, LeaveReason::CleanupTimer)
                    .await;
                debug!(
                    target: "cc.actor.conference",
                    session_id = %self.session_id,
                    participant_id = %participant_id,
                    outcome = ?outcome,
                    "Cleanup timer processed"
                );
            }

            ConferenceMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.state());
            }

            ConferenceMessage::EndConference { respond_to } => {
                self.end_conference().await;
                let _ = respond_to.send(Ok(()));
            }
        }
    }

    async fn admit(
        &mut self,
        mode: JoinMode,
        display_name: Option<String>,
    ) -> Result<Admission, CcError> {
        if self.is_closing {
            return Err(CcError::ConferenceClosed);
        }

        // Display names and caller numbers stay local
        let created = self
            .platform
            .create_participant(
                mode.as_str(),
                mode.publish_permissions(),
                &self.settings.callback_url,
            )
            .await
            .map_err(|e| {
                warn!(
                    target: "cc.actor.conference",
                    session_id = %self.session_id,
                    error = %e,
                    "Failed to create platform participant"
                );
                CcError::Platform(e)
            })?;
        let participant_id = created.participant_id;

        if let Err(e) = self
            .platform
            .add_participant_to_session(&participant_id, &self.session_id)
            .await
        {
            warn!(
                target: "cc.actor.conference",
                session_id = %self.session_id,
                participant_id = %participant_id,
                error = %e,
                "Failed to add participant to session"
            );
            if let Err(cleanup_err) = self.platform.delete_participant(&participant_id).await {
                debug!(
                    target: "cc.actor.conference",
                    participant_id = %participant_id,
                    error = %cleanup_err,
                    "Failed to delete orphaned platform participant"
                );
            }
            return Err(CcError::Platform(e));
        }

        let timer = CleanupTimer::arm(
            participant_id.clone(),
            self.settings.cleanup_after,
            self.self_sender.clone(),
            &self.cancel_token,
        );
        self.store
            .insert_pending(participant_id.clone(), mode, display_name, Some(timer))?;
        self.metrics.participant_admitted();

        info!(
            target: "cc.actor.conference",
            session_id = %self.session_id,
            participant_id = %participant_id,
            mode = mode.as_str(),
            participants = self.store.len(),
            "Participant admitted"
        );

        Ok(Admission {
            session_id: self.session_id.clone(),
            participant_id,
            device_token: created.device_token,
        })
    }

    fn participant_joined(
        &mut self,
        participant_id: &ParticipantId,
    ) -> Result<FanoutScheduled, CcError> {
        let targets = self.store.mark_connected(participant_id).ok_or_else(|| {
            CcError::NotFound("Participant not found".to_string())
        })?;

        info!(
            target: "cc.actor.conference",
            session_id = %self.session_id,
            participant_id = %participant_id,
            catch_up = targets.len(),
            "Participant connected"
        );

        Ok(self.schedule_fanout(FanoutTrigger::ParticipantConnected, targets))
    }

    fn stream_published(
        &mut self,
        participant_id: &ParticipantId,
        stream_id: StreamId,
    ) -> Result<FanoutScheduled, CcError> {
        let targets = self
            .store
            .record_stream(participant_id, stream_id.clone())
            .ok_or_else(|| CcError::NotFound("Participant not found".to_string()))?;

        info!(
            target: "cc.actor.conference",
            session_id = %self.session_id,
            participant_id = %participant_id,
            stream_id = %stream_id,
            subscribers = targets.len(),
            "Stream published"
        );

        Ok(self.schedule_fanout(FanoutTrigger::StreamPublished, targets))
    }

    fn schedule_fanout(
        &self,
        trigger: FanoutTrigger,
        targets: Vec<SubscriptionTarget>,
    ) -> FanoutScheduled {
        let subscriptions = targets.len();
        if subscriptions > 0 {
            fanout::spawn_fanout(
                Arc::clone(&self.platform),
                self.session_id.clone(),
                trigger,
                targets,
            );
        }
        FanoutScheduled { subscriptions }
    }

    async fn participant_left(
        &mut self,
        participant_id: &ParticipantId,
        reason: LeaveReason,
    ) -> LeaveOutcome {
        if self.store.remove(participant_id).is_none() {
            debug!(
                target: "cc.actor.conference",
                session_id = %self.session_id,
                participant_id = %participant_id,
                reason = reason.as_str(),
                "Participant already gone"
            );
            return LeaveOutcome::AlreadyGone;
        }
        self.metrics.participant_removed();

        let remaining = self.store.len();
        info!(
            target: "cc.actor.conference",
            session_id = %self.session_id,
            participant_id = %participant_id,
            reason = reason.as_str(),
            remaining,
            "Participant left"
        );

        self.release_on_platform(participant_id).await;

        if remaining == 0 && !self.is_closing {
            self.close(CloseReason::Empty).await;
        }

        LeaveOutcome::Removed { remaining }
    }

    /// Detach and delete a participant on the platform. Failures are logged.
    async fn release_on_platform(&self, participant_id: &ParticipantId) {
        if let Err(e) = self
            .platform
            .remove_participant_from_session(participant_id, &self.session_id)
            .await
        {
            if !e.is_not_found() {
                warn!(
                    target: "cc.actor.conference",
                    session_id = %self.session_id,
                    participant_id = %participant_id,
                    error = %e,
                    "Failed to remove participant from platform session"
                );
            }
        }

        if let Err(e) = self.platform.delete_participant(participant_id).await {
            if !e.is_not_found() {
                warn!(
                    target: "cc.actor.conference",
                    participant_id = %participant_id,
                    error = %e,
                    "Failed to delete platform participant"
                );
            }
        }
    }

    async fn end_conference(&mut self) {
        if self.is_closing {
            return;
        }

        let participants = self.store.drain();
        for _ in &participants {
            self.metrics.participant_removed();
        }

        info!(
            target: "cc.actor.conference",
            session_id = %self.session_id,
            participants = participants.len(),
            "Ending conference"
        );

        join_all(
            participants
                .iter()
                .map(|p| self.release_on_platform(&p.participant_id)),
        )
        .await;

        self.close(CloseReason::Ended).await;
    }

    /// Mark closing and hand the session back to the registry.
    async fn close(&mut self, reason: CloseReason) {
        self.is_closing = true;

        if let Err(e) = self
            .registry
            .remove_conference(self.session_id.clone(), reason)
            .await
        {
            warn!(
                target: "cc.actor.conference",
                session_id = %self.session_id,
                error = %e,
                "Registry did not remove conference, stopping actor"
            );
            self.cancel_token.cancel();
        }
    }

    fn state(&self) -> ConferenceState {
        ConferenceState {
            session_id: self.session_id.clone(),
            participants: self
                .store
                .participants()
                .into_iter()
                .map(|p| ParticipantInfo {
                    participant_id: p.participant_id.clone(),
                    display_name: p.display_name.clone(),
                    mode: p.mode,
                    status: p.status,
                    published_streams: p.published_streams.clone(),
                    joined_at: p.joined_at,
                })
                .collect(),
            is_closing: self.is_closing,
        }
    }

    /// Refuse queued work and disarm remaining timers.
    fn graceful_shutdown(&mut self) {
        self.is_closing = true;
        self.receiver.close();

        let mut refused = 0usize;
        while let Ok(message) = self.receiver.try_recv() {
            refused += 1;
            match message {
                ConferenceMessage::Admit { respond_to, .. } => {
                    let _ = respond_to.send(Err(CcError::ConferenceClosed));
                }
                ConferenceMessage::ParticipantJoined { respond_to, .. }
                | ConferenceMessage::StreamPublished { respond_to, .. } => {
                    let _ = respond_to.send(Err(CcError::ConferenceClosed));
                }
                ConferenceMessage::ParticipantLeft { respond_to, .. } => {
                    let _ = respond_to.send(Err(CcError::ConferenceClosed));
                }
                ConferenceMessage::GetState { respond_to } => {
                    let _ = respond_to.send(self.state());
                }
                ConferenceMessage::EndConference { respond_to } => {
                    let _ = respond_to.send(Ok(()));
                }
                ConferenceMessage::ExpireParticipant { .. } => {}
            }
        }

        let remaining = self.store.drain();
        for _ in &remaining {
            self.metrics.participant_removed();
        }

        debug!(
            target: "cc.actor.conference",
            session_id = %self.session_id,
            refused,
            dropped_participants = remaining.len(),
            "ConferenceActor shutdown complete"
        );
    }
}
