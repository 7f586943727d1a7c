//! `ConferenceRegistryActor` - singleton supervisor for conference actors.
//!
//! The registry is the only writer to the slug and join code registries,
//! which is what makes "one live session per slug" hold under concurrent
//! joins:
//!
//! - Serialises create / get-or-create / remove for every slug
//! - Validates a bound session against the platform before reusing it
//! - Spawns one `ConferenceActor` per live session and supervises it
//! - Owns the root `CancellationToken` for graceful shutdown
//!
//! Platform calls never run inside the message loop. A slug waiting on
//! `get_session` or `create_session` is marked pending and later requests
//! for it queue behind that call; every other slug keeps flowing. Session
//! lookups for platform callbacks read a shared directory and skip the
//! mailbox entirely.
//!
//! The registry never waits on a conference actor. Conference actors do
//! wait on the registry (when they close), so the reverse would deadlock.

use super::conference::{ConferenceActor, ConferenceActorHandle, ConferenceSettings};
use super::messages::{
    CloseReason, ConferenceEntry, ConferenceInfo, RegistryMessage, RegistryStatus,
};
use super::metrics::{ActorMetrics, ActorType};
use crate::config::Config;
use crate::errors::CcError;
use crate::observability::metrics as prom;
use crate::platform::{PlatformError, SharedPlatform};
use crate::store::{IdentifierRegistry, JoinCode, JoinCodeGenerator, Slug};
use chrono::Utc;
use common::types::SessionId;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the registry mailbox.
const REGISTRY_CHANNEL_BUFFER: usize = 1000;

/// How long to wait for a conference actor task when removing it.
const CONFERENCE_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Shutdown deadline when the registry is cancelled without one.
const SHUTDOWN_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Live conferences by session ID. Written only by the registry actor.
type SessionDirectory = Arc<RwLock<HashMap<SessionId, ConferenceEntry>>>;

/// Settings for the registry and the conferences it spawns.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub join_code_length: u32,
    pub conference: ConferenceSettings,
}

impl RegistrySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            join_code_length: config.join_code_length,
            conference: ConferenceSettings {
                cleanup_after: config.participant_cleanup_after(),
                callback_url: config.platform_callback_url.clone(),
            },
        }
    }
}

/// Handle to the `ConferenceRegistryActor`.
#[derive(Clone)]
pub struct ConferenceRegistryHandle {
    sender: mpsc::Sender<RegistryMessage>,
    cancel_token: CancellationToken,
    sessions: SessionDirectory,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ConferenceRegistryHandle {
    /// Create a new `ConferenceRegistryActor` and return a handle to it.
    ///
    /// # Errors
    ///
    /// Returns `CcError::Internal` if the join code length is invalid.
    pub fn new(
        instance_id: String,
        platform: SharedPlatform,
        settings: RegistrySettings,
        metrics: Arc<ActorMetrics>,
    ) -> Result<Self, CcError> {
        let join_codes = JoinCodeGenerator::new(settings.join_code_length)?;
        let (sender, receiver) = mpsc::channel(REGISTRY_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();
        let sessions: SessionDirectory = Arc::new(RwLock::new(HashMap::new()));

        let actor = ConferenceRegistryActor {
            instance_id,
            receiver,
            weak_sender: sender.downgrade(),
            cancel_token: cancel_token.clone(),
            platform,
            settings: settings.conference,
            join_codes,
            slugs: IdentifierRegistry::new(),
            codes: IdentifierRegistry::new(),
            reserved_codes: HashSet::new(),
            pending: HashMap::new(),
            conferences: HashMap::new(),
            sessions: Arc::clone(&sessions),
            accepting_new: true,
            shutdown_deadline: SHUTDOWN_STOP_TIMEOUT,
            metrics,
        };

        let task = tokio::spawn(actor.run());

        Ok(Self {
            sender,
            cancel_token,
            sessions,
            task: Arc::new(Mutex::new(Some(task))),
        })
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RegistryMessage,
    ) -> Result<T, CcError> {
        let (tx, rx) = oneshot::channel();
        // The mailbox only closes once the registry has shut down
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| CcError::Draining)?;

        rx.await
            .map_err(|e| CcError::Internal(format!("response receive failed: {e}")))
    }

    /// Create a conference. Fails with `Conflict` if the slug is live.
    pub async fn create_conference(
        &self,
        slug: Slug,
        display_name: String,
    ) -> Result<ConferenceInfo, CcError> {
        self.request(|respond_to| RegistryMessage::CreateConference {
            slug,
            display_name,
            respond_to,
        })
        .await?
    }

    /// Resolve a slug to a live conference, creating one if needed.
    pub async fn get_or_create(&self, slug: Slug) -> Result<ConferenceEntry, CcError> {
        self.request(|respond_to| RegistryMessage::GetOrCreateConference { slug, respond_to })
            .await?
    }

    pub async fn resolve_slug(&self, slug: Slug) -> Result<Option<ConferenceEntry>, CcError> {
        self.request(|respond_to| RegistryMessage::ResolveSlug { slug, respond_to })
            .await
    }

    pub async fn resolve_join_code(
        &self,
        code: JoinCode,
    ) -> Result<Option<ConferenceEntry>, CcError> {
        self.request(|respond_to| RegistryMessage::ResolveJoinCode { code, respond_to })
            .await
    }

    /// Look up a live conference by session ID without going through the
    /// mailbox.
    pub async fn resolve_session(
        &self,
        session_id: SessionId,
    ) -> Result<Option<ConferenceEntry>, CcError> {
        Ok(self.sessions.read().await.get(&session_id).cloned())
    }

    /// Forget a conference and delete its platform session.
    pub async fn remove_conference(
        &self,
        session_id: SessionId,
        reason: CloseReason,
    ) -> Result<(), CcError> {
        self.request(|respond_to| RegistryMessage::RemoveConference {
            session_id,
            reason,
            respond_to,
        })
        .await?
    }

    /// Live conferences, oldest first.
    pub async fn list_conferences(&self) -> Result<Vec<ConferenceInfo>, CcError> {
        self.request(|respond_to| RegistryMessage::ListConferences { respond_to })
            .await
    }

    pub async fn get_status(&self) -> Result<RegistryStatus, CcError> {
        self.request(|respond_to| RegistryMessage::GetStatus { respond_to })
            .await
    }

    /// Initiate graceful shutdown. Conference actors get `deadline` to stop.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), CcError> {
        self.request(|respond_to| RegistryMessage::Shutdown {
            deadline,
            respond_to,
        })
        .await?
    }

    /// Wait for the registry task to finish. Only the first caller waits.
    pub async fn wait_stopped(&self) {
        let task = self.task.lock().await.take();
        let Some(task) = task else {
            return;
        };

        if let Err(e) = task.await {
            error!(
                target: "cc.actor.registry",
                error = ?e,
                "Registry task failed"
            );
        }
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

/// Weak link from a conference actor back to the registry.
///
/// Weak so that live conferences do not keep the registry mailbox open.
#[derive(Debug, Clone)]
pub struct RegistryLink {
    sender: mpsc::WeakSender<RegistryMessage>,
}

impl RegistryLink {
    pub fn new(sender: mpsc::WeakSender<RegistryMessage>) -> Self {
        Self { sender }
    }

    /// Ask the registry to remove a closing conference.
    pub async fn remove_conference(
        &self,
        session_id: SessionId,
        reason: CloseReason,
    ) -> Result<(), CcError> {
        let sender = self.sender.upgrade().ok_or(CcError::Draining)?;
        let (tx, rx) = oneshot::channel();
        sender
            .send(RegistryMessage::RemoveConference {
                session_id,
                reason,
                respond_to: tx,
            })
            .await
            .map_err(|_| CcError::Draining)?;
        drop(sender);

        rx.await
            .map_err(|e| CcError::Internal(format!("response receive failed: {e}")))?
    }
}

/// Internal state for a managed conference.
struct ManagedConference {
    info: ConferenceInfo,
    handle: ConferenceActorHandle,
    task_handle: JoinHandle<()>,
}

impl ManagedConference {
    fn entry(&self) -> ConferenceEntry {
        ConferenceEntry {
            info: self.info.clone(),
            handle: self.handle.clone(),
        }
    }
}

/// A create or join request parked behind a slug's platform call.
enum Waiter {
    /// Explicit create: an existing conference is a conflict.
    Create {
        display_name: String,
        respond_to: oneshot::Sender<Result<ConferenceInfo, CcError>>,
    },
    /// Join by name: reuse an existing conference.
    Join {
        respond_to: oneshot::Sender<Result<ConferenceEntry, CcError>>,
    },
}

impl Waiter {
    /// The requester stopped waiting for the reply.
    fn is_abandoned(&self) -> bool {
        match self {
            Waiter::Create { respond_to, .. } => respond_to.is_closed(),
            Waiter::Join { respond_to } => respond_to.is_closed(),
        }
    }

    /// Answer with a live conference. `created` marks the request whose
    /// creation produced it.
    fn resolve(self, entry: &ConferenceEntry, created: bool) {
        match self {
            Waiter::Create { respond_to, .. } => {
                let result = if created {
                    Ok(entry.info.clone())
                } else {
                    Err(CcError::Conflict("Conference already exists".to_string()))
                };
                let _ = respond_to.send(result);
            }
            Waiter::Join { respond_to } => {
                let _ = respond_to.send(Ok(entry.clone()));
            }
        }
    }

    fn fail(self, error: CcError) {
        match self {
            Waiter::Create { respond_to, .. } => {
                let _ = respond_to.send(Err(error));
            }
            Waiter::Join { respond_to } => {
                let _ = respond_to.send(Err(error));
            }
        }
    }
}

fn fail_all(waiters: Vec<Waiter>, error: &CcError) {
    for waiter in waiters {
        waiter.fail(error.clone());
    }
}

/// Delete a platform session, logging the outcome.
async fn delete_platform_session(platform: &SharedPlatform, session_id: &SessionId) {
    match platform.delete_session(session_id).await {
        Ok(()) => {
            debug!(
                target: "cc.actor.registry",
                session_id = %session_id,
                "Platform session deleted"
            );
        }
        Err(e) if e.is_not_found() => {
            debug!(
                target: "cc.actor.registry",
                session_id = %session_id,
                "Platform session already gone"
            );
        }
        Err(e) => {
            warn!(
                target: "cc.actor.registry",
                session_id = %session_id,
                error = %e,
                "Failed to delete platform session"
            );
        }
    }
}

/// The `ConferenceRegistryActor` implementation.
pub struct ConferenceRegistryActor {
    instance_id: String,
    receiver: mpsc::Receiver<RegistryMessage>,
    /// Cloned into each conference's `RegistryLink` and each platform task.
    weak_sender: mpsc::WeakSender<RegistryMessage>,
    /// Root cancellation token.
    cancel_token: CancellationToken,
    platform: SharedPlatform,
    settings: ConferenceSettings,
    join_codes: JoinCodeGenerator,
    slugs: IdentifierRegistry<Slug>,
    codes: IdentifierRegistry<JoinCode>,
    /// Codes drawn for creations still waiting on the platform.
    reserved_codes: HashSet<JoinCode>,
    /// Slugs with a platform call in flight, and the requests queued on them.
    pending: HashMap<Slug, Vec<Waiter>>,
    conferences: HashMap<SessionId, ManagedConference>,
    sessions: SessionDirectory,
    accepting_new: bool,
    shutdown_deadline: Duration,
    metrics: Arc<ActorMetrics>,
}

impl ConferenceRegistryActor {
    /// Run the actor message loop.
    #[instrument(skip_all, name = "cc.actor.registry", fields(instance_id = %self.instance_id))]
    async fn run(mut self) {
        info!(
            target: "cc.actor.registry",
            instance_id = %self.instance_id,
            "ConferenceRegistryActor started"
        );

        loop {
            // Check for terminated conference actors
            self.check_conference_health().await;

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "cc.actor.registry",
                        instance_id = %self.instance_id,
                        "ConferenceRegistryActor received cancellation signal"
                    );
                    self.graceful_shutdown().await;
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
                                target: "cc.actor.registry",
                                instance_id = %self.instance_id,
                                "ConferenceRegistryActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "cc.actor.registry",
            instance_id = %self.instance_id,
            conferences_remaining = self.conferences.len(),
            "ConferenceRegistryActor stopped"
        );
    }

    async fn handle_message(&mut self, message: RegistryMessage) {
        match message {
            RegistryMessage::CreateConference {
                slug,
                display_name,
                respond_to,
            } => {
                self.request_conference(
                    slug,
                    Waiter::Create {
                        display_name,
                        respond_to,
                    },
                );
            }

            RegistryMessage::GetOrCreateConference { slug, respond_to } => {
                self.request_conference(slug, Waiter::Join { respond_to });
            }

            RegistryMessage::ResolveSlug { slug, respond_to } => {
                let entry = self
                    .slugs
                    .resolve(&slug)
                    .and_then(|session_id| self.conferences.get(session_id))
                    .map(ManagedConference::entry);
                let _ = respond_to.send(entry);
            }

            RegistryMessage::ResolveJoinCode { code, respond_to } => {
                let entry = self
                    .codes
                    .resolve(&code)
                    .and_then(|session_id| self.conferences.get(session_id))
                    .map(ManagedConference::entry);
                let _ = respond_to.send(entry);
            }

            RegistryMessage::RemoveConference {
                session_id,
                reason,
                respond_to,
            } => {
                let result = self.remove_conference(&session_id, reason).await;
                let _ = respond_to.send(result);
            }

            RegistryMessage::ListConferences { respond_to } => {
                let _ = respond_to.send(self.list_conferences());
            }

            RegistryMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.get_status());
            }

            RegistryMessage::Shutdown {
                deadline,
                respond_to,
            } => {
                self.initiate_shutdown(deadline);
                let _ = respond_to.send(Ok(()));
            }

            RegistryMessage::SessionChecked {
                slug,
                session_id,
                result,
            } => {
                self.session_checked(slug, session_id, result).await;
            }

            RegistryMessage::CreationFinished {
                slug,
                join_code,
                result,
            } => {
                self.creation_finished(slug, join_code, result).await;
            }
        }
    }

    /// Start work for a create or join request, or queue it behind the
    /// slug's platform call already in flight.
    fn request_conference(&mut self, slug: Slug, waiter: Waiter) {
        if let Some(waiters) = self.pending.get_mut(&slug) {
            debug!(
                target: "cc.actor.registry",
                slug = %slug,
                queued = waiters.len() + 1,
                "Request queued behind pending platform call"
            );
            waiters.push(waiter);
            return;
        }

        self.begin(slug, vec![waiter]);
    }

    /// Validate the slug's bound session, or create one if none is bound.
    fn begin(&mut self, slug: Slug, waiters: Vec<Waiter>) {
        match self.bound_session(&slug) {
            Some(session_id) => {
                self.spawn_session_check(slug.clone(), session_id);
                self.pending.insert(slug, waiters);
            }
            None => self.begin_creation(slug, waiters),
        }
    }

    /// The live session bound to `slug`. A binding to an unknown session is
    /// dropped.
    fn bound_session(&mut self, slug: &Slug) -> Option<SessionId> {
        let session_id = self.slugs.resolve(slug)?.clone();

        if !self.conferences.contains_key(&session_id) {
            warn!(
                target: "cc.actor.registry",
                slug = %slug,
                session_id = %session_id,
                "Slug bound to unknown session, unbinding"
            );
            self.slugs.unbind(slug);
            return None;
        }

        Some(session_id)
    }

    fn begin_creation(&mut self, slug: Slug, waiters: Vec<Waiter>) {
        if !self.accepting_new {
            fail_all(waiters, &CcError::Draining);
            return;
        }

        let codes = &self.codes;
        let reserved = &self.reserved_codes;
        let allocated = self
            .join_codes
            .allocate(codes.len() + reserved.len(), |code| {
                codes.contains(code) || reserved.contains(code)
            });
        let join_code = match allocated {
            Ok(code) => code,
            Err(e) => {
                warn!(
                    target: "cc.actor.registry",
                    slug = %slug,
                    error = %e,
                    "No join code available"
                );
                fail_all(waiters, &e);
                return;
            }
        };

        self.reserved_codes.insert(join_code.clone());
        self.spawn_creation(slug.clone(), join_code);
        self.pending.insert(slug, waiters);
    }

    /// Run `get_session` off the message loop and report back.
    fn spawn_session_check(&self, slug: Slug, session_id: SessionId) {
        let platform = Arc::clone(&self.platform);
        let sender = self.weak_sender.clone();

        tokio::spawn(async move {
            let result = platform.get_session(&session_id).await;
            if let Some(sender) = sender.upgrade() {
                let _ = sender
                    .send(RegistryMessage::SessionChecked {
                        slug,
                        session_id,
                        result,
                    })
                    .await;
            }
        });
    }

    /// Run `create_session` off the message loop and report back.
    ///
    /// A session created after the registry stopped is deleted here, since
    /// nothing else will ever own it.
    fn spawn_creation(&self, slug: Slug, join_code: JoinCode) {
        let platform = Arc::clone(&self.platform);
        let sender = self.weak_sender.clone();

        tokio::spawn(async move {
            let result = platform.create_session(slug.as_str()).await;
            let message = RegistryMessage::CreationFinished {
                slug,
                join_code,
                result,
            };

            let undelivered = match sender.upgrade() {
                Some(sender) => sender.send(message).await.err().map(|e| e.0),
                None => Some(message),
            };
            if let Some(RegistryMessage::CreationFinished {
                result: Ok(session_id),
                ..
            }) = undelivered
            {
                delete_platform_session(&platform, &session_id).await;
            }
        });
    }

    async fn session_checked(
        &mut self,
        slug: Slug,
        session_id: SessionId,
        result: Result<(), PlatformError>,
    ) {
        let Some(waiters) = self.pending.remove(&slug) else {
            return;
        };

        // The conference may have closed while the check was in flight
        let still_bound = self.slugs.resolve(&slug) == Some(&session_id);
        let entry = self
            .conferences
            .get(&session_id)
            .filter(|_| still_bound)
            .map(ManagedConference::entry);
        let Some(entry) = entry else {
            self.begin(slug, waiters);
            return;
        };

        match result {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                info!(
                    target: "cc.actor.registry",
                    slug = %slug,
                    session_id = %session_id,
                    "Bound session no longer exists on platform, discarding"
                );
                self.discard_stale(&session_id).await;
                self.begin_creation(slug, waiters);
                return;
            }
            Err(e) => {
                // Only a definite "not found" invalidates a live conference
                warn!(
                    target: "cc.actor.registry",
                    slug = %slug,
                    session_id = %session_id,
                    error = %e,
                    "Session validation failed, keeping existing binding"
                );
            }
        }

        for waiter in waiters {
            waiter.resolve(&entry, false);
        }
    }

    async fn creation_finished(
        &mut self,
        slug: Slug,
        join_code: JoinCode,
        result: Result<SessionId, PlatformError>,
    ) {
        self.reserved_codes.remove(&join_code);
        let waiters = self.pending.remove(&slug).unwrap_or_default();

        let session_id = match result {
            Ok(session_id) => session_id,
            Err(e) => {
                warn!(
                    target: "cc.actor.registry",
                    slug = %slug,
                    error = %e,
                    "Failed to create platform session"
                );
                fail_all(waiters, &CcError::Platform(e));
                return;
            }
        };

        if !self.accepting_new {
            self.spawn_session_cleanup(session_id, None);
            fail_all(waiters, &CcError::Draining);
            return;
        }

        if waiters.iter().all(Waiter::is_abandoned) {
            info!(
                target: "cc.actor.registry",
                slug = %slug,
                session_id = %session_id,
                "Every requester gave up, deleting new session"
            );
            self.spawn_session_cleanup(session_id, None);
            return;
        }

        let display_name = match waiters.first() {
            Some(Waiter::Create { display_name, .. }) => display_name.clone(),
            _ => slug.to_string(),
        };

        match self
            .register_conference(slug, display_name, join_code, session_id)
            .await
        {
            Ok(entry) => {
                let mut waiters = waiters.into_iter();
                if let Some(first) = waiters.next() {
                    first.resolve(&entry, true);
                }
                for waiter in waiters {
                    waiter.resolve(&entry, false);
                }
            }
            Err(e) => fail_all(waiters, &e),
        }
    }

    /// Bind identifiers to a freshly created session and spawn its actor.
    async fn register_conference(
        &mut self,
        slug: Slug,
        display_name: String,
        join_code: JoinCode,
        session_id: SessionId,
    ) -> Result<ConferenceEntry, CcError> {
        if let Err(e) = self.bind_identifiers(&slug, &join_code, &session_id) {
            self.spawn_session_cleanup(session_id, None);
            return Err(e);
        }

        let (handle, task_handle) = ConferenceActor::spawn(
            session_id.clone(),
            slug.clone(),
            self.cancel_token.child_token(),
            Arc::clone(&self.platform),
            RegistryLink::new(self.weak_sender.clone()),
            self.settings.clone(),
            Arc::clone(&self.metrics),
        );

        let info = ConferenceInfo {
            session_id: session_id.clone(),
            slug,
            display_name,
            join_code,
            created_at: Utc::now(),
        };
        let managed = ManagedConference {
            info,
            handle,
            task_handle,
        };
        let entry = managed.entry();
        self.conferences.insert(session_id.clone(), managed);
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), entry.clone());

        self.metrics.conference_created();
        prom::record_conference_lifecycle("created");

        info!(
            target: "cc.actor.registry",
            instance_id = %self.instance_id,
            session_id = %session_id,
            slug = %entry.info.slug,
            total_conferences = self.conferences.len(),
            "Conference created"
        );

        Ok(entry)
    }

    /// Bind slug and join code, or neither.
    fn bind_identifiers(
        &mut self,
        slug: &Slug,
        join_code: &JoinCode,
        session_id: &SessionId,
    ) -> Result<(), CcError> {
        self.slugs.bind(slug.clone(), session_id.clone())?;
        if let Err(e) = self.codes.bind(join_code.clone(), session_id.clone()) {
            self.slugs.unbind(slug);
            return Err(e);
        }
        Ok(())
    }

    /// Remove only the bindings that still point at this conference.
    fn unbind_identifiers(&mut self, info: &ConferenceInfo) {
        if self.slugs.resolve(&info.slug) == Some(&info.session_id) {
            self.slugs.unbind(&info.slug);
        }
        if self.codes.resolve(&info.join_code) == Some(&info.session_id) {
            self.codes.unbind(&info.join_code);
        }
    }

    /// Take a conference out of every index. The caller stops its actor.
    async fn forget(&mut self, session_id: &SessionId) -> Option<ManagedConference> {
        let managed = self.conferences.remove(session_id)?;
        self.sessions.write().await.remove(session_id);
        self.unbind_identifiers(&managed.info);
        Some(managed)
    }

    async fn remove_conference(
        &mut self,
        session_id: &SessionId,
        reason: CloseReason,
    ) -> Result<(), CcError> {
        let managed = self
            .forget(session_id)
            .await
            .ok_or_else(|| CcError::NotFound("Conference not found".to_string()))?;

        managed.handle.cancel();
        self.spawn_session_cleanup(session_id.clone(), Some(managed.task_handle));

        self.metrics.conference_removed();
        prom::record_conference_lifecycle(reason.as_str());

        info!(
            target: "cc.actor.registry",
            instance_id = %self.instance_id,
            session_id = %session_id,
            slug = %managed.info.slug,
            reason = reason.as_str(),
            total_conferences = self.conferences.len(),
            "Conference removed"
        );

        Ok(())
    }

    /// Drop a conference whose platform session is gone. No platform call.
    async fn discard_stale(&mut self, session_id: &SessionId) {
        if let Some(managed) = self.forget(session_id).await {
            managed.handle.cancel();
            self.metrics.conference_removed();
            prom::record_conference_lifecycle("stale");
        }
    }

    /// Delete the platform session (best effort), then reap the actor task.
    ///
    /// Runs in the background so the mailbox is never blocked on cleanup.
    fn spawn_session_cleanup(&self, session_id: SessionId, task_handle: Option<JoinHandle<()>>) {
        let platform = Arc::clone(&self.platform);

        tokio::spawn(async move {
            delete_platform_session(&platform, &session_id).await;

            let Some(task_handle) = task_handle else {
                return;
            };
            match tokio::time::timeout(CONFERENCE_STOP_TIMEOUT, task_handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(
                        target: "cc.actor.registry",
                        session_id = %session_id,
                        error = ?e,
                        "Conference actor task panicked during removal"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "cc.actor.registry",
                        session_id = %session_id,
                        "Conference actor task cleanup timed out"
                    );
                }
            }
        });
    }

    fn list_conferences(&self) -> Vec<ConferenceInfo> {
        let mut infos: Vec<ConferenceInfo> = self
            .conferences
            .values()
            .map(|managed| managed.info.clone())
            .collect();
        infos.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.slug.cmp(&b.slug))
        });
        infos
    }

    fn get_status(&self) -> RegistryStatus {
        RegistryStatus {
            conference_count: self.conferences.len(),
            participant_count: self.metrics.participant_count(),
            is_draining: !self.accepting_new,
        }
    }

    fn initiate_shutdown(&mut self, deadline: Duration) {
        info!(
            target: "cc.actor.registry",
            instance_id = %self.instance_id,
            conference_count = self.conferences.len(),
            deadline_secs = deadline.as_secs(),
            "Initiating graceful shutdown"
        );

        self.accepting_new = false;
        self.shutdown_deadline = deadline;

        // Cancel the root token (propagates to all children)
        self.cancel_token.cancel();
    }

    async fn graceful_shutdown(&mut self) {
        info!(
            target: "cc.actor.registry",
            instance_id = %self.instance_id,
            conference_count = self.conferences.len(),
            pending_slugs = self.pending.len(),
            "Performing graceful shutdown"
        );

        self.accepting_new = false;

        // Refuse queued requests so no conference waits on a reply that never comes
        self.receiver.close();
        while let Ok(message) = self.receiver.try_recv() {
            self.refuse(message);
        }
        for (_, waiters) in self.pending.drain() {
            fail_all(waiters, &CcError::Draining);
        }

        self.sessions.write().await.clear();
        let conferences: Vec<(SessionId, ManagedConference)> = self.conferences.drain().collect();
        for (_, managed) in &conferences {
            managed.handle.cancel();
            self.metrics.conference_removed();
        }

        // Shared deadline across all conference actors
        let stopping = conferences
            .into_iter()
            .map(|(session_id, managed)| async move { (session_id, managed.task_handle.await) });
        match tokio::time::timeout(self.shutdown_deadline, join_all(stopping)).await {
            Ok(results) => {
                for (session_id, result) in results {
                    match result {
                        Ok(()) => {
                            debug!(
                                target: "cc.actor.registry",
                                session_id = %session_id,
                                "Conference actor completed cleanly"
                            );
                        }
                        Err(e) => {
                            warn!(
                                target: "cc.actor.registry",
                                session_id = %session_id,
                                error = ?e,
                                "Conference actor task panicked during shutdown"
                            );
                        }
                    }
                }
            }
            Err(_) => {
                warn!(
                    target: "cc.actor.registry",
                    instance_id = %self.instance_id,
                    deadline_secs = self.shutdown_deadline.as_secs(),
                    "Conference actors did not stop before the shutdown deadline"
                );
            }
        }

        info!(
            target: "cc.actor.registry",
            instance_id = %self.instance_id,
            "Graceful shutdown complete"
        );
    }

    fn refuse(&self, message: RegistryMessage) {
        match message {
            RegistryMessage::CreateConference { respond_to, .. } => {
                let _ = respond_to.send(Err(CcError::Draining));
            }
            RegistryMessage::GetOrCreateConference { respond_to, .. } => {
                let _ = respond_to.send(Err(CcError::Draining));
            }
            RegistryMessage::ResolveSlug { respond_to, .. }
            | RegistryMessage::ResolveJoinCode { respond_to, .. } => {
                let _ = respond_to.send(None);
            }
            RegistryMessage::RemoveConference { respond_to, .. }
            | RegistryMessage::Shutdown { respond_to, .. } => {
                let _ = respond_to.send(Ok(()));
            }
            RegistryMessage::ListConferences { respond_to } => {
                let _ = respond_to.send(Vec::new());
            }
            RegistryMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.get_status());
            }
            RegistryMessage::SessionChecked { .. } => {}
            RegistryMessage::CreationFinished { result, .. } => {
                if let Ok(session_id) = result {
                    self.spawn_session_cleanup(session_id, None);
                }
            }
        }
    }

    /// Reap conference actors that stopped without being removed.
    async fn check_conference_health(&mut self) {
        let finished: Vec<SessionId> = self
            .conferences
            .iter()
            .filter(|(_, managed)| managed.task_handle.is_finished())
            .map(|(session_id, _)| session_id.clone())
            .collect();

        for session_id in finished {
            let Some(managed) = self.forget(&session_id).await else {
                continue;
            };
            warn!(
                target: "cc.actor.registry",
                instance_id = %self.instance_id,
                session_id = %session_id,
                "Conference actor task finished unexpectedly"
            );

            if let Err(join_error) = managed.task_handle.await {
                if join_error.is_panic() {
                    error!(
                        target: "cc.actor.registry",
                        instance_id = %self.instance_id,
                        session_id = %session_id,
                        error = ?join_error,
                        "Conference actor panicked"
                    );
                    self.metrics.record_panic(ActorType::Conference);
                }
            }

            self.spawn_session_cleanup(session_id, None);
            self.metrics.conference_removed();
            prom::record_conference_lifecycle("crashed");
        }
    }
}
