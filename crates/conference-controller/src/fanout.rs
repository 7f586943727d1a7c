//! Subscription fan-out.
//!
//! Given the targets a committed participant mutation produced, issue one
//! platform subscribe call per target, concurrently. A failed call is logged
//! and counted and does not affect the others. There are no retries; the
//! next state change computes fresh targets from the store.

use crate::observability::metrics;
use crate::platform::SharedPlatform;
use crate::store::SubscriptionTarget;
use common::types::SessionId;
use futures::future::join_all;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// What caused a fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutTrigger {
    /// A participant connected: it subscribes to existing streams.
    ParticipantConnected,
    /// A stream was published: connected participants subscribe to it.
    StreamPublished,
}

impl FanoutTrigger {
    /// Returns the trigger as a string for metric labels.
    pub const fn as_str(self) -> &'static str {
        match self {
            FanoutTrigger::ParticipantConnected => "participant_connected",
            FanoutTrigger::StreamPublished => "stream_published",
        }
    }
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Issue every subscription concurrently and wait for all of them.
#[instrument(skip_all, fields(session_id = %session_id, trigger = trigger.as_str(), targets = targets.len()))]
pub async fn issue_subscriptions(
    platform: SharedPlatform,
    session_id: SessionId,
    trigger: FanoutTrigger,
    targets: Vec<SubscriptionTarget>,
) -> FanoutReport {
    let start = Instant::now();

    let results = join_all(targets.iter().map(|target| {
        let platform = &platform;
        let session_id = &session_id;
        async move {
            let result = platform
                .subscribe(session_id, &target.subscriber, &target.stream_id)
                .await;
            (target, result)
        }
    }))
    .await;

    let mut report = FanoutReport {
        attempted: results.len(),
        ..FanoutReport::default()
    };

    for (target, result) in results {
        match result {
            Ok(()) => {
                report.succeeded += 1;
                metrics::record_subscription(trigger.as_str(), true);
                debug!(
                    target: "cc.fanout",
                    session_id = %session_id,
                    subscriber = %target.subscriber,
                    publisher = %target.publisher,
                    stream_id = %target.stream_id,
                    "Subscription issued"
                );
            }
            Err(e) => {
                report.failed += 1;
                metrics::record_subscription(trigger.as_str(), false);
                warn!(
                    target: "cc.fanout",
                    session_id = %session_id,
                    subscriber = %target.subscriber,
                    publisher = %target.publisher,
                    stream_id = %target.stream_id,
                    error = %e,
                    "Subscription failed"
                );
            }
        }
    }

    metrics::record_fanout_duration(trigger.as_str(), start.elapsed());

    info!(
        target: "cc.fanout",
        session_id = %session_id,
        trigger = trigger.as_str(),
        attempted = report.attempted,
        succeeded = report.succeeded,
        failed = report.failed,
        "Fan-out complete"
    );

    report
}

/// Run [`issue_subscriptions`] on a background task.
pub fn spawn_fanout(
    platform: SharedPlatform,
    session_id: SessionId,
    trigger: FanoutTrigger,
    targets: Vec<SubscriptionTarget>,
) -> JoinHandle<FanoutReport> {
    tokio::spawn(issue_subscriptions(platform, session_id, trigger, targets))
}
