//! At-least-once side effects (email, notifications).
//!
//! Purchase and Q&A flows commit their critical writes first and then hand
//! follow-up work to a [`SideEffectQueue`]. A failure to deliver a side effect
//! never fails the request that produced it.
//!
//! Two queue backends exist:
//! - [`ChannelQueue`]: an in-process tokio worker with bounded retries
//! - a NATS JetStream work queue in the server binary
//!
//! Both wrap effects in a versioned [`Envelope`] and run them through the same
//! [`SideEffectDispatcher`].

use crate::mail::{MailError, MailMessage, Mailer};
use crate::notification::Notification;
use crate::store::NotificationStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Effects the in-process queue holds before rejecting new ones.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// The current envelope version.
pub const ENVELOPE_VERSION: u32 = 1;

/// Work to perform after a request has committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SideEffect {
    /// Render and send an email.
    SendMail(MailMessage),
    /// Persist a notification.
    Notify(Notification),
}

impl SideEffect {
    /// Short label for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SendMail(_) => "send_mail",
            Self::Notify(_) => "notify",
        }
    }
}

/// A versioned wrapper around a queued side effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub version: u32,
    pub enqueued_at: DateTime<Utc>,
    pub payload: T,
}

impl<T> Envelope<T> {
    /// Wraps a payload with the current version.
    #[must_use]
    pub fn new(payload: T) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            enqueued_at: Utc::now(),
            payload,
        }
    }

    /// Returns true if this envelope uses the current version.
    #[must_use]
    pub fn is_current_version(&self) -> bool {
        self.version == ENVELOPE_VERSION
    }
}

impl<T: Serialize> Envelope<T> {
    /// Serializes the envelope to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl<T: for<'de> Deserialize<'de>> Envelope<T> {
    /// Deserializes an envelope from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Errors from queueing or performing side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffectError {
    /// The queue did not accept the effect.
    EnqueueFailed { details: String },
    /// The effect was dequeued but could not be performed.
    DispatchFailed { kind: &'static str, details: String },
}

impl fmt::Display for SideEffectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnqueueFailed { details } => write!(f, "failed to enqueue side effect: {details}"),
            Self::DispatchFailed { kind, details } => {
                write!(f, "side effect {kind} failed: {details}")
            }
        }
    }
}

impl std::error::Error for SideEffectError {}

impl From<MailError> for SideEffectError {
    fn from(e: MailError) -> Self {
        Self::DispatchFailed {
            kind: "send_mail",
            details: e.to_string(),
        }
    }
}

/// Accepts side effects for later delivery.
#[async_trait]
pub trait SideEffectQueue: Send + Sync {
    /// Queues an effect. Returning `Ok` means the effect will be attempted at
    /// least once.
    async fn enqueue(&self, effect: SideEffect) -> Result<(), SideEffectError>;
}

/// Performs side effects against the mailer and notification store.
pub struct SideEffectDispatcher {
    mailer: Arc<dyn Mailer>,
    notifications: Arc<dyn NotificationStore>,
}

impl SideEffectDispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(mailer: Arc<dyn Mailer>, notifications: Arc<dyn NotificationStore>) -> Self {
        Self {
            mailer,
            notifications,
        }
    }

    /// Performs one effect.
    ///
    /// Notification inserts are idempotent by id, so redelivery is harmless.
    ///
    /// # Errors
    ///
    /// Returns `DispatchFailed` if the mailer or store fails.
    #[instrument(skip_all, fields(kind = effect.kind()))]
    pub async fn dispatch(&self, effect: &SideEffect) -> Result<(), SideEffectError> {
        match effect {
            SideEffect::SendMail(message) => {
                self.mailer.send(message).await?;
                debug!(template = %message.template, "mail sent");
            }
            SideEffect::Notify(notification) => {
                self.notifications
                    .insert(notification)
                    .await
                    .map_err(|e| SideEffectError::DispatchFailed {
                        kind: "notify",
                        details: e.to_string(),
                    })?;
                debug!(notification_id = %notification.id, "notification stored");
            }
        }
        Ok(())
    }
}

/// How often and how patiently a failed effect is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each time after.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Returns the delay to wait after the given failed attempt (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

struct Pending {
    count: AtomicUsize,
    idle: Notify,
}

impl Pending {
    fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// In-process queue backed by a bounded tokio channel and a single worker
/// task.
///
/// Effects are delivered in order; a failing effect is retried with backoff
/// before the next one starts. When the channel is full, `enqueue` fails
/// instead of waiting. Effects still queued when the process exits are lost.
#[derive(Clone)]
pub struct ChannelQueue {
    sender: mpsc::Sender<Envelope<SideEffect>>,
    pending: Arc<Pending>,
}

impl ChannelQueue {
    /// Starts the worker with [`DEFAULT_QUEUE_CAPACITY`].
    #[must_use]
    pub fn spawn(
        dispatcher: Arc<SideEffectDispatcher>,
        policy: RetryPolicy,
    ) -> (Self, JoinHandle<()>) {
        Self::spawn_with_capacity(dispatcher, policy, DEFAULT_QUEUE_CAPACITY)
    }

    /// Starts the worker and returns the queue handle with the worker's
    /// join handle. The worker exits once every queue handle is dropped.
    ///
    /// `capacity` counts effects waiting behind the one being delivered; zero
    /// is treated as one.
    #[must_use]
    pub fn spawn_with_capacity(
        dispatcher: Arc<SideEffectDispatcher>,
        policy: RetryPolicy,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<Envelope<SideEffect>>(capacity.max(1));
        let pending = Arc::new(Pending {
            count: AtomicUsize::new(0),
            idle: Notify::new(),
        });

        let worker_pending = Arc::clone(&pending);
        let handle = tokio::spawn(async move {
            while let Some(envelope) = receiver.recv().await {
                deliver(&dispatcher, &policy, &envelope).await;
                worker_pending.finish();
            }
            info!("side effect worker stopped");
        });

        (Self { sender, pending }, handle)
    }

    /// Waits until every effect enqueued so far has been delivered or given
    /// up on.
    pub async fn drained(&self) {
        loop {
            let notified = self.pending.idle.notified();
            if self.pending.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

async fn deliver(
    dispatcher: &SideEffectDispatcher,
    policy: &RetryPolicy,
    envelope: &Envelope<SideEffect>,
) {
    let kind = envelope.payload.kind();
    for attempt in 1..=policy.max_attempts {
        match dispatcher.dispatch(&envelope.payload).await {
            Ok(()) => return,
            Err(e) if attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(kind, attempt, error = %e, ?delay, "side effect failed, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                error!(kind, attempt, error = %e, "side effect abandoned");
            }
        }
    }
}

#[async_trait]
impl SideEffectQueue for ChannelQueue {
    async fn enqueue(&self, effect: SideEffect) -> Result<(), SideEffectError> {
        self.pending.count.fetch_add(1, Ordering::SeqCst);
        self.sender.try_send(Envelope::new(effect)).map_err(|e| {
            self.pending.finish();
            let details = match e {
                mpsc::error::TrySendError::Full(_) => "side effect queue is full".to_string(),
                mpsc::error::TrySendError::Closed(_) => "side effect worker stopped".to_string(),
            };
            SideEffectError::EnqueueFailed { details }
        })
    }
}
