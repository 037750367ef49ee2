//! NATS JetStream side-effect queue.
//!
//! Effects are published to a work-queue stream and consumed by a durable
//! pull consumer. A message is acked only after its effect has been
//! dispatched; failures are negatively acked with a backoff delay and
//! redelivered until the retry policy is exhausted.

use crate::config::SideEffectConfig;
use async_nats::jetstream;
use async_nats::jetstream::AckKind;
use async_trait::async_trait;
use coursehub_catalog::{
    Envelope, RetryPolicy, SideEffect, SideEffectDispatcher, SideEffectError, SideEffectQueue,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Subject prefix for side effects; the effect kind is appended.
const SUBJECT_PREFIX: &str = "coursehub.side_effects";

/// Durable consumer shared by every server instance.
const CONSUMER_NAME: &str = "coursehub-side-effect-worker";

/// What to do with a delivered message after dispatching it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Ack,
    Retry(Duration),
    Abandon,
}

fn disposition(
    outcome: &Result<(), SideEffectError>,
    delivered: u32,
    policy: &RetryPolicy,
) -> Disposition {
    match outcome {
        Ok(()) => Disposition::Ack,
        Err(_) if delivered >= policy.max_attempts => Disposition::Abandon,
        Err(_) => Disposition::Retry(policy.delay_after(delivered)),
    }
}

fn subject_for(effect: &SideEffect) -> String {
    format!("{SUBJECT_PREFIX}.{}", effect.kind())
}

/// Side-effect queue backed by a JetStream work-queue stream.
#[derive(Clone)]
pub struct NatsQueue {
    jetstream: jetstream::Context,
    stream_name: String,
}

impl NatsQueue {
    /// Connects and ensures the stream exists.
    ///
    /// # Errors
    ///
    /// Returns `EnqueueFailed` if the connection or stream setup fails.
    pub async fn connect(url: &str, config: &SideEffectConfig) -> Result<Self, SideEffectError> {
        let client =
            async_nats::connect(url)
                .await
                .map_err(|e| SideEffectError::EnqueueFailed {
                    details: format!("failed to connect to nats: {e}"),
                })?;
        let jetstream = jetstream::new(client);

        let stream_config = jetstream::stream::Config {
            name: config.stream_name.clone(),
            subjects: vec![format!("{SUBJECT_PREFIX}.>")],
            storage: jetstream::stream::StorageType::File,
            retention: jetstream::stream::RetentionPolicy::WorkQueue,
            ..Default::default()
        };
        jetstream
            .get_or_create_stream(stream_config)
            .await
            .map_err(|e| SideEffectError::EnqueueFailed {
                details: format!("failed to create side effect stream: {e}"),
            })?;

        info!(stream = %config.stream_name, "side effect stream ready");
        Ok(Self {
            jetstream,
            stream_name: config.stream_name.clone(),
        })
    }

    /// Starts the consumer loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the consumer cannot be created.
    pub async fn spawn_worker(
        &self,
        dispatcher: Arc<SideEffectDispatcher>,
        policy: RetryPolicy,
    ) -> Result<JoinHandle<()>, SideEffectError> {
        let setup_error = |e: String| SideEffectError::DispatchFailed {
            kind: "consumer",
            details: e,
        };

        let stream = self
            .jetstream
            .get_stream(&self.stream_name)
            .await
            .map_err(|e| setup_error(e.to_string()))?;

        let consumer = stream
            .get_or_create_consumer(
                CONSUMER_NAME,
                jetstream::consumer::pull::Config {
                    durable_name: Some(CONSUMER_NAME.to_string()),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    max_deliver: i64::from(policy.max_attempts),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| setup_error(e.to_string()))?;

        let mut messages = consumer
            .messages()
            .await
            .map_err(|e| setup_error(e.to_string()))?;

        Ok(tokio::spawn(async move {
            while let Some(message) = messages.next().await {
                let message = match message {
                    Ok(message) => message,
                    Err(e) => {
                        warn!(error = %e, "side effect consumer error");
                        continue;
                    }
                };
                handle_message(&dispatcher, &policy, message).await;
            }
            info!("side effect consumer stopped");
        }))
    }
}

async fn handle_message(
    dispatcher: &SideEffectDispatcher,
    policy: &RetryPolicy,
    message: jetstream::Message,
) {
    let envelope = match Envelope::<SideEffect>::from_json_bytes(&message.payload) {
        Ok(envelope) if envelope.is_current_version() => envelope,
        Ok(envelope) => {
            error!(version = envelope.version, "unsupported side effect envelope");
            terminate(&message).await;
            return;
        }
        Err(e) => {
            error!(error = %e, "undecodable side effect");
            terminate(&message).await;
            return;
        }
    };

    let kind = envelope.payload.kind();
    let delivered = message
        .info()
        .map(|info| u32::try_from(info.delivered).unwrap_or(u32::MAX))
        .unwrap_or(1);

    let outcome = dispatcher.dispatch(&envelope.payload).await;
    let ack = match disposition(&outcome, delivered, policy) {
        Disposition::Ack => {
            debug!(kind, delivered, "side effect delivered");
            message.ack().await
        }
        Disposition::Retry(delay) => {
            if let Err(e) = &outcome {
                warn!(kind, delivered, error = %e, ?delay, "side effect failed, retrying");
            }
            message.ack_with(AckKind::Nak(Some(delay))).await
        }
        Disposition::Abandon => {
            if let Err(e) = &outcome {
                error!(kind, delivered, error = %e, "side effect abandoned");
            }
            message.ack_with(AckKind::Term).await
        }
    };
    if let Err(e) = ack {
        warn!(kind, error = %e, "failed to acknowledge side effect");
    }
}

async fn terminate(message: &jetstream::Message) {
    if let Err(e) = message.ack_with(AckKind::Term).await {
        warn!(error = %e, "failed to terminate side effect");
    }
}

#[async_trait]
impl SideEffectQueue for NatsQueue {
    async fn enqueue(&self, effect: SideEffect) -> Result<(), SideEffectError> {
        let subject = subject_for(&effect);
        let bytes = Envelope::new(effect)
            .to_json_bytes()
            .map_err(|e| SideEffectError::EnqueueFailed {
                details: format!("failed to serialize side effect: {e}"),
            })?;

        self.jetstream
            .publish(subject, bytes.into())
            .await
            .map_err(|e| SideEffectError::EnqueueFailed {
                details: e.to_string(),
            })?
            .await
            .map_err(|e| SideEffectError::EnqueueFailed {
                details: e.to_string(),
            })?;
        Ok(())
    }
}

impl std::fmt::Debug for NatsQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsQueue")
            .field("stream_name", &self.stream_name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursehub_catalog::Notification;
    use coursehub_core::UserId;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        }
    }

    fn failed() -> Result<(), SideEffectError> {
        Err(SideEffectError::DispatchFailed {
            kind: "notify",
            details: "db down".to_string(),
        })
    }

    #[test]
    fn success_is_acked() {
        assert_eq!(disposition(&Ok(()), 1, &policy()), Disposition::Ack);
    }

    #[test]
    fn failures_back_off_until_attempts_run_out() {
        assert_eq!(
            disposition(&failed(), 1, &policy()),
            Disposition::Retry(Duration::from_millis(100))
        );
        assert_eq!(
            disposition(&failed(), 2, &policy()),
            Disposition::Retry(Duration::from_millis(200))
        );
        assert_eq!(disposition(&failed(), 3, &policy()), Disposition::Abandon);
    }

    #[test]
    fn subjects_are_per_kind() {
        let effect = SideEffect::Notify(Notification::new(UserId::new(), "t", "m"));
        assert_eq!(subject_for(&effect), "coursehub.side_effects.notify");
    }
}
