//! Redis list transport.
//!
//! Records travel as JSON [`PushEnvelope`] documents on Redis lists.
//! Producers `LPUSH` and the consumer `BRPOP`s, so each list behaves as a
//! FIFO queue and per-list publish order is preserved.

use std::{future::Future, pin::Pin, sync::Arc};

use chrono::{SecondsFormat, Utc};
use futures::FutureExt;
use redis::aio::MultiplexedConnection;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    encode_base64,
    transport::{PublishFuture, RecordPublisher, TransportError, TransportResult},
    Dispatcher, InboundMessage, PushEnvelope, MAX_IN_FLIGHT,
};

/// Builds the envelope published for a record.
fn envelope_for(payload: &[u8], ordering_key: &str, topic: &str) -> PushEnvelope {
    PushEnvelope {
        message: InboundMessage {
            data: encode_base64(payload),
            message_id: Some(Uuid::new_v4().to_string()),
            publish_time: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            attributes: Default::default(),
            ordering_key: Some(ordering_key.to_string()),
        },
        subscription: Some(topic.to_string()),
    }
}

/// Record publisher that pushes envelopes to a Redis list.
pub struct RedisPublisher {
    client: redis::Client,
    topic: String,
}

impl RedisPublisher {
    /// Creates a new [`RedisPublisher`] with the given Redis URL and topic
    /// (list name).
    pub fn new(url: &str, topic: String) -> TransportResult<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            error!(url = %url, error = %e, "Failed to create Redis client");
            TransportError::Connection(format!("Failed to create Redis client: {e}"))
        })?;
        info!(url = %url, topic = %topic, "Redis publisher initialized");
        Ok(Self { client, topic })
    }
}

impl RecordPublisher for RedisPublisher {
    fn publish<'a>(&'a self, payload: &'a [u8], ordering_key: &'a str) -> PublishFuture<'a> {
        Box::pin(async move {
            let envelope = envelope_for(payload, ordering_key, &self.topic);
            let message_id = envelope.message.id().to_string();
            let json = envelope.to_json().map_err(|e| {
                error!(
                    message_id = %message_id,
                    error = %e,
                    "Failed to serialize envelope to JSON"
                );
                TransportError::Serialization(e.to_string())
            })?;

            debug!(
                message_id = %message_id,
                topic = %self.topic,
                size = json.len(),
                "Connecting to Redis"
            );

            let mut conn = self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| {
                    error!(error = %e, "Failed to connect to Redis");
                    TransportError::Connection(format!("Failed to connect to Redis: {e}"))
                })?;

            redis::cmd("LPUSH")
                .arg(&self.topic)
                .arg(&json)
                .query_async::<()>(&mut conn)
                .await
                .map_err(|e| {
                    error!(
                        topic = %self.topic,
                        message_id = %message_id,
                        error = %e,
                        "Failed to LPUSH to Redis"
                    );
                    TransportError::Command(format!("Failed to push to Redis: {e}"))
                })?;

            info!(
                message_id = %message_id,
                topic = %self.topic,
                ordering_key = %ordering_key,
                size = payload.len(),
                "Published record to Redis"
            );

            Ok(message_id)
        })
    }

    fn destination(&self) -> &str {
        &self.topic
    }
}

/// Boxed future type for a single pop from an envelope source.
type PopFuture<'a> = Pin<Box<dyn Future<Output = TransportResult<Option<String>>> + Send + 'a>>;

/// Queue side of the consumer loop.
trait EnvelopeSource {
    /// Pops the next raw document, `None` when the wait timed out empty.
    fn pop(&mut self) -> PopFuture<'_>;
}

/// Blocking `BRPOP` over one list of a multiplexed connection.
struct BrpopSource {
    conn: MultiplexedConnection,
    cmd: redis::Cmd,
}

impl EnvelopeSource for BrpopSource {
    fn pop(&mut self) -> PopFuture<'_> {
        Box::pin(async move {
            let popped = self
                .cmd
                .query_async::<Option<(String, String)>>(&mut self.conn)
                .await
                .map_err(|e| TransportError::Command(format!("Failed to pop from Redis: {e}")))?;
            Ok(popped.map(|(_, json)| json))
        })
    }
}

/// Consumer that pops envelopes from a Redis list and dispatches them.
pub struct RedisSubscriber {
    client: redis::Client,
    queue: String,
    max_in_flight: u32,
    poll_timeout: f64,
}

impl RedisSubscriber {
    /// Creates a new [`RedisSubscriber`] for `queue`.
    ///
    /// At most `max_in_flight` dispatches run concurrently, clamped to
    /// `1..=MAX_IN_FLIGHT`. Each `BRPOP` blocks for at most `poll_timeout`
    /// seconds so shutdown is noticed.
    pub fn new(
        url: &str,
        queue: String,
        max_in_flight: usize,
        poll_timeout: f64,
    ) -> TransportResult<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            error!(url = %url, error = %e, "Failed to create Redis client");
            TransportError::Connection(format!("Failed to create Redis client: {e}"))
        })?;
        let max_in_flight = u32::try_from(max_in_flight)
            .unwrap_or(MAX_IN_FLIGHT)
            .clamp(1, MAX_IN_FLIGHT);
        info!(
            url = %url,
            queue = %queue,
            max_in_flight = max_in_flight,
            "Redis subscriber initialized"
        );
        Ok(Self {
            client,
            queue,
            max_in_flight,
            poll_timeout,
        })
    }

    /// Consumes the queue until `shutdown` resolves, dispatching every
    /// envelope on its own task.
    ///
    /// Documents that are not valid envelopes are logged and dropped.
    /// `shutdown` is checked between pops and a pop in progress is never
    /// abandoned, so shutdown takes effect within `poll_timeout` seconds and
    /// every envelope removed from the list is dispatched. The call returns
    /// after in-flight dispatches complete.
    pub async fn run<S>(&self, dispatcher: Arc<Dispatcher>, shutdown: S) -> TransportResult<()>
    where
        S: Future<Output = ()>,
    {
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to connect to Redis");
                TransportError::Connection(format!("Failed to connect to Redis: {e}"))
            })?;
        let mut cmd = redis::cmd("BRPOP");
        cmd.arg(&self.queue).arg(self.poll_timeout);
        let mut source = BrpopSource { conn, cmd };

        consume(
            &mut source,
            &self.queue,
            self.max_in_flight,
            dispatcher,
            shutdown,
        )
        .await
    }
}

async fn consume<Q, S>(
    source: &mut Q,
    queue: &str,
    max_in_flight: u32,
    dispatcher: Arc<Dispatcher>,
    shutdown: S,
) -> TransportResult<()>
where
    Q: EnvelopeSource,
    S: Future<Output = ()>,
{
    let permits = Arc::new(Semaphore::new(max_in_flight as usize));
    tokio::pin!(shutdown);

    info!(queue = %queue, "Consuming queue");

    while shutdown.as_mut().now_or_never().is_none() {
        let json = match source.pop().await {
            Ok(Some(json)) => json,
            Ok(None) => continue,
            Err(e) => {
                error!(queue = %queue, error = %e, "Failed to BRPOP from Redis");
                return Err(e);
            }
        };

        let envelope = match PushEnvelope::from_json(&json) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(
                    queue = %queue,
                    error = %e,
                    size = json.len(),
                    "Dropping document that is not a push envelope"
                );
                continue;
            }
        };

        let permit = permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            let _permit = permit;
            dispatcher.handle(envelope.message).await;
        });
    }

    info!(queue = %queue, "Shutdown requested, draining in-flight dispatches");
    let _drained = permits
        .acquire_many(max_in_flight)
        .await
        .map_err(|e| TransportError::Connection(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use tokio::sync::oneshot;

    use super::*;
    use crate::{testing::RecordingPublisher, RawEmailRecord, RecordCodec, ValidationPipeline};

    /// In-memory list. Every pop yields once, as a blocking pop would, and
    /// the first one fires `on_first_pop` before it completes.
    struct MemorySource {
        items: VecDeque<String>,
        on_first_pop: Option<oneshot::Sender<()>>,
    }

    impl EnvelopeSource for MemorySource {
        fn pop(&mut self) -> PopFuture<'_> {
            Box::pin(async move {
                if let Some(tx) = self.on_first_pop.take() {
                    let _ = tx.send(());
                }
                tokio::task::yield_now().await;
                Ok(self.items.pop_back())
            })
        }
    }

    fn envelope_json(from: &str) -> String {
        let record =
            RawEmailRecord::from_parts(from, &["rcpt@example.com"], b"Subject: x\r\n\r\n");
        let payload = RecordCodec::new().unwrap().encode(&record).unwrap();
        envelope_for(&payload, "email", "email").to_json().unwrap()
    }

    fn forwarding_dispatcher(publisher: Arc<RecordingPublisher>) -> Arc<Dispatcher> {
        Arc::new(Dispatcher::new(
            RecordCodec::new().unwrap(),
            ValidationPipeline::new(vec![]),
            publisher,
            "email".to_string(),
        ))
    }

    #[test]
    fn test_envelope_for_record() {
        let envelope = envelope_for(b"\x02a", "email", "validated");

        assert_eq!(envelope.message.payload().unwrap(), b"\x02a");
        assert_eq!(envelope.message.ordering_key.as_deref(), Some("email"));
        assert_eq!(envelope.subscription.as_deref(), Some("validated"));
        assert!(envelope.message.message_id.is_some());
        assert!(envelope.message.publish_time.is_some());
    }

    #[test]
    fn test_envelope_ids_are_unique() {
        let first = envelope_for(b"x", "email", "validated");
        let second = envelope_for(b"x", "email", "validated");
        assert_ne!(first.message.message_id, second.message.message_id);
    }

    #[test]
    fn test_redis_publisher_invalid_url() {
        let result = RedisPublisher::new("not-a-url", "validated".to_string());
        assert!(matches!(result, Err(TransportError::Connection(_))));
    }

    #[test]
    fn test_redis_publisher_destination() {
        let publisher =
            RedisPublisher::new("redis://127.0.0.1:6379", "validated".to_string()).unwrap();
        assert_eq!(publisher.destination(), "validated");
    }

    #[test]
    fn test_redis_subscriber_clamps_in_flight() {
        let subscriber =
            RedisSubscriber::new("redis://127.0.0.1:6379", "email".to_string(), 0, 1.0).unwrap();
        assert_eq!(subscriber.max_in_flight, 1);

        let subscriber = RedisSubscriber::new(
            "redis://127.0.0.1:6379",
            "email".to_string(),
            usize::MAX,
            1.0,
        )
        .unwrap();
        assert_eq!(subscriber.max_in_flight, MAX_IN_FLIGHT);
    }

    #[tokio::test]
    async fn test_shutdown_during_pop_still_dispatches_popped_envelope() {
        let (tx, rx) = oneshot::channel();
        let mut source = MemorySource {
            items: VecDeque::from([
                envelope_json("second@example.com"),
                envelope_json("first@example.com"),
            ]),
            on_first_pop: Some(tx),
        };
        let publisher = Arc::new(RecordingPublisher::default());
        let shutdown = async {
            let _ = rx.await;
        };

        consume(
            &mut source,
            "email",
            4,
            forwarding_dispatcher(publisher.clone()),
            shutdown,
        )
        .await
        .unwrap();

        let published = publisher.published();
        assert_eq!(published.len(), 1);
        let record = RecordCodec::new().unwrap().decode(&published[0].0).unwrap();
        assert_eq!(record.from(), "first@example.com");
        assert_eq!(source.items.len(), 1);
    }

    #[tokio::test]
    async fn test_consume_drops_documents_that_are_not_envelopes() {
        let (tx, rx) = oneshot::channel::<()>();
        let mut source = MemorySource {
            items: VecDeque::from([
                envelope_json("sender@example.com"),
                "not json".to_string(),
            ]),
            on_first_pop: None,
        };
        let publisher = Arc::new(RecordingPublisher::default());
        let dispatcher = forwarding_dispatcher(publisher.clone());
        let shutdown = async move {
            let _ = rx.await;
        };
        let stop = tokio::spawn(async move {
            while publisher.published().is_empty() {
                tokio::task::yield_now().await;
            }
            let _ = tx.send(());
            publisher
        });

        consume(&mut source, "email", 1, dispatcher, shutdown)
            .await
            .unwrap();

        let publisher = stop.await.unwrap();
        assert_eq!(publisher.published().len(), 1);
        assert!(source.items.is_empty());
    }
}
