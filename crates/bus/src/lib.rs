//! Message Bus Adapter (C7): `publish(envelope)` onto a durable fanout
//! exchange bound to a durable work queue, and `consume()` with manual
//! acknowledgement (spec §4.7). Envelopes are self-contained JSON; workers
//! never rely on API-side memory.

mod delivery;
mod envelope;

pub use delivery::BusDelivery;
pub use envelope::Envelope;

use futures::StreamExt;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use metget_core::MetGetError;

const ROUTING_KEY: &str = "build";

/// One `MessageBus` per process: a single AMQP connection + channel, shared
/// across every `publish`/`consume` call, mirroring the teacher's
/// one-`PgPool`-per-process pattern for the database.
pub struct MessageBus {
    channel: Channel,
    exchange: String,
    queue: String,
}

impl MessageBus {
    /// Connects, then declares a durable fanout exchange bound to a durable
    /// queue — both idempotent, so repeated calls across replicas converge
    /// on the same topology instead of racing to create it.
    pub async fn connect(amqp_url: &str, exchange: &str, queue: &str) -> Result<Self, MetGetError> {
        let conn = Connection::connect(amqp_url, ConnectionProperties::default())
            .await
            .map_err(|e| MetGetError::UpstreamUnavailable(format!("amqp connect failed: {e}")))?;
        let channel = conn
            .create_channel()
            .await
            .map_err(|e| MetGetError::UpstreamUnavailable(format!("amqp channel failed: {e}")))?;

        channel
            .exchange_declare(
                exchange,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| MetGetError::Internal(format!("exchange_declare failed: {e}")))?;

        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| MetGetError::Internal(format!("queue_declare failed: {e}")))?;

        channel
            .queue_bind(
                queue,
                exchange,
                ROUTING_KEY,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| MetGetError::Internal(format!("queue_bind failed: {e}")))?;

        Ok(Self {
            channel,
            exchange: exchange.to_string(),
            queue: queue.to_string(),
        })
    }

    /// Publishes `envelope` as a persistent message (delivery_mode=2) so it
    /// survives a broker restart between publish and consume.
    pub async fn publish(&self, envelope: &Envelope) -> Result<(), MetGetError> {
        let body = serde_json::to_vec(envelope)
            .map_err(|e| MetGetError::Internal(format!("envelope serialize failed: {e}")))?;

        self.channel
            .basic_publish(
                &self.exchange,
                ROUTING_KEY,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await
            .map_err(|e| MetGetError::UpstreamUnavailable(format!("publish failed: {e}")))?
            .await
            .map_err(|e| MetGetError::UpstreamUnavailable(format!("publish not confirmed: {e}")))?;

        Ok(())
    }

    /// Starts a manual-ack consumer on the bound work queue. Each yielded
    /// `BusDelivery` must be explicitly `ack`ed or `nack`ed by the caller
    /// (the Build Worker, spec §4.9) — dropping it without doing either
    /// leaves it unacknowledged until the channel closes, at which point the
    /// broker redelivers it.
    pub async fn consume(&self, consumer_tag: &str) -> Result<impl futures::Stream<Item = BusDelivery>, MetGetError> {
        let consumer = self
            .channel
            .basic_consume(
                &self.queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| MetGetError::Internal(format!("basic_consume failed: {e}")))?;

        Ok(consumer.filter_map(|result| async move {
            match result {
                Ok(delivery) => Some(BusDelivery::new(delivery)),
                Err(e) => {
                    tracing::warn!(error = %e, "dropped malformed AMQP delivery");
                    None
                }
            }
        }))
    }
}
