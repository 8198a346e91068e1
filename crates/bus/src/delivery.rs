use lapin::options::{BasicAckOptions, BasicNackOptions};
use lapin::message::Delivery;
use metget_core::MetGetError;

use crate::Envelope;

/// A single AMQP delivery paired with its decoded `Envelope`, requiring an
/// explicit `ack`/`nack` from the worker that consumed it.
pub struct BusDelivery {
    inner: Delivery,
    envelope: Option<Envelope>,
}

impl BusDelivery {
    pub(crate) fn new(inner: Delivery) -> Self {
        let envelope = serde_json::from_slice(&inner.data).ok();
        Self { inner, envelope }
    }

    /// `None` if the delivery body did not parse as an `Envelope`; the
    /// caller should `nack` without requeue in that case (spec §7:
    /// malformed input cannot become valid by retrying).
    pub fn envelope(&self) -> Option<&Envelope> {
        self.envelope.as_ref()
    }

    pub async fn ack(self) -> Result<(), MetGetError> {
        self.inner
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| MetGetError::Internal(format!("ack failed: {e}")))
    }

    pub async fn nack(self, requeue: bool) -> Result<(), MetGetError> {
        self.inner
            .nack(BasicNackOptions {
                requeue,
                ..Default::default()
            })
            .await
            .map_err(|e| MetGetError::Internal(format!("nack failed: {e}")))
    }
}
