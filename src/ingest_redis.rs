#[cfg(feature = "redis")]
use async_trait::async_trait;
#[cfg(feature = "redis")]
use futures::StreamExt;
#[cfg(feature = "redis")]
use tracing::info;

#[cfg(feature = "redis")]
use crate::error::IngestError;
#[cfg(feature = "redis")]
use crate::ingest::{decode_change, EventSource};
#[cfg(feature = "redis")]
use crate::types::EntityChange;

/// Redis pub/sub subscription carrying JSON encoded changes.
///
/// Used when the processes observing game state publish to Redis instead of
/// sharing memory with the dispatcher.
#[cfg(feature = "redis")]
pub struct RedisSource {
    pubsub: redis::aio::PubSub,
    channel: String,
}

#[cfg(feature = "redis")]
impl RedisSource {
    pub async fn connect(url: &str, channel: impl Into<String>) -> Result<Self, IngestError> {
        let channel = channel.into();
        let client = redis::Client::open(url).map_err(|e| IngestError::Connection(e.to_string()))?;
        let conn = client
            .get_async_connection()
            .await
            .map_err(|e| IngestError::Connection(e.to_string()))?;
        let mut pubsub = conn.into_pubsub();
        pubsub
            .subscribe(&channel)
            .await
            .map_err(|e| IngestError::Connection(e.to_string()))?;
        info!(channel = %channel, "subscribed to redis change channel");
        Ok(Self { pubsub, channel })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

#[cfg(feature = "redis")]
#[async_trait]
impl EventSource for RedisSource {
    async fn recv(&mut self) -> Option<Result<EntityChange, IngestError>> {
        let msg = self.pubsub.on_message().next().await?;
        Some(decode_change(msg.get_payload_bytes()))
    }
}
