//! Webhook aggregation, filtering and delivery for a scanning fleet.
//!
//! Producers hand game-state changes (Pokémon, gyms, raids, quests, weather,
//! accounts, ...) to per-kind queues. A scheduler drains the queues on a
//! fixed interval, filters each change per subscriber, maps survivors to the
//! `{type, message}` wire format and POSTs one batch per subscriber.
//!
//! ## Guarantees
//! - FIFO order within one entity kind
//! - Independent locks per entity kind
//! - Per-subscriber isolation of delivery failures
//! - Bounded retries with exponential backoff
//!
//! ## Non-Guarantees
//! - Durability across restarts
//! - Delivery of changes drained before shutdown
//! - Ordering across entity kinds

mod config;
mod dispatcher;
mod error;
mod filter;
mod ingest;
mod mapper;
mod memo;
mod queue;
mod scheduler;
mod subscriber;
mod types;

#[cfg(feature = "redis")]
mod ingest_redis;

pub use config::{load_config, DeliverySection, DispatchSection, IngestSection, WebhookConfig};
pub use dispatcher::{DeliveryReport, Dispatcher, DispatcherConfig};
pub use error::{
    ConfigError,
    DeliveryOutcome,
    FailureReason,
    GeofenceError,
    IngestError,
    MappingError,
    RegistryError,
};
pub use filter::{composite_pokemon_key, should_include, GeofencePredicate, RayCasting};
pub use ingest::{channel, decode_change, forward_lines, run_ingest, ChannelSource, EventSource};
pub use mapper::{to_payload, to_wire_payload, WebhookPayload};
pub use memo::SentEventMemo;
pub use queue::{EntityQueue, EntityQueues};
pub use scheduler::{DispatchScheduler, SchedulerConfig, SchedulerHandle, TickReport};
pub use subscriber::{Subscriber, SubscriberRegistry};
pub use types::{
    Account,
    Coordinate,
    EntityChange,
    EntityKind,
    Gym,
    GymDefender,
    GymTrainer,
    Invasion,
    Pokemon,
    Pokestop,
    Polygon,
    Quest,
    Raid,
    Weather,
};

#[cfg(feature = "redis")]
pub use ingest_redis::RedisSource;
