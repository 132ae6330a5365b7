use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::types::{EntityKind, Polygon};

/// A configured webhook endpoint and the filters applied before delivery.
///
/// All id lists are deny-lists: a change whose attribute is listed is not
/// sent to this subscriber. Empty lists disable the corresponding check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    /// Unique key.
    pub name: String,

    /// Target URL for delivery.
    pub url: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Kinds this subscriber consumes.
    #[serde(default, rename = "types")]
    pub enabled_types: HashSet<EntityKind>,

    /// Empty means no location restriction.
    #[serde(default)]
    pub geofences: Vec<Polygon>,

    /// Advisory minimum delay before a batch is posted.
    #[serde(default)]
    pub delay_seconds: u64,

    /// Composite keys `"{id}[_f{form}][_c{costume}][_g{gender}]"`.
    #[serde(default)]
    pub pokemon_ids: HashSet<String>,
    #[serde(default)]
    pub pokestop_ids: HashSet<String>,
    /// Composite keys, same format as `pokemon_ids`.
    #[serde(default)]
    pub raid_pokemon_ids: HashSet<String>,
    #[serde(default)]
    pub egg_levels: HashSet<u32>,
    #[serde(default)]
    pub lure_ids: HashSet<u32>,
    /// Grunt types.
    #[serde(default)]
    pub invasion_ids: HashSet<u32>,
    #[serde(default)]
    pub gym_ids: HashSet<String>,
    #[serde(default)]
    pub gym_team_ids: HashSet<u32>,
    #[serde(default)]
    pub weather_condition_ids: HashSet<u32>,
}

fn default_enabled() -> bool {
    true
}

impl Subscriber {
    /// Enabled subscriber with no types, no geofence and no filters.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            enabled: true,
            enabled_types: HashSet::new(),
            geofences: Vec::new(),
            delay_seconds: 0,
            pokemon_ids: HashSet::new(),
            pokestop_ids: HashSet::new(),
            raid_pokemon_ids: HashSet::new(),
            egg_levels: HashSet::new(),
            lure_ids: HashSet::new(),
            invasion_ids: HashSet::new(),
            gym_ids: HashSet::new(),
            gym_team_ids: HashSet::new(),
            weather_condition_ids: HashSet::new(),
        }
    }

    pub fn with_types(mut self, kinds: impl IntoIterator<Item = EntityKind>) -> Self {
        self.enabled_types.extend(kinds);
        self
    }

    pub fn with_geofence(mut self, polygon: Polygon) -> Self {
        self.geofences.push(polygon);
        self
    }

    pub fn with_pokemon_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pokemon_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_raid_pokemon_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.raid_pokemon_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_delay(mut self, seconds: u64) -> Self {
        self.delay_seconds = seconds;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn consumes(&self, kind: EntityKind) -> bool {
        self.enabled_types.contains(&kind)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_seconds)
    }
}

/// Shared, reloadable set of subscribers.
///
/// Readers take an `Arc` snapshot and never observe a partial reload.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    current: RwLock<Arc<Vec<Arc<Subscriber>>>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscribers(subscribers: Vec<Subscriber>) -> Result<Self, RegistryError> {
        let registry = Self::new();
        registry.replace(subscribers)?;
        Ok(registry)
    }

    pub fn snapshot(&self) -> Arc<Vec<Arc<Subscriber>>> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Validate and swap in a new subscriber list.
    pub fn replace(&self, subscribers: Vec<Subscriber>) -> Result<(), RegistryError> {
        validate(&subscribers)?;
        let next = Arc::new(subscribers.into_iter().map(Arc::new).collect::<Vec<_>>());
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = next;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Subscriber>> {
        self.snapshot().iter().find(|s| s.name == name).cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn validate(subscribers: &[Subscriber]) -> Result<(), RegistryError> {
    let mut names = HashSet::new();
    for subscriber in subscribers {
        if subscriber.url.trim().is_empty() {
            return Err(RegistryError::EmptyUrl(subscriber.name.clone()));
        }
        if !names.insert(subscriber.name.as_str()) {
            return Err(RegistryError::DuplicateName(subscriber.name.clone()));
        }
    }
    Ok(())
}
