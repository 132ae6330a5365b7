use std::fmt;

use serde::{Deserialize, Serialize};

/// Category of a game-state change.
///
/// The declaration order is the order in which the scheduler drains the
/// per-kind queues on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Pokemon,
    Pokestop,
    Lure,
    Invasion,
    Quest,
    AlternativeQuest,
    Gym,
    GymInfo,
    GymDefender,
    GymTrainer,
    Egg,
    Raid,
    Weather,
    Account,
}

impl EntityKind {
    pub const COUNT: usize = 14;

    pub const ALL: [EntityKind; Self::COUNT] = [
        EntityKind::Pokemon,
        EntityKind::Pokestop,
        EntityKind::Lure,
        EntityKind::Invasion,
        EntityKind::Quest,
        EntityKind::AlternativeQuest,
        EntityKind::Gym,
        EntityKind::GymInfo,
        EntityKind::GymDefender,
        EntityKind::GymTrainer,
        EntityKind::Egg,
        EntityKind::Raid,
        EntityKind::Weather,
        EntityKind::Account,
    ];

    /// Position of this kind in [`EntityKind::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Wire `type` string sent to webhook consumers.
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Pokemon => "pokemon",
            EntityKind::Pokestop => "pokestop",
            EntityKind::Lure => "lure",
            EntityKind::Invasion => "invasion",
            EntityKind::Quest => "quest",
            EntityKind::AlternativeQuest => "alternative-quest",
            EntityKind::Gym => "gym",
            EntityKind::GymInfo => "gym-info",
            EntityKind::GymDefender => "gym-defender",
            EntityKind::GymTrainer => "gym-trainer",
            EntityKind::Egg => "egg",
            EntityKind::Raid => "raid",
            EntityKind::Weather => "weather",
            EntityKind::Account => "account",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A latitude/longitude pair.
///
/// Serialized as a two element array `[lat, lon]` so geofences stay
/// compact in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((latitude, longitude): (f64, f64)) -> Self {
        Self { latitude, longitude }
    }
}

impl From<Coordinate> for (f64, f64) {
    fn from(c: Coordinate) -> Self {
        (c.latitude, c.longitude)
    }
}

/// Closed ring of coordinates. The closing edge is implicit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Polygon(pub Vec<Coordinate>);

impl Polygon {
    pub fn new(points: impl Into<Vec<Coordinate>>) -> Self {
        Self(points.into())
    }

    pub fn points(&self) -> &[Coordinate] {
        &self.0
    }
}

/// Wild Pokémon sighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pokemon {
    /// Encounter id.
    pub id: String,
    pub pokemon_id: u32,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub form: Option<u32>,
    #[serde(default)]
    pub costume: Option<u32>,
    #[serde(default)]
    pub gender: Option<u32>,
    #[serde(default)]
    pub spawn_id: Option<u64>,
    #[serde(default)]
    pub pokestop_id: Option<String>,
    pub expire_timestamp: u64,
    #[serde(default)]
    pub expire_timestamp_verified: bool,
    #[serde(default)]
    pub first_seen_timestamp: u64,
    #[serde(default)]
    pub updated: u64,
    #[serde(default)]
    pub cp: Option<u32>,
    #[serde(default)]
    pub atk_iv: Option<u8>,
    #[serde(default)]
    pub def_iv: Option<u8>,
    #[serde(default)]
    pub sta_iv: Option<u8>,
    #[serde(default)]
    pub level: Option<u8>,
    #[serde(default)]
    pub move_1: Option<u32>,
    #[serde(default)]
    pub move_2: Option<u32>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub size: Option<f64>,
    #[serde(default)]
    pub weather: Option<u32>,
    #[serde(default)]
    pub shiny: Option<bool>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub display_pokemon_id: Option<u32>,
    #[serde(default)]
    pub is_event: bool,
}

impl Pokemon {
    /// Minimal sighting with everything optional left unset.
    pub fn new(id: impl Into<String>, pokemon_id: u32, latitude: f64, longitude: f64) -> Self {
        Self {
            id: id.into(),
            pokemon_id,
            latitude,
            longitude,
            form: None,
            costume: None,
            gender: None,
            spawn_id: None,
            pokestop_id: None,
            expire_timestamp: 0,
            expire_timestamp_verified: false,
            first_seen_timestamp: 0,
            updated: 0,
            cp: None,
            atk_iv: None,
            def_iv: None,
            sta_iv: None,
            level: None,
            move_1: None,
            move_2: None,
            weight: None,
            size: None,
            weather: None,
            shiny: None,
            username: None,
            display_pokemon_id: None,
            is_event: false,
        }
    }

    pub fn with_form(mut self, form: u32) -> Self {
        self.form = Some(form);
        self
    }

    pub fn with_costume(mut self, costume: u32) -> Self {
        self.costume = Some(costume);
        self
    }

    pub fn with_gender(mut self, gender: u32) -> Self {
        self.gender = Some(gender);
        self
    }
}

/// Pokéstop snapshot, also used for lure changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pokestop {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub lure_id: u32,
    #[serde(default)]
    pub lure_expire_timestamp: Option<u64>,
    #[serde(default)]
    pub last_modified_timestamp: Option<u64>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub ar_scan_eligible: bool,
    #[serde(default)]
    pub power_up_level: Option<u32>,
    #[serde(default)]
    pub updated: u64,
}

impl Pokestop {
    pub fn new(id: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            id: id.into(),
            latitude,
            longitude,
            name: None,
            url: None,
            lure_id: 0,
            lure_expire_timestamp: None,
            last_modified_timestamp: None,
            enabled: true,
            ar_scan_eligible: false,
            power_up_level: None,
            updated: 0,
        }
    }

    pub fn with_lure(mut self, lure_id: u32, expires_at: u64) -> Self {
        self.lure_id = lure_id;
        self.lure_expire_timestamp = Some(expires_at);
        self
    }
}

/// Team Rocket incident at a Pokéstop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invasion {
    pub pokestop_id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    pub grunt_type: u32,
    #[serde(default)]
    pub display_type: u32,
    pub expire_timestamp: u64,
    #[serde(default)]
    pub updated: u64,
}

/// Field research quest. The same shape carries alternative (AR) quests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quest {
    pub pokestop_id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    pub quest_type: u32,
    #[serde(default)]
    pub target: u32,
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub conditions: serde_json::Value,
    #[serde(default)]
    pub rewards: serde_json::Value,
    pub timestamp: u64,
}

/// Gym snapshot, used for both `gym` and `gym-info` changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gym {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub team_id: u32,
    #[serde(default)]
    pub available_slots: u32,
    #[serde(default)]
    pub guarding_pokemon_id: u32,
    #[serde(default)]
    pub raid_level: u32,
    #[serde(default)]
    pub total_cp: u32,
    #[serde(default)]
    pub ex_raid_eligible: bool,
    #[serde(default)]
    pub in_battle: bool,
    #[serde(default)]
    pub sponsor_id: Option<u32>,
    #[serde(default)]
    pub partner_id: Option<String>,
    #[serde(default)]
    pub power_up_level: Option<u32>,
    #[serde(default)]
    pub ar_scan_eligible: bool,
    #[serde(default)]
    pub updated: u64,
}

impl Gym {
    pub fn new(id: impl Into<String>, latitude: f64, longitude: f64, team_id: u32) -> Self {
        Self {
            id: id.into(),
            latitude,
            longitude,
            name: None,
            url: None,
            description: None,
            team_id,
            available_slots: 0,
            guarding_pokemon_id: 0,
            raid_level: 0,
            total_cp: 0,
            ex_raid_eligible: false,
            in_battle: false,
            sponsor_id: None,
            partner_id: None,
            power_up_level: None,
            ar_scan_eligible: false,
            updated: 0,
        }
    }
}

/// Pokémon deployed at a gym.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GymDefender {
    pub gym_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub pokemon_id: u32,
    #[serde(default)]
    pub form: Option<u32>,
    #[serde(default)]
    pub costume: Option<u32>,
    #[serde(default)]
    pub gender: Option<u32>,
    #[serde(default)]
    pub cp: u32,
    #[serde(default)]
    pub shiny: bool,
    #[serde(default)]
    pub deployed_ms: u64,
    #[serde(default)]
    pub battles_won: u32,
    #[serde(default)]
    pub battles_lost: u32,
    #[serde(default)]
    pub trainer_name: Option<String>,
    #[serde(default)]
    pub updated: u64,
}

/// Trainer that owns a gym defender. Carries no location of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GymTrainer {
    pub name: String,
    #[serde(default)]
    pub gym_id: Option<String>,
    pub level: u32,
    pub team_id: u32,
    #[serde(default)]
    pub battles_won: u32,
    #[serde(default)]
    pub km_walked: f64,
    #[serde(default)]
    pub pokemon_caught: u32,
    #[serde(default)]
    pub experience: u64,
    #[serde(default)]
    pub combat_rank: u32,
    #[serde(default)]
    pub combat_rating: f64,
    #[serde(default)]
    pub has_shared_ex_pass: bool,
    #[serde(default)]
    pub gym_badge_type: u32,
    #[serde(default)]
    pub updated: u64,
}

/// Raid or egg at a gym. An egg is a raid whose boss is not hatched yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Raid {
    pub gym_id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub gym_name: Option<String>,
    #[serde(default)]
    pub gym_url: Option<String>,
    #[serde(default)]
    pub team_id: u32,
    pub level: u32,
    pub spawn_timestamp: u64,
    pub battle_timestamp: u64,
    pub end_timestamp: u64,
    #[serde(default)]
    pub pokemon_id: u32,
    #[serde(default)]
    pub form: Option<u32>,
    #[serde(default)]
    pub costume: Option<u32>,
    #[serde(default)]
    pub gender: Option<u32>,
    #[serde(default)]
    pub evolution: Option<u32>,
    #[serde(default)]
    pub cp: Option<u32>,
    #[serde(default)]
    pub move_1: Option<u32>,
    #[serde(default)]
    pub move_2: Option<u32>,
    #[serde(default)]
    pub ex_raid_eligible: bool,
    #[serde(default)]
    pub is_exclusive: bool,
    #[serde(default)]
    pub sponsor_id: Option<u32>,
    #[serde(default)]
    pub partner_id: Option<String>,
}

impl Raid {
    pub fn new(gym_id: impl Into<String>, latitude: f64, longitude: f64, level: u32) -> Self {
        Self {
            gym_id: gym_id.into(),
            latitude,
            longitude,
            gym_name: None,
            gym_url: None,
            team_id: 0,
            level,
            spawn_timestamp: 0,
            battle_timestamp: 0,
            end_timestamp: 0,
            pokemon_id: 0,
            form: None,
            costume: None,
            gender: None,
            evolution: None,
            cp: None,
            move_1: None,
            move_2: None,
            ex_raid_eligible: false,
            is_exclusive: false,
            sponsor_id: None,
            partner_id: None,
        }
    }

    pub fn with_boss(mut self, pokemon_id: u32, form: Option<u32>) -> Self {
        self.pokemon_id = pokemon_id;
        self.form = form;
        self
    }
}

/// Weather conditions of one S2 level-10 cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    /// S2 cell id.
    pub id: i64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub level: u8,
    pub gameplay_condition: u32,
    #[serde(default)]
    pub wind_direction: u32,
    #[serde(default)]
    pub cloud_level: u32,
    #[serde(default)]
    pub rain_level: u32,
    #[serde(default)]
    pub wind_level: u32,
    #[serde(default)]
    pub snow_level: u32,
    #[serde(default)]
    pub fog_level: u32,
    #[serde(default)]
    pub special_effect_level: u32,
    #[serde(default)]
    pub severity: Option<u32>,
    #[serde(default)]
    pub warn_weather: Option<bool>,
    #[serde(default)]
    pub updated: u64,
}

/// Scanner account state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    pub level: u32,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub first_warning_timestamp: Option<u64>,
    #[serde(default)]
    pub failed: Option<String>,
    #[serde(default)]
    pub failed_timestamp: Option<u64>,
    #[serde(default)]
    pub banned: bool,
    #[serde(default)]
    pub warn: bool,
    #[serde(default)]
    pub warn_expire_timestamp: Option<u64>,
    #[serde(default)]
    pub was_suspended: bool,
    #[serde(default)]
    pub suspended_message_acknowledged: bool,
    #[serde(default)]
    pub warn_message_acknowledged: bool,
    #[serde(default)]
    pub last_used_timestamp: Option<u64>,
}

/// One observed game-state change, handed to the pipeline by value.
///
/// On the ingestion wire this is `{"kind": "<kind>", "entity": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "entity", rename_all = "kebab-case")]
pub enum EntityChange {
    Pokemon(Pokemon),
    Pokestop(Pokestop),
    Lure(Pokestop),
    Invasion(Invasion),
    Quest(Quest),
    AlternativeQuest(Quest),
    Gym(Gym),
    GymInfo(Gym),
    GymDefender(GymDefender),
    GymTrainer(GymTrainer),
    Egg(Raid),
    Raid(Raid),
    Weather(Weather),
    Account(Account),
}

impl EntityChange {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityChange::Pokemon(_) => EntityKind::Pokemon,
            EntityChange::Pokestop(_) => EntityKind::Pokestop,
            EntityChange::Lure(_) => EntityKind::Lure,
            EntityChange::Invasion(_) => EntityKind::Invasion,
            EntityChange::Quest(_) => EntityKind::Quest,
            EntityChange::AlternativeQuest(_) => EntityKind::AlternativeQuest,
            EntityChange::Gym(_) => EntityKind::Gym,
            EntityChange::GymInfo(_) => EntityKind::GymInfo,
            EntityChange::GymDefender(_) => EntityKind::GymDefender,
            EntityChange::GymTrainer(_) => EntityKind::GymTrainer,
            EntityChange::Egg(_) => EntityKind::Egg,
            EntityChange::Raid(_) => EntityKind::Raid,
            EntityChange::Weather(_) => EntityKind::Weather,
            EntityChange::Account(_) => EntityKind::Account,
        }
    }

    /// Location used for geofence checks. `None` for changes that have none.
    pub fn coordinate(&self) -> Option<Coordinate> {
        let (lat, lon) = match self {
            EntityChange::Pokemon(p) => (p.latitude, p.longitude),
            EntityChange::Pokestop(s) | EntityChange::Lure(s) => (s.latitude, s.longitude),
            EntityChange::Invasion(i) => (i.latitude, i.longitude),
            EntityChange::Quest(q) | EntityChange::AlternativeQuest(q) => (q.latitude, q.longitude),
            EntityChange::Gym(g) | EntityChange::GymInfo(g) => (g.latitude, g.longitude),
            EntityChange::GymDefender(d) => (d.latitude, d.longitude),
            EntityChange::Egg(r) | EntityChange::Raid(r) => (r.latitude, r.longitude),
            EntityChange::Weather(w) => (w.latitude, w.longitude),
            EntityChange::GymTrainer(_) | EntityChange::Account(_) => return None,
        };
        Some(Coordinate::new(lat, lon))
    }

    /// Identity used to suppress re-sends of the same change.
    ///
    /// Includes the change's own timestamp where one exists, so a later
    /// update of the same entity is not mistaken for a duplicate.
    pub fn identity(&self) -> String {
        let kind = self.kind();
        match self {
            EntityChange::Pokemon(p) => format!("{kind}:{}:{}", p.id, p.updated),
            EntityChange::Pokestop(s) => format!("{kind}:{}:{}", s.id, s.updated),
            EntityChange::Lure(s) => format!(
                "{kind}:{}:{}:{}",
                s.id,
                s.lure_id,
                s.lure_expire_timestamp.unwrap_or_default()
            ),
            EntityChange::Invasion(i) => {
                format!("{kind}:{}:{}:{}", i.pokestop_id, i.grunt_type, i.expire_timestamp)
            }
            EntityChange::Quest(q) | EntityChange::AlternativeQuest(q) => {
                format!("{kind}:{}:{}", q.pokestop_id, q.timestamp)
            }
            EntityChange::Gym(g) | EntityChange::GymInfo(g) => format!("{kind}:{}:{}", g.id, g.updated),
            EntityChange::GymDefender(d) => {
                format!("{kind}:{}:{}:{}", d.gym_id, d.pokemon_id, d.deployed_ms)
            }
            EntityChange::GymTrainer(t) => format!("{kind}:{}:{}", t.name, t.updated),
            EntityChange::Egg(r) | EntityChange::Raid(r) => {
                format!("{kind}:{}:{}:{}", r.gym_id, r.pokemon_id, r.end_timestamp)
            }
            EntityChange::Weather(w) => format!("{kind}:{}:{}", w.id, w.updated),
            EntityChange::Account(a) => format!(
                "{kind}:{}:{}:{}",
                a.username,
                a.failed.as_deref().unwrap_or(""),
                a.failed_timestamp.unwrap_or_default()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_index_matches_all_order() {
        for (i, kind) in EntityKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn kind_serde_uses_wire_names() {
        let json = serde_json::to_string(&EntityKind::AlternativeQuest).unwrap();
        assert_eq!(json, "\"alternative-quest\"");
        let kind: EntityKind = serde_json::from_str("\"gym-defender\"").unwrap();
        assert_eq!(kind, EntityKind::GymDefender);
    }

    #[test]
    fn coordinate_is_array_in_config() {
        let polygon: Polygon = serde_json::from_str("[[1.0, 2.0], [3.0, 4.0]]").unwrap();
        assert_eq!(polygon.points()[1], Coordinate::new(3.0, 4.0));
    }

    #[test]
    fn change_decodes_from_tagged_json() {
        let json = r#"{"kind":"pokemon","entity":{"id":"e1","pokemon_id":25,"latitude":1.0,"longitude":1.0,"expire_timestamp":10}}"#;
        let change: EntityChange = serde_json::from_str(json).unwrap();
        assert_eq!(change.kind(), EntityKind::Pokemon);
        assert_eq!(change.coordinate(), Some(Coordinate::new(1.0, 1.0)));
    }

    #[test]
    fn account_and_trainer_have_no_coordinate() {
        let trainer = EntityChange::GymTrainer(GymTrainer {
            name: "ash".into(),
            gym_id: None,
            level: 40,
            team_id: 1,
            battles_won: 0,
            km_walked: 0.0,
            pokemon_caught: 0,
            experience: 0,
            combat_rank: 0,
            combat_rating: 0.0,
            has_shared_ex_pass: false,
            gym_badge_type: 0,
            updated: 0,
        });
        assert!(trainer.coordinate().is_none());
    }

    #[test]
    fn identity_changes_with_update() {
        let mut p = Pokemon::new("e1", 25, 0.0, 0.0);
        let first = EntityChange::Pokemon(p.clone()).identity();
        p.updated = 5;
        let second = EntityChange::Pokemon(p).identity();
        assert_ne!(first, second);
        assert!(first.starts_with("pokemon:e1"));
    }
}
