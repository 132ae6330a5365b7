//! Conversion of typed changes into the `{type, message}` wire payload.
//!
//! Field names and order in the message structs are a contract with
//! third-party webhook consumers. Do not rename them.

use serde::Serialize;
use serde_json::Value;

use crate::error::MappingError;
use crate::types::{
    Account, EntityChange, Gym, GymDefender, GymTrainer, Invasion, Pokemon, Pokestop, Quest, Raid,
    Weather,
};

/// Typed wire payload. Serializes as `{"type": "<kind>", "message": {...}}`.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "message", rename_all = "kebab-case")]
pub enum WebhookPayload<'a> {
    Pokemon(PokemonMessage<'a>),
    Pokestop(PokestopMessage<'a>),
    Lure(PokestopMessage<'a>),
    Invasion(InvasionMessage<'a>),
    Quest(QuestMessage<'a>),
    AlternativeQuest(QuestMessage<'a>),
    Gym(GymMessage<'a>),
    GymInfo(GymInfoMessage<'a>),
    GymDefender(GymDefenderMessage<'a>),
    GymTrainer(GymTrainerMessage<'a>),
    Egg(RaidMessage<'a>),
    Raid(RaidMessage<'a>),
    Weather(WeatherMessage),
    Account(AccountMessage<'a>),
}

#[derive(Debug, Serialize)]
pub struct PokemonMessage<'a> {
    pub spawnpoint_id: Option<String>,
    pub pokestop_id: Option<&'a str>,
    pub encounter_id: &'a str,
    pub pokemon_id: u32,
    pub latitude: f64,
    pub longitude: f64,
    pub disappear_time: u64,
    pub disappear_time_verified: bool,
    pub first_seen: u64,
    pub last_modified_time: u64,
    pub gender: Option<u32>,
    pub cp: Option<u32>,
    pub form: Option<u32>,
    pub costume: Option<u32>,
    pub individual_attack: Option<u8>,
    pub individual_defense: Option<u8>,
    pub individual_stamina: Option<u8>,
    pub pokemon_level: Option<u8>,
    pub move_1: Option<u32>,
    pub move_2: Option<u32>,
    pub weight: Option<f64>,
    pub height: Option<f64>,
    pub weather: Option<u32>,
    pub shiny: Option<bool>,
    pub username: Option<&'a str>,
    pub display_pokemon_id: Option<u32>,
    pub is_event: bool,
}

#[derive(Debug, Serialize)]
pub struct PokestopMessage<'a> {
    pub pokestop_id: &'a str,
    pub latitude: f64,
    pub longitude: f64,
    pub name: Option<&'a str>,
    pub url: Option<&'a str>,
    pub lure_expiration: u64,
    pub last_modified: u64,
    pub enabled: bool,
    pub lure_id: u32,
    pub ar_scan_eligible: bool,
    pub power_up_level: Option<u32>,
    pub updated: u64,
}

#[derive(Debug, Serialize)]
pub struct InvasionMessage<'a> {
    pub pokestop_id: &'a str,
    pub latitude: f64,
    pub longitude: f64,
    pub pokestop_name: Option<&'a str>,
    pub url: Option<&'a str>,
    pub grunt_type: u32,
    pub display_type: u32,
    pub incident_expire_timestamp: u64,
    pub updated: u64,
}

#[derive(Debug, Serialize)]
pub struct QuestMessage<'a> {
    pub pokestop_id: &'a str,
    pub latitude: f64,
    pub longitude: f64,
    pub pokestop_name: Option<&'a str>,
    pub pokestop_url: Option<&'a str>,
    #[serde(rename = "type")]
    pub quest_type: u32,
    pub target: u32,
    pub template: &'a str,
    pub title: Option<&'a str>,
    pub conditions: &'a Value,
    pub rewards: &'a Value,
    pub updated: u64,
}

#[derive(Debug, Serialize)]
pub struct GymMessage<'a> {
    pub gym_id: &'a str,
    pub gym_name: Option<&'a str>,
    pub url: Option<&'a str>,
    pub latitude: f64,
    pub longitude: f64,
    pub team_id: u32,
    pub guard_pokemon_id: u32,
    pub slots_available: u32,
    pub raid_level: u32,
    pub total_cp: u32,
    pub ex_raid_eligible: bool,
    pub in_battle: bool,
    pub sponsor_id: Option<u32>,
    pub partner_id: Option<&'a str>,
    pub power_up_level: Option<u32>,
    pub ar_scan_eligible: bool,
    pub updated: u64,
}

#[derive(Debug, Serialize)]
pub struct GymInfoMessage<'a> {
    pub id: &'a str,
    pub name: Option<&'a str>,
    pub url: Option<&'a str>,
    pub description: Option<&'a str>,
    pub latitude: f64,
    pub longitude: f64,
    pub team: u32,
    pub slots_available: u32,
    pub ex_raid_eligible: bool,
    pub in_battle: bool,
    pub sponsor_id: Option<u32>,
    pub partner_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct GymDefenderMessage<'a> {
    pub fort_id: &'a str,
    pub latitude: f64,
    pub longitude: f64,
    pub pokemon_id: u32,
    pub form: Option<u32>,
    pub costume: Option<u32>,
    pub gender: Option<u32>,
    pub cp_when_deployed: u32,
    pub shiny: bool,
    pub deployed_ms: u64,
    pub battles_won: u32,
    pub battles_lost: u32,
    pub trainer_name: Option<&'a str>,
    pub updated: u64,
}

#[derive(Debug, Serialize)]
pub struct GymTrainerMessage<'a> {
    pub name: &'a str,
    pub fort_id: Option<&'a str>,
    pub level: u32,
    pub team_id: u32,
    pub battles_won: u32,
    pub km_walked: f64,
    pub pokemon_caught: u32,
    pub experience: u64,
    pub combat_rank: u32,
    pub combat_rating: f64,
    pub has_shared_ex_pass: bool,
    pub gym_badge_type: u32,
    pub updated: u64,
}

#[derive(Debug, Serialize)]
pub struct RaidMessage<'a> {
    pub gym_id: &'a str,
    pub gym_name: Option<&'a str>,
    pub gym_url: Option<&'a str>,
    pub latitude: f64,
    pub longitude: f64,
    pub team_id: u32,
    pub spawn: u64,
    pub start: u64,
    pub end: u64,
    pub level: u32,
    pub pokemon_id: u32,
    pub form: Option<u32>,
    pub costume: Option<u32>,
    pub gender: Option<u32>,
    pub evolution: Option<u32>,
    pub cp: Option<u32>,
    pub move_1: Option<u32>,
    pub move_2: Option<u32>,
    pub ex_raid_eligible: bool,
    pub is_exclusive: bool,
    pub sponsor_id: Option<u32>,
    pub partner_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct WeatherMessage {
    pub s2_cell_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub level: u8,
    pub gameplay_condition: u32,
    pub wind_direction: u32,
    pub cloud_level: u32,
    pub rain_level: u32,
    pub wind_level: u32,
    pub snow_level: u32,
    pub fog_level: u32,
    pub special_effect_level: u32,
    pub severity: Option<u32>,
    pub warn_weather: Option<bool>,
    pub updated: u64,
}

#[derive(Debug, Serialize)]
pub struct AccountMessage<'a> {
    pub username: &'a str,
    pub level: u32,
    pub group: Option<&'a str>,
    pub first_warning_timestamp: Option<u64>,
    pub failed: Option<&'a str>,
    pub failed_timestamp: Option<u64>,
    pub banned: bool,
    pub warn: bool,
    pub warn_expire_timestamp: Option<u64>,
    pub was_suspended: bool,
    pub suspended_message_acknowledged: bool,
    pub warn_message_acknowledged: bool,
    pub last_used_timestamp: Option<u64>,
}

/// Build the typed payload for one change.
pub fn to_payload(change: &EntityChange) -> Result<WebhookPayload<'_>, MappingError> {
    if let Some(point) = change.coordinate() {
        if !point.is_finite() {
            return Err(MappingError::InvalidCoordinate { kind: change.kind() });
        }
    }

    Ok(match change {
        EntityChange::Pokemon(p) => WebhookPayload::Pokemon(pokemon_message(p)),
        EntityChange::Pokestop(s) => WebhookPayload::Pokestop(pokestop_message(s)),
        EntityChange::Lure(s) => WebhookPayload::Lure(pokestop_message(s)),
        EntityChange::Invasion(i) => WebhookPayload::Invasion(invasion_message(i)),
        EntityChange::Quest(q) => WebhookPayload::Quest(quest_message(q)),
        EntityChange::AlternativeQuest(q) => WebhookPayload::AlternativeQuest(quest_message(q)),
        EntityChange::Gym(g) => WebhookPayload::Gym(gym_message(g)),
        EntityChange::GymInfo(g) => WebhookPayload::GymInfo(gym_info_message(g)),
        EntityChange::GymDefender(d) => WebhookPayload::GymDefender(defender_message(d)),
        EntityChange::GymTrainer(t) => WebhookPayload::GymTrainer(trainer_message(t)),
        EntityChange::Egg(r) => WebhookPayload::Egg(raid_message(r)),
        EntityChange::Raid(r) => WebhookPayload::Raid(raid_message(r)),
        EntityChange::Weather(w) => WebhookPayload::Weather(weather_message(w)),
        EntityChange::Account(a) => WebhookPayload::Account(account_message(a)),
    })
}

/// Build the JSON wire payload for one change.
pub fn to_wire_payload(change: &EntityChange) -> Result<Value, MappingError> {
    let payload = to_payload(change)?;
    serde_json::to_value(&payload).map_err(|source| MappingError::Serialize {
        kind: change.kind(),
        source,
    })
}

fn pokemon_message(p: &Pokemon) -> PokemonMessage<'_> {
    PokemonMessage {
        spawnpoint_id: p.spawn_id.map(|id| format!("{id:X}")),
        pokestop_id: p.pokestop_id.as_deref(),
        encounter_id: &p.id,
        pokemon_id: p.pokemon_id,
        latitude: p.latitude,
        longitude: p.longitude,
        disappear_time: p.expire_timestamp,
        disappear_time_verified: p.expire_timestamp_verified,
        first_seen: p.first_seen_timestamp,
        last_modified_time: p.updated,
        gender: p.gender,
        cp: p.cp,
        form: p.form,
        costume: p.costume,
        individual_attack: p.atk_iv,
        individual_defense: p.def_iv,
        individual_stamina: p.sta_iv,
        pokemon_level: p.level,
        move_1: p.move_1,
        move_2: p.move_2,
        weight: p.weight,
        height: p.size,
        weather: p.weather,
        shiny: p.shiny,
        username: p.username.as_deref(),
        display_pokemon_id: p.display_pokemon_id,
        is_event: p.is_event,
    }
}

fn pokestop_message(s: &Pokestop) -> PokestopMessage<'_> {
    PokestopMessage {
        pokestop_id: &s.id,
        latitude: s.latitude,
        longitude: s.longitude,
        name: s.name.as_deref(),
        url: s.url.as_deref(),
        lure_expiration: s.lure_expire_timestamp.unwrap_or_default(),
        last_modified: s.last_modified_timestamp.unwrap_or_default(),
        enabled: s.enabled,
        lure_id: s.lure_id,
        ar_scan_eligible: s.ar_scan_eligible,
        power_up_level: s.power_up_level,
        updated: s.updated,
    }
}

fn invasion_message(i: &Invasion) -> InvasionMessage<'_> {
    InvasionMessage {
        pokestop_id: &i.pokestop_id,
        latitude: i.latitude,
        longitude: i.longitude,
        pokestop_name: i.name.as_deref(),
        url: i.url.as_deref(),
        grunt_type: i.grunt_type,
        display_type: i.display_type,
        incident_expire_timestamp: i.expire_timestamp,
        updated: i.updated,
    }
}

fn quest_message(q: &Quest) -> QuestMessage<'_> {
    QuestMessage {
        pokestop_id: &q.pokestop_id,
        latitude: q.latitude,
        longitude: q.longitude,
        pokestop_name: q.name.as_deref(),
        pokestop_url: q.url.as_deref(),
        quest_type: q.quest_type,
        target: q.target,
        template: &q.template,
        title: q.title.as_deref(),
        conditions: &q.conditions,
        rewards: &q.rewards,
        updated: q.timestamp,
    }
}

fn gym_message(g: &Gym) -> GymMessage<'_> {
    GymMessage {
        gym_id: &g.id,
        gym_name: g.name.as_deref(),
        url: g.url.as_deref(),
        latitude: g.latitude,
        longitude: g.longitude,
        team_id: g.team_id,
        guard_pokemon_id: g.guarding_pokemon_id,
        slots_available: g.available_slots,
        raid_level: g.raid_level,
        total_cp: g.total_cp,
        ex_raid_eligible: g.ex_raid_eligible,
        in_battle: g.in_battle,
        sponsor_id: g.sponsor_id,
        partner_id: g.partner_id.as_deref(),
        power_up_level: g.power_up_level,
        ar_scan_eligible: g.ar_scan_eligible,
        updated: g.updated,
    }
}

fn gym_info_message(g: &Gym) -> GymInfoMessage<'_> {
    GymInfoMessage {
        id: &g.id,
        name: g.name.as_deref(),
        url: g.url.as_deref(),
        description: g.description.as_deref(),
        latitude: g.latitude,
        longitude: g.longitude,
        team: g.team_id,
        slots_available: g.available_slots,
        ex_raid_eligible: g.ex_raid_eligible,
        in_battle: g.in_battle,
        sponsor_id: g.sponsor_id,
        partner_id: g.partner_id.as_deref(),
    }
}

fn defender_message(d: &GymDefender) -> GymDefenderMessage<'_> {
    GymDefenderMessage {
        fort_id: &d.gym_id,
        latitude: d.latitude,
        longitude: d.longitude,
        pokemon_id: d.pokemon_id,
        form: d.form,
        costume: d.costume,
        gender: d.gender,
        cp_when_deployed: d.cp,
        shiny: d.shiny,
        deployed_ms: d.deployed_ms,
        battles_won: d.battles_won,
        battles_lost: d.battles_lost,
        trainer_name: d.trainer_name.as_deref(),
        updated: d.updated,
    }
}

fn trainer_message(t: &GymTrainer) -> GymTrainerMessage<'_> {
    GymTrainerMessage {
        name: &t.name,
        fort_id: t.gym_id.as_deref(),
        level: t.level,
        team_id: t.team_id,
        battles_won: t.battles_won,
        km_walked: t.km_walked,
        pokemon_caught: t.pokemon_caught,
        experience: t.experience,
        combat_rank: t.combat_rank,
        combat_rating: t.combat_rating,
        has_shared_ex_pass: t.has_shared_ex_pass,
        gym_badge_type: t.gym_badge_type,
        updated: t.updated,
    }
}

fn raid_message(r: &Raid) -> RaidMessage<'_> {
    RaidMessage {
        gym_id: &r.gym_id,
        gym_name: r.gym_name.as_deref(),
        gym_url: r.gym_url.as_deref(),
        latitude: r.latitude,
        longitude: r.longitude,
        team_id: r.team_id,
        spawn: r.spawn_timestamp,
        start: r.battle_timestamp,
        end: r.end_timestamp,
        level: r.level,
        pokemon_id: r.pokemon_id,
        form: r.form,
        costume: r.costume,
        gender: r.gender,
        evolution: r.evolution,
        cp: r.cp,
        move_1: r.move_1,
        move_2: r.move_2,
        ex_raid_eligible: r.ex_raid_eligible,
        is_exclusive: r.is_exclusive,
        sponsor_id: r.sponsor_id,
        partner_id: r.partner_id.as_deref(),
    }
}

fn weather_message(w: &Weather) -> WeatherMessage {
    WeatherMessage {
        s2_cell_id: w.id,
        latitude: w.latitude,
        longitude: w.longitude,
        level: w.level,
        gameplay_condition: w.gameplay_condition,
        wind_direction: w.wind_direction,
        cloud_level: w.cloud_level,
        rain_level: w.rain_level,
        wind_level: w.wind_level,
        snow_level: w.snow_level,
        fog_level: w.fog_level,
        special_effect_level: w.special_effect_level,
        severity: w.severity,
        warn_weather: w.warn_weather,
        updated: w.updated,
    }
}

fn account_message(a: &Account) -> AccountMessage<'_> {
    AccountMessage {
        username: &a.username,
        level: a.level,
        group: a.group.as_deref(),
        first_warning_timestamp: a.first_warning_timestamp,
        failed: a.failed.as_deref(),
        failed_timestamp: a.failed_timestamp,
        banned: a.banned,
        warn: a.warn,
        warn_expire_timestamp: a.warn_expire_timestamp,
        was_suspended: a.was_suspended,
        suspended_message_acknowledged: a.suspended_message_acknowledged,
        warn_message_acknowledged: a.warn_message_acknowledged,
        last_used_timestamp: a.last_used_timestamp,
    }
}
