//! Per-subscriber inclusion rules.
//!
//! Checks run in a fixed order and the first failing one excludes the
//! change: kind, then geofence, then the kind-specific deny-list.

use tracing::debug;

use crate::error::GeofenceError;
use crate::subscriber::Subscriber;
use crate::types::{Coordinate, EntityChange, Polygon};

/// Point-in-polygon test supplied by the geometry layer.
pub trait GeofencePredicate: Send + Sync {
    /// `true` if `point` lies inside any of `polygons`.
    fn contains(&self, point: &Coordinate, polygons: &[Polygon]) -> Result<bool, GeofenceError>;
}

/// Even-odd ray casting over lat/lon treated as a plane.
#[derive(Debug, Clone, Copy, Default)]
pub struct RayCasting;

impl GeofencePredicate for RayCasting {
    fn contains(&self, point: &Coordinate, polygons: &[Polygon]) -> Result<bool, GeofenceError> {
        if !point.is_finite() {
            return Err(GeofenceError::InvalidPoint);
        }
        for (index, polygon) in polygons.iter().enumerate() {
            let points = polygon.points();
            if points.len() < 3 {
                return Err(GeofenceError::Degenerate { index });
            }
            if points.iter().any(|p| !p.is_finite()) {
                return Err(GeofenceError::NonFinite { index });
            }
            if ring_contains(points, point) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn ring_contains(ring: &[Coordinate], point: &Coordinate) -> bool {
    let (x, y) = (point.longitude, point.latitude);
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (xi, yi) = (ring[i].longitude, ring[i].latitude);
        let (xj, yj) = (ring[j].longitude, ring[j].latitude);
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Build the deny-list key for a Pokémon-like attribute set.
///
/// Optional segments are appended only when present and non-zero, so
/// `(150, Some(0), None, None)` is `"150"` and `(201, Some(5), None, Some(2))`
/// is `"201_f5_g2"`.
pub fn composite_pokemon_key(
    pokemon_id: u32,
    form: Option<u32>,
    costume: Option<u32>,
    gender: Option<u32>,
) -> String {
    let mut key = pokemon_id.to_string();
    for (prefix, value) in [("_f", form), ("_c", costume), ("_g", gender)] {
        if let Some(v) = value.filter(|v| *v != 0) {
            key.push_str(prefix);
            key.push_str(&v.to_string());
        }
    }
    key
}

/// Decide whether `change` is delivered to `subscriber`.
///
/// A geofence that cannot be evaluated excludes the change.
pub fn should_include(
    subscriber: &Subscriber,
    change: &EntityChange,
    geofence: &dyn GeofencePredicate,
) -> bool {
    if !subscriber.consumes(change.kind()) {
        return false;
    }

    if !subscriber.geofences.is_empty() {
        if let Some(point) = change.coordinate() {
            match geofence.contains(&point, &subscriber.geofences) {
                Ok(true) => {}
                Ok(false) => return false,
                Err(err) => {
                    debug!(
                        subscriber = %subscriber.name,
                        kind = %change.kind(),
                        error = %err,
                        "geofence evaluation failed, excluding change"
                    );
                    return false;
                }
            }
        }
    }

    !is_denied(subscriber, change)
}

fn is_denied(subscriber: &Subscriber, change: &EntityChange) -> bool {
    match change {
        EntityChange::Pokemon(p) => {
            !subscriber.pokemon_ids.is_empty()
                && subscriber
                    .pokemon_ids
                    .contains(&composite_pokemon_key(p.pokemon_id, p.form, p.costume, p.gender))
        }
        EntityChange::Raid(r) => {
            !subscriber.raid_pokemon_ids.is_empty()
                && subscriber
                    .raid_pokemon_ids
                    .contains(&composite_pokemon_key(r.pokemon_id, r.form, r.costume, r.gender))
        }
        EntityChange::Egg(r) => subscriber.egg_levels.contains(&r.level),
        EntityChange::Pokestop(s) => subscriber.pokestop_ids.contains(&s.id),
        EntityChange::Lure(s) => subscriber.lure_ids.contains(&s.lure_id),
        EntityChange::Invasion(i) => subscriber.invasion_ids.contains(&i.grunt_type),
        EntityChange::Gym(g) => {
            subscriber.gym_ids.contains(&g.id) || subscriber.gym_team_ids.contains(&g.team_id)
        }
        EntityChange::Weather(w) => subscriber.weather_condition_ids.contains(&w.gameplay_condition),
        // No attribute filters defined for these kinds.
        EntityChange::Quest(_)
        | EntityChange::AlternativeQuest(_)
        | EntityChange::GymInfo(_)
        | EntityChange::GymDefender(_)
        | EntityChange::GymTrainer(_)
        | EntityChange::Account(_) => false,
    }
}
