//! Domain types owned exclusively by the [`super::store::StateStore`].
//! External readers get read-only views; nothing outside the store's own
//! command handlers ever mutates these.

use std::collections::HashMap;

use serde::Serialize;

/// Movement type 11 is "return"; every other type is treated as
/// attack-class by exclusion rather than against a fixed positive
/// enumeration (the server's full type list isn't available to verify
/// against, and excluding by the one confirmed non-attack type is the
/// conservative choice — see DESIGN.md).
pub const MOVEMENT_TYPE_RETURN: i64 = 11;

#[derive(Debug, Clone, Default, Serialize)]
pub struct Resources {
    pub wood: i64,
    pub wood_cap: i64,
    pub wood_rate: f64,
    pub wood_safe: i64,
    pub stone: i64,
    pub stone_cap: i64,
    pub stone_rate: f64,
    pub stone_safe: i64,
    pub food: i64,
    pub food_cap: i64,
    pub food_rate: f64,
    pub food_safe: i64,
    pub iron: i64,
    pub glass: i64,
    pub ash: i64,
    pub honey: i64,
    pub mead: i64,
    pub beef: i64,
}

impl Resources {
    pub fn is_empty(&self) -> bool {
        self.wood == 0
            && self.stone == 0
            && self.food == 0
            && self.iron == 0
            && self.glass == 0
            && self.ash == 0
            && self.honey == 0
            && self.mead == 0
            && self.beef == 0
    }

    pub fn total(&self) -> i64 {
        self.wood + self.stone + self.food + self.iron + self.glass + self.ash
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Building {
    pub id: i64,
    pub level: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Castle {
    pub area_id: i64,
    pub kingdom_id: i64,
    pub name: String,
    pub x: i64,
    pub y: i64,
    pub resources: Resources,
    pub buildings: Vec<Building>,
    pub units: HashMap<i64, i64>,
}

impl Castle {
    pub fn new(area_id: i64, kingdom_id: i64, name: String, x: i64, y: i64) -> Self {
        Self {
            area_id,
            kingdom_id,
            name,
            x,
            y,
            resources: Resources::default(),
            buildings: Vec::new(),
            units: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Alliance {
    pub id: i64,
    pub name: String,
    pub abbreviation: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Player {
    pub id: i64,
    pub name: String,
    pub level: i64,
    pub legendary_level: i64,
    pub xp: i64,
    pub xp_to_next: i64,
    pub gold: i64,
    pub rubies: i64,
    pub alliance_id: Option<i64>,
    /// `area_id -> Castle`. Shares the same `Castle` identity as
    /// `StateStore::castles`, keyed by the same `area_id` — never a
    /// duplicated copy.
    pub castle_ids: Vec<i64>,
}

/// Army carried in transit, attached to a [`Movement`], or resident in a
/// castle's garrison (`unit_id -> count`).
pub type UnitMap = HashMap<i64, i64>;

/// Per-castle garrison, derived from `dcl`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Army {
    pub units: UnitMap,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MovementResources {
    pub wood: i64,
    pub stone: i64,
    pub food: i64,
    pub iron: i64,
    pub glass: i64,
    pub ash: i64,
}

impl MovementResources {
    pub fn is_empty(&self) -> bool {
        self.wood == 0
            && self.stone == 0
            && self.food == 0
            && self.iron == 0
            && self.glass == 0
            && self.ash == 0
    }

    pub fn total(&self) -> i64 {
        self.wood + self.stone + self.food + self.iron + self.glass + self.ash
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Movement {
    pub movement_id: i64,
    pub movement_type: i64,
    pub progress_time: i64,
    pub total_time: i64,
    /// Raw direction field (`0` = incoming to local side, `1` = outgoing).
    pub direction: i64,
    pub source_area_id: i64,
    pub source_x: i64,
    pub source_y: i64,
    pub source_name: Option<String>,
    pub source_alliance_name: Option<String>,
    pub target_area_id: i64,
    pub target_x: i64,
    pub target_y: i64,
    pub target_name: Option<String>,
    pub target_alliance_name: Option<String>,
    pub owner_id: i64,
    pub target_player_id: i64,
    pub units: UnitMap,
    pub resources: Option<MovementResources>,
    pub created_at: std::time::Instant,
    pub last_updated: std::time::Instant,
}

impl Movement {
    pub fn time_remaining(&self) -> i64 {
        (self.total_time - self.progress_time).max(0)
    }

    pub fn progress_percent(&self) -> f64 {
        if self.total_time > 0 {
            (self.progress_time as f64 / self.total_time as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Attack-class by exclusion: anything that isn't a return movement.
    pub fn is_attack(&self) -> bool {
        self.movement_type != MOVEMENT_TYPE_RETURN
    }

    pub fn is_returning(&self) -> bool {
        self.movement_type == MOVEMENT_TYPE_RETURN
    }

    pub fn is_incoming(&self) -> bool {
        self.movement_type != MOVEMENT_TYPE_RETURN && self.direction == 0
    }

    pub fn is_outgoing(&self) -> bool {
        self.movement_type != MOVEMENT_TYPE_RETURN && self.direction == 1
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MapObject {
    pub area_id: i64,
    pub kingdom_id: i64,
    pub x: i64,
    pub y: i64,
    pub object_type: i64,
    pub level: i64,
    pub owner_id: Option<i64>,
    pub owner_name: Option<String>,
    pub alliance_id: Option<i64>,
    pub alliance_name: Option<String>,
}
