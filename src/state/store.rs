//! State Store — single-writer, many-readers model updated exclusively on
//! the dispatch path. Each `handle_*` method acquires the store's write
//! lock once for the whole packet, so a reader never observes a
//! partially-applied update.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde_json::Value;

use crate::codec::Packet;
use crate::dispatcher::Dispatcher;
use crate::state::types::{
    Alliance, Army, Building, Castle, MapObject, Movement, MovementResources, Player, Resources,
    UnitMap,
};

type MovementCallback = Arc<dyn Fn(&Movement) + Send + Sync>;

#[derive(Default)]
struct Inner {
    local_player_id: Option<i64>,
    players: HashMap<i64, Player>,
    alliances: HashMap<i64, Alliance>,
    castles: HashMap<i64, Castle>,
    movements: HashMap<i64, Movement>,
    previous_movement_ids: HashSet<i64>,
    map_objects: HashMap<i64, MapObject>,
    armies: HashMap<i64, Army>,
}

/// The derived, delta-driven model of the remote world.
pub struct StateStore {
    inner: RwLock<Inner>,
    on_incoming_attack: RwLock<Vec<MovementCallback>>,
    on_movement_recalled: RwLock<Vec<MovementCallback>>,
    /// Supplemental: fires for any new movement (attack-class or return),
    /// not just attack-class ones — the same diff produces it for free.
    on_movement_tracked: RwLock<Vec<MovementCallback>>,
}

impl StateStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(Inner::default()),
            on_incoming_attack: RwLock::new(Vec::new()),
            on_movement_recalled: RwLock::new(Vec::new()),
            on_movement_tracked: RwLock::new(Vec::new()),
        })
    }

    /// Wire the store's command handlers onto `dispatcher`'s durable
    /// subscriptions. Call once per Connection.
    pub fn install(self: &Arc<Self>, dispatcher: &Dispatcher) {
        macro_rules! bind {
            ($cmd:literal, $method:ident) => {{
                let store = self.clone();
                dispatcher.subscribe(
                    $cmd,
                    Arc::new(move |packet: &Packet| store.$method(&packet.payload)),
                );
            }};
        }
        bind!("gbd", handle_gbd);
        bind!("dcl", handle_dcl);
        bind!("gam", handle_gam);
        bind!("mov", handle_mov);
        bind!("atv", handle_atv);
        bind!("ata", handle_atv);
        bind!("gaa", handle_gaa);
    }

    // -----------------------------------------------------------------
    // Event registration
    // -----------------------------------------------------------------

    pub fn on_incoming_attack(&self, handler: MovementCallback) {
        self.on_incoming_attack.write().push(handler);
    }

    pub fn on_movement_recalled(&self, handler: MovementCallback) {
        self.on_movement_recalled.write().push(handler);
    }

    pub fn on_movement_tracked(&self, handler: MovementCallback) {
        self.on_movement_tracked.write().push(handler);
    }

    fn fire(list: &RwLock<Vec<MovementCallback>>, movement: &Movement) {
        let handlers: Vec<MovementCallback> = list.read().clone();
        for handler in handlers {
            handler(movement);
        }
    }

    // -----------------------------------------------------------------
    // gbd — initial bundle
    // -----------------------------------------------------------------

    fn handle_gbd(&self, payload: &Value) {
        let mut inner = self.inner.write();

        if let Some(gpi) = payload.get("gpi") {
            if let Some(pid) = gpi.get("PID").and_then(Value::as_i64) {
                if inner.local_player_id != Some(pid) {
                    *inner = Inner::default();
                }
                inner.local_player_id = Some(pid);
                let name = str_field(gpi, "N");
                let player = inner.players.entry(pid).or_insert_with(|| Player {
                    id: pid,
                    name: name.clone(),
                    level: 0,
                    legendary_level: 0,
                    xp: 0,
                    xp_to_next: 0,
                    gold: 0,
                    rubies: 0,
                    alliance_id: None,
                    castle_ids: Vec::new(),
                });
                player.name = name;
            }
        }

        let Some(pid) = inner.local_player_id else {
            return;
        };

        if let Some(gxp) = payload.get("gxp") {
            if let Some(player) = inner.players.get_mut(&pid) {
                player.level = i64_field(gxp, "LVL");
                player.xp = i64_field(gxp, "XP");
                player.legendary_level = i64_field(gxp, "LL");
                player.xp_to_next = i64_field(gxp, "XPTNL");
            }
        }

        if let Some(gcu) = payload.get("gcu") {
            if let Some(player) = inner.players.get_mut(&pid) {
                player.gold = i64_field(gcu, "C1");
                player.rubies = i64_field(gcu, "C2");
            }
        }

        if let Some(gal) = payload.get("gal") {
            if let Some(aid) = gal.get("AID").and_then(Value::as_i64) {
                if aid != 0 {
                    inner.alliances.insert(
                        aid,
                        Alliance {
                            id: aid,
                            name: str_field(gal, "N"),
                            abbreviation: str_field(gal, "SN"),
                        },
                    );
                    if let Some(player) = inner.players.get_mut(&pid) {
                        player.alliance_id = Some(aid);
                    }
                }
            }
        }

        if let Some(kingdoms) = payload
            .get("gcl")
            .and_then(|v| v.get("C"))
            .and_then(Value::as_array)
        {
            for kingdom in kingdoms {
                let kid = i64_field(kingdom, "KID");
                let Some(areas) = kingdom.get("AI").and_then(Value::as_array) else {
                    continue;
                };
                for area_entry in areas {
                    let Some(raw_ai) = area_entry.get("AI").and_then(Value::as_array) else {
                        continue;
                    };
                    if raw_ai.len() <= 10 {
                        continue;
                    }
                    let x = raw_ai[0].as_i64().unwrap_or(0);
                    let y = raw_ai[1].as_i64().unwrap_or(0);
                    let area_id = raw_ai[3].as_i64().unwrap_or(0);
                    let owner_id = raw_ai[4].as_i64().unwrap_or(0);
                    let name = raw_ai[10].as_str().unwrap_or_default().to_string();

                    if owner_id != pid {
                        continue;
                    }
                    inner
                        .castles
                        .entry(area_id)
                        .or_insert_with(|| Castle::new(area_id, kid, name, x, y));
                    if let Some(player) = inner.players.get_mut(&pid) {
                        if !player.castle_ids.contains(&area_id) {
                            player.castle_ids.push(area_id);
                        }
                    }
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // dcl — detailed castle list
    // -----------------------------------------------------------------

    fn handle_dcl(&self, payload: &Value) {
        let mut inner = self.inner.write();
        let Some(kingdoms) = payload.get("C").and_then(Value::as_array) else {
            return;
        };

        for kingdom in kingdoms {
            let Some(areas) = kingdom.get("AI").and_then(Value::as_array) else {
                continue;
            };
            for castle_data in areas {
                let Some(aid) = castle_data.get("AID").and_then(Value::as_i64) else {
                    continue;
                };
                let gpa = castle_data.get("gpa");
                let Some(castle) = inner.castles.get_mut(&aid) else {
                    continue;
                };

                let res = &mut castle.resources;
                res.wood = i64_field(castle_data, "W");
                res.stone = i64_field(castle_data, "S");
                res.food = i64_field(castle_data, "F");

                if let Some(gpa) = gpa {
                    res.wood_cap = i64_field(gpa, "MRW");
                    res.stone_cap = i64_field(gpa, "MRS");
                    res.food_cap = i64_field(gpa, "MRF");
                    res.wood_rate = f64_field(gpa, "RS1");
                    res.stone_rate = f64_field(gpa, "RS2");
                    res.food_rate = f64_field(gpa, "RS3");
                    res.wood_safe = i64_field(gpa, "SAFE_W");
                    res.stone_safe = i64_field(gpa, "SAFE_S");
                    res.food_safe = i64_field(gpa, "SAFE_F");
                }

                res.iron = i64_field_fallback(castle_data, "I", gpa, "MRI");
                res.glass = i64_field_fallback(castle_data, "G", gpa, "MRG");
                res.ash = i64_field_fallback(castle_data, "A", gpa, "MRA");
                res.honey = i64_field_fallback(castle_data, "HONEY", gpa, "MRHONEY");
                res.mead = i64_field_fallback(castle_data, "MEAD", gpa, "MRMEAD");
                res.beef = i64_field_fallback(castle_data, "BEEF", gpa, "MRBEEF");

                castle.buildings.clear();
                if let Some(ac) = castle_data.get("AC").and_then(Value::as_array) {
                    for b in ac {
                        if let Some(arr) = b.as_array() {
                            if arr.len() >= 2 {
                                castle.buildings.push(Building {
                                    id: arr[0].as_i64().unwrap_or(0),
                                    level: arr[1].as_i64().unwrap_or(0),
                                });
                            }
                        }
                    }
                }

                castle.units.clear();
                if let Some(un) = castle_data.get("UN").and_then(Value::as_object) {
                    for (uid_str, count) in un {
                        if let (Ok(uid), Some(count)) = (uid_str.parse::<i64>(), count.as_i64()) {
                            castle.units.insert(uid, count);
                        }
                    }
                }

                inner.armies.insert(
                    aid,
                    Army {
                        units: castle.units.clone(),
                    },
                );
            }
        }
    }

    // -----------------------------------------------------------------
    // gam — full movement snapshot with delta detection
    // -----------------------------------------------------------------

    fn handle_gam(&self, payload: &Value) {
        let owner_dir = build_owner_directory(payload.get("O"));
        let mut newly_attacked = Vec::new();
        let mut newly_tracked = Vec::new();
        let mut recalled = Vec::new();

        {
            let mut inner = self.inner.write();
            let movements_list = payload
                .get("M")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            let mut current_ids = HashSet::new();
            for wrapper in &movements_list {
                let Some(m_data) = wrapper.get("M") else {
                    continue;
                };
                let Some(mid) = m_data.get("MID").and_then(Value::as_i64) else {
                    continue;
                };
                current_ids.insert(mid);

                let mut movement = parse_movement(m_data, Some(wrapper), &owner_dir);
                let is_new = !inner.previous_movement_ids.contains(&mid);
                if let Some(existing) = inner.movements.get(&mid) {
                    movement.created_at = existing.created_at;
                }
                if is_new {
                    if movement.is_attack() {
                        newly_attacked.push(movement.clone());
                    }
                    newly_tracked.push(movement.clone());
                }
                inner.movements.insert(mid, movement);
            }

            let removed_ids: Vec<i64> = inner
                .previous_movement_ids
                .difference(&current_ids)
                .copied()
                .collect();
            for mid in removed_ids {
                if let Some(old) = inner.movements.remove(&mid) {
                    recalled.push(old);
                }
            }
            inner.previous_movement_ids = current_ids;
        }

        for m in &newly_attacked {
            Self::fire(&self.on_incoming_attack, m);
        }
        for m in &newly_tracked {
            Self::fire(&self.on_movement_tracked, m);
        }
        for m in &recalled {
            Self::fire(&self.on_movement_recalled, m);
        }
    }

    // -----------------------------------------------------------------
    // mov — real-time single/list movement update
    // -----------------------------------------------------------------

    fn handle_mov(&self, payload: &Value) {
        let items: Vec<Value> = match payload.get("M") {
            Some(Value::Array(arr)) => arr.clone(),
            Some(single @ Value::Object(_)) => vec![single.clone()],
            _ => match payload {
                Value::Object(_) => vec![payload.clone()],
                _ => Vec::new(),
            },
        };

        let mut newly_attacked = Vec::new();
        let mut newly_tracked = Vec::new();
        {
            let mut inner = self.inner.write();
            for item in &items {
                let Some(mid) = item.get("MID").and_then(Value::as_i64) else {
                    continue;
                };
                let mut movement = parse_movement(item, None, &HashMap::new());
                let is_new = !inner.movements.contains_key(&mid);
                if let Some(existing) = inner.movements.get(&mid) {
                    movement.created_at = existing.created_at;
                } else {
                    inner.previous_movement_ids.insert(mid);
                }
                if is_new {
                    if movement.is_attack() {
                        newly_attacked.push(movement.clone());
                    }
                    newly_tracked.push(movement.clone());
                }
                inner.movements.insert(mid, movement);
            }
        }
        for m in &newly_attacked {
            Self::fire(&self.on_incoming_attack, m);
        }
        for m in &newly_tracked {
            Self::fire(&self.on_movement_tracked, m);
        }
    }

    // -----------------------------------------------------------------
    // atv / ata — arrival
    // -----------------------------------------------------------------

    fn handle_atv(&self, payload: &Value) {
        let Some(mid) = payload.get("MID").and_then(Value::as_i64) else {
            return;
        };
        let mut inner = self.inner.write();
        inner.movements.remove(&mid);
        inner.previous_movement_ids.remove(&mid);
    }

    // -----------------------------------------------------------------
    // gaa — map area chunk
    // -----------------------------------------------------------------

    fn handle_gaa(&self, payload: &Value) {
        let mut inner = self.inner.write();
        let kid = i64_field(payload, "KID");
        let areas = payload
            .get("AI")
            .and_then(Value::as_array)
            .or_else(|| payload.get("A").and_then(Value::as_array));
        let Some(areas) = areas else {
            return;
        };

        for area in areas {
            let Some(arr) = area.as_array() else {
                continue;
            };
            if arr.len() < 3 {
                continue;
            }
            let object_type = arr[0].as_i64().unwrap_or(0);
            let x = arr[1].as_i64().unwrap_or(0);
            let y = arr[2].as_i64().unwrap_or(0);
            let area_id = if arr.len() > 3 { arr[3].as_i64() } else { None };
            let owner_id = if arr.len() > 4 { arr[4].as_i64() } else { None };

            if let Some(area_id) = area_id {
                inner.map_objects.insert(
                    area_id,
                    MapObject {
                        area_id,
                        kingdom_id: kid,
                        x,
                        y,
                        object_type,
                        level: 0,
                        owner_id,
                        owner_name: None,
                        alliance_id: None,
                        alliance_name: None,
                    },
                );
            }
        }
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    pub fn local_player(&self) -> Option<Player> {
        let inner = self.inner.read();
        inner
            .local_player_id
            .and_then(|pid| inner.players.get(&pid).cloned())
    }

    pub fn castle(&self, area_id: i64) -> Option<Castle> {
        self.inner.read().castles.get(&area_id).cloned()
    }

    pub fn castles(&self) -> Vec<Castle> {
        self.inner.read().castles.values().cloned().collect()
    }

    pub fn army(&self, area_id: i64) -> Option<Army> {
        self.inner.read().armies.get(&area_id).cloned()
    }

    pub fn map_objects(&self) -> Vec<MapObject> {
        self.inner.read().map_objects.values().cloned().collect()
    }

    pub fn all_movements(&self) -> Vec<Movement> {
        self.inner.read().movements.values().cloned().collect()
    }

    pub fn incoming_movements(&self) -> Vec<Movement> {
        self.inner
            .read()
            .movements
            .values()
            .filter(|m| m.is_incoming())
            .cloned()
            .collect()
    }

    pub fn outgoing_movements(&self) -> Vec<Movement> {
        self.inner
            .read()
            .movements
            .values()
            .filter(|m| m.is_outgoing())
            .cloned()
            .collect()
    }

    pub fn returning_movements(&self) -> Vec<Movement> {
        self.inner
            .read()
            .movements
            .values()
            .filter(|m| m.is_returning())
            .cloned()
            .collect()
    }

    pub fn incoming_attacks(&self) -> Vec<Movement> {
        self.inner
            .read()
            .movements
            .values()
            .filter(|m| m.is_incoming() && m.is_attack())
            .cloned()
            .collect()
    }

    pub fn movements_to_castle(&self, area_id: i64) -> Vec<Movement> {
        self.inner
            .read()
            .movements
            .values()
            .filter(|m| m.target_area_id == area_id)
            .cloned()
            .collect()
    }

    pub fn movements_from_castle(&self, area_id: i64) -> Vec<Movement> {
        self.inner
            .read()
            .movements
            .values()
            .filter(|m| m.source_area_id == area_id)
            .cloned()
            .collect()
    }

    pub fn movement_by_id(&self, movement_id: i64) -> Option<Movement> {
        self.inner.read().movements.get(&movement_id).cloned()
    }

    pub fn next_arrival(&self) -> Option<Movement> {
        self.inner
            .read()
            .movements
            .values()
            .min_by_key(|m| m.time_remaining())
            .cloned()
    }
}

// ---------------------------------------------------------------------------
// JSON field helpers
// ---------------------------------------------------------------------------

fn i64_field(v: &Value, key: &str) -> i64 {
    v.get(key).and_then(Value::as_i64).unwrap_or(0)
}

fn f64_field(v: &Value, key: &str) -> f64 {
    v.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn str_field(v: &Value, key: &str) -> String {
    v.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn i64_field_fallback(primary: &Value, key: &str, secondary: Option<&Value>, fallback_key: &str) -> i64 {
    if let Some(v) = primary.get(key).and_then(Value::as_i64) {
        return v;
    }
    secondary
        .and_then(|s| s.get(fallback_key))
        .and_then(Value::as_i64)
        .unwrap_or(0)
}

fn build_owner_directory(owners: Option<&Value>) -> HashMap<i64, (String, String)> {
    let mut dir = HashMap::new();
    let Some(owners) = owners.and_then(Value::as_array) else {
        return dir;
    };
    for entry in owners {
        if let Some(oid) = entry.get("OID").and_then(Value::as_i64) {
            dir.insert(oid, (str_field(entry, "N"), str_field(entry, "AN")));
        }
    }
    dir
}

fn parse_movement(
    m_data: &Value,
    wrapper: Option<&Value>,
    owner_dir: &HashMap<i64, (String, String)>,
) -> Movement {
    let movement_id = i64_field(m_data, "MID");
    let movement_type = i64_field(m_data, "T");
    let progress_time = i64_field(m_data, "PT");
    let total_time = i64_field(m_data, "TT");
    let direction = i64_field(m_data, "D");
    let owner_id = i64_field(m_data, "OID");
    let target_player_id = i64_field(m_data, "TID");

    let mut source_area_id = -1;
    let mut source_x = -1;
    let mut source_y = -1;
    let mut source_name = None;
    if let Some(sa) = m_data.get("SA").and_then(Value::as_array) {
        if sa.len() >= 3 {
            source_x = sa[1].as_i64().unwrap_or(-1);
            source_y = sa[2].as_i64().unwrap_or(-1);
        }
        if sa.len() >= 4 {
            source_area_id = sa[3].as_i64().unwrap_or(-1);
        }
        if sa.len() > 10 {
            source_name = sa[10].as_str().map(str::to_string);
        }
    }

    let mut target_area_id = -1;
    let mut target_x = -1;
    let mut target_y = -1;
    let mut target_name = None;
    if let Some(ta) = m_data.get("TA").and_then(Value::as_array) {
        if ta.len() >= 5 {
            target_x = ta[1].as_i64().unwrap_or(-1);
            target_y = ta[2].as_i64().unwrap_or(-1);
            target_area_id = ta[3].as_i64().unwrap_or(-1);
        }
        if ta.len() > 10 {
            target_name = ta[10].as_str().map(str::to_string);
        }
    }

    let mut units: UnitMap = HashMap::new();
    let mut resources = None;
    if let Some(wrapper) = wrapper {
        if let Some(um) = wrapper.get("UM").and_then(Value::as_object) {
            for (uid_str, count) in um {
                if let (Ok(uid), Some(count)) = (uid_str.parse::<i64>(), count.as_i64()) {
                    units.insert(uid, count);
                }
            }
        }
        if let Some(gs) = wrapper.get("GS") {
            if gs.is_object() {
                resources = Some(MovementResources {
                    wood: i64_field(gs, "W"),
                    stone: i64_field(gs, "S"),
                    food: i64_field(gs, "F"),
                    iron: i64_field(gs, "I"),
                    glass: i64_field(gs, "G"),
                    ash: i64_field(gs, "A"),
                });
            }
        }
    }

    let source_alliance_name = owner_dir.get(&owner_id).map(|(_, an)| an.clone());
    let target_alliance_name = owner_dir.get(&target_player_id).map(|(_, an)| an.clone());

    let now = Instant::now();
    Movement {
        movement_id,
        movement_type,
        progress_time,
        total_time,
        direction,
        source_area_id,
        source_x,
        source_y,
        source_name,
        source_alliance_name,
        target_area_id,
        target_x,
        target_y,
        target_name,
        target_alliance_name,
        owner_id,
        target_player_id,
        units,
        resources,
        created_at: now,
        last_updated: now,
    }
}

