//! Request API — a typed request/response shell over the raw
//! [`Connection`] and [`Dispatcher`] primitives. Every call registers its
//! `wait_for` before sending the triggering frame, the same
//! race-avoidance pattern the Session Manager uses for the handshake.
//!
//! Response typing comes entirely from the command the caller asks to
//! wait on — there is no separate parser registry keyed by request kind,
//! just the command name a response arrives under.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};

use crate::codec::{self, escape_chat_text, Packet};
use crate::connection::Connection;
use crate::dispatcher::{Dispatcher, SubscriptionHandle};
use crate::error::{ClientError, Result};
use crate::state::MapObject;

/// Von Neumann neighbor offsets — the four "edges" a map scan expands
/// along and can independently bound.
const SCAN_DIRECTIONS: [(i64, i64); 4] = [(0, -1), (0, 1), (-1, 0), (1, 0)];

/// Parse a `gaa` response's area entries into [`MapObject`]s. Duplicates
/// the State Store's own `gaa` field layout rather than depending on it —
/// the Request API has no reference to a particular store instance.
fn parse_gaa_objects(packet: &Packet, kingdom_id: i64) -> Vec<MapObject> {
    let areas = packet
        .field("AI")
        .and_then(Value::as_array)
        .or_else(|| packet.field("A").and_then(Value::as_array));
    let Some(areas) = areas else {
        return Vec::new();
    };

    let mut objects = Vec::new();
    for area in areas {
        let Some(arr) = area.as_array() else { continue };
        if arr.len() < 3 {
            continue;
        }
        let object_type = arr[0].as_i64().unwrap_or(0);
        let x = arr[1].as_i64().unwrap_or(0);
        let y = arr[2].as_i64().unwrap_or(0);
        let Some(area_id) = (if arr.len() > 3 { arr[3].as_i64() } else { None }) else {
            continue;
        };
        let owner_id = if arr.len() > 4 { arr[4].as_i64() } else { None };
        objects.push(MapObject {
            area_id,
            kingdom_id,
            x,
            y,
            object_type,
            level: 0,
            owner_id,
            owner_name: None,
            alliance_id: None,
            alliance_name: None,
        });
    }
    objects
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerInfo {
    pub player_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AllianceInfo {
    pub alliance_id: i64,
    pub name: String,
    pub abbreviation: String,
}

pub struct RequestApi {
    conn: Arc<Connection>,
    zone: String,
    seq: AtomicU64,
}

impl RequestApi {
    pub fn new(conn: Arc<Connection>, zone: impl Into<String>) -> Self {
        Self {
            conn,
            zone: zone.into(),
            seq: AtomicU64::new(1),
        }
    }

    fn next_seq(&self) -> String {
        self.seq.fetch_add(1, Ordering::Relaxed).to_string()
    }

    fn dispatcher(&self) -> &Arc<Dispatcher> {
        self.conn.dispatcher()
    }

    async fn call(&self, command: &str, body: Value, timeout: Duration) -> Result<Packet> {
        self.call_expecting(command, command, body, timeout).await
    }

    /// Send `command` but wait on a differently-named response command —
    /// some extension commands answer under their own name, this covers
    /// the rest.
    async fn call_expecting(
        &self,
        command: &str,
        response_command: &str,
        body: Value,
        timeout: Duration,
    ) -> Result<Packet> {
        let waiter = self.conn.wait_for(response_command, None, timeout);
        let seq = self.next_seq();
        let frame = codec::encode_extension(&self.zone, command, &seq, &body);
        self.conn.send(frame).await?;
        waiter.await
    }

    /// Fetch another player's public identity. Request body grounded in
    /// the original client's `gpi` call shape (`{"PID": player_id}`).
    pub async fn get_player_info(&self, player_id: i64, timeout: Duration) -> Result<PlayerInfo> {
        let packet = self
            .call("gpi", json!({ "PID": player_id }), timeout)
            .await?;
        Ok(PlayerInfo {
            player_id: packet
                .field("PID")
                .and_then(Value::as_i64)
                .unwrap_or(player_id),
            name: packet
                .field("N")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }

    /// Fetch alliance identity (`{"AID": alliance_id}`), field shape
    /// shared with the `gal` bundle entry the State Store already parses.
    pub async fn get_alliance_info(
        &self,
        alliance_id: i64,
        timeout: Duration,
    ) -> Result<AllianceInfo> {
        let packet = self
            .call("gia", json!({ "AID": alliance_id }), timeout)
            .await?;
        Ok(AllianceInfo {
            alliance_id: packet
                .field("AID")
                .and_then(Value::as_i64)
                .unwrap_or(alliance_id),
            name: packet
                .field("N")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            abbreviation: packet
                .field("SN")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }

    /// Request a fresh `gam` snapshot. The returned packet is the raw
    /// response; by the time this resolves, the State Store's durable
    /// `gam` subscriber has already applied it (subscribers run before
    /// waiters resolve on the same packet), so callers normally read the
    /// State Store rather than this return value directly.
    pub async fn request_movements(&self, timeout: Duration) -> Result<Packet> {
        self.call("gam", json!({}), timeout).await
    }

    /// Send an attack from `origin_castle_id` to `target_area_id` with the
    /// given unit counts. Rejects synchronously with `ValidationError` for
    /// an empty or all-zero unit map, the same guard the original client
    /// applies before building the `att` payload. A response carrying an
    /// `error` field is surfaced as `ServerRejected` rather than treated as
    /// success.
    pub async fn send_attack(
        &self,
        origin_castle_id: i64,
        target_area_id: i64,
        units: &HashMap<i64, i64>,
        kingdom_id: i64,
        timeout: Duration,
    ) -> Result<()> {
        if units.is_empty() || units.values().all(|&count| count <= 0) {
            return Err(ClientError::ValidationError(
                "attack requires at least one unit".into(),
            ));
        }

        let unit_map: serde_json::Map<String, Value> = units
            .iter()
            .map(|(unit_id, count)| (unit_id.to_string(), json!(count)))
            .collect();
        let body = json!({
            "OID": origin_castle_id,
            "TID": target_area_id,
            "UN": Value::Object(unit_map),
            "TT": 1,
            "KID": kingdom_id,
        });

        let packet = self.call("att", body, timeout).await?;
        if let Some(message) = packet.field("error").and_then(Value::as_str) {
            return Err(ClientError::ServerRejected {
                code: packet.error_code,
                message: message.to_string(),
            });
        }
        Ok(())
    }

    /// Send an alliance chat message. Free text is escaped per the chat
    /// encoding rule before being placed in the `TXT` field. Fire-and-wait
    /// is not applicable here — the server doesn't echo a distinct ack
    /// command back to the sender, only broadcasts `aci` to recipients.
    pub async fn send_alliance_chat(&self, message: &str) -> Result<()> {
        let body = json!({ "TXT": escape_chat_text(message) });
        let seq = self.next_seq();
        let frame = codec::encode_extension(&self.zone, "acm", &seq, &body);
        self.conn.send(frame).await
    }

    /// Subscribe to incoming alliance chat (`aci`). Returns a handle for
    /// [`Self::unsubscribe_alliance_chat`].
    pub fn subscribe_alliance_chat(
        &self,
        handler: crate::dispatcher::Handler,
    ) -> SubscriptionHandle {
        self.dispatcher().subscribe("aci", handler)
    }

    pub fn unsubscribe_alliance_chat(&self, handle: &SubscriptionHandle) {
        self.dispatcher().unsubscribe(handle);
    }

    /// Scan outward from `center` by kingdom chunk coordinate, requesting
    /// each chunk via `gaa`. A durable subscription (not one waiter per
    /// chunk) tracks the current wave's pending coordinates so a chunk
    /// arriving out of order still counts. Each of the four cardinal
    /// directions stops expanding once a wave in that direction comes
    /// back with no objects ("bounded"); the scan ends when every
    /// direction is bounded or `timeout` elapses on a wave.
    pub async fn scan_map_area(
        &self,
        kingdom_id: i64,
        center: (i64, i64),
        timeout: Duration,
    ) -> Result<Vec<MapObject>> {
        let found: Arc<Mutex<Vec<MapObject>>> = Arc::new(Mutex::new(Vec::new()));
        let mut bounded = [false; SCAN_DIRECTIONS.len()];
        let mut reach: i64 = 1;

        let mut wave: Vec<(i64, i64)> = vec![center];
        for (dx, dy) in SCAN_DIRECTIONS {
            wave.push((center.0 + dx * reach, center.1 + dy * reach));
        }

        loop {
            let pending: Arc<Mutex<HashSet<(i64, i64)>>> =
                Arc::new(Mutex::new(wave.iter().copied().collect()));
            let hits: Arc<Mutex<HashSet<(i64, i64)>>> = Arc::new(Mutex::new(HashSet::new()));
            let (done_tx, done_rx) = tokio::sync::oneshot::channel();
            let done_tx = Arc::new(Mutex::new(Some(done_tx)));

            let pending_for_handler = pending.clone();
            let hits_for_handler = hits.clone();
            let found_for_handler = found.clone();
            let done_tx_for_handler = done_tx.clone();
            let handle = self.dispatcher().subscribe(
                "gaa",
                Arc::new(move |packet: &Packet| {
                    let Some(cx) = packet.field("CX").and_then(Value::as_i64) else {
                        return;
                    };
                    let Some(cy) = packet.field("CY").and_then(Value::as_i64) else {
                        return;
                    };
                    if !pending_for_handler.lock().remove(&(cx, cy)) {
                        return;
                    }
                    let objects = parse_gaa_objects(packet, kingdom_id);
                    if !objects.is_empty() {
                        hits_for_handler.lock().insert((cx, cy));
                        found_for_handler.lock().extend(objects);
                    }
                    if pending_for_handler.lock().is_empty() {
                        if let Some(tx) = done_tx_for_handler.lock().take() {
                            let _ = tx.send(());
                        }
                    }
                }),
            );

            for (x, y) in &wave {
                let seq = self.next_seq();
                let body = json!({ "KID": kingdom_id, "CX": x, "CY": y });
                let frame = codec::encode_extension(&self.zone, "gaa", &seq, &body);
                self.conn.send(frame).await?;
            }

            let _ = tokio::time::timeout(timeout, done_rx).await;
            self.dispatcher().unsubscribe(&handle);

            let remaining = pending.lock().len();
            if remaining > 0 {
                log::warn!(
                    "map scan wave at reach {reach} timed out with {remaining} chunk(s) unreceived"
                );
            }

            let hits = hits.lock();
            for (i, (dx, dy)) in SCAN_DIRECTIONS.iter().enumerate() {
                if bounded[i] {
                    continue;
                }
                let edge_coord = (center.0 + dx * reach, center.1 + dy * reach);
                if !hits.contains(&edge_coord) {
                    bounded[i] = true;
                }
            }
            drop(hits);

            if bounded.iter().all(|b| *b) {
                break;
            }

            reach += 1;
            wave = SCAN_DIRECTIONS
                .iter()
                .enumerate()
                .filter(|(i, _)| !bounded[*i])
                .map(|(_, (dx, dy))| (center.0 + dx * reach, center.1 + dy * reach))
                .collect();
        }

        Ok(found.lock().clone())
    }
}
