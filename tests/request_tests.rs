use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use empire_core::{ClientError, Connection, Dispatcher, RequestApi};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

#[cfg(test)]
mod tests {
    use super::*;

    /// Answers `gaa` chunk requests: one object for any coordinate in
    /// `objects_at`, empty otherwise. Mirrors spec scenario 6 — center plus
    /// four neighbors populated, the next ring empty.
    async fn mock_scan_server(listener: TcpListener, objects_at: HashSet<(i64, i64)>, requests: usize) {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");
        let mut next_area_id = 501i64;
        for _ in 0..requests {
            let Some(Ok(Message::Text(text))) = ws.next().await else {
                break;
            };
            let packet = empire_core::codec::decode(&text).expect("valid gaa request");
            let cx = packet.field("CX").and_then(|v| v.as_i64()).expect("CX");
            let cy = packet.field("CY").and_then(|v| v.as_i64()).expect("CY");
            let body = if objects_at.contains(&(cx, cy)) {
                let area_id = next_area_id;
                next_area_id += 1;
                json!({"CX": cx, "CY": cy, "AI": [[1, 10, 10, area_id, 0]]})
            } else {
                json!({"CX": cx, "CY": cy, "AI": []})
            };
            let frame = empire_core::codec::encode_extension("EmpireEx_21", "gaa", "1", &body);
            ws.send(Message::Text(frame)).await.expect("send response");
        }
    }

    fn disconnected_api() -> RequestApi {
        let dispatcher = Arc::new(Dispatcher::new());
        let conn = Connection::new(dispatcher);
        RequestApi::new(conn, "EmpireEx_21")
    }

    #[tokio::test]
    async fn get_player_info_fails_immediately_when_not_connected() {
        let api = disconnected_api();
        let result = api.get_player_info(1, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn get_alliance_info_fails_immediately_when_not_connected() {
        let api = disconnected_api();
        let result = api.get_alliance_info(1, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn send_alliance_chat_fails_immediately_when_not_connected() {
        let api = disconnected_api();
        let result = api.send_alliance_chat("hello alliance").await;
        assert!(matches!(result, Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn scan_map_area_fails_immediately_when_not_connected() {
        let api = disconnected_api();
        let result = api
            .scan_map_area(1, (7, 7), Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn send_attack_rejects_an_empty_unit_map_before_touching_the_connection() {
        let api = disconnected_api();
        let result = api
            .send_attack(555, 200, &HashMap::new(), 1, Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(ClientError::ValidationError(_))));
    }

    #[tokio::test]
    async fn send_attack_rejects_a_unit_map_of_all_zero_counts() {
        let api = disconnected_api();
        let units = HashMap::from([(101i64, 0i64)]);
        let result = api
            .send_attack(555, 200, &units, 1, Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(ClientError::ValidationError(_))));
    }

    #[tokio::test]
    async fn send_attack_fails_immediately_when_not_connected() {
        let api = disconnected_api();
        let units = HashMap::from([(101i64, 10i64)]);
        let result = api
            .send_attack(555, 200, &units, 1, Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn scan_map_area_terminates_after_two_waves_with_five_objects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        // Wave 0: center + 4 cardinal neighbors, each carrying one object.
        let wave0: HashSet<(i64, i64)> =
            [(7, 7), (7, 6), (7, 8), (6, 7), (8, 7)].into_iter().collect();
        // Wave 1 (reach 2) comes back empty for all four directions, so the
        // server only ever needs to answer 5 + 4 = 9 requests.
        tokio::spawn(mock_scan_server(listener, wave0, 9));

        let dispatcher = Arc::new(Dispatcher::new());
        let conn = Connection::new(dispatcher);
        conn.connect(&format!("ws://{addr}/"), Duration::from_secs(2))
            .await
            .expect("connect to mock server");
        let api = RequestApi::new(conn, "EmpireEx_21");

        let objects = api
            .scan_map_area(1, (7, 7), Duration::from_secs(2))
            .await
            .expect("scan completes");
        assert_eq!(objects.len(), 5);
    }
}
