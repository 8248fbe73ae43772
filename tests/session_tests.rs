use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use empire_core::{ClientConfig, Connection, Dispatcher, SessionManager};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> ClientConfig {
        let mut config = ClientConfig::default();
        // Port 9 ("discard") on loopback refuses connections immediately,
        // so this fails fast without needing real network access.
        config.game_url = "ws://127.0.0.1:9/".to_string();
        config.connection_timeout = Duration::from_millis(500);
        config.login_timeout = Duration::from_millis(200);
        config
    }

    fn mock_server_config(addr: SocketAddr) -> ClientConfig {
        let mut config = ClientConfig::default();
        config.game_url = format!("ws://{addr}/");
        config.default_zone = "EmpireEx_21".to_string();
        config.connection_timeout = Duration::from_secs(2);
        config.login_timeout = Duration::from_secs(2);
        config
    }

    /// Answers the five-step handshake in order: `verChk` -> `apiOK`,
    /// `login` -> `rlu`, `autoJoin` -> `joinOK`, `lli` -> `lli` (ok).
    async fn mock_login_server(listener: TcpListener) {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");
        let responses = [
            "<msg t='sys'><body action='apiOK' r='0'></body></msg>",
            "<msg t='sys'><body action='rlu' r='0'></body></msg>",
            "<msg t='sys'><body action='joinOK' r='0'></body></msg>",
            "%xt%EmpireEx_21%lli%1%{\"error_code\":0}%",
        ];
        for response in responses {
            let Some(Ok(Message::Text(_))) = ws.next().await else {
                break;
            };
            ws.send(Message::Text(response.to_string()))
                .await
                .expect("send response");
        }
    }

    #[tokio::test]
    async fn is_logged_in_defaults_to_false() {
        let dispatcher = Arc::new(Dispatcher::new());
        let conn = Connection::new(dispatcher);
        let session = SessionManager::new(conn, ClientConfig::default());
        assert!(!session.is_logged_in());
    }

    #[tokio::test]
    async fn login_fails_fast_when_the_server_is_unreachable() {
        let dispatcher = Arc::new(Dispatcher::new());
        let conn = Connection::new(dispatcher);
        let session = SessionManager::new(conn, unreachable_config());

        let result = session.login("player", "hunter2").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn happy_path_login_completes_the_five_step_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(mock_login_server(listener));

        let dispatcher = Arc::new(Dispatcher::new());
        let conn = Connection::new(dispatcher);
        let session = SessionManager::new(conn, mock_server_config(addr));

        session
            .login("player", "hunter2")
            .await
            .expect("login succeeds");
        assert!(session.is_logged_in());
    }
}
