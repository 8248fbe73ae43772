use std::sync::Arc;
use std::time::Duration;

use empire_core::{ClientError, Connection, Dispatcher};

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_rejects_an_unparsable_url_before_dialing() {
        let dispatcher = Arc::new(Dispatcher::new());
        let conn = Connection::new(dispatcher);

        let result = conn
            .connect("not a url at all", Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(ClientError::TransportError(_))));
        assert_eq!(conn.status(), empire_core::ConnectionStatus::Closed);
    }

    #[tokio::test]
    async fn send_and_wait_for_fail_immediately_before_any_connect_attempt() {
        let dispatcher = Arc::new(Dispatcher::new());
        let conn = Connection::new(dispatcher);

        assert!(matches!(
            conn.send("<msg/>".to_string()).await,
            Err(ClientError::NotConnected)
        ));
        assert!(matches!(
            conn.wait_for("apiOK", None, Duration::from_millis(50)).await,
            Err(ClientError::NotConnected)
        ));
    }
}
