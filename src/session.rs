//! Session Manager — drives the five-step handshake (transport connect,
//! version check, zone login, auto-join, extension auth) and surfaces the
//! login outcome.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::config::{ClientConfig, LoginExtras};
use crate::connection::Connection;
use crate::error::{ClientError, Result};

pub struct SessionManager {
    conn: Arc<Connection>,
    config: ClientConfig,
    login_extras: LoginExtras,
    logged_in: AtomicBool,
}

impl SessionManager {
    pub fn new(conn: Arc<Connection>, config: ClientConfig) -> Self {
        Self {
            conn,
            config,
            login_extras: LoginExtras::default(),
            logged_in: AtomicBool::new(false),
        }
    }

    pub fn with_login_extras(mut self, extras: LoginExtras) -> Self {
        self.login_extras = extras;
        self
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::Acquire)
    }

    /// Run the handshake end to end. Fails fast at each step; a failed
    /// login is fatal to the session — the caller decides whether to
    /// reconnect.
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        self.conn
            .connect(&self.config.game_url, self.config.connection_timeout)
            .await?;

        self.version_check().await?;
        self.zone_login().await?;
        self.auto_join().await;
        self.extension_auth(username, password).await?;

        self.logged_in.store(true, Ordering::Release);
        log::info!("session authenticated");
        Ok(())
    }

    async fn version_check(&self) -> Result<()> {
        let waiter = self
            .conn
            .wait_for("apiOK", None, self.config.login_timeout);
        let frame = format!(
            "<msg t='sys'><body action='verChk' r='0'><ver v='{}'/></body></msg>",
            self.config.game_version
        );
        self.conn.send(frame).await?;
        waiter.await?;
        log::debug!("version check ok");
        Ok(())
    }

    async fn zone_login(&self) -> Result<()> {
        let waiter = self.conn.wait_for("rlu", None, self.config.login_timeout);
        let frame = format!(
            "<msg t='sys'><body action='login' r='0'><login z='{}'><nick></nick><pword>undefined%en%0</pword></login></body></msg>",
            self.config.default_zone
        );
        self.conn.send(frame).await?;
        waiter.await?;
        log::debug!("zone login ok");
        Ok(())
    }

    /// `joinOK` is sometimes omitted by the server; timing out here is
    /// non-fatal and the handshake proceeds regardless.
    async fn auto_join(&self) {
        let waiter = self.conn.wait_for("joinOK", None, self.config.login_timeout);
        if let Err(e) = self
            .conn
            .send("<msg t='sys'><body action='autoJoin' r='-1'/></msg>".into())
            .await
        {
            log::warn!("autoJoin send failed: {e}");
            return;
        }
        match waiter.await {
            Ok(_) => log::debug!("auto-join confirmed"),
            Err(_) => log::warn!("auto-join confirmation timed out, proceeding anyway"),
        }
    }

    async fn extension_auth(&self, username: &str, password: &str) -> Result<()> {
        let mut body = self.login_extras.to_json();
        if let Value::Object(map) = &mut body {
            map.insert("NOM".into(), Value::String(username.to_string()));
            map.insert("PW".into(), Value::String(password.to_string()));
        }

        let waiter = self.conn.wait_for("lli", None, self.config.login_timeout);
        let frame = crate::codec::encode_extension(&self.config.default_zone, "lli", "1", &body);
        self.conn.send(frame).await?;
        let packet = waiter.await?;

        if packet.error_code == 0 {
            return Ok(());
        }

        // The exact numeric cooldown code is server-internal and not
        // recoverable from the source this client was modeled on; a
        // cooldown response is distinguished by carrying a `CD` (seconds)
        // field regardless of its error_code value.
        if let Some(seconds) = packet.field("CD").and_then(|v| v.as_u64()) {
            return Err(ClientError::LoginCooldown {
                seconds: seconds as u32,
            });
        }

        Err(ClientError::AuthFailed {
            code: packet.error_code,
        })
    }
}
