//! Client configuration and login defaults.

use std::time::Duration;

use serde::Deserialize;

/// Connection and timeout configuration.
///
/// Defaults mirror the values the original client shipped with.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub game_url: String,
    pub default_zone: String,
    pub game_version: String,
    pub connection_timeout: Duration,
    pub login_timeout: Duration,
    pub request_timeout: Duration,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            game_url: "wss://ep-live-us1-game.goodgamestudios.com/".into(),
            default_zone: "EmpireEx_21".into(),
            game_version: "166".into(),
            connection_timeout: Duration::from_secs_f64(10.0),
            login_timeout: Duration::from_secs_f64(15.0),
            request_timeout: Duration::from_secs_f64(5.0),
            username: None,
            password: None,
        }
    }
}

/// Mirrors [`ClientConfig`] with every field optional, for layering a TOML
/// file over the compiled-in defaults. Timeouts are plain seconds since
/// `Duration` has no serde support without an extra feature.
#[derive(Debug, Deserialize, Default)]
struct ClientConfigFile {
    game_url: Option<String>,
    default_zone: Option<String>,
    game_version: Option<String>,
    connection_timeout_secs: Option<f64>,
    login_timeout_secs: Option<f64>,
    request_timeout_secs: Option<f64>,
    username: Option<String>,
    password: Option<String>,
}

impl ClientConfig {
    /// Layer a TOML file's values over [`ClientConfig::default`]. A missing
    /// file is not an error — every key is optional and the defaults stand
    /// in for whatever the file doesn't set. Callers typically apply CLI
    /// flags and env vars on top of the result, the same override order the
    /// binary uses.
    pub fn load(path: &str) -> std::result::Result<Self, config::ConfigError> {
        let source = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .build()?;
        let file: ClientConfigFile = source.try_deserialize()?;

        let mut config = Self::default();
        if let Some(v) = file.game_url {
            config.game_url = v;
        }
        if let Some(v) = file.default_zone {
            config.default_zone = v;
        }
        if let Some(v) = file.game_version {
            config.game_version = v;
        }
        if let Some(v) = file.connection_timeout_secs {
            config.connection_timeout = Duration::from_secs_f64(v);
        }
        if let Some(v) = file.login_timeout_secs {
            config.login_timeout = Duration::from_secs_f64(v);
        }
        if let Some(v) = file.request_timeout_secs {
            config.request_timeout = Duration::from_secs_f64(v);
        }
        if file.username.is_some() {
            config.username = file.username;
        }
        if file.password.is_some() {
            config.password = file.password;
        }
        Ok(config)
    }
}

/// Client-identifying defaults merged into the `lli` login payload.
///
/// Recognized keys cover client id, language, platform, referer and
/// session id, per the login payload's documented key categories. Callers
/// may override any field before it is merged with `{NOM, PW}`.
#[derive(Debug, Clone)]
pub struct LoginExtras {
    pub platform: String,
    pub locale: String,
    pub device: String,
    pub browser_version: String,
    pub os: String,
    pub win: String,
    pub referer: String,
    pub referer_origin: String,
}

impl Default for LoginExtras {
    fn default() -> Self {
        Self {
            platform: "1".into(),
            locale: "en".into(),
            device: "0".into(),
            browser_version: "0".into(),
            os: "0".into(),
            win: "1".into(),
            referer: "".into(),
            referer_origin: "".into(),
        }
    }
}

impl LoginExtras {
    /// Render as the JSON object merged into the `lli` payload alongside
    /// `NOM`/`PW`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "PLATFORM": self.platform,
            "LOCALE": self.locale,
            "DEVICE": self.device,
            "BROWSER_VERSION": self.browser_version,
            "OS": self.os,
            "WIN": self.win,
            "REF": self.referer,
            "REF_O": self.referer_origin,
        })
    }
}
