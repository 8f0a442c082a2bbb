//! Broker connection parameters

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{env_flag, env_or};

/// TLS settings for the broker connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// CA bundle used when certificates are validated
    pub ca_path: Option<PathBuf>,
    /// Accept any server certificate. Matches the deployed broker, which
    /// presents a certificate the monitor does not validate.
    pub insecure_skip_verify: bool,
}

/// Static connection parameters, reused verbatim on every reconnect
#[derive(Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: String,
    pub password: String,
    pub tls: Option<TlsConfig>,
    pub keep_alive: Duration,
    /// Upper bound on waiting for CONNACK
    pub connect_timeout: Duration,
    /// Delay between reconnect attempts while disconnected
    pub reconnect_delay: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "control".to_string(),
            username: "control".to_string(),
            password: String::new(),
            tls: None,
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

impl BrokerConfig {
    /// Create config from environment variables
    ///
    /// - `MQTT_HOST`, `MQTT_PORT`
    /// - `MQTT_USER_PUB` (username and client id), `MQTT_PASSWORD_PUB`
    /// - `MQTT_USE_TLS`, `MQTT_TLS_INSECURE`, `CA_CRT_PATH`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let username = std::env::var("MQTT_USER_PUB").unwrap_or(defaults.username);

        let tls = if env_flag("MQTT_USE_TLS", false) {
            Some(TlsConfig {
                ca_path: std::env::var("CA_CRT_PATH").ok().map(PathBuf::from),
                insecure_skip_verify: env_flag("MQTT_TLS_INSECURE", true),
            })
        } else {
            None
        };

        Self {
            host: std::env::var("MQTT_HOST").unwrap_or(defaults.host),
            port: env_or("MQTT_PORT", defaults.port),
            client_id: username.clone(),
            username,
            password: std::env::var("MQTT_PASSWORD_PUB").unwrap_or_default(),
            tls,
            ..defaults
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("tls", &self.tls)
            .field("keep_alive", &self.keep_alive)
            .field("connect_timeout", &self.connect_timeout)
            .field("reconnect_delay", &self.reconnect_delay)
            .finish()
    }
}
