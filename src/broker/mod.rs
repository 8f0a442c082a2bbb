//! Message broker publishing
//!
//! Verdicts leave the monitor through a [`BrokerPublisher`]. The publisher
//! owns a [`BrokerSession`] (MQTT in production), tracks the connection
//! state, and reconnects with the last known parameters when the link drops.

pub mod config;
pub mod publisher;
pub mod session;
pub mod tls;

use std::time::Duration;

pub use config::{BrokerConfig, TlsConfig};
pub use publisher::{BrokerPublisher, ConnectionState};
pub use session::{BrokerSession, LinkEvent, MqttSession};

/// Broker errors
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Broker not connected")]
    NotConnected,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("No CONNACK within {0:?}")]
    ConnectTimeout(Duration),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("TLS error: {0}")]
    Tls(String),
}
