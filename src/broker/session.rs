//! Broker sessions
//!
//! A [`BrokerSession`] owns one live connection at a time. The publisher
//! decides when to open it; the session reports link loss through
//! [`LinkEvent`]s sent from its network task.

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, Transport};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::config::BrokerConfig;
use super::tls;
use super::BrokerError;

/// Capacity of the client request channel
const REQUEST_CAPACITY: usize = 64;

/// Link notifications emitted by a session's network task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The session opened as `generation` lost its connection
    Disconnected { generation: u64, reason: String },
}

/// Transport-level connection to the broker
#[async_trait]
pub trait BrokerSession: Send {
    /// Open a fresh connection, replacing any previous one.
    ///
    /// Returns the broker's connect outcome once the connection is
    /// acknowledged. `generation` tags link events of this connection.
    async fn open(&mut self, config: &BrokerConfig, generation: u64) -> Result<String, BrokerError>;

    /// Send one message without waiting for delivery
    async fn publish(&mut self, topic: &str, payload: &str) -> Result<(), BrokerError>;
}

/// MQTT session built on rumqttc
pub struct MqttSession {
    client: Option<AsyncClient>,
    network: Option<JoinHandle<()>>,
    events: mpsc::UnboundedSender<LinkEvent>,
}

impl MqttSession {
    pub fn new(events: mpsc::UnboundedSender<LinkEvent>) -> Self {
        Self {
            client: None,
            network: None,
            events,
        }
    }

    /// Session plus the receiver its link events arrive on
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn close(&mut self) {
        if let Some(handle) = self.network.take() {
            handle.abort();
        }
        self.client = None;
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn mqtt_options(config: &BrokerConfig) -> Result<MqttOptions, BrokerError> {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(config.keep_alive);
    if !config.username.is_empty() {
        options.set_credentials(&config.username, &config.password);
    }

    if let Some(tls_config) = &config.tls {
        if tls_config.insecure_skip_verify {
            tracing::warn!(
                broker = %config.address(),
                "TLS certificate validation is disabled"
            );
        }
        options.set_transport(Transport::tls_with_config(tls::transport_config(tls_config)?));
    }

    Ok(options)
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<String, BrokerError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => return Ok(format!("{:?}", ack.code)),
            Ok(_) => continue,
            Err(e) => return Err(BrokerError::Connection(e.to_string())),
        }
    }
}

/// Drive the event loop until the connection drops, then report it once
async fn drive(mut eventloop: EventLoop, generation: u64, events: mpsc::UnboundedSender<LinkEvent>) {
    let reason = loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Disconnect)) => break "broker sent DISCONNECT".to_string(),
            Ok(_) => {}
            Err(e) => break e.to_string(),
        }
    };

    let _ = events.send(LinkEvent::Disconnected { generation, reason });
}

#[async_trait]
impl BrokerSession for MqttSession {
    async fn open(&mut self, config: &BrokerConfig, generation: u64) -> Result<String, BrokerError> {
        self.close();

        let options = mqtt_options(config)?;
        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        let outcome = tokio::time::timeout(config.connect_timeout, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| BrokerError::ConnectTimeout(config.connect_timeout))??;

        self.network = Some(tokio::spawn(drive(eventloop, generation, self.events.clone())));
        self.client = Some(client);
        Ok(outcome)
    }

    async fn publish(&mut self, topic: &str, payload: &str) -> Result<(), BrokerError> {
        let client = self.client.as_ref().ok_or(BrokerError::NotConnected)?;
        client
            .publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Debug, Default)]
    pub(crate) struct MockState {
        pub opens: u32,
        pub fail_opens: u32,
        pub generations: Vec<u64>,
        pub published: Vec<(String, String)>,
    }

    /// In-process session recording what the publisher asks of it
    #[derive(Debug, Clone, Default)]
    pub(crate) struct MockSession {
        pub state: Arc<Mutex<MockState>>,
    }

    impl MockSession {
        /// Session whose first `n` opens are refused
        pub fn failing(n: u32) -> Self {
            let session = Self::default();
            session.state.lock().fail_opens = n;
            session
        }

        pub fn opens(&self) -> u32 {
            self.state.lock().opens
        }

        pub fn published(&self) -> Vec<(String, String)> {
            self.state.lock().published.clone()
        }
    }

    #[async_trait]
    impl BrokerSession for MockSession {
        async fn open(&mut self, _config: &BrokerConfig, generation: u64) -> Result<String, BrokerError> {
            let mut state = self.state.lock();
            state.opens += 1;
            if state.fail_opens > 0 {
                state.fail_opens -= 1;
                return Err(BrokerError::Connection("connection refused".to_string()));
            }
            state.generations.push(generation);
            Ok("Success".to_string())
        }

        async fn publish(&mut self, topic: &str, payload: &str) -> Result<(), BrokerError> {
            self.state
                .lock()
                .published
                .push((topic.to_string(), payload.to_string()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::TlsConfig;
    use std::time::Duration;

    #[tokio::test]
    async fn test_publish_before_open_is_not_connected() {
        let (mut session, _events) = MqttSession::channel();
        let result = session.publish("CO/ANT/MED/user1/in", "ALERT").await;
        assert!(matches!(result, Err(BrokerError::NotConnected)));
    }

    #[tokio::test]
    async fn test_open_unreachable_broker_fails() {
        let (mut session, _events) = MqttSession::channel();
        let config = BrokerConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            connect_timeout: Duration::from_secs(2),
            ..Default::default()
        };

        let result = session.open(&config, 1).await;
        assert!(matches!(
            result,
            Err(BrokerError::Connection(_)) | Err(BrokerError::ConnectTimeout(_))
        ));
    }

    #[test]
    fn test_options_reject_tls_without_ca() {
        let config = BrokerConfig {
            tls: Some(TlsConfig {
                ca_path: None,
                insecure_skip_verify: false,
            }),
            ..Default::default()
        };
        assert!(matches!(mqtt_options(&config), Err(BrokerError::Tls(_))));
    }
}
