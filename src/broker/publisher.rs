//! Broker publisher with explicit connection states
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnected -> Reconnecting -> Connected
//! ```
//!
//! All transitions and every publish go through one async mutex, so a
//! reconnect driven by the link supervisor never interleaves with a publish
//! from the scheduler.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::config::BrokerConfig;
use super::session::{BrokerSession, LinkEvent};
use super::BrokerError;

/// Connection state of the publisher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

struct Link {
    state: ConnectionState,
    /// Incremented on every open; link events from older sessions are stale
    generation: u64,
    session: Box<dyn BrokerSession>,
}

/// Owned handle to the broker, shared by the notifier and the link supervisor
pub struct BrokerPublisher {
    config: BrokerConfig,
    link: Mutex<Link>,
}

impl BrokerPublisher {
    pub fn new(config: BrokerConfig, session: impl BrokerSession + 'static) -> Self {
        Self {
            config,
            link: Mutex::new(Link {
                state: ConnectionState::Disconnected,
                generation: 0,
                session: Box::new(session),
            }),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub async fn state(&self) -> ConnectionState {
        self.link.lock().await.state
    }

    /// Generation of the current (or last attempted) session
    pub async fn generation(&self) -> u64 {
        self.link.lock().await.generation
    }

    /// Establish the first session. Failure leaves the publisher
    /// `Disconnected`; it is logged, never returned.
    pub async fn connect(&self) -> ConnectionState {
        tracing::info!(
            broker = %self.config.address(),
            client_id = %self.config.client_id,
            tls = self.config.tls.is_some(),
            "Starting MQTT client"
        );
        let mut link = self.link.lock().await;
        self.establish(&mut link, ConnectionState::Connecting).await
    }

    /// Reopen the session with the same parameters unless already connected
    pub async fn reconnect(&self) -> ConnectionState {
        let mut link = self.link.lock().await;
        if link.state == ConnectionState::Connected {
            return link.state;
        }
        self.establish(&mut link, ConnectionState::Reconnecting).await
    }

    /// React to a lost connection: mark it down and reconnect immediately
    pub async fn handle_disconnect(&self, generation: u64, reason: &str) -> ConnectionState {
        let mut link = self.link.lock().await;
        if generation != link.generation {
            tracing::debug!(
                generation,
                current = link.generation,
                "Ignoring disconnect from a replaced session"
            );
            return link.state;
        }

        tracing::warn!(reason, "Disconnected from MQTT broker, reconnecting");
        link.state = ConnectionState::Disconnected;
        self.establish(&mut link, ConnectionState::Reconnecting).await
    }

    /// Publish one message, fire-and-forget.
    ///
    /// While not connected the message is dropped and
    /// [`BrokerError::NotConnected`] is returned.
    pub async fn publish(&self, topic: &str, message: &str) -> Result<(), BrokerError> {
        let mut link = self.link.lock().await;
        if link.state != ConnectionState::Connected {
            tracing::warn!(
                topic,
                state = %link.state,
                "Broker not connected, dropping message"
            );
            return Err(BrokerError::NotConnected);
        }
        link.session.publish(topic, message).await
    }

    /// Supervise the link: reconnect on every disconnect event and retry
    /// every `reconnect_delay` while still disconnected.
    pub fn watch(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<LinkEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut retry = tokio::time::interval(self.config.reconnect_delay);
            retry.set_missed_tick_behavior(MissedTickBehavior::Delay);
            retry.tick().await;

            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Some(LinkEvent::Disconnected { generation, reason }) => {
                            self.handle_disconnect(generation, &reason).await;
                        }
                        None => {
                            tracing::info!("Broker link closed, supervisor stopping");
                            break;
                        }
                    },
                    _ = retry.tick() => {
                        if self.state().await == ConnectionState::Disconnected {
                            self.reconnect().await;
                        }
                    }
                }
            }
        })
    }

    async fn establish(&self, link: &mut Link, via: ConnectionState) -> ConnectionState {
        link.state = via;
        link.generation += 1;

        match link.session.open(&self.config, link.generation).await {
            Ok(outcome) => {
                link.state = ConnectionState::Connected;
                Self::on_connect(link.generation, &outcome);
            }
            Err(e) => {
                tracing::error!(
                    broker = %self.config.address(),
                    error = %e,
                    "Failed to connect to MQTT broker"
                );
                link.state = ConnectionState::Disconnected;
            }
        }

        link.state
    }

    fn on_connect(generation: u64, outcome: &str) {
        tracing::info!(generation, outcome, "Connected to MQTT broker");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::session::mock::MockSession;
    use std::time::Duration;

    fn fast_config() -> BrokerConfig {
        BrokerConfig {
            reconnect_delay: Duration::from_millis(10),
            ..Default::default()
        }
    }

    async fn wait_for_state(publisher: &BrokerPublisher, expected: ConnectionState) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while publisher.state().await != expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("publisher did not reach expected state");
    }

    #[tokio::test]
    async fn test_connect_success() {
        let session = MockSession::default();
        let publisher = BrokerPublisher::new(fast_config(), session.clone());
        assert_eq!(publisher.state().await, ConnectionState::Disconnected);

        assert_eq!(publisher.connect().await, ConnectionState::Connected);
        assert_eq!(publisher.generation().await, 1);
        assert_eq!(session.opens(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_stays_disconnected() {
        let session = MockSession::failing(1);
        let publisher = BrokerPublisher::new(fast_config(), session.clone());

        assert_eq!(publisher.connect().await, ConnectionState::Disconnected);

        let result = publisher.publish("CO/ANT/MED/user1/in", "ALERT").await;
        assert!(matches!(result, Err(BrokerError::NotConnected)));
        assert!(session.published().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_reconnects_and_publish_succeeds() {
        let session = MockSession::default();
        let publisher = BrokerPublisher::new(fast_config(), session.clone());
        publisher.connect().await;

        let state = publisher.handle_disconnect(1, "connection reset").await;
        assert_eq!(state, ConnectionState::Connected);
        assert_eq!(publisher.generation().await, 2);
        assert_eq!(session.opens(), 2);

        publisher
            .publish("CO/ANT/MED/user1/in", "NORMAL")
            .await
            .unwrap();
        assert_eq!(
            session.published(),
            vec![("CO/ANT/MED/user1/in".to_string(), "NORMAL".to_string())]
        );
    }

    #[tokio::test]
    async fn test_stale_disconnect_is_ignored() {
        let session = MockSession::default();
        let publisher = BrokerPublisher::new(fast_config(), session.clone());
        publisher.connect().await;
        publisher.handle_disconnect(1, "reset").await;

        let state = publisher.handle_disconnect(1, "late event").await;
        assert_eq!(state, ConnectionState::Connected);
        assert_eq!(session.opens(), 2);
    }

    #[tokio::test]
    async fn test_failed_reconnect_leaves_disconnected() {
        let session = MockSession::default();
        let publisher = BrokerPublisher::new(fast_config(), session.clone());
        publisher.connect().await;
        session.state.lock().fail_opens = 1;

        let state = publisher.handle_disconnect(1, "reset").await;
        assert_eq!(state, ConnectionState::Disconnected);
        assert!(publisher.publish("t/in", "m").await.is_err());
    }

    #[tokio::test]
    async fn test_watch_reconnects_on_link_event() {
        let session = MockSession::default();
        let publisher = Arc::new(BrokerPublisher::new(fast_config(), session.clone()));
        publisher.connect().await;

        let (tx, rx) = mpsc::unbounded_channel();
        let supervisor = Arc::clone(&publisher).watch(rx);

        tx.send(LinkEvent::Disconnected {
            generation: 1,
            reason: "keepalive timeout".to_string(),
        })
        .unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while publisher.generation().await < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("supervisor did not reconnect");

        wait_for_state(&publisher, ConnectionState::Connected).await;
        publisher.publish("CO/ANT/MED/user1/in", "ALERT").await.unwrap();
        assert_eq!(session.published().len(), 1);

        supervisor.abort();
    }

    #[tokio::test]
    async fn test_watch_retries_until_connected() {
        let session = MockSession::failing(3);
        let publisher = Arc::new(BrokerPublisher::new(fast_config(), session.clone()));
        assert_eq!(publisher.connect().await, ConnectionState::Disconnected);

        let (_tx, rx) = mpsc::unbounded_channel();
        let supervisor = Arc::clone(&publisher).watch(rx);

        wait_for_state(&publisher, ConnectionState::Connected).await;
        assert_eq!(session.opens(), 4);

        supervisor.abort();
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
    }
}
