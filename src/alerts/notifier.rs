//! Verdict delivery to the broker

use std::sync::Arc;

use super::policy::{Verdict, VerdictKind};
use crate::broker::{BrokerError, BrokerPublisher};

/// Publishes verdicts on their topics
pub struct Notifier {
    publisher: Arc<BrokerPublisher>,
}

impl Notifier {
    /// Create a new notifier
    pub fn new(publisher: Arc<BrokerPublisher>) -> Self {
        Self { publisher }
    }

    pub fn publisher(&self) -> &Arc<BrokerPublisher> {
        &self.publisher
    }

    /// Publish every verdict. Returns how many were sent when all succeed.
    pub async fn notify(&self, job_id: &str, verdicts: &[Verdict]) -> Result<usize, NotifierError> {
        let mut errors = Vec::new();

        for verdict in verdicts {
            if let Err(e) = self.notify_verdict(job_id, verdict).await {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(verdicts.len())
        } else {
            Err(NotifierError::Multiple(errors))
        }
    }

    /// Publish a single verdict
    async fn notify_verdict(&self, job_id: &str, verdict: &Verdict) -> Result<(), NotifierError> {
        match verdict.kind {
            VerdictKind::Alert => tracing::warn!(
                job_id,
                topic = %verdict.topic,
                variable = %verdict.variable,
                "Sending alert"
            ),
            VerdictKind::Normal => tracing::info!(
                job_id,
                topic = %verdict.topic,
                variable = %verdict.variable,
                "Sending clear"
            ),
        }

        self.publisher
            .publish(&verdict.topic, &verdict.message)
            .await
            .map_err(|source| NotifierError::Publish {
                topic: verdict.topic.clone(),
                source,
            })
    }
}

/// Notifier errors
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("Failed to publish to {topic}: {source}")]
    Publish {
        topic: String,
        #[source]
        source: BrokerError,
    },

    #[error("Multiple notification failures: {0:?}")]
    Multiple(Vec<NotifierError>),
}

impl NotifierError {
    /// Number of verdicts that were not delivered
    pub fn failures(&self) -> usize {
        match self {
            NotifierError::Publish { .. } => 1,
            NotifierError::Multiple(errors) => errors.iter().map(|e| e.failures()).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::session::mock::MockSession;
    use crate::broker::BrokerConfig;

    fn verdict(kind: VerdictKind, topic: &str) -> Verdict {
        Verdict {
            kind,
            message: format!("{} temperature", kind),
            topic: topic.to_string(),
            variable: "temperature".to_string(),
        }
    }

    #[tokio::test]
    async fn test_notify_publishes_every_verdict() {
        let session = MockSession::default();
        let publisher = Arc::new(BrokerPublisher::new(BrokerConfig::default(), session.clone()));
        publisher.connect().await;

        let notifier = Notifier::new(publisher);
        let verdicts = vec![
            verdict(VerdictKind::Alert, "CO/ANT/MED/user1/in"),
            verdict(VerdictKind::Normal, "CO/ANT/MED/user2/in"),
        ];

        let sent = notifier.notify("variation", &verdicts).await.unwrap();
        assert_eq!(sent, 2);
        assert_eq!(
            session.published(),
            vec![
                ("CO/ANT/MED/user1/in".to_string(), "ALERT temperature".to_string()),
                ("CO/ANT/MED/user2/in".to_string(), "NORMAL temperature".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_notify_while_disconnected_reports_failures() {
        let session = MockSession::failing(1);
        let publisher = Arc::new(BrokerPublisher::new(BrokerConfig::default(), session.clone()));
        publisher.connect().await;

        let notifier = Notifier::new(publisher);
        let verdicts = vec![
            verdict(VerdictKind::Alert, "a/b/c/d/in"),
            verdict(VerdictKind::Alert, "a/b/c/e/in"),
        ];

        let err = notifier.notify("bounds", &verdicts).await.unwrap_err();
        assert_eq!(err.failures(), 2);
        assert!(session.published().is_empty());
    }

    #[tokio::test]
    async fn test_notify_nothing() {
        let publisher = Arc::new(BrokerPublisher::new(
            BrokerConfig::default(),
            MockSession::default(),
        ));
        let notifier = Notifier::new(publisher);
        assert_eq!(notifier.notify("variation", &[]).await.unwrap(), 0);
    }
}
