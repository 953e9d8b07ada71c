use serde::Serialize;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

/// Domain notifications for external notifiers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub(crate) enum AssessmentEvent {
    QuizPublished {
        tenant_id: String,
        quiz_id: String,
        title: String,
        question_count: usize,
    },
    AttemptGraded {
        tenant_id: String,
        attempt_id: String,
        quiz_id: String,
        student_id: String,
        total_score: f64,
        max_score: f64,
        percentage: f64,
        passed: bool,
    },
}

impl AssessmentEvent {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::QuizPublished { .. } => "quiz_published",
            Self::AttemptGraded { .. } => "attempt_graded",
        }
    }
}

#[derive(Clone)]
pub(crate) struct EventBus {
    sender: broadcast::Sender<AssessmentEvent>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_CAPACITY);
        Self { sender }
    }

    /// Fire and forget. Having no subscriber is not an error.
    pub(crate) fn publish(&self, event: AssessmentEvent) {
        let name = event.name();
        match self.sender.send(event) {
            Ok(receivers) => tracing::debug!(event = name, receivers, "event published"),
            Err(_) => tracing::debug!(event = name, "event dropped, no subscribers"),
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<AssessmentEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Logs every event; stands in for an external notifier.
pub(crate) fn spawn_log_listener(bus: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut receiver = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(payload) => tracing::info!(event = event.name(), %payload, "notification"),
                    Err(err) => tracing::warn!(error = %err, "Failed to encode notification"),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Notification listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
