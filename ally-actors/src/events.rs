use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events buffered per subscriber before the slowest one starts lagging.
pub const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Step,
    Completed,
    Failed,
    Cancelled,
    Truncated,
}

impl TaskStatus {
    /// Whether no further updates follow for the task.
    pub fn is_final(&self) -> bool {
        !matches!(self, TaskStatus::Step)
    }
}

/// Everything a session tells its observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A streamed frame: base64 PNG of the page and its URL.
    Screenshot { image: String, url: String },
    Message { text: String },
    TaskUpdate {
        status: TaskStatus,
        task_id: Uuid,
        payload: Value,
    },
}

/// Publish to whoever is listening. Having no subscribers is fine.
pub(crate) fn publish(events: &broadcast::Sender<SessionEvent>, event: SessionEvent) {
    let _ = events.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_serialize_with_type_tag() {
        let id = Uuid::nil();
        let update = SessionEvent::TaskUpdate {
            status: TaskStatus::Completed,
            task_id: id,
            payload: json!({"message": "done"}),
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({
                "type": "task_update",
                "status": "completed",
                "task_id": "00000000-0000-0000-0000-000000000000",
                "payload": {"message": "done"}
            })
        );
        assert!(TaskStatus::Truncated.is_final());
        assert!(!TaskStatus::Step.is_final());
    }
}
