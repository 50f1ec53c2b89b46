use super::message::{Message, SimpleMessage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Weight assigned to execution updates when the producer does not supply one.
pub const DEFAULT_EXECUTION_WEIGHT: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    InProgress,
    Finished,
    Failed,
    Canceled,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Finished | ExecutionStatus::Failed | ExecutionStatus::Canceled
        )
    }
}

/// Status update of one execution step as reported by the worker.
///
/// `msg_id` is the compaction key: several updates for the same step inside one
/// bulk collapse into the one with the highest `sequence`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMessage {
    pub msg_id: String,
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub sequence: u64,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub weight: u64,
    pub created_at: DateTime<Utc>,
}

impl ExecutionMessage {
    pub fn new(
        msg_id: impl Into<String>,
        execution_id: impl Into<String>,
        status: ExecutionStatus,
        sequence: u64,
    ) -> Self {
        Self {
            msg_id: msg_id.into(),
            execution_id: execution_id.into(),
            status,
            sequence,
            payload: serde_json::Value::Null,
            weight: DEFAULT_EXECUTION_WEIGHT,
            created_at: Utc::now(),
        }
    }

    pub fn with_weight(mut self, weight: u64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

impl Message for ExecutionMessage {
    fn weight(&self) -> u64 {
        self.weight
    }

    fn id(&self) -> Option<&str> {
        Some(&self.msg_id)
    }

    fn shrink(group: Vec<Self>) -> Vec<Self> {
        let mut latest: Option<Self> = None;
        for message in group {
            // Ties go to the later update
            if latest
                .as_ref()
                .is_none_or(|current| message.sequence >= current.sequence)
            {
                latest = Some(message);
            }
        }
        latest.into_iter().collect()
    }
}

/// Fire-and-forget execution event (step log, telemetry sample).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub execution_id: String,
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
    pub weight: u64,
    pub created_at: DateTime<Utc>,
}

impl ExecutionEvent {
    pub fn new(execution_id: impl Into<String>, event_type: impl Into<String>, weight: u64) -> Self {
        Self {
            execution_id: execution_id.into(),
            event_type: event_type.into(),
            data: serde_json::Value::Null,
            weight,
            created_at: Utc::now(),
        }
    }
}

/// Everything a worker sends to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerMessage {
    Execution(ExecutionMessage),
    Event(ExecutionEvent),
    Simple(SimpleMessage),
}

impl Message for WorkerMessage {
    fn weight(&self) -> u64 {
        match self {
            WorkerMessage::Execution(m) => m.weight,
            WorkerMessage::Event(e) => e.weight,
            WorkerMessage::Simple(s) => s.weight,
        }
    }

    fn id(&self) -> Option<&str> {
        match self {
            WorkerMessage::Execution(m) => m.id(),
            WorkerMessage::Event(_) => None,
            WorkerMessage::Simple(s) => s.id(),
        }
    }

    // Compaction semantics come from the group's first member.
    fn shrink(group: Vec<Self>) -> Vec<Self> {
        match group.first() {
            Some(WorkerMessage::Execution(_)) => latest_execution_wins(group),
            _ => group,
        }
    }
}

impl From<ExecutionMessage> for WorkerMessage {
    fn from(message: ExecutionMessage) -> Self {
        WorkerMessage::Execution(message)
    }
}

impl From<ExecutionEvent> for WorkerMessage {
    fn from(event: ExecutionEvent) -> Self {
        WorkerMessage::Event(event)
    }
}

impl From<SimpleMessage> for WorkerMessage {
    fn from(message: SimpleMessage) -> Self {
        WorkerMessage::Simple(message)
    }
}

/// Collapse the execution updates of a group to the latest one. Members of
/// other kinds that happen to share the id are kept, in order, ahead of it.
fn latest_execution_wins(group: Vec<WorkerMessage>) -> Vec<WorkerMessage> {
    let mut others = Vec::new();
    let mut executions = Vec::new();
    for message in group {
        match message {
            WorkerMessage::Execution(m) => executions.push(m),
            other => others.push(other),
        }
    }

    others.extend(
        ExecutionMessage::shrink(executions)
            .into_iter()
            .map(WorkerMessage::Execution),
    );
    others
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_shrink_keeps_highest_sequence() {
        let group = vec![
            ExecutionMessage::new("step-1", "exec-1", ExecutionStatus::InProgress, 2),
            ExecutionMessage::new("step-1", "exec-1", ExecutionStatus::Finished, 3),
            ExecutionMessage::new("step-1", "exec-1", ExecutionStatus::Pending, 1),
        ];

        let shrunk = ExecutionMessage::shrink(group);
        assert_eq!(shrunk.len(), 1);
        assert_eq!(shrunk[0].sequence, 3);
        assert_eq!(shrunk[0].status, ExecutionStatus::Finished);
    }

    #[test]
    fn test_execution_shrink_tie_prefers_later() {
        let group = vec![
            ExecutionMessage::new("step-1", "exec-1", ExecutionStatus::InProgress, 5),
            ExecutionMessage::new("step-1", "exec-1", ExecutionStatus::Failed, 5),
        ];

        let shrunk = ExecutionMessage::shrink(group);
        assert_eq!(shrunk[0].status, ExecutionStatus::Failed);
    }

    #[test]
    fn test_events_have_no_id() {
        let event: WorkerMessage = ExecutionEvent::new("exec-1", "step_log", 2).into();
        assert_eq!(event.id(), None);
        assert_eq!(event.weight(), 2);
    }

    #[test]
    fn test_worker_shrink_dispatches_on_first_member() {
        let simple_first = vec![
            WorkerMessage::Simple(SimpleMessage::with_id("x", 1)),
            ExecutionMessage::new("x", "exec-1", ExecutionStatus::Pending, 1).into(),
            ExecutionMessage::new("x", "exec-1", ExecutionStatus::Finished, 2).into(),
        ];
        assert_eq!(WorkerMessage::shrink(simple_first).len(), 3);

        let execution_first = vec![
            ExecutionMessage::new("x", "exec-1", ExecutionStatus::Pending, 1).into(),
            WorkerMessage::Simple(SimpleMessage::with_id("x", 1)),
            ExecutionMessage::new("x", "exec-1", ExecutionStatus::Finished, 2).into(),
        ];
        let shrunk = WorkerMessage::shrink(execution_first);
        assert_eq!(shrunk.len(), 2);
        assert!(matches!(shrunk[0], WorkerMessage::Simple(_)));
        assert!(
            matches!(&shrunk[1], WorkerMessage::Execution(m) if m.status == ExecutionStatus::Finished)
        );
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(ExecutionStatus::Finished.is_terminal());
        assert!(ExecutionStatus::Canceled.is_terminal());
        assert!(!ExecutionStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_worker_message_serializes_with_kind_tag() {
        let message: WorkerMessage =
            ExecutionMessage::new("step-1", "exec-1", ExecutionStatus::Finished, 1).into();
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["kind"], "execution");
        assert_eq!(json["status"], "FINISHED");
    }
}
