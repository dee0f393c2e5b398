use serde::{Deserialize, Serialize};

/// Lifecycle state of a chunk.
///
/// `None → Submitted → Running → {Success | Error | Stopped}`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[default]
    None,
    Submitted,
    Running,
    Error,
    Stopped,
    Success,
}

impl Status {
    /// Terminal states never transition again within a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Success | Status::Error | Status::Stopped)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Status::Success)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::None => "NONE",
            Status::Submitted => "SUBMITTED",
            Status::Running => "RUNNING",
            Status::Error => "ERROR",
            Status::Stopped => "STOPPED",
            Status::Success => "SUCCESS",
        };
        write!(f, "{s}")
    }
}

/// The record persisted to a chunk's status file.
///
/// Written atomically (tmp + rename) before any user code runs, and again
/// on every state transition, so an interrupted run can be diagnosed and
/// resumed from disk alone.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    pub status: Status,
    pub node_name: String,
    pub node_type: String,
    /// Group-0 uid of the node at the time of execution.
    pub uid: String,
    pub chunk_index: usize,
    pub nb_chunks: usize,
    /// Identity of the engine process that wrote this record; used to
    /// detect stale `Running` records after a crash.
    #[serde(default)]
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_line: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub elapsed_secs: f64,
}

impl StatusRecord {
    pub fn new(node_name: &str, node_type: &str, uid: &str, chunk_index: usize, nb_chunks: usize) -> Self {
        Self {
            status: Status::None,
            node_name: node_name.to_owned(),
            node_type: node_type.to_owned(),
            uid: uid.to_owned(),
            chunk_index,
            nb_chunks,
            session_id: String::new(),
            command_line: None,
            return_code: None,
            error_message: None,
            elapsed_secs: 0.0,
        }
    }
}

/// Aggregate status of a node over all its chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Every chunk is Success.
    Success,
    /// At least one chunk is Error.
    Error,
    /// At least one chunk is Stopped (and none Error).
    Stopped,
    /// At least one chunk is Running (and none Error/Stopped).
    Running,
    /// At least one chunk is Submitted, the rest None/Success.
    Submitted,
    /// Anything else: not fully computed, nothing in flight.
    None,
}

impl NodeStatus {
    /// Fold per-chunk statuses into a node-level status.
    pub fn aggregate(chunks: &[Status]) -> Self {
        if !chunks.is_empty() && chunks.iter().all(Status::is_success) {
            return NodeStatus::Success;
        }
        if chunks.iter().any(|s| matches!(s, Status::Error)) {
            return NodeStatus::Error;
        }
        if chunks.iter().any(|s| matches!(s, Status::Stopped)) {
            return NodeStatus::Stopped;
        }
        if chunks.iter().any(|s| matches!(s, Status::Running)) {
            return NodeStatus::Running;
        }
        if chunks.iter().any(|s| matches!(s, Status::Submitted)) {
            return NodeStatus::Submitted;
        }
        NodeStatus::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_priorities() {
        use Status::*;
        assert_eq!(NodeStatus::aggregate(&[Success, Success]), NodeStatus::Success);
        assert_eq!(NodeStatus::aggregate(&[Success, Error]), NodeStatus::Error);
        assert_eq!(NodeStatus::aggregate(&[Stopped, Running]), NodeStatus::Stopped);
        assert_eq!(NodeStatus::aggregate(&[Running, None]), NodeStatus::Running);
        assert_eq!(NodeStatus::aggregate(&[Submitted, None]), NodeStatus::Submitted);
        assert_eq!(NodeStatus::aggregate(&[None, None]), NodeStatus::None);
        assert_eq!(NodeStatus::aggregate(&[]), NodeStatus::None);
    }

    #[test]
    fn test_record_round_trip() {
        let mut rec = StatusRecord::new("Blur_1", "Blur", "a1b2", 0, 3);
        rec.status = Status::Error;
        rec.command_line = Some("blur --in x".to_owned());
        rec.return_code = Some(2);
        rec.error_message = Some("exit 2".to_owned());
        let json = serde_json::to_string_pretty(&rec).unwrap();
        let back: StatusRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(rec, back);
    }
}
