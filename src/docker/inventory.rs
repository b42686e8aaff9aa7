//! Container state and info — conversions from bollard's list/inspect
//! payloads into the types the rest of the agent operates on.

use bollard::models::{ContainerInspectResponse, ContainerSummary};
use chrono::{DateTime, Utc};

/// Structured container lifecycle state, read from `inspect`'s
/// `ContainerState.status` field. This is the authoritative source of
/// state — see spec.md §9(b): the list endpoint's `Status` string is
/// only used for the `Up`-prefix ownership fast path, never for
/// TTL/eviction decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Exited,
    Dead,
    Unknown,
}

impl From<&str> for ContainerState {
    fn from(s: &str) -> Self {
        match s {
            "created" => ContainerState::Created,
            "running" => ContainerState::Running,
            "paused" => ContainerState::Paused,
            "exited" => ContainerState::Exited,
            "dead" => ContainerState::Dead,
            _ => ContainerState::Unknown,
        }
    }
}

/// A container as seen by the agent: enough fields to drive ownership
/// filtering, TTL reconciliation, and eviction ordering.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub id: String,
    /// First name, leading slash stripped.
    pub name: String,
    pub state: ContainerState,
    /// Raw `Status` string from the list endpoint (e.g. "Up 2 hours").
    /// Only used for the cheap running-count fast path.
    pub status: String,
    pub created_at: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub pid: Option<i64>,
}

impl From<ContainerSummary> for ContainerInfo {
    fn from(s: ContainerSummary) -> Self {
        Self {
            id: s.id.unwrap_or_default(),
            name: s
                .names
                .as_deref()
                .and_then(|n| n.first())
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            state: s
                .state
                .as_deref()
                .map(ContainerState::from)
                .unwrap_or(ContainerState::Unknown),
            status: s.status.unwrap_or_default(),
            created_at: s.created.unwrap_or_default(),
            started_at: None,
            finished_at: None,
            pid: None,
        }
    }
}

impl From<ContainerInspectResponse> for ContainerInfo {
    fn from(details: ContainerInspectResponse) -> Self {
        let state = details.state.as_ref();

        let started_at = state
            .and_then(|s| s.started_at.as_deref())
            .and_then(parse_engine_timestamp);
        let finished_at = state
            .and_then(|s| s.finished_at.as_deref())
            .and_then(parse_engine_timestamp);

        Self {
            id: details.id.unwrap_or_default(),
            name: details
                .name
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            state: state
                .and_then(|s| s.status.as_ref())
                .map(|s| ContainerState::from(s.to_string().to_lowercase().as_str()))
                .unwrap_or(ContainerState::Unknown),
            status: state
                .and_then(|s| s.status.as_ref())
                .map(|s| format!("{s:?}"))
                .unwrap_or_default(),
            created_at: details
                .created
                .as_deref()
                .and_then(parse_engine_timestamp)
                .map(|dt| dt.timestamp())
                .unwrap_or(0),
            started_at,
            finished_at,
            pid: state.and_then(|s| s.pid).map(i64::from),
        }
    }
}

/// Parse an engine timestamp to second precision, in UTC. Docker
/// reports RFC3339 with nanosecond precision; a container that was
/// never started/finished reports the zero time
/// (`0001-01-01T00:00:00Z`), which parses fine but callers should treat
/// as "absent" via `Option`.
fn parse_engine_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if raw.starts_with("0001-01-01") {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
