use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::SpecError;

pub const DEFAULT_SSH_PORT: u16 = 22;

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// Login for one candidate hypervisor node. The order of a credential list is
/// the order in which nodes are searched for a VM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostCredential {
    pub host: String,
    #[serde(alias = "user")]
    pub username: String,
    pub password: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
}

impl HostCredential {
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            port: DEFAULT_SSH_PORT,
        }
    }
}

/// Declarative description of the expected exam state, keyed by stage name.
///
/// The document is kept as loose JSON on purpose: each check pulls only the
/// fields it needs and a missing or mistyped field becomes a failed check
/// rather than a rejected run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestSpec(Value);

impl TestSpec {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    fn section(&self, stage: &str, section: &str) -> Option<&Value> {
        self.0.get(stage)?.get(section)
    }

    pub fn input(&self, stage: &str, key: &str) -> Option<&Value> {
        self.section(stage, "inputs")?.get(key)
    }

    pub fn expected(&self, stage: &str, key: &str) -> Option<&Value> {
        self.section(stage, "expected")?.get(key)
    }

    /// Required text input. Numbers are accepted and rendered as text.
    pub fn input_str(&self, stage: &str, key: &str) -> Result<String, SpecError> {
        self.input(stage, key)
            .and_then(value_as_text)
            .ok_or_else(|| SpecError::MissingField(format!("{stage}.inputs.{key}")))
    }

    /// Required text input that may be spelled under several keys.
    pub fn input_str_any(&self, stage: &str, keys: &[&str]) -> Result<String, SpecError> {
        keys.iter()
            .find_map(|key| self.input(stage, key).and_then(value_as_text))
            .ok_or_else(|| SpecError::MissingField(format!("{stage}.inputs.{}", keys.join("|"))))
    }

    pub fn optional_input_str(&self, stage: &str, key: &str) -> Option<String> {
        self.input(stage, key).and_then(value_as_text)
    }

    pub fn expected_str(&self, stage: &str, key: &str) -> Result<String, SpecError> {
        self.expected(stage, key)
            .and_then(value_as_text)
            .ok_or_else(|| SpecError::MissingField(format!("{stage}.expected.{key}")))
    }

    /// Expected key/value map, empty when absent or not an object.
    pub fn expected_map(&self, stage: &str, key: &str) -> Map<String, Value> {
        self.expected(stage, key)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Success,
    Failed,
    Error,
}

/// One scored comparison. `score` is either 0 or `max_score`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckResult {
    pub id: String,
    pub category: String,
    pub step_code: String,
    pub step_name: String,
    pub status: CheckStatus,
    pub score: u32,
    pub max_score: u32,
    pub message: Option<String>,
    pub raw: Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Grade {
    A,
    B,
    C,
    D,
}

impl Grade {
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= 90.0 {
            Self::A
        } else if percentage >= 80.0 {
            Self::B
        } else if percentage >= 70.0 {
            Self::C
        } else {
            Self::D
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub total: u32,
    pub max: u32,
    pub percentage: f64,
    pub grade: Grade,
}

/// Observable output of a pipeline run. A run produces `Start`, any number of
/// `CheckCompleted`, then exactly one of `Finished` or `Stopped`.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Start,
    CheckCompleted(CheckResult),
    Finished(RunSummary),
    Stopped(Option<String>),
}

impl PipelineEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished(_) | Self::Stopped(_))
    }
}

impl Serialize for PipelineEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Start => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("event", "start")?;
                map.end()
            }
            Self::CheckCompleted(result) => result.serialize(serializer),
            Self::Finished(summary) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("event", "finished")?;
                map.serialize_entry("summary", summary)?;
                map.end()
            }
            Self::Stopped(reason) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("event", "error")?;
                map.serialize_entry("message", reason)?;
                map.end()
            }
        }
    }
}

/// Inbound control frame sent by a client while a run is streaming.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ControlMessage {
    pub action: String,
}

impl ControlMessage {
    pub fn is_cancel(&self) -> bool {
        self.action.trim().eq_ignore_ascii_case("cancel")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub id: String,
    pub host: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub port: u16,
    pub created_at: DateTime<Utc>,
}

impl NodeRecord {
    pub fn to_credential(&self) -> HostCredential {
        HostCredential {
            host: self.host.clone(),
            username: self.user.clone(),
            password: self.password.clone(),
            port: self.port,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpsertPayload {
    pub host: String,
    pub user: String,
    pub password: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub identity: String,
    pub total_score: u32,
    pub max_score: u32,
    pub percentage: f64,
    pub grade: String,
    pub completed_at: DateTime<Utc>,
}
