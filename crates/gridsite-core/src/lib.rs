use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

pub mod contracts;
pub mod hydrate;
pub mod store;

pub use store::{QueryStore, StoreMetrics};

/// Progress shown for an optimistic record before the backend reports anything.
pub const OPTIMISTIC_PROGRESS: u8 = 5;
pub const OPTIMISTIC_STAGE: &str = "Queued";
/// Timestamp layout used by the dashboard payloads (`%Y-%m-%d %H:%M:%S`).
pub const CREATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Server-issued query identifier. Never reused.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryId(String);

impl QueryId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QueryId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl Serialize for QueryId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for QueryId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserialize_id(deserializer).map(QueryId)
    }
}

/// Identity of a stored record. A provisional key lives only between a submit
/// and the backend's answer; confirmation re-keys the record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryKey {
    Provisional(u64),
    Confirmed(QueryId),
}

impl QueryKey {
    pub fn confirmed_id(&self) -> Option<&QueryId> {
        match self {
            QueryKey::Confirmed(id) => Some(id),
            QueryKey::Provisional(_) => None,
        }
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, QueryKey::Provisional(_))
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKey::Provisional(seq) => write!(f, "provisional-{seq}"),
            QueryKey::Confirmed(id) => write!(f, "{id}"),
        }
    }
}

impl From<QueryId> for QueryKey {
    fn from(id: QueryId) -> Self {
        QueryKey::Confirmed(id)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
}

impl QueryStatus {
    pub const ALL: [QueryStatus; 4] = [
        QueryStatus::Pending,
        QueryStatus::Running,
        QueryStatus::Success,
        QueryStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryStatus::Pending => "pending",
            QueryStatus::Running => "running",
            QueryStatus::Success => "success",
            QueryStatus::Failed => "failed",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            QueryStatus::Pending => "Pending",
            QueryStatus::Running => "Running",
            QueryStatus::Success => "Completed",
            QueryStatus::Failed => "Failed",
        }
    }

    /// Lifecycle order: pending < running < {success, failed}.
    pub fn rank(&self) -> u8 {
        match self {
            QueryStatus::Pending => 0,
            QueryStatus::Running => 1,
            QueryStatus::Success | QueryStatus::Failed => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, QueryStatus::Success | QueryStatus::Failed)
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "pending" => Ok(QueryStatus::Pending),
            "running" => Ok(QueryStatus::Running),
            "success" | "completed" => Ok(QueryStatus::Success),
            "failed" | "error" => Ok(QueryStatus::Failed),
            other => Err(format!("Unknown status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultField {
    #[serde(default, deserialize_with = "deserialize_text")]
    pub label: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultEntry {
    #[serde(default = "default_source", deserialize_with = "deserialize_source")]
    pub source: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub title: String,
    #[serde(default, alias = "content", deserialize_with = "deserialize_text")]
    pub summary: String,
    #[serde(default)]
    pub fields: Vec<ResultField>,
    #[serde(default, deserialize_with = "deserialize_blank_as_none")]
    pub link: Option<String>,
}

fn default_source() -> String {
    "Result".to_string()
}

/// The client-side record of one submitted query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub key: QueryKey,
    pub text: String,
    pub created_at: String,
    pub status: QueryStatus,
    pub progress: u8,
    pub stage: Option<String>,
    pub classification: Option<String>,
    pub resolution: Option<String>,
    pub router_rationale: Option<String>,
    pub results: Vec<ResultEntry>,
    pub tags: Vec<String>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
}

impl Query {
    pub fn new(key: QueryKey, text: impl Into<String>, created_at: impl Into<String>) -> Self {
        Self {
            key,
            text: text.into(),
            created_at: created_at.into(),
            status: QueryStatus::Pending,
            progress: 0,
            stage: None,
            classification: None,
            resolution: None,
            router_rationale: None,
            results: Vec::new(),
            tags: Vec::new(),
            duration_ms: None,
            error: None,
        }
    }

    /// Pending record shown the moment a query is submitted or re-run.
    pub fn optimistic(key: QueryKey, text: impl Into<String>, created_at: impl Into<String>) -> Self {
        let mut query = Self::new(key, text, created_at);
        query.progress = OPTIMISTIC_PROGRESS;
        query.stage = Some(OPTIMISTIC_STAGE.to_string());
        query
    }

    pub fn id(&self) -> Option<&QueryId> {
        self.key.confirmed_id()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Distinct result sources in first-appearance order.
    pub fn distinct_sources(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.results
            .iter()
            .map(|entry| entry.source.as_str())
            .filter(|source| seen.insert(*source))
            .collect()
    }

    pub fn results_for<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a ResultEntry> {
        self.results.iter().filter(move |entry| entry.source == source)
    }
}

/// A point-in-time server report for one query. Absent fields mean "unknown",
/// never "cleared".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QuerySnapshot {
    pub id: QueryId,
    #[serde(default, deserialize_with = "deserialize_blank_as_none")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "deserialize_blank_as_none")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub status: Option<QueryStatus>,
    #[serde(default, deserialize_with = "deserialize_progress")]
    pub progress: Option<u8>,
    #[serde(default, deserialize_with = "deserialize_blank_as_none")]
    pub stage: Option<String>,
    #[serde(default, deserialize_with = "deserialize_blank_as_none")]
    pub classification: Option<String>,
    #[serde(default, deserialize_with = "deserialize_blank_as_none")]
    pub resolution: Option<String>,
    #[serde(
        default,
        alias = "rationale",
        deserialize_with = "deserialize_blank_as_none"
    )]
    pub router_rationale: Option<String>,
    #[serde(default)]
    pub results: Option<Vec<ResultEntry>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_blank_as_none")]
    pub error: Option<String>,
}

impl QuerySnapshot {
    pub fn new(id: QueryId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: QueryStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.map(|status| status.is_terminal()).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Template {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
    pub text: String,
    #[serde(default, deserialize_with = "deserialize_blank_as_none")]
    pub classification: Option<String>,
    #[serde(default, deserialize_with = "deserialize_blank_as_none")]
    pub last_used_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthSnapshot {
    #[serde(default)]
    pub celery_ok: bool,
    #[serde(default)]
    pub checks: BTreeMap<String, bool>,
}

/// Split comma-separated tag input into a normalized tag list.
pub fn parse_tag_input(input: &str) -> Vec<String> {
    normalize_tags(input.split(','))
}

/// Trim, drop empties, keep the first occurrence of each tag.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for tag in tags {
        let trimmed = tag.as_ref().trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_string()) {
            out.push(trimmed.to_string());
        }
    }
    out
}

pub fn join_tags(tags: &[String]) -> String {
    tags.join(", ")
}

/// Deserialize an ID that can be either a string or a number into a String
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let val: serde_json::Value = serde_json::Value::deserialize(deserializer)?;
    match val {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        _ => Err(serde::de::Error::custom("expected string or number for id")),
    }
}

fn deserialize_blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|text| !text.trim().is_empty()))
}

fn deserialize_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let val: serde_json::Value = serde_json::Value::deserialize(deserializer)?;
    Ok(match val {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

fn deserialize_source<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let text = deserialize_text(deserializer)?;
    if text.trim().is_empty() {
        Ok(default_source())
    } else {
        Ok(text)
    }
}

fn deserialize_progress<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<f64> = Option::deserialize(deserializer)?;
    Ok(value.map(|raw| raw.clamp(0.0, 100.0).round() as u8))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_accepts_numeric_ids_and_blank_strings() {
        let snapshot: QuerySnapshot = serde_json::from_value(serde_json::json!({
            "id": 42,
            "status": "running",
            "classification": "",
            "error": "",
            "progress": 140,
            "results": []
        }))
        .expect("snapshot");

        assert_eq!(snapshot.id, QueryId::new("42"));
        assert_eq!(snapshot.status, Some(QueryStatus::Running));
        assert_eq!(snapshot.classification, None);
        assert_eq!(snapshot.error, None);
        assert_eq!(snapshot.progress, Some(100));
        assert_eq!(snapshot.results, Some(Vec::new()));
    }

    #[test]
    fn result_entry_falls_back_to_legacy_content_and_default_source() {
        let entry: ResultEntry = serde_json::from_value(serde_json::json!({
            "source": null,
            "content": "line one",
            "fields": [{"label": "Evidence score", "value": 0.8}]
        }))
        .expect("entry");

        assert_eq!(entry.source, "Result");
        assert_eq!(entry.summary, "line one");
        assert_eq!(entry.fields[0].value, "0.8");
        assert_eq!(entry.link, None);
    }

    #[test]
    fn tag_input_is_trimmed_and_deduplicated() {
        assert_eq!(parse_tag_input("a, b, b"), vec!["a", "b"]);
        assert_eq!(parse_tag_input(" , oncology ,,"), vec!["oncology"]);
    }

    #[test]
    fn distinct_sources_keep_first_appearance_order() {
        let mut query = Query::new(QueryKey::Confirmed("1".into()), "q", "2024-01-01 00:00:00");
        for source in ["Open Targets", "ClinicalTrials.gov", "Open Targets"] {
            query.results.push(ResultEntry {
                source: source.to_string(),
                title: String::new(),
                summary: String::new(),
                fields: Vec::new(),
                link: None,
            });
        }
        assert_eq!(
            query.distinct_sources(),
            vec!["Open Targets", "ClinicalTrials.gov"]
        );
        assert_eq!(query.results_for("Open Targets").count(), 2);
    }

    #[test]
    fn status_parses_labels_and_orders_by_rank() {
        assert_eq!("Completed".parse::<QueryStatus>(), Ok(QueryStatus::Success));
        assert!(QueryStatus::Pending.rank() < QueryStatus::Running.rank());
        assert_eq!(QueryStatus::Success.rank(), QueryStatus::Failed.rank());
        assert!("unknown".parse::<QueryStatus>().is_err());
    }
}
