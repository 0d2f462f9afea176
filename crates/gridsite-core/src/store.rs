use crate::{normalize_tags, Query, QueryId, QueryKey, QuerySnapshot, QueryStatus};
use std::collections::{HashMap, HashSet};

/// Latest known record per query. The only shared mutable structure of a
/// dashboard session; it never touches the network or the screen.
#[derive(Debug, Default)]
pub struct QueryStore {
    records: HashMap<QueryKey, Query>,
    deleted: HashSet<QueryId>,
    next_provisional: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreMetrics {
    pub pending: usize,
    pub running: usize,
    pub success: usize,
    pub failed: usize,
    pub avg_duration_ms: Option<u64>,
    pub last_activity: Option<String>,
}

impl StoreMetrics {
    pub fn total(&self) -> usize {
        self.pending + self.running + self.success + self.failed
    }

    pub fn active(&self) -> usize {
        self.pending + self.running
    }

    pub fn count(&self, status: QueryStatus) -> usize {
        match status {
            QueryStatus::Pending => self.pending,
            QueryStatus::Running => self.running,
            QueryStatus::Success => self.success,
            QueryStatus::Failed => self.failed,
        }
    }
}

impl QueryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &QueryKey) -> Option<&Query> {
        self.records.get(key)
    }

    pub fn get_confirmed(&self, id: &QueryId) -> Option<&Query> {
        self.records.get(&QueryKey::Confirmed(id.clone()))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Query> {
        self.records.values()
    }

    pub fn is_deleted(&self, id: &QueryId) -> bool {
        self.deleted.contains(id)
    }

    /// Fold a server snapshot into the record for `snapshot.id`, creating it
    /// when absent. Returns `None` for ids deleted during this session.
    pub fn merge(&mut self, snapshot: QuerySnapshot) -> Option<&Query> {
        if self.deleted.contains(&snapshot.id) {
            return None;
        }
        let key = QueryKey::Confirmed(snapshot.id.clone());
        let record = self
            .records
            .entry(key.clone())
            .or_insert_with(|| Query::new(key, "", ""));
        apply_snapshot(record, snapshot);
        Some(&*record)
    }

    /// Seed the store from server-rendered data; returns how many records were merged.
    pub fn hydrate(&mut self, snapshots: impl IntoIterator<Item = QuerySnapshot>) -> usize {
        snapshots
            .into_iter()
            .filter_map(|snapshot| self.merge(snapshot).map(|_| ()))
            .count()
    }

    pub fn insert_provisional(
        &mut self,
        text: impl Into<String>,
        created_at: impl Into<String>,
    ) -> QueryKey {
        self.next_provisional = self.next_provisional.saturating_add(1);
        let key = QueryKey::Provisional(self.next_provisional);
        self.records
            .insert(key.clone(), Query::optimistic(key.clone(), text, created_at));
        key
    }

    /// Re-key a provisional record under its authoritative id. Fields already
    /// known for `id` win over the provisional ones.
    pub fn confirm(&mut self, provisional: u64, id: QueryId) -> Option<&Query> {
        if self.deleted.contains(&id) {
            self.records.remove(&QueryKey::Provisional(provisional));
            return None;
        }
        let mut record = self.records.remove(&QueryKey::Provisional(provisional))?;
        let key = QueryKey::Confirmed(id);
        record.key = key.clone();
        let merged = match self.records.remove(&key) {
            Some(mut existing) => {
                absorb_missing(&mut existing, record);
                existing
            }
            None => record,
        };
        Some(&*self.records.entry(key).or_insert(merged))
    }

    pub fn discard_provisional(&mut self, provisional: u64) -> Option<Query> {
        self.records.remove(&QueryKey::Provisional(provisional))
    }

    /// Pending record for an id the backend just issued (re-run).
    pub fn insert_pending(
        &mut self,
        id: QueryId,
        text: impl Into<String>,
        created_at: impl Into<String>,
        tags: Vec<String>,
    ) -> Option<&Query> {
        if self.deleted.contains(&id) {
            return None;
        }
        let key = QueryKey::Confirmed(id);
        let record = self.records.entry(key.clone()).or_insert_with(|| {
            let mut query = Query::optimistic(key, text, created_at);
            query.tags = normalize_tags(tags);
            query
        });
        Some(&*record)
    }

    /// Overwrite the tags of an existing record with the server's canonical set.
    pub fn set_tags(&mut self, id: &QueryId, tags: Vec<String>) -> Option<&Query> {
        if !self.records.contains_key(&QueryKey::Confirmed(id.clone())) {
            return None;
        }
        self.merge(QuerySnapshot::new(id.clone()).with_tags(tags))
    }

    /// Drop a record for good; later snapshots for the id are refused.
    pub fn remove(&mut self, id: &QueryId) -> Option<Query> {
        self.deleted.insert(id.clone());
        self.records.remove(&QueryKey::Confirmed(id.clone()))
    }

    pub fn metrics(&self) -> StoreMetrics {
        let mut metrics = StoreMetrics::default();
        let mut duration_total: u64 = 0;
        let mut duration_count: u64 = 0;
        for query in self.records.values() {
            match query.status {
                QueryStatus::Pending => metrics.pending += 1,
                QueryStatus::Running => metrics.running += 1,
                QueryStatus::Success => metrics.success += 1,
                QueryStatus::Failed => metrics.failed += 1,
            }
            if let Some(duration) = query.duration_ms {
                duration_total = duration_total.saturating_add(duration);
                duration_count += 1;
            }
            let newer = metrics
                .last_activity
                .as_deref()
                .map(|current| query.created_at.as_str() > current)
                .unwrap_or(true);
            if newer && !query.created_at.is_empty() {
                metrics.last_activity = Some(query.created_at.clone());
            }
        }
        if duration_count > 0 {
            metrics.avg_duration_ms = Some(duration_total / duration_count);
        }
        metrics
    }
}

fn status_may_advance(current: QueryStatus, next: QueryStatus) -> bool {
    if current.is_terminal() {
        return next == current;
    }
    next.rank() >= current.rank()
}

fn apply_snapshot(record: &mut Query, snapshot: QuerySnapshot) {
    let QuerySnapshot {
        id: _,
        text,
        created_at,
        status,
        progress,
        stage,
        classification,
        resolution,
        router_rationale,
        results,
        tags,
        duration_ms,
        error,
    } = snapshot;

    if record.text.is_empty() {
        if let Some(text) = text {
            record.text = text;
        }
    }
    if record.created_at.is_empty() {
        if let Some(created_at) = created_at {
            record.created_at = created_at;
        }
    }

    let in_order = match status {
        Some(next) if status_may_advance(record.status, next) => {
            record.status = next;
            true
        }
        Some(_) => false,
        None => true,
    };
    if in_order {
        if let Some(progress) = progress {
            record.progress = progress.min(100);
        }
    }

    if let Some(stage) = stage {
        record.stage = Some(stage);
    }
    if let Some(classification) = classification {
        record.classification = Some(classification);
    }
    if let Some(resolution) = resolution {
        record.resolution = Some(resolution);
    }
    if let Some(rationale) = router_rationale {
        record.router_rationale = Some(rationale);
    }
    if let Some(results) = results {
        record.results = results;
    }
    if let Some(tags) = tags {
        record.tags = normalize_tags(tags);
    }
    if record.status.is_terminal() {
        if let Some(duration_ms) = duration_ms {
            record.duration_ms = Some(duration_ms);
        }
    }
    if record.status == QueryStatus::Failed {
        if let Some(error) = error {
            record.error = Some(error);
        }
    }
}

fn absorb_missing(target: &mut Query, source: Query) {
    if target.text.is_empty() {
        target.text = source.text;
    }
    if target.created_at.is_empty() {
        target.created_at = source.created_at;
    }
    if target.stage.is_none() {
        target.stage = source.stage;
    }
    if target.tags.is_empty() {
        target.tags = source.tags;
    }
    if target.results.is_empty() {
        target.results = source.results;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResultEntry;

    fn snapshot(id: &str, status: QueryStatus) -> QuerySnapshot {
        QuerySnapshot::new(QueryId::new(id)).with_status(status)
    }

    fn entry(source: &str) -> ResultEntry {
        ResultEntry {
            source: source.to_string(),
            title: "Trial A".to_string(),
            summary: String::new(),
            fields: Vec::new(),
            link: None,
        }
    }

    #[test]
    fn status_never_regresses_across_merges() {
        let mut store = QueryStore::new();
        let sequence = [
            QueryStatus::Running,
            QueryStatus::Pending,
            QueryStatus::Success,
            QueryStatus::Running,
            QueryStatus::Failed,
        ];
        let mut last_rank = 0;
        for status in sequence {
            let merged = store.merge(snapshot("7", status)).expect("merged");
            assert!(merged.status.rank() >= last_rank);
            last_rank = merged.status.rank();
        }
        let record = store.get_confirmed(&QueryId::new("7")).expect("record");
        assert_eq!(record.status, QueryStatus::Success);
    }

    #[test]
    fn regressing_snapshot_keeps_progress() {
        let mut store = QueryStore::new();
        store.merge(snapshot("1", QueryStatus::Running).with_progress(80));
        let merged = store
            .merge(snapshot("1", QueryStatus::Pending).with_progress(10))
            .expect("merged");
        assert_eq!(merged.status, QueryStatus::Running);
        assert_eq!(merged.progress, 80);
    }

    #[test]
    fn absent_fields_are_never_deleted() {
        let mut store = QueryStore::new();
        let mut first = snapshot("3", QueryStatus::Running);
        first.text = Some("find trials for melanoma".to_string());
        first.classification = Some("clinical_trials".to_string());
        first.router_rationale = Some("Routed to trials".to_string());
        first.results = Some(vec![entry("ClinicalTrials.gov")]);
        first.tags = Some(vec!["oncology".to_string()]);
        store.merge(first);

        let merged = store
            .merge(snapshot("3", QueryStatus::Success))
            .expect("merged");
        assert_eq!(merged.text, "find trials for melanoma");
        assert_eq!(merged.classification.as_deref(), Some("clinical_trials"));
        assert_eq!(merged.router_rationale.as_deref(), Some("Routed to trials"));
        assert_eq!(merged.results.len(), 1);
        assert_eq!(merged.tags, vec!["oncology"]);
    }

    #[test]
    fn results_are_replaced_not_appended() {
        let mut store = QueryStore::new();
        let mut first = snapshot("4", QueryStatus::Running);
        first.results = Some(vec![entry("A"), entry("B")]);
        store.merge(first);
        let mut second = snapshot("4", QueryStatus::Success);
        second.results = Some(vec![entry("C")]);
        let merged = store.merge(second).expect("merged");
        assert_eq!(merged.distinct_sources(), vec!["C"]);
    }

    #[test]
    fn error_and_duration_only_land_on_terminal_records() {
        let mut store = QueryStore::new();
        let mut running = snapshot("5", QueryStatus::Running);
        running.error = Some("early".to_string());
        running.duration_ms = Some(10);
        let merged = store.merge(running).expect("merged");
        assert_eq!(merged.error, None);
        assert_eq!(merged.duration_ms, None);

        let mut failed = snapshot("5", QueryStatus::Failed);
        failed.error = Some("timeout".to_string());
        failed.duration_ms = Some(1200);
        let merged = store.merge(failed).expect("merged");
        assert_eq!(merged.error.as_deref(), Some("timeout"));
        assert_eq!(merged.duration_ms, Some(1200));
    }

    #[test]
    fn removed_ids_are_not_resurrected() {
        let mut store = QueryStore::new();
        store.merge(snapshot("9", QueryStatus::Running));
        assert!(store.remove(&QueryId::new("9")).is_some());
        assert!(store.merge(snapshot("9", QueryStatus::Success)).is_none());
        assert!(store.get_confirmed(&QueryId::new("9")).is_none());
        assert!(store.is_deleted(&QueryId::new("9")));
    }

    #[test]
    fn confirm_rekeys_provisional_record() {
        let mut store = QueryStore::new();
        let key = store.insert_provisional("find trials for melanoma", "2024-05-01 10:00:00");
        let QueryKey::Provisional(seq) = key else {
            panic!("expected provisional key");
        };
        let confirmed = store.confirm(seq, QueryId::new("11")).expect("confirmed");
        assert_eq!(confirmed.key, QueryKey::Confirmed(QueryId::new("11")));
        assert_eq!(confirmed.progress, crate::OPTIMISTIC_PROGRESS);
        assert_eq!(confirmed.text, "find trials for melanoma");
        assert!(store.get(&key).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn confirm_keeps_fields_already_known_for_the_id() {
        let mut store = QueryStore::new();
        store.merge(snapshot("12", QueryStatus::Running).with_progress(40));
        let key = store.insert_provisional("text", "2024-05-01 10:00:00");
        let QueryKey::Provisional(seq) = key else {
            panic!("expected provisional key");
        };
        let confirmed = store.confirm(seq, QueryId::new("12")).expect("confirmed");
        assert_eq!(confirmed.status, QueryStatus::Running);
        assert_eq!(confirmed.progress, 40);
        assert_eq!(confirmed.text, "text");
    }

    #[test]
    fn set_tags_requires_existing_record_and_normalizes() {
        let mut store = QueryStore::new();
        assert!(store
            .set_tags(&QueryId::new("1"), vec!["a".to_string()])
            .is_none());
        store.merge(snapshot("1", QueryStatus::Success));
        let merged = store
            .set_tags(
                &QueryId::new("1"),
                vec!["a".to_string(), "b".to_string(), "b".to_string()],
            )
            .expect("tags");
        assert_eq!(merged.tags, vec!["a", "b"]);
    }

    #[test]
    fn metrics_summarize_statuses_and_durations() {
        let mut store = QueryStore::new();
        let mut done = snapshot("1", QueryStatus::Success);
        done.duration_ms = Some(1000);
        done.created_at = Some("2024-05-01 10:00:00".to_string());
        store.merge(done);
        let mut failed = snapshot("2", QueryStatus::Failed);
        failed.duration_ms = Some(3000);
        failed.created_at = Some("2024-05-02 10:00:00".to_string());
        store.merge(failed);
        store.insert_provisional("pending one", "2024-05-03 09:00:00");

        let metrics = store.metrics();
        assert_eq!(metrics.total(), 3);
        assert_eq!(metrics.active(), 1);
        assert_eq!(metrics.avg_duration_ms, Some(2000));
        assert_eq!(metrics.last_activity.as_deref(), Some("2024-05-03 09:00:00"));
    }
}
