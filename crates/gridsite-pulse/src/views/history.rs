use super::{Notice, StatusBadge, ViewBinder};
use gridsite_core::{Query, QueryId, QueryKey, QueryStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub key: QueryKey,
    pub status: QueryStatus,
    pub badge: StatusBadge,
    pub title: String,
    pub timestamp: String,
    pub chips: Vec<String>,
}

/// Intents an entry offers; the session turns them into commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryAction {
    Rerun(QueryId),
    Delete(QueryId),
}

#[derive(Debug, Default)]
pub struct HistoryView {
    entries: Vec<HistoryEntry>,
}

impl HistoryView {
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn entry(&self, key: &QueryKey) -> Option<&HistoryEntry> {
        self.entries.iter().find(|entry| &entry.key == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Re-run and delete intents; none while the query is still pending.
    pub fn actions(&self, key: &QueryKey) -> Vec<HistoryAction> {
        match (self.entry(key), key.confirmed_id()) {
            (Some(entry), Some(id)) if entry.status != QueryStatus::Pending => vec![
                HistoryAction::Rerun(id.clone()),
                HistoryAction::Delete(id.clone()),
            ],
            _ => Vec::new(),
        }
    }
}

impl ViewBinder for HistoryView {
    fn name(&self) -> &'static str {
        "history"
    }

    fn reconcile(&mut self, query: &Query) -> Option<Notice> {
        let index = match self.entries.iter().position(|entry| entry.key == query.key) {
            Some(index) => index,
            None => {
                self.entries.insert(
                    0,
                    HistoryEntry {
                        key: query.key.clone(),
                        status: query.status,
                        badge: StatusBadge::for_status(query.status),
                        title: String::new(),
                        timestamp: String::new(),
                        chips: Vec::new(),
                    },
                );
                0
            }
        };
        let entry = &mut self.entries[index];
        entry.status = query.status;
        entry.badge = StatusBadge::for_status(query.status);
        entry.title = query.text.clone();
        entry.timestamp = query.created_at.clone();
        entry.chips = query.tags.clone();
        // Stable: among equal timestamps the entry inserted last stays first.
        self.entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        None
    }

    fn remove(&mut self, key: &QueryKey) {
        self.entries.retain(|entry| &entry.key != key);
    }

    fn rekey(&mut self, from: &QueryKey, to: &QueryKey) {
        if let Some(entry) = self.entries.iter_mut().find(|entry| &entry.key == from) {
            entry.key = to.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged(id: &str, created_at: &str, tags: &[&str]) -> Query {
        let mut query = Query::new(QueryKey::Confirmed(QueryId::new(id)), "q", created_at);
        query.status = QueryStatus::Success;
        query.tags = tags.iter().map(|tag| tag.to_string()).collect();
        query
    }

    #[test]
    fn chips_are_replaced_on_every_reconcile() {
        let mut history = HistoryView::default();
        history.reconcile(&tagged("1", "2024-05-01 10:00:00", &["a", "b", "c"]));
        history.reconcile(&tagged("1", "2024-05-01 10:00:00", &["a", "b"]));

        assert_eq!(history.len(), 1);
        assert_eq!(history.entries()[0].chips, vec!["a", "b"]);
    }

    #[test]
    fn entries_are_reverse_chronological() {
        let mut history = HistoryView::default();
        history.reconcile(&tagged("1", "2024-05-01 10:00:00", &[]));
        history.reconcile(&tagged("2", "2024-05-03 10:00:00", &[]));
        history.reconcile(&tagged("3", "2024-05-02 10:00:00", &[]));

        let order: Vec<String> = history
            .entries()
            .iter()
            .map(|entry| entry.key.to_string())
            .collect();
        assert_eq!(order, vec!["2", "3", "1"]);
    }

    #[test]
    fn only_confirmed_entries_offer_actions() {
        let mut history = HistoryView::default();
        let confirmed = tagged("5", "2024-05-01 10:00:00", &[]);
        let provisional = Query::optimistic(QueryKey::Provisional(1), "q", "2024-05-01 10:00:01");
        history.reconcile(&confirmed);
        history.reconcile(&provisional);

        assert_eq!(
            history.actions(&confirmed.key),
            vec![
                HistoryAction::Rerun(QueryId::new("5")),
                HistoryAction::Delete(QueryId::new("5"))
            ]
        );
        assert!(history.actions(&provisional.key).is_empty());
        assert!(history
            .actions(&QueryKey::Confirmed(QueryId::new("404")))
            .is_empty());
    }

    #[test]
    fn pending_entries_offer_no_actions_until_they_move() {
        let mut history = HistoryView::default();
        let mut query = tagged("6", "2024-05-01 10:00:00", &[]);
        query.status = QueryStatus::Pending;
        history.reconcile(&query);
        assert!(history.actions(&query.key).is_empty());

        query.status = QueryStatus::Running;
        history.reconcile(&query);
        assert_eq!(history.actions(&query.key).len(), 2);
    }
}
