use super::{Notice, StatusBadge, ViewBinder};
use gridsite_core::{Query, QueryKey, QueryStatus};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressCell {
    pub percent: u8,
    pub stage: Option<String>,
}

/// One row of the query table. `row_id` survives every reconcile and re-key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub row_id: u64,
    pub key: QueryKey,
    pub created_at: String,
    pub text: String,
    pub status: QueryStatus,
    pub badge: StatusBadge,
    pub progress: ProgressCell,
    pub classification: Option<String>,
    pub sources: Vec<String>,
    pub error: Option<String>,
    pub actions_enabled: bool,
}

#[derive(Debug, Default)]
pub struct TableView {
    rows: Vec<TableRow>,
    filter: Option<QueryStatus>,
    next_row_id: u64,
    completed_notified: HashSet<QueryKey>,
}

impl TableView {
    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn row(&self, key: &QueryKey) -> Option<&TableRow> {
        self.rows.iter().find(|row| &row.key == key)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn filter(&self) -> Option<QueryStatus> {
        self.filter
    }

    pub fn set_filter(&mut self, filter: Option<QueryStatus>) {
        self.filter = filter;
    }

    /// all -> pending -> running -> success -> failed -> all
    pub fn cycle_filter(&mut self) -> Option<QueryStatus> {
        let next = match self.filter {
            None => Some(QueryStatus::Pending),
            Some(QueryStatus::Pending) => Some(QueryStatus::Running),
            Some(QueryStatus::Running) => Some(QueryStatus::Success),
            Some(QueryStatus::Success) => Some(QueryStatus::Failed),
            Some(QueryStatus::Failed) => None,
        };
        self.set_filter(next);
        next
    }

    pub fn visible_rows(&self) -> impl Iterator<Item = &TableRow> {
        let filter = self.filter;
        self.rows
            .iter()
            .filter(move |row| filter.map(|status| row.status == status).unwrap_or(true))
    }

    fn sort(&mut self) {
        self.rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.row_id.cmp(&a.row_id))
        });
    }
}

fn fill_row(row: &mut TableRow, query: &Query) {
    row.created_at = query.created_at.clone();
    row.text = query.text.clone();
    row.status = query.status;
    row.badge = StatusBadge::for_status(query.status);
    row.progress = ProgressCell {
        percent: if query.status == QueryStatus::Success {
            100
        } else {
            query.progress.min(100)
        },
        stage: query.stage.clone(),
    };
    row.classification = query.classification.clone();
    row.sources = query
        .distinct_sources()
        .into_iter()
        .map(str::to_string)
        .collect();
    row.error = if query.status == QueryStatus::Failed {
        query.error.clone()
    } else {
        None
    };
    row.actions_enabled = !query.key.is_provisional() && query.status != QueryStatus::Pending;
}

impl ViewBinder for TableView {
    fn name(&self) -> &'static str {
        "table"
    }

    fn reconcile(&mut self, query: &Query) -> Option<Notice> {
        let previous = match self.rows.iter_mut().find(|row| row.key == query.key) {
            Some(row) => {
                let previous = row.status;
                fill_row(row, query);
                Some(previous)
            }
            None => {
                self.next_row_id += 1;
                let mut row = TableRow {
                    row_id: self.next_row_id,
                    key: query.key.clone(),
                    created_at: String::new(),
                    text: String::new(),
                    status: query.status,
                    badge: StatusBadge::for_status(query.status),
                    progress: ProgressCell {
                        percent: 0,
                        stage: None,
                    },
                    classification: None,
                    sources: Vec::new(),
                    error: None,
                    actions_enabled: false,
                };
                fill_row(&mut row, query);
                self.rows.push(row);
                None
            }
        };
        self.sort();

        // Only a live transition counts; hydrated or re-published successes stay quiet.
        let transitioned = matches!(previous, Some(status) if status != QueryStatus::Success);
        if transitioned
            && query.status == QueryStatus::Success
            && self.completed_notified.insert(query.key.clone())
        {
            return Some(Notice::Completed {
                key: query.key.clone(),
                text: query.text.clone(),
            });
        }
        None
    }

    fn remove(&mut self, key: &QueryKey) {
        self.rows.retain(|row| &row.key != key);
    }

    fn rekey(&mut self, from: &QueryKey, to: &QueryKey) {
        if let Some(row) = self.rows.iter_mut().find(|row| &row.key == from) {
            row.key = to.clone();
        }
        if self.completed_notified.remove(from) {
            self.completed_notified.insert(to.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsite_core::{QueryId, ResultEntry};

    fn query(id: &str, created_at: &str, status: QueryStatus, progress: u8) -> Query {
        let mut query = Query::new(
            QueryKey::Confirmed(QueryId::new(id)),
            format!("query {id}"),
            created_at,
        );
        query.status = status;
        query.progress = progress;
        query
    }

    #[test]
    fn reconcile_is_idempotent_and_keeps_row_identity() {
        let mut table = TableView::default();
        let record = query("1", "2024-05-01 10:00:00", QueryStatus::Running, 40);
        table.reconcile(&record);
        let first = table.row(&record.key).expect("row").clone();
        table.reconcile(&record);

        assert_eq!(table.len(), 1);
        assert_eq!(table.row(&record.key), Some(&first));
    }

    #[test]
    fn rows_sort_newest_first_with_later_rows_winning_ties() {
        let mut table = TableView::default();
        table.reconcile(&query("1", "2024-05-01 10:00:00", QueryStatus::Success, 100));
        table.reconcile(&query("2", "2024-05-03 10:00:00", QueryStatus::Running, 10));
        table.reconcile(&query("3", "2024-05-01 10:00:00", QueryStatus::Pending, 0));

        let order: Vec<String> = table.rows().iter().map(|row| row.key.to_string()).collect();
        assert_eq!(order, vec!["2", "3", "1"]);
    }

    #[test]
    fn completed_notice_fires_once_on_transition() {
        let mut table = TableView::default();
        let mut record = query("7", "2024-05-01 10:00:00", QueryStatus::Pending, 5);
        assert_eq!(table.reconcile(&record), None);

        record.status = QueryStatus::Running;
        record.progress = 80;
        assert_eq!(table.reconcile(&record), None);

        record.status = QueryStatus::Success;
        let notice = table.reconcile(&record).expect("notice");
        assert_eq!(
            notice,
            Notice::Completed {
                key: record.key.clone(),
                text: "query 7".to_string()
            }
        );
        assert_eq!(table.reconcile(&record), None);
        assert_eq!(table.row(&record.key).expect("row").progress.percent, 100);
    }

    #[test]
    fn first_sight_of_a_finished_query_is_silent() {
        let mut table = TableView::default();
        let record = query("8", "2024-05-01 10:00:00", QueryStatus::Success, 100);
        assert_eq!(table.reconcile(&record), None);
    }

    #[test]
    fn failed_rows_show_error_and_no_notice() {
        let mut table = TableView::default();
        let mut record = query("9", "2024-05-01 10:00:00", QueryStatus::Running, 60);
        table.reconcile(&record);
        record.status = QueryStatus::Failed;
        record.error = Some("timeout".to_string());

        assert_eq!(table.reconcile(&record), None);
        let row = table.row(&record.key).expect("row");
        assert_eq!(row.badge.label, "Failed");
        assert_eq!(row.error.as_deref(), Some("timeout"));
        assert_eq!(row.progress.percent, 60);
        assert!(row.actions_enabled);
    }

    #[test]
    fn sources_are_distinct_in_first_appearance_order() {
        let mut table = TableView::default();
        let mut record = query("4", "2024-05-01 10:00:00", QueryStatus::Success, 100);
        for source in ["Open Targets", "ClinicalTrials.gov", "Open Targets"] {
            record.results.push(ResultEntry {
                source: source.to_string(),
                title: "hit".to_string(),
                summary: String::new(),
                fields: Vec::new(),
                link: None,
            });
        }
        table.reconcile(&record);
        assert_eq!(
            table.row(&record.key).expect("row").sources,
            vec!["Open Targets", "ClinicalTrials.gov"]
        );
    }

    #[test]
    fn filter_cycles_and_limits_visible_rows() {
        let mut table = TableView::default();
        table.reconcile(&query("1", "2024-05-01 10:00:00", QueryStatus::Success, 100));
        table.reconcile(&query("2", "2024-05-02 10:00:00", QueryStatus::Running, 10));

        assert_eq!(table.cycle_filter(), Some(QueryStatus::Pending));
        assert_eq!(table.visible_rows().count(), 0);
        assert_eq!(table.cycle_filter(), Some(QueryStatus::Running));
        assert_eq!(table.visible_rows().count(), 1);
        table.cycle_filter();
        table.cycle_filter();
        assert_eq!(table.cycle_filter(), None);
        assert_eq!(table.visible_rows().count(), 2);
    }

    #[test]
    fn rekey_moves_the_row_without_a_new_identity() {
        let mut table = TableView::default();
        let provisional = Query::optimistic(QueryKey::Provisional(1), "text", "2024-05-01 10:00:00");
        table.reconcile(&provisional);
        let row_id = table.rows()[0].row_id;
        assert!(!table.rows()[0].actions_enabled);

        let confirmed = QueryKey::Confirmed(QueryId::new("11"));
        table.rekey(&provisional.key, &confirmed);
        assert!(table.row(&provisional.key).is_none());
        assert_eq!(table.row(&confirmed).expect("row").row_id, row_id);
    }
}
