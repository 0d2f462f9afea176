//! Render models kept in step with the store.
//!
//! Each binder owns the presentation of one surface and is told about every
//! merged record. Binders never read the store and never issue requests.

pub mod drawer;
pub mod history;
pub mod table;

pub use drawer::{DrawerPanel, DrawerView, SourceTab};
pub use history::{HistoryAction, HistoryEntry, HistoryView};
pub use table::{ProgressCell, TableRow, TableView};

use gridsite_core::{Query, QueryKey, QueryStatus};
use tracing::debug;

/// Something the user should hear about exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Completed { key: QueryKey, text: String },
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Notice::Completed { text, .. } => format!("Query completed: {}", ellipsize(text, 60)),
        }
    }
}

pub trait ViewBinder {
    fn name(&self) -> &'static str;

    /// Bring this surface in line with `query`. Must be idempotent for a
    /// record that has not changed.
    fn reconcile(&mut self, query: &Query) -> Option<Notice>;

    fn remove(&mut self, key: &QueryKey);

    fn rekey(&mut self, from: &QueryKey, to: &QueryKey);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeTone {
    Muted,
    Info,
    Ok,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusBadge {
    pub label: &'static str,
    pub tone: BadgeTone,
}

impl StatusBadge {
    pub fn for_status(status: QueryStatus) -> Self {
        let tone = match status {
            QueryStatus::Pending => BadgeTone::Muted,
            QueryStatus::Running => BadgeTone::Info,
            QueryStatus::Success => BadgeTone::Ok,
            QueryStatus::Failed => BadgeTone::Critical,
        };
        Self {
            label: status.label(),
            tone,
        }
    }
}

/// Table, history and drawer in publish order.
#[derive(Debug, Default)]
pub struct ViewSet {
    pub table: TableView,
    pub history: HistoryView,
    pub drawer: DrawerView,
}

impl ViewSet {
    fn binders(&mut self) -> [&mut dyn ViewBinder; 3] {
        [&mut self.table, &mut self.history, &mut self.drawer]
    }

    pub fn publish(&mut self, query: &Query) -> Vec<Notice> {
        let mut notices = Vec::new();
        for binder in self.binders() {
            if let Some(notice) = binder.reconcile(query) {
                debug!(event = "view_notice", view = binder.name(), key = %query.key);
                notices.push(notice);
            }
        }
        notices
    }

    pub fn remove(&mut self, key: &QueryKey) {
        for binder in self.binders() {
            binder.remove(key);
        }
    }

    pub fn rekey(&mut self, from: &QueryKey, to: &QueryKey) {
        for binder in self.binders() {
            binder.rekey(from, to);
        }
    }
}

pub fn format_duration(duration_ms: u64) -> String {
    if duration_ms < 1_000 {
        return format!("{duration_ms}ms");
    }
    let secs = duration_ms / 1_000;
    if secs < 60 {
        return format!("{:.1}s", duration_ms as f64 / 1_000.0);
    }
    let mins = secs / 60;
    if mins < 60 {
        return format!("{mins}m {}s", secs % 60);
    }
    format!("{}h {}m", mins / 60, mins % 60)
}

pub fn ellipsize(input: &str, max: usize) -> String {
    if input.chars().count() <= max {
        return input.to_string();
    }
    if max <= 3 {
        return input.chars().take(max).collect();
    }
    let mut out: String = input.chars().take(max - 3).collect();
    out.push_str("...");
    out
}
