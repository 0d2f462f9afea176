use super::{format_duration, Notice, StatusBadge, ViewBinder};
use gridsite_core::{join_tags, Query, QueryKey, ResultEntry};

pub const NO_RESULTS_PLACEHOLDER: &str = "No data yet.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTab {
    pub source: String,
    pub entries: Vec<ResultEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawerPanel {
    pub key: QueryKey,
    pub title: String,
    pub badge: StatusBadge,
    pub classification: Option<String>,
    pub rationale: Option<String>,
    pub duration: Option<String>,
    pub error: Option<String>,
    /// Pre-fill for the tag editor, comma separated.
    pub tag_editor: String,
    pub tabs: Vec<SourceTab>,
    pub placeholder: Option<&'static str>,
}

impl DrawerPanel {
    fn build(query: &Query) -> Self {
        let tabs: Vec<SourceTab> = query
            .distinct_sources()
            .into_iter()
            .map(|source| SourceTab {
                source: source.to_string(),
                entries: query.results_for(source).cloned().collect(),
            })
            .collect();
        let placeholder = tabs.is_empty().then_some(NO_RESULTS_PLACEHOLDER);
        Self {
            key: query.key.clone(),
            title: query.text.clone(),
            badge: StatusBadge::for_status(query.status),
            classification: query.classification.clone(),
            rationale: query.router_rationale.clone(),
            duration: query.duration_ms.map(format_duration),
            error: query.error.clone(),
            tag_editor: join_tags(&query.tags),
            tabs,
            placeholder,
        }
    }
}

/// Detail view of at most one query.
#[derive(Debug, Default)]
pub struct DrawerView {
    panel: Option<DrawerPanel>,
    active_tab: usize,
}

impl DrawerView {
    pub fn open(&mut self, query: &Query) {
        self.panel = Some(DrawerPanel::build(query));
        self.active_tab = 0;
    }

    pub fn close(&mut self) {
        self.panel = None;
        self.active_tab = 0;
    }

    pub fn is_open(&self) -> bool {
        self.panel.is_some()
    }

    pub fn open_key(&self) -> Option<&QueryKey> {
        self.panel.as_ref().map(|panel| &panel.key)
    }

    pub fn panel(&self) -> Option<&DrawerPanel> {
        self.panel.as_ref()
    }

    pub fn active_tab(&self) -> usize {
        self.active_tab
    }

    pub fn next_tab(&mut self) {
        let count = self.tab_count();
        if count > 0 {
            self.active_tab = (self.active_tab + 1) % count;
        }
    }

    pub fn prev_tab(&mut self) {
        let count = self.tab_count();
        if count > 0 {
            self.active_tab = (self.active_tab + count - 1) % count;
        }
    }

    fn tab_count(&self) -> usize {
        self.panel.as_ref().map(|panel| panel.tabs.len()).unwrap_or(0)
    }
}

impl ViewBinder for DrawerView {
    fn name(&self) -> &'static str {
        "drawer"
    }

    fn reconcile(&mut self, query: &Query) -> Option<Notice> {
        if self.open_key() == Some(&query.key) {
            self.panel = Some(DrawerPanel::build(query));
            let count = self.tab_count();
            if self.active_tab >= count {
                self.active_tab = count.saturating_sub(1);
            }
        }
        None
    }

    fn remove(&mut self, key: &QueryKey) {
        if self.open_key() == Some(key) {
            self.close();
        }
    }

    fn rekey(&mut self, from: &QueryKey, to: &QueryKey) {
        if let Some(panel) = self.panel.as_mut().filter(|panel| &panel.key == from) {
            panel.key = to.clone();
        }
    }
}
