use crate::session::SessionEvent;
use chrono::{DateTime, Utc};
use gridsite_client::{ApiError, QueryApi};
use gridsite_core::HealthSnapshot;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_millis(60_000);
/// Indicator name for the task worker, reported as `celery_ok`.
pub const WORKER_INDICATOR: &str = "worker";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Healthy,
    Unhealthy,
    Unknown,
}

impl Indicator {
    fn from_ok(ok: bool) -> Self {
        if ok {
            Indicator::Healthy
        } else {
            Indicator::Unhealthy
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Indicator::Healthy => "ok",
            Indicator::Unhealthy => "down",
            Indicator::Unknown => "?",
        }
    }
}

#[derive(Debug, Default)]
pub struct HealthBoard {
    indicators: BTreeMap<String, Indicator>,
    last_checked: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl HealthBoard {
    pub fn apply(&mut self, result: Result<HealthSnapshot, ApiError>) {
        self.last_checked = Some(Utc::now());
        match result {
            Ok(snapshot) => {
                for indicator in self.indicators.values_mut() {
                    *indicator = Indicator::Unknown;
                }
                self.indicators.insert(
                    WORKER_INDICATOR.to_string(),
                    Indicator::from_ok(snapshot.celery_ok),
                );
                for (name, ok) in snapshot.checks {
                    self.indicators.insert(name, Indicator::from_ok(ok));
                }
                self.last_error = None;
            }
            Err(err) => {
                self.indicators
                    .entry(WORKER_INDICATOR.to_string())
                    .or_insert(Indicator::Unknown);
                for indicator in self.indicators.values_mut() {
                    *indicator = Indicator::Unknown;
                }
                self.last_error = Some(err.to_string());
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Indicator> {
        self.indicators.get(name).copied()
    }

    pub fn indicators(&self) -> impl Iterator<Item = (&str, Indicator)> {
        self.indicators
            .iter()
            .map(|(name, indicator)| (name.as_str(), *indicator))
    }

    pub fn last_checked(&self) -> Option<DateTime<Utc>> {
        self.last_checked
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

/// Background health probe; aborted when dropped.
pub struct HealthMonitor {
    task: JoinHandle<()>,
}

impl HealthMonitor {
    pub fn spawn(
        api: Arc<dyn QueryApi>,
        events: mpsc::Sender<SessionEvent>,
        interval: Duration,
    ) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let result = api.health().await;
                match &result {
                    Ok(snapshot) => debug!(
                        event = "health_checked",
                        worker_ok = snapshot.celery_ok,
                        checks = snapshot.checks.len()
                    ),
                    Err(err) => warn!(event = "health_failed", error = %err),
                }
                if events.send(SessionEvent::Health(result)).await.is_err() {
                    break;
                }
            }
        });
        Self { task }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}
