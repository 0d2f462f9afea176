mod config;
mod dispatcher;
mod export;
mod health;
mod input;
mod poller;
mod session;
mod templates;
mod theme;
mod ui;
mod views;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use clap::Parser;
use config::{log_stdout_enabled, Config};
use crossterm::event::EventStream;
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use futures_util::StreamExt;
use gridsite_client::{HttpQueryApi, QueryApi};
use gridsite_core::hydrate::{self, InitialPayload};
use health::HealthMonitor;
use input::{handle_input, Console};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use session::{Session, SessionEvent};
use std::fs::OpenOptions;
use std::io::{self, Stdout};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use ui::render_ui;

const EVENT_QUEUE_CAPACITY: usize = 256;
const REDRAW_TICK_MS: u64 = 1_000;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    config.validate()?;
    init_logging(&config)?;
    info!(event = "pulse_start", base_url = %config.base_url);

    let api: Arc<dyn QueryApi> =
        Arc::new(HttpQueryApi::new(config.client()).context("build http client")?);
    let (event_tx, mut event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let mut session = Session::new(Arc::clone(&api), event_tx.clone(), config.poll_interval());
    match load_initial(&config, api.as_ref()).await {
        Ok(payload) => {
            session.hydrate(payload);
        }
        Err(err) => {
            warn!(event = "hydrate_failed", error = %err);
            session.status_note = Some(format!("Initial load failed: {err:#}"));
        }
    }
    let _health = HealthMonitor::spawn(Arc::clone(&api), event_tx, config.health_interval());
    let mut console = Console::new(config.opener.clone());

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run(&mut terminal, &mut session, &mut console, &mut event_rx).await;
    session.shutdown();

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    info!(event = "pulse_stop");
    result
}

async fn run(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    session: &mut Session,
    console: &mut Console,
    event_rx: &mut mpsc::Receiver<SessionEvent>,
) -> Result<()> {
    let mut events = EventStream::new();
    let mut redraw = tokio::time::interval(Duration::from_millis(REDRAW_TICK_MS));
    loop {
        console.clamp(session);
        terminal.draw(|frame| render_ui(frame, session, console))?;
        tokio::select! {
            _ = redraw.tick() => {}
            Some(event) = event_rx.recv() => {
                session.apply(event);
            }
            maybe_event = events.next() => {
                match maybe_event {
                    Some(Ok(event)) => {
                        if handle_input(event, console, session) {
                            break;
                        }
                    }
                    Some(Err(err)) => return Err(err).context("read terminal event"),
                    None => break,
                }
            }
        }
    }
    Ok(())
}

/// Page payloads, with file overrides taking precedence over page extraction.
async fn load_initial(config: &Config, api: &dyn QueryApi) -> Result<InitialPayload> {
    let mut payload = match (&config.initial_data, &config.templates_data) {
        (Some(_), Some(_)) => InitialPayload::default(),
        _ => {
            let page = api.fetch_dashboard().await.context("fetch dashboard page")?;
            hydrate::from_page(&page)?
        }
    };
    if let Some(path) = &config.initial_data {
        let raw = hydrate::read_blob(path)?;
        payload.queries = hydrate::decode_queries(&raw, &path.display().to_string())?;
    }
    if let Some(path) = &config.templates_data {
        let raw = hydrate::read_blob(path)?;
        payload.templates = hydrate::decode_templates(&raw, &path.display().to_string())?;
    }
    Ok(payload)
}

fn init_logging(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if let Some(path) = &config.log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file {}", path.display()))?;
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init();
    } else if log_stdout_enabled() {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::sink)
            .try_init();
    }
    Ok(())
}
