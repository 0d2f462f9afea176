use crate::input::{Console, Focus, Mode};
use crate::session::Session;
use crate::theme::{pulse_theme, PulseTheme};
use crate::views::{ellipsize, DrawerPanel, HistoryEntry, TableRow};
use chrono::Local;
use gridsite_core::StoreMetrics;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Tabs, Wrap};

const PROGRESS_WIDTH: usize = 10;

pub fn render_ui(frame: &mut ratatui::Frame, session: &Session, console: &Console) {
    let size = frame.size();
    let theme = pulse_theme();
    frame.render_widget(Block::default().style(Style::default().bg(theme.bg)), size);
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(size);
    frame.render_widget(render_header(session, theme), layout[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(62), Constraint::Percentage(38)])
        .split(layout[1]);
    render_table_panel(frame, session, console, theme, body[0]);
    let side = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(body[1]);
    render_history_panel(frame, session, console, theme, side[0]);
    render_templates_panel(frame, session, console, theme, side[1]);
    frame.render_widget(render_footer(session, console, theme), layout[2]);

    if let Some(panel) = session.views().drawer.panel() {
        render_drawer(frame, panel, session.views().drawer.active_tab(), theme);
    }
    if console.help_open {
        render_help_overlay(frame, theme);
    }
}

fn panel_block(title: &str, focused: bool, theme: PulseTheme) -> Block<'static> {
    let border = if focused { theme.accent } else { theme.border };
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .style(Style::default().bg(theme.surface))
        .title(Span::styled(title.to_string(), theme.title_style()))
}

fn render_header(session: &Session, theme: PulseTheme) -> Paragraph<'static> {
    let metrics = session.store().metrics();
    let mut health_spans = vec![Span::styled("health ", Style::default().fg(theme.muted))];
    let mut any = false;
    for (name, indicator) in session.health().indicators() {
        any = true;
        health_spans.push(Span::styled(
            format!("{name}:{} ", indicator.label()),
            Style::default().fg(theme.indicator(indicator)),
        ));
    }
    if !any {
        health_spans.push(Span::styled("checking...", Style::default().fg(theme.muted)));
    }
    if let Some(checked) = session.health().last_checked() {
        health_spans.push(Span::styled(
            format!("@{} ", checked.with_timezone(&Local).format("%H:%M:%S")),
            Style::default().fg(theme.muted),
        ));
    }
    if let Some(error) = session.health().last_error() {
        health_spans.push(Span::styled(
            ellipsize(error, 40),
            Style::default().fg(theme.critical),
        ));
    }
    if let Some(notice) = session.notices().last() {
        health_spans.push(Span::styled(
            format!("  {}", notice.message()),
            Style::default().fg(theme.ok),
        ));
    }
    let lines = vec![
        Line::from(kpi_spans(&metrics, session.is_processing(), theme)),
        Line::from(health_spans),
    ];
    Paragraph::new(Text::from(lines))
        .style(Style::default().fg(theme.text).bg(theme.surface))
        .block(panel_block("gridsite pulse", false, theme))
}

fn kpi_spans(metrics: &StoreMetrics, processing: bool, theme: PulseTheme) -> Vec<Span<'static>> {
    let mut spans = vec![
        Span::styled(
            format!("queries {} ", metrics.total()),
            Style::default().fg(theme.text).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("active {} ", metrics.active()),
            Style::default().fg(theme.info),
        ),
        Span::styled(
            format!("done {} ", metrics.success),
            Style::default().fg(theme.ok),
        ),
        Span::styled(
            format!("failed {} ", metrics.failed),
            Style::default().fg(if metrics.failed > 0 {
                theme.critical
            } else {
                theme.muted
            }),
        ),
    ];
    if let Some(avg) = metrics.avg_duration_ms {
        spans.push(Span::styled(
            format!("avg {} ", crate::views::format_duration(avg)),
            Style::default().fg(theme.muted),
        ));
    }
    if let Some(last) = metrics.last_activity.as_deref() {
        spans.push(Span::styled(
            format!("last {last} "),
            Style::default().fg(theme.muted),
        ));
    }
    if processing {
        spans.push(Span::styled(
            "[processing]",
            Style::default().fg(theme.warn).add_modifier(Modifier::BOLD),
        ));
    }
    spans
}

pub fn progress_bar(percent: u8, width: usize) -> String {
    let filled = (usize::from(percent.min(100)) * width + 50) / 100;
    format!(
        "{}{}",
        "█".repeat(filled),
        "░".repeat(width.saturating_sub(filled))
    )
}

fn table_row_spans(row: &TableRow, live: bool, theme: PulseTheme, width: u16) -> Vec<Span<'static>> {
    let badge_color = theme.tone(row.badge.tone);
    let mut spans = vec![
        Span::styled(
            if live { "~ " } else { "  " },
            Style::default().fg(theme.warn),
        ),
        Span::styled(
            format!("{:<9}", row.badge.label),
            Style::default().fg(badge_color).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("{} ", progress_bar(row.progress.percent, PROGRESS_WIDTH)),
            Style::default().fg(badge_color),
        ),
        Span::styled(
            format!("{:>3}% ", row.progress.percent),
            Style::default().fg(theme.text),
        ),
    ];
    let text_budget = usize::from(width).saturating_sub(40).max(12);
    let text_color = if row.actions_enabled { theme.text } else { theme.muted };
    spans.push(Span::styled(
        ellipsize(&row.text, text_budget),
        Style::default().fg(text_color),
    ));
    if !row.actions_enabled {
        let marker = if row.key.is_provisional() { "  (sending)" } else { "  (locked)" };
        spans.push(Span::styled(
            marker,
            Style::default().fg(theme.muted).add_modifier(Modifier::ITALIC),
        ));
    }
    if let Some(stage) = row.progress.stage.as_deref() {
        spans.push(Span::styled(
            format!("  {stage}"),
            Style::default().fg(theme.muted),
        ));
    }
    if let Some(classification) = row.classification.as_deref() {
        spans.push(Span::styled(
            format!("  <{classification}>"),
            Style::default().fg(theme.accent),
        ));
    }
    if !row.sources.is_empty() {
        spans.push(Span::styled(
            format!("  [{}]", row.sources.join(", ")),
            Style::default().fg(theme.info),
        ));
    }
    if let Some(error) = row.error.as_deref() {
        spans.push(Span::styled(
            format!("  {}", ellipsize(error, 40)),
            Style::default().fg(theme.critical),
        ));
    }
    spans
}

fn render_table_panel(
    frame: &mut ratatui::Frame,
    session: &Session,
    console: &Console,
    theme: PulseTheme,
    area: Rect,
) {
    let table = &session.views().table;
    let title = match table.filter() {
        Some(status) => format!("Queries ({})", status.label()),
        None => "Queries".to_string(),
    };
    let focused = console.focus == Focus::Table;
    let rows: Vec<&TableRow> = table.visible_rows().collect();
    if rows.is_empty() {
        let paragraph = Paragraph::new(Line::from(Span::styled(
            "No queries yet. Press n to submit one.",
            Style::default().fg(theme.muted),
        )))
        .block(panel_block(&title, focused, theme));
        frame.render_widget(paragraph, area);
        return;
    }
    let items: Vec<ListItem> = rows
        .iter()
        .map(|row| {
            let live = row
                .key
                .confirmed_id()
                .map(|id| session.is_polling(id))
                .unwrap_or(false);
            ListItem::new(Line::from(table_row_spans(row, live, theme, area.width)))
        })
        .collect();
    let mut state = ListState::default();
    if focused {
        state.select(Some(console.table_selected.min(rows.len() - 1)));
    }
    let list = List::new(items)
        .highlight_symbol(">> ")
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .block(panel_block(&title, focused, theme));
    frame.render_stateful_widget(list, area, &mut state);
}

fn history_item(entry: &HistoryEntry, theme: PulseTheme) -> ListItem<'static> {
    let mut first = vec![
        Span::styled(
            format!("{:<9}", entry.badge.label),
            Style::default().fg(theme.tone(entry.badge.tone)),
        ),
        Span::styled(ellipsize(&entry.title, 48), Style::default().fg(theme.text)),
    ];
    if entry.key.is_provisional() {
        first.push(Span::styled(" (sending)", Style::default().fg(theme.muted)));
    }
    let mut second = vec![Span::styled(
        format!("  {} ", entry.timestamp),
        Style::default().fg(theme.muted),
    )];
    for chip in &entry.chips {
        second.push(Span::styled(
            format!("#{chip} "),
            Style::default().fg(theme.accent),
        ));
    }
    ListItem::new(Text::from(vec![Line::from(first), Line::from(second)]))
}

fn render_history_panel(
    frame: &mut ratatui::Frame,
    session: &Session,
    console: &Console,
    theme: PulseTheme,
    area: Rect,
) {
    let history = &session.views().history;
    let focused = console.focus == Focus::History;
    let items: Vec<ListItem> = history
        .entries()
        .iter()
        .map(|entry| history_item(entry, theme))
        .collect();
    let mut state = ListState::default();
    if focused && !history.is_empty() {
        state.select(Some(console.history_selected.min(history.len() - 1)));
    }
    let list = List::new(items)
        .highlight_symbol(">> ")
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .block(panel_block("History", focused, theme));
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_templates_panel(
    frame: &mut ratatui::Frame,
    session: &Session,
    console: &Console,
    theme: PulseTheme,
    area: Rect,
) {
    let templates = session.templates();
    let focused = console.focus == Focus::Templates;
    let items: Vec<ListItem> = templates
        .iter()
        .map(|template| {
            ListItem::new(Line::from(vec![
                Span::styled(template.name.clone(), Style::default().fg(theme.text)),
                Span::styled(
                    format!("  {}", ellipsize(&template.text, 32)),
                    Style::default().fg(theme.muted),
                ),
            ]))
        })
        .collect();
    let mut state = ListState::default();
    if focused && !templates.is_empty() {
        state.select(Some(console.template_selected.min(templates.len() - 1)));
    }
    let list = List::new(items)
        .highlight_symbol(">> ")
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .block(panel_block("Templates", focused, theme));
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_footer(session: &Session, console: &Console, theme: PulseTheme) -> Paragraph<'static> {
    let line = match &console.mode {
        Mode::Editing { prompt, buffer } => Line::from(vec![
            Span::styled(format!("{}: ", prompt.title()), theme.title_style()),
            Span::styled(format!("{buffer}_"), Style::default().fg(theme.text)),
        ]),
        Mode::Confirming(_) | Mode::Normal => match session.status_note.as_deref() {
            Some(note) => Line::from(Span::styled(
                note.to_string(),
                Style::default().fg(theme.status_note(note)),
            )),
            None => Line::from(Span::styled(
                "n new  Enter details  Tab focus  f filter  ? help  q quit",
                Style::default().fg(theme.muted),
            )),
        },
    };
    Paragraph::new(line)
        .style(Style::default().fg(theme.text).bg(theme.surface))
        .block(panel_block(console.focus.title(), false, theme))
}

fn render_drawer(frame: &mut ratatui::Frame, panel: &DrawerPanel, active_tab: usize, theme: PulseTheme) {
    let area = centered_rect(80, 75, frame.size());
    frame.render_widget(Clear, area);
    let block = panel_block(&format!("Query {}", panel.key), true, theme);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5),
            Constraint::Length(2),
            Constraint::Min(0),
        ])
        .split(inner);

    let mut summary = vec![
        Line::from(vec![
            Span::styled(
                format!("{} ", panel.badge.label),
                Style::default()
                    .fg(theme.tone(panel.badge.tone))
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(panel.title.clone(), Style::default().fg(theme.text)),
        ]),
    ];
    if let Some(rationale) = panel.rationale.as_deref() {
        summary.push(Line::from(Span::styled(
            format!("Routing: {rationale}"),
            Style::default().fg(theme.muted),
        )));
    }
    let mut meta = Vec::new();
    if let Some(classification) = panel.classification.as_deref() {
        meta.push(format!("class {classification}"));
    }
    if let Some(duration) = panel.duration.as_deref() {
        meta.push(format!("took {duration}"));
    }
    if !panel.tag_editor.is_empty() {
        meta.push(format!("tags {}", panel.tag_editor));
    }
    if !meta.is_empty() {
        summary.push(Line::from(Span::styled(
            meta.join("  "),
            Style::default().fg(theme.accent),
        )));
    }
    if let Some(error) = panel.error.as_deref() {
        summary.push(Line::from(Span::styled(
            error.to_string(),
            Style::default().fg(theme.critical),
        )));
    }
    frame.render_widget(
        Paragraph::new(Text::from(summary)).wrap(Wrap { trim: true }),
        sections[0],
    );

    if let Some(placeholder) = panel.placeholder {
        frame.render_widget(
            Paragraph::new(Span::styled(placeholder, Style::default().fg(theme.muted))),
            sections[2],
        );
        return;
    }
    let titles: Vec<Line> = panel
        .tabs
        .iter()
        .map(|tab| Line::from(format!("{} ({})", tab.source, tab.entries.len())))
        .collect();
    frame.render_widget(
        Tabs::new(titles)
            .select(active_tab)
            .style(Style::default().fg(theme.muted))
            .highlight_style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)),
        sections[1],
    );

    let mut lines = Vec::new();
    if let Some(tab) = panel.tabs.get(active_tab) {
        for entry in &tab.entries {
            lines.push(Line::from(Span::styled(
                entry.title.clone(),
                Style::default().fg(theme.text).add_modifier(Modifier::BOLD),
            )));
            if !entry.summary.is_empty() {
                lines.push(Line::from(Span::styled(
                    entry.summary.clone(),
                    Style::default().fg(theme.text),
                )));
            }
            for field in &entry.fields {
                lines.push(Line::from(vec![
                    Span::styled(format!("  {}: ", field.label), Style::default().fg(theme.muted)),
                    Span::styled(field.value.clone(), Style::default().fg(theme.text)),
                ]));
            }
            if let Some(link) = entry.link.as_deref() {
                lines.push(Line::from(Span::styled(
                    link.to_string(),
                    Style::default().fg(theme.info),
                )));
            }
            lines.push(Line::from(""));
        }
    }
    frame.render_widget(
        Paragraph::new(Text::from(lines)).wrap(Wrap { trim: false }),
        sections[2],
    );
}

fn render_help_overlay(frame: &mut ratatui::Frame, theme: PulseTheme) {
    let area = centered_rect(70, 70, frame.size());
    let section = |title: &'static str| {
        Line::from(Span::styled(
            title,
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD),
        ))
    };
    let lines = vec![
        section("Navigation"),
        Line::from("  Tab      cycle focus (queries/history/templates)"),
        Line::from("  j/k      move selection"),
        Line::from("  Enter    open details (templates: load)"),
        Line::from("  [ / ]    previous/next result source"),
        Line::from("  f        cycle status filter"),
        Line::from(""),
        section("Queries"),
        Line::from("  n        new query (Ctrl-S in prompt: save as template)"),
        Line::from("  r        re-run"),
        Line::from("  d        delete (confirm with y)"),
        Line::from("  t        edit tags"),
        Line::from("  e        open CSV export"),
        Line::from("  s        save query text as template"),
        Line::from(""),
        section("Templates"),
        Line::from("  l        load into prompt"),
        Line::from("  R        run now"),
        Line::from("  x        delete (confirm with y)"),
        Line::from(""),
        section("Session & Exit"),
        Line::from("  ? or F1  toggle this help"),
        Line::from("  Esc      close details/help"),
        Line::from("  q        quit"),
    ];
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .style(Style::default().fg(theme.text).bg(theme.surface))
            .block(panel_block("Help", false, theme))
            .wrap(Wrap { trim: false }),
        area,
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100u16.saturating_sub(percent_y)) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100u16.saturating_sub(percent_y)) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100u16.saturating_sub(percent_x)) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100u16.saturating_sub(percent_x)) / 2),
        ])
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::DEFAULT_POLL_INTERVAL;
    use crate::testing::FakeApi;
    use gridsite_core::hydrate::InitialPayload;
    use gridsite_core::{QueryId, QueryKey, QuerySnapshot, QueryStatus};
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    #[test]
    fn progress_bar_scales_to_width() {
        assert_eq!(progress_bar(0, 10), "░░░░░░░░░░");
        assert_eq!(progress_bar(40, 10), "████░░░░░░");
        assert_eq!(progress_bar(100, 4), "████");
    }

    #[test]
    fn centered_rect_stays_inside_area() {
        let area = Rect::new(0, 0, 100, 40);
        let inner = centered_rect(80, 50, area);
        assert!(inner.width <= 80 && inner.height <= 20);
        assert!(inner.x >= 10 && inner.y >= 10);
    }

    fn row_text(row: &TableRow) -> String {
        table_row_spans(row, false, pulse_theme(), 120)
            .iter()
            .map(|span| span.content.to_string())
            .collect()
    }

    #[test]
    fn pending_rows_render_as_locked_until_they_run() {
        use crate::views::{TableView, ViewBinder};
        use gridsite_core::Query;

        let mut table = TableView::default();
        let mut query = Query::new(
            QueryKey::Confirmed(QueryId::new("7")),
            "find trials for melanoma",
            "2024-05-01 10:00:00",
        );
        table.reconcile(&query);
        assert!(row_text(table.row(&query.key).expect("row")).contains("(locked)"));

        query.status = QueryStatus::Running;
        table.reconcile(&query);
        assert!(!row_text(table.row(&query.key).expect("row")).contains("(locked)"));
    }

    #[tokio::test]
    async fn dashboard_renders_rows_and_drawer() {
        let (tx, _rx) = mpsc::channel(4);
        let mut session = Session::new(Arc::new(FakeApi::default()), tx, DEFAULT_POLL_INTERVAL);
        let mut snapshot = QuerySnapshot::new(QueryId::new("3")).with_status(QueryStatus::Success);
        snapshot.text = Some("find trials for melanoma".to_string());
        snapshot.created_at = Some("2024-05-01 10:00:00".to_string());
        session.hydrate(InitialPayload {
            queries: vec![snapshot],
            templates: Vec::new(),
        });
        session.open_drawer(&QueryKey::Confirmed(QueryId::new("3")));
        let console = Console::new("true");

        let mut terminal = Terminal::new(TestBackend::new(120, 40)).expect("terminal");
        terminal
            .draw(|frame| render_ui(frame, &session, &console))
            .expect("draw");

        let buffer = terminal.backend().buffer();
        let rendered: String = buffer.content().iter().map(|cell| cell.symbol()).collect();
        assert!(rendered.contains("find trials for melanoma"));
        assert!(rendered.contains("Query 3"));
        assert!(rendered.contains("No data yet."));
    }
}
