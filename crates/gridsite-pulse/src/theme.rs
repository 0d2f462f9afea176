use crate::health::Indicator;
use crate::views::BadgeTone;
use ratatui::style::{Color, Modifier, Style};

#[derive(Clone, Copy)]
pub struct PulseTheme {
    pub bg: Color,
    pub surface: Color,
    pub border: Color,
    pub title: Color,
    pub text: Color,
    pub muted: Color,
    pub accent: Color,
    pub ok: Color,
    pub warn: Color,
    pub critical: Color,
    pub info: Color,
}

pub fn pulse_theme() -> PulseTheme {
    PulseTheme {
        bg: Color::Rgb(11, 18, 32),
        surface: Color::Rgb(17, 26, 46),
        border: Color::Rgb(71, 85, 105),
        title: Color::Rgb(191, 219, 254),
        text: Color::Rgb(226, 232, 240),
        muted: Color::Rgb(148, 163, 184),
        accent: Color::Rgb(56, 189, 248),
        ok: Color::Rgb(34, 197, 94),
        warn: Color::Rgb(245, 158, 11),
        critical: Color::Rgb(239, 68, 68),
        info: Color::Rgb(59, 130, 246),
    }
}

impl PulseTheme {
    pub fn title_style(&self) -> Style {
        Style::default()
            .fg(self.title)
            .add_modifier(Modifier::BOLD)
    }

    pub fn tone(&self, tone: BadgeTone) -> Color {
        match tone {
            BadgeTone::Muted => self.muted,
            BadgeTone::Info => self.info,
            BadgeTone::Ok => self.ok,
            BadgeTone::Critical => self.critical,
        }
    }

    pub fn indicator(&self, indicator: Indicator) -> Color {
        match indicator {
            Indicator::Healthy => self.ok,
            Indicator::Unhealthy => self.critical,
            Indicator::Unknown => self.muted,
        }
    }

    pub fn status_note(&self, note: &str) -> Color {
        let normalized = note.to_ascii_lowercase();
        if normalized.contains("failed")
            || normalized.contains("error")
            || normalized.contains("problem")
            || normalized.contains("not available")
        {
            return self.critical;
        }
        if normalized.contains("completed") || normalized.contains("saved") {
            return self.ok;
        }
        if normalized.contains("?") {
            return self.warn;
        }
        self.info
    }
}
