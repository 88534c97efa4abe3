//! Shimmer animation for the loading indicator
//!
//! A highlight band sweeps across the active phase text while the answer is
//! being prepared.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use ratatui::style::{Modifier, Style};
use ratatui::text::Span;

static PROCESS_START: OnceLock<Instant> = OnceLock::new();

const PADDING: usize = 10;
const SWEEP_SECONDS: f32 = 2.0;
const BAND_HALF_WIDTH: f32 = 5.0;

fn elapsed_since_start() -> Duration {
    let start = PROCESS_START.get_or_init(Instant::now);
    start.elapsed()
}

/// Shimmer-animated spans for `text` at the current instant
pub fn shimmer_spans(text: &str, base: Style) -> Vec<Span<'static>> {
    shimmer_spans_at(text, base, elapsed_since_start())
}

/// Shimmer-animated spans for `text` as they look `elapsed` into the sweep
pub fn shimmer_spans_at(text: &str, base: Style, elapsed: Duration) -> Vec<Span<'static>> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let period = chars.len() + PADDING * 2;
    let progress = (elapsed.as_secs_f32() % SWEEP_SECONDS) / SWEEP_SECONDS;
    let band_center = (progress * period as f32) as isize;

    chars
        .iter()
        .enumerate()
        .map(|(i, ch)| {
            let dist = ((i + PADDING) as isize - band_center).abs() as f32;
            let intensity = if dist <= BAND_HALF_WIDTH {
                let x = std::f32::consts::PI * (dist / BAND_HALF_WIDTH);
                0.5 * (1.0 + x.cos())
            } else {
                0.0
            };
            Span::styled(ch.to_string(), style_for_intensity(base, intensity))
        })
        .collect()
}

fn style_for_intensity(base: Style, intensity: f32) -> Style {
    if intensity < 0.2 {
        base.add_modifier(Modifier::DIM)
    } else if intensity < 0.6 {
        base
    } else {
        base.add_modifier(Modifier::BOLD)
    }
}

/// Braille spinner for the status line
pub struct AnimatedDots {
    frame: usize,
}

impl AnimatedDots {
    const FRAMES: &'static [&'static str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

    pub fn new(frame: usize) -> Self {
        Self { frame }
    }

    pub fn current(&self) -> &'static str {
        Self::FRAMES[self.frame % Self::FRAMES.len()]
    }
}
