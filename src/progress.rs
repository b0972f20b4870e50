use std::io::{self, Write};
use std::sync::Mutex;
use std::time::Duration;

use crossterm::QueueableCommand;
use crossterm::cursor::MoveToColumn;
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};
use tracing::debug;

use crate::app::{ProgressEvent, ProgressSink};

const BAR_WIDTH: usize = 24;

/// Single self-rewriting status line on stderr.
pub struct TerminalProgress {
    out: Mutex<io::Stderr>,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self {
            out: Mutex::new(io::stderr()),
        }
    }

    fn draw(&self, line: &str) -> io::Result<()> {
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        out.queue(MoveToColumn(0))?
            .queue(Clear(ClearType::CurrentLine))?
            .queue(Print(line))?;
        out.flush()
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for TerminalProgress {
    fn event(&self, event: ProgressEvent) {
        let _ = self.draw(&render_line(&event));
    }

    fn finish(&self) {
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let _ = out.write_all(b"\n").and_then(|_| out.flush());
    }
}

/// One plain line per task, for non-interactive runs. Written directly so
/// progress shows regardless of the log filter.
pub struct LineProgress<W: Write> {
    out: Mutex<W>,
}

impl<W: Write> LineProgress<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W: Write> ProgressSink for LineProgress<W> {
    fn event(&self, event: ProgressEvent) {
        debug!(position = event.position, total = event.total, "{}", event.message);
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let _ = writeln!(out, "[{}/{}] {}", event.position, event.total, event.message);
    }
}

pub fn render_line(event: &ProgressEvent) -> String {
    let percent = if event.total == 0 {
        100
    } else {
        (event.position * 100) / event.total
    };
    format!(
        "{}: {:>3}% {} {}/{} [{}]",
        event.message,
        percent,
        progress_bar(percent),
        event.position,
        event.total,
        format_elapsed(event.elapsed.unwrap_or_default())
    )
}

fn progress_bar(percent: usize) -> String {
    let filled = (percent.min(100) * BAR_WIDTH) / 100;
    format!("|{}{}|", "#".repeat(filled), " ".repeat(BAR_WIDTH - filled))
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_line_shows_position_and_bar() {
        let line = render_line(&ProgressEvent {
            position: 2,
            total: 4,
            message: "Run 10, B".to_string(),
            elapsed: Some(Duration::from_secs(75)),
        });
        assert_eq!(line, "Run 10, B:  50% |############            | 2/4 [01:15]");
    }

    #[test]
    fn line_progress_writes_one_line_per_task() {
        let sink = LineProgress::new(Vec::new());
        for position in 1..=2 {
            sink.event(ProgressEvent {
                position,
                total: 2,
                message: format!("Run {}, GEM", 9 + position),
                elapsed: None,
            });
        }
        sink.finish();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(text, "[1/2] Run 10, GEM\n[2/2] Run 11, GEM\n");
    }
}
