//! Progress extraction from the engine's machine-readable output

use std::sync::OnceLock;

use regex::Regex;

/// Position marker found on one output line
#[derive(Debug, Clone, Copy, PartialEq)]
enum Marker {
    /// Seconds of output written so far
    Position(f64),
    /// The engine reported the end of its run
    End,
}

/// Turns `-progress pipe:1` key/value lines (and classic `time=` stats lines)
/// into a fraction of the source duration.
///
/// Emitted values stay within `[0, 1]` and never decrease; lines that would
/// not advance the fraction produce nothing.
#[derive(Debug, Clone)]
pub struct ProgressParser {
    total_secs: f64,
    last: f64,
}

impl ProgressParser {
    pub fn new(total_secs: f64) -> Self {
        Self {
            total_secs,
            last: 0.0,
        }
    }

    /// Feed one line; returns the new fraction when it advanced
    pub fn feed(&mut self, line: &str) -> Option<f64> {
        let fraction = match Self::marker(line.trim())? {
            Marker::End => 1.0,
            Marker::Position(secs) => {
                if !(self.total_secs.is_finite() && self.total_secs > 0.0) {
                    return None;
                }
                (secs / self.total_secs).clamp(0.0, 1.0)
            }
        };

        if fraction > self.last {
            self.last = fraction;
            Some(fraction)
        } else {
            None
        }
    }

    /// Highest fraction emitted so far
    pub fn last(&self) -> f64 {
        self.last
    }

    fn marker(line: &str) -> Option<Marker> {
        if let Some((key, value)) = line.split_once('=') {
            match key.trim() {
                "progress" => {
                    return (value.trim() == "end").then_some(Marker::End);
                }
                // out_time_ms is microseconds as well, despite the name
                "out_time_us" | "out_time_ms" => {
                    let micros: i64 = value.trim().parse().ok()?;
                    return (micros >= 0).then(|| Marker::Position(micros as f64 / 1_000_000.0));
                }
                "out_time" => return parse_timestamp(value.trim()).map(Marker::Position),
                _ => {}
            }
        }

        stats_time_regex()?
            .captures(line)
            .and_then(|caps| caps.get(1))
            .and_then(|m| parse_timestamp(m.as_str()))
            .map(Marker::Position)
    }
}

fn stats_time_regex() -> Option<&'static Regex> {
    static TIME: OnceLock<Option<Regex>> = OnceLock::new();
    TIME.get_or_init(|| Regex::new(r"\btime=\s*(\d+:\d{2}:\d{2}(?:\.\d+)?)").ok())
        .as_ref()
}

/// Parse `HH:MM:SS[.fraction]` into seconds. Negative or malformed
/// timestamps (the engine prints `N/A` or `-00:00:00.02` early on) yield `None`.
pub fn parse_timestamp(value: &str) -> Option<f64> {
    let mut parts = value.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes >= 60 || !(0.0..60.0).contains(&seconds) {
        return None;
    }
    Some(hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds)
}
