//! Queue event reporting for the terminal

use std::collections::HashMap;
use std::sync::Mutex;

use crate::app::{BatchSummary, QueueEvent};
use crate::domain::errors::CompressionError;
use crate::domain::model::{CompressionStatus, VideoFile, VideoFileId};
use crate::utils::Utils;

/// Receives queue events and per-input problems found before queueing
pub trait EventReporter: Send + Sync {
    fn on_event(&self, event: &QueueEvent);

    /// An input that could not be turned into a queue item
    fn on_skipped(&self, input: &str, error: &CompressionError);
}

/// Human-readable output, one line per status change and every 10% of progress
pub struct ConsoleReporter {
    names: Mutex<HashMap<VideoFileId, (String, u8)>>,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self {
            names: Mutex::new(HashMap::new()),
        }
    }

    fn remember(&self, file: &VideoFile) {
        if let Ok(mut names) = self.names.lock() {
            names
                .entry(file.id())
                .or_insert_with(|| (file.name().to_string(), 0))
                .1 = 0;
        }
    }

    /// Name of the item and whether `progress` crossed a new 10% step
    fn step(&self, id: VideoFileId, progress: f64) -> Option<(String, u8)> {
        let mut names = self.names.lock().ok()?;
        let (name, last) = names.get_mut(&id)?;
        let bucket = (progress * 10.0).floor().clamp(0.0, 10.0) as u8;
        if bucket <= *last {
            return None;
        }
        *last = bucket;
        Some((name.clone(), bucket))
    }

    fn status_line(file: &VideoFile) -> Option<String> {
        let line = match file.status() {
            CompressionStatus::Pending if file.attempts() == 0 => format!(
                "📥 Queued: {} ({}, {})",
                file.name(),
                file.formatted_original_size(),
                file.formatted_duration()
            ),
            CompressionStatus::Pending => return None,
            CompressionStatus::Compressing => format!("🚀 Compressing: {}", file.name()),
            CompressionStatus::Completed => {
                let mut line = format!(
                    "✅ Completed: {} {} -> {}",
                    file.name(),
                    file.formatted_original_size(),
                    file.formatted_compressed_size().unwrap_or_default()
                );
                if let Some(ratio) = file.compression_ratio() {
                    line.push_str(&format!(" ({:.1}% smaller)", ratio));
                }
                if file.is_larger_than_original() {
                    line.push_str(" ⚠️  output is larger than the original");
                }
                line
            }
            CompressionStatus::Failed(err) => {
                let mut line = format!("❌ Failed: {}: {}", file.name(), err);
                if let Some(hint) = err.recovery_hint() {
                    line.push_str(&format!("\n   Hint: {}", hint));
                }
                line
            }
            CompressionStatus::Cancelled => format!("⚠️  Cancelled: {}", file.name()),
        };
        Some(line)
    }

    pub fn summary_lines(summary: &BatchSummary) -> Vec<String> {
        let mut lines = vec![
            String::new(),
            "Summary".to_string(),
            "=======".to_string(),
            format!(
                "Files: {} completed, {} failed, {} cancelled, {} not started (of {})",
                summary.completed, summary.failed, summary.cancelled, summary.pending, summary.total
            ),
        ];
        if summary.completed > 0 {
            lines.push(format!(
                "Size: {} -> {} (saved {})",
                Utils::format_file_size(summary.original_bytes),
                Utils::format_file_size(summary.compressed_bytes),
                Utils::format_size_delta(summary.bytes_saved)
            ));
        }
        if let Some(ratio) = summary.compression_ratio() {
            lines.push(format!("Reduction: {:.1}%", ratio));
        }
        lines
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventReporter for ConsoleReporter {
    fn on_event(&self, event: &QueueEvent) {
        match event {
            QueueEvent::StatusChanged { file } => {
                self.remember(file);
                if let Some(line) = Self::status_line(file) {
                    println!("{}", line);
                }
            }
            QueueEvent::Progress { id, progress } => {
                if let Some((name, bucket)) = self.step(*id, *progress) {
                    if bucket < 10 {
                        println!("🔄 {} {:>3}%", name, u32::from(bucket) * 10);
                    }
                }
            }
            QueueEvent::RetryScheduled { attempts, error, .. } => {
                println!("🔁 Retrying after attempt {}: {}", attempts, error);
            }
            QueueEvent::Removed { .. } => {}
            QueueEvent::RunFinished { summary } => {
                for line in Self::summary_lines(summary) {
                    println!("{}", line);
                }
            }
        }
    }

    fn on_skipped(&self, input: &str, error: &CompressionError) {
        println!("⏭️  Skipped: {}: {}", input, error);
    }
}

/// One JSON object per line, each stamped with an RFC 3339 timestamp
pub struct JsonReporter;

impl JsonReporter {
    pub fn render(event: &QueueEvent) -> serde_json::Value {
        let mut value = serde_json::to_value(event).unwrap_or_else(|err| {
            serde_json::json!({ "event": "error", "error": err.to_string() })
        });
        if let Some(object) = value.as_object_mut() {
            object.insert(
                "timestamp".to_string(),
                serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }
        value
    }
}

impl EventReporter for JsonReporter {
    fn on_event(&self, event: &QueueEvent) {
        println!("{}", Self::render(event));
    }

    fn on_skipped(&self, input: &str, error: &CompressionError) {
        let event = serde_json::json!({
            "event": "skipped",
            "input": input,
            "error": error,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        println!("{}", event);
    }
}
