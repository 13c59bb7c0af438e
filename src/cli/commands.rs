//! Command implementations

use std::collections::BTreeSet;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::adapters::{FfmpegAdapter, TomlConfigAdapter, VidpressConfig};
use crate::app::{expand_inputs, AppContainer, BatchSummary, QueueEvent, Scheduler};
use crate::cli::args::{CodecsArgs, CompressArgs, ConfigArgs};
use crate::cli::report::{ConsoleReporter, EventReporter, JsonReporter};
use crate::domain::model::{Codec, HardwareBackend};
use crate::error::VidpressError;

/// Exit status when the run was interrupted before every item finished
pub const EXIT_INTERRUPTED: u8 = 130;

/// What a `compress` run ended with
#[derive(Debug, Clone, Default)]
pub struct CompressReport {
    pub summary: BatchSummary,
    /// Inputs rejected before queueing
    pub skipped: usize,
}

impl CompressReport {
    pub fn exit_status(&self) -> u8 {
        if self.summary.failed > 0 || self.skipped > 0 {
            1
        } else if self.summary.cancelled > 0 || self.summary.pending > 0 {
            EXIT_INTERRUPTED
        } else {
            0
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.exit_status())
    }
}

/// Compress every input, printing events until the queue drains or Ctrl-C
pub async fn compress(args: CompressArgs, config: &VidpressConfig) -> Result<CompressReport> {
    info!(
        codec = %config.compression.codec,
        quality = config.compression.effective_quality(),
        encoder = config.compression.encoder(),
        jobs = config.scheduler.max_concurrent,
        "Starting compression"
    );

    let reporter: Arc<dyn EventReporter> = if args.json {
        Arc::new(JsonReporter)
    } else {
        Arc::new(ConsoleReporter::new())
    };

    let sources = expand_inputs(&args.inputs, args.recursive, &config.compression.output_suffix);
    if sources.is_empty() {
        return Err(VidpressError::NoInputs {
            inputs: args.inputs.join(", "),
        }
        .into());
    }

    let container = AppContainer::new(config).context("Failed to set up the compression engine")?;
    let scheduler = container.scheduler();
    let intake = container.intake();

    // Subscribe before queueing so the reporter sees every item
    let events = tokio::spawn(report_events(scheduler.subscribe(), Arc::clone(&reporter)));

    let mut skipped = 0;
    for source in sources {
        let label = source.to_string();
        match intake.build(source).await {
            Ok(file) => {
                scheduler.enqueue(file);
            }
            Err(err) => {
                warn!(input = %label, error = %err, "Input rejected");
                reporter.on_skipped(&label, &err);
                skipped += 1;
            }
        }
    }

    let interrupt = tokio::spawn(stop_on_interrupt(scheduler.clone()));
    let summary = scheduler.run().await;
    interrupt.abort();

    if events.await.is_err() {
        warn!("Event reporter stopped unexpectedly");
    }

    info!(
        completed = summary.completed,
        failed = summary.failed,
        cancelled = summary.cancelled,
        skipped,
        "Compression finished"
    );
    Ok(CompressReport { summary, skipped })
}

async fn report_events(
    mut events: tokio::sync::broadcast::Receiver<QueueEvent>,
    reporter: Arc<dyn EventReporter>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                reporter.on_event(&event);
                if matches!(event, QueueEvent::RunFinished { .. }) {
                    break;
                }
            }
            Err(RecvError::Lagged(missed)) => warn!(missed, "Reporter fell behind, events dropped"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// First Ctrl-C stops the queue; running files are cancelled
async fn stop_on_interrupt(scheduler: Scheduler) {
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("Interrupted, cancelling running compressions");
        scheduler.stop();
    }
}

#[derive(Debug, Serialize)]
struct EncoderInfo {
    name: &'static str,
    backend: Option<HardwareBackend>,
    /// `None` when FFmpeg could not be asked
    available: Option<bool>,
}

#[derive(Debug, Serialize)]
struct CodecInfo {
    codec: Codec,
    default_quality: u8,
    quality_min: u8,
    quality_max: u8,
    encoders: Vec<EncoderInfo>,
}

const BACKENDS: [HardwareBackend; 4] = [
    HardwareBackend::VideoToolbox,
    HardwareBackend::Nvenc,
    HardwareBackend::Qsv,
    HardwareBackend::Vaapi,
];

/// List codec families, quality ranges and encoders
pub async fn codecs(args: CodecsArgs, config: &VidpressConfig) -> Result<()> {
    let available = if args.offline {
        None
    } else {
        match FfmpegAdapter::locate(config.engine.ffmpeg_path.as_deref()) {
            Ok(engine) => match engine.available_encoders().await {
                Ok(encoders) => Some(encoders),
                Err(err) => {
                    warn!(error = %err, "Could not list FFmpeg encoders");
                    None
                }
            },
            Err(err) => {
                warn!(error = %err, "FFmpeg not found, encoder availability unknown");
                None
            }
        }
    };

    let table = codec_table(available.as_ref());
    if args.json {
        println!("{}", serde_json::to_string_pretty(&table).context("Failed to serialize codecs")?);
        return Ok(());
    }

    println!("Codecs");
    println!("======");
    for info in &table {
        println!(
            "{}: quality {}-{} (default {})",
            info.codec, info.quality_min, info.quality_max, info.default_quality
        );
        for encoder in &info.encoders {
            let mark = match encoder.available {
                Some(true) => "✓",
                Some(false) => "✗",
                None => "?",
            };
            let kind = match encoder.backend {
                Some(backend) => format!("{:?}", backend).to_lowercase(),
                None => "software".to_string(),
            };
            println!("  {} {:<20} {}", mark, encoder.name, kind);
        }
    }
    Ok(())
}

fn codec_table(available: Option<&BTreeSet<String>>) -> Vec<CodecInfo> {
    let is_available = |name: &str| available.map(|set| set.contains(name));
    Codec::ALL
        .iter()
        .map(|&codec| {
            let range = codec.recommended_quality_range();
            let mut encoders = vec![EncoderInfo {
                name: codec.software_encoder(),
                backend: None,
                available: is_available(codec.software_encoder()),
            }];
            encoders.extend(BACKENDS.iter().map(|&backend| {
                let name = codec.hardware_encoder(backend);
                EncoderInfo {
                    name,
                    backend: Some(backend),
                    available: is_available(name),
                }
            }));
            CodecInfo {
                codec,
                default_quality: codec.default_quality(),
                quality_min: *range.start(),
                quality_max: *range.end(),
                encoders,
            }
        })
        .collect()
}

/// Print the effective configuration
pub fn show_config(args: ConfigArgs, config: &VidpressConfig) -> Result<()> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(config).context("Failed to serialize config")?);
    } else {
        print!("{}", TomlConfigAdapter::to_toml(config)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_table_marks_availability() {
        let available: BTreeSet<String> = ["libx264", "h264_nvenc"].iter().map(|s| s.to_string()).collect();
        let table = codec_table(Some(&available));
        assert_eq!(table.len(), 2);

        let h264 = &table[0];
        assert_eq!(h264.codec, Codec::H264);
        assert_eq!((h264.quality_min, h264.quality_max, h264.default_quality), (18, 28, 23));
        assert_eq!(h264.encoders[0].available, Some(true));
        let nvenc = h264.encoders.iter().find(|e| e.name == "h264_nvenc").unwrap();
        assert_eq!(nvenc.available, Some(true));
        assert!(table[1].encoders.iter().all(|e| e.available == Some(false)));

        let offline = codec_table(None);
        assert!(offline[0].encoders.iter().all(|e| e.available.is_none()));
    }

    #[test]
    fn test_exit_codes() {
        let mut report = CompressReport::default();
        assert_eq!(report.exit_status(), 0);
        report.summary.cancelled = 1;
        assert_eq!(report.exit_status(), EXIT_INTERRUPTED);
        report.skipped = 1;
        assert_eq!(report.exit_status(), 1);
    }
}
