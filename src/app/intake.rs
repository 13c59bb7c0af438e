// Intake - Turns user inputs into queue items

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::domain::errors::{CompressionError, ErrorKind};
use crate::domain::model::{SourceLocation, VideoFile};
use crate::ports::{FsPort, ProbePort};
use crate::utils::path::PathUtils;

/// Expand inputs into sources: URLs and files pass through, directories are
/// walked for video files (sorted, so batches run in a stable order), leaving
/// out earlier outputs named with `output_suffix`. Missing paths pass through
/// too and fail later with a proper error.
///
/// A source reached more than once, listed twice or also found through a
/// directory, is kept at its first position only.
pub fn expand_inputs(inputs: &[String], recursive: bool, output_suffix: &str) -> Vec<SourceLocation> {
    let mut sources = Vec::new();
    let mut seen = HashSet::new();
    let mut add = |source: SourceLocation| {
        if seen.insert(identity(&source)) {
            sources.push(source);
        } else {
            info!(input = %source, "Input listed twice, queued once");
        }
    };

    for input in inputs {
        let location = SourceLocation::parse(input);
        let dir = match location.local_path() {
            Some(path) if path.is_dir() => path.to_path_buf(),
            _ => {
                add(location);
                continue;
            }
        };

        let max_depth = if recursive { usize::MAX } else { 1 };
        let mut found: Vec<PathBuf> = WalkDir::new(&dir)
            .max_depth(max_depth)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!(error = %err, "Skipping unreadable directory entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && PathUtils::is_video_file(entry.path()))
            .filter(|entry| !is_own_output(entry.path(), output_suffix))
            .map(|entry| entry.into_path())
            .collect();
        found.sort();
        debug!(dir = %dir.display(), count = found.len(), "Expanded directory");
        found.into_iter().map(SourceLocation::Path).for_each(&mut add);
    }
    sources
}

/// Key under which two spellings of the same file compare equal
fn identity(source: &SourceLocation) -> SourceLocation {
    match source {
        SourceLocation::Path(path) => {
            SourceLocation::Path(std::fs::canonicalize(path).unwrap_or_else(|_| path.clone()))
        }
        SourceLocation::Url(_) => source.clone(),
    }
}

/// Builds [`VideoFile`]s, reading sizes from disk and durations from the probe
pub struct MediaIntake {
    fs: Arc<dyn FsPort>,
    probe: Option<Arc<dyn ProbePort>>,
}

impl MediaIntake {
    pub fn new(fs: Arc<dyn FsPort>, probe: Option<Arc<dyn ProbePort>>) -> Self {
        Self { fs, probe }
    }

    pub async fn build(&self, source: SourceLocation) -> Result<VideoFile, CompressionError> {
        let name = Self::display_name(&source);

        let probed = match &self.probe {
            Some(probe) => match probe.probe(&source).await {
                Ok(probed) => Some(probed),
                Err(err) if source.is_remote() => return Err(err),
                Err(err) => {
                    warn!(source = %source, error = %err, "Probe failed, progress will only be reported at the end");
                    None
                }
            },
            None => None,
        };

        let size = match source.local_path() {
            Some(path) => self.fs.get_file_size(path).await?,
            None => probed.and_then(|p| p.size).ok_or_else(|| {
                CompressionError::with_detail(
                    ErrorKind::InvalidInput,
                    format!("{}: remote size unknown", source),
                )
            })?,
        };
        let duration = probed.map(|p| p.duration_secs).unwrap_or(0.0);

        VideoFile::new(source, name, duration, size)
    }

    fn display_name(source: &SourceLocation) -> String {
        match source {
            SourceLocation::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string()),
            SourceLocation::Url(_) => source.stem(),
        }
    }
}

/// Whether the file name carries the output suffix of a previous run
pub fn is_own_output(path: &Path, suffix: &str) -> bool {
    !suffix.is_empty()
        && path
            .file_stem()
            .map(|stem| stem.to_string_lossy().ends_with(suffix))
            .unwrap_or(false)
}
