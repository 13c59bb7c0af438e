//! Path helpers for locating inputs and naming outputs

use std::path::{Path, PathBuf};

use crate::domain::model::{CompressionConfig, SourceLocation};

/// Extensions treated as video when expanding directories
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "mov", "mkv", "avi", "webm", "wmv", "flv", "mts", "m2ts", "ts", "mpg", "mpeg",
    "3gp",
];

/// Container every compressed output is written to
pub const OUTPUT_EXTENSION: &str = "mp4";

pub struct PathUtils;

impl PathUtils {
    /// Check whether the path has a known video extension
    pub fn is_video_file(path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .map(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false)
    }

    /// Directory the output lands in: the configured one, else beside a
    /// local source, else the working directory
    pub fn output_dir(source: &SourceLocation, config: &CompressionConfig) -> PathBuf {
        if let Some(dir) = &config.output_dir {
            return dir.clone();
        }
        source
            .local_path()
            .and_then(Path::parent)
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// `<output dir>/<stem><suffix>.mp4`
    pub fn output_path(source: &SourceLocation, config: &CompressionConfig) -> PathBuf {
        Self::numbered_output_path(source, config, 0)
    }

    /// Output path with `-<n>` appended to the name; `n == 0` is the plain name
    pub fn numbered_output_path(source: &SourceLocation, config: &CompressionConfig, n: usize) -> PathBuf {
        let mut file_name = format!("{}{}", source.stem(), config.output_suffix);
        if n > 0 {
            file_name.push_str(&format!("-{}", n));
        }
        file_name.push('.');
        file_name.push_str(OUTPUT_EXTENSION);
        Self::output_dir(source, config).join(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_video_file() {
        assert!(PathUtils::is_video_file(Path::new("a/b/clip.MOV")));
        assert!(PathUtils::is_video_file(Path::new("clip.mkv")));
        assert!(!PathUtils::is_video_file(Path::new("notes.txt")));
        assert!(!PathUtils::is_video_file(Path::new("README")));
    }

    #[test]
    fn test_output_path_beside_source() {
        let source = SourceLocation::parse("/videos/trip.mov");
        let path = PathUtils::output_path(&source, &CompressionConfig::default());
        assert_eq!(path, PathBuf::from("/videos/trip_compressed.mp4"));
    }

    #[test]
    fn test_output_path_in_configured_dir() {
        let source = SourceLocation::parse("https://example.com/media/talk.webm");
        let config = CompressionConfig {
            output_dir: Some(PathBuf::from("/out")),
            output_suffix: "-small".to_string(),
            ..CompressionConfig::default()
        };
        assert_eq!(
            PathUtils::output_path(&source, &config),
            PathBuf::from("/out/talk-small.mp4")
        );
    }

    #[test]
    fn test_numbered_output_path() {
        let source = SourceLocation::parse("/videos/trip.mov");
        let config = CompressionConfig::default();
        assert_eq!(
            PathUtils::numbered_output_path(&source, &config, 0),
            PathUtils::output_path(&source, &config)
        );
        assert_eq!(
            PathUtils::numbered_output_path(&source, &config, 2),
            PathBuf::from("/videos/trip_compressed-2.mp4")
        );
    }

    #[test]
    fn test_relative_source_without_parent() {
        let source = SourceLocation::parse("clip.mp4");
        assert_eq!(
            PathUtils::output_path(&source, &CompressionConfig::default()),
            PathBuf::from("./clip_compressed.mp4")
        );
    }
}
