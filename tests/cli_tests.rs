//! End-to-end tests for the vidpress binary that need no FFmpeg

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// The binary run from an empty directory with no user config in reach
fn vidpress(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("vidpress").unwrap();
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path())
        .env("APPDATA", home.path())
        .env_remove("RUST_LOG");
    for name in vidpress_cli::config_initialization::ENV_VARIABLES {
        cmd.env_remove(name);
    }
    cmd
}

#[test]
fn test_help_lists_commands() {
    let home = TempDir::new().unwrap();
    vidpress(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("compress"))
        .stdout(predicate::str::contains("codecs"));
}

#[test]
fn test_codecs_offline() {
    let home = TempDir::new().unwrap();
    vidpress(&home)
        .args(["codecs", "--offline"])
        .assert()
        .success()
        .stdout(predicate::str::contains("libx264"))
        .stdout(predicate::str::contains("hevc_videotoolbox"));
}

#[test]
fn test_codecs_json() {
    let home = TempDir::new().unwrap();
    let output = vidpress(&home)
        .args(["codecs", "--offline", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value[0]["codec"], "h264");
    assert_eq!(value[1]["default_quality"], 28);
}

#[test]
fn test_config_reflects_file_and_flags() {
    let home = TempDir::new().unwrap();
    std::fs::write(
        home.path().join("vidpress.toml"),
        "[compression]\ncodec = \"hevc\"\n\n[scheduler]\nmax_concurrent = 3\n",
    )
    .unwrap();

    vidpress(&home)
        .args(["config", "--log-level", "debug"])
        .assert()
        .success()
        .stdout(predicate::str::contains("codec = \"hevc\""))
        .stdout(predicate::str::contains("max_concurrent = 3"))
        .stdout(predicate::str::contains("level = \"debug\""));
}

#[test]
fn test_invalid_environment_value_fails() {
    let home = TempDir::new().unwrap();
    vidpress(&home)
        .env("VIDPRESS_CODEC", "vp9")
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("VIDPRESS_CODEC"));
}

#[test]
fn test_quality_out_of_range_is_rejected() {
    let home = TempDir::new().unwrap();
    vidpress(&home)
        .args(["compress", "a.mp4", "--quality", "99"])
        .assert()
        .code(2);
}

#[test]
fn test_directory_without_videos() {
    let home = TempDir::new().unwrap();
    let empty = home.path().join("empty");
    std::fs::create_dir(&empty).unwrap();

    vidpress(&home)
        .arg("compress")
        .arg(&empty)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No video files found"));
}
