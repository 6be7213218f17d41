//! CLI end-to-end tests
//!
//! Tests for the bufstream sample driver.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the bufstream binary
#[allow(deprecated)]
fn bufstream_cmd() -> Command {
    Command::cargo_bin("bufstream").unwrap()
}

fn write_config(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("bufstream.toml");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = bufstream_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = bufstream_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("bufstream"))
        .stdout(predicate::str::contains("segment"))
        .stdout(predicate::str::contains("vxml"));
}

#[test]
fn test_cli_version_flag() {
    let mut cmd = bufstream_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("bufstream"));
}

#[test]
fn test_cli_codes_lists_families() {
    let mut cmd = bufstream_cmd();
    cmd.arg("codes")
        .assert()
        .success()
        .stdout(predicate::str::contains("FLUSH_BUFFER"))
        .stdout(predicate::str::contains("control"))
        .stdout(predicate::str::contains("codes"));
}

#[test]
fn test_cli_codes_json() {
    let output = bufstream_cmd().args(["codes", "--json"]).output().unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(json.as_array().unwrap().iter().any(|e| e["family"] == "metadata_store"));
}

#[test]
fn test_cli_copy() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.bin");
    let output = dir.path().join("out.bin");
    let data: Vec<u8> = (0..70_000u32).map(|i| (i % 253) as u8).collect();
    fs::write(&input, &data).unwrap();

    bufstream_cmd()
        .arg("copy")
        .arg(&input)
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Copied 70000 bytes"));

    assert_eq!(fs::read(&output).unwrap(), data);
}

#[test]
fn test_cli_copy_missing_input_fails() {
    let dir = tempdir().unwrap();
    bufstream_cmd()
        .arg("copy")
        .arg(dir.path().join("missing.bin"))
        .arg(dir.path().join("out.bin"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("does not exist"));

    assert!(!dir.path().join("out.bin").exists());
}

#[test]
fn test_cli_segment() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), "[segment]\nuri_prefix = \"http://cdn/\"\n");
    let input = dir.path().join("in.ts");
    fs::write(&input, vec![0x47u8; 5000]).unwrap();
    let output = dir.path().join("movie.ts");

    bufstream_cmd()
        .arg("-c")
        .arg(&config)
        .arg("segment")
        .arg(&input)
        .arg(&output)
        .args(["--segment-size", "2000", "--duration-secs", "6"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Segments: 3"));

    for n in 0..3 {
        assert!(dir.path().join(format!("movie_{n:03}.ts")).exists());
    }
    let list = fs::read_to_string(dir.path().join("movie_000.mzl")).unwrap();
    assert_eq!(list, "DZMP\nmovie_000.ts; 2000\nmovie_001.ts; 2000\nmovie_002.ts; 1000\n");
    let playlist = fs::read_to_string(dir.path().join("movie.m3u8")).unwrap();
    assert!(playlist.starts_with("#EXTM3U\n"));
    assert!(playlist.contains("http://cdn/movie_000.ts"));
    assert!(playlist.contains("#EXTINF:3,"));
    assert!(playlist.ends_with("#EXT-X-ENDLIST\n"));
}

#[test]
fn test_cli_wav() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.raw");
    let output = dir.path().join("out.wav");
    fs::write(&input, [0x12, 0x34, 0x56, 0x78]).unwrap();

    bufstream_cmd()
        .arg("wav")
        .arg(&input)
        .arg(&output)
        .args(["--format", "twos", "--bits", "16", "--channels", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 ch, 48000 Hz, 16 bit"));

    let wav = fs::read(&output).unwrap();
    assert_eq!(&wav[..4], b"RIFF");
    assert_eq!(&wav[44..], &[0x34, 0x12, 0x78, 0x56]);
}

#[test]
fn test_cli_wav_rejects_unknown_format() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.raw");
    fs::write(&input, [0u8; 4]).unwrap();

    bufstream_cmd()
        .arg("wav")
        .arg(&input)
        .arg(dir.path().join("out.wav"))
        .args(["--format", "aiff"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_cli_wav_rejects_unrepresentable_rate() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.raw");
    fs::write(&input, [0u8; 16]).unwrap();

    bufstream_cmd()
        .arg("wav")
        .arg(&input)
        .arg(dir.path().join("out.wav"))
        .args(["--format", "qt", "--bits", "32", "--channels", "2", "--rate", "1000000000"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("byte rate"));
}

#[test]
fn test_cli_unwav_reverses_wav() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.raw");
    let wav = dir.path().join("mid.wav");
    let output = dir.path().join("out.pcm");
    fs::write(&input, [0x12, 0x34, 0x56, 0x78]).unwrap();

    bufstream_cmd()
        .arg("wav")
        .arg(&input)
        .arg(&wav)
        .args(["--format", "twos"])
        .assert()
        .success();

    bufstream_cmd()
        .arg("unwav")
        .arg(&wav)
        .arg(&output)
        .args(["--framing", "hdmv"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 ch, 48000 Hz, 16 bit"))
        .stdout(predicate::str::contains("First unit: 964 bytes"));

    // tag, frame header, then one padded frame of 240 big-endian samples
    let pcm = fs::read(&output).unwrap();
    assert_eq!(pcm.len(), 8 + 4 + 960);
    assert_eq!(&pcm[..4], b"HDMV");
    assert_eq!(&pcm[12..16], &[0x12, 0x34, 0x56, 0x78]);
    assert!(pcm[16..].iter().all(|&b| b == 0));
}

#[test]
fn test_cli_unwav_rejects_unknown_framing() {
    let dir = tempdir().unwrap();
    bufstream_cmd()
        .arg("unwav")
        .arg(dir.path().join("in.wav"))
        .arg(dir.path().join("out.pcm"))
        .args(["--framing", "mp3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_cli_vxml() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.m2v");
    let output = dir.path().join("copy.m2v");
    let xml = dir.path().join("index.xml");

    let mut stream = vec![0, 0, 1, 0xB3, 0x2D, 0x01, 0xE0, 0x13];
    stream.extend([0, 0, 1, 0, 0x00, 0x08, 0xFF, 0xF8, 0, 0, 1, 0x01, 0xAA]);
    fs::write(&input, &stream).unwrap();

    bufstream_cmd()
        .arg("vxml")
        .arg(&input)
        .arg(&output)
        .arg("--xml")
        .arg(&xml)
        .arg("--hex")
        .assert()
        .success()
        .stdout(predicate::str::contains("Pictures: 1"));

    assert_eq!(fs::read(&output).unwrap(), stream);
    let text = fs::read_to_string(&xml).unwrap();
    assert!(text.starts_with("<Stream>\n"));
    assert!(text.contains("<UnitType>SEQ</UnitType>"));
    assert!(text.ends_with("</Stream>\n"));
}

#[test]
fn test_cli_validate_rejects_zero_chunk_size() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), "[channel]\nchunk_size = 0\n");

    bufstream_cmd()
        .arg("validate")
        .arg(&config)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("chunk size cannot be 0"));
}

#[test]
fn test_cli_validate_defaults() {
    bufstream_cmd()
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Chunk size: 65536"));
}
