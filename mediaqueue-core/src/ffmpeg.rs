//! FFmpeg Runner (spec §4.6): spawns the resolved command segments as
//! child processes, parses stderr progress lines, and reports progress
//! back to the caller while honoring cancellation.

use std::process::Stdio;
use std::time::Duration as StdDuration;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, Result};
use crate::shellwords;

static DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Duration:\s*(\d+):(\d+):(\d+(?:\.\d+)?)").unwrap());
static KV_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w+)=([\w:./]+)").unwrap());
static TIME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+):(\d+):(\d+(?:\.\d+)?)$").unwrap());

/// Progress observed from one stderr line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// 0.0-100.0
    pub progress: f64,
    /// Seconds, or -1.0 if the encode speed couldn't be parsed.
    pub remaining: f64,
}

/// Looks up the configured ffmpeg binary on `PATH`, retrying every 10s
/// until found or `cancel` fires. Gates scheduler startup per §4.6.
pub async fn discover_binary(binary_name: &str, cancel: &CancellationToken) -> Result<String> {
    loop {
        if let Some(path) = which(binary_name) {
            return Ok(path);
        }
        tracing::warn!(binary = binary_name, "ffmpeg binary not found, retrying");
        tokio::select! {
            _ = tokio::time::sleep(StdDuration::from_secs(10)) => {}
            _ = cancel.cancelled() => {
                return Err(CoreError::Cancelled("binary discovery cancelled".to_string()));
            }
        }
    }
}

fn which(binary_name: &str) -> Option<String> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(binary_name);
        if candidate.is_file() {
            return Some(candidate.to_string_lossy().into_owned());
        }
    }
    None
}

/// Runs every `&&`-separated segment of `command_string` sequentially,
/// invoking `on_progress` as stderr progress lines are parsed. The first
/// segment is run with `ffmpeg_path` as argv[0]; later segments keep
/// their own literal program name (chained external tools).
pub async fn run(
    ffmpeg_path: &str,
    command_string: &str,
    cancel: &CancellationToken,
    mut on_progress: impl FnMut(Progress),
) -> Result<()> {
    let segments = shellwords::split_segments(command_string);
    if segments.is_empty() {
        return Err(CoreError::ValidationFailed("empty command".to_string()));
    }

    for (index, segment) in segments.iter().enumerate() {
        let mut words = shellwords::split(segment)?;
        if words.is_empty() {
            return Err(CoreError::ValidationFailed(
                "empty command segment".to_string(),
            ));
        }
        if index == 0 {
            words.insert(0, ffmpeg_path.to_string());
        }
        if !segment.contains("-stats_period") {
            words.push("-stats_period".to_string());
            words.push("1".to_string());
        }
        words.push("-progress".to_string());
        words.push("pipe:2".to_string());

        run_segment(&words, cancel, &mut on_progress).await?;
    }

    Ok(())
}

async fn run_segment(
    argv: &[String],
    cancel: &CancellationToken,
    on_progress: &mut impl FnMut(Progress),
) -> Result<()> {
    let mut child = Command::new(&argv[0])
        .args(&argv[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| CoreError::SubprocessFailure(format!("failed to spawn ffmpeg: {e}")))?;

    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| CoreError::SubprocessFailure("no stderr pipe".to_string()))?;
    let mut lines = BufReader::new(stderr).lines();

    let mut duration_seconds: Option<f64> = None;
    let mut captured = String::new();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        captured.push_str(&line);
                        captured.push('\n');
                        if let Some(caps) = DURATION_RE.captures(&line) {
                            duration_seconds = Some(hms_to_seconds(&caps[1], &caps[2], &caps[3]));
                        }
                        if line.contains("frame=") {
                            if let Some(p) = parse_progress_line(&line, duration_seconds) {
                                on_progress(p);
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        return Err(CoreError::SubprocessFailure(format!("stderr read failed: {e}")));
                    }
                }
            }
            _ = cancel.cancelled() => {
                kill_child(&mut child).await;
                return Err(CoreError::Cancelled("task cancelled".to_string()));
            }
        }
    }

    let status = child
        .wait()
        .await
        .map_err(|e| CoreError::SubprocessFailure(format!("failed to wait on ffmpeg: {e}")))?;

    if !status.success() {
        return Err(CoreError::SubprocessFailure(captured));
    }
    Ok(())
}

#[cfg(unix)]
async fn kill_child(child: &mut tokio::process::Child) {
    if let Some(pid) = child.id() {
        let pid = nix::unistd::Pid::from_raw(pid as i32);
        let _ = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM);
    }
    let _ = child.wait().await;
}

#[cfg(not(unix))]
async fn kill_child(child: &mut tokio::process::Child) {
    let _ = child.kill().await;
}

fn hms_to_seconds(h: &str, m: &str, s: &str) -> f64 {
    let h: f64 = h.parse().unwrap_or(0.0);
    let m: f64 = m.parse().unwrap_or(0.0);
    let s: f64 = s.parse().unwrap_or(0.0);
    h * 3600.0 + m * 60.0 + s
}

fn parse_progress_line(line: &str, duration_seconds: Option<f64>) -> Option<Progress> {
    let duration = duration_seconds?;
    let mut time_seconds: Option<f64> = None;
    let mut speed: Option<f64> = None;

    for caps in KV_RE.captures_iter(line) {
        let key = &caps[1];
        let value = &caps[2];
        match key {
            "time" => {
                if let Some(t) = TIME_RE.captures(value) {
                    time_seconds = Some(hms_to_seconds(&t[1], &t[2], &t[3]));
                }
            }
            "speed" => {
                speed = value.trim_end_matches('x').parse::<f64>().ok();
            }
            _ => {}
        }
    }

    let time = time_seconds?;
    let progress = if duration > 0.0 {
        (time / duration * 100.0).min(100.0)
    } else {
        0.0
    };
    let progress = (progress * 100.0).round() / 100.0;

    let remaining = match speed {
        Some(speed) if speed > 0.0 => ((duration - time) / speed).round(),
        _ => -1.0,
    };

    Some(Progress {
        progress,
        remaining,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_duration_line() {
        let caps = DURATION_RE
            .captures("Duration: 00:02:30.50, start: 0.000000, bitrate: 1000 kb/s")
            .unwrap();
        assert_eq!(hms_to_seconds(&caps[1], &caps[2], &caps[3]), 150.5);
    }

    #[test]
    fn computes_progress_and_remaining() {
        let line = "frame=  100 fps= 25 q=-1.0 size=    512kB time=00:01:00.00 bitrate= 100.0kbits/s speed=2.0x";
        let p = parse_progress_line(line, Some(150.0)).unwrap();
        assert_eq!(p.progress, 40.0);
        assert_eq!(p.remaining, 45.0);
    }

    #[test]
    fn unparseable_speed_yields_negative_remaining() {
        let line = "frame=  100 fps= 25 time=00:01:00.00 speed=N/A";
        let p = parse_progress_line(line, Some(150.0)).unwrap();
        assert_eq!(p.remaining, -1.0);
    }

    #[test]
    fn no_duration_yet_yields_no_progress() {
        let line = "frame=  100 fps= 25 time=00:01:00.00 speed=2.0x";
        assert!(parse_progress_line(line, None).is_none());
    }
}
