use anyhow::{anyhow, Context, Result};
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

use crate::ReelError;

/// Playback rate that spreads `frame_count` frames over `duration_secs`
/// seconds: `round(frames / seconds)`, half away from zero, floored at 1 so
/// a short game over a long duration still yields a rate the encoder
/// accepts. Zero frames is degenerate input and is rejected here, before the
/// encoder could ever see a zero rate.
pub fn playback_rate(frame_count: usize, duration_secs: f64) -> Result<u32, ReelError> {
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return Err(ReelError::InvalidDuration(duration_secs));
    }
    if frame_count == 0 {
        return Err(ReelError::EmptyGame);
    }
    let rate = (frame_count as f64 / duration_secs).round();
    Ok((rate as u32).max(1))
}

#[derive(Debug, Clone)]
pub struct EncodeSettings {
    pub frames_dir: PathBuf,
    pub out_path: PathBuf,
    pub fps: u32,
}

impl EncodeSettings {
    pub fn validate(&self) -> Result<()> {
        if self.fps == 0 {
            return Err(ReelError::Encode("frame rate must be non-zero".to_string()).into());
        }
        Ok(())
    }
}

/// Signals emitted by the encoding task. `Finished` and `Failed` are
/// mutually exclusive terminals; the channel closes after either.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeEvent {
    Started { command: String },
    /// Cumulative frames consumed so far, from ffmpeg's progress stream.
    Progress { frames_done: u64 },
    Finished,
    Failed { message: String },
}

/// A running encode: an event stream to observe and a handle to collect the
/// terminal result. There is no cancellation; the job runs to completion or
/// failure.
pub struct EncodeJob {
    events: Receiver<EncodeEvent>,
    handle: JoinHandle<Result<()>>,
}

impl EncodeJob {
    pub fn events(&self) -> &Receiver<EncodeEvent> {
        &self.events
    }

    /// Block until the encoder exits and surface its terminal result.
    pub fn wait(self) -> Result<()> {
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => Err(anyhow!("encoder task panicked")),
        }
    }
}

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// The full ffmpeg argument vector. The input is the numeric frame template,
/// so ffmpeg reads the set in index order no matter how the filesystem would
/// list it; `-y` implements the overwrite policy.
fn build_ffmpeg_args(settings: &EncodeSettings) -> Vec<String> {
    let template = settings.frames_dir.join("frame_%d.png");
    vec![
        "-loglevel".into(),
        "error".into(),
        "-nostats".into(),
        "-progress".into(),
        "pipe:1".into(),
        "-y".into(),
        "-framerate".into(),
        settings.fps.to_string(),
        "-start_number".into(),
        "0".into(),
        "-i".into(),
        template.to_string_lossy().into_owned(),
        "-an".into(),
        "-c:v".into(),
        "libx264".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-movflags".into(),
        "+faststart".into(),
        settings.out_path.to_string_lossy().into_owned(),
    ]
}

/// Cumulative frame count from one line of `-progress pipe:1` output.
fn parse_progress_frames(line: &str) -> Option<u64> {
    line.trim().strip_prefix("frame=")?.trim().parse().ok()
}

/// Spawn the system ffmpeg over the frame set and return the running job.
/// Progress is read from ffmpeg's machine-readable progress stream on a
/// dedicated thread; stderr is collected separately and ends up in the
/// failure diagnostic when the encoder exits non-zero.
pub fn start_encode(settings: &EncodeSettings) -> Result<EncodeJob> {
    settings.validate()?;

    let args = build_ffmpeg_args(settings);
    let command_line = format!("ffmpeg {}", args.join(" "));

    let mut child = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| anyhow!("failed to spawn ffmpeg (is it installed and on PATH?): {e}"))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("failed to open ffmpeg stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("failed to open ffmpeg stderr"))?;

    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || -> Result<()> {
        let _ = tx.send(EncodeEvent::Started {
            command: command_line,
        });

        // Drain stderr on its own thread so neither pipe can fill and stall
        // the child.
        let stderr_reader = thread::spawn(move || {
            let mut buf = String::new();
            let _ = BufReader::new(stderr).read_to_string(&mut buf);
            buf
        });

        for line in BufReader::new(stdout).lines() {
            let Ok(line) = line else { break };
            if let Some(frames_done) = parse_progress_frames(&line) {
                let _ = tx.send(EncodeEvent::Progress { frames_done });
            }
        }

        let status = child.wait().context("waiting for ffmpeg to finish")?;
        let stderr_text = stderr_reader.join().unwrap_or_default();

        if status.success() {
            let _ = tx.send(EncodeEvent::Finished);
            Ok(())
        } else {
            let message = if stderr_text.trim().is_empty() {
                format!("ffmpeg exited with status {status}")
            } else {
                format!("ffmpeg exited with status {status}: {}", stderr_text.trim())
            };
            let _ = tx.send(EncodeEvent::Failed {
                message: message.clone(),
            });
            Err(ReelError::Encode(message).into())
        }
    });

    Ok(EncodeJob { events: rx, handle })
}
