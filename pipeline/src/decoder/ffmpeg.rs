use std::io::{self, BufReader, Read};
use std::path::Path;
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

use emotion_timeline_common::frame::Frame;
use image::RgbImage;
use tracing::{debug, info, warn};

use super::probe::{probe_video, VideoInfo};
use super::FrameSource;
use crate::error::DecodeError;

/// At most this much of ffmpeg's stderr is kept for error reports; the rest
/// is read and discarded.
const STDERR_CAPTURE_LIMIT: u64 = 16 * 1024;

/// Video decoder backed by an ffmpeg subprocess writing raw RGB24 frames to a
/// pipe.
///
/// Frames are read one at a time; nothing beyond the frame being returned is
/// held in memory. stderr is drained on a separate thread for the whole run,
/// so a chatty ffmpeg never stalls on a full pipe. The subprocess is killed
/// and reaped when the decoder is dropped, whether or not the stream was read
/// to the end.
pub struct FfmpegDecoder {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
    info: VideoInfo,
    frame_len: usize,
    seconds_per_frame: Option<f64>,
    next_index: u64,
    finished: bool,
}

fn ffmpeg_command(input: &Path) -> Command {
    let mut command = Command::new("ffmpeg");
    command
        .args(["-nostdin", "-v", "error", "-noautorotate", "-i"])
        .arg(input)
        .args([
            "-map", "0:v:0",
            "-f", "rawvideo",
            "-pix_fmt", "rgb24",
            "pipe:1",
        ]);
    command
}

/// Seconds between consecutive frames: `1 / fps`, else `duration /
/// frame_count`, else unknown.
///
/// Timestamps are derived from the frame index, not read from each frame's
/// PTS, so on variable-frame-rate input they follow the average rate.
fn frame_period(info: &VideoInfo) -> Option<f64> {
    match (info.fps, info.frame_count, info.duration) {
        (Some(fps), _, _) if fps.is_finite() && fps > 0.0 => Some(1.0 / fps),
        (_, Some(count), Some(duration)) if count > 0 && duration.is_finite() => {
            Some(duration / count as f64)
        }
        _ => None,
    }
}

fn drain_stderr(mut pipe: ChildStderr) -> String {
    let mut head = Vec::new();
    let _ = (&mut pipe).take(STDERR_CAPTURE_LIMIT).read_to_end(&mut head);
    let _ = io::copy(&mut pipe, &mut io::sink());
    String::from_utf8_lossy(&head).into_owned()
}

fn abandon(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

impl FfmpegDecoder {
    pub fn open(path: &Path) -> Result<Self, DecodeError> {
        let info = probe_video(path)?;
        let decoder = Self::spawn(ffmpeg_command(path), info)?;
        info!(
            path = %path.display(),
            width = decoder.info.width,
            height = decoder.info.height,
            fps = ?decoder.info.fps,
            frames = ?decoder.info.frame_count,
            codec = decoder.info.codec,
            "ffmpeg decoder started"
        );
        Ok(decoder)
    }

    /// Start `command` and read frames of the size described by `info` from
    /// its stdout.
    fn spawn(mut command: Command, info: VideoInfo) -> Result<Self, DecodeError> {
        let frame_len = (info.width as usize)
            .checked_mul(info.height as usize)
            .and_then(|n| n.checked_mul(3))
            .filter(|n| *n > 0)
            .ok_or(DecodeError::FrameSize {
                width: info.width,
                height: info.height,
            })?;

        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DecodeError::Spawn("ffmpeg", e))?;

        let Some(stdout) = child.stdout.take() else {
            abandon(&mut child);
            return Err(DecodeError::Spawn(
                "ffmpeg",
                io::Error::other("could not get stdout handle"),
            ));
        };
        let stderr = match child.stderr.take().map(|pipe| {
            thread::Builder::new()
                .name("ffmpeg-stderr".into())
                .spawn(move || drain_stderr(pipe))
        }) {
            Some(Ok(handle)) => Some(handle),
            Some(Err(e)) => {
                abandon(&mut child);
                return Err(DecodeError::Spawn("ffmpeg", e));
            }
            None => None,
        };

        let seconds_per_frame = frame_period(&info);
        if seconds_per_frame.is_none() {
            warn!("video reports no frame rate or duration, timestamps will be 0.0");
        }

        Ok(Self {
            child,
            stdout: BufReader::with_capacity(frame_len.min(1 << 22), stdout),
            stderr,
            info,
            frame_len,
            seconds_per_frame,
            next_index: 0,
            finished: false,
        })
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, DecodeError> {
        let mut buf = vec![0u8; self.frame_len];
        let mut filled = 0;
        while filled < self.frame_len {
            match self.stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if filled == 0 {
            self.finish()?;
            return Ok(None);
        }
        if filled < self.frame_len {
            return Err(DecodeError::TruncatedFrame {
                index: self.next_index,
                got: filled,
                expected: self.frame_len,
            });
        }

        let image = RgbImage::from_raw(self.info.width, self.info.height, buf).ok_or(
            DecodeError::FrameSize {
                width: self.info.width,
                height: self.info.height,
            },
        )?;
        let index = self.next_index;
        let timestamp_secs = self
            .seconds_per_frame
            .map(|spf| index as f64 * spf)
            .unwrap_or(0.0);
        self.next_index += 1;
        Ok(Some(Frame::new(index, timestamp_secs, image)))
    }

    /// Reap ffmpeg after its output is exhausted and surface a failed exit.
    fn finish(&mut self) -> Result<(), DecodeError> {
        self.finished = true;
        let status = self.child.wait()?;
        if status.success() {
            debug!(frames = self.next_index, "ffmpeg decoder finished");
            return Ok(());
        }
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        Err(DecodeError::FfmpegFailed(format!(
            "{status}: {}",
            stderr.trim()
        )))
    }
}

impl Iterator for FfmpegDecoder {
    type Item = Result<Frame, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => None,
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

impl FrameSource for FfmpegDecoder {
    fn nominal_fps(&self) -> Option<f64> {
        self.info.fps
    }
}

impl Drop for FfmpegDecoder {
    fn drop(&mut self) {
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }
        if let Err(e) = self.child.kill() {
            debug!(error = %e, "ffmpeg already exited");
        }
        let _ = self.child.wait();
    }
}

/// Check whether ffmpeg and ffprobe are on PATH. Logs a warning if not found.
pub fn check_ffmpeg_available() -> bool {
    let mut available = true;
    for tool in ["ffmpeg", "ffprobe"] {
        match Command::new(tool).arg("-version").output() {
            Ok(out) if out.status.success() => {
                debug!(tool, "available");
            }
            Ok(_) => {
                warn!(tool, "returned non-zero for -version; video decoding may fail");
                available = false;
            }
            Err(e) => {
                warn!(
                    tool,
                    error = %e,
                    "not found on PATH; video requests will fail with a decode error"
                );
                available = false;
            }
        }
    }
    available
}
