//! FFmpeg stderr parsing.
//!
//! [`ProgressParser`] is fed raw stderr chunks and turns them into
//! [`ProcessEvent`]s. It does no I/O: the process runner owns the child and
//! writes prompt answers back to its stdin.
//!
//! With `-stats -loglevel error` ffmpeg prints three kinds of lines:
//! - `[module @ 0x...] message: data` for fatal errors
//! - `frame=  100 fps=25 q=-1.0 size=    1024kB time=00:00:04.00 bitrate=2097.2kbits/s speed=1.00x`
//!   status lines, terminated by `\r`
//! - `File 'x' already exists. Overwrite? [y/N] ` prompts without a newline

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::error::{ProcessFailure, ProcessFatalError};

/// Trailer of an interactive yes/no question.
pub const PROMPT_SUFFIX: &[u8] = b"[y/N] ";

static FIELD_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z]+)=\s*(\S+)").expect("field regex is valid"));

/// Bytes to write to ffmpeg's stdin for a prompt answer.
pub fn answer(yes: bool) -> &'static [u8] {
    if yes { b"y\n" } else { b"n\n" }
}

/// Parse time string in `H:MM:SS.ms` format to seconds.
///
/// Negative times (ffmpeg reports them while priming) are returned as is.
///
/// # Examples
/// ```
/// use kamyroll::downloader::engine::utils::parse_time;
///
/// assert_eq!(parse_time("00:00:10.50"), Some(10.5));
/// assert_eq!(parse_time("01:30:00.00"), Some(5400.0));
/// assert_eq!(parse_time("invalid"), None);
/// ```
pub fn parse_time(time_str: &str) -> Option<f64> {
    let (negative, time_str) = match time_str.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, time_str),
    };
    let parts: Vec<&str> = time_str.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let (whole, fraction) = parts[2].split_once('.')?;
    if ![parts[0], parts[1], whole, fraction].iter().all(|p| is_digits(p)) {
        return None;
    }

    let hours: f64 = parts[0].parse().ok()?;
    let minutes: f64 = parts[1].parse().ok()?;
    let seconds: f64 = parts[2].parse().ok()?;

    let total = hours * 3600.0 + minutes * 60.0 + seconds;
    Some(if negative { -total } else { total })
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Parse a size value (`1024kB`, `512KiB`) to bytes.
pub fn parse_size(value: &str) -> Option<u64> {
    let end = value.find(['k', 'K'])?;
    let size: u64 = value[..end].trim().parse().ok()?;
    Some(size * 1024)
}

/// Parse a speed multiplier (`1.00x`).
pub fn parse_speed(value: &str) -> Option<f64> {
    let end = value.find('x')?;
    value[..end].trim().parse().ok()
}

/// Parse a bitrate (`2097.2kbits/s`) to bytes per second.
pub fn parse_bitrate(value: &str) -> Option<u64> {
    let end = value.find("kbits/s")?;
    let bitrate: f64 = value[..end].trim().parse().ok()?;
    Some((bitrate * 1024.0 / 8.0) as u64)
}

/// One ffmpeg status line. `None` fields were absent or `N/A`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressRecord {
    pub frame: Option<u64>,
    pub fps: Option<f64>,
    pub quality: Option<f64>,
    pub size_bytes: Option<u64>,
    /// Elapsed output time, clamped at zero.
    pub time: Option<Duration>,
    pub bitrate_bytes_per_sec: Option<u64>,
    pub dup: Option<u64>,
    pub drop: Option<u64>,
    pub speed: Option<f64>,
}

impl ProgressRecord {
    /// Parse a status line. Requires the `size` (or `Lsize`), `time`,
    /// `bitrate` and `speed` keys; every other field is optional.
    pub fn parse(line: &str) -> Option<Self> {
        let fields: HashMap<&str, &str> = FIELD_REGEX
            .captures_iter(line)
            .filter_map(|caps| Some((caps.get(1)?.as_str(), caps.get(2)?.as_str())))
            .collect();

        let size = fields.get("size").or_else(|| fields.get("Lsize"))?;
        let time = fields.get("time")?;
        let bitrate = fields.get("bitrate")?;
        let speed = fields.get("speed")?;

        let time = match *time {
            "N/A" => None,
            value => {
                let seconds = parse_time(value)?;
                Some(Duration::try_from_secs_f64(seconds.max(0.0)).ok()?)
            }
        };

        Some(Self {
            frame: fields.get("frame").and_then(|v| v.parse().ok()),
            fps: fields.get("fps").and_then(|v| v.parse().ok()),
            quality: fields.get("q").and_then(|v| v.parse().ok()),
            size_bytes: parse_size(size),
            time,
            bitrate_bytes_per_sec: parse_bitrate(bitrate),
            dup: fields.get("dup").and_then(|v| v.parse().ok()),
            drop: fields.get("drop").and_then(|v| v.parse().ok()),
            speed: parse_speed(speed),
        })
    }
}

/// Progress of the current transcode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    /// Upper bound in seconds. `None` while the bound is unknown.
    pub maximum: Option<u64>,
    pub value: u64,
}

impl Progress {
    pub const COMPLETE: Self = Self {
        maximum: Some(1),
        value: 1,
    };

    pub fn is_determinate(&self) -> bool {
        self.maximum.is_some()
    }
}

/// What a stderr chunk meant.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    /// A complete output line, as printed.
    Line(String),
    /// A yes/no question; answer with [`answer`].
    Question(String),
    /// ffmpeg reported a hard failure. The process must be killed.
    Fatal(ProcessFatalError),
    Progress {
        progress: Progress,
        record: ProgressRecord,
    },
    /// Anything else ffmpeg printed.
    Message(String),
}

/// Parse `[module@offset] message: data`.
pub fn parse_fatal(line: &str) -> ProcessFatalError {
    let (module, message) = match line.split_once("] ") {
        Some((module, message)) => (module, message),
        None => (line, ""),
    };
    let module = module.strip_prefix('[').unwrap_or(module);
    let (module, offset) = module.split_once('@').unwrap_or((module, ""));
    let (message, data) = message.split_once(": ").unwrap_or((message, ""));

    ProcessFatalError {
        module: module.trim().to_string(),
        offset: offset.trim().to_string(),
        message: message.to_string(),
        data: data.to_string(),
        line: line.to_string(),
    }
}

/// Line reassembly and classification for ffmpeg's stderr.
#[derive(Debug)]
pub struct ProgressParser {
    stopped: bool,
    first_update: bool,
    max_duration: Duration,
    leftover: Vec<u8>,
    progress: Progress,
}

impl ProgressParser {
    /// Parser for a transcode whose output is expected to last `max_duration`.
    pub fn new(max_duration: Duration) -> Self {
        Self {
            stopped: false,
            first_update: true,
            max_duration,
            leftover: Vec::new(),
            progress: Progress::default(),
        }
    }

    pub fn progress(&self) -> Progress {
        self.progress
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Ignore everything from now on.
    pub fn stop(&mut self) {
        self.stopped = true;
        self.leftover.clear();
    }

    /// Feed a raw stderr chunk.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ProcessEvent> {
        let mut events = Vec::new();
        if self.stopped {
            return events;
        }

        for &byte in chunk {
            match byte {
                b'\n' => self.complete_line(&mut events),
                // `\r\n` yields an empty line, which is skipped.
                b'\r' => self.complete_line(&mut events),
                _ => self.leftover.push(byte),
            }
            if self.stopped {
                return events;
            }
        }

        if self.leftover.ends_with(PROMPT_SUFFIX) {
            let line = String::from_utf8_lossy(&self.leftover).into_owned();
            self.leftover.clear();
            let question = line.trim_end_matches(" [y/N] ").trim_end_matches("[y/N] ");
            events.push(ProcessEvent::Line(line.clone()));
            events.push(ProcessEvent::Question(question.trim_end().to_string()));
        }

        events
    }

    /// Process a trailing line that was never terminated.
    pub fn flush(&mut self) -> Vec<ProcessEvent> {
        let mut events = Vec::new();
        if !self.stopped {
            self.complete_line(&mut events);
        }
        events
    }

    /// Settle the outcome once the process has exited with `code`
    /// (`None` when killed by a signal).
    pub fn finish(&mut self, code: Option<i32>) -> Result<Progress, ProcessFailure> {
        self.stopped = true;
        match code {
            Some(0) => {
                self.progress = Progress::COMPLETE;
                Ok(self.progress)
            }
            code => Err(ProcessFailure::Exit { code }),
        }
    }

    fn complete_line(&mut self, events: &mut Vec<ProcessEvent>) {
        if self.leftover.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(&self.leftover).into_owned();
        self.leftover.clear();
        events.push(ProcessEvent::Line(line.clone()));
        self.process_line(line, events);
    }

    fn process_line(&mut self, line: String, events: &mut Vec<ProcessEvent>) {
        if line.starts_with('[') {
            self.stopped = true;
            self.leftover.clear();
            let fatal = parse_fatal(&line);
            error!(line = %fatal.line, "FFmpeg error");
            events.push(ProcessEvent::Fatal(fatal));
            return;
        }

        if let Some(record) = ProgressRecord::parse(&line) {
            let Some(elapsed) = record.time else {
                return;
            };
            if self.first_update {
                self.first_update = false;
                self.progress.maximum = Some(self.max_duration.as_secs());
            }
            if elapsed > self.max_duration {
                warn!(
                    elapsed = elapsed.as_secs_f64(),
                    max = self.max_duration.as_secs_f64(),
                    "Progress beyond the expected duration"
                );
                self.progress = Progress::default();
            } else {
                self.progress.value = elapsed.as_secs();
            }
            events.push(ProcessEvent::Progress {
                progress: self.progress,
                record,
            });
            return;
        }

        debug!(%line, "FFmpeg message");
        events.push(ProcessEvent::Message(line));
    }
}
