// Enrichment progress tracking.
//
// `ProgressTracker` is the state machine behind the progress bar:
// `Idle -> Running -> Completed`, or `Failed` when the push channel breaks.
// `SseDecoder` turns raw `text/event-stream` bytes into `ProgressEvent`s.

use crate::models::{ProgressEvent, ProgressState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerPhase {
    Idle,
    Running,
    Completed,
    Failed(String),
}

// Tracks one enrichment run. Each subscription owns its own tracker, so two
// concurrent streams never share terminal state.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    phase: TrackerPhase,
    state: ProgressState,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        ProgressTracker {
            phase: TrackerPhase::Idle,
            state: ProgressState::default(),
        }
    }

    pub fn phase(&self) -> &TrackerPhase {
        &self.phase
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    // `Idle -> Running`. Restarting a finished tracker begins a fresh run.
    pub fn start(&mut self, status: impl Into<String>) {
        self.phase = TrackerPhase::Running;
        self.state = ProgressState {
            percentage: 0,
            status: status.into(),
            done: false,
        };
    }

    // Applies one event and returns whether the run just completed.
    //
    // The percentage never moves backwards within a run and is capped at 100.
    // An event with `total == 0` only updates the status: nothing has been
    // sized yet, so it cannot complete the run. Events after a terminal phase
    // are ignored.
    pub fn apply(&mut self, event: &ProgressEvent) -> bool {
        match self.phase {
            TrackerPhase::Completed | TrackerPhase::Failed(_) => return false,
            TrackerPhase::Idle => self.phase = TrackerPhase::Running,
            TrackerPhase::Running => {}
        }

        self.state.status = event.status.clone();
        if event.total == 0 {
            return false;
        }

        let ratio = event.current as f64 / event.total as f64;
        let percentage = (ratio * 100.0).round().clamp(0.0, 100.0) as u8;
        self.state.percentage = self.state.percentage.max(percentage);

        if event.current >= event.total {
            self.state.done = true;
            self.phase = TrackerPhase::Completed;
            return true;
        }
        false
    }

    // Channel error: terminal unless the run already completed.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.phase != TrackerPhase::Completed {
            self.phase = TrackerPhase::Failed(reason.into());
        }
    }
}

// Incremental decoder for `text/event-stream` bodies.
//
// Bytes may be split anywhere, including inside a UTF-8 sequence, so input is
// buffered until a blank line closes the frame. `data:` lines of one frame are
// joined with `\n`; comments (`:`) and other fields are skipped.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    // Feeds a chunk and returns the payloads of every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut payloads = Vec::new();

        while let Some((end, skip)) = frame_boundary(&self.pending) {
            let frame: Vec<u8> = self.pending.drain(..end + skip).take(end).collect();
            let text = String::from_utf8_lossy(&frame);
            let data: Vec<&str> = text
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
                .collect();
            if !data.is_empty() {
                payloads.push(data.join("\n"));
            }
        }
        payloads
    }
}

// Index of the first blank-line separator and its length (\n\n or \r\n\r\n)
fn frame_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

// Parses one frame payload as a progress event.
pub fn parse_event(payload: &str) -> Result<ProgressEvent, serde_json::Error> {
    serde_json::from_str(payload)
}
