// Capture strategies - how raw blocks become a measurement window
//
// Two modes cover the historical variants of this pipeline:
//
// Snapshot:   Idle -> (pulse) -> Waiting(delay) -> Captured -> Idle.
//             A ring of recent samples tracks the live stream; after the
//             configured delay the most recent window is copied out.
//
// Continuous: Idle -> Armed -> Recording -> Full -> Idle.
//             While armed, blocks are discarded until one carries a sample
//             above the onset threshold; recording then runs until the
//             window is full. A new armed phase cannot begin while a
//             recording is still filling, which serializes cycles.

use std::collections::VecDeque;

use crate::config::{CaptureMode, SonarConfig};

/// Phase of the continuous-capture state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuousPhase {
    /// Ignoring input until the next pulse arms the detector
    Idle,
    /// Scanning incoming blocks for the pulse onset
    Armed,
    /// Accumulating blocks until the window is full
    Recording,
}

/// Config-selected capture strategy, one instance per session run
pub enum CaptureStrategy {
    Snapshot(SnapshotStrategy),
    Continuous(ContinuousStrategy),
}

impl CaptureStrategy {
    pub fn new(config: &SonarConfig, sample_rate: u32) -> Self {
        match config.capture_mode {
            CaptureMode::Snapshot => {
                CaptureStrategy::Snapshot(SnapshotStrategy::new(config.window_len))
            }
            CaptureMode::Continuous => CaptureStrategy::Continuous(ContinuousStrategy::new(
                config.onset_threshold,
                config.smoothing_kernel / 2,
                config.continuous_target_len(sample_rate),
            )),
        }
    }

    /// Feed one incoming block; Continuous mode may complete a window.
    pub fn ingest(&mut self, block: &[f32]) -> Option<Vec<f32>> {
        match self {
            CaptureStrategy::Snapshot(s) => {
                s.ingest(block);
                None
            }
            CaptureStrategy::Continuous(s) => s.ingest(block),
        }
    }

    /// Called at every pulse emission
    pub fn on_pulse(&mut self) {
        if let CaptureStrategy::Continuous(s) = self {
            s.arm();
        }
    }

    /// Snapshot mode: copy out the most recent window. Continuous mode
    /// never snapshots and returns None.
    pub fn take_snapshot(&mut self) -> Option<Vec<f32>> {
        match self {
            CaptureStrategy::Snapshot(s) => Some(s.snapshot()),
            CaptureStrategy::Continuous(_) => None,
        }
    }
}

/// Fixed-delay snapshot capture
///
/// Keeps only the most recent `window_len` samples; older ones fall off
/// the front as blocks arrive.
pub struct SnapshotStrategy {
    ring: VecDeque<f32>,
    window_len: usize,
}

impl SnapshotStrategy {
    pub fn new(window_len: usize) -> Self {
        Self {
            ring: VecDeque::with_capacity(window_len),
            window_len,
        }
    }

    pub fn ingest(&mut self, block: &[f32]) {
        for &sample in block {
            if self.ring.len() == self.window_len {
                self.ring.pop_front();
            }
            self.ring.push_back(sample);
        }
    }

    /// Copy of the live window, oldest sample first
    pub fn snapshot(&self) -> Vec<f32> {
        self.ring.iter().copied().collect()
    }
}

/// Onset-triggered continuous capture
pub struct ContinuousStrategy {
    phase: ContinuousPhase,
    buffer: Vec<f32>,
    onset_threshold: f32,
    lead_in_zeros: usize,
    target_len: usize,
}

impl ContinuousStrategy {
    pub fn new(onset_threshold: f32, lead_in_zeros: usize, target_len: usize) -> Self {
        Self {
            phase: ContinuousPhase::Idle,
            buffer: Vec::new(),
            onset_threshold,
            lead_in_zeros,
            target_len,
        }
    }

    pub fn phase(&self) -> ContinuousPhase {
        self.phase
    }

    /// Arm onset detection for the next window. Ignored while a recording
    /// is still filling so cycles cannot overlap.
    pub fn arm(&mut self) {
        if self.phase == ContinuousPhase::Idle {
            self.phase = ContinuousPhase::Armed;
        }
    }

    /// Feed one block; returns the completed window when it fills up.
    pub fn ingest(&mut self, block: &[f32]) -> Option<Vec<f32>> {
        match self.phase {
            ContinuousPhase::Idle => None,
            ContinuousPhase::Armed => {
                let onset = block.iter().any(|&x| x.abs() > self.onset_threshold);
                if !onset {
                    return None;
                }
                // Lead-in zeros keep the pulse's rising edge clear of the
                // window start so smoothing does not truncate it.
                self.buffer = Vec::with_capacity(self.target_len);
                self.buffer
                    .extend(std::iter::repeat(0.0).take(self.lead_in_zeros));
                self.phase = ContinuousPhase::Recording;
                self.append(block)
            }
            ContinuousPhase::Recording => self.append(block),
        }
    }

    fn append(&mut self, block: &[f32]) -> Option<Vec<f32>> {
        self.buffer.extend_from_slice(block);
        if self.buffer.len() < self.target_len {
            return None;
        }
        self.buffer.truncate(self.target_len);
        self.phase = ContinuousPhase::Idle;
        Some(std::mem::take(&mut self.buffer))
    }
}
