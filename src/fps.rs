// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

const NANOS_PER_SECOND: f64 = 1e9;

/// Running average frame rate over the last `len + 1` frame timestamps.
#[derive(Debug, Clone)]
pub struct FpsRecorder {
    timestamps: Vec<i64>,
    index: usize,
    samples: usize,
}

impl FpsRecorder {
    /// Creates a recorder averaging over `len + 1` samples. A zero length is
    /// raised to one.
    pub fn new(len: usize) -> Self {
        Self {
            timestamps: vec![0; len.max(1)],
            index: 0,
            samples: 0,
        }
    }

    /// Records the timestamp of the latest frame and returns the current frame
    /// rate, or `None` until enough samples have been recorded.
    pub fn record_timestamp(&mut self, timestamp_ns: i64) -> Option<f64> {
        let len = self.timestamps.len();
        // The sample being replaced is the oldest one in the window.
        let duration = timestamp_ns - self.timestamps[self.index];
        self.timestamps[self.index] = timestamp_ns;
        self.index = (self.index + 1) % len;
        self.samples = (self.samples + 1).min(len + 1);

        if self.samples == len + 1 && duration > 0 {
            Some(NANOS_PER_SECOND * len as f64 / duration as f64)
        } else {
            None
        }
    }

    /// Forgets all recorded timestamps.
    pub fn reset(&mut self) {
        self.index = 0;
        self.samples = 0;
    }
}
