//! Rolling network statistics for periodic log reports

use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

/// One round-trip measurement
#[derive(Debug, Clone)]
pub struct PingSample {
    pub ping_ms: f32,
    pub timestamp: Instant,
}

/// Ping history plus running traffic counters
pub struct NetworkStats {
    // Historical data storage
    ping_history: VecDeque<PingSample>,
    max_samples: usize,

    pub snapshots: u64,
    pub ticks: u64,
    pub corrections: u64,
    pub rejections: u64,
    pub inputs_sent: u64,
}

impl NetworkStats {
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    pub fn with_capacity(max_samples: usize) -> Self {
        Self {
            ping_history: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
            snapshots: 0,
            ticks: 0,
            corrections: 0,
            rejections: 0,
            inputs_sent: 0,
        }
    }

    /// Records a round trip measured from a pong
    pub fn record_ping(&mut self, ping_ms: f32) {
        self.ping_history.push_back(PingSample {
            ping_ms,
            timestamp: Instant::now(),
        });

        // Maintain max samples
        while self.ping_history.len() > self.max_samples {
            self.ping_history.pop_front();
        }
    }

    pub fn latest_ping(&self) -> Option<f32> {
        self.ping_history.back().map(|sample| sample.ping_ms)
    }

    pub fn average_ping(&self) -> Option<f32> {
        if self.ping_history.is_empty() {
            return None;
        }
        let total: f32 = self.ping_history.iter().map(|sample| sample.ping_ms).sum();
        Some(total / self.ping_history.len() as f32)
    }

    pub fn max_ping(&self) -> Option<f32> {
        self.ping_history
            .iter()
            .map(|sample| sample.ping_ms)
            .reduce(f32::max)
    }

    pub fn samples(&self) -> usize {
        self.ping_history.len()
    }
}

impl Default for NetworkStats {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.average_ping(), self.max_ping()) {
            (Some(avg), Some(max)) => write!(f, "ping avg {:.1}ms max {:.1}ms", avg, max)?,
            _ => write!(f, "ping n/a")?,
        }
        write!(
            f,
            ", {} snapshots, {} ticks, {} inputs, {} corrections, {} rejections",
            self.snapshots, self.ticks, self.inputs_sent, self.corrections, self.rejections
        )
    }
}
