//! Server time estimation
//!
//! Two sources feed the estimate. Every `TIME_SYNC_PONG` updates a smoothed
//! clock offset, and every state snapshot carries the server's own reading
//! at send time. Between snapshots the snapshot reading is extrapolated with
//! the local clock; the offset is only used before the first snapshot.

/// Weight kept from the previous offset on each new sample
pub const OFFSET_SMOOTHING: f64 = 0.8;

/// Exponentially smoothed offset between the server clock and ours.
///
/// The estimate assumes symmetric latency. Asymmetric or inflated round
/// trips bias it and nothing bounds that error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClockSync {
    offset_ms: f64,
    samples: u64,
    last_rtt_ms: Option<i64>,
}

impl ClockSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one ping/pong exchange into the offset and return the new value.
    ///
    /// `t0` is our clock when the ping left, `t1` the server clock when it
    /// answered, `t2` our clock when the pong arrived.
    pub fn observe(&mut self, t0: i64, t1: i64, t2: i64) -> f64 {
        let rtt = (t2 - t0) as f64;
        let sample = t1 as f64 - (t0 as f64 + rtt / 2.0);
        self.offset_ms = OFFSET_SMOOTHING * self.offset_ms + (1.0 - OFFSET_SMOOTHING) * sample;
        self.samples += 1;
        self.last_rtt_ms = Some(t2 - t0);
        self.offset_ms
    }

    pub fn offset_ms(&self) -> f64 {
        self.offset_ms
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn last_rtt_ms(&self) -> Option<i64> {
        self.last_rtt_ms
    }

    /// Local reading converted to server time.
    pub fn server_now(&self, local_now_ms: i64) -> i64 {
        local_now_ms + self.offset_ms.round() as i64
    }
}

/// Server reading carried by the last snapshot and when we received it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotClock {
    pub server_now_ms: i64,
    pub received_at_ms: i64,
}

impl SnapshotClock {
    pub fn server_now(&self, local_now_ms: i64) -> i64 {
        self.server_now_ms + (local_now_ms - self.received_at_ms)
    }
}

/// Best estimate of server time at `local_now_ms`.
pub fn estimate_server_now(
    snapshot: Option<&SnapshotClock>,
    sync: &ClockSync,
    local_now_ms: i64,
) -> i64 {
    match snapshot {
        Some(snapshot) => snapshot.server_now(local_now_ms),
        None => sync.server_now(local_now_ms),
    }
}
