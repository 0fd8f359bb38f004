/// Latency reported for a target that answered none of its probes. Keeps
/// dead targets heavily penalized without a separate reachability flag.
pub const UNREACHABLE_LATENCY_MS: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeResult {
    pub loss_fraction: f64,
    pub latency_ms: f64,
}

impl ProbeResult {
    pub fn unreachable() -> Self {
        Self {
            loss_fraction: 1.0,
            latency_ms: UNREACHABLE_LATENCY_MS,
        }
    }

    pub fn is_unreachable(&self) -> bool {
        self.loss_fraction >= 1.0
    }
}
