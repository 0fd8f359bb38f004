use std::process::Command;
use std::time::Duration;

use tracing::{debug, warn};

use crate::model::measure::{ProbeResult, UNREACHABLE_LATENCY_MS};

pub trait Prober: Send {
    /// Sends `count` reachability probes to `address`, each bounded by
    /// `timeout`. Total failure is not an error: it comes back as full loss
    /// with the sentinel latency.
    fn probe(&self, address: &str, timeout: Duration, count: u32) -> ProbeResult;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PingStats {
    pub transmitted: u32,
    pub received: u32,
    pub avg_rtt_ms: Option<f64>,
}

impl PingStats {
    /// Scrapes the summary block of `ping` output. Understands both the
    /// iputils `rtt min/avg/max/mdev = ...` line and the busybox/BSD
    /// `round-trip min/avg/max = ...` variant.
    pub fn parse(ping_output: &str) -> Self {
        let mut out = Self::default();
        for line in ping_output.lines() {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if line.contains("packets transmitted") {
                for (idx, token) in tokens.iter().enumerate() {
                    if idx == 0 {
                        continue;
                    }
                    if token.starts_with("transmitted") {
                        if let Ok(v) = tokens[idx - 1].parse::<u32>() {
                            out.transmitted = v;
                        }
                    } else if token.starts_with("received") {
                        if let Ok(v) = tokens[idx - 1].parse::<u32>() {
                            out.received = v;
                        }
                    }
                }
            } else if line.starts_with("rtt") || line.starts_with("round-trip") {
                let Some((_, values)) = line.split_once('=') else {
                    continue;
                };
                let values = values.trim().trim_end_matches("ms").trim();
                let fields: Vec<&str> = values.split('/').collect();
                if fields.len() >= 2 {
                    if let Ok(avg) = fields[1].trim().parse::<f64>() {
                        out.avg_rtt_ms = Some(avg);
                    }
                }
            }
        }
        out
    }

    pub fn loss_fraction(&self) -> f64 {
        if self.transmitted == 0 {
            return 1.0;
        }
        1.0 - f64::from(self.received) / f64::from(self.transmitted)
    }

    pub fn to_probe_result(&self) -> ProbeResult {
        if self.received == 0 {
            return ProbeResult::unreachable();
        }
        ProbeResult {
            loss_fraction: self.loss_fraction(),
            latency_ms: self.avg_rtt_ms.unwrap_or(UNREACHABLE_LATENCY_MS),
        }
    }
}

/// Probes via the system `ping` binary. ICMP stays out of process, so the
/// daemon needs no raw-socket privileges of its own.
pub struct PingProber;

impl PingProber {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PingProber {
    fn default() -> Self {
        Self::new()
    }
}

impl Prober for PingProber {
    fn probe(&self, address: &str, timeout: Duration, count: u32) -> ProbeResult {
        let timeout_s = timeout.as_secs().max(1);
        let output = Command::new("ping")
            .args([
                "-n",
                "-q",
                "-c",
                &count.to_string(),
                "-W",
                &timeout_s.to_string(),
                address,
            ])
            .output();

        // ping exits nonzero when replies are missing; the summary block is
        // still printed, so parse stdout regardless of status.
        let output = match output {
            Ok(output) => output,
            Err(err) => {
                warn!("failed to execute ping for {address}: {err}");
                return ProbeResult::unreachable();
            }
        };

        let text = String::from_utf8_lossy(&output.stdout);
        let stats = PingStats::parse(&text);
        let result = stats.to_probe_result();
        debug!(
            "probe {address}: {}/{} replies, loss={:.2} latency={:.1}ms",
            stats.received, stats.transmitted, result.loss_fraction, result.latency_ms
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_iputils_summary_with_loss() {
        let text = "PING 8.8.8.8 (8.8.8.8) 56(84) bytes of data.\n\
\n\
--- 8.8.8.8 ping statistics ---\n\
10 packets transmitted, 9 received, 10% packet loss, time 9012ms\n\
rtt min/avg/max/mdev = 14.118/15.320/16.517/0.733 ms\n";
        let stats = PingStats::parse(text);
        assert_eq!(stats.transmitted, 10);
        assert_eq!(stats.received, 9);
        assert_eq!(stats.avg_rtt_ms, Some(15.320));

        let result = stats.to_probe_result();
        assert!((result.loss_fraction - 0.1).abs() < 1e-9);
        assert_eq!(result.latency_ms, 15.320);
    }

    #[test]
    fn parse_busybox_round_trip_line() {
        let text = "--- 1.1.1.1 ping statistics ---\n\
4 packets transmitted, 4 packets received, 0% packet loss\n\
round-trip min/avg/max = 12.1/13.5/15.0 ms\n";
        let stats = PingStats::parse(text);
        assert_eq!(stats.transmitted, 4);
        assert_eq!(stats.received, 4);
        assert_eq!(stats.avg_rtt_ms, Some(13.5));
        assert_eq!(stats.loss_fraction(), 0.0);
    }

    #[test]
    fn total_loss_yields_sentinel_result() {
        let text = "--- 10.9.9.9 ping statistics ---\n\
10 packets transmitted, 0 received, 100% packet loss, time 9211ms\n";
        let stats = PingStats::parse(text);
        assert_eq!(stats.received, 0);
        assert_eq!(stats.avg_rtt_ms, None);

        let result = stats.to_probe_result();
        assert_eq!(result.loss_fraction, 1.0);
        assert_eq!(result.latency_ms, UNREACHABLE_LATENCY_MS);
    }

    #[test]
    fn replies_without_rtt_line_fall_back_to_sentinel_latency() {
        let text = "3 packets transmitted, 3 received, 0% packet loss, time 2003ms\n";
        let result = PingStats::parse(text).to_probe_result();
        assert_eq!(result.loss_fraction, 0.0);
        assert_eq!(result.latency_ms, UNREACHABLE_LATENCY_MS);
    }

    #[test]
    fn empty_output_is_unreachable() {
        let result = PingStats::parse("").to_probe_result();
        assert!(result.is_unreachable());
    }
}
