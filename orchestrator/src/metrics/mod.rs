//! Metrics collector seam
//!
//! Real telemetry comes from an external collector; for bootstrapping a
//! fleet with no history the synthetic source stands in behind the same
//! trait, generating a plausible business-hours load curve. Prediction
//! logic never knows which one it is talking to.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// One historical utilization observation for a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadSample {
    pub recorded_at: DateTime<Utc>,
    pub cpu_percent: f64,
    pub process_count: u32,
    pub active_sessions: u32,
}

/// Instantaneous snapshot from the collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentMetrics {
    pub cpu_percent: f64,
    pub active_sessions: u32,
    pub process_count: u32,
}

/// Best-effort, short-timeout metrics contract.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn current(&self, server_name: &str) -> Result<CurrentMetrics>;

    async fn history(&self, server_name: &str) -> Result<Vec<LoadSample>>;
}

/// Deterministic synthetic load generator.
///
/// Produces hourly samples over the retention window with higher load
/// during business hours (08-18) and low load at night, perturbed by a
/// per-server seed so different hosts do not recommend identical slots.
pub struct SyntheticMetrics {
    history_days: i64,
}

impl SyntheticMetrics {
    pub fn new(history_days: i64) -> Self {
        Self { history_days }
    }

    fn seed(server_name: &str) -> u64 {
        // FNV-1a; stable across runs so recommendations are reproducible
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in server_name.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        hash
    }

    fn sample_for(seed: u64, at: DateTime<Utc>) -> LoadSample {
        let hour = at.hour();
        let jitter = ((seed ^ at.timestamp() as u64) % 17) as f64; // 0..16

        let cpu_percent = if (8..18).contains(&hour) {
            48.0 + jitter * 1.8 // business hours: roughly 48-77%
        } else if (18..21).contains(&hour) {
            28.0 + jitter // shoulder: 28-44%
        } else {
            8.0 + jitter * 0.9 // night: 8-22%
        };

        let active_sessions = if (8..18).contains(&hour) {
            3 + (jitter as u32 % 5)
        } else {
            jitter as u32 % 2
        };

        LoadSample {
            recorded_at: at,
            cpu_percent,
            process_count: 90 + (jitter as u32 * 4),
            active_sessions,
        }
    }
}

#[async_trait]
impl MetricsSource for SyntheticMetrics {
    async fn current(&self, server_name: &str) -> Result<CurrentMetrics> {
        let sample = Self::sample_for(Self::seed(server_name), Utc::now());
        Ok(CurrentMetrics {
            cpu_percent: sample.cpu_percent,
            active_sessions: sample.active_sessions,
            process_count: sample.process_count,
        })
    }

    async fn history(&self, server_name: &str) -> Result<Vec<LoadSample>> {
        let seed = Self::seed(server_name);
        let now = Utc::now();
        let hours = self.history_days * 24;

        let mut samples = Vec::with_capacity(hours as usize);
        for offset in (1..=hours).rev() {
            let at = now - Duration::hours(offset);
            samples.push(Self::sample_for(seed, at));
        }
        Ok(samples)
    }
}
