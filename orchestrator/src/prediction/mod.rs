//! Load prediction: recommending a low-risk patch time
//!
//! Reduces a server's retained load history to per-hour averages, keeps
//! the evening hours under the low-utilization threshold and ranks them
//! by confidence. The engine never fails: with no history at all it
//! degrades to a fixed late-evening default carrying an explicit
//! "no historical data" risk factor.

mod history;

pub use history::LoadHistory;

use anyhow::Result;
use chrono::NaiveTime;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::constants::prediction as defaults;
use crate::metrics::{CurrentMetrics, MetricsSource};

/// Qualitative confidence bucket. The three buckets partition [0, 1]:
/// High > 0.7, Medium > 0.4, Low otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn from_score(score: f64) -> Self {
        if score > defaults::HIGH_CONFIDENCE {
            ConfidenceLevel::High
        } else if score > defaults::MEDIUM_CONFIDENCE {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

/// One candidate patch window.
#[derive(Debug, Clone, Serialize)]
pub struct WindowScore {
    pub time: NaiveTime,
    pub average_load: f64,
    pub confidence: f64,
}

/// Recommendation for a server, primary window first.
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub server_name: String,
    pub time: NaiveTime,
    pub confidence: f64,
    pub level: ConfidenceLevel,
    pub reasoning: String,
    pub risk_factors: Vec<String>,
    /// Up to two runner-up windows.
    pub alternatives: Vec<WindowScore>,
}

/// Tunable thresholds, normally sourced from the orchestrator config.
#[derive(Debug, Clone, Copy)]
pub struct PredictionConfig {
    pub retention_days: i64,
    pub evening_start_hour: u32,
    pub evening_end_hour: u32,
    pub low_load_threshold: f64,
    pub session_risk_threshold: u32,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            retention_days: defaults::RETENTION_DAYS,
            evening_start_hour: defaults::EVENING_START_HOUR,
            evening_end_hour: defaults::EVENING_END_HOUR,
            low_load_threshold: defaults::LOW_LOAD_THRESHOLD,
            session_risk_threshold: defaults::SESSION_RISK_THRESHOLD,
        }
    }
}

pub struct PredictionEngine {
    config: PredictionConfig,
    metrics: Arc<dyn MetricsSource>,
}

impl PredictionEngine {
    pub fn new(config: PredictionConfig, metrics: Arc<dyn MetricsSource>) -> Self {
        Self { config, metrics }
    }

    /// Fetch history and current metrics from the collector and produce
    /// a recommendation. Collector failures degrade to the no-data
    /// default rather than propagating.
    pub async fn recommend(&self, server_name: &str) -> Recommendation {
        let history = match self.metrics.history(server_name).await {
            Ok(samples) => LoadHistory::from_samples(samples, self.config.retention_days),
            Err(e) => {
                debug!("History fetch for {} failed: {}", server_name, e);
                LoadHistory::new(self.config.retention_days)
            }
        };

        let current = self.metrics.current(server_name).await.ok();
        self.recommend_from(server_name, &history, current.as_ref())
    }

    /// Pure scoring over an already-loaded history.
    pub fn recommend_from(
        &self,
        server_name: &str,
        history: &LoadHistory,
        current: Option<&CurrentMetrics>,
    ) -> Recommendation {
        let mut risk_factors = Vec::new();

        if let Some(metrics) = current {
            if metrics.active_sessions > self.config.session_risk_threshold {
                risk_factors.push(format!(
                    "{} active sessions right now (threshold {})",
                    metrics.active_sessions, self.config.session_risk_threshold
                ));
            }
        }

        if history.is_empty() {
            risk_factors.push("no historical data for this server".to_string());
            let fallback = NaiveTime::from_hms_opt(defaults::FALLBACK_HOUR, 0, 0)
                .expect("fallback hour is valid");
            return Recommendation {
                server_name: server_name.to_string(),
                time: fallback,
                confidence: defaults::FALLBACK_CONFIDENCE,
                level: ConfidenceLevel::from_score(defaults::FALLBACK_CONFIDENCE),
                reasoning: "No load history; defaulting to late evening".to_string(),
                risk_factors,
                alternatives: Vec::new(),
            };
        }

        let averages = history.hourly_averages();
        let mut windows: Vec<WindowScore> = (self.config.evening_start_hour
            ..=self.config.evening_end_hour)
            .filter_map(|hour| {
                let avg = averages[hour as usize]?;
                if avg >= self.config.low_load_threshold {
                    return None;
                }
                Some(WindowScore {
                    time: NaiveTime::from_hms_opt(hour, 0, 0)?,
                    average_load: avg,
                    confidence: ((100.0 - avg).max(0.0)) / 100.0,
                })
            })
            .collect();

        windows.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        windows.truncate(3);

        let Some(primary) = windows.first().cloned() else {
            // History exists but no evening hour is quiet enough
            risk_factors.push("no evening hour below the low-load threshold".to_string());
            let fallback = NaiveTime::from_hms_opt(defaults::FALLBACK_HOUR, 0, 0)
                .expect("fallback hour is valid");
            return Recommendation {
                server_name: server_name.to_string(),
                time: fallback,
                confidence: defaults::FALLBACK_CONFIDENCE,
                level: ConfidenceLevel::from_score(defaults::FALLBACK_CONFIDENCE),
                reasoning: "All evening hours busy; defaulting to late evening".to_string(),
                risk_factors,
                alternatives: Vec::new(),
            };
        };

        let recommendation = Recommendation {
            server_name: server_name.to_string(),
            time: primary.time,
            confidence: primary.confidence,
            level: ConfidenceLevel::from_score(primary.confidence),
            reasoning: format!(
                "Average load {:.1}% at {} over {} samples",
                primary.average_load,
                primary.time,
                history.len()
            ),
            risk_factors,
            alternatives: windows.into_iter().skip(1).collect(),
        };

        info!(
            "Recommendation for {}: {} (confidence {:.2}, {:?})",
            server_name, recommendation.time, recommendation.confidence, recommendation.level
        );
        recommendation
    }
}
