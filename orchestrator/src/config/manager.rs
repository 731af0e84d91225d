use anyhow::Result;
use std::str::FromStr;
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};

use super::{ConfigFile, OrchestratorConfig};
use crate::assignment::Classifier;
use crate::errors::ConfigError;

#[derive(Debug)]
pub struct ConfigManager {
    current_config: Arc<OrchestratorConfig>,
}

impl ConfigManager {
    /// Load `orchestrator.toml` from the given path, falling back to
    /// stock defaults for anything the file omits. A missing file is a
    /// warning, not an error; a malformed file or table is fatal.
    pub async fn new(config_path: &str) -> Result<Self, ConfigError> {
        let file = match fs::read_to_string(config_path).await {
            Ok(content) => {
                toml::from_str::<ConfigFile>(&content).map_err(|e| ConfigError::LoadFailed {
                    path: config_path.to_string(),
                    reason: e.to_string(),
                })?
            }
            Err(e) => {
                warn!(
                    "Config file {} not readable ({}); using defaults",
                    config_path, e
                );
                ConfigFile::default()
            }
        };

        let config = Self::merge(file)?;
        Self::validate(&config)?;

        info!(
            "Configuration loaded: {} quarters, {} groups, registry at {}",
            config.quarters.len(),
            config.groups.len(),
            config.registry_path
        );

        Ok(Self {
            current_config: Arc::new(config),
        })
    }

    /// Build directly from plain values, for embedding and tests.
    pub fn from_config(config: OrchestratorConfig) -> Result<Self, ConfigError> {
        Self::validate(&config)?;
        Ok(Self {
            current_config: Arc::new(config),
        })
    }

    pub fn get_current_config(&self) -> Arc<OrchestratorConfig> {
        self.current_config.clone()
    }

    fn merge(file: ConfigFile) -> Result<OrchestratorConfig, ConfigError> {
        let mut config = OrchestratorConfig::default();

        if let Some(path) = file.registry_path {
            config.registry_path = path;
        }
        if let Some(url) = file.webhook_url {
            config.webhook_url = url;
        }
        if let Some(port) = file.agent_port {
            config.agent_port = port;
        }
        if let Some(raw) = file.maintenance_weekday {
            config.maintenance_weekday =
                chrono::Weekday::from_str(&raw).map_err(|_| ConfigError::InvalidValue {
                    field: "maintenance_weekday".to_string(),
                    reason: format!("'{}' is not a weekday name", raw),
                })?;
        }
        if let Some(days) = file.auto_approve_lead_days {
            config.auto_approve_lead_days = days;
        }
        if let Some(limit) = file.max_concurrent_polls {
            config.max_concurrent_polls = limit.max(1);
        }
        if let Some(schedule) = file.pipeline_poll_schedule {
            config.pipeline_poll_schedule = schedule;
        }
        if let Some(schedule) = file.auto_approval_schedule {
            config.auto_approval_schedule = schedule;
        }
        if !file.groups.is_empty() {
            config.groups = file.groups;
        }

        if let Some(slots) = file.slots {
            let grid = &mut config.slot_grid;
            if let Some(v) = slots.window_start_hour {
                grid.window_start_hour = v;
            }
            if let Some(v) = slots.window_span_hours {
                grid.window_span_hours = v;
            }
            if let Some(v) = slots.step_minutes {
                grid.step_minutes = v;
            }
            if let Some(v) = slots.slot_capacity {
                grid.slot_capacity = v;
            }
        }

        if let Some(prediction) = file.prediction {
            let p = &mut config.prediction;
            if let Some(v) = prediction.retention_days {
                p.retention_days = v;
            }
            if let Some(v) = prediction.evening_start_hour {
                p.evening_start_hour = v;
            }
            if let Some(v) = prediction.evening_end_hour {
                p.evening_end_hour = v;
            }
            if let Some(v) = prediction.low_load_threshold {
                p.low_load_threshold = v;
            }
            if let Some(v) = prediction.session_risk_threshold {
                p.session_risk_threshold = v;
            }
        }

        if let Some(pipeline) = file.pipeline {
            let p = &mut config.pipeline;
            if let Some(v) = pipeline.precheck_window_hours {
                p.precheck_window_hours = v;
            }
            if let Some(v) = pipeline.trigger_window_hours {
                p.trigger_window_hours = v;
            }
            if let Some(v) = pipeline.validation_threshold {
                p.validation_threshold = v;
            }
            if let Some(v) = pipeline.max_precheck_attempts {
                p.max_precheck_attempts = v;
            }
            if let Some(v) = pipeline.missed_window_grace_hours {
                p.missed_window_grace_hours = v;
            }
        }

        Ok(config)
    }

    fn validate(config: &OrchestratorConfig) -> Result<(), ConfigError> {
        // The classifier constructor owns group-table validation
        Classifier::new(config.groups.clone())?;

        let mut seen = [0u8; 13];
        for spec in &config.quarters {
            for &month in &spec.months {
                if !(1..=12).contains(&month) {
                    return Err(ConfigError::InvalidValue {
                        field: "quarters".to_string(),
                        reason: format!("month {} out of range", month),
                    });
                }
                seen[month as usize] += 1;
            }
        }
        for month in 1..=12usize {
            if seen[month] != 1 {
                return Err(ConfigError::InvalidValue {
                    field: "quarters".to_string(),
                    reason: format!("month {} assigned {} times", month, seen[month]),
                });
            }
        }

        if !(0.0..=1.0).contains(&config.pipeline.validation_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.validation_threshold".to_string(),
                reason: "must be within [0, 1]".to_string(),
            });
        }
        if config.pipeline.trigger_window_hours > config.pipeline.precheck_window_hours {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.trigger_window_hours".to_string(),
                reason: "trigger window must not be wider than the precheck window".to_string(),
            });
        }
        if config.pipeline.missed_window_grace_hours < 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.missed_window_grace_hours".to_string(),
                reason: "must not be negative".to_string(),
            });
        }
        if config.slot_grid.window_start_hour > 23 || config.slot_grid.step_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "slots".to_string(),
                reason: "window_start_hour must be 0-23 and step_minutes nonzero".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(ConfigManager::from_config(OrchestratorConfig::default()).is_ok());
    }

    #[test]
    fn duplicate_month_is_rejected() {
        let mut config = OrchestratorConfig::default();
        config.quarters[0].months = [11, 12, 2]; // 2 already lives in Q2
        let err = ConfigManager::from_config(config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn trigger_window_wider_than_precheck_is_rejected() {
        let mut config = OrchestratorConfig::default();
        config.pipeline.trigger_window_hours = 10;
        assert!(ConfigManager::from_config(config).is_err());
    }

    #[tokio::test]
    async fn toml_overrides_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orchestrator.toml");
        tokio::fs::write(
            &path,
            r#"
            webhook_url = "https://hooks.example.com/patches"
            maintenance_weekday = "tue"

            [slots]
            slot_capacity = 5
            "#,
        )
        .await
        .unwrap();

        let manager = ConfigManager::new(path.to_str().unwrap()).await.unwrap();
        let config = manager.get_current_config();
        assert_eq!(config.webhook_url, "https://hooks.example.com/patches");
        assert_eq!(config.maintenance_weekday, chrono::Weekday::Tue);
        assert_eq!(config.slot_grid.slot_capacity, 5);
        // Untouched values keep their defaults
        assert_eq!(config.slot_grid.step_minutes, 30);
    }
}
