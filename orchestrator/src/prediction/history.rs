//! Bounded-retention load history
//!
//! Keeps one server's samples inside a rolling horizon and reduces them
//! to average utilization per hour-of-day, which is all the
//! recommendation logic needs.

use chrono::{DateTime, Duration, Timelike, Utc};

use crate::metrics::LoadSample;

#[derive(Debug, Clone)]
pub struct LoadHistory {
    samples: Vec<LoadSample>,
    retention: Duration,
}

impl LoadHistory {
    pub fn new(retention_days: i64) -> Self {
        Self {
            samples: Vec::new(),
            retention: Duration::days(retention_days),
        }
    }

    /// Build a history from collector output, dropping anything already
    /// past the retention horizon.
    pub fn from_samples(samples: Vec<LoadSample>, retention_days: i64) -> Self {
        let mut history = Self::new(retention_days);
        for sample in samples {
            history.push(sample);
        }
        history.prune(Utc::now());
        history
    }

    pub fn push(&mut self, sample: LoadSample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Drop samples older than the retention horizon.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.retention;
        let before = self.samples.len();
        self.samples.retain(|sample| sample.recorded_at >= cutoff);
        before - self.samples.len()
    }

    /// Average CPU utilization per hour-of-day over the retained window.
    /// Hours with no samples are None.
    pub fn hourly_averages(&self) -> [Option<f64>; 24] {
        let mut sums = [0.0f64; 24];
        let mut counts = [0u32; 24];

        for sample in &self.samples {
            let hour = sample.recorded_at.hour() as usize;
            sums[hour] += sample.cpu_percent;
            counts[hour] += 1;
        }

        let mut averages = [None; 24];
        for hour in 0..24 {
            if counts[hour] > 0 {
                averages[hour] = Some(sums[hour] / counts[hour] as f64);
            }
        }
        averages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(hours_ago: i64, cpu: f64) -> LoadSample {
        LoadSample {
            recorded_at: Utc::now() - Duration::hours(hours_ago),
            cpu_percent: cpu,
            process_count: 100,
            active_sessions: 1,
        }
    }

    #[test]
    fn prune_drops_samples_past_the_horizon() {
        let mut history = LoadHistory::new(30);
        history.push(sample(31 * 24, 50.0));
        history.push(sample(2, 20.0));

        let dropped = history.prune(Utc::now());
        assert_eq!(dropped, 1);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn from_samples_discards_out_of_horizon_samples() {
        let history = LoadHistory::from_samples(
            vec![sample(60 * 24, 95.0), sample(45 * 24, 90.0), sample(3, 15.0)],
            30,
        );
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn hourly_averages_group_by_hour_of_day() {
        let at = Utc::now()
            .date_naive()
            .and_hms_opt(21, 0, 0)
            .unwrap()
            .and_utc();
        let mut history = LoadHistory::new(30);
        for (days_ago, cpu) in [(1, 10.0), (2, 20.0), (3, 30.0)] {
            history.push(LoadSample {
                recorded_at: at - Duration::days(days_ago),
                cpu_percent: cpu,
                process_count: 100,
                active_sessions: 0,
            });
        }

        let averages = history.hourly_averages();
        assert_eq!(averages[21], Some(20.0));
        assert_eq!(averages[3], None);
    }
}
