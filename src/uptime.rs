//! # Gap-aware uptime calculator (C6)
//!
//! Pure function over an ordered outcome stream, no I/O. See spec.md §4.6
//! for the session-partitioning algorithm and §8 scenario 4 for a worked
//! example this module's tests reproduce.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ProbeOutcome;

/// The six supported windows, named exactly as spec.md §4.6 lists them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    ThreeHours,
    SixHours,
    OneDay,
    SevenDays,
    ThirtyDays,
    ThreeSixtyFiveDays,
}

impl Window {
    pub fn duration(self) -> Duration {
        let hours = match self {
            Window::ThreeHours => 3,
            Window::SixHours => 6,
            Window::OneDay => 24,
            Window::SevenDays => 24 * 7,
            Window::ThirtyDays => 24 * 30,
            Window::ThreeSixtyFiveDays => 24 * 365,
        };
        Duration::from_secs(hours * 3600)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UptimeReport {
    pub uptime_percent: f64,
    pub monitoring_coverage_percent: f64,
    pub avg_response_time_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub stddev_ms: f64,
    pub mad_ms: f64,
}

impl UptimeReport {
    fn empty() -> Self {
        Self {
            uptime_percent: 0.0,
            monitoring_coverage_percent: 0.0,
            avg_response_time_ms: 0.0,
            p50_ms: 0.0,
            p90_ms: 0.0,
            p95_ms: 0.0,
            p99_ms: 0.0,
            stddev_ms: 0.0,
            mad_ms: 0.0,
        }
    }
}

struct Session {
    duration_ms: f64,
    up_count: usize,
    total_count: usize,
}

/// Split the (already time-ordered) outcome stream into sessions where the
/// gap between adjacent outcomes exceeds `2.5 × interval`.
fn partition_sessions(outcomes: &[ProbeOutcome], interval_ms: f64) -> Vec<Session> {
    if outcomes.is_empty() {
        return Vec::new();
    }
    let gap_threshold_ms = 2.5 * interval_ms;
    let mut sessions = Vec::new();
    let mut start_idx = 0;

    for i in 1..outcomes.len() {
        let gap_ms = (outcomes[i].timestamp - outcomes[i - 1].timestamp)
            .num_milliseconds() as f64;
        if gap_ms > gap_threshold_ms {
            sessions.push(build_session(&outcomes[start_idx..i], interval_ms));
            start_idx = i;
        }
    }
    sessions.push(build_session(&outcomes[start_idx..], interval_ms));
    sessions
}

fn build_session(outcomes: &[ProbeOutcome], interval_ms: f64) -> Session {
    let total_count = outcomes.len();
    let up_count = outcomes.iter().filter(|o| o.status == crate::types::Status::Up).count();
    let duration_ms = if total_count >= 2 {
        let span_ms = (outcomes[total_count - 1].timestamp - outcomes[0].timestamp)
            .num_milliseconds() as f64;
        span_ms + interval_ms
    } else {
        interval_ms
    };
    Session {
        duration_ms,
        up_count,
        total_count,
    }
}

/// Compute uptime, coverage, and response-time statistics for `outcomes`
/// (already filtered to a window and sorted ascending by timestamp).
pub fn compute_uptime(outcomes: &[ProbeOutcome], interval: Duration, window: Duration) -> UptimeReport {
    if outcomes.is_empty() {
        return UptimeReport::empty();
    }

    let interval_ms = interval.as_secs_f64() * 1000.0;
    let window_ms = window.as_secs_f64() * 1000.0;

    let sessions = partition_sessions(outcomes, interval_ms);
    let mut total_session_duration_ms = 0.0;
    let mut total_session_uptime_ms = 0.0;
    for session in &sessions {
        let ratio = if session.total_count > 0 {
            session.up_count as f64 / session.total_count as f64
        } else {
            0.0
        };
        total_session_duration_ms += session.duration_ms;
        total_session_uptime_ms += session.duration_ms * ratio;
    }

    let uptime_percent = if total_session_duration_ms > 0.0 {
        (total_session_uptime_ms / total_session_duration_ms * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };
    let monitoring_coverage_percent = if window_ms > 0.0 {
        (total_session_duration_ms / window_ms * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };

    let mut response_times: Vec<f64> = outcomes.iter().map(|o| o.response_time_ms).collect();
    let avg_response_time_ms = response_times.iter().sum::<f64>() / response_times.len() as f64;
    response_times.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let p50_ms = percentile(&response_times, 50.0);
    let p90_ms = percentile(&response_times, 90.0);
    let p95_ms = percentile(&response_times, 95.0);
    let p99_ms = percentile(&response_times, 99.0);
    let stddev_ms = sample_stddev(&response_times, avg_response_time_ms);
    let mad_ms = median_absolute_deviation(&response_times);

    UptimeReport {
        uptime_percent,
        monitoring_coverage_percent,
        avg_response_time_ms,
        p50_ms,
        p90_ms,
        p95_ms,
        p99_ms,
        stddev_ms,
        mad_ms,
    }
}

/// Outcomes within `[now - window, now]`, used by the caller before handing
/// the slice to `compute_uptime`.
pub fn window_cutoff(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    now - chrono::Duration::from_std(window).unwrap_or_default()
}

/// Linear-interpolation percentile over a sorted slice.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = (pct / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let frac = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

fn sample_stddev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

fn median(sorted: &[f64]) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn median_absolute_deviation(sorted: &[f64]) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let med = median(sorted);
    let mut deviations: Vec<f64> = sorted.iter().map(|v| (v - med).abs()).collect();
    deviations.sort_by(|a, b| a.partial_cmp(b).unwrap());
    median(&deviations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EndpointKind, InstanceId, Status};
    use chrono::TimeZone;

    fn outcome_at(seconds: i64, status: Status) -> ProbeOutcome {
        let ts = Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap();
        ProbeOutcome::new(
            1,
            InstanceId::new(),
            ts,
            status == Status::Up,
            100.0,
            "us".into(),
            EndpointKind::Http,
            None,
            None,
        )
    }

    #[test]
    fn constant_up_is_100_percent() {
        let outcomes: Vec<_> = (0..10).map(|i| outcome_at(i * 10, Status::Up)).collect();
        let report = compute_uptime(&outcomes, Duration::from_secs(10), Duration::from_secs(1000));
        assert!((report.uptime_percent - 100.0).abs() < 1e-6);
    }

    #[test]
    fn constant_down_is_0_percent() {
        let outcomes: Vec<_> = (0..10).map(|i| outcome_at(i * 10, Status::Down)).collect();
        let report = compute_uptime(&outcomes, Duration::from_secs(10), Duration::from_secs(1000));
        assert!(report.uptime_percent.abs() < 1e-6);
    }

    #[test]
    fn alternating_is_roughly_50_percent() {
        let outcomes: Vec<_> = (0..20)
            .map(|i| {
                let status = if i % 2 == 0 { Status::Up } else { Status::Down };
                outcome_at(i * 10, status)
            })
            .collect();
        let report = compute_uptime(&outcomes, Duration::from_secs(10), Duration::from_secs(1000));
        assert!((report.uptime_percent - 50.0).abs() < 5.0);
    }

    #[test]
    fn empty_window_is_all_zero() {
        let report = compute_uptime(&[], Duration::from_secs(60), Duration::from_secs(86400));
        assert_eq!(report, UptimeReport::empty());
    }

    #[test]
    fn gap_aware_scenario_from_spec() {
        // spec.md §8 scenario 4: interval 60s, outcomes at
        // t=0,60,120,180,300,360,420 with UP,UP,UP,UP,DOWN,UP,UP.
        let times = [0, 60, 120, 180, 300, 360, 420];
        let statuses = [
            Status::Up,
            Status::Up,
            Status::Up,
            Status::Up,
            Status::Down,
            Status::Up,
            Status::Up,
        ];
        let outcomes: Vec<_> = times
            .iter()
            .zip(statuses.iter())
            .map(|(t, s)| outcome_at(*t, *s))
            .collect();
        let report = compute_uptime(&outcomes, Duration::from_secs(60), Duration::from_secs(86400));
        assert!((report.uptime_percent - 85.71).abs() < 0.1);
        assert!((report.monitoring_coverage_percent - 0.5556).abs() < 0.01);
    }
}
