/* affect:meta
id: AFF-20261008-affect-statistics
intent: code
summary: Aggregates over the change history plus a short-window trend.
*/
use serde::Serialize;

use crate::state::ChangeRecord;

const TREND_WINDOW: usize = 5;
const TREND_THRESHOLD: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Rising,
    Falling,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectStatistics {
    pub current_progress: i32,
    pub total_changes: usize,
    pub positive_changes: usize,
    pub negative_changes: usize,
    pub average_change: f64,
    pub largest_increase: i32,
    pub largest_decrease: i32,
    pub recent_trend: Trend,
}

impl AffectStatistics {
    pub fn from_history(current_progress: i32, history: &[ChangeRecord]) -> Self {
        let changes: Vec<i32> = history.iter().map(|r| r.applied_delta).collect();
        let total: i64 = changes.iter().map(|c| i64::from(*c)).sum();
        let average_change = if changes.is_empty() {
            0.0
        } else {
            total as f64 / changes.len() as f64
        };
        Self {
            current_progress,
            total_changes: changes.len(),
            positive_changes: changes.iter().filter(|c| **c > 0).count(),
            negative_changes: changes.iter().filter(|c| **c < 0).count(),
            average_change,
            largest_increase: changes.iter().copied().max().unwrap_or(0).max(0),
            largest_decrease: changes.iter().copied().min().unwrap_or(0).min(0),
            recent_trend: recent_trend(history),
        }
    }
}

pub fn recent_trend(history: &[ChangeRecord]) -> Trend {
    let start = history.len().saturating_sub(TREND_WINDOW);
    let sum: i64 = history[start..]
        .iter()
        .map(|r| i64::from(r.applied_delta))
        .sum();
    if sum > TREND_THRESHOLD {
        Trend::Rising
    } else if sum < -TREND_THRESHOLD {
        Trend::Falling
    } else {
        Trend::Stable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Metadata;
    use chrono::Utc;

    fn record(delta: i32) -> ChangeRecord {
        ChangeRecord {
            timestamp: Utc::now(),
            value_before: 0,
            value_after: delta,
            applied_delta: delta,
            requested_delta: i64::from(delta),
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn empty_history_is_stable_and_zeroed() {
        let stats = AffectStatistics::from_history(0, &[]);
        assert_eq!(stats.total_changes, 0);
        assert_eq!(stats.average_change, 0.0);
        assert_eq!(stats.recent_trend, Trend::Stable);
    }

    #[test]
    fn counts_extremes_and_trend() {
        let history: Vec<_> = [5, -3, 2, 1, -1].into_iter().map(record).collect();
        let stats = AffectStatistics::from_history(4, &history);
        assert_eq!(stats.positive_changes, 3);
        assert_eq!(stats.negative_changes, 2);
        assert_eq!(stats.largest_increase, 5);
        assert_eq!(stats.largest_decrease, -3);
        assert!((stats.average_change - 0.8).abs() < f64::EPSILON);
        assert_eq!(stats.recent_trend, Trend::Rising);
    }

    #[test]
    fn trend_only_looks_at_last_five() {
        let history: Vec<_> = [40, -1, -1, -1, 0, -1].into_iter().map(record).collect();
        assert_eq!(recent_trend(&history), Trend::Falling);
    }
}
