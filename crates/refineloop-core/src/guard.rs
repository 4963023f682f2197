//! Detection of non-productive runs.
//!
//! [`LoopGuard::check`] is a pure function of the history, the budget and the
//! elapsed time passed in by the caller. It never reads the clock.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use refineloop_critic::RunBudget;

use crate::{IterationRecord, RunStatus};

/// Numeric thresholds used by the guard
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GuardThresholds {
    /// Number of trailing records inspected for stagnation and degradation
    pub window: usize,
    /// Sample variance below which quality is considered flat
    pub stagnation_variance: f64,
    /// Quality below which a run that reached `low_quality_after` iterations is abandoned
    pub low_quality_floor: f64,
    pub low_quality_after: u32,
    /// How many earlier feedback payloads the latest one is compared against
    pub cycle_lookback: usize,
}

impl Default for GuardThresholds {
    fn default() -> Self {
        Self {
            window: 3,
            stagnation_variance: 0.001,
            low_quality_floor: 0.60,
            low_quality_after: 3,
            cycle_lookback: 2,
        }
    }
}

/// Which check fired, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardTrip {
    IterationCap,
    CostOverrun,
    TimeOverrun,
    Stagnation,
    Degradation,
    LowQuality,
    Cycling,
}

impl GuardTrip {
    /// Terminal status the orchestrator moves to when this check fires.
    /// The iteration cap is a forced halt, not an abort.
    pub fn status(&self) -> RunStatus {
        match self {
            GuardTrip::IterationCap => RunStatus::HaltedSuccess,
            GuardTrip::CostOverrun | GuardTrip::TimeOverrun => RunStatus::AbortedBudget,
            GuardTrip::Stagnation => RunStatus::AbortedStagnant,
            GuardTrip::Degradation => RunStatus::AbortedDegrading,
            GuardTrip::LowQuality => RunStatus::AbortedLowQuality,
            GuardTrip::Cycling => RunStatus::AbortedCycling,
        }
    }
}

impl std::fmt::Display for GuardTrip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GuardTrip::IterationCap => "iteration cap",
            GuardTrip::CostOverrun => "cost overrun",
            GuardTrip::TimeOverrun => "time overrun",
            GuardTrip::Stagnation => "stagnation",
            GuardTrip::Degradation => "degradation",
            GuardTrip::LowQuality => "low-quality plateau",
            GuardTrip::Cycling => "feedback cycling",
        };
        f.write_str(name)
    }
}

/// A fired check plus a human-readable explanation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardAbort {
    pub trip: GuardTrip,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GuardVerdict {
    Continue,
    Abort(GuardAbort),
}

impl GuardVerdict {
    pub fn trip(&self) -> Option<GuardTrip> {
        match self {
            GuardVerdict::Continue => None,
            GuardVerdict::Abort(abort) => Some(abort.trip),
        }
    }

    fn abort(trip: GuardTrip, detail: String) -> Self {
        GuardVerdict::Abort(GuardAbort { trip, detail })
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoopGuard {
    thresholds: GuardThresholds,
}

impl LoopGuard {
    pub fn new(thresholds: GuardThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &GuardThresholds {
        &self.thresholds
    }

    /// Run every check in priority order; the first to fire wins
    pub fn check(
        &self,
        history: &[IterationRecord],
        budget: &RunBudget,
        elapsed: Duration,
    ) -> GuardVerdict {
        let completed = history.len() as u32;
        if completed >= budget.max_iterations() {
            return GuardVerdict::abort(
                GuardTrip::IterationCap,
                format!(
                    "{} of {} iterations used",
                    completed,
                    budget.max_iterations()
                ),
            );
        }

        let spent: f64 = history.iter().map(|r| r.cost).sum();
        if spent > budget.max_cost() {
            return GuardVerdict::abort(
                GuardTrip::CostOverrun,
                format!("spent {:.4} of {:.4}", spent, budget.max_cost()),
            );
        }

        if elapsed > budget.max_duration() {
            return GuardVerdict::abort(
                GuardTrip::TimeOverrun,
                format!(
                    "ran {:.1}s of {:.1}s",
                    elapsed.as_secs_f64(),
                    budget.max_duration().as_secs_f64()
                ),
            );
        }

        if let Some(window) = self.quality_window(history) {
            let variance = sample_variance(&window);
            if variance < self.thresholds.stagnation_variance {
                return GuardVerdict::abort(
                    GuardTrip::Stagnation,
                    format!(
                        "quality variance {:.6} over last {} iterations",
                        variance,
                        window.len()
                    ),
                );
            }

            if window.windows(2).all(|pair| pair[0] >= pair[1]) {
                return GuardVerdict::abort(
                    GuardTrip::Degradation,
                    format!("quality fell {}", format_trend(&window)),
                );
            }
        }

        if let Some(latest) = history.last() {
            let quality = latest.overall_quality();
            if completed >= self.thresholds.low_quality_after
                && quality < self.thresholds.low_quality_floor
            {
                return GuardVerdict::abort(
                    GuardTrip::LowQuality,
                    format!(
                        "quality {:.3} below {:.2} after {} iterations",
                        quality, self.thresholds.low_quality_floor, completed
                    ),
                );
            }

            let fingerprint = latest.feedback_fingerprint();
            let earlier = &history[..history.len() - 1];
            if let Some(repeat) = earlier
                .iter()
                .rev()
                .take(self.thresholds.cycle_lookback)
                .find(|r| r.feedback_fingerprint() == fingerprint)
            {
                return GuardVerdict::abort(
                    GuardTrip::Cycling,
                    format!(
                        "feedback for iteration {} repeats iteration {}",
                        latest.iteration, repeat.iteration
                    ),
                );
            }
        }

        GuardVerdict::Continue
    }

    /// Trailing `window` qualities, oldest first, once enough history exists
    fn quality_window(&self, history: &[IterationRecord]) -> Option<Vec<f64>> {
        let window = self.thresholds.window;
        if window < 2 || history.len() < window {
            return None;
        }
        Some(
            history[history.len() - window..]
                .iter()
                .map(IterationRecord::overall_quality)
                .collect(),
        )
    }
}

/// Unbiased (n - 1) variance
fn sample_variance(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)
}

fn format_trend(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format!("{:.3}", v))
        .collect::<Vec<_>>()
        .join(" -> ")
}
