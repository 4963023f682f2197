use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BudgetError {
    #[error("Invalid budget: max_iterations must be greater than zero")]
    ZeroIterations,

    #[error("Invalid budget: max_cost must be a positive finite number, got {0}")]
    InvalidCost(f64),

    #[error("Invalid budget: max_duration must be greater than zero")]
    ZeroDuration,
}

/// Resource limits for a single run. Fixed at run start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BudgetSpec", into = "BudgetSpec")]
pub struct RunBudget {
    max_iterations: u32,
    max_cost: f64,
    max_duration: Duration,
}

/// Unvalidated wire form of [`RunBudget`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetSpec {
    max_iterations: u32,
    max_cost: f64,
    #[serde(with = "humantime_serde")]
    max_duration: Duration,
}

impl RunBudget {
    pub fn new(
        max_iterations: u32,
        max_cost: f64,
        max_duration: Duration,
    ) -> Result<Self, BudgetError> {
        if max_iterations == 0 {
            return Err(BudgetError::ZeroIterations);
        }
        if !max_cost.is_finite() || max_cost <= 0.0 {
            return Err(BudgetError::InvalidCost(max_cost));
        }
        if max_duration.is_zero() {
            return Err(BudgetError::ZeroDuration);
        }
        Ok(Self {
            max_iterations,
            max_cost,
            max_duration,
        })
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn max_cost(&self) -> f64 {
        self.max_cost
    }

    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }

    /// Time left before `max_duration` is reached
    pub fn remaining_time(&self, elapsed: Duration) -> Duration {
        self.max_duration.saturating_sub(elapsed)
    }
}

impl TryFrom<BudgetSpec> for RunBudget {
    type Error = BudgetError;

    fn try_from(raw: BudgetSpec) -> Result<Self, Self::Error> {
        RunBudget::new(raw.max_iterations, raw.max_cost, raw.max_duration)
    }
}

impl From<RunBudget> for BudgetSpec {
    fn from(budget: RunBudget) -> Self {
        Self {
            max_iterations: budget.max_iterations,
            max_cost: budget.max_cost,
            max_duration: budget.max_duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_budget() {
        let budget = RunBudget::new(5, 2.5, Duration::from_secs(60)).unwrap();
        assert_eq!(budget.max_iterations(), 5);
        assert_eq!(budget.max_cost(), 2.5);
        assert_eq!(budget.max_duration(), Duration::from_secs(60));
    }

    #[test]
    fn test_rejects_non_positive_values() {
        assert_eq!(
            RunBudget::new(0, 1.0, Duration::from_secs(1)),
            Err(BudgetError::ZeroIterations)
        );
        assert!(matches!(
            RunBudget::new(1, 0.0, Duration::from_secs(1)),
            Err(BudgetError::InvalidCost(_))
        ));
        assert!(matches!(
            RunBudget::new(1, -3.0, Duration::from_secs(1)),
            Err(BudgetError::InvalidCost(_))
        ));
        assert!(matches!(
            RunBudget::new(1, f64::INFINITY, Duration::from_secs(1)),
            Err(BudgetError::InvalidCost(_))
        ));
        assert_eq!(
            RunBudget::new(1, 1.0, Duration::ZERO),
            Err(BudgetError::ZeroDuration)
        );
    }

    #[test]
    fn test_remaining_time_saturates() {
        let budget = RunBudget::new(1, 1.0, Duration::from_secs(10)).unwrap();
        assert_eq!(budget.remaining_time(Duration::from_secs(4)), Duration::from_secs(6));
        assert_eq!(budget.remaining_time(Duration::from_secs(40)), Duration::ZERO);
    }

    #[test]
    fn test_deserialize_validates() {
        let budget: RunBudget =
            toml::from_str("max_iterations = 3\nmax_cost = 1.5\nmax_duration = \"2m\"").unwrap();
        assert_eq!(budget.max_duration(), Duration::from_secs(120));

        let invalid: Result<RunBudget, _> =
            toml::from_str("max_iterations = 0\nmax_cost = 1.5\nmax_duration = \"2m\"");
        assert!(invalid.is_err());
    }
}
