use serde::{Deserialize, Serialize};

/// Why the evaluator decided to stop refining
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    /// Halting is worth more than continuing
    QualitySufficient,
    /// Tests pass and quality clears the early-exit bar
    EarlyExit,
    /// The iteration budget is spent; the result was not earned
    IterationCap,
}

impl HaltReason {
    /// Forced halts stop the loop without the artifact earning it
    pub fn is_forced(&self) -> bool {
        matches!(self, HaltReason::IterationCap)
    }
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HaltReason::QualitySufficient => f.write_str("quality sufficient"),
            HaltReason::EarlyExit => f.write_str("tests passing with adequate quality"),
            HaltReason::IterationCap => f.write_str("iteration cap reached (forced)"),
        }
    }
}

/// The evaluator's verdict for the current candidate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Decision {
    Halt {
        reason: HaltReason,
        halt_value: f64,
        continue_value: f64,
    },
    Continue {
        halt_value: f64,
        continue_value: f64,
    },
}

impl Decision {
    pub fn is_halt(&self) -> bool {
        matches!(self, Decision::Halt { .. })
    }

    pub fn is_continue(&self) -> bool {
        matches!(self, Decision::Continue { .. })
    }

    pub fn halt_reason(&self) -> Option<HaltReason> {
        match self {
            Decision::Halt { reason, .. } => Some(*reason),
            Decision::Continue { .. } => None,
        }
    }

    /// Get a short description of the decision for logging
    pub fn short_description(&self) -> String {
        match self {
            Decision::Halt {
                reason, halt_value, ..
            } => format!("HALT ({}, Q={:.3})", reason, halt_value),
            Decision::Continue { halt_value, .. } => format!("CONTINUE (Q={:.3})", halt_value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_cap_is_forced() {
        assert!(HaltReason::IterationCap.is_forced());
        assert!(!HaltReason::QualitySufficient.is_forced());
        assert!(!HaltReason::EarlyExit.is_forced());
    }

    #[test]
    fn test_short_description() {
        let halt = Decision::Halt {
            reason: HaltReason::QualitySufficient,
            halt_value: 0.9,
            continue_value: 0.1,
        };
        assert_eq!(halt.short_description(), "HALT (quality sufficient, Q=0.900)");
        assert_eq!(halt.halt_reason(), Some(HaltReason::QualitySufficient));

        let cont = Decision::Continue {
            halt_value: 0.4,
            continue_value: 0.6,
        };
        assert!(cont.is_continue());
        assert_eq!(cont.short_description(), "CONTINUE (Q=0.400)");
    }
}
