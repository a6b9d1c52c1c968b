//! Solve status classification.

use serde::{Deserialize, Serialize};

use crate::facade::SolveOutcome;

/// Result of running the constraint solver over a sketch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SolveStatus {
    /// All constraints satisfied, zero degrees of freedom.
    FullyConstrained,
    /// All constraints satisfied, but geometry can still move.
    UnderConstrained { dof: u32 },
    /// Constraints are contradictory; the offenders are listed.
    OverConstrained { conflicts: Vec<usize> },
    /// Solver failed to converge.
    Failed { reason: String },
}

/// Classify a solve outcome into a status. A negative DoF or a non-empty
/// conflict list surfaces as over-constrained; the sketch stays editable
/// either way.
pub fn classify_status(outcome: &SolveOutcome) -> SolveStatus {
    if !outcome.conflicting.is_empty() || outcome.dof < 0 {
        return SolveStatus::OverConstrained {
            conflicts: outcome.conflicting.clone(),
        };
    }
    if outcome.dof == 0 {
        SolveStatus::FullyConstrained
    } else {
        SolveStatus::UnderConstrained {
            dof: outcome.dof as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let mut outcome = SolveOutcome::default();
        outcome.dof = 3;
        assert_eq!(
            classify_status(&outcome),
            SolveStatus::UnderConstrained { dof: 3 }
        );
        outcome.dof = 0;
        assert_eq!(classify_status(&outcome), SolveStatus::FullyConstrained);
        outcome.conflicting = vec![1, 4];
        assert_eq!(
            classify_status(&outcome),
            SolveStatus::OverConstrained {
                conflicts: vec![1, 4]
            }
        );
    }
}
