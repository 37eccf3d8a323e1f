//! Caching admission policy.
//!
//! Not every computed result is worth keeping: errors and junk answers would
//! only serve stale garbage on a later hit.

/// Self-reported quality of a computed outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeQuality {
    Good,
    Fair,
    Poor,
}

/// What the admission gate needs to know about an outcome.
#[derive(Debug, Clone)]
pub struct OutcomeSummary {
    /// The computation reported an error.
    pub is_error: bool,
    /// Self-assessed quality.
    pub quality: OutcomeQuality,
    /// Number of useful items extracted.
    pub item_count: usize,
}

/// Admission gate: should this outcome be cached at all?
///
/// Rejects errors, poor-quality results, and empty results.
pub fn should_cache(outcome: &OutcomeSummary) -> bool {
    if outcome.is_error {
        return false;
    }
    if outcome.quality == OutcomeQuality::Poor {
        return false;
    }
    if outcome.item_count == 0 {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn good() -> OutcomeSummary {
        OutcomeSummary {
            is_error: false,
            quality: OutcomeQuality::Good,
            item_count: 2,
        }
    }

    #[test]
    fn test_good_outcome_is_cacheable() {
        assert!(should_cache(&good()));
    }

    #[test]
    fn test_errors_are_rejected() {
        let outcome = OutcomeSummary {
            is_error: true,
            ..good()
        };
        assert!(!should_cache(&outcome));
    }

    #[test]
    fn test_poor_quality_is_rejected() {
        let outcome = OutcomeSummary {
            quality: OutcomeQuality::Poor,
            ..good()
        };
        assert!(!should_cache(&outcome));

        // Fair quality still passes
        let outcome = OutcomeSummary {
            quality: OutcomeQuality::Fair,
            ..good()
        };
        assert!(should_cache(&outcome));
    }

    #[test]
    fn test_empty_results_are_rejected() {
        let outcome = OutcomeSummary {
            item_count: 0,
            ..good()
        };
        assert!(!should_cache(&outcome));
    }
}
