//! Custom Test Assertions
//!
//! Assertion helpers for claims that report which field broke an invariant.

use core_kernel::Money;
use domain_claims::claim::Claim;
use rust_decimal::Decimal;

/// Asserts that two Money values are approximately equal within a tolerance
///
/// # Panics
///
/// Panics if the currencies don't match or the amounts differ by more than tolerance
pub fn assert_money_approx_eq(actual: &Money, expected: &Money, tolerance: Decimal) {
    assert_eq!(
        actual.currency(),
        expected.currency(),
        "Currency mismatch: actual={}, expected={}",
        actual.currency(),
        expected.currency()
    );

    let diff = (actual.amount() - expected.amount()).abs();
    assert!(
        diff <= tolerance,
        "Money amounts differ by more than tolerance: actual={}, expected={}, diff={}, tolerance={}",
        actual.amount(),
        expected.amount(),
        diff,
        tolerance
    );
}

/// Asserts that a Money value is zero
pub fn assert_money_zero(money: &Money) {
    assert!(money.is_zero(), "Expected zero money, got {}", money);
}

/// Asserts that a score lies in [0, 1]
pub fn assert_unit_score(name: &str, score: f64) {
    assert!(
        (0.0..=1.0).contains(&score),
        "{} = {} is outside [0, 1]",
        name,
        score
    );
}

/// Asserts the stored score and cost bounds of a claim
pub fn assert_claim_scores_bounded(claim: &Claim) {
    assert_unit_score("damage_score", claim.damage_score);
    assert_unit_score("fraud_score", claim.fraud_score);
    assert!(
        !claim.cost_estimate.is_negative(),
        "cost_estimate {} is negative",
        claim.cost_estimate
    );
    for image in &claim.images {
        if let Some(damage) = &image.ai_analysis.damage {
            assert_unit_score("image damage_score", damage.damage_score);
        }
        if let Some(fraud) = &image.ai_analysis.fraud {
            assert_unit_score("image fraud_score", fraud.fraud_score);
        }
    }
}

/// Asserts that the audit trail is a connected chain ending at the current
/// status, and that snapshot revisions count up from 1
pub fn assert_history_consistent(claim: &Claim) {
    for pair in claim.audit_trail.windows(2) {
        assert_eq!(
            pair[0].to_status, pair[1].from_status,
            "audit trail breaks between {:?} and {:?}",
            pair[0].id, pair[1].id
        );
    }
    if let Some(last) = claim.audit_trail.last() {
        assert_eq!(
            last.to_status, claim.status,
            "last audit entry ends at {} but claim is {}",
            last.to_status, claim.status
        );
    }
    for (i, snapshot) in claim.analysis_history.iter().enumerate() {
        assert_eq!(
            snapshot.revision as usize,
            i + 1,
            "snapshot revisions are not sequential"
        );
    }
}

/// Asserts that a result is Ok and returns the value
#[macro_export]
macro_rules! assert_ok {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
    ($result:expr, $msg:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("{}: {:?}", $msg, e),
        }
    };
}

/// Asserts that an error matches a specific variant
#[macro_export]
macro_rules! assert_err_variant {
    ($result:expr, $pattern:pat) => {
        match $result {
            Ok(value) => panic!("Expected Err matching {}, got Ok({:?})", stringify!($pattern), value),
            Err(ref e) => {
                assert!(
                    matches!(e, $pattern),
                    "Error {:?} does not match pattern {}",
                    e,
                    stringify!($pattern)
                );
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::NewClaimBuilder;
    use core_kernel::{Currency, UserId};
    use domain_claims::claim::ClaimStatus;
    use domain_claims::ClaimError;
    use rust_decimal_macros::dec;

    #[test]
    fn test_assert_money_approx_eq_passes() {
        let m1 = Money::new(dec!(100.001), Currency::USD);
        let m2 = Money::new(dec!(100.002), Currency::USD);
        assert_money_approx_eq(&m1, &m2, dec!(0.01));
    }

    #[test]
    #[should_panic(expected = "Currency mismatch")]
    fn test_assert_money_approx_eq_currency_mismatch() {
        let m1 = Money::new(dec!(100.00), Currency::USD);
        let m2 = Money::new(dec!(100.00), Currency::EUR);
        assert_money_approx_eq(&m1, &m2, dec!(0.01));
    }

    #[test]
    #[should_panic(expected = "outside [0, 1]")]
    fn test_unit_score_rejects_overflow() {
        assert_unit_score("fraud_score", 1.2);
    }

    #[test]
    fn test_fresh_claim_is_consistent() {
        let claim = NewClaimBuilder::new(UserId::new()).build_claim();
        assert_claim_scores_bounded(&claim);
        assert_history_consistent(&claim);
        assert_money_zero(&claim.cost_estimate);
        assert_eq!(claim.status, ClaimStatus::Pending);
    }

    #[test]
    fn test_err_variant_macro() {
        let result: Result<(), ClaimError> = Err(ClaimError::NoImages("CLM-1".into()));
        assert_err_variant!(result, ClaimError::NoImages(_));
    }
}
