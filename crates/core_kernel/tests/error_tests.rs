//! Tests for core_kernel error types

use core_kernel::error::CoreError;
use core_kernel::money::MoneyError;
use core_kernel::{ClaimId, UserId};

#[test]
fn test_identifier_parse_failure_is_validation() {
    let err = "CLM-12345".parse::<ClaimId>().unwrap_err();

    match err {
        CoreError::Validation(msg) => {
            assert!(msg.contains("ClaimId"));
            assert!(msg.contains("CLM-12345"));
        }
        other => panic!("Expected Validation error, got {:?}", other),
    }
}

#[test]
fn test_foreign_prefix_is_rejected() {
    let user = UserId::new().to_string();
    assert!(user.parse::<ClaimId>().is_err());
}

#[test]
fn test_core_error_from_money_error() {
    let money_error = MoneyError::CurrencyMismatch("USD".to_string(), "EUR".to_string());
    let core_error: CoreError = money_error.into();

    assert!(matches!(core_error, CoreError::Money(_)));
    assert!(core_error.to_string().contains("USD"));
}
