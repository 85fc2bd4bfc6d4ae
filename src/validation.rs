//! Double-entry validation for candidate entry sets.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;

use crate::models::EntryDraft;

/// Tolerance for the debit/credit comparison. Amounts are decimals so
/// generator output is exact, but callers may hand-build entry sets from
/// values that arrived as floats.
pub const BALANCE_EPSILON: Decimal = dec!(0.01);

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("unbalanced entry set: debits {debits} != credits {credits}")]
    Unbalanced { debits: Decimal, credits: Decimal },

    #[error("entry {index} ({account_code}): debit must be non-negative, got {amount}")]
    NegativeDebit {
        index: usize,
        account_code: String,
        amount: Decimal,
    },

    #[error("entry {index} ({account_code}): credit must be non-negative, got {amount}")]
    NegativeCredit {
        index: usize,
        account_code: String,
        amount: Decimal,
    },
}

/// Checks that total debits equal total credits within [`BALANCE_EPSILON`]
/// and that no single leg is negative. An empty set is valid and signals
/// "nothing to post".
pub fn validate_balanced(entries: &[EntryDraft]) -> Result<(), ValidationError> {
    let mut debits = Decimal::ZERO;
    let mut credits = Decimal::ZERO;

    for (index, entry) in entries.iter().enumerate() {
        if entry.debit < Decimal::ZERO {
            return Err(ValidationError::NegativeDebit {
                index,
                account_code: entry.account_code.clone(),
                amount: entry.debit,
            });
        }
        if entry.credit < Decimal::ZERO {
            return Err(ValidationError::NegativeCredit {
                index,
                account_code: entry.account_code.clone(),
                amount: entry.credit,
            });
        }
        debits += entry.debit;
        credits += entry.credit;
    }

    if (debits - credits).abs() > BALANCE_EPSILON {
        return Err(ValidationError::Unbalanced { debits, credits });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_set_is_accepted() {
        let entries = vec![
            EntryDraft::debit("1001", dec!(105.00), "test"),
            EntryDraft::credit("1010-001", dec!(100.00), "test"),
            EntryDraft::credit("4010-001", dec!(5.00), "test"),
        ];
        validate_balanced(&entries).unwrap();
    }

    #[test]
    fn empty_set_is_accepted() {
        validate_balanced(&[]).unwrap();
    }

    #[test]
    fn unbalanced_set_is_rejected() {
        let entries = vec![
            EntryDraft::debit("1001", dec!(100.00), "test"),
            EntryDraft::credit("1010-001", dec!(90.00), "test"),
        ];
        let err = validate_balanced(&entries).unwrap_err();
        assert_eq!(
            err,
            ValidationError::Unbalanced {
                debits: dec!(100.00),
                credits: dec!(90.00)
            }
        );
    }

    #[test]
    fn rounding_within_epsilon_is_accepted() {
        let entries = vec![
            EntryDraft::debit("1001", dec!(33.33), "test"),
            EntryDraft::credit("1010-001", dec!(33.34), "test"),
        ];
        validate_balanced(&entries).unwrap();
    }

    #[test]
    fn negative_leg_is_rejected() {
        let entries = vec![
            EntryDraft::debit("1001", dec!(-5.00), "test"),
            EntryDraft::credit("1010-001", dec!(-5.00), "test"),
        ];
        assert!(matches!(
            validate_balanced(&entries),
            Err(ValidationError::NegativeDebit { .. })
        ));
    }
}
