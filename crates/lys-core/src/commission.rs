//! # Commission
//!
//! What a code's owner earns on an attributed order.
//!
//! ```text
//! Percentage { bps }  →  order_value × bps / 10000   (rounded half-up)
//! Fixed { cents }     →  cents, regardless of order value
//! no terms            →  0
//! ```

use crate::money::Money;
use crate::types::{CommissionTerms, MAX_PERCENTAGE_BPS};

/// Commission owed on an order of `order_value`.
pub fn commission_for(terms: Option<CommissionTerms>, order_value: Money) -> Money {
    match terms {
        Some(CommissionTerms::Percentage { bps }) => {
            order_value.non_negative().percentage(bps.min(MAX_PERCENTAGE_BPS))
        }
        Some(CommissionTerms::Fixed { cents }) => Money::from_cents(cents).non_negative(),
        None => Money::zero(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_commission() {
        let terms = CommissionTerms::Percentage { bps: 1000 };
        assert_eq!(commission_for(Some(terms), Money::from_cents(12000)).cents(), 1200);
    }

    #[test]
    fn test_fixed_commission_ignores_order_value() {
        let terms = CommissionTerms::Fixed { cents: 500 };
        assert_eq!(commission_for(Some(terms), Money::from_cents(100)).cents(), 500);
        assert_eq!(commission_for(Some(terms), Money::from_cents(100_000)).cents(), 500);
    }

    #[test]
    fn test_percentage_commission_never_exceeds_order() {
        let terms = CommissionTerms::Percentage { bps: 12_000 };
        assert_eq!(commission_for(Some(terms), Money::from_cents(4000)).cents(), 4000);
    }

    #[test]
    fn test_no_terms_no_commission() {
        assert_eq!(commission_for(None, Money::from_cents(5000)), Money::zero());
    }
}
