//! Money and quantity helpers on `rust_decimal::Decimal`.
//!
//! Amounts and quantities are plain `Decimal`s; these helpers centralize the
//! checked arithmetic and the epsilon comparison used wherever a denormalized
//! balance is compared against a journal-derived one.

use rust_decimal::Decimal;

use crate::error::{DomainError, DomainResult};

/// True when `a` and `b` differ by no more than `epsilon` (absolute).
pub fn within_epsilon(a: Decimal, b: Decimal, epsilon: Decimal) -> bool {
    (a - b).abs() <= epsilon
}

/// Checked `quantity * unit_price`.
pub fn line_total(quantity: Decimal, unit_price: Decimal) -> DomainResult<Decimal> {
    quantity.checked_mul(unit_price).ok_or_else(|| {
        DomainError::arithmetic(format!("line total overflow: {quantity} * {unit_price}"))
    })
}

/// Checked sum of an amount series.
pub fn checked_sum(amounts: impl IntoIterator<Item = Decimal>) -> DomainResult<Decimal> {
    let mut total = Decimal::ZERO;
    for amount in amounts {
        total = total
            .checked_add(amount)
            .ok_or_else(|| DomainError::arithmetic("amount sum overflow".to_string()))?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epsilon_comparison_is_symmetric() {
        let eps = Decimal::ONE;
        assert!(within_epsilon(
            Decimal::new(10050, 2),
            Decimal::new(10000, 2),
            eps
        ));
        assert!(within_epsilon(
            Decimal::new(10000, 2),
            Decimal::new(10050, 2),
            eps
        ));
        assert!(!within_epsilon(
            Decimal::new(10000, 2),
            Decimal::new(10150, 2),
            eps
        ));
    }

    #[test]
    fn line_total_multiplies() {
        let total = line_total(Decimal::new(3, 0), Decimal::new(550, 2)).unwrap();
        assert_eq!(total, Decimal::new(1650, 2));
    }

    #[test]
    fn checked_sum_accumulates() {
        let total = checked_sum([
            Decimal::new(100, 2),
            Decimal::new(250, 2),
            Decimal::new(-50, 2),
        ])
        .unwrap();
        assert_eq!(total, Decimal::new(300, 2));
    }
}
