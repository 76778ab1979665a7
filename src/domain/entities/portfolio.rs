use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::domain::errors::EngineError;

/// A user's holding of a single instrument: share count plus weighted-average
/// cost basis. A position with zero quantity is never persisted; the row is
/// removed instead, so `average_price > 0` whenever a position exists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub user_id: String,
    pub symbol: String,
    pub quantity: i64,
    pub average_price: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// Result of applying a sell to a position.
#[derive(Debug, Clone, PartialEq)]
pub enum SellOutcome {
    /// Position remains open with the given quantity.
    Reduced(i64),
    /// Quantity reached zero; the position row must be removed.
    Closed,
}

impl Position {
    /// Fold a new purchase into the weighted-average cost basis.
    ///
    /// `new_avg = (old_qty*old_avg + qty*price) / (old_qty+qty)`, rounded to
    /// currency precision. Sells never touch the average, so realized P/L is
    /// always computed against the pre-sale basis.
    pub fn apply_buy(&mut self, quantity: i64, price: Decimal) {
        let old_qty = Decimal::from(self.quantity);
        let added_qty = Decimal::from(quantity);
        let total_value = old_qty * self.average_price + added_qty * price;
        let total_qty = old_qty + added_qty;

        self.average_price = round_money(total_value / total_qty);
        self.quantity += quantity;
    }

    /// Decrement the position by a sold quantity, leaving the average price
    /// untouched. Fails with `InsufficientShares` when the position does not
    /// cover the request.
    pub fn apply_sell(&mut self, quantity: i64) -> Result<SellOutcome, EngineError> {
        if self.quantity < quantity {
            return Err(EngineError::InsufficientShares);
        }

        self.quantity -= quantity;
        if self.quantity == 0 {
            Ok(SellOutcome::Closed)
        } else {
            Ok(SellOutcome::Reduced(self.quantity))
        }
    }

    /// Cost of the shares at the average purchase price.
    pub fn invested_value(&self) -> Decimal {
        Decimal::from(self.quantity) * self.average_price
    }
}

/// Round a monetary value to currency precision (2 decimal places, midpoint
/// away from zero).
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(quantity: i64, average_price: Decimal) -> Position {
        Position {
            user_id: "user-1".to_string(),
            symbol: "AAPL".to_string(),
            quantity,
            average_price,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_buy_computes_weighted_average() {
        // 10 @ 50 then 5 @ 60 -> (10*50 + 5*60) / 15 = 53.33
        let mut pos = position(10, dec!(50.00));
        pos.apply_buy(5, dec!(60.00));
        assert_eq!(pos.quantity, 15);
        assert_eq!(pos.average_price, dec!(53.33));
    }

    #[test]
    fn test_buy_same_price_keeps_average() {
        let mut pos = position(10, dec!(50.00));
        pos.apply_buy(10, dec!(50.00));
        assert_eq!(pos.quantity, 20);
        assert_eq!(pos.average_price, dec!(50.00));
    }

    #[test]
    fn test_average_is_exact_at_currency_precision() {
        let mut pos = position(3, dec!(10.00));
        pos.apply_buy(3, dec!(10.01));
        // (30.00 + 30.03) / 6 = 10.005 -> 10.01 away from zero
        assert_eq!(pos.average_price, dec!(10.01));
    }

    #[test]
    fn test_sell_does_not_alter_average() {
        let mut pos = position(15, dec!(53.33));
        let outcome = pos.apply_sell(5).unwrap();
        assert_eq!(outcome, SellOutcome::Reduced(10));
        assert_eq!(pos.average_price, dec!(53.33));
    }

    #[test]
    fn test_sell_full_quantity_closes_position() {
        let mut pos = position(15, dec!(53.33));
        let outcome = pos.apply_sell(15).unwrap();
        assert_eq!(outcome, SellOutcome::Closed);
        assert_eq!(pos.quantity, 0);
    }

    #[test]
    fn test_sell_more_than_held_is_rejected() {
        let mut pos = position(10, dec!(50.00));
        let result = pos.apply_sell(11);
        assert!(matches!(result, Err(EngineError::InsufficientShares)));
        // Rejected sell leaves the position untouched
        assert_eq!(pos.quantity, 10);
    }

    #[test]
    fn test_invested_value() {
        let pos = position(15, dec!(53.33));
        assert_eq!(pos.invested_value(), dec!(799.95));
    }

    #[test]
    fn test_round_money() {
        assert_eq!(round_money(dec!(1.005)), dec!(1.01));
        assert_eq!(round_money(dec!(1.004)), dec!(1.00));
        assert_eq!(round_money(dec!(-1.005)), dec!(-1.01));
    }
}
