//! Weighted-average-cost position book
//!
//! One book per side of the account. Opening trades add `qty * price` to the
//! cost basis; closing trades remove `qty * average_price`, so the average
//! price of whatever remains never moves on a close.

use crate::types::BookSide;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Quantity and aggregate cost for one side of one instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionBook {
    side: BookSide,
    quantity: u64,
    total_cost: Decimal,
}

/// Result of a close request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The close went through; profit may legitimately be zero
    Applied { profit: Decimal },
    /// Nothing changed
    Rejected(CloseRejection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseRejection {
    ZeroQuantity,
    ExceedsHolding { requested: u64, held: u64 },
}

impl CloseOutcome {
    /// Realized profit, zero when rejected
    pub fn profit(&self) -> Decimal {
        match self {
            CloseOutcome::Applied { profit } => *profit,
            CloseOutcome::Rejected(_) => Decimal::ZERO,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, CloseOutcome::Applied { .. })
    }
}

impl PositionBook {
    pub fn new(side: BookSide) -> Self {
        Self {
            side,
            quantity: 0,
            total_cost: Decimal::ZERO,
        }
    }

    /// Rebuild a book from ledger values: lots held, shares per lot and the
    /// recorded average price.
    pub fn from_lots(side: BookSide, lots: u32, lot_size: u64, average_price: Decimal) -> Self {
        let quantity = u64::from(lots) * lot_size;
        let total_cost = if quantity == 0 {
            Decimal::ZERO
        } else {
            average_price * Decimal::from(quantity)
        };
        Self {
            side,
            quantity,
            total_cost,
        }
    }

    pub fn side(&self) -> BookSide {
        self.side
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub fn total_cost(&self) -> Decimal {
        self.total_cost
    }

    /// Current notional committed on this side
    pub fn exposure(&self) -> Decimal {
        self.total_cost
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0
    }

    pub fn average_price(&self) -> Decimal {
        if self.quantity == 0 {
            Decimal::ZERO
        } else {
            self.total_cost / Decimal::from(self.quantity)
        }
    }

    /// Buy (long) or short-sell (short). Zero quantity is a no-op.
    pub fn open(&mut self, qty: u64, price: Decimal) {
        if qty == 0 {
            return;
        }
        self.quantity += qty;
        self.total_cost += Decimal::from(qty) * price;
    }

    /// Sell (long) or cover (short) at `price`.
    pub fn close(&mut self, qty: u64, price: Decimal) -> CloseOutcome {
        if qty == 0 {
            return CloseOutcome::Rejected(CloseRejection::ZeroQuantity);
        }
        if qty > self.quantity {
            return CloseOutcome::Rejected(CloseRejection::ExceedsHolding {
                requested: qty,
                held: self.quantity,
            });
        }

        let avg = self.average_price();
        let closed = Decimal::from(qty);
        let profit = match self.side {
            BookSide::Long => (price - avg) * closed,
            BookSide::Short => (avg - price) * closed,
        };

        self.quantity -= qty;
        self.total_cost = if self.quantity == 0 {
            Decimal::ZERO
        } else {
            self.total_cost - closed * avg
        };

        CloseOutcome::Applied { profit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn assert_close_to(actual: Decimal, expected: Decimal) {
        assert!(
            (actual - expected).abs() < dec!(0.01),
            "expected ~{}, got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_open_zero_is_noop() {
        let mut book = PositionBook::new(BookSide::Long);
        book.open(0, dec!(1000));
        assert_eq!(book.quantity(), 0);
        assert_eq!(book.total_cost(), Decimal::ZERO);
        assert_eq!(book.average_price(), Decimal::ZERO);
    }

    #[test]
    fn test_open_tracks_weighted_average() {
        let mut book = PositionBook::new(BookSide::Long);
        book.open(100, dec!(10));
        book.open(300, dec!(20));
        book.open(100, dec!(40));
        // (1000 + 6000 + 4000) / 500
        assert_eq!(book.quantity(), 500);
        assert_eq!(book.total_cost(), dec!(11000));
        assert_eq!(book.average_price(), dec!(22));
    }

    #[test]
    fn test_close_over_holding_is_rejected() {
        let mut book = PositionBook::new(BookSide::Long);
        book.open(100, dec!(50));

        let outcome = book.close(200, dec!(60));
        assert_eq!(
            outcome,
            CloseOutcome::Rejected(CloseRejection::ExceedsHolding {
                requested: 200,
                held: 100
            })
        );
        assert_eq!(outcome.profit(), Decimal::ZERO);
        assert_eq!(book.quantity(), 100);
        assert_eq!(book.total_cost(), dec!(5000));
    }

    #[test]
    fn test_close_zero_is_rejected_not_zero_profit() {
        let mut book = PositionBook::new(BookSide::Short);
        book.open(100, dec!(50));
        let outcome = book.close(0, dec!(50));
        assert!(!outcome.is_applied());

        // A genuine break-even close is distinguishable
        let outcome = book.close(100, dec!(50));
        assert_eq!(outcome, CloseOutcome::Applied { profit: Decimal::ZERO });
    }

    #[test]
    fn test_round_trip_same_price_is_flat() {
        let mut book = PositionBook::new(BookSide::Long);
        book.open(1000, dec!(1600));
        let profit = book.close(1000, dec!(1600)).profit();
        assert_eq!(profit, Decimal::ZERO);
        assert!(book.is_flat());
        assert_eq!(book.total_cost(), Decimal::ZERO);
    }

    #[test]
    fn test_long_scenario() {
        let mut book = PositionBook::new(BookSide::Long);
        book.open(1000, dec!(1600));
        assert_eq!(book.average_price(), dec!(1600));

        book.open(500, dec!(2000));
        assert_eq!(book.quantity(), 1500);
        assert_close_to(book.average_price(), dec!(1733.33));

        let first = book.close(500, dec!(2000)).profit();
        assert_close_to(first, dec!(133333.33));
        assert_eq!(book.quantity(), 1000);
        // Closing never moves the average of what remains
        assert_close_to(book.average_price(), dec!(1733.33));

        let second = book.close(1000, dec!(1600)).profit();
        assert_close_to(second, dec!(-133333.33));
        assert!(book.is_flat());
        assert_eq!(book.total_cost(), Decimal::ZERO);

        // Total bought 2.6M, total sold 2.6M
        assert_close_to(first + second, Decimal::ZERO);
    }

    #[test]
    fn test_short_scenario() {
        let mut book = PositionBook::new(BookSide::Short);
        book.open(1000, dec!(2000));
        book.open(500, dec!(1500));
        assert_eq!(book.quantity(), 1500);
        assert_close_to(book.average_price(), dec!(1833.33));

        let first = book.close(500, dec!(1500)).profit();
        assert_close_to(first, dec!(166666.67));
        let avg_after_first = book.average_price();
        assert_close_to(avg_after_first, dec!(1833.33));

        let second = book.close(1000, dec!(2000)).profit();
        assert_close_to(second, (avg_after_first - dec!(2000)) * dec!(1000));
        assert!(book.is_flat());
        assert_eq!(book.total_cost(), Decimal::ZERO);
    }

    #[test]
    fn test_from_lots_rebuilds_cost() {
        let book = PositionBook::from_lots(BookSide::Long, 3, 100, dec!(1500.5));
        assert_eq!(book.quantity(), 300);
        assert_eq!(book.total_cost(), dec!(450150));
        assert_eq!(book.average_price(), dec!(1500.5));

        let empty = PositionBook::from_lots(BookSide::Short, 0, 100, dec!(99));
        assert!(empty.is_flat());
        assert_eq!(empty.total_cost(), Decimal::ZERO);
    }

    #[test]
    fn test_flat_book_has_zero_cost_after_any_sequence() {
        let mut book = PositionBook::new(BookSide::Long);
        let prices = [dec!(101.7), dec!(99.3), dec!(100.1)];
        for p in prices {
            book.open(300, p);
        }
        book.close(200, dec!(105));
        book.close(400, dec!(95.25));
        book.close(300, dec!(101));
        assert!(book.is_flat());
        assert_eq!(book.total_cost(), Decimal::ZERO);
    }
}
