//! Lot size suggestion from account size and price

use crate::error::{Result, TrainingError};
use crate::margin::MARGIN_MULTIPLE;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use tracing::warn;

pub const DEFAULT_TARGET_POSITIONS: u32 = 20;

/// Exchange board lot; suggestions are multiples of this
pub const BOARD_LOT: u64 = 100;

/// Headroom for price moves between sizing and filling
const PRICE_BUFFER: Decimal = dec!(1.1);

/// Shares per lot such that `target_positions` lots of this size stay inside
/// the margin ceiling with some headroom.
///
/// Rounds down to a multiple of [`BOARD_LOT`] and never goes below one board
/// lot.
pub fn calculate_lot_size(
    assets: Decimal,
    target_positions: u32,
    price: Option<Decimal>,
) -> Result<u64> {
    let price = match price {
        Some(p) if p > Decimal::ZERO => p,
        Some(p) => {
            return Err(TrainingError::InvalidArgument(format!(
                "price must be positive, got {}",
                p
            )))
        }
        None => return Err(TrainingError::InvalidArgument("price is not set".into())),
    };
    if assets <= Decimal::ZERO {
        return Err(TrainingError::InvalidArgument(format!(
            "assets must be positive, got {}",
            assets
        )));
    }
    if target_positions == 0 {
        return Err(TrainingError::InvalidArgument(
            "target number of positions must be positive".into(),
        ));
    }

    let max_order_value = assets * MARGIN_MULTIPLE;
    let raw = max_order_value / (Decimal::from(target_positions) * price * PRICE_BUFFER);
    let board = Decimal::from(BOARD_LOT);
    let floored = (raw / board).floor() * board;
    let lots = floored.to_u64().unwrap_or(0);

    if lots < BOARD_LOT {
        warn!(
            "Suggested lot size {} below one board lot, using {}",
            raw.round_dp(2),
            BOARD_LOT
        );
        return Ok(BOARD_LOT);
    }
    Ok(lots)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lot_size_floors_to_board_lot() {
        // 10M * 3.3 / (20 * 1000 * 1.1) = 1500
        let size = calculate_lot_size(dec!(10000000), 20, Some(dec!(1000))).unwrap();
        assert_eq!(size, 1500);

        // 10M * 3.3 / (20 * 1300 * 1.1) = 1153.8 -> 1100
        let size = calculate_lot_size(dec!(10000000), 20, Some(dec!(1300))).unwrap();
        assert_eq!(size, 1100);
    }

    #[test]
    fn test_lot_size_clamps_to_minimum() {
        let size = calculate_lot_size(dec!(100000), 20, Some(dec!(5000))).unwrap();
        assert_eq!(size, BOARD_LOT);
    }

    #[test]
    fn test_lot_size_rejects_bad_input() {
        assert!(matches!(
            calculate_lot_size(dec!(100000), 20, None),
            Err(TrainingError::InvalidArgument(_))
        ));
        assert!(matches!(
            calculate_lot_size(Decimal::ZERO, 20, Some(dec!(100))),
            Err(TrainingError::InvalidArgument(_))
        ));
        assert!(matches!(
            calculate_lot_size(dec!(-5), 20, Some(dec!(100))),
            Err(TrainingError::InvalidArgument(_))
        ));
        assert!(matches!(
            calculate_lot_size(dec!(100000), 0, Some(dec!(100))),
            Err(TrainingError::InvalidArgument(_))
        ));
    }
}
