//! Tests for core types

#[cfg(test)]
mod tests {
    use super::super::types::*;
    use crate::position::PositionBook;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[test]
    fn test_timing_serialization() {
        assert_eq!(serde_json::to_string(&Timing::Close).unwrap(), "\"close\"");
        assert_eq!(serde_json::to_string(&Timing::NextOpen).unwrap(), "\"next_open\"");
        let parsed: Timing = serde_json::from_str("\"next_open\"").unwrap();
        assert_eq!(parsed, Timing::NextOpen);
    }

    #[test]
    fn test_timing_from_str() {
        assert_eq!("close".parse::<Timing>().unwrap(), Timing::Close);
        assert_eq!("NEXT_OPEN".parse::<Timing>().unwrap(), Timing::NextOpen);
        assert_eq!(" open ".parse::<Timing>().unwrap(), Timing::NextOpen);
        assert!("noon".parse::<Timing>().is_err());
    }

    #[test]
    fn test_timing_file_tags() {
        for timing in [Timing::Close, Timing::NextOpen] {
            assert_eq!(Timing::from_file_tag(timing.file_tag()), Some(timing));
        }
        assert_eq!(Timing::from_file_tag("next_open"), None);
        assert!(Timing::Close < Timing::NextOpen);
    }

    #[test]
    fn test_margin_policy() {
        assert_eq!(MarginPolicy::default(), MarginPolicy::Forbidden);
        assert_eq!("warn".parse::<MarginPolicy>().unwrap(), MarginPolicy::Warning);
        assert_eq!("Forbidden".parse::<MarginPolicy>().unwrap(), MarginPolicy::Forbidden);
        assert!("maybe".parse::<MarginPolicy>().is_err());
        assert_eq!(serde_json::to_string(&MarginPolicy::Warning).unwrap(), "\"warning\"");
    }

    #[test]
    fn test_book_side_display() {
        assert_eq!(BookSide::Short.to_string(), "SHORT");
        assert_eq!(BookSide::Long.to_string(), "LONG");
    }

    #[test]
    fn test_snapshot_accessors() {
        let mut long = PositionBook::new(BookSide::Long);
        long.open(200, dec!(1500));
        let snapshot = TradeSnapshot {
            trading_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            execution_price: dec!(1500),
            stock_code: "7203".to_string(),
            lot_size: 100,
            short_lot: 0,
            long_lot: 2,
            short_profit: dec!(-250),
            long_profit: dec!(1000),
            short_position: PositionBook::new(BookSide::Short),
            long_position: long,
            assets: dec!(1000750),
        };
        assert_eq!(snapshot.realized_profit(), dec!(750));
        assert_eq!(snapshot.position(BookSide::Long).quantity(), 200);
        assert!(snapshot.position(BookSide::Short).is_flat());

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: TradeSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
