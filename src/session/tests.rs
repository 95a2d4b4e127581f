//! Unit tests for training sessions and ledger discovery

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::history::LedgerFile;
    use crate::price::{BarSeries, DailyBar};
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn started() -> NaiveDateTime {
        date(5, 20).and_hms_opt(9, 30, 15).unwrap()
    }

    fn series() -> BarSeries {
        BarSeries::new("7203")
            .with_bar(DailyBar::open_close(date(3, 1), dec!(1590), dec!(1600)))
            .with_bar(DailyBar::open_close(date(3, 4), dec!(1610), dec!(1620)))
            .with_bar(DailyBar::open_close(date(3, 5), dec!(1630), dec!(1640)))
    }

    fn options() -> SessionOptions {
        SessionOptions {
            code: "7203".to_string(),
            data_start: date(3, 1),
            lot_size: 100,
            initial_assets: dec!(10000000),
            margin_policy: MarginPolicy::Forbidden,
            undo_capacity: 10,
            timings: vec![Timing::NextOpen, Timing::Close],
        }
    }

    #[test]
    fn test_ledger_file_name_round_trip() {
        let name = ledger_file_name("7203", date(3, 1), started(), Timing::NextOpen);
        assert_eq!(name, "trading_history_7203_20240301_20240520093015_open.csv");

        let parsed = LedgerName::parse(&name).unwrap();
        assert_eq!(parsed.code, "7203");
        assert_eq!(parsed.data_start, date(3, 1));
        assert_eq!(parsed.session_started, started());
        assert_eq!(parsed.timing, Timing::NextOpen);
    }

    #[test]
    fn test_ledger_name_parse() {
        let parsed =
            LedgerName::parse("trading_history_my_basket_20000101_20240203112409_close.csv").unwrap();
        assert_eq!(parsed.code, "my_basket");
        assert_eq!(parsed.timing, Timing::Close);

        assert!(LedgerName::parse("trading_summary_7203_20240301_20240520093015_close.csv").is_none());
        assert!(LedgerName::parse("trading_history_7203_20240301_20240520093015_opcl.csv").is_none());
        assert!(LedgerName::parse("trading_history_20240301_20240520093015_close.csv").is_none());
        assert!(LedgerName::parse("trading_history_7203_2024_20240520093015_close.csv").is_none());
    }

    #[test]
    fn test_start_creates_one_ledger_per_timing() {
        let dir = tempdir().unwrap();
        let prices = series();
        let session = TrainingSession::start(options(), &prices, dir.path(), started()).unwrap();

        let timings: Vec<Timing> = session.legs().iter().map(|l| l.timing()).collect();
        assert_eq!(timings, vec![Timing::Close, Timing::NextOpen]);
        for timing in timings {
            let path = dir
                .path()
                .join(ledger_file_name("7203", date(3, 1), started(), timing));
            assert_eq!(LedgerFile::open(&path).unwrap().row_count().unwrap(), 0);
        }
    }

    #[test]
    fn test_submit_all_fills_each_leg() {
        let dir = tempdir().unwrap();
        let prices = series();
        let mut session = TrainingSession::start(options(), &prices, dir.path(), started()).unwrap();

        let outcomes = session.submit_all(date(3, 1), 0, 2, None).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].0, Timing::Close);
        assert_eq!(outcomes[0].1.snapshot.execution_price, dec!(1600));
        assert_eq!(outcomes[1].0, Timing::NextOpen);
        assert_eq!(outcomes[1].1.snapshot.execution_price, dec!(1610));

        let close = session.leg(Timing::Close).unwrap();
        assert_eq!(close.long_book().total_cost(), dec!(320000));
    }

    #[test]
    fn test_failed_leg_rolls_back_earlier_legs() {
        let dir = tempdir().unwrap();
        let prices = series();
        let mut session = TrainingSession::start(options(), &prices, dir.path(), started()).unwrap();
        session.submit_all(date(3, 1), 0, 2, None).unwrap();

        // Close fills on the last bar, next open has nothing to fill at
        let err = session.submit_all(date(3, 5), 0, 4, None).unwrap_err();
        assert!(matches!(err, TrainingError::NoPriceData { .. }));

        for leg in session.legs() {
            assert_eq!(leg.history().ledger().row_count().unwrap(), 1);
            assert_eq!(leg.long_book().quantity(), 200);
        }
    }

    #[test]
    fn test_undo_and_rollback_fan_out() {
        let dir = tempdir().unwrap();
        let prices = series();
        let mut session = TrainingSession::start(options(), &prices, dir.path(), started()).unwrap();
        session.submit_all(date(3, 1), 0, 1, None).unwrap();
        session.submit_all(date(3, 4), 1, 2, None).unwrap();

        assert!(matches!(session.undo_all(3), Err(TrainingError::RowNotFound { .. })));
        session.undo_all(1).unwrap();
        for leg in session.legs() {
            assert_eq!(leg.long_book().quantity(), 100);
            assert!(leg.short_book().is_flat());
        }

        session.submit_all(date(3, 4), 0, 3, None).unwrap();
        session.rollback_all(0).unwrap();
        for leg in session.legs() {
            assert_eq!(leg.history().ledger().row_count().unwrap(), 1);
            assert_eq!(leg.long_book().quantity(), 100);
        }
        assert!(session.rollback_all(5).is_err());
    }

    #[test]
    fn test_annotate_all() {
        let dir = tempdir().unwrap();
        let prices = series();
        let mut session = TrainingSession::start(options(), &prices, dir.path(), started()).unwrap();
        session.submit_all(date(3, 1), 0, 1, None).unwrap();

        let written = session
            .annotate_all(AnnotateTarget::Date(date(3, 1)), "first entry")
            .unwrap();
        assert_eq!(written, vec![(Timing::Close, 0), (Timing::NextOpen, 0)]);
        for leg in session.legs() {
            assert_eq!(leg.list_recent(1).unwrap()[0].1.memo, "first entry");
        }
    }

    #[test]
    fn test_discover_and_resume() {
        let dir = tempdir().unwrap();
        let prices = series();
        {
            let mut session =
                TrainingSession::start(options(), &prices, dir.path(), started()).unwrap();
            session.submit_all(date(3, 1), 1, 3, None).unwrap();
        }
        // An untouched later session has no rows and is not offered
        let later = date(5, 21).and_hms_opt(8, 0, 0).unwrap();
        TrainingSession::start(options(), &prices, dir.path(), later).unwrap();
        std::fs::write(dir.path().join("notes.csv"), "x\n").unwrap();

        let found = discover_sessions(dir.path(), "7203").unwrap();
        assert_eq!(found.len(), 1);
        let session = &found[0];
        assert_eq!(session.session_started, started());
        assert_eq!(session.last_trading_date, date(3, 1));
        assert_eq!(session.files.len(), 2);
        assert_eq!(session.assets[&Timing::Close], dec!(10000000));
        assert!(discover_sessions(dir.path(), "6758").unwrap().is_empty());

        let mut opts = options();
        opts.lot_size = 1;
        let resumed = TrainingSession::resume(opts, &prices, session).unwrap();
        assert_eq!(resumed.lot_size(), 100);
        let close = resumed.leg(Timing::Close).unwrap();
        assert_eq!(close.long_book().quantity(), 300);
        assert_eq!(close.short_book().quantity(), 100);
        assert_eq!(close.long_book().average_price(), dec!(1600));
    }

    #[test]
    fn test_discover_missing_dir() {
        let dir = tempdir().unwrap();
        assert!(discover_sessions(&dir.path().join("nope"), "7203").unwrap().is_empty());
    }

    #[test]
    fn test_options_from_config() {
        let config = SessionConfig::default();
        let opts = SessionOptions::from_config("7203", date(3, 1), &config);
        assert_eq!(opts.lot_size, 100);
        assert_eq!(opts.timings, vec![Timing::Close, Timing::NextOpen]);
        assert_eq!(opts.undo_capacity, config.history_capacity);
    }
}
