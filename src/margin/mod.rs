//! Exposure and margin-multiple checks gating every order

use crate::error::{ExposureSide, TrainingError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Hard ceiling on combined short + long exposure relative to assets
pub const MARGIN_MULTIPLE: Decimal = dec!(3.3);

/// Classification of a hypothetical post-order exposure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginVerdict {
    Ok,
    ShortOver,
    LongOver,
    BothOver,
    MarginLimitExceeded,
}

impl MarginVerdict {
    pub fn is_ok(&self) -> bool {
        matches!(self, MarginVerdict::Ok)
    }

    /// Side(s) over the asset base, if this is a per-side verdict
    pub fn over_side(&self) -> Option<ExposureSide> {
        match self {
            MarginVerdict::ShortOver => Some(ExposureSide::Short),
            MarginVerdict::LongOver => Some(ExposureSide::Long),
            MarginVerdict::BothOver => Some(ExposureSide::Both),
            MarginVerdict::Ok | MarginVerdict::MarginLimitExceeded => None,
        }
    }
}

impl std::fmt::Display for MarginVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarginVerdict::Ok => write!(f, "OK"),
            MarginVerdict::ShortOver => write!(f, "SHORT_OVER"),
            MarginVerdict::LongOver => write!(f, "LONG_OVER"),
            MarginVerdict::BothOver => write!(f, "BOTH_OVER"),
            MarginVerdict::MarginLimitExceeded => write!(f, "MARGIN_LIMIT_EXCEEDED"),
        }
    }
}

/// Exposure figures behind a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarginCheck {
    pub verdict: MarginVerdict,
    pub short_exposure: Decimal,
    pub long_exposure: Decimal,
    pub assets: Decimal,
}

impl MarginCheck {
    pub fn limit(&self) -> Decimal {
        self.assets * MARGIN_MULTIPLE
    }

    /// The error this check amounts to when it blocks an order
    pub fn to_error(&self) -> Option<TrainingError> {
        match self.verdict {
            MarginVerdict::Ok => None,
            MarginVerdict::MarginLimitExceeded => Some(TrainingError::MarginLimitExceeded {
                short_exposure: self.short_exposure,
                long_exposure: self.long_exposure,
                limit: self.limit(),
            }),
            verdict => verdict.over_side().map(|side| TrainingError::ExposureOverLimit {
                side,
                short_exposure: self.short_exposure,
                long_exposure: self.long_exposure,
                assets: self.assets,
            }),
        }
    }

    /// Human readable advisory for a non-blocking verdict
    pub fn advisory(&self) -> Option<String> {
        self.to_error().map(|e| e.to_string())
    }
}

/// Classify an order by the exposures it would leave behind.
///
/// Incremental amounts are `delta * price` and go negative on net-closing
/// orders, so closing can never push a side over. `None` when the sums
/// overflow `Decimal`.
pub fn classify(
    current_short: Decimal,
    current_long: Decimal,
    assets: Decimal,
    incremental_short: Decimal,
    incremental_long: Decimal,
) -> Option<MarginCheck> {
    let short_exposure = current_short.checked_add(incremental_short)?;
    let long_exposure = current_long.checked_add(incremental_long)?;
    let combined = short_exposure.checked_add(long_exposure)?;
    let limit = assets.checked_mul(MARGIN_MULTIPLE)?;

    let verdict = if combined >= limit {
        MarginVerdict::MarginLimitExceeded
    } else {
        match (short_exposure > assets, long_exposure > assets) {
            (true, true) => MarginVerdict::BothOver,
            (true, false) => MarginVerdict::ShortOver,
            (false, true) => MarginVerdict::LongOver,
            (false, false) => MarginVerdict::Ok,
        }
    };

    Some(MarginCheck {
        verdict,
        short_exposure,
        long_exposure,
        assets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: Decimal = dec!(0.01);

    #[test]
    fn test_just_under_assets_is_ok() {
        let assets = dec!(1000000);
        let check = classify(Decimal::ZERO, Decimal::ZERO, assets, assets - EPS, assets - EPS).unwrap();
        assert_eq!(check.verdict, MarginVerdict::Ok);
        assert!(check.to_error().is_none());
    }

    #[test]
    fn test_short_over() {
        let assets = dec!(1000000);
        let check = classify(Decimal::ZERO, Decimal::ZERO, assets, assets + EPS, Decimal::ZERO).unwrap();
        assert_eq!(check.verdict, MarginVerdict::ShortOver);
        assert_eq!(check.verdict.over_side(), Some(ExposureSide::Short));
    }

    #[test]
    fn test_long_over_uses_current_exposure() {
        let assets = dec!(1000);
        let check = classify(Decimal::ZERO, dec!(900), assets, Decimal::ZERO, dec!(200)).unwrap();
        assert_eq!(check.verdict, MarginVerdict::LongOver);
        assert_eq!(check.long_exposure, dec!(1100));
    }

    #[test]
    fn test_both_over() {
        let assets = dec!(1000);
        let check = classify(dec!(1200), dec!(1200), assets, Decimal::ZERO, Decimal::ZERO).unwrap();
        assert_eq!(check.verdict, MarginVerdict::BothOver);
    }

    #[test]
    fn test_margin_limit_boundary_is_inclusive() {
        let assets = dec!(1000);
        // exactly 3.3x
        let at = classify(Decimal::ZERO, Decimal::ZERO, assets, dec!(1650), dec!(1650)).unwrap();
        assert_eq!(at.verdict, MarginVerdict::MarginLimitExceeded);
        assert_eq!(at.limit(), dec!(3300));

        let below = classify(Decimal::ZERO, Decimal::ZERO, assets, dec!(1650), dec!(1650) - EPS).unwrap();
        assert_eq!(below.verdict, MarginVerdict::BothOver);
    }

    #[test]
    fn test_margin_limit_takes_priority() {
        let check = classify(dec!(5000), Decimal::ZERO, dec!(1000), Decimal::ZERO, Decimal::ZERO).unwrap();
        assert_eq!(check.verdict, MarginVerdict::MarginLimitExceeded);
        assert!(matches!(
            check.to_error(),
            Some(TrainingError::MarginLimitExceeded { .. })
        ));
    }

    #[test]
    fn test_closing_reduces_exposure() {
        let assets = dec!(1000);
        // Already over on the long side, selling down brings it back
        let check = classify(Decimal::ZERO, dec!(1500), assets, Decimal::ZERO, dec!(-600)).unwrap();
        assert_eq!(check.verdict, MarginVerdict::Ok);
        assert_eq!(check.long_exposure, dec!(900));
    }

    #[test]
    fn test_advisory_mentions_side() {
        let check = classify(Decimal::ZERO, Decimal::ZERO, dec!(100), dec!(150), Decimal::ZERO).unwrap();
        let msg = check.advisory().unwrap();
        assert!(msg.contains("Short"));
    }

    #[test]
    fn test_overflowing_exposure_is_none() {
        assert!(classify(Decimal::ZERO, Decimal::ZERO, dec!(1000), Decimal::MAX, Decimal::MAX).is_none());
        assert!(classify(Decimal::MAX, Decimal::ZERO, dec!(1000), Decimal::MAX, Decimal::ZERO).is_none());
        assert!(classify(Decimal::ZERO, Decimal::ZERO, Decimal::MAX, Decimal::ZERO, Decimal::ZERO).is_none());
    }
}
