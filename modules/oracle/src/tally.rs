//! Ballot tally: weighted median, trim band and quorum
//!
//! Everything here is a pure function of its inputs. Powers are summed in
//! `u128` and rates compared as fixed-point decimals, so every replica lands
//! on the same result.

use orakel_core::{Denom, ExchangeRate, OracleParams, TotalPower, ValAddress};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ballot::BallotItem;

/// What happened to one denom's ballot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BallotOutcome {
    /// A rate was published
    Published {
        exchange_rate: ExchangeRate,
        /// Median before trimming
        median: ExchangeRate,
        /// Voters inside the trim band
        winners: Vec<ValAddress>,
        /// Voters outside the trim band
        trimmed: Vec<ValAddress>,
    },
    /// Too little power took part; the previous rate stays
    NoQuorum,
}

/// Tally result for one denom
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotResult {
    pub denom: Denom,
    pub participating_power: TotalPower,
    pub total_power: TotalPower,
    pub outcome: BallotOutcome,
}

impl BallotResult {
    pub fn published_rate(&self) -> Option<ExchangeRate> {
        match &self.outcome {
            BallotOutcome::Published { exchange_rate, .. } => Some(exchange_rate.clone()),
            BallotOutcome::NoQuorum => None,
        }
    }

    /// Whether `validator` voted inside the band of a published rate
    pub fn is_winner(&self, validator: &ValAddress) -> bool {
        match &self.outcome {
            BallotOutcome::Published { winners, .. } => winners.contains(validator),
            BallotOutcome::NoQuorum => false,
        }
    }
}

fn sorted(items: &[BallotItem]) -> Vec<&BallotItem> {
    let mut sorted: Vec<&BallotItem> = items.iter().collect();
    sorted.sort_by(|a, b| {
        a.exchange_rate
            .cmp(&b.exchange_rate)
            .then_with(|| a.validator.cmp(&b.validator))
    });
    sorted
}

/// Power-weighted median.
///
/// The first entry, in (rate, validator) order, at which the cumulative power
/// reaches half the total. On an exact half the lower rate wins.
pub fn weighted_median(items: &[BallotItem]) -> Option<ExchangeRate> {
    let total = sum_power(items);
    if total == 0 {
        return None;
    }

    let mut cumulative: TotalPower = 0;
    for item in sorted(items) {
        cumulative += item.power as TotalPower;
        if cumulative * 2 >= total {
            return Some(item.exchange_rate.clone());
        }
    }
    None
}

/// Whether `participating` meets `threshold` of `total`.
///
/// A total too large to compare as a decimal never reaches quorum.
pub fn has_quorum(participating: TotalPower, total: TotalPower, threshold: Decimal) -> bool {
    if participating == 0 {
        return false;
    }
    let (participating, total) = match (to_decimal(participating), to_decimal(total)) {
        (Some(p), Some(t)) => (p, t),
        _ => return false,
    };
    total
        .checked_mul(threshold)
        .map_or(false, |required| participating >= required)
}

fn to_decimal(power: TotalPower) -> Option<Decimal> {
    let power = i128::try_from(power).ok()?;
    Decimal::try_from_i128_with_scale(power, 0).ok()
}

/// Total power of a ballot, summed wide so no set of `u64` powers overflows
pub fn sum_power(items: &[BallotItem]) -> TotalPower {
    items.iter().map(|i| i.power as TotalPower).sum()
}

/// Split a ballot around `median` by the trim band
fn trim(
    items: &[BallotItem],
    median: &ExchangeRate,
    trim_band: Decimal,
) -> (Vec<BallotItem>, Vec<BallotItem>) {
    items
        .iter()
        .cloned()
        .partition(|item| item.exchange_rate.within_band(median, trim_band))
}

/// Tally one denom's ballot.
///
/// `total_power` is the active power of the whole validator set, not just
/// the voters.
pub fn tally_ballot(
    denom: &Denom,
    items: &[BallotItem],
    total_power: TotalPower,
    params: &OracleParams,
) -> BallotResult {
    let participating_power = sum_power(items);
    let result = |outcome| BallotResult {
        denom: denom.clone(),
        participating_power,
        total_power,
        outcome,
    };

    if !has_quorum(participating_power, total_power, params.vote_threshold) {
        return result(BallotOutcome::NoQuorum);
    }

    let median = match weighted_median(items) {
        Some(median) => median,
        None => return result(BallotOutcome::NoQuorum),
    };

    let (kept, dropped) = trim(items, &median, params.trim_band);
    let exchange_rate = if dropped.is_empty() {
        median.clone()
    } else {
        // The median itself is always inside the band, so `kept` is never empty
        weighted_median(&kept).unwrap_or_else(|| median.clone())
    };

    let mut winners: Vec<ValAddress> = kept.into_iter().map(|i| i.validator).collect();
    let mut trimmed: Vec<ValAddress> = dropped.into_iter().map(|i| i.validator).collect();
    winners.sort();
    trimmed.sort();

    result(BallotOutcome::Published {
        exchange_rate,
        median,
        winners,
        trimmed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use orakel_core::VotingPower;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn item(validator: &str, rate: Decimal, power: VotingPower) -> BallotItem {
        BallotItem::new(ValAddress::new(validator), ExchangeRate::from(rate), power)
    }

    #[test]
    fn test_weighted_median_heavier_side() {
        let items = vec![item("V2", dec!(105), 5), item("V1", dec!(100), 10)];
        assert_eq!(weighted_median(&items), Some(ExchangeRate::from(dec!(100))));
    }

    #[test]
    fn test_weighted_median_exact_half_takes_lower() {
        let items = vec![item("V1", dec!(105), 5), item("V2", dec!(100), 5)];
        assert_eq!(weighted_median(&items), Some(ExchangeRate::from(dec!(100))));
    }

    #[test]
    fn test_weighted_median_empty() {
        assert_eq!(weighted_median(&[]), None);
        assert_eq!(weighted_median(&[item("V1", dec!(1), 0)]), None);
    }

    #[test]
    fn test_quorum() {
        assert!(has_quorum(50, 100, dec!(0.5)));
        assert!(!has_quorum(49, 100, dec!(0.5)));
        assert!(!has_quorum(0, 0, dec!(0.5)));
        assert!(has_quorum(100, 100, dec!(1)));
    }

    #[test]
    fn test_tally_scenario() {
        let params = OracleParams::default();
        let items = vec![item("V1", dec!(100), 10), item("V2", dec!(105), 5)];
        let result = tally_ballot(&Denom::new("ukrw"), &items, 15, &params);

        assert_eq!(result.published_rate(), Some(ExchangeRate::from(dec!(100))));
        assert_eq!(result.participating_power, 15);
        assert!(result.is_winner(&ValAddress::new("V1")));
        // 105 is 5% off a 1% band
        assert!(!result.is_winner(&ValAddress::new("V2")));
        match result.outcome {
            BallotOutcome::Published { trimmed, .. } => {
                assert_eq!(trimmed, vec![ValAddress::new("V2")]);
            }
            BallotOutcome::NoQuorum => panic!("expected a published rate"),
        }
    }

    #[test]
    fn test_trim_recomputes_median() {
        let params = OracleParams {
            trim_band: dec!(0.1),
            ..Default::default()
        };
        // Median is 100; 200 is trimmed; the kept set's median is 95
        let items = vec![
            item("V1", dec!(95), 10),
            item("V2", dec!(100), 5),
            item("V3", dec!(100), 1),
            item("V4", dec!(200), 8),
        ];
        let result = tally_ballot(&Denom::new("ukrw"), &items, 24, &params);
        match result.outcome {
            BallotOutcome::Published {
                exchange_rate,
                median,
                trimmed,
                winners,
            } => {
                assert_eq!(median, ExchangeRate::from(dec!(100)));
                assert_eq!(exchange_rate, ExchangeRate::from(dec!(95)));
                assert_eq!(trimmed, vec![ValAddress::new("V4")]);
                assert_eq!(winners.len(), 3);
            }
            BallotOutcome::NoQuorum => panic!("expected a published rate"),
        }
    }

    #[test]
    fn test_tally_near_max_power() {
        let params = OracleParams::default();
        let heavy = u64::MAX / 2 + 1;
        let items = vec![item("V1", dec!(100), heavy), item("V2", dec!(101), heavy)];
        let total = sum_power(&items) + VotingPower::MAX as TotalPower;

        let result = tally_ballot(&Denom::new("ukrw"), &items, total, &params);
        assert_eq!(result.participating_power, 2 * heavy as TotalPower);
        assert_eq!(result.published_rate(), Some(ExchangeRate::from(dec!(100))));

        let short = tally_ballot(&Denom::new("ukrw"), &items[..1], total, &params);
        assert_eq!(short.outcome, BallotOutcome::NoQuorum);
    }

    #[test]
    fn test_quorum_beyond_decimal_range() {
        assert!(!has_quorum(TotalPower::MAX, TotalPower::MAX, dec!(0.5)));
        let big = VotingPower::MAX as TotalPower * 4;
        assert!(has_quorum(big, big, dec!(0.5)));
    }

    #[test]
    fn test_tally_rates_beyond_decimal_range() {
        let params = OracleParams::default();
        let rate = |s: &str| s.parse::<ExchangeRate>().unwrap();
        let items = vec![
            BallotItem::new(ValAddress::new("V1"), rate("100000000000000000000000000000"), 10),
            BallotItem::new(ValAddress::new("V2"), rate("105000000000000000000000000000"), 5),
            BallotItem::new(ValAddress::new("V3"), rate("200000000000000000000000000000"), 5),
        ];
        let result = tally_ballot(&Denom::new("ukrw"), &items, 20, &params);
        assert_eq!(
            result.published_rate(),
            Some(rate("100000000000000000000000000000"))
        );
        assert!(result.is_winner(&ValAddress::new("V1")));
        assert!(!result.is_winner(&ValAddress::new("V2")));
    }

    #[test]
    fn test_tally_no_quorum() {
        let params = OracleParams::default();
        let items = vec![item("V1", dec!(100), 10)];
        let result = tally_ballot(&Denom::new("ukrw"), &items, 30, &params);
        assert_eq!(result.outcome, BallotOutcome::NoQuorum);
        assert_eq!(result.published_rate(), None);
    }

    proptest! {
        #[test]
        fn prop_median_ignores_input_order(
            (entries, shuffled) in prop::collection::vec((0u32..1_000, 1u64..100), 1..20)
                .prop_flat_map(|entries| {
                    let len = entries.len();
                    (Just(entries), Just((0..len).collect::<Vec<_>>()).prop_shuffle())
                })
        ) {
            let items: Vec<BallotItem> = entries
                .iter()
                .enumerate()
                .map(|(i, (rate, power))| item(&format!("V{:02}", i), Decimal::from(*rate), *power))
                .collect();
            let reordered: Vec<BallotItem> = shuffled.iter().map(|&i| items[i].clone()).collect();

            prop_assert_eq!(weighted_median(&items), weighted_median(&reordered));

            let params = OracleParams::default();
            let total = sum_power(&items);
            let denom = Denom::new("ukrw");
            prop_assert_eq!(
                tally_ballot(&denom, &items, total, &params),
                tally_ballot(&denom, &reordered, total, &params)
            );
        }

        #[test]
        fn prop_median_is_a_submitted_rate(
            entries in prop::collection::vec((0u32..1_000, 1u64..100), 1..20)
        ) {
            let items: Vec<BallotItem> = entries
                .iter()
                .enumerate()
                .map(|(i, (rate, power))| item(&format!("V{:02}", i), Decimal::from(*rate), *power))
                .collect();
            let median = weighted_median(&items).unwrap();
            prop_assert!(items.iter().any(|i| i.exchange_rate == median));
        }
    }
}
