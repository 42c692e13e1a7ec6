//! Oracle keeper: message handling, end-of-period tally and reads

use orakel_core::{
    AccAddress, BlockHeight, Denom, ExchangeRate, OracleParams, OrakelError, OrakelResult, Period,
    StateChange, TotalPower, ValAddress, VotingPowerSource,
};
use orakel_state::{compose_key, decode_value, decompose_key, set_change, StateStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::ballot::{BallotStore, ExchangeRatePrevote, ExchangeRateVote};
use crate::feeder::FeederRegistry;
use crate::msgs::{
    MsgDelegateFeedConsent, MsgExchangeRatePrevote, MsgExchangeRateVote, OracleMsg, SignedMsg,
};
use crate::participation::{ParticipationCounter, ParticipationLedger, PeriodMark, WindowReport};
use crate::tally::{tally_ballot, BallotOutcome, BallotResult};
use crate::validator::CommitRevealValidator;

const RATE_PREFIX: &[u8] = b"rate:";
const LAST_TALLY_KEY: &[u8] = b"meta:last_tally";

pub fn rate_key(denom: &Denom) -> Vec<u8> {
    compose_key(RATE_PREFIX, &[denom.as_str().as_bytes()])
}

/// A published exchange rate and the period that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedRate {
    pub exchange_rate: ExchangeRate,
    /// `None` for rates seeded at genesis
    pub period: Option<Period>,
}

/// Everything one end-of-period run decided
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodOutcome {
    pub period: Period,
    /// One entry per denom that had votes, ordered by denom
    pub ballots: Vec<BallotResult>,
    /// Every denom validators were held to this period
    pub accounted_denoms: Vec<Denom>,
    pub expired_prevotes: usize,
    /// Per active validator
    pub marks: BTreeMap<ValAddress, PeriodMark>,
    pub window_report: Option<WindowReport>,
}

impl PeriodOutcome {
    pub fn published(&self) -> impl Iterator<Item = (&Denom, ExchangeRate)> {
        self.ballots
            .iter()
            .filter_map(|b| b.published_rate().map(|rate| (&b.denom, rate)))
    }
}

/// Oracle keeper
pub struct OracleKeeper<S: StateStore> {
    state: Arc<S>,
    params: OracleParams,
    powers: Arc<dyn VotingPowerSource>,
    feeders: FeederRegistry<S>,
    ballots: BallotStore<S>,
    ledger: ParticipationLedger<S>,
}

impl<S: StateStore> OracleKeeper<S> {
    pub fn new(
        state: Arc<S>,
        params: OracleParams,
        powers: Arc<dyn VotingPowerSource>,
    ) -> OrakelResult<Self> {
        params.validate()?;
        Ok(Self {
            feeders: FeederRegistry::new(state.clone()),
            ballots: BallotStore::new(state.clone()),
            ledger: ParticipationLedger::new(state.clone()),
            state,
            params,
            powers,
        })
    }

    pub fn params(&self) -> &OracleParams {
        &self.params
    }

    pub fn powers(&self) -> &dyn VotingPowerSource {
        self.powers.as_ref()
    }

    /// Voting period a block height falls in
    pub fn period_of(&self, height: BlockHeight) -> Period {
        height.period(self.params.vote_period)
    }

    fn validator(&self) -> CommitRevealValidator<'_, S> {
        CommitRevealValidator::new(&self.params, &self.feeders, &self.ballots, self.powers.as_ref())
    }

    // ============ Message handling ============

    /// Apply one signed message delivered at `height`.
    ///
    /// Every check runs before any write, so a rejected message leaves state untouched.
    pub fn deliver(&self, tx: &SignedMsg, height: BlockHeight) -> OrakelResult<()> {
        tx.check_signer()?;
        let period = self.period_of(height);

        let result = match &tx.msg {
            OracleMsg::Prevote(msg) => self.handle_prevote(msg, period),
            OracleMsg::Vote(msg) => self.handle_vote(msg, period),
            OracleMsg::DelegateFeedConsent(msg) => self.handle_delegate(msg),
        };

        if let Err(e) = &result {
            warn!("Rejected {} from {}: {}", tx.msg.name(), tx.signer, e);
        }
        result
    }

    fn handle_prevote(&self, msg: &MsgExchangeRatePrevote, period: Period) -> OrakelResult<()> {
        let prevote = self.validator().validate_prevote(msg, period)?;
        self.ballots.add_prevote(&prevote)?;
        debug!(
            "Prevote {} for {}/{} in {}",
            prevote.hash, prevote.denom, prevote.validator, period
        );
        Ok(())
    }

    fn handle_vote(&self, msg: &MsgExchangeRateVote, period: Period) -> OrakelResult<()> {
        let validated = self.validator().validate_vote(msg, period)?;
        self.ballots
            .match_and_consume_vote(&validated.prevote, &validated.vote)?;
        debug!(
            "Vote {} for {}/{} in {}",
            msg.exchange_rate, msg.denom, msg.validator, period
        );
        Ok(())
    }

    fn handle_delegate(&self, msg: &MsgDelegateFeedConsent) -> OrakelResult<()> {
        msg.validate_basic()?;
        self.feeders.set_delegate(&msg.operator, &msg.delegate)?;
        info!("Validator {} delegated feeding to {}", msg.operator, msg.delegate);
        Ok(())
    }

    // ============ End of period ============

    /// Tally the closing `period` and update participation.
    ///
    /// The outcome is computed in full before anything is written, then
    /// committed as a single batch.
    pub fn end_period(&self, period: Period) -> OrakelResult<PeriodOutcome> {
        if let Some(last) = self.last_tallied_period()? {
            if period <= last {
                return Err(OrakelError::PeriodAlreadyTallied(period.0));
            }
        }

        let mut batch: Vec<StateChange> = Vec::new();
        let powers = self.powers.as_ref();
        let active = powers.active_validators();
        let total_power: TotalPower = active.iter().map(|(_, p)| *p as TotalPower).sum();

        let expired = self.ballots.drop_expired_prevotes(period, &mut batch)?;

        let mut accounted: BTreeSet<Denom> = self.params.whitelist.iter().cloned().collect();
        accounted.extend(expired.iter().map(|p| p.denom.clone()));

        let mut results = Vec::new();
        let mut voters: BTreeMap<Denom, BTreeSet<ValAddress>> = BTreeMap::new();

        for denom in self.ballots.voted_denoms()? {
            let drained = self
                .ballots
                .drain_for_tally(&denom, period, powers, &mut batch)?;
            if drained.voters.is_empty() {
                continue;
            }

            let result = tally_ballot(&denom, &drained.items, total_power, &self.params);
            match &result.outcome {
                BallotOutcome::Published { exchange_rate, .. } => {
                    let rate = FinalizedRate {
                        exchange_rate: exchange_rate.clone(),
                        period: Some(period),
                    };
                    batch.push(set_change(rate_key(&denom), &rate)?);
                    info!("{} {} = {}", period, denom, exchange_rate);
                }
                BallotOutcome::NoQuorum => {
                    warn!(
                        "{} {} dropped: {} of {} power voted",
                        period, denom, result.participating_power, total_power
                    );
                }
            }

            accounted.insert(denom.clone());
            voters.insert(denom, drained.voters);
            results.push(result);
        }

        let mut marks: BTreeMap<ValAddress, PeriodMark> = BTreeMap::new();
        for (validator, _) in &active {
            let mark = marks.entry(validator.clone()).or_default();
            for denom in &accounted {
                let voted = voters
                    .get(denom)
                    .map(|v| v.contains(validator))
                    .unwrap_or(false);
                if !voted {
                    mark.misses += 1;
                } else if results
                    .iter()
                    .any(|r| &r.denom == denom && r.is_winner(validator))
                {
                    mark.hits += 1;
                }
            }
        }

        let window_report = self
            .ledger
            .record_period(period, &marks, &self.params, &mut batch)?;

        batch.push(set_change(LAST_TALLY_KEY.to_vec(), &period)?);
        self.state.apply_batch(batch)?;

        info!(
            "Finalized {}: {} ballots, {} accounted denoms, {} expired prevotes",
            period,
            results.len(),
            accounted.len(),
            expired.len()
        );

        Ok(PeriodOutcome {
            period,
            ballots: results,
            accounted_denoms: accounted.into_iter().collect(),
            expired_prevotes: expired.len(),
            marks,
            window_report,
        })
    }

    pub fn last_tallied_period(&self) -> OrakelResult<Option<Period>> {
        self.state
            .get(LAST_TALLY_KEY)?
            .map(|bytes| decode_value(&bytes))
            .transpose()
    }

    // ============ Genesis writes ============

    /// Seed a rate outside the voting process
    pub fn set_rate(&self, denom: &Denom, exchange_rate: ExchangeRate) -> OrakelResult<()> {
        if denom.is_empty() {
            return Err(OrakelError::UnknownDenom);
        }
        let rate = FinalizedRate {
            exchange_rate,
            period: None,
        };
        self.state.apply_batch(vec![set_change(rate_key(denom), &rate)?])?;
        Ok(())
    }

    pub fn set_feeder_delegate(
        &self,
        operator: &ValAddress,
        delegate: &AccAddress,
    ) -> OrakelResult<()> {
        self.feeders.set_delegate(operator, delegate)
    }

    // ============ Reads ============

    /// Latest published rate for `denom`
    pub fn get_rate(&self, denom: &Denom) -> OrakelResult<Option<ExchangeRate>> {
        Ok(self.get_finalized_rate(denom)?.map(|r| r.exchange_rate))
    }

    pub fn get_finalized_rate(&self, denom: &Denom) -> OrakelResult<Option<FinalizedRate>> {
        self.state
            .get(&rate_key(denom))?
            .map(|bytes| decode_value(&bytes))
            .transpose()
    }

    /// Every published rate, ordered by denom
    pub fn get_rates(&self) -> OrakelResult<BTreeMap<Denom, FinalizedRate>> {
        let mut rates = BTreeMap::new();
        for (key, bytes) in self.state.scan_prefix(RATE_PREFIX)? {
            let denom = decompose_key(RATE_PREFIX, &key)
                .and_then(|segments| segments.first().copied())
                .and_then(|segment| std::str::from_utf8(segment).ok())
                .ok_or_else(|| OrakelError::StateCorruption("malformed rate key".into()))?;
            rates.insert(Denom::new(denom), decode_value(&bytes)?);
        }
        Ok(rates)
    }

    /// Account currently allowed to feed for `validator`
    pub fn get_feeder(&self, validator: &ValAddress) -> OrakelResult<AccAddress> {
        self.feeders.resolve_feeder(validator)
    }

    /// Newest live prevote for the key
    pub fn get_prevote(
        &self,
        denom: &Denom,
        validator: &ValAddress,
    ) -> OrakelResult<Option<ExchangeRatePrevote>> {
        Ok(self
            .ballots
            .prevotes()?
            .into_iter()
            .filter(|p| &p.denom == denom && &p.validator == validator)
            .max_by_key(|p| p.submit_period))
    }

    /// Revealed vote waiting for the tally
    pub fn get_vote(
        &self,
        denom: &Denom,
        validator: &ValAddress,
    ) -> OrakelResult<Option<ExchangeRateVote>> {
        self.ballots.get_vote(denom, validator)
    }

    /// Open-window counters, zeroed if the validator has none yet
    pub fn get_participation(
        &self,
        validator: &ValAddress,
        current: Period,
    ) -> OrakelResult<ParticipationCounter> {
        let window = current.window(self.params.slash_window);
        Ok(self
            .ledger
            .get(validator)?
            .filter(|c| c.window == window)
            .unwrap_or_else(|| ParticipationCounter::new(window)))
    }

    /// Misses in the window that `current` falls in
    pub fn get_miss_count(&self, validator: &ValAddress, current: Period) -> OrakelResult<u64> {
        let window = current.window(self.params.slash_window);
        self.ledger.get_miss_count(validator, window)
    }

    /// Misses in a given window, open or retained
    pub fn miss_count(&self, validator: &ValAddress, window: u64) -> OrakelResult<u64> {
        self.ledger.miss_count(validator, window)
    }

    pub fn get_window_report(&self, window: u64) -> OrakelResult<Option<WindowReport>> {
        self.ledger.get_report(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staking::{ValidatorInfo, ValidatorSet};
    use orakel_state::MemoryStateStore;
    use rust_decimal_macros::dec;

    fn keeper(params: OracleParams) -> OracleKeeper<MemoryStateStore> {
        let powers = ValidatorSet::with_validators(vec![
            ValidatorInfo::new(ValAddress::new("V1"), 10),
            ValidatorInfo::new(ValAddress::new("V2"), 5),
        ]);
        OracleKeeper::new(Arc::new(MemoryStateStore::new()), params, Arc::new(powers)).unwrap()
    }

    #[test]
    fn test_rejects_invalid_params() {
        let params = OracleParams {
            vote_period: 0,
            ..Default::default()
        };
        let powers: Arc<dyn VotingPowerSource> = Arc::new(ValidatorSet::new());
        assert!(matches!(
            OracleKeeper::new(Arc::new(MemoryStateStore::new()), params, powers),
            Err(OrakelError::ConfigError(_))
        ));
    }

    #[test]
    fn test_signer_mismatch_rejected() {
        let k = keeper(OracleParams::default());
        let msg = OracleMsg::DelegateFeedConsent(MsgDelegateFeedConsent::new(
            ValAddress::new("V1"),
            AccAddress::new("F1"),
        ));
        let tx = SignedMsg::new(AccAddress::new("F1"), msg);
        assert!(matches!(
            k.deliver(&tx, BlockHeight(0)),
            Err(OrakelError::SignerMismatch { .. })
        ));
        assert_eq!(k.get_feeder(&ValAddress::new("V1")).unwrap(), AccAddress::new("V1"));
    }

    #[test]
    fn test_period_tallied_once() {
        let k = keeper(OracleParams::default());
        k.end_period(Period(0)).unwrap();
        assert!(matches!(
            k.end_period(Period(0)),
            Err(OrakelError::PeriodAlreadyTallied(0))
        ));
        assert_eq!(k.last_tallied_period().unwrap(), Some(Period(0)));
        assert!(k.end_period(Period(1)).is_ok());
    }

    #[test]
    fn test_whitelist_denom_without_votes_is_missed() {
        let k = keeper(OracleParams {
            whitelist: vec![Denom::new("ukrw"), Denom::new("uusd")],
            ..Default::default()
        });
        let outcome = k.end_period(Period(0)).unwrap();

        assert!(outcome.ballots.is_empty());
        assert_eq!(outcome.marks[&ValAddress::new("V1")].misses, 2);
        assert_eq!(k.get_miss_count(&ValAddress::new("V2"), Period(1)).unwrap(), 2);
    }

    #[test]
    fn test_miss_count_ignores_stale_window() {
        let k = keeper(OracleParams {
            whitelist: vec![Denom::new("ukrw")],
            slash_window: 2,
            ..Default::default()
        });
        // Period 1 closes window 0 but is never tallied, so the counter stays
        k.end_period(Period(0)).unwrap();
        let v1 = ValAddress::new("V1");
        assert_eq!(k.get_miss_count(&v1, Period(1)).unwrap(), 1);

        assert_eq!(k.get_miss_count(&v1, Period(2)).unwrap(), 0);
        assert_eq!(k.get_participation(&v1, Period(2)).unwrap().misses, 0);
        assert_eq!(k.miss_count(&v1, 0).unwrap(), 1);
    }

    #[test]
    fn test_seeded_rates() {
        let k = keeper(OracleParams::default());
        k.set_rate(&Denom::new("uusd"), ExchangeRate::from(dec!(1.5))).unwrap();
        k.set_rate(&Denom::new("ukrw"), ExchangeRate::from(dec!(1800))).unwrap();

        assert_eq!(
            k.get_rate(&Denom::new("uusd")).unwrap(),
            Some(ExchangeRate::from(dec!(1.5)))
        );
        assert_eq!(k.get_rate(&Denom::new("umnt")).unwrap(), None);

        let rates = k.get_rates().unwrap();
        let denoms: Vec<_> = rates.keys().map(|d| d.as_str()).collect();
        assert_eq!(denoms, vec!["ukrw", "uusd"]);
        assert_eq!(rates[&Denom::new("ukrw")].period, None);
    }
}
