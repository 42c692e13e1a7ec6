//! Ballot entry store: live prevotes and revealed votes

use orakel_core::{
    Denom, ExchangeRate, OrakelResult, Period, StateChange, ValAddress, VoteHash, VotingPower,
    VotingPowerSource,
};
use orakel_state::{compose_key, decode_value, set_change, StateStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

const PREVOTE_PREFIX: &[u8] = b"prevote:";
const VOTE_PREFIX: &[u8] = b"vote:";

pub fn prevote_key(period: Period, denom: &Denom, validator: &ValAddress) -> Vec<u8> {
    compose_key(
        PREVOTE_PREFIX,
        &[
            &period.0.to_be_bytes(),
            denom.as_str().as_bytes(),
            validator.as_str().as_bytes(),
        ],
    )
}

pub fn vote_key(denom: &Denom, validator: &ValAddress) -> Vec<u8> {
    compose_key(
        VOTE_PREFIX,
        &[denom.as_str().as_bytes(), validator.as_str().as_bytes()],
    )
}

fn denom_votes_prefix(denom: &Denom) -> Vec<u8> {
    compose_key(VOTE_PREFIX, &[denom.as_str().as_bytes()])
}

/// Stored commitment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRatePrevote {
    pub hash: VoteHash,
    pub denom: Denom,
    pub validator: ValAddress,
    pub submit_period: Period,
}

/// Stored reveal, waiting for the tally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRateVote {
    pub exchange_rate: ExchangeRate,
    pub denom: Denom,
    pub validator: ValAddress,
    pub period: Period,
}

/// One weighted entry of a ballot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotItem {
    pub validator: ValAddress,
    pub exchange_rate: ExchangeRate,
    pub power: VotingPower,
}

impl BallotItem {
    pub fn new(validator: ValAddress, exchange_rate: ExchangeRate, power: VotingPower) -> Self {
        Self {
            validator,
            exchange_rate,
            power,
        }
    }
}

/// Everything revealed for one denom in the closing period
#[derive(Debug, Clone, Default)]
pub struct DrainedBallot {
    /// Votes backed by power, sorted by (rate, validator)
    pub items: Vec<BallotItem>,
    /// Every validator that revealed, with or without power
    pub voters: BTreeSet<ValAddress>,
}

/// Ballot entry store
pub struct BallotStore<S: StateStore> {
    state: Arc<S>,
}

impl<S: StateStore> BallotStore<S> {
    pub fn new(state: Arc<S>) -> Self {
        Self { state }
    }

    pub fn get_prevote(
        &self,
        period: Period,
        denom: &Denom,
        validator: &ValAddress,
    ) -> OrakelResult<Option<ExchangeRatePrevote>> {
        self.state
            .get(&prevote_key(period, denom, validator))?
            .map(|bytes| decode_value(&bytes))
            .transpose()
    }

    /// Insert a prevote, replacing one already submitted this period for the key
    pub fn add_prevote(&self, prevote: &ExchangeRatePrevote) -> OrakelResult<()> {
        let key = prevote_key(prevote.submit_period, &prevote.denom, &prevote.validator);
        self.state.apply_batch(vec![set_change(key, prevote)?])?;
        Ok(())
    }

    /// All live prevotes in key order
    pub fn prevotes(&self) -> OrakelResult<Vec<ExchangeRatePrevote>> {
        self.state
            .scan_prefix(PREVOTE_PREFIX)?
            .iter()
            .map(|(_, v)| decode_value(v))
            .collect()
    }

    pub fn get_vote(
        &self,
        denom: &Denom,
        validator: &ValAddress,
    ) -> OrakelResult<Option<ExchangeRateVote>> {
        self.state
            .get(&vote_key(denom, validator))?
            .map(|bytes| decode_value(&bytes))
            .transpose()
    }

    /// Replace the matched prevote with the revealed vote in one batch
    pub fn match_and_consume_vote(
        &self,
        prevote: &ExchangeRatePrevote,
        vote: &ExchangeRateVote,
    ) -> OrakelResult<()> {
        let changes = vec![
            StateChange::Delete {
                key: prevote_key(prevote.submit_period, &prevote.denom, &prevote.validator),
            },
            set_change(vote_key(&vote.denom, &vote.validator), vote)?,
        ];
        self.state.apply_batch(changes)?;
        Ok(())
    }

    /// Revealed votes grouped by denom, both levels ordered
    pub fn votes(&self) -> OrakelResult<BTreeMap<Denom, Vec<ExchangeRateVote>>> {
        let mut by_denom: BTreeMap<Denom, Vec<ExchangeRateVote>> = BTreeMap::new();
        for (_, bytes) in self.state.scan_prefix(VOTE_PREFIX)? {
            let vote: ExchangeRateVote = decode_value(&bytes)?;
            by_denom.entry(vote.denom.clone()).or_default().push(vote);
        }
        for votes in by_denom.values_mut() {
            votes.sort_by(|a, b| a.validator.cmp(&b.validator));
        }
        Ok(by_denom)
    }

    /// Denoms with at least one revealed vote
    pub fn voted_denoms(&self) -> OrakelResult<BTreeSet<Denom>> {
        Ok(self.votes()?.into_keys().collect())
    }

    /// Take every vote on `denom`, weighting those revealed in `period`.
    ///
    /// Deletions are queued on `batch`; the caller commits them together with
    /// the tally result. Votes left over from an earlier period are dropped.
    pub fn drain_for_tally(
        &self,
        denom: &Denom,
        period: Period,
        powers: &dyn VotingPowerSource,
        batch: &mut Vec<StateChange>,
    ) -> OrakelResult<DrainedBallot> {
        let mut drained = DrainedBallot::default();

        for (key, bytes) in self.state.scan_prefix(&denom_votes_prefix(denom))? {
            batch.push(StateChange::Delete { key });

            let vote: ExchangeRateVote = decode_value(&bytes)?;
            if vote.period != period {
                continue;
            }

            let power = powers.power_of(&vote.validator);
            if power > 0 {
                drained
                    .items
                    .push(BallotItem::new(vote.validator.clone(), vote.exchange_rate, power));
            }
            drained.voters.insert(vote.validator);
        }

        drained.items.sort_by(|a, b| {
            a.exchange_rate
                .cmp(&b.exchange_rate)
                .then_with(|| a.validator.cmp(&b.validator))
        });

        Ok(drained)
    }

    /// Queue deletion of every prevote submitted before `closing`
    pub fn drop_expired_prevotes(
        &self,
        closing: Period,
        batch: &mut Vec<StateChange>,
    ) -> OrakelResult<Vec<ExchangeRatePrevote>> {
        let mut expired = Vec::new();
        for (key, bytes) in self.state.scan_prefix(PREVOTE_PREFIX)? {
            let prevote: ExchangeRatePrevote = decode_value(&bytes)?;
            if prevote.submit_period < closing {
                batch.push(StateChange::Delete { key });
                expired.push(prevote);
            }
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staking::{ValidatorInfo, ValidatorSet};
    use orakel_core::StateMutator;
    use orakel_state::MemoryStateStore;
    use rust_decimal_macros::dec;

    fn prevote(period: u64, denom: &str, validator: &str, fill: u8) -> ExchangeRatePrevote {
        ExchangeRatePrevote {
            hash: VoteHash::from_bytes([fill; 20]),
            denom: Denom::new(denom),
            validator: ValAddress::new(validator),
            submit_period: Period(period),
        }
    }

    fn vote(period: u64, denom: &str, validator: &str, rate: ExchangeRate) -> ExchangeRateVote {
        ExchangeRateVote {
            exchange_rate: rate,
            denom: Denom::new(denom),
            validator: ValAddress::new(validator),
            period: Period(period),
        }
    }

    #[test]
    fn test_same_period_prevote_overwrites() {
        let store = BallotStore::new(Arc::new(MemoryStateStore::new()));
        store.add_prevote(&prevote(1, "ukrw", "V1", 1)).unwrap();
        store.add_prevote(&prevote(1, "ukrw", "V1", 2)).unwrap();

        let live = store.prevotes().unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].hash, VoteHash::from_bytes([2; 20]));
    }

    #[test]
    fn test_consume_moves_prevote_to_vote() {
        let store = BallotStore::new(Arc::new(MemoryStateStore::new()));
        let p = prevote(1, "ukrw", "V1", 1);
        store.add_prevote(&p).unwrap();

        let v = vote(2, "ukrw", "V1", ExchangeRate::from(dec!(100)));
        store.match_and_consume_vote(&p, &v).unwrap();

        assert!(store
            .get_prevote(Period(1), &Denom::new("ukrw"), &ValAddress::new("V1"))
            .unwrap()
            .is_none());
        assert_eq!(
            store.get_vote(&Denom::new("ukrw"), &ValAddress::new("V1")).unwrap(),
            Some(v)
        );
    }

    #[test]
    fn test_drain_orders_and_weights() {
        let state = Arc::new(MemoryStateStore::new());
        let store = BallotStore::new(state.clone());
        let powers = ValidatorSet::with_validators(vec![
            ValidatorInfo::new(ValAddress::new("V1"), 10),
            ValidatorInfo::new(ValAddress::new("V2"), 5),
            ValidatorInfo::new(ValAddress::new("V3"), 0),
        ]);

        for v in [
            vote(2, "ukrw", "V2", ExchangeRate::from(dec!(100))),
            vote(2, "ukrw", "V1", ExchangeRate::from(dec!(100))),
            vote(2, "ukrw", "V3", ExchangeRate::from(dec!(99))),
            vote(2, "uusd", "V1", ExchangeRate::from(dec!(1))),
            vote(1, "ukrw", "V4", ExchangeRate::from(dec!(50))),
        ] {
            let key = vote_key(&v.denom, &v.validator);
            state
                .set(&key, &orakel_state::encode_value(&v).unwrap())
                .unwrap();
        }

        let mut batch = Vec::new();
        let drained = store
            .drain_for_tally(&Denom::new("ukrw"), Period(2), &powers, &mut batch)
            .unwrap();

        // Equal rates fall back to validator order; zero power is left out
        let order: Vec<_> = drained.items.iter().map(|i| i.validator.as_str()).collect();
        assert_eq!(order, vec!["V1", "V2"]);
        assert_eq!(drained.items[0].power, 10);
        assert!(drained.voters.contains(&ValAddress::new("V3")));
        assert!(!drained.voters.contains(&ValAddress::new("V4")));

        // Every ukrw vote, stale ones included, is queued for deletion
        assert_eq!(batch.len(), 4);
        state.apply_batch(batch).unwrap();
        let left = store.votes().unwrap();
        assert_eq!(left.keys().collect::<Vec<_>>(), vec![&Denom::new("uusd")]);
    }

    #[test]
    fn test_drop_expired_prevotes() {
        let state = Arc::new(MemoryStateStore::new());
        let store = BallotStore::new(state.clone());
        store.add_prevote(&prevote(1, "ukrw", "V1", 1)).unwrap();
        store.add_prevote(&prevote(2, "ukrw", "V1", 2)).unwrap();
        store.add_prevote(&prevote(2, "uusd", "V2", 3)).unwrap();

        let mut batch = Vec::new();
        let expired = store.drop_expired_prevotes(Period(2), &mut batch).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].submit_period, Period(1));

        state.apply_batch(batch).unwrap();
        assert_eq!(store.prevotes().unwrap().len(), 2);
    }
}
