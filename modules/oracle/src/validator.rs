//! Commit-reveal validation
//!
//! Nothing here writes state. Each check either rejects the message or hands
//! back the record the keeper should store.

use orakel_core::{
    AccAddress, OracleParams, OrakelError, OrakelResult, Period, ValAddress, VotingPowerSource,
};
use orakel_state::StateStore;
use tracing::debug;

use crate::ballot::{BallotStore, ExchangeRatePrevote, ExchangeRateVote};
use crate::feeder::FeederRegistry;
use crate::msgs::{MsgExchangeRatePrevote, MsgExchangeRateVote};

/// A vote that passed every check, with the prevote it consumes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedVote {
    pub prevote: ExchangeRatePrevote,
    pub vote: ExchangeRateVote,
}

/// Commit-reveal validator
pub struct CommitRevealValidator<'a, S: StateStore> {
    params: &'a OracleParams,
    feeders: &'a FeederRegistry<S>,
    ballots: &'a BallotStore<S>,
    powers: &'a dyn VotingPowerSource,
}

impl<'a, S: StateStore> CommitRevealValidator<'a, S> {
    pub fn new(
        params: &'a OracleParams,
        feeders: &'a FeederRegistry<S>,
        ballots: &'a BallotStore<S>,
        powers: &'a dyn VotingPowerSource,
    ) -> Self {
        Self {
            params,
            feeders,
            ballots,
            powers,
        }
    }

    fn check_permission(
        &self,
        msg_feeder: &AccAddress,
        validator: &ValAddress,
    ) -> OrakelResult<()> {
        let feeder = self.feeders.resolve_feeder(validator)?;
        if &feeder != msg_feeder {
            return Err(OrakelError::NoVotingPermission {
                feeder: msg_feeder.to_string(),
                validator: validator.to_string(),
            });
        }
        Ok(())
    }

    fn check_power(&self, validator: &ValAddress) -> OrakelResult<()> {
        if self.powers.power_of(validator) == 0 {
            return Err(OrakelError::ValidatorNotFound(validator.to_string()));
        }
        Ok(())
    }

    /// Validate a prevote submitted in `period`
    pub fn validate_prevote(
        &self,
        msg: &MsgExchangeRatePrevote,
        period: Period,
    ) -> OrakelResult<ExchangeRatePrevote> {
        let hash = msg.validate_basic()?;
        self.check_permission(&msg.feeder, &msg.validator)?;
        self.check_power(&msg.validator)?;

        Ok(ExchangeRatePrevote {
            hash,
            denom: msg.denom.clone(),
            validator: msg.validator.clone(),
            submit_period: period,
        })
    }

    /// Validate a vote submitted in `period` against the prevote from `period - 1`
    pub fn validate_vote(
        &self,
        msg: &MsgExchangeRateVote,
        period: Period,
    ) -> OrakelResult<ValidatedVote> {
        msg.validate_basic(self.params)?;
        self.check_permission(&msg.feeder, &msg.validator)?;
        self.check_power(&msg.validator)?;

        if let Some(existing) = self.ballots.get_vote(&msg.denom, &msg.validator)? {
            if existing.period == period {
                return Err(OrakelError::AlreadyVoted {
                    denom: msg.denom.to_string(),
                    validator: msg.validator.to_string(),
                });
            }
        }

        let prior = period.previous().ok_or_else(|| {
            OrakelError::VerificationFailed("no period precedes the first one".into())
        })?;
        let prevote = self
            .ballots
            .get_prevote(prior, &msg.denom, &msg.validator)?
            .ok_or_else(|| {
                OrakelError::VerificationFailed(format!(
                    "no prevote from {} for {} in {}",
                    msg.validator, msg.denom, prior
                ))
            })?;

        let revealed = msg.generate_hash();
        if revealed != prevote.hash {
            debug!(
                "Reveal {} does not match commitment {} for {}/{}",
                revealed, prevote.hash, msg.denom, msg.validator
            );
            return Err(OrakelError::VerificationFailed(format!(
                "reveal does not match prevote for {}",
                msg.denom
            )));
        }

        Ok(ValidatedVote {
            vote: ExchangeRateVote {
                exchange_rate: msg.exchange_rate.clone(),
                denom: msg.denom.clone(),
                validator: msg.validator.clone(),
                period,
            },
            prevote,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staking::{ValidatorInfo, ValidatorSet};
    use orakel_core::{Denom, ExchangeRate};
    use orakel_state::MemoryStateStore;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    struct Fixture {
        params: OracleParams,
        feeders: FeederRegistry<MemoryStateStore>,
        ballots: BallotStore<MemoryStateStore>,
        powers: ValidatorSet,
    }

    impl Fixture {
        fn new() -> Self {
            let state = Arc::new(MemoryStateStore::new());
            Self {
                params: OracleParams::default(),
                feeders: FeederRegistry::new(state.clone()),
                ballots: BallotStore::new(state),
                powers: ValidatorSet::with_validators(vec![
                    ValidatorInfo::new(ValAddress::new("V1"), 10),
                    ValidatorInfo::new(ValAddress::new("V2"), 0),
                ]),
            }
        }

        fn validator(&self) -> CommitRevealValidator<'_, MemoryStateStore> {
            CommitRevealValidator::new(&self.params, &self.feeders, &self.ballots, &self.powers)
        }
    }

    fn vote_msg(validator: &str, feeder: &str) -> MsgExchangeRateVote {
        MsgExchangeRateVote::new(
            ExchangeRate::from(dec!(100)),
            "s1",
            Denom::new("ukrw"),
            AccAddress::new(feeder),
            ValAddress::new(validator),
        )
    }

    #[test]
    fn test_prevote_permission_and_power() {
        let fx = Fixture::new();
        let v = fx.validator();

        let ok = MsgExchangeRatePrevote::for_vote(&vote_msg("V1", "V1"));
        assert!(v.validate_prevote(&ok, Period(1)).is_ok());

        let foreign = MsgExchangeRatePrevote::for_vote(&vote_msg("V1", "F1"));
        assert!(matches!(
            v.validate_prevote(&foreign, Period(1)),
            Err(OrakelError::NoVotingPermission { .. })
        ));

        let powerless = MsgExchangeRatePrevote::for_vote(&vote_msg("V2", "V2"));
        assert!(matches!(
            v.validate_prevote(&powerless, Period(1)),
            Err(OrakelError::ValidatorNotFound(_))
        ));
    }

    #[test]
    fn test_vote_requires_prior_period_prevote() {
        let fx = Fixture::new();
        let v = fx.validator();
        let msg = vote_msg("V1", "V1");

        let prevote = v
            .validate_prevote(&MsgExchangeRatePrevote::for_vote(&msg), Period(3))
            .unwrap();
        fx.ballots.add_prevote(&prevote).unwrap();

        // Same period: the commitment is not yet revealable
        assert!(matches!(
            v.validate_vote(&msg, Period(3)),
            Err(OrakelError::VerificationFailed(_))
        ));
        // Two periods later: too late
        assert!(matches!(
            v.validate_vote(&msg, Period(5)),
            Err(OrakelError::VerificationFailed(_))
        ));

        let validated = v.validate_vote(&msg, Period(4)).unwrap();
        assert_eq!(validated.prevote, prevote);
        assert_eq!(validated.vote.period, Period(4));
    }

    #[test]
    fn test_vote_in_first_period_fails() {
        let fx = Fixture::new();
        assert!(matches!(
            fx.validator().validate_vote(&vote_msg("V1", "V1"), Period(0)),
            Err(OrakelError::VerificationFailed(_))
        ));
    }

    #[test]
    fn test_vote_hash_mismatch() {
        let fx = Fixture::new();
        let v = fx.validator();
        let msg = vote_msg("V1", "V1");
        let prevote = v
            .validate_prevote(&MsgExchangeRatePrevote::for_vote(&msg), Period(1))
            .unwrap();
        fx.ballots.add_prevote(&prevote).unwrap();

        let mut other_salt = msg.clone();
        other_salt.salt = "s2".into();
        assert!(matches!(
            v.validate_vote(&other_salt, Period(2)),
            Err(OrakelError::VerificationFailed(_))
        ));
    }
}
