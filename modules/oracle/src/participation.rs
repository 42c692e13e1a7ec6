//! Participation ledger: per-validator miss and hit counters per slash window
//!
//! The ledger only counts. Penalties, if any, are decided by whoever reads the
//! window reports.

use orakel_core::{OracleParams, OrakelError, OrakelResult, Period, StateChange, ValAddress};
use orakel_state::{compose_key, decode_value, decompose_key, set_change, StateStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

const PARTICIPATION_PREFIX: &[u8] = b"participation:";
const REPORT_PREFIX: &[u8] = b"report:";

pub fn participation_key(validator: &ValAddress) -> Vec<u8> {
    compose_key(PARTICIPATION_PREFIX, &[validator.as_str().as_bytes()])
}

pub fn report_key(window: u64, validator: &ValAddress) -> Vec<u8> {
    compose_key(
        REPORT_PREFIX,
        &[&window.to_be_bytes(), validator.as_str().as_bytes()],
    )
}

fn report_window_prefix(window: u64) -> Vec<u8> {
    compose_key(REPORT_PREFIX, &[&window.to_be_bytes()])
}

/// Counters for one validator in one window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipationCounter {
    pub window: u64,
    pub misses: u64,
    pub hits: u64,
}

impl ParticipationCounter {
    pub fn new(window: u64) -> Self {
        Self {
            window,
            ..Default::default()
        }
    }
}

/// What one period did to one validator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodMark {
    pub misses: u64,
    pub hits: u64,
}

/// Final counters of a closed window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowReport {
    pub window: u64,
    pub counters: BTreeMap<ValAddress, ParticipationCounter>,
}

/// Participation ledger
pub struct ParticipationLedger<S: StateStore> {
    state: Arc<S>,
}

impl<S: StateStore> ParticipationLedger<S> {
    pub fn new(state: Arc<S>) -> Self {
        Self { state }
    }

    /// Counters of the open window
    pub fn get(&self, validator: &ValAddress) -> OrakelResult<Option<ParticipationCounter>> {
        self.state
            .get(&participation_key(validator))?
            .map(|bytes| decode_value(&bytes))
            .transpose()
    }

    /// Misses in the open window. A counter left over from an earlier
    /// window counts as zero.
    pub fn get_miss_count(&self, validator: &ValAddress, window: u64) -> OrakelResult<u64> {
        Ok(self
            .get(validator)?
            .filter(|c| c.window == window)
            .map(|c| c.misses)
            .unwrap_or(0))
    }

    /// Misses in `window`, open or retained
    pub fn miss_count(&self, validator: &ValAddress, window: u64) -> OrakelResult<u64> {
        if let Some(counter) = self.get(validator)? {
            if counter.window == window {
                return Ok(counter.misses);
            }
        }
        let closed: Option<ParticipationCounter> = self
            .state
            .get(&report_key(window, validator))?
            .map(|bytes| decode_value(&bytes))
            .transpose()?;
        Ok(closed.map(|c| c.misses).unwrap_or(0))
    }

    /// All open-window counters, ordered by validator
    pub fn counters(&self) -> OrakelResult<BTreeMap<ValAddress, ParticipationCounter>> {
        let mut counters = BTreeMap::new();
        for (key, bytes) in self.state.scan_prefix(PARTICIPATION_PREFIX)? {
            let counter: ParticipationCounter = decode_value(&bytes)?;
            counters.insert(validator_from_key(PARTICIPATION_PREFIX, &key)?, counter);
        }
        Ok(counters)
    }

    /// A retained closed window
    pub fn get_report(&self, window: u64) -> OrakelResult<Option<WindowReport>> {
        let entries = self.state.scan_prefix(&report_window_prefix(window))?;
        if entries.is_empty() {
            return Ok(None);
        }
        let mut counters = BTreeMap::new();
        for (key, bytes) in entries {
            let counter: ParticipationCounter = decode_value(&bytes)?;
            counters.insert(validator_from_key(REPORT_PREFIX, &key)?, counter);
        }
        Ok(Some(WindowReport { window, counters }))
    }

    /// Fold one period's marks into the counters.
    ///
    /// Writes are queued on `batch`. If `period` is the last of its window the
    /// window is closed: the report is stored, old reports beyond
    /// `retained_windows` are pruned, and the open counters are cleared.
    pub fn record_period(
        &self,
        period: Period,
        marks: &BTreeMap<ValAddress, PeriodMark>,
        params: &OracleParams,
        batch: &mut Vec<StateChange>,
    ) -> OrakelResult<Option<WindowReport>> {
        let window = period.window(params.slash_window);
        let mut counters = self.counters()?;

        for (validator, mark) in marks {
            let counter = counters
                .entry(validator.clone())
                .or_insert_with(|| ParticipationCounter::new(window));
            if counter.window != window {
                *counter = ParticipationCounter::new(window);
            }
            counter.misses += mark.misses;
            counter.hits += mark.hits;
        }

        if !period.ends_window(params.slash_window) {
            for (validator, mark) in marks {
                if let Some(counter) = counters.get(validator) {
                    if mark.misses > 0 || mark.hits > 0 {
                        batch.push(set_change(participation_key(validator), counter)?);
                    }
                }
            }
            return Ok(None);
        }

        for validator in counters.keys() {
            batch.push(StateChange::Delete {
                key: participation_key(validator),
            });
        }

        counters.retain(|_, c| c.window == window);
        if params.retained_windows > 0 {
            for (validator, counter) in &counters {
                batch.push(set_change(report_key(window, validator), counter)?);
            }
        }

        let oldest_kept = (window + 1).saturating_sub(params.retained_windows);
        for (key, bytes) in self.state.scan_prefix(REPORT_PREFIX)? {
            let counter: ParticipationCounter = decode_value(&bytes)?;
            if counter.window < oldest_kept {
                batch.push(StateChange::Delete { key });
            }
        }

        info!(
            "Closed participation window {} with {} validators",
            window,
            counters.len()
        );

        Ok(Some(WindowReport { window, counters }))
    }
}

/// The validator is always the last key segment
fn validator_from_key(prefix: &[u8], key: &[u8]) -> OrakelResult<ValAddress> {
    let segment = decompose_key(prefix, key)
        .and_then(|segments| segments.last().copied())
        .ok_or_else(|| OrakelError::StateCorruption("malformed participation key".into()))?;
    let address =
        std::str::from_utf8(segment).map_err(|e| OrakelError::StateCorruption(e.to_string()))?;
    Ok(ValAddress::new(address))
}
