//! Node runtime combining state, oracle keeper and mempool

use orakel_core::{
    BlockHeight, NodeConfig, OrakelError, OrakelResult, Period, StateMutator, StateProvider,
    StateRoot, StateVersion, Timestamp, TotalPower, TxId, VotingPowerSource,
};
use orakel_oracle::{
    GenesisConfig, GenesisInitializer, OracleKeeper, OracleMsg, PeriodOutcome, SignedMsg,
    ValidatorSet,
};
use orakel_state::{StateSnapshot, StateStore};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::mempool::Mempool;
use crate::store::NodeStore;

const GENESIS_KEY: &[u8] = b"meta:genesis";

/// Receipts kept for `/tx/:id` lookups
const MAX_RECEIPTS: usize = 10_000;

/// How a delivered transaction ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TxStatus {
    Committed,
    Rejected { kind: String, message: String },
}

/// Result of a delivered transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_id: String,
    pub height: BlockHeight,
    #[serde(flatten)]
    pub status: TxStatus,
}

/// What one block did
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockSummary {
    pub height: BlockHeight,
    pub period: Period,
    pub committed: usize,
    pub rejected: usize,
    pub state_root: StateRoot,
    pub timestamp: Timestamp,
    pub tally: Option<PeriodOutcome>,
}

/// Bounded receipt log
#[derive(Default)]
struct Receipts {
    by_id: HashMap<TxId, TxReceipt>,
    order: VecDeque<TxId>,
}

impl Receipts {
    fn insert(&mut self, tx_id: TxId, receipt: TxReceipt) {
        if self.by_id.insert(tx_id, receipt).is_none() {
            self.order.push_back(tx_id);
        }
        while self.order.len() > MAX_RECEIPTS {
            if let Some(old) = self.order.pop_front() {
                self.by_id.remove(&old);
            }
        }
    }
}

/// Node runtime managing all components
pub struct NodeRuntime {
    config: NodeConfig,
    chain_id: String,
    state: Arc<NodeStore>,
    validators: Arc<ValidatorSet>,
    keeper: RwLock<OracleKeeper<NodeStore>>,
    mempool: Mempool,
    height: RwLock<BlockHeight>,
    state_root: RwLock<StateRoot>,
    receipts: RwLock<Receipts>,
    last_tally: RwLock<Option<PeriodOutcome>>,
}

impl NodeRuntime {
    /// Create a runtime, opening state and applying genesis on first start
    pub fn new(config: NodeConfig, genesis: GenesisConfig) -> OrakelResult<Self> {
        genesis.validate()?;

        let state = Arc::new(NodeStore::open(&config)?);
        let validators = Arc::new(genesis.validator_set());
        let keeper = Arc::new(OracleKeeper::new(
            state.clone(),
            genesis.params.clone(),
            validators.clone(),
        )?);

        if state.get(GENESIS_KEY)?.is_none() {
            GenesisInitializer::new(keeper.clone(), genesis.clone()).initialize()?;
            state.set(GENESIS_KEY, genesis.chain_id.as_bytes())?;
        } else {
            info!("State already initialized, skipping genesis");
        }

        // Resume at the first block of the period after the last tally
        let vote_period = genesis.params.vote_period;
        let height = match keeper.last_tallied_period()? {
            Some(period) => BlockHeight((period.0 + 1) * vote_period),
            None => BlockHeight(0),
        };

        let keeper = Arc::try_unwrap(keeper)
            .map_err(|_| OrakelError::Internal("keeper still shared after genesis".into()))?;
        let state_root = state.compute_root()?;
        let mempool = Mempool::new(config.mempool.max_size, config.mempool.max_per_signer);

        info!(
            "Runtime ready: chain {}, height {}, root {}",
            genesis.chain_id, height, state_root
        );

        Ok(Self {
            config,
            chain_id: genesis.chain_id,
            state,
            validators,
            keeper: RwLock::new(keeper),
            mempool,
            height: RwLock::new(height),
            state_root: RwLock::new(state_root),
            receipts: RwLock::new(Receipts::default()),
            last_tally: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// Height of the next block
    pub fn height(&self) -> BlockHeight {
        *self.height.read()
    }

    pub fn current_period(&self) -> Period {
        self.keeper.read().period_of(self.height())
    }

    pub fn state_version(&self) -> StateVersion {
        self.state.version()
    }

    pub fn state_root(&self) -> StateRoot {
        *self.state_root.read()
    }

    pub fn validators(&self) -> &Arc<ValidatorSet> {
        &self.validators
    }

    pub fn total_power(&self) -> TotalPower {
        self.validators.total_power()
    }

    /// Read access to the keeper; never observes a half-applied block
    pub fn keeper(&self) -> parking_lot::RwLockReadGuard<'_, OracleKeeper<NodeStore>> {
        self.keeper.read()
    }

    pub fn last_tally(&self) -> Option<PeriodOutcome> {
        self.last_tally.read().clone()
    }

    pub fn mempool_size(&self) -> usize {
        self.mempool.size()
    }

    pub fn mempool_tx_ids(&self) -> Vec<TxId> {
        self.mempool.all_tx_ids()
    }

    pub fn is_transaction_pending(&self, tx_id: &TxId) -> bool {
        self.mempool.contains(tx_id)
    }

    pub fn get_receipt(&self, tx_id: &TxId) -> Option<TxReceipt> {
        self.receipts.read().by_id.get(tx_id).cloned()
    }

    /// Copy of the whole state between blocks
    pub fn snapshot(&self) -> OrakelResult<StateSnapshot> {
        let _keeper = self.keeper.read();
        StateSnapshot::capture(self.state.as_ref())
    }

    /// Stateless checks, then queue for the next block
    pub fn submit_transaction(&self, tx: SignedMsg) -> OrakelResult<TxId> {
        tx.check_signer()?;
        {
            let keeper = self.keeper.read();
            match &tx.msg {
                OracleMsg::Prevote(msg) => {
                    msg.validate_basic()?;
                }
                OracleMsg::Vote(msg) => msg.validate_basic(keeper.params())?,
                OracleMsg::DelegateFeedConsent(msg) => msg.validate_basic()?,
            }
        }

        let tx_id = self.mempool.add(tx)?;
        debug!("Transaction {} queued", tx_id);
        Ok(tx_id)
    }

    /// Deliver pending transactions at the current height, and tally if the
    /// height closes a voting period
    pub fn produce_block(&self) -> OrakelResult<BlockSummary> {
        let keeper = self.keeper.write();
        let height = *self.height.read();
        let period = keeper.period_of(height);

        let pending = self.mempool.take(self.config.mempool.max_block_txs);
        let mut committed = 0;
        let mut rejected = 0;
        let mut receipts = Vec::with_capacity(pending.len());

        for entry in pending {
            let status = match keeper.deliver(&entry.tx, height) {
                Ok(()) => {
                    committed += 1;
                    TxStatus::Committed
                }
                Err(e) => {
                    rejected += 1;
                    TxStatus::Rejected {
                        kind: e.kind().to_string(),
                        message: e.to_string(),
                    }
                }
            };
            receipts.push((
                entry.tx_id,
                TxReceipt {
                    tx_id: entry.tx_id.to_hex(),
                    height,
                    status,
                },
            ));
        }

        let tally = if height.ends_period(keeper.params().vote_period) {
            let outcome = keeper.end_period(period)?;
            *self.last_tally.write() = Some(outcome.clone());
            Some(outcome)
        } else {
            None
        };

        let state_root = self.state.compute_root()?;
        *self.state_root.write() = state_root;
        *self.height.write() = height.next();

        {
            let mut log = self.receipts.write();
            for (tx_id, receipt) in receipts {
                log.insert(tx_id, receipt);
            }
        }

        if committed + rejected > 0 || tally.is_some() {
            info!(
                "Block {} ({}): {} committed, {} rejected, root {}",
                height, period, committed, rejected, state_root
            );
        }
        if rejected > 0 {
            warn!("{} transactions rejected at height {}", rejected, height);
        }

        Ok(BlockSummary {
            height,
            period,
            committed,
            rejected,
            state_root,
            timestamp: Timestamp::now(),
            tally,
        })
    }

    /// Produce blocks until the current voting period has been tallied
    pub fn finish_period(&self) -> OrakelResult<PeriodOutcome> {
        loop {
            if let Some(outcome) = self.produce_block()?.tally {
                return Ok(outcome);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orakel_core::{AccAddress, Denom, ExchangeRate, StorageBackend, ValAddress};
    use orakel_oracle::{MsgExchangeRatePrevote, MsgExchangeRateVote};
    use rust_decimal_macros::dec;

    fn runtime() -> NodeRuntime {
        NodeRuntime::new(NodeConfig::default(), GenesisConfig::devnet()).unwrap()
    }

    fn vote(validator: &str, rate: ExchangeRate) -> MsgExchangeRateVote {
        MsgExchangeRateVote::new(
            rate,
            "ab12",
            Denom::new("ukrw"),
            AccAddress::new(validator),
            ValAddress::new(validator),
        )
    }

    #[tokio::test]
    async fn test_runtime_creation() {
        let runtime = runtime();
        assert_eq!(runtime.height(), BlockHeight(0));
        assert_eq!(runtime.total_power(), 200);
        assert_ne!(runtime.state_root(), orakel_core::Hash::ZERO);
    }

    #[tokio::test]
    async fn test_submit_rejects_bad_messages() {
        let runtime = runtime();
        let mut msg = MsgExchangeRatePrevote::for_vote(&vote("val1", ExchangeRate::from(dec!(1))));
        msg.hash = "00".into();

        let err = runtime
            .submit_transaction(SignedMsg::by_expected(OracleMsg::Prevote(msg)))
            .unwrap_err();
        assert!(matches!(err, OrakelError::InvalidHashLength { .. }));
        assert_eq!(runtime.mempool_size(), 0);
    }

    #[tokio::test]
    async fn test_full_voting_round() {
        let runtime = runtime();
        let votes = [
            vote("val1", ExchangeRate::from(dec!(1800))),
            vote("val2", ExchangeRate::from(dec!(1801))),
            vote("val3", ExchangeRate::from(dec!(1799))),
        ];

        for v in &votes {
            let prevote = OracleMsg::Prevote(MsgExchangeRatePrevote::for_vote(v));
            runtime
                .submit_transaction(SignedMsg::by_expected(prevote))
                .unwrap();
        }
        let first = runtime.finish_period().unwrap();
        assert_eq!(first.period, Period(0));

        let mut ids = Vec::new();
        for v in &votes {
            let id = runtime
                .submit_transaction(SignedMsg::by_expected(OracleMsg::Vote(v.clone())))
                .unwrap();
            ids.push(id);
        }
        let outcome = runtime.finish_period().unwrap();

        assert_eq!(
            runtime.keeper().get_rate(&Denom::new("ukrw")).unwrap(),
            Some(ExchangeRate::from(dec!(1800)))
        );
        assert_eq!(outcome.published().count(), 1);
        for id in ids {
            let receipt = runtime.get_receipt(&id).unwrap();
            assert_eq!(receipt.status, TxStatus::Committed);
        }
        assert!(runtime.last_tally().is_some());
    }

    #[tokio::test]
    async fn test_rejected_delivery_gets_receipt() {
        let runtime = runtime();
        // Passes stateless checks but has no prevote behind it
        let id = runtime
            .submit_transaction(SignedMsg::by_expected(OracleMsg::Vote(vote(
                "val1",
                ExchangeRate::from(dec!(1)),
            ))))
            .unwrap();
        runtime.produce_block().unwrap();

        let receipt = runtime.get_receipt(&id).unwrap();
        assert!(matches!(
            receipt.status,
            TxStatus::Rejected { ref kind, .. } if kind == "verification_failed"
        ));
    }

    #[tokio::test]
    async fn test_snapshot_matches_state_root() {
        let runtime = runtime();
        runtime.finish_period().unwrap();

        let snapshot = runtime.snapshot().unwrap();
        assert!(snapshot.verify());
        assert_eq!(snapshot.root, runtime.state_root());
        assert_eq!(
            snapshot.restore().compute_root().unwrap(),
            runtime.state_root()
        );
    }

    #[tokio::test]
    async fn test_sled_restart_resumes_after_last_tally() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = NodeConfig {
            storage: StorageBackend::Sled,
            data_dir: tmp.path().to_path_buf(),
            ..Default::default()
        };
        let genesis = GenesisConfig::devnet().add_rate("uusd", ExchangeRate::from(dec!(1.25)));

        {
            let runtime = NodeRuntime::new(config.clone(), genesis.clone()).unwrap();
            runtime.finish_period().unwrap();
            runtime.finish_period().unwrap();
        }

        let runtime = NodeRuntime::new(config, genesis).unwrap();
        assert_eq!(runtime.height(), BlockHeight(10));
        assert_eq!(
            runtime.keeper().get_rate(&Denom::new("uusd")).unwrap(),
            Some(ExchangeRate::from(dec!(1.25)))
        );
    }
}
