//! Pending oracle messages, delivered in arrival order

use orakel_core::{AccAddress, Hashable, OrakelError, OrakelResult, Timestamp, TxId};
use orakel_oracle::SignedMsg;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Mempool entry with metadata
#[derive(Debug, Clone)]
pub struct MempoolEntry {
    pub tx_id: TxId,
    pub tx: SignedMsg,
    pub received_at: Timestamp,
    seq: u64,
}

/// Transaction mempool
///
/// Oracle messages carry no fee, so delivery order is plain arrival order.
pub struct Mempool {
    /// Transactions by ID
    transactions: RwLock<HashMap<TxId, MempoolEntry>>,
    /// Transactions by signer
    by_signer: RwLock<HashMap<AccAddress, HashSet<TxId>>>,
    /// Transactions by arrival sequence
    by_arrival: RwLock<BTreeMap<u64, TxId>>,
    next_seq: RwLock<u64>,
    /// Maximum pool size
    max_size: usize,
    /// Maximum transactions per signer
    max_per_signer: usize,
}

impl Mempool {
    pub fn new(max_size: usize, max_per_signer: usize) -> Self {
        Self {
            transactions: RwLock::new(HashMap::new()),
            by_signer: RwLock::new(HashMap::new()),
            by_arrival: RwLock::new(BTreeMap::new()),
            next_seq: RwLock::new(0),
            max_size,
            max_per_signer,
        }
    }

    /// Add a transaction to the mempool
    pub fn add(&self, tx: SignedMsg) -> OrakelResult<TxId> {
        let tx_id = tx.hash();
        let signer = tx.signer.clone();

        let mut transactions = self.transactions.write();

        if transactions.contains_key(&tx_id) {
            return Err(OrakelError::MempoolRejected(format!(
                "{} is already pending",
                tx_id
            )));
        }

        if transactions.len() >= self.max_size {
            warn!("Mempool full, transaction rejected");
            return Err(OrakelError::MempoolRejected("mempool is full".into()));
        }

        let mut by_signer = self.by_signer.write();
        if let Some(pending) = by_signer.get(&signer) {
            if pending.len() >= self.max_per_signer {
                warn!("Too many transactions from signer {}", signer);
                return Err(OrakelError::MempoolRejected(format!(
                    "{} has {} pending transactions",
                    signer,
                    pending.len()
                )));
            }
        }

        let seq = {
            let mut next = self.next_seq.write();
            let seq = *next;
            *next += 1;
            seq
        };

        transactions.insert(
            tx_id,
            MempoolEntry {
                tx_id,
                tx,
                received_at: Timestamp::now(),
                seq,
            },
        );
        by_signer.entry(signer).or_default().insert(tx_id);
        self.by_arrival.write().insert(seq, tx_id);

        debug!("Added transaction {} to mempool (seq: {})", tx_id, seq);

        Ok(tx_id)
    }

    /// Remove a transaction
    pub fn remove(&self, tx_id: &TxId) -> Option<MempoolEntry> {
        let entry = self.transactions.write().remove(tx_id)?;

        let mut by_signer = self.by_signer.write();
        if let Some(pending) = by_signer.get_mut(&entry.tx.signer) {
            pending.remove(tx_id);
            if pending.is_empty() {
                by_signer.remove(&entry.tx.signer);
            }
        }

        self.by_arrival.write().remove(&entry.seq);

        debug!("Removed transaction {} from mempool", tx_id);

        Some(entry)
    }

    /// Remove and return up to `limit` transactions, oldest first
    pub fn take(&self, limit: usize) -> Vec<MempoolEntry> {
        let ids: Vec<TxId> = self
            .by_arrival
            .read()
            .values()
            .take(limit)
            .copied()
            .collect();

        ids.iter().filter_map(|id| self.remove(id)).collect()
    }

    pub fn get(&self, tx_id: &TxId) -> Option<SignedMsg> {
        self.transactions.read().get(tx_id).map(|e| e.tx.clone())
    }

    pub fn contains(&self, tx_id: &TxId) -> bool {
        self.transactions.read().contains_key(tx_id)
    }

    /// Pending transactions of one signer
    pub fn get_by_signer(&self, signer: &AccAddress) -> Vec<SignedMsg> {
        let by_signer = self.by_signer.read();
        let transactions = self.transactions.read();

        by_signer
            .get(signer)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| transactions.get(id))
                    .map(|e| e.tx.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn size(&self) -> usize {
        self.transactions.read().len()
    }

    /// All pending IDs in arrival order
    pub fn all_tx_ids(&self) -> Vec<TxId> {
        self.by_arrival.read().values().copied().collect()
    }

    pub fn clear(&self) {
        self.transactions.write().clear();
        self.by_signer.write().clear();
        self.by_arrival.write().clear();
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new(10_000, 64)
    }
}

/// Shared mempool
pub type SharedMempool = Arc<Mempool>;

/// Create shared mempool
pub fn create_mempool(max_size: usize, max_per_signer: usize) -> SharedMempool {
    Arc::new(Mempool::new(max_size, max_per_signer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use orakel_core::ValAddress;
    use orakel_oracle::{MsgDelegateFeedConsent, OracleMsg};

    fn delegate_tx(operator: &str, delegate: &str) -> SignedMsg {
        SignedMsg::by_expected(OracleMsg::DelegateFeedConsent(MsgDelegateFeedConsent::new(
            ValAddress::new(operator),
            AccAddress::new(delegate),
        )))
    }

    #[test]
    fn test_mempool_add_remove() {
        let mempool = Mempool::new(100, 10);
        let tx_id = mempool.add(delegate_tx("V1", "F1")).unwrap();

        assert!(mempool.contains(&tx_id));
        assert_eq!(mempool.get_by_signer(&AccAddress::new("V1")).len(), 1);

        mempool.remove(&tx_id);
        assert!(!mempool.contains(&tx_id));
        assert!(mempool.get_by_signer(&AccAddress::new("V1")).is_empty());
    }

    #[test]
    fn test_mempool_rejects_duplicates() {
        let mempool = Mempool::new(100, 10);
        mempool.add(delegate_tx("V1", "F1")).unwrap();
        assert!(matches!(
            mempool.add(delegate_tx("V1", "F1")),
            Err(OrakelError::MempoolRejected(_))
        ));
    }

    #[test]
    fn test_mempool_take_in_arrival_order() {
        let mempool = Mempool::new(100, 10);
        let first = mempool.add(delegate_tx("V2", "F1")).unwrap();
        let second = mempool.add(delegate_tx("V1", "F1")).unwrap();
        let third = mempool.add(delegate_tx("V3", "F1")).unwrap();

        let taken: Vec<_> = mempool.take(2).into_iter().map(|e| e.tx_id).collect();
        assert_eq!(taken, vec![first, second]);
        assert_eq!(mempool.all_tx_ids(), vec![third]);
    }

    #[test]
    fn test_mempool_limits() {
        let mempool = Mempool::new(3, 2);
        mempool.add(delegate_tx("V1", "F1")).unwrap();
        mempool.add(delegate_tx("V1", "F2")).unwrap();
        assert!(mempool.add(delegate_tx("V1", "F3")).is_err());

        mempool.add(delegate_tx("V2", "F1")).unwrap();
        assert!(matches!(
            mempool.add(delegate_tx("V3", "F1")),
            Err(OrakelError::MempoolRejected(_))
        ));
    }
}
