//! Checkpoint and the redo/undo recovery state machine.

use crate::record::{KeyType, LogOp, LogRec, ValType};
use kestrel_common::page::Lsn;
use kestrel_common::types::TxnId;
use std::collections::{BTreeMap, HashMap};

/// The shadow key/value database recovery replays against.
pub type KvDatabase = HashMap<KeyType, ValType>;

/// Active transaction table: transaction id to its last observed LSN.
pub type ActiveTxnTable = HashMap<TxnId, Lsn>;

/// A completed checkpoint: the LSN it covers, the transactions active
/// when it was taken, and the database snapshot as of that point.
#[derive(Debug, Default, Clone)]
pub struct CheckPoint {
    pub checkpoint_lsn: Lsn,
    pub active_txns: ActiveTxnTable,
    pub persist_data: KvDatabase,
}

impl CheckPoint {
    /// Creates a checkpoint covering `checkpoint_lsn`.
    pub fn new(checkpoint_lsn: Lsn) -> Self {
        Self {
            checkpoint_lsn,
            active_txns: ActiveTxnTable::new(),
            persist_data: KvDatabase::new(),
        }
    }

    /// Records a transaction active at checkpoint time.
    pub fn add_active_txn(&mut self, txn_id: TxnId, last_lsn: Lsn) {
        self.active_txns.insert(txn_id, last_lsn);
    }

    /// Records a key/value pair in the snapshot.
    pub fn add_data(&mut self, key: KeyType, value: ValType) {
        self.persist_data.insert(key, value);
    }
}

/// Replays a log over a checkpoint: redo everything at or after the
/// checkpoint LSN, then undo every transaction still active.
///
/// After `redo_phase` and `undo_phase` the database reflects exactly
/// the committed prefix of the log.
#[derive(Debug, Default)]
pub struct RecoveryManager {
    log_recs: BTreeMap<Lsn, LogRec>,
    persist_lsn: Lsn,
    active_txns: ActiveTxnTable,
    data: KvDatabase,
}

impl RecoveryManager {
    /// Creates an empty recovery manager.
    pub fn new() -> Self {
        Self {
            log_recs: BTreeMap::new(),
            persist_lsn: Lsn::INVALID,
            active_txns: ActiveTxnTable::new(),
            data: KvDatabase::new(),
        }
    }

    /// Adopts a checkpoint as the recovery starting point.
    pub fn init(&mut self, checkpoint: CheckPoint) {
        self.persist_lsn = checkpoint.checkpoint_lsn;
        self.active_txns = checkpoint.active_txns;
        self.data = checkpoint.persist_data;
    }

    /// Appends a log record to the in-memory log store.
    pub fn append_log_rec(&mut self, rec: LogRec) {
        self.log_recs.insert(rec.lsn, rec);
    }

    /// Replays every record with `lsn >= checkpoint_lsn`.
    ///
    /// Each record refreshes the ATT; COMMIT retires its transaction,
    /// ABORT rolls the transaction back first and then retires it.
    pub fn redo_phase(&mut self) {
        let lsns: Vec<Lsn> = self
            .log_recs
            .range(self.persist_lsn..)
            .map(|(&lsn, _)| lsn)
            .collect();

        for lsn in lsns {
            let (txn_id, op) = {
                let rec = &self.log_recs[&lsn];
                (rec.txn_id, rec.op.clone())
            };
            self.active_txns.insert(txn_id, lsn);

            match op {
                LogOp::Insert { key, value } => {
                    self.data.insert(key, value);
                }
                LogOp::Delete { key, .. } => {
                    self.data.remove(&key);
                }
                LogOp::Update {
                    old_key,
                    new_key,
                    new_value,
                    ..
                } => {
                    self.data.remove(&old_key);
                    self.data.insert(new_key, new_value);
                }
                LogOp::Commit => {
                    self.active_txns.remove(&txn_id);
                }
                LogOp::Abort => {
                    self.rollback(txn_id);
                    self.active_txns.remove(&txn_id);
                }
                LogOp::Begin | LogOp::Invalid => {}
            }
        }
    }

    /// Rolls back every transaction still in the ATT, then clears it.
    pub fn undo_phase(&mut self) {
        let txns: Vec<TxnId> = self.active_txns.keys().copied().collect();
        for txn_id in txns {
            self.rollback(txn_id);
        }
        self.active_txns.clear();
    }

    /// Walks a transaction's prev_lsn chain backwards, inverting each
    /// record. Stops at `Lsn::INVALID` or an unknown LSN.
    fn rollback(&mut self, txn_id: TxnId) {
        let Some(&last_lsn) = self.active_txns.get(&txn_id) else {
            return;
        };

        let mut cursor = last_lsn;
        while cursor.is_valid() {
            let (op, prev_lsn) = match self.log_recs.get(&cursor) {
                Some(rec) => (rec.op.clone(), rec.prev_lsn),
                None => break,
            };
            match op {
                LogOp::Insert { key, .. } => {
                    self.data.remove(&key);
                }
                LogOp::Delete { key, value } => {
                    self.data.insert(key, value);
                }
                LogOp::Update {
                    old_key,
                    old_value,
                    new_key,
                    ..
                } => {
                    self.data.remove(&new_key);
                    self.data.insert(old_key, old_value);
                }
                _ => {}
            }
            cursor = prev_lsn;
        }
    }

    /// Returns the recovered database.
    pub fn database(&self) -> &KvDatabase {
        &self.data
    }

    /// Returns the active transaction table.
    pub fn active_txns(&self) -> &ActiveTxnTable {
        &self.active_txns
    }
}
