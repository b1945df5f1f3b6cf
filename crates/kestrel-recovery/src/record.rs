//! Log records for the recovery model.
//!
//! Recovery operates over an in-memory log of key/value operations
//! against a shadow database, keeping the redo/undo state machine
//! testable independent of the page layer.

use kestrel_common::page::Lsn;
use kestrel_common::types::TxnId;
use std::collections::HashMap;

/// Key type of the shadow database.
pub type KeyType = String;
/// Value type of the shadow database.
pub type ValType = i32;

/// The operation a log record describes.
#[derive(Debug, Clone, PartialEq)]
pub enum LogOp {
    Invalid,
    Begin,
    Commit,
    Abort,
    Insert {
        key: KeyType,
        value: ValType,
    },
    Delete {
        key: KeyType,
        value: ValType,
    },
    Update {
        old_key: KeyType,
        old_value: ValType,
        new_key: KeyType,
        new_value: ValType,
    },
}

/// A single log record.
///
/// `prev_lsn` threads the records of one transaction into a backward
/// chain; the first record of a transaction carries `Lsn::INVALID`.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRec {
    pub lsn: Lsn,
    pub prev_lsn: Lsn,
    pub txn_id: TxnId,
    pub op: LogOp,
}

/// Allocates LSNs and threads per-transaction prev_lsn chains.
///
/// LSN assignment is a monotonic counter owned by the factory; the
/// prev-lsn map is per-factory state.
#[derive(Debug, Default)]
pub struct LogFactory {
    next_lsn: i32,
    prev_lsn_map: HashMap<TxnId, Lsn>,
}

impl LogFactory {
    /// Creates a factory starting at LSN 0.
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self, txn_id: TxnId) -> (Lsn, Lsn) {
        let lsn = Lsn(self.next_lsn);
        self.next_lsn += 1;
        let prev = self.prev_lsn_map.insert(txn_id, lsn).unwrap_or(Lsn::INVALID);
        (lsn, prev)
    }

    /// Creates a BEGIN record.
    pub fn begin_log(&mut self, txn_id: TxnId) -> LogRec {
        let (lsn, prev_lsn) = self.next(txn_id);
        LogRec {
            lsn,
            prev_lsn,
            txn_id,
            op: LogOp::Begin,
        }
    }

    /// Creates an INSERT record.
    pub fn insert_log(&mut self, txn_id: TxnId, key: KeyType, value: ValType) -> LogRec {
        let (lsn, prev_lsn) = self.next(txn_id);
        LogRec {
            lsn,
            prev_lsn,
            txn_id,
            op: LogOp::Insert { key, value },
        }
    }

    /// Creates a DELETE record remembering the deleted pair.
    pub fn delete_log(&mut self, txn_id: TxnId, key: KeyType, value: ValType) -> LogRec {
        let (lsn, prev_lsn) = self.next(txn_id);
        LogRec {
            lsn,
            prev_lsn,
            txn_id,
            op: LogOp::Delete { key, value },
        }
    }

    /// Creates an UPDATE record carrying both images.
    pub fn update_log(
        &mut self,
        txn_id: TxnId,
        old_key: KeyType,
        old_value: ValType,
        new_key: KeyType,
        new_value: ValType,
    ) -> LogRec {
        let (lsn, prev_lsn) = self.next(txn_id);
        LogRec {
            lsn,
            prev_lsn,
            txn_id,
            op: LogOp::Update {
                old_key,
                old_value,
                new_key,
                new_value,
            },
        }
    }

    /// Creates a COMMIT record.
    pub fn commit_log(&mut self, txn_id: TxnId) -> LogRec {
        let (lsn, prev_lsn) = self.next(txn_id);
        LogRec {
            lsn,
            prev_lsn,
            txn_id,
            op: LogOp::Commit,
        }
    }

    /// Creates an ABORT record.
    pub fn abort_log(&mut self, txn_id: TxnId) -> LogRec {
        let (lsn, prev_lsn) = self.next(txn_id);
        LogRec {
            lsn,
            prev_lsn,
            txn_id,
            op: LogOp::Abort,
        }
    }
}
