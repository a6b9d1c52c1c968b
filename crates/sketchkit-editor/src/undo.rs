//! Undo transaction boundary.
//!
//! The edit session never implements undo itself; it brackets every
//! undoable operation (drags, deletes, box-select edits) in a named
//! transaction on the host document's [`TransactionSink`]. The in-memory
//! [`RecordingSink`] backs the tests and any host without a real document
//! framework.

use tracing::debug;
use uuid::Uuid;

/// Opaque id of one open or finished transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(Uuid);

impl TransactionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// The host document's undo interface.
pub trait TransactionSink {
    /// Opens a named undoable transaction.
    fn open(&mut self, name: &str) -> TransactionId;
    /// Commits; the transaction becomes one undo entry.
    fn commit(&mut self, id: TransactionId);
    /// Aborts; the document rolls back to the state at `open`.
    fn abort(&mut self, id: TransactionId);
}

/// How a recorded transaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOutcome {
    Open,
    Committed,
    Aborted,
}

/// One recorded transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub name: String,
    pub outcome: TransactionOutcome,
}

/// In-memory sink recording the transaction stream.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Vec<TransactionRecord>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    /// Number of committed transactions, i.e. undo entries produced.
    pub fn committed_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.outcome == TransactionOutcome::Committed)
            .count()
    }

    pub fn aborted_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.outcome == TransactionOutcome::Aborted)
            .count()
    }

    fn finish(&mut self, id: TransactionId, outcome: TransactionOutcome) {
        if let Some(record) = self.records.iter_mut().find(|r| r.id == id) {
            record.outcome = outcome;
        }
    }
}

impl TransactionSink for RecordingSink {
    fn open(&mut self, name: &str) -> TransactionId {
        let id = TransactionId::new();
        debug!(name, "open transaction");
        self.records.push(TransactionRecord {
            id,
            name: name.to_string(),
            outcome: TransactionOutcome::Open,
        });
        id
    }

    fn commit(&mut self, id: TransactionId) {
        debug!(?id, "commit transaction");
        self.finish(id, TransactionOutcome::Committed);
    }

    fn abort(&mut self, id: TransactionId) {
        debug!(?id, "abort transaction");
        self.finish(id, TransactionOutcome::Aborted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_commit_and_abort() {
        let mut sink = RecordingSink::new();
        let a = sink.open("Drag point");
        let b = sink.open("Drag edge");
        sink.commit(a);
        sink.abort(b);

        assert_eq!(sink.committed_count(), 1);
        assert_eq!(sink.aborted_count(), 1);
        assert_eq!(sink.records()[0].name, "Drag point");
        assert_eq!(sink.records()[0].outcome, TransactionOutcome::Committed);
        assert_eq!(sink.records()[1].outcome, TransactionOutcome::Aborted);
    }
}
