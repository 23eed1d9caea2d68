use anyhow::{Ok, Result};
use core::fmt;
use log::debug;
use std::sync::{Arc, Mutex};

use crate::{
    buffer::{buffer::Buffer, manager::BufferManager},
    log::manager::LogManager,
    tx::transaction::Transaction,
    Lsn,
};

use super::log_record::{
    create_log_record, CheckpointRecord, CommitRecord, LogOperation, RollbackRecord, SetIntRecord,
    SetStringRecord, StartRecord,
};

#[derive(Debug)]
enum RecoveryManagerError {
    RecoveryError,
}

impl std::error::Error for RecoveryManagerError {}
impl fmt::Display for RecoveryManagerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecoveryManagerError::RecoveryError => write!(f, "recovery error"),
        }
    }
}

/// Each transaction has its own recovery manager. It emits the transaction's
/// log records (a START record at construction, pre-image update records on
/// every logged write) and runs the undo-only protocols: commit flushes the
/// transaction's buffers before the COMMIT record reaches the log, so a
/// committed update is always on disk and recovery never needs a redo pass.
#[derive(Debug, Clone)]
pub struct RecoveryManager {
    log_manager: Arc<Mutex<LogManager>>,
    buffer_manager: Arc<BufferManager>,
    txnum: i32,
}

impl RecoveryManager {
    pub fn new(
        log_manager: Arc<Mutex<LogManager>>,
        buffer_manager: Arc<BufferManager>,
        txnum: i32,
    ) -> Result<Self> {
        StartRecord::write_to_log(Arc::clone(&log_manager), txnum)?;
        Ok(Self {
            log_manager,
            buffer_manager,
            txnum,
        })
    }

    /// Flushes this transaction's modified buffers, then writes and flushes
    /// a COMMIT record. The buffer flush must come first; see the type docs.
    pub fn commit(&self) -> Result<()> {
        self.buffer_manager.flush_all(self.txnum)?;
        let lsn = CommitRecord::write_to_log(Arc::clone(&self.log_manager), self.txnum)?;
        self.log_manager.lock().unwrap().flush(lsn)?;
        debug!("tx {} committed", self.txnum);
        Ok(())
    }

    /// Undoes this transaction's updates, then writes and flushes a
    /// ROLLBACK record.
    pub fn rollback(&self, tx: &mut Transaction) -> Result<()> {
        self.do_rollback(tx)?;
        self.buffer_manager.flush_all(self.txnum)?;
        let lsn = RollbackRecord::write_to_log(Arc::clone(&self.log_manager), self.txnum)?;
        self.log_manager.lock().unwrap().flush(lsn)?;
        debug!("tx {} rolled back", self.txnum);
        Ok(())
    }

    /// Undoes every update of every uncompleted transaction, then writes and
    /// flushes a quiescent CHECKPOINT record.
    pub fn recover(&self, tx: &mut Transaction) -> Result<()> {
        self.do_recover(tx)?;
        self.buffer_manager.flush_all(self.txnum)?;
        let lsn = CheckpointRecord::write_to_log(Arc::clone(&self.log_manager))?;
        self.log_manager.lock().unwrap().flush(lsn)?;
        debug!("recovery finished, checkpoint written");
        Ok(())
    }

    /// Appends a SETINT record carrying the pre-image at `offset` and
    /// returns its LSN.
    pub fn set_int(&self, buf: &mut Buffer, offset: usize) -> Result<Lsn> {
        let old_val = buf.contents().get_int(offset)?;
        if let Some(block) = buf.block().clone() {
            return SetIntRecord::write_to_log(
                Arc::clone(&self.log_manager),
                self.txnum,
                &block,
                offset,
                old_val,
            );
        }
        Err(RecoveryManagerError::RecoveryError.into())
    }

    /// Appends a SETSTRING record carrying the pre-image at `offset` and
    /// returns its LSN.
    pub fn set_string(&self, buf: &mut Buffer, offset: usize) -> Result<Lsn> {
        let old_val = buf.contents().get_string(offset)?;
        if let Some(block) = buf.block().clone() {
            return SetStringRecord::write_to_log(
                Arc::clone(&self.log_manager),
                self.txnum,
                &block,
                offset,
                &old_val,
            );
        }
        Err(RecoveryManagerError::RecoveryError.into())
    }

    /// Walks the log newest-first, undoing this transaction's updates until
    /// its START record is reached.
    fn do_rollback(&self, tx: &mut Transaction) -> Result<()> {
        let mut iter = self.log_manager.lock().unwrap().iterator()?;
        while iter.has_next() {
            if let Some(bytes) = iter.next() {
                let rec = create_log_record(bytes)?;
                if rec.tx_number() == self.txnum {
                    if rec.op() == LogOperation::Start {
                        return Ok(());
                    }

                    rec.undo(tx)?;
                }
            }
        }

        Ok(())
    }

    /// Walks the log newest-first, undoing every update whose transaction
    /// has no COMMIT or ROLLBACK record. Stops at a CHECKPOINT record or the
    /// start of the log.
    fn do_recover(&self, tx: &mut Transaction) -> Result<()> {
        let mut finished_txs = vec![];
        let mut iter = self.log_manager.lock().unwrap().iterator()?;
        while iter.has_next() {
            if let Some(bytes) = iter.next() {
                let rec = create_log_record(bytes)?;
                match rec.op() {
                    LogOperation::Checkpoint => return Ok(()),
                    LogOperation::Commit | LogOperation::Rollback => {
                        finished_txs.push(rec.tx_number())
                    }
                    LogOperation::SetInt | LogOperation::SetString => {
                        if !finished_txs.contains(&rec.tx_number()) {
                            rec.undo(tx)?;
                        }
                    }
                    LogOperation::Start => {}
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tempfile::tempdir;

    use crate::{
        buffer::manager::BufferManager,
        file::{block_id::BlockId, manager::FileManager},
        log::manager::LogManager,
        tx::{concurrency::lock_table::LockTable, transaction::Transaction},
    };

    fn new_tx(
        file_manager: &Arc<Mutex<FileManager>>,
        log_manager: &Arc<Mutex<LogManager>>,
        buffer_manager: &Arc<BufferManager>,
        lock_table: &Arc<LockTable>,
    ) -> Transaction {
        Transaction::new(
            Arc::clone(file_manager),
            Arc::clone(log_manager),
            Arc::clone(buffer_manager),
            Arc::clone(lock_table),
        )
        .unwrap()
    }

    /// Commits pre-images with two transactions, overwrites them with two
    /// more (one rolled back, one left in flight with its buffers forced to
    /// disk), then simulates a crash by rebuilding the buffer pool and lock
    /// table over the same files. Recovery must restore the committed values.
    #[test]
    fn test_recover_undoes_uncommitted_updates() {
        let temp_dir = tempdir().unwrap();
        let db_dir = temp_dir.path().to_str().unwrap();

        let block_size = 400;
        let file_manager = Arc::new(Mutex::new(FileManager::new(db_dir, block_size).unwrap()));
        let log_manager = Arc::new(Mutex::new(
            LogManager::new(Arc::clone(&file_manager), "minirel.log").unwrap(),
        ));
        let buffer_manager = Arc::new(BufferManager::new(
            Arc::clone(&file_manager),
            Arc::clone(&log_manager),
            8,
        ));
        let lock_table = Arc::new(LockTable::new());

        let blk0 = BlockId::new("testfile", 0);
        let blk1 = BlockId::new("testfile", 1);

        // Initialize both blocks with committed values
        let mut tx1 = new_tx(&file_manager, &log_manager, &buffer_manager, &lock_table);
        let mut tx2 = new_tx(&file_manager, &log_manager, &buffer_manager, &lock_table);
        tx1.pin(&blk0).unwrap();
        tx2.pin(&blk1).unwrap();
        for i in 0..6 {
            tx1.set_int(&blk0, i * 4, i as i32, false).unwrap();
            tx2.set_int(&blk1, i * 4, i as i32, false).unwrap();
        }
        tx1.set_string(&blk0, 30, "abc", false).unwrap();
        tx2.set_string(&blk1, 30, "def", false).unwrap();
        tx1.commit().unwrap();
        tx2.commit().unwrap();

        // Overwrite with logging; neither transaction commits
        let mut tx3 = new_tx(&file_manager, &log_manager, &buffer_manager, &lock_table);
        let mut tx4 = new_tx(&file_manager, &log_manager, &buffer_manager, &lock_table);
        tx3.pin(&blk0).unwrap();
        tx4.pin(&blk1).unwrap();
        for i in 0..6 {
            tx3.set_int(&blk0, i * 4, i as i32 + 100, true).unwrap();
            tx4.set_int(&blk1, i * 4, i as i32 + 100, true).unwrap();
        }
        tx3.set_string(&blk0, 30, "uvw", true).unwrap();
        tx4.set_string(&blk1, 30, "xyz", true).unwrap();

        // Force tx4's updates to disk, then roll tx3 back; tx4 "crashes"
        // before committing
        buffer_manager.flush_all(tx4.tx_number()).unwrap();
        tx3.rollback().unwrap();

        // Simulated restart: fresh pool and lock table over the same files
        let buffer_manager = Arc::new(BufferManager::new(
            Arc::clone(&file_manager),
            Arc::clone(&log_manager),
            8,
        ));
        let lock_table = Arc::new(LockTable::new());

        let mut recovery_tx = new_tx(&file_manager, &log_manager, &buffer_manager, &lock_table);
        recovery_tx.recover().unwrap();

        // Both blocks hold the committed values again
        let mut tx5 = new_tx(&file_manager, &log_manager, &buffer_manager, &lock_table);
        tx5.pin(&blk0).unwrap();
        tx5.pin(&blk1).unwrap();
        for i in 0..6 {
            assert_eq!(tx5.get_int(&blk0, i * 4).unwrap(), i as i32);
            assert_eq!(tx5.get_int(&blk1, i * 4).unwrap(), i as i32);
        }
        assert_eq!(tx5.get_string(&blk0, 30).unwrap(), "abc");
        assert_eq!(tx5.get_string(&blk1, 30).unwrap(), "def");
        tx5.commit().unwrap();
    }
}
