use anyhow::{Ok, Result};
use core::fmt;
use std::sync::{
    atomic::{AtomicI32, Ordering},
    Arc, Mutex,
};

use crate::{
    buffer::manager::BufferManager,
    file::{block_id::BlockId, manager::FileManager},
    log::manager::LogManager,
};

use super::{
    bufferlist::BufferList,
    concurrency::{lock_table::LockTable, manager::ConcurrencyManager},
    recovery::manager::RecoveryManager,
};

static NEXT_TX_NUM: AtomicI32 = AtomicI32::new(0);

#[derive(Debug)]
enum TransactionError {
    BlockNotPinned,
}

impl std::error::Error for TransactionError {}
impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransactionError::BlockNotPinned => write!(f, "block not pinned"),
        }
    }
}

/// Provides transaction management for clients, ensuring that all
/// transactions are serializable, recoverable, and in general satisfy the
/// ACID properties.
///
/// Each transaction composes a recovery manager (which writes the START
/// record on construction), a concurrency manager holding its block locks,
/// and the list of buffers it has pinned. Reads take shared locks; writes
/// take exclusive locks and log the pre-image before touching the page.
/// A transaction belongs to one client thread.
#[derive(Debug)]
pub struct Transaction {
    recovery_manager: RecoveryManager,
    concurrency_manager: ConcurrencyManager,
    buffer_manager: Arc<BufferManager>,
    file_manager: Arc<Mutex<FileManager>>,
    buffers: BufferList,
    txnum: i32,
}

impl Transaction {
    pub fn new(
        file_manager: Arc<Mutex<FileManager>>,
        log_manager: Arc<Mutex<LogManager>>,
        buffer_manager: Arc<BufferManager>,
        lock_table: Arc<LockTable>,
    ) -> Result<Self> {
        let txnum = NEXT_TX_NUM.fetch_add(1, Ordering::SeqCst);
        let recovery_manager =
            RecoveryManager::new(Arc::clone(&log_manager), Arc::clone(&buffer_manager), txnum)?;
        let concurrency_manager = ConcurrencyManager::new(Arc::clone(&lock_table));
        let tx_buffers = BufferList::new(Arc::clone(&buffer_manager));

        Ok(Self {
            recovery_manager,
            concurrency_manager,
            buffer_manager,
            file_manager,
            buffers: tx_buffers,
            txnum,
        })
    }

    pub fn tx_number(&self) -> i32 {
        self.txnum
    }

    /// Commit the current transaction.
    /// Flush all modified buffers (and their log records), write and flush a
    /// commit record to the log, release all locks, and unpin any pinned buffers.
    pub fn commit(&mut self) -> Result<()> {
        self.recovery_manager.commit()?;
        self.concurrency_manager.release()?;
        self.buffers.unpin_all()?;
        Ok(())
    }

    /// Rollback the current transaction.
    /// Undo any modified values, flush those buffers, write and flush a
    /// rollback record to the log, release all locks, and unpin any pinned buffers.
    pub fn rollback(&mut self) -> Result<()> {
        let recovery_manager = self.recovery_manager.clone();
        recovery_manager.rollback(self)?;
        self.concurrency_manager.release()?;
        self.buffers.unpin_all()?;
        Ok(())
    }

    /// Flush all modified buffers, then go through the log rolling back all
    /// uncommitted transactions, and finally write a quiescent checkpoint
    /// record. Called once during system startup, before user transactions
    /// begin, from a transaction dedicated to the recovery pass.
    pub fn recover(&mut self) -> Result<()> {
        self.buffer_manager.flush_all(self.txnum)?;
        let recovery_manager = self.recovery_manager.clone();
        recovery_manager.recover(self)?;
        Ok(())
    }

    /// Pin the specified block; the transaction manages the buffer for the client.
    pub fn pin(&mut self, block: &BlockId) -> Result<()> {
        self.buffers.pin(block)?;
        Ok(())
    }

    /// Look up the buffer pinned to this block and unpin it.
    pub fn unpin(&mut self, block: &BlockId) -> Result<()> {
        self.buffers.unpin(block)?;
        Ok(())
    }

    /// Return the integer stored at the specified offset of the specified
    /// block, after obtaining a shared lock on it.
    pub fn get_int(&mut self, block: &BlockId, offset: usize) -> Result<i32> {
        self.concurrency_manager.slock(block)?;

        if let Some(idx) = self.buffers.get_buffer_idx(block) {
            let (lock, _) = &*self.buffer_manager.state;
            let mut state = lock.lock().unwrap();
            return Ok(state.buffer_pool[idx].contents().get_int(offset)?);
        }

        Err(TransactionError::BlockNotPinned.into())
    }

    /// Return the string stored at the specified offset of the specified
    /// block, after obtaining a shared lock on it.
    pub fn get_string(&mut self, block: &BlockId, offset: usize) -> Result<String> {
        self.concurrency_manager.slock(block)?;

        if let Some(idx) = self.buffers.get_buffer_idx(block) {
            let (lock, _) = &*self.buffer_manager.state;
            let mut state = lock.lock().unwrap();
            return Ok(state.buffer_pool[idx].contents().get_string(offset)?);
        }

        Err(TransactionError::BlockNotPinned.into())
    }

    /// Store an integer at the specified offset of the specified block.
    /// Obtains an exclusive lock first. If `ok_to_log`, the current value at
    /// that offset goes into an update log record before the page changes,
    /// and the buffer is marked with this transaction and the record's LSN.
    pub fn set_int(
        &mut self,
        block: &BlockId,
        offset: usize,
        val: i32,
        ok_to_log: bool,
    ) -> Result<()> {
        self.concurrency_manager.xlock(block)?;

        if let Some(idx) = self.buffers.get_buffer_idx(block) {
            let (lock, _) = &*self.buffer_manager.state;
            let mut state = lock.lock().unwrap();
            let mut lsn = -1;
            if ok_to_log {
                lsn = self
                    .recovery_manager
                    .set_int(&mut state.buffer_pool[idx], offset)?;
            }

            state.buffer_pool[idx].contents().set_int(offset, val)?;
            state.buffer_pool[idx].set_modified(self.txnum, lsn);
            return Ok(());
        }

        Err(TransactionError::BlockNotPinned.into())
    }

    /// Store a string at the specified offset of the specified block.
    /// Obtains an exclusive lock first. If `ok_to_log`, the current value at
    /// that offset goes into an update log record before the page changes,
    /// and the buffer is marked with this transaction and the record's LSN.
    pub fn set_string(
        &mut self,
        block: &BlockId,
        offset: usize,
        val: &str,
        ok_to_log: bool,
    ) -> Result<()> {
        self.concurrency_manager.xlock(block)?;

        if let Some(idx) = self.buffers.get_buffer_idx(block) {
            let (lock, _) = &*self.buffer_manager.state;
            let mut state = lock.lock().unwrap();
            let mut lsn = -1;
            if ok_to_log {
                lsn = self
                    .recovery_manager
                    .set_string(&mut state.buffer_pool[idx], offset)?;
            }

            state.buffer_pool[idx].contents().set_string(offset, val)?;
            state.buffer_pool[idx].set_modified(self.txnum, lsn);
            return Ok(());
        }

        Err(TransactionError::BlockNotPinned.into())
    }

    /// Return the number of blocks in the specified file, after obtaining a
    /// shared lock on the file's end-of-file marker.
    pub fn size(&mut self, filename: &str) -> Result<i64> {
        let end_block = BlockId::end_of_file(filename);
        self.concurrency_manager.slock(&end_block)?;
        self.file_manager.lock().unwrap().length(filename)
    }

    /// Append a new block to the end of the specified file and return a
    /// reference to it, after obtaining an exclusive lock on the file's
    /// end-of-file marker.
    pub fn append(&mut self, filename: &str) -> Result<BlockId> {
        let end_block = BlockId::end_of_file(filename);
        self.concurrency_manager.xlock(&end_block)?;
        self.file_manager.lock().unwrap().append(filename)
    }

    pub fn block_size(&self) -> usize {
        self.file_manager.lock().unwrap().block_size()
    }

    pub fn available_buffers(&self) -> usize {
        self.buffer_manager.available()
    }
}
