use anyhow::{Ok, Result};
use core::fmt;
use std::{
    collections::HashMap,
    sync::{Arc, Condvar, Mutex},
    time::{Duration, Instant},
};

use crate::file::block_id::BlockId;

const MAX_TIME: u128 = 10_000; // 10 seconds
const WAIT_TICK: Duration = Duration::from_millis(2_000);

#[derive(Debug)]
pub struct LockAbortError;

impl std::error::Error for LockAbortError {}
impl fmt::Display for LockAbortError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "lock abort")
    }
}

#[derive(Debug)]
enum Lock {
    Exclusive,
    Shared(usize),
}

/// The process-wide table of block locks, shared by every transaction's
/// concurrency manager.
///
/// A block is either unlocked (absent), shared by `n` readers, or held
/// exclusively by one writer. A request that conflicts waits on the table's
/// condvar in short ticks; a waiter that has spent ten seconds without
/// acquiring the lock is presumed deadlocked and aborts with `LockAbortError`.
/// The aborted transaction is expected to roll back, releasing its locks and
/// unblocking its peers.
#[derive(Debug, Clone)]
pub struct LockTable {
    state: Arc<(Mutex<HashMap<BlockId, Lock>>, Condvar)>,
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}

impl LockTable {
    pub fn new() -> Self {
        Self {
            state: Arc::new((Mutex::new(HashMap::new()), Condvar::new())),
        }
    }

    /// Acquires a shared lock, waiting out any exclusive holder.
    pub fn slock(&self, block: &BlockId) -> Result<()> {
        let (lock, cvar) = &*self.state;
        let mut locks = lock.lock().unwrap();
        let start = Instant::now();

        loop {
            match locks.get(block) {
                Some(Lock::Exclusive) => {
                    if start.elapsed().as_millis() >= MAX_TIME {
                        return Err(LockAbortError.into());
                    }

                    let (new_locks, _) = cvar
                        .wait_timeout(locks, WAIT_TICK)
                        .map_err(|_| LockAbortError)?;

                    locks = new_locks;
                }
                Some(Lock::Shared(count)) => {
                    let new_count = *count + 1;
                    locks.insert(block.clone(), Lock::Shared(new_count));
                    return Ok(());
                }
                None => {
                    locks.insert(block.clone(), Lock::Shared(1));
                    return Ok(());
                }
            }
        }
    }

    /// Upgrades to an exclusive lock. The caller must already hold a shared
    /// lock on the block; the upgrade waits until it is the only sharer left.
    pub fn xlock(&self, block: &BlockId) -> Result<()> {
        let (lock, cvar) = &*self.state;
        let mut locks = lock.lock().unwrap();
        let start = Instant::now();

        loop {
            match locks.get(block) {
                Some(Lock::Shared(count)) if *count > 1 => {
                    if start.elapsed().as_millis() >= MAX_TIME {
                        return Err(LockAbortError.into());
                    }

                    let (new_locks, _) = cvar
                        .wait_timeout(locks, WAIT_TICK)
                        .map_err(|_| LockAbortError)?;

                    locks = new_locks;
                }
                _ => {
                    locks.insert(block.clone(), Lock::Exclusive);
                    return Ok(());
                }
            }
        }
    }

    // If this lock is the last lock on that block, then the waiting transactions are notified.
    pub fn unlock(&self, block: &BlockId) -> Result<()> {
        let (lock, cvar) = &*self.state;
        let mut locks = lock.lock().unwrap();

        match locks.get(block) {
            Some(Lock::Shared(count)) if *count > 1 => {
                let new_count = *count - 1;
                locks.insert(block.clone(), Lock::Shared(new_count));
            }
            _ => {
                locks.remove(block);
                cvar.notify_all();
            }
        }
        Ok(())
    }
}
