use core::fmt;
use std::{
    sync::{Arc, Condvar, Mutex},
    time::{Duration, Instant},
};

use anyhow::{Error, Ok, Result};
use option_ext::OptionExt;

use crate::{
    file::{block_id::BlockId, manager::FileManager},
    log::manager::LogManager,
};

use super::buffer::Buffer;

const MAX_TIME: u128 = 10_000; // 10 seconds
const WAIT_TICK: Duration = Duration::from_millis(2_000);

#[derive(Debug)]
pub enum BufferManagerError {
    BufferAbort,
}

impl std::error::Error for BufferManagerError {}
impl fmt::Display for BufferManagerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BufferManagerError::BufferAbort => write!(f, "buffer abort"),
        }
    }
}

#[derive(Debug)]
pub struct BufferPoolState {
    pub buffer_pool: Vec<Buffer>,
    num_available: usize,
}

/// A fixed-size pool of buffers shared by every transaction.
///
/// Pinning a block reuses the buffer already holding it, or repurposes some
/// unpinned buffer (a plain first-fit scan; the contract only asks for
/// "some unpinned buffer"). When the pool is saturated, a pin waits on the
/// pool condvar in short ticks and gives up with `BufferAbort` once ten
/// seconds have elapsed in total.
#[derive(Debug)]
pub struct BufferManager {
    pub state: Arc<(Mutex<BufferPoolState>, Condvar)>,
}

impl BufferManager {
    pub fn new(
        file_manager: Arc<Mutex<FileManager>>,
        log_manager: Arc<Mutex<LogManager>>,
        num_buffers: usize,
    ) -> Self {
        let buffers = (0..num_buffers)
            .map(|_| Buffer::new(Arc::clone(&file_manager), Arc::clone(&log_manager)))
            .collect();

        let state = BufferPoolState {
            buffer_pool: buffers,
            num_available: num_buffers,
        };

        Self {
            state: Arc::new((Mutex::new(state), Condvar::new())),
        }
    }

    pub fn available(&self) -> usize {
        let (lock, _) = &*self.state;
        let state = lock.lock().unwrap();
        state.num_available
    }

    pub fn unpin(&self, idx: usize) -> Result<()> {
        let (lock, cvar) = &*self.state;
        let mut state = lock.lock().unwrap();

        state.buffer_pool[idx].unpin();
        if !state.buffer_pool[idx].is_pinned() {
            state.num_available += 1;
            cvar.notify_all();
        }
        Ok(())
    }

    /// Pins the block into some buffer and returns that buffer's pool index.
    pub fn pin(&self, block: &BlockId) -> Result<usize> {
        let (lock, cvar) = &*self.state;
        let mut state = lock.lock().unwrap();
        let start = Instant::now();

        loop {
            if let Some(idx) = Self::try_to_pin(block, &mut state)? {
                return Ok(idx);
            }

            if start.elapsed().as_millis() >= MAX_TIME {
                return Err(Error::new(BufferManagerError::BufferAbort));
            }

            let (new_state, _) = cvar
                .wait_timeout(state, WAIT_TICK)
                .map_err(|_| BufferManagerError::BufferAbort)?;

            state = new_state;
        }
    }

    /// Flushes every buffer last modified by the given transaction.
    pub fn flush_all(&self, txnum: i32) -> Result<()> {
        let (lock, cvar) = &*self.state;
        let mut state = lock.lock().unwrap();

        let result = state
            .buffer_pool
            .iter_mut()
            .filter(|buf| buf.modifying_tx() == txnum)
            .try_for_each(|buf| buf.flush());

        cvar.notify_all();
        result
    }

    fn try_to_pin(block: &BlockId, state: &mut BufferPoolState) -> Result<Option<usize>> {
        if let Some(idx) = Self::find_existing_buffer(block, state) {
            if !state.buffer_pool[idx].is_pinned() {
                state.num_available -= 1;
            }
            state.buffer_pool[idx].pin();
            return Ok(Some(idx));
        }

        if let Some(idx) = Self::find_unpinned_buffer(state) {
            state.buffer_pool[idx].assign_to_block(block)?;
            state.num_available -= 1;
            state.buffer_pool[idx].pin();
            return Ok(Some(idx));
        }

        Ok(None)
    }

    fn find_existing_buffer(block: &BlockId, state: &BufferPoolState) -> Option<usize> {
        state
            .buffer_pool
            .iter()
            .enumerate()
            .find(|(_, buffer)| buffer.block().contains(block))
            .map(|(idx, _)| idx)
    }

    fn find_unpinned_buffer(state: &BufferPoolState) -> Option<usize> {
        state
            .buffer_pool
            .iter()
            .enumerate()
            .find(|(_, buffer)| !buffer.is_pinned())
            .map(|(idx, _)| idx)
    }
}
