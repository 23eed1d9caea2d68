use anyhow::{Ok, Result};
use log::trace;
use std::sync::{Arc, Mutex};

use crate::{
    file::{block_id::BlockId, manager::FileManager, page::Page},
    log::manager::LogManager,
    Lsn,
};

/// A single slot of the buffer pool: a page, the block currently assigned to
/// it (if any), a pin count, and dirty metadata. `txnum` is the transaction
/// that most recently modified the page, or -1 when the page is clean; `lsn`
/// is the highest LSN of any log record describing a modification to it.
#[derive(Debug)]
pub struct Buffer {
    file_manager: Arc<Mutex<FileManager>>,
    log_manager: Arc<Mutex<LogManager>>,
    contents: Page,
    block: Option<BlockId>,
    pins: u32,
    txnum: i32,
    lsn: Lsn,
}

impl Buffer {
    pub fn new(file_manager: Arc<Mutex<FileManager>>, log_manager: Arc<Mutex<LogManager>>) -> Self {
        let block_size = file_manager.lock().unwrap().block_size();
        Self {
            file_manager,
            log_manager,
            contents: Page::new(block_size),
            block: None,
            pins: 0,
            txnum: -1,
            lsn: -1,
        }
    }

    pub fn contents(&mut self) -> &mut Page {
        &mut self.contents
    }

    pub fn block(&self) -> &Option<BlockId> {
        &self.block
    }

    pub fn modifying_tx(&self) -> i32 {
        self.txnum
    }

    pub fn set_modified(&mut self, txnum: i32, lsn: Lsn) {
        self.txnum = txnum;
        if lsn >= 0 {
            self.lsn = lsn;
        }
    }

    /// Writes the page back to its block if it is dirty, flushing the log
    /// through this buffer's LSN first. The log flush before the page write
    /// is the write-ahead rule.
    pub fn flush(&mut self) -> Result<()> {
        if self.txnum >= 0 {
            self.log_manager.lock().unwrap().flush(self.lsn)?;
            if let Some(block) = &self.block {
                trace!("flushing dirty buffer for {}", block);
                self.file_manager
                    .lock()
                    .unwrap()
                    .write(block, &mut self.contents)?;
            }
            self.txnum = -1;
        }
        Ok(())
    }

    /// Repurposes this buffer for another block: the old contents are
    /// flushed (if dirty), the new block is read in, and the pin count resets.
    pub fn assign_to_block(&mut self, block: &BlockId) -> Result<()> {
        self.flush()?;
        self.file_manager
            .lock()
            .unwrap()
            .read(block, &mut self.contents)?;
        self.block = Some(block.clone());
        self.pins = 0;
        Ok(())
    }

    pub fn is_pinned(&self) -> bool {
        self.pins > 0
    }

    pub fn pin(&mut self) {
        self.pins += 1;
    }

    pub fn unpin(&mut self) {
        self.pins -= 1;
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
    };

    #[test]
    fn test_buffer_replacement_flushes_modified_page() {
        let temp_dir = tempdir().unwrap();
        let db_dir = temp_dir.path().to_str().unwrap();

        let block_size = 400;
        let num_buffers = 3; // only 3 buffers

        let file_manager = Arc::new(Mutex::new(FileManager::new(db_dir, block_size).unwrap()));
        let log_manager = Arc::new(Mutex::new(
            LogManager::new(Arc::clone(&file_manager), "minirel.log").unwrap(),
        ));
        let buffer_manager = BufferManager::new(
            Arc::clone(&file_manager),
            Arc::clone(&log_manager),
            num_buffers,
        );

        // Pin and modify the first buffer
        let idx1 = buffer_manager.pin(&BlockId::new("testfile", 1)).unwrap();

        {
            let (lock, _) = &*buffer_manager.state;
            let mut state = lock.lock().unwrap();

            let n = state.buffer_pool[idx1].contents().get_int(80).unwrap();
            state.buffer_pool[idx1]
                .contents()
                .set_int(80, n + 1)
                .unwrap();
            state.buffer_pool[idx1].set_modified(1, 0); // placeholder values
            assert_eq!(1, n + 1);
        }

        buffer_manager.unpin(idx1).unwrap();

        // One of these pins will flush the modified buffer to disk:
        let mut idx2 = buffer_manager.pin(&BlockId::new("testfile", 2)).unwrap();
        let idx3 = buffer_manager.pin(&BlockId::new("testfile", 3)).unwrap();
        let idx4 = buffer_manager.pin(&BlockId::new("testfile", 4)).unwrap();

        buffer_manager.unpin(idx2).unwrap();

        // Repin block 1; its earlier modification came back from disk
        idx2 = buffer_manager.pin(&BlockId::new("testfile", 1)).unwrap();

        {
            let (lock, _) = &*buffer_manager.state;
            let mut state = lock.lock().unwrap();

            assert_eq!(state.buffer_pool[idx2].contents().get_int(80).unwrap(), 1);

            state.buffer_pool[idx2].contents().set_int(80, 9999).unwrap();
            state.buffer_pool[idx2].set_modified(1, 0); // this modification won't get written to disk
        }

        buffer_manager.unpin(idx3).unwrap();
        buffer_manager.unpin(idx4).unwrap();
        buffer_manager.unpin(idx2).unwrap();
    }
}
