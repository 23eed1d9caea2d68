use anyhow::{Ok, Result};
use log::trace;
use std::sync::{Arc, Mutex};

use crate::{
    file::{block_id::BlockId, manager::FileManager, page::Page},
    Lsn,
};

use super::iterator::LogIterator;

/// Appends variable-length records to the log file and hands out iterators
/// over them, newest first.
///
/// Exactly one in-memory page mirrors the tail block of the log. Records are
/// packed from the end of the page toward its start; the first 4 bytes hold
/// the boundary, the offset of the most recently written record. When a
/// record no longer fits above the boundary word, the page is flushed and a
/// fresh block is appended to the log file.
#[derive(Debug)]
pub struct LogManager {
    file_manager: Arc<Mutex<FileManager>>,
    logfile: String,
    logpage: Page,
    current_block: BlockId,
    current_lsn: Lsn,
    last_saved_lsn: Lsn,
}

impl LogManager {
    pub fn new(file_manager: Arc<Mutex<FileManager>>, log_file: &str) -> Result<Self> {
        let block_size = file_manager.lock().unwrap().block_size();

        let mut log_manager = LogManager {
            file_manager: Arc::clone(&file_manager),
            logfile: log_file.to_string(),
            logpage: Page::from_bytes(vec![0; block_size]),
            current_block: BlockId::new(log_file, 0),
            current_lsn: 0,
            last_saved_lsn: 0,
        };

        // If the log file does not yet exist, create it with an empty first block
        let log_size = file_manager.lock().unwrap().length(log_file)?;
        log_manager.current_block = if log_size == 0 {
            log_manager.append_new_block()?
        } else {
            let block = BlockId::new(log_file, log_size - 1);
            file_manager
                .lock()
                .unwrap()
                .read(&block, &mut log_manager.logpage)?;
            block
        };

        Ok(log_manager)
    }

    /// Ensures the record with the given LSN, and everything before it, is on disk.
    pub fn flush(&mut self, lsn: Lsn) -> Result<()> {
        if lsn >= self.last_saved_lsn {
            self.do_flush()?;
        }

        Ok(())
    }

    /// Flushes the tail page, then returns an iterator that yields log
    /// records in reverse of the order they were appended.
    pub fn iterator(&mut self) -> Result<LogIterator> {
        self.do_flush()?;
        LogIterator::new(Arc::clone(&self.file_manager), &self.current_block)
    }

    /// Appends a record to the tail page and returns its LSN.
    ///
    /// The record goes immediately below the old boundary, as a
    /// length-prefixed blob. If it would cross below the boundary word, the
    /// full page is flushed first and a fresh block begins.
    pub fn append(&mut self, logrec: &[u8]) -> Result<Lsn> {
        let mut boundary = self.logpage.get_int(0)?;
        let int_bytes = std::mem::size_of::<i32>() as i32;
        let recsize = logrec.len() as i32;
        let bytes_needed = recsize + int_bytes;

        if boundary - bytes_needed < int_bytes {
            // the record doesn't fit, so spill to a new tail block
            self.do_flush()?;
            self.current_block = self.append_new_block()?;
            boundary = self.logpage.get_int(0)?;
        }

        let recpos = boundary - bytes_needed;
        self.logpage.set_bytes(recpos as usize, logrec)?;
        self.logpage.set_int(0, recpos)?; // the new boundary
        self.current_lsn += 1;
        Ok(self.current_lsn)
    }

    fn do_flush(&mut self) -> Result<()> {
        self.file_manager
            .lock()
            .unwrap()
            .write(&self.current_block, &mut self.logpage)?;

        self.last_saved_lsn = self.current_lsn;

        Ok(())
    }

    fn append_new_block(&mut self) -> Result<BlockId> {
        let mut guard = self.file_manager.lock().unwrap();
        let block = guard.append(&self.logfile)?;
        self.logpage = Page::new(guard.block_size());
        self.logpage.set_int(0, guard.block_size() as i32)?;
        guard.write(&block, &mut self.logpage)?;
        trace!("log spilled to {}", block);
        Ok(block)
    }
}
