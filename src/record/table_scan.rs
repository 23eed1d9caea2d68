use anyhow::{Ok, Result};
use core::fmt;
use std::sync::{Arc, Mutex};

use crate::{file::block_id::BlockId, tx::transaction::Transaction};

use super::{layout::Layout, record_page::RecordPage, rid::Rid};

#[derive(Debug)]
enum TableScanError {
    ScanClosed,
}

impl std::error::Error for TableScanError {}
impl fmt::Display for TableScanError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TableScanError::ScanClosed => write!(f, "table scan is closed"),
        }
    }
}

/// A cursor over the records of one table file.
///
/// The scan keeps exactly one record page open; moving to another block
/// unpins the previous page and pins the new one. The cursor starts before
/// the first slot of block 0, so the usual loop is `while scan.next()? ...`.
/// `insert` advances to the next empty slot instead, appending a freshly
/// formatted block when the file runs out of room.
#[derive(Debug)]
pub struct TableScan {
    tx: Arc<Mutex<Transaction>>,
    layout: Layout,
    record_page: Option<RecordPage>,
    filename: String,
    current_slot: i32,
}

impl TableScan {
    pub fn new(tx: Arc<Mutex<Transaction>>, table_name: &str, layout: Layout) -> Result<Self> {
        let filename = format!("{}.tbl", table_name);

        let mut scan = Self {
            tx,
            layout,
            record_page: None,
            filename,
            current_slot: -1,
        };

        let size = scan.tx.lock().unwrap().size(&scan.filename)?;
        if size == 0 {
            scan.move_to_new_block()?;
        } else {
            scan.move_to_block(0)?;
        }

        Ok(scan)
    }

    /// Repositions the cursor before the first record of the table.
    pub fn before_first(&mut self) -> Result<()> {
        self.move_to_block(0)
    }

    /// Advances to the next used slot, crossing block boundaries; false once
    /// the last block's last slot is behind the cursor.
    pub fn next(&mut self) -> Result<bool> {
        self.current_slot = self.record_page()?.next_after(self.current_slot)?;
        while self.current_slot < 0 {
            if self.at_last_block()? {
                return Ok(false);
            }
            let next_block_number = self.record_page()?.block().block_number() + 1;
            self.move_to_block(next_block_number)?;
            self.current_slot = self.record_page()?.next_after(self.current_slot)?;
        }
        Ok(true)
    }

    /// Moves the cursor to the next empty slot and marks it used, appending
    /// a new formatted block at end-of-file if every block is full.
    pub fn insert(&mut self) -> Result<()> {
        self.current_slot = self.record_page()?.insert_after(self.current_slot)?;
        while self.current_slot < 0 {
            if self.at_last_block()? {
                self.move_to_new_block()?;
            } else {
                let next_block_number = self.record_page()?.block().block_number() + 1;
                self.move_to_block(next_block_number)?;
            }
            self.current_slot = self.record_page()?.insert_after(self.current_slot)?;
        }
        Ok(())
    }

    pub fn get_int(&self, field: &str) -> Result<i32> {
        self.record_page()?.get_int(self.current_slot, field)
    }

    pub fn get_string(&self, field: &str) -> Result<String> {
        self.record_page()?.get_string(self.current_slot, field)
    }

    pub fn set_int(&self, field: &str, val: i32) -> Result<()> {
        self.record_page()?.set_int(self.current_slot, field, val)
    }

    pub fn set_string(&self, field: &str, val: &str) -> Result<()> {
        self.record_page()?.set_string(self.current_slot, field, val)
    }

    /// Clears the in-use flag of the current slot.
    pub fn delete(&self) -> Result<()> {
        self.record_page()?.delete(self.current_slot)
    }

    /// Positions the cursor on an exact record.
    pub fn move_to_rid(&mut self, rid: Rid) -> Result<()> {
        self.move_to_block(rid.block_number())?;
        self.current_slot = rid.slot();
        Ok(())
    }

    pub fn current_rid(&self) -> Result<Rid> {
        Ok(Rid::new(
            self.record_page()?.block().block_number(),
            self.current_slot,
        ))
    }

    /// Unpins the record page the scan is holding. The scan is unusable
    /// afterwards.
    pub fn close(&mut self) -> Result<()> {
        if let Some(record_page) = self.record_page.take() {
            self.tx.lock().unwrap().unpin(record_page.block())?;
        }
        Ok(())
    }

    fn record_page(&self) -> Result<&RecordPage> {
        self.record_page
            .as_ref()
            .ok_or_else(|| TableScanError::ScanClosed.into())
    }

    fn move_to_block(&mut self, block_number: i64) -> Result<()> {
        self.close()?;
        let block = BlockId::new(&self.filename, block_number);
        self.record_page = Some(RecordPage::new(
            Arc::clone(&self.tx),
            block,
            self.layout.clone(),
        )?);
        self.current_slot = -1;
        Ok(())
    }

    fn move_to_new_block(&mut self) -> Result<()> {
        self.close()?;
        let block = self.tx.lock().unwrap().append(&self.filename)?;
        let record_page = RecordPage::new(Arc::clone(&self.tx), block, self.layout.clone())?;
        record_page.format()?;
        self.record_page = Some(record_page);
        self.current_slot = -1;
        Ok(())
    }

    fn at_last_block(&self) -> Result<bool> {
        let size = self.tx.lock().unwrap().size(&self.filename)?;
        Ok(self.record_page()?.block().block_number() == size - 1)
    }
}
