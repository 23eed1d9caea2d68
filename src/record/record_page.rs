use anyhow::{Ok, Result};
use std::sync::{Arc, Mutex};

use crate::{
    file::block_id::BlockId,
    record::schema::FieldType,
    tx::transaction::Transaction,
};

use super::layout::Layout;

const EMPTY: i32 = 0;
const USED: i32 = 1;

/// Slot-indexed access to the records in one block.
///
/// The block is divided into fixed-size slots; each slot starts with a
/// 4-byte in-use flag followed by the record's fields at the layout's
/// offsets. The block stays pinned from construction until the owning scan
/// moves away from it.
#[derive(Debug)]
pub struct RecordPage {
    tx: Arc<Mutex<Transaction>>,
    block: BlockId,
    layout: Layout,
}

impl RecordPage {
    pub fn new(tx: Arc<Mutex<Transaction>>, block: BlockId, layout: Layout) -> Result<Self> {
        tx.lock().unwrap().pin(&block)?;
        Ok(Self { tx, block, layout })
    }

    pub fn block(&self) -> &BlockId {
        &self.block
    }

    pub fn get_int(&self, slot: i32, field: &str) -> Result<i32> {
        let offset = self.slot_offset(slot) + self.layout.offset(field)?;
        self.tx.lock().unwrap().get_int(&self.block, offset)
    }

    pub fn set_int(&self, slot: i32, field: &str, val: i32) -> Result<()> {
        let offset = self.slot_offset(slot) + self.layout.offset(field)?;
        self.tx.lock().unwrap().set_int(&self.block, offset, val, true)
    }

    pub fn get_string(&self, slot: i32, field: &str) -> Result<String> {
        let offset = self.slot_offset(slot) + self.layout.offset(field)?;
        self.tx.lock().unwrap().get_string(&self.block, offset)
    }

    pub fn set_string(&self, slot: i32, field: &str, val: &str) -> Result<()> {
        let offset = self.slot_offset(slot) + self.layout.offset(field)?;
        self.tx
            .lock()
            .unwrap()
            .set_string(&self.block, offset, val, true)
    }

    /// Marks the slot empty. The record bytes stay behind until the slot is
    /// reused.
    pub fn delete(&self, slot: i32) -> Result<()> {
        self.set_flag(slot, EMPTY, true)
    }

    /// Zeroes every slot: in-use flags cleared, integer fields 0, string
    /// fields empty. Not logged; a format only ever applies to a freshly
    /// appended block, whose old contents are not worth restoring.
    pub fn format(&self) -> Result<()> {
        let mut slot = 0;
        while self.is_valid_slot(slot) {
            self.set_flag(slot, EMPTY, false)?;
            let mut tx = self.tx.lock().unwrap();
            for field in self.layout.schema().fields() {
                let offset = self.slot_offset(slot) + self.layout.offset(field)?;
                match self.layout.schema().field_type(field)? {
                    FieldType::Integer => tx.set_int(&self.block, offset, 0, false)?,
                    FieldType::Varchar => tx.set_string(&self.block, offset, "", false)?,
                }
            }
            slot += 1;
        }
        Ok(())
    }

    /// Finds the next empty slot after the given one, marks it used, and
    /// returns it; -1 when the block has no empty slot left.
    pub fn insert_after(&self, slot: i32) -> Result<i32> {
        let mut slot = slot + 1;
        while self.is_valid_slot(slot) {
            if self.get_flag(slot)? == EMPTY {
                self.set_flag(slot, USED, true)?;
                return Ok(slot);
            }
            slot += 1;
        }
        Ok(-1)
    }

    /// Finds the next used slot after the given one; -1 when the rest of the
    /// block is empty.
    pub fn next_after(&self, slot: i32) -> Result<i32> {
        let mut slot = slot + 1;
        while self.is_valid_slot(slot) {
            if self.get_flag(slot)? == USED {
                return Ok(slot);
            }
            slot += 1;
        }
        Ok(-1)
    }

    fn get_flag(&self, slot: i32) -> Result<i32> {
        self.tx
            .lock()
            .unwrap()
            .get_int(&self.block, self.slot_offset(slot))
    }

    fn set_flag(&self, slot: i32, flag: i32, ok_to_log: bool) -> Result<()> {
        self.tx
            .lock()
            .unwrap()
            .set_int(&self.block, self.slot_offset(slot), flag, ok_to_log)
    }

    fn slot_offset(&self, slot: i32) -> usize {
        slot as usize * self.layout.slot_size()
    }

    fn is_valid_slot(&self, slot: i32) -> bool {
        (slot as usize + 1) * self.layout.slot_size() <= self.tx.lock().unwrap().block_size()
    }
}
