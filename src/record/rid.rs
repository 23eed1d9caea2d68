use core::fmt;

/// Identifies a record by its block number within the table file and its
/// slot index within that block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rid {
    block_number: i64,
    slot: i32,
}

impl Rid {
    pub fn new(block_number: i64, slot: i32) -> Self {
        Self { block_number, slot }
    }

    pub fn block_number(&self) -> i64 {
        self.block_number
    }

    pub fn slot(&self) -> i32 {
        self.slot
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[block {}, slot {}]", self.block_number, self.slot)
    }
}
