use core::fmt;
use std::mem;
use std::sync::{Arc, Mutex};

use anyhow::{Ok, Result};
use num_enum::TryFromPrimitive;

use crate::{
    file::{block_id::BlockId, page::Page},
    log::manager::LogManager,
    tx::transaction::Transaction,
    Lsn,
};

#[derive(Debug)]
enum LogRecordError {
    UnknownLogOperation(i32),
}

impl std::error::Error for LogRecordError {}
impl fmt::Display for LogRecordError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LogRecordError::UnknownLogOperation(op) => write!(f, "unknown log operation: {}", op),
        }
    }
}

#[derive(Debug, PartialEq, TryFromPrimitive)]
#[repr(i32)]
pub enum LogOperation {
    Checkpoint = 0,
    Start = 1,
    Commit = 2,
    Rollback = 3,
    SetInt = 4,
    SetString = 5,
}

/// One decoded log record. Every record starts with a 4-byte operation tag;
/// START/COMMIT/ROLLBACK carry the transaction number, and the two update
/// records additionally carry the modified cell's address and its pre-image.
pub trait LogRecord {
    fn op(&self) -> LogOperation;

    fn tx_number(&self) -> i32;

    /// Undoes the operation encoded by this log record.
    /// Only SETINT and SETSTRING have anything to undo: they write the
    /// pre-image back, with logging disabled.
    fn undo(&self, tx: &mut Transaction) -> Result<()>;
}

pub fn create_log_record(bytes: Vec<u8>) -> Result<Box<dyn LogRecord>> {
    let mut p = Page::from_bytes(bytes);
    let value = p.get_int(0)?;
    match LogOperation::try_from(value)
        .map_err(|err| LogRecordError::UnknownLogOperation(err.number))?
    {
        LogOperation::Checkpoint => Ok(Box::new(CheckpointRecord::new()?)),
        LogOperation::Start => Ok(Box::new(StartRecord::new(&mut p)?)),
        LogOperation::Commit => Ok(Box::new(CommitRecord::new(&mut p)?)),
        LogOperation::Rollback => Ok(Box::new(RollbackRecord::new(&mut p)?)),
        LogOperation::SetInt => Ok(Box::new(SetIntRecord::new(&mut p)?)),
        LogOperation::SetString => Ok(Box::new(SetStringRecord::new(&mut p)?)),
    }
}

/// A quiescent checkpoint: nothing before it needs attention during recovery.
pub struct CheckpointRecord {}

impl fmt::Display for CheckpointRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<CHECKPOINT>")
    }
}

impl CheckpointRecord {
    pub fn new() -> Result<Self> {
        Ok(Self {})
    }

    pub fn write_to_log(log_manager: Arc<Mutex<LogManager>>) -> Result<Lsn> {
        let mut p = Page::new(mem::size_of::<i32>());
        p.set_int(0, LogOperation::Checkpoint as i32)?;

        log_manager.lock().unwrap().append(p.contents().as_bytes())
    }
}

impl LogRecord for CheckpointRecord {
    fn op(&self) -> LogOperation {
        LogOperation::Checkpoint
    }
    fn tx_number(&self) -> i32 {
        -1
    }

    fn undo(&self, _: &mut Transaction) -> Result<()> {
        Ok(()) //noop
    }
}

pub struct StartRecord {
    txnum: i32,
}

impl fmt::Display for StartRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<START {}>", self.txnum)
    }
}

impl StartRecord {
    pub fn new(p: &mut Page) -> Result<Self> {
        let tpos = mem::size_of::<i32>();
        Ok(Self {
            txnum: p.get_int(tpos)?,
        })
    }

    pub fn write_to_log(log_manager: Arc<Mutex<LogManager>>, txnum: i32) -> Result<Lsn> {
        let tpos = mem::size_of::<i32>();
        let mut p = Page::new(tpos + mem::size_of::<i32>());
        p.set_int(0, LogOperation::Start as i32)?;
        p.set_int(tpos, txnum)?;

        log_manager.lock().unwrap().append(p.contents().as_bytes())
    }
}

impl LogRecord for StartRecord {
    fn op(&self) -> LogOperation {
        LogOperation::Start
    }
    fn tx_number(&self) -> i32 {
        self.txnum
    }

    fn undo(&self, _: &mut Transaction) -> Result<()> {
        Ok(()) //noop
    }
}

pub struct CommitRecord {
    txnum: i32,
}

impl fmt::Display for CommitRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<COMMIT {}>", self.txnum)
    }
}

impl CommitRecord {
    pub fn new(p: &mut Page) -> Result<Self> {
        let tpos = mem::size_of::<i32>();
        Ok(Self {
            txnum: p.get_int(tpos)?,
        })
    }

    pub fn write_to_log(log_manager: Arc<Mutex<LogManager>>, txnum: i32) -> Result<Lsn> {
        let tpos = mem::size_of::<i32>();
        let mut p = Page::new(tpos + mem::size_of::<i32>());
        p.set_int(0, LogOperation::Commit as i32)?;
        p.set_int(tpos, txnum)?;

        log_manager.lock().unwrap().append(p.contents().as_bytes())
    }
}

impl LogRecord for CommitRecord {
    fn op(&self) -> LogOperation {
        LogOperation::Commit
    }
    fn tx_number(&self) -> i32 {
        self.txnum
    }

    fn undo(&self, _: &mut Transaction) -> Result<()> {
        Ok(()) //noop
    }
}

pub struct RollbackRecord {
    txnum: i32,
}

impl fmt::Display for RollbackRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<ROLLBACK {}>", self.txnum)
    }
}

impl RollbackRecord {
    pub fn new(p: &mut Page) -> Result<Self> {
        let tpos = mem::size_of::<i32>();
        Ok(Self {
            txnum: p.get_int(tpos)?,
        })
    }

    pub fn write_to_log(log_manager: Arc<Mutex<LogManager>>, txnum: i32) -> Result<Lsn> {
        let tpos = mem::size_of::<i32>();
        let mut p = Page::new(tpos + mem::size_of::<i32>());
        p.set_int(0, LogOperation::Rollback as i32)?;
        p.set_int(tpos, txnum)?;

        log_manager.lock().unwrap().append(p.contents().as_bytes())
    }
}

impl LogRecord for RollbackRecord {
    fn op(&self) -> LogOperation {
        LogOperation::Rollback
    }
    fn tx_number(&self) -> i32 {
        self.txnum
    }

    fn undo(&self, _: &mut Transaction) -> Result<()> {
        Ok(()) //noop
    }
}

/// Records the pre-image of an integer cell: the operation tag, the
/// transaction number, the block's file name and number, the byte offset
/// within the block, and the value that was there before the update.
pub struct SetIntRecord {
    txnum: i32,
    offset: usize,
    val: i32,
    block: BlockId,
}

impl fmt::Display for SetIntRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<SETINT {} {} {} {}>",
            self.txnum, self.block, self.offset, self.val
        )
    }
}

impl SetIntRecord {
    pub fn new(p: &mut Page) -> Result<Self> {
        let tpos = mem::size_of::<i32>();
        let txnum = p.get_int(tpos)?;
        let fpos = tpos + mem::size_of::<i32>();
        let filename = p.get_string(fpos)?;
        let bpos = fpos + Page::max_length(filename.len());
        let block_number = p.get_int(bpos)?;
        let block = BlockId::new(&filename, block_number as i64);
        let opos = bpos + mem::size_of::<i32>();
        let offset = p.get_int(opos)? as usize;
        let vpos = opos + mem::size_of::<i32>();
        let val = p.get_int(vpos)?;

        Ok(Self {
            txnum,
            offset,
            val,
            block,
        })
    }

    pub fn write_to_log(
        log_manager: Arc<Mutex<LogManager>>,
        txnum: i32,
        block: &BlockId,
        offset: usize,
        val: i32,
    ) -> Result<Lsn> {
        let tpos = mem::size_of::<i32>();
        let fpos = tpos + mem::size_of::<i32>();
        let bpos = fpos + Page::max_length(block.filename().len());
        let opos = bpos + mem::size_of::<i32>();
        let vpos = opos + mem::size_of::<i32>();
        let mut p = Page::new(vpos + mem::size_of::<i32>());
        p.set_int(0, LogOperation::SetInt as i32)?;
        p.set_int(tpos, txnum)?;
        p.set_string(fpos, block.filename())?;
        p.set_int(bpos, block.block_number() as i32)?;
        p.set_int(opos, offset as i32)?;
        p.set_int(vpos, val)?;

        log_manager.lock().unwrap().append(p.contents().as_bytes())
    }
}

impl LogRecord for SetIntRecord {
    fn op(&self) -> LogOperation {
        LogOperation::SetInt
    }
    fn tx_number(&self) -> i32 {
        self.txnum
    }

    /// Pins the recorded block, writes the pre-image back without logging,
    /// and unpins.
    fn undo(&self, tx: &mut Transaction) -> Result<()> {
        tx.pin(&self.block)?;
        tx.set_int(&self.block, self.offset, self.val, false)?; // don't log the undo!
        tx.unpin(&self.block)?;
        Ok(())
    }
}

/// The string counterpart of [`SetIntRecord`]; same layout, with the
/// pre-image stored as a length-prefixed string.
pub struct SetStringRecord {
    txnum: i32,
    offset: usize,
    val: String,
    block: BlockId,
}

impl fmt::Display for SetStringRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<SETSTRING {} {} {} {}>",
            self.txnum, self.block, self.offset, self.val
        )
    }
}

impl SetStringRecord {
    pub fn new(p: &mut Page) -> Result<Self> {
        let tpos = mem::size_of::<i32>();
        let txnum = p.get_int(tpos)?;
        let fpos = tpos + mem::size_of::<i32>();
        let filename = p.get_string(fpos)?;
        let bpos = fpos + Page::max_length(filename.len());
        let block_number = p.get_int(bpos)?;
        let block = BlockId::new(&filename, block_number as i64);
        let opos = bpos + mem::size_of::<i32>();
        let offset = p.get_int(opos)? as usize;
        let vpos = opos + mem::size_of::<i32>();
        let val = p.get_string(vpos)?;

        Ok(Self {
            txnum,
            offset,
            val,
            block,
        })
    }

    pub fn write_to_log(
        log_manager: Arc<Mutex<LogManager>>,
        txnum: i32,
        block: &BlockId,
        offset: usize,
        val: &str,
    ) -> Result<Lsn> {
        let tpos = mem::size_of::<i32>();
        let fpos = tpos + mem::size_of::<i32>();
        let bpos = fpos + Page::max_length(block.filename().len());
        let opos = bpos + mem::size_of::<i32>();
        let vpos = opos + mem::size_of::<i32>();
        let mut p = Page::new(vpos + Page::max_length(val.len()));
        p.set_int(0, LogOperation::SetString as i32)?;
        p.set_int(tpos, txnum)?;
        p.set_string(fpos, block.filename())?;
        p.set_int(bpos, block.block_number() as i32)?;
        p.set_int(opos, offset as i32)?;
        p.set_string(vpos, val)?;

        log_manager.lock().unwrap().append(p.contents().as_bytes())
    }
}

impl LogRecord for SetStringRecord {
    fn op(&self) -> LogOperation {
        LogOperation::SetString
    }
    fn tx_number(&self) -> i32 {
        self.txnum
    }

    /// Pins the recorded block, writes the pre-image back without logging,
    /// and unpins.
    fn undo(&self, tx: &mut Transaction) -> Result<()> {
        tx.pin(&self.block)?;
        tx.set_string(&self.block, self.offset, &self.val, false)?; // don't log the undo!
        tx.unpin(&self.block)?;
        Ok(())
    }
}
