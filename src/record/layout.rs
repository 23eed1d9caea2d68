use anyhow::{Ok, Result};
use std::{collections::HashMap, mem};

use crate::file::page::Page;

use super::schema::{FieldType, Schema};

/// The physical layout of a slot: the byte offset of each field and the
/// total slot size. Every slot starts with a 4-byte in-use flag; fields
/// follow in schema order, integers taking four bytes and strings their
/// length prefix plus maximum byte length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    schema: Schema,
    offsets: HashMap<String, usize>,
    slot_size: usize,
}

impl Layout {
    pub fn new(schema: Schema) -> Result<Self> {
        let mut offsets = HashMap::new();
        let mut pos = mem::size_of::<i32>(); // the in-use flag

        for field in schema.fields() {
            offsets.insert(field.clone(), pos);
            pos += match schema.field_type(field)? {
                FieldType::Integer => mem::size_of::<i32>(),
                FieldType::Varchar => Page::max_length(schema.length(field)?),
            };
        }

        Ok(Self {
            schema,
            offsets,
            slot_size: pos,
        })
    }

    /// Rebuilds a layout from cataloged offsets and slot size, skipping the
    /// recomputation done by [`Layout::new`].
    pub fn from_metadata(
        schema: Schema,
        offsets: HashMap<String, usize>,
        slot_size: usize,
    ) -> Self {
        Self {
            schema,
            offsets,
            slot_size,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn offset(&self, field: &str) -> Result<usize> {
        self.offsets
            .get(field)
            .copied()
            .ok_or_else(|| super::schema::SchemaError::UnknownField(field.to_string()).into())
    }

    pub fn slot_size(&self) -> usize {
        self.slot_size
    }
}
