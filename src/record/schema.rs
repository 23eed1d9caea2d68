use anyhow::{Ok, Result};
use core::fmt;
use std::{collections::HashMap, mem};

#[derive(Debug)]
pub enum SchemaError {
    UnknownField(String),
    UnknownFieldType(String),
}

impl std::error::Error for SchemaError {}
impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SchemaError::UnknownField(name) => write!(f, "unknown field: {}", name),
            SchemaError::UnknownFieldType(name) => write!(f, "unknown field type: {}", name),
        }
    }
}

/// The two storable field types. The catalog stores the short name
/// (`"int"` / `"str"`) in its 4-byte type column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    Varchar,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Integer => "int",
            FieldType::Varchar => "str",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "int" => Ok(FieldType::Integer),
            "str" => Ok(FieldType::Varchar),
            _ => Err(SchemaError::UnknownFieldType(s.to_string()).into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldInfo {
    field_type: FieldType,
    byte_length: usize,
}

/// The record schema of a table: an ordered mapping from field name to type
/// and maximum byte length. The byte length only matters for strings;
/// integers always occupy four bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<String>,
    info: HashMap<String, FieldInfo>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_field(&mut self, name: &str, field_type: FieldType, byte_length: usize) {
        self.fields.push(name.to_string());
        self.info.insert(
            name.to_string(),
            FieldInfo {
                field_type,
                byte_length,
            },
        );
    }

    pub fn add_int_field(&mut self, name: &str) {
        self.add_field(name, FieldType::Integer, mem::size_of::<i32>());
    }

    pub fn add_string_field(&mut self, name: &str, byte_length: usize) {
        self.add_field(name, FieldType::Varchar, byte_length);
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn field_type(&self, name: &str) -> Result<FieldType> {
        self.info
            .get(name)
            .map(|info| info.field_type)
            .ok_or_else(|| SchemaError::UnknownField(name.to_string()).into())
    }

    pub fn length(&self, name: &str) -> Result<usize> {
        self.info
            .get(name)
            .map(|info| info.byte_length)
            .ok_or_else(|| SchemaError::UnknownField(name.to_string()).into())
    }
}
