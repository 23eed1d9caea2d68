use anyhow::{Ok, Result};
use core::fmt;
use log::debug;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::{
    record::{
        layout::Layout,
        schema::{FieldType, Schema},
        table_scan::TableScan,
    },
    tx::transaction::Transaction,
};

/// Table and field names stored in the catalog are at most this many bytes.
pub const MAX_NAME_LENGTH: usize = 20;

const TABLE_CATALOG: &str = "table_catalog";
const FIELD_CATALOG: &str = "field_catalog";

#[derive(Debug)]
enum TableManagerError {
    UnknownTable(String),
}

impl std::error::Error for TableManagerError {}
impl fmt::Display for TableManagerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TableManagerError::UnknownTable(name) => write!(f, "unknown table: {}", name),
        }
    }
}

/// Creates tables and serves their layouts out of the two catalog tables:
/// `table_catalog` holds one row per table (name and slot size) and
/// `field_catalog` one row per field (name, type, byte length, slot offset).
///
/// The catalogs are themselves ordinary tables. On the very first
/// initialization of a database they are bootstrapped by writing their own
/// schemas into themselves.
#[derive(Debug)]
pub struct TableManager {
    table_catalog_layout: Layout,
    field_catalog_layout: Layout,
}

impl TableManager {
    pub fn new(tx: &Arc<Mutex<Transaction>>, is_new: bool) -> Result<Self> {
        let mut table_catalog_schema = Schema::new();
        table_catalog_schema.add_string_field("table_name", MAX_NAME_LENGTH);
        table_catalog_schema.add_int_field("slot_size");
        let table_catalog_layout = Layout::new(table_catalog_schema.clone())?;

        let mut field_catalog_schema = Schema::new();
        field_catalog_schema.add_string_field("table_name", MAX_NAME_LENGTH);
        field_catalog_schema.add_string_field("field_name", MAX_NAME_LENGTH);
        field_catalog_schema.add_string_field("field_type", 4);
        field_catalog_schema.add_int_field("field_byte_length");
        field_catalog_schema.add_int_field("field_byte_offset");
        let field_catalog_layout = Layout::new(field_catalog_schema.clone())?;

        let table_manager = Self {
            table_catalog_layout,
            field_catalog_layout,
        };

        if is_new {
            debug!("bootstrapping catalog tables");
            table_manager.create_table(tx, TABLE_CATALOG, &table_catalog_schema)?;
            table_manager.create_table(tx, FIELD_CATALOG, &field_catalog_schema)?;
        }

        Ok(table_manager)
    }

    /// Records a new table in the catalog: one `table_catalog` row plus one
    /// `field_catalog` row per field.
    pub fn create_table(
        &self,
        tx: &Arc<Mutex<Transaction>>,
        table_name: &str,
        schema: &Schema,
    ) -> Result<()> {
        let layout = Layout::new(schema.clone())?;

        let mut table_scan = TableScan::new(
            Arc::clone(tx),
            TABLE_CATALOG,
            self.table_catalog_layout.clone(),
        )?;
        table_scan.insert()?;
        table_scan.set_string("table_name", table_name)?;
        table_scan.set_int("slot_size", layout.slot_size() as i32)?;
        table_scan.close()?;

        let mut field_scan = TableScan::new(
            Arc::clone(tx),
            FIELD_CATALOG,
            self.field_catalog_layout.clone(),
        )?;
        for field in schema.fields() {
            field_scan.insert()?;
            field_scan.set_string("table_name", table_name)?;
            field_scan.set_string("field_name", field)?;
            field_scan.set_string("field_type", schema.field_type(field)?.as_str())?;
            field_scan.set_int("field_byte_length", schema.length(field)? as i32)?;
            field_scan.set_int("field_byte_offset", layout.offset(field)? as i32)?;
        }
        field_scan.close()?;

        Ok(())
    }

    /// Rebuilds the layout of a previously created table from the catalog:
    /// the slot size from its `table_catalog` row, the schema and field
    /// offsets from its `field_catalog` rows in discovery order.
    pub fn get_layout(&self, tx: &Arc<Mutex<Transaction>>, table_name: &str) -> Result<Layout> {
        let mut slot_size = None;
        let mut table_scan = TableScan::new(
            Arc::clone(tx),
            TABLE_CATALOG,
            self.table_catalog_layout.clone(),
        )?;
        while table_scan.next()? {
            if table_scan.get_string("table_name")? == table_name {
                slot_size = Some(table_scan.get_int("slot_size")? as usize);
                break;
            }
        }
        table_scan.close()?;

        let slot_size = slot_size
            .ok_or_else(|| TableManagerError::UnknownTable(table_name.to_string()))?;

        let mut schema = Schema::new();
        let mut offsets = HashMap::new();
        let mut field_scan = TableScan::new(
            Arc::clone(tx),
            FIELD_CATALOG,
            self.field_catalog_layout.clone(),
        )?;
        while field_scan.next()? {
            if field_scan.get_string("table_name")? == table_name {
                let field_name = field_scan.get_string("field_name")?;
                let field_type = FieldType::parse(&field_scan.get_string("field_type")?)?;
                let byte_length = field_scan.get_int("field_byte_length")? as usize;
                let offset = field_scan.get_int("field_byte_offset")? as usize;

                offsets.insert(field_name.clone(), offset);
                schema.add_field(&field_name, field_type, byte_length);
            }
        }
        field_scan.close()?;

        Ok(Layout::from_metadata(schema, offsets, slot_size))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tempfile::tempdir;

    use crate::{
        buffer::manager::BufferManager,
        file::manager::FileManager,
        log::manager::LogManager,
        record::{layout::Layout, schema::Schema, table_scan::TableScan},
        tx::{concurrency::lock_table::LockTable, transaction::Transaction},
    };

    use super::TableManager;

    fn new_tx(db_dir: &str) -> Arc<Mutex<Transaction>> {
        let file_manager = Arc::new(Mutex::new(FileManager::new(db_dir, 400).unwrap()));
        let log_manager = Arc::new(Mutex::new(
            LogManager::new(Arc::clone(&file_manager), "minirel.log").unwrap(),
        ));
        let buffer_manager = Arc::new(BufferManager::new(
            Arc::clone(&file_manager),
            Arc::clone(&log_manager),
            8,
        ));
        let lock_table = Arc::new(LockTable::new());

        Arc::new(Mutex::new(
            Transaction::new(file_manager, log_manager, buffer_manager, lock_table).unwrap(),
        ))
    }

    #[test]
    fn test_layout_roundtrip() {
        let temp_dir = tempdir().unwrap();
        let tx = new_tx(temp_dir.path().to_str().unwrap());

        let table_manager = TableManager::new(&tx, true).unwrap();

        let mut schema = Schema::new();
        schema.add_int_field("A");
        schema.add_string_field("B", 9);
        table_manager.create_table(&tx, "MyTable", &schema).unwrap();

        let layout = table_manager.get_layout(&tx, "MyTable").unwrap();

        assert_eq!(*layout.schema(), schema);
        assert_eq!(layout, Layout::new(schema).unwrap());

        tx.lock().unwrap().commit().unwrap();
    }

    #[test]
    fn test_unknown_table_is_an_error() {
        let temp_dir = tempdir().unwrap();
        let tx = new_tx(temp_dir.path().to_str().unwrap());

        let table_manager = TableManager::new(&tx, true).unwrap();

        assert!(table_manager.get_layout(&tx, "nope").is_err());

        tx.lock().unwrap().commit().unwrap();
    }

    #[test]
    fn test_catalog_bootstrap() {
        let temp_dir = tempdir().unwrap();
        let tx = new_tx(temp_dir.path().to_str().unwrap());

        let table_manager = TableManager::new(&tx, true).unwrap();

        let mut schema = Schema::new();
        schema.add_int_field("A");
        schema.add_string_field("B", 9);
        table_manager.create_table(&tx, "MyTable", &schema).unwrap();
        tx.lock().unwrap().commit().unwrap();

        // A second transaction sees the catalog rows written by the first
        let tx = new_tx_reusing(temp_dir.path().to_str().unwrap());
        let table_manager = TableManager::new(&tx, false).unwrap();

        let mut table_names = Vec::new();
        let mut scan = TableScan::new(
            Arc::clone(&tx),
            "table_catalog",
            table_manager.table_catalog_layout.clone(),
        )
        .unwrap();
        while scan.next().unwrap() {
            table_names.push(scan.get_string("table_name").unwrap());
            assert!(scan.get_int("slot_size").unwrap() > 0);
        }
        scan.close().unwrap();
        assert_eq!(table_names, ["table_catalog", "field_catalog", "MyTable"]);

        let mut my_table_fields = Vec::new();
        let mut scan = TableScan::new(
            Arc::clone(&tx),
            "field_catalog",
            table_manager.field_catalog_layout.clone(),
        )
        .unwrap();
        while scan.next().unwrap() {
            if scan.get_string("table_name").unwrap() == "MyTable" {
                my_table_fields.push((
                    scan.get_string("field_name").unwrap(),
                    scan.get_string("field_type").unwrap(),
                    scan.get_int("field_byte_length").unwrap(),
                    scan.get_int("field_byte_offset").unwrap(),
                ));
            }
        }
        scan.close().unwrap();
        assert_eq!(
            my_table_fields,
            [
                ("A".to_string(), "int".to_string(), 4, 4),
                ("B".to_string(), "str".to_string(), 9, 8),
            ]
        );

        tx.lock().unwrap().commit().unwrap();
    }

    fn new_tx_reusing(db_dir: &str) -> Arc<Mutex<Transaction>> {
        // same files, fresh engine state; fine for a single-threaded test
        new_tx(db_dir)
    }
}
