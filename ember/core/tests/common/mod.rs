use arrow::array::AsArray;
use arrow::datatypes::Int64Type;
use ember::common::data_type::{ColumnDef, LogicalType, TableDef};
use ember::{Database, DatabaseConfig, Txn};
use tempfile::TempDir;

pub const DB: &str = "shop";
pub const TABLE: &str = "item";

/// Keeps the data directory alive as long as the database.
pub struct TestDatabase {
    pub db: Database,
    _dir: TempDir,
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

pub fn open_database() -> TestDatabase {
    open_database_with(|_| {})
}

pub fn open_database_with(configure: impl FnOnce(&mut DatabaseConfig)) -> TestDatabase {
    let dir = tempfile::tempdir().unwrap();
    let mut config = DatabaseConfig::with_data_dir(dir.path());
    configure(&mut config);
    TestDatabase {
        db: Database::open(config).unwrap(),
        _dir: dir,
    }
}

/// `item (id::int64, name::string?)`
pub fn item_def() -> TableDef {
    TableDef::new(TABLE, vec![
        ColumnDef::new("id", LogicalType::Int64, false),
        ColumnDef::new("name", LogicalType::String, true),
    ])
}

/// Creates database [`DB`] with table [`TABLE`] and commits.
#[allow(dead_code)]
pub fn open_database_with_table() -> TestDatabase {
    let db = open_database();
    let mut txn = db.begin().unwrap();
    txn.create_database(DB).unwrap();
    txn.create_table(DB, item_def()).unwrap();
    txn.commit().unwrap();
    db
}

/// Scans the `id` column of [`DB`].[`TABLE`] in `txn`.
#[allow(dead_code)]
pub fn scan_ids(txn: &mut Txn) -> Vec<i64> {
    scan_ids_in(txn, DB)
}

/// Scans the `id` column of `db`.[`TABLE`] in `txn`.
#[allow(dead_code)]
pub fn scan_ids_in(txn: &mut Txn, db: &str) -> Vec<i64> {
    txn.init_scan(db, TABLE, vec![0]).unwrap();
    let mut ids = Vec::new();
    while let Some(output) = txn.scan(db, TABLE).unwrap() {
        ids.extend(
            output
                .block
                .column(0)
                .as_primitive::<Int64Type>()
                .values()
                .iter()
                .copied(),
        );
    }
    txn.complete_scan(db, TABLE).unwrap();
    ids
}
