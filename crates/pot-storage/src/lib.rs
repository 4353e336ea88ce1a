pub mod csv_store;
pub mod sled_store;

pub use csv_store::{export_csv, read_csv, write_csv, CsvStore};
pub use sled_store::SledStore;

/// File name of the tabular ledger inside a data directory.
pub const LEDGER_FILE: &str = "ledger.csv";
/// Directory name of the sled database inside a data directory.
pub const LEDGER_DB: &str = "ledger.sled";
