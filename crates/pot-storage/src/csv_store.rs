use crate::LEDGER_FILE;
use anyhow::{Context, Result};
use pot_core::{from_mappings, to_mappings, Block, ChainStore, Mapping, FIELDS};
use serde_json::Value;
use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// The ledger as a CSV file, one row per block, columns in [`FIELDS`] order.
#[derive(Clone, Debug)]
pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// `<dir>/ledger.csv`
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self::new(dir.as_ref().join(LEDGER_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl ChainStore for CsvStore {
    fn load(&self) -> Result<Vec<Block>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no ledger file yet");
            return Ok(Vec::new());
        }
        let file = File::open(&self.path)
            .with_context(|| format!("opening ledger {}", self.path.display()))?;
        let chain = read_csv(BufReader::new(file))
            .with_context(|| format!("loading ledger {}", self.path.display()))?;
        info!(path = %self.path.display(), blocks = chain.len(), "csv ledger loaded");
        Ok(chain)
    }

    /// Writes a temp file next to the ledger and renames it into place, so a
    /// crash mid-write never leaves a truncated ledger behind.
    fn save(&self, chain: &[Block]) -> Result<()> {
        let dir = self.dir();
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        write_csv(&mut tmp, chain)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .with_context(|| format!("replacing ledger {}", self.path.display()))?;
        debug!(path = %self.path.display(), blocks = chain.len(), "csv ledger saved");
        Ok(())
    }
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

pub fn write_csv<W: Write>(writer: W, chain: &[Block]) -> Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(FIELDS)?;
    for row in to_mappings(chain) {
        out.write_record(FIELDS.iter().map(|field| cell(row.get(*field))))?;
    }
    out.flush()?;
    Ok(())
}

/// Parse a ledger CSV. Every cell is handed to the core as text and coerced
/// to the block schema there; a row that does not fit fails the whole read.
pub fn read_csv<R: io::Read>(reader: R) -> Result<Vec<Block>> {
    let mut input = csv::Reader::from_reader(reader);
    let headers = input.headers()?.clone();
    let mut rows: Vec<Mapping> = Vec::new();
    for (line, record) in input.records().enumerate() {
        let record = record.with_context(|| format!("reading ledger row {line}"))?;
        let row = headers
            .iter()
            .zip(record.iter())
            .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
            .collect();
        rows.push(row);
    }
    Ok(from_mappings(&rows)?)
}

/// The whole chain as a flat CSV document, every field included.
pub fn export_csv(chain: &[Block]) -> Result<String> {
    let mut buf = Vec::new();
    write_csv(&mut buf, chain)?;
    Ok(String::from_utf8(buf)?)
}
