//! Conversion between a chain and one field mapping per block.
//!
//! Storage backends persist whatever these mappings hold, so loading has to
//! coerce loosely typed values (numeric strings from a tabular file, nulls
//! for blank cells) back into the block schema, and refuse rows that do not
//! fit it.

use crate::error::MappingError;
use crate::{Action, Block};
use serde_json::{Map, Value};

pub type Mapping = Map<String, Value>;

/// Column order of the persisted ledger.
pub const FIELDS: [&str; 11] = [
    "index",
    "timestamp",
    "actor",
    "action",
    "amount",
    "note",
    "prev_hash",
    "wallet_address",
    "signed_message",
    "signature",
    "hash",
];

pub fn to_mapping(block: &Block) -> Mapping {
    let mut row = Map::new();
    row.insert("index".into(), Value::from(block.index));
    row.insert("timestamp".into(), Value::from(block.timestamp));
    row.insert("actor".into(), Value::from(block.actor.as_str()));
    row.insert("action".into(), Value::from(block.action.as_str()));
    row.insert("amount".into(), Value::from(block.amount));
    row.insert("note".into(), Value::from(block.note.as_str()));
    row.insert("prev_hash".into(), Value::from(block.prev_hash.as_str()));
    row.insert("wallet_address".into(), Value::from(block.wallet_address.as_str()));
    row.insert("signed_message".into(), Value::from(block.signed_message.as_str()));
    row.insert("signature".into(), Value::from(block.signature.as_str()));
    row.insert("hash".into(), Value::from(block.hash.as_str()));
    row
}

pub fn to_mappings(chain: &[Block]) -> Vec<Mapping> {
    chain.iter().map(to_mapping).collect()
}

/// Rebuild a block from a mapping. `row` only labels errors.
pub fn from_mapping(row: usize, mapping: &Mapping) -> Result<Block, MappingError> {
    let text = |field| string_field(row, mapping, field);
    let action = text("action")?;
    Ok(Block {
        index: integer_field(row, mapping, "index")?,
        timestamp: float_field(row, mapping, "timestamp")?,
        actor: text("actor")?,
        action: action
            .parse::<Action>()
            .map_err(|source| MappingError::Action { row, source })?,
        amount: float_field(row, mapping, "amount")?,
        note: text("note")?,
        prev_hash: text("prev_hash")?,
        wallet_address: text("wallet_address")?,
        signed_message: text("signed_message")?,
        signature: text("signature")?,
        hash: text("hash")?,
    })
}

pub fn from_mappings(rows: &[Mapping]) -> Result<Vec<Block>, MappingError> {
    rows.iter()
        .enumerate()
        .map(|(row, mapping)| from_mapping(row, mapping))
        .collect()
}

fn invalid(row: usize, field: &'static str, value: &Value) -> MappingError {
    MappingError::InvalidValue {
        row,
        field,
        value: value.to_string(),
    }
}

fn required<'a>(
    row: usize,
    mapping: &'a Mapping,
    field: &'static str,
) -> Result<&'a Value, MappingError> {
    match mapping.get(field) {
        None | Some(Value::Null) => Err(MappingError::MissingField { row, field }),
        Some(value) => Ok(value),
    }
}

fn integer_field(row: usize, mapping: &Mapping, field: &'static str) -> Result<u64, MappingError> {
    let value = required(row, mapping, field)?;
    let parsed = match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(whole_number)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(whole_number))
        }
        _ => None,
    };
    parsed.ok_or_else(|| invalid(row, field, value))
}

fn whole_number(f: f64) -> Option<u64> {
    (f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64).then_some(f as u64)
}

fn float_field(row: usize, mapping: &Mapping, field: &'static str) -> Result<f64, MappingError> {
    let value = required(row, mapping, field)?;
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|f| f.is_finite())
        .ok_or_else(|| invalid(row, field, value))
}

fn string_field(row: usize, mapping: &Mapping, field: &'static str) -> Result<String, MappingError> {
    match mapping.get(field) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(value @ (Value::Number(_) | Value::Bool(_))) => Ok(value.to_string()),
        Some(value) => Err(invalid(row, field, value)),
    }
}
