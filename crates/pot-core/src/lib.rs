use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod chain;
pub mod constants;
pub mod error;
pub mod mapping;
pub mod money;
pub mod signature;
pub mod stats;
pub mod summary;
pub mod validate;

use constants::{
    AMOUNT_DECIMALS, FIELD_DELIMITER, GENESIS_ACTOR, GENESIS_NOTE, HASH_HEX_SIZE, UNKNOWN_ACTOR,
    ZERO_HASH_CHAR,
};

pub use chain::{ChainStore, Ledger, PendingTransaction, PotSettings, TxRequest};
pub use error::{LedgerError, MappingError, SignatureError, TxError, UnknownAction};
pub use mapping::{from_mappings, to_mappings, Mapping, FIELDS};
pub use signature::{Attestation, EthereumVerifier, SignatureVerifier};
pub use stats::PotStats;
pub use validate::{validate_chain, verify_chain, ChainFault};

/// What a block records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Genesis,
    Deposit,
    Withdraw,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Genesis => "GENESIS",
            Action::Deposit => "DEPOSIT",
            Action::Withdraw => "WITHDRAW",
        }
    }

    /// Deposits and withdrawals move money; genesis does not.
    pub fn is_transaction(&self) -> bool {
        !matches!(self, Action::Genesis)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        [Action::Genesis, Action::Deposit, Action::Withdraw]
            .into_iter()
            .find(|action| action.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

/// One ledger entry. Created once by [`make_genesis`] or [`make_block`] and
/// never mutated afterwards; `hash` covers every other field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: f64,
    pub actor: String,
    pub action: Action,
    pub amount: f64,
    pub note: String,
    pub prev_hash: String,
    pub wallet_address: String,
    pub signed_message: String,
    pub signature: String,
    pub hash: String,
}

impl Block {
    /// The labeled, ordered concatenation of every field except `hash`.
    ///
    /// Floats are rendered in their shortest round-trip form with a
    /// fractional part always present (`25.0`, `1700000000.5`), which keeps
    /// digests identical to ledgers already written in this format.
    pub fn digest_payload(&self) -> String {
        let d = FIELD_DELIMITER;
        format!(
            "{}{d}{}{d}{}{d}{}{d}{}{d}{}{d}{}{d}{}{d}{}{d}{}",
            self.index,
            render_float(self.timestamp),
            self.actor,
            self.action,
            render_float(self.amount),
            self.note,
            self.prev_hash,
            self.wallet_address,
            self.signed_message,
            self.signature,
        )
    }

    /// Recompute the digest from the stored fields, ignoring the stored `hash`.
    pub fn compute_hash(&self) -> String {
        sha256_hex(self.digest_payload().as_bytes())
    }

    pub fn is_signed(&self) -> bool {
        !self.signature.is_empty()
    }

    fn sealed(mut self) -> Self {
        self.hash = self.compute_hash();
        self
    }
}

/// Transaction attributes handed to [`make_block`]. Optional fields default
/// to empty strings on the block.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockInput {
    pub actor: String,
    pub action: Action,
    pub amount: f64,
    pub note: Option<String>,
    pub wallet_address: Option<String>,
    pub signed_message: Option<String>,
    pub signature: Option<String>,
}

impl BlockInput {
    pub fn new(actor: impl Into<String>, action: Action, amount: f64) -> Self {
        Self {
            actor: actor.into(),
            action,
            amount,
            note: None,
            wallet_address: None,
            signed_message: None,
            signature: None,
        }
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn signed_message(mut self, message: impl Into<String>) -> Self {
        self.signed_message = Some(message.into());
        self
    }

    pub fn attested(mut self, wallet_address: impl Into<String>, signature: impl Into<String>) -> Self {
        self.wallet_address = Some(wallet_address.into());
        self.signature = Some(signature.into());
        self
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub fn zero_hash() -> String {
    std::iter::repeat(ZERO_HASH_CHAR).take(HASH_HEX_SIZE).collect()
}

/// Round to [`AMOUNT_DECIMALS`] places the same way the canonical message
/// formats amounts, so a rounded amount always prints as its own message
/// field (`0.125` becomes `0.12`, not `0.13`).
pub fn round_amount(amount: f64) -> f64 {
    let precision = AMOUNT_DECIMALS as usize;
    format!("{amount:.precision$}").parse().unwrap_or(amount)
}

/// Trimmed actor name, or `UNKNOWN` when nothing is left.
pub fn normalize_actor(actor: &str) -> String {
    match actor.trim() {
        "" => UNKNOWN_ACTOR.to_string(),
        trimmed => trimmed.to_string(),
    }
}

/// Seconds since the Unix epoch, with sub-second precision.
pub fn now_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// Shortest round-trip rendering. Very large and very small magnitudes use
/// a signed, two-digit exponent (`1e+16`, `1.5e-05`).
fn render_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    let repr = format!("{value:?}");
    match repr.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => repr,
    }
}

/// The sentinel first block of every chain.
pub fn make_genesis() -> Block {
    Block {
        index: 0,
        timestamp: 0.0,
        actor: GENESIS_ACTOR.to_string(),
        action: Action::Genesis,
        amount: 0.0,
        note: GENESIS_NOTE.to_string(),
        prev_hash: zero_hash(),
        wallet_address: String::new(),
        signed_message: String::new(),
        signature: String::new(),
        hash: String::new(),
    }
    .sealed()
}

/// The exact payload a wallet signs to attest a transaction.
///
/// This string is a wire contract: previously issued signatures only stay
/// verifiable as long as field order, labels, delimiter and amount precision
/// stay exactly as they are.
pub fn canonical_message(
    pot_name: &str,
    actor: &str,
    action: Action,
    amount: f64,
    timestamp: i64,
    prev_hash: &str,
) -> String {
    let d = FIELD_DELIMITER;
    let precision = AMOUNT_DECIMALS as usize;
    format!(
        "POT:{pot_name}{d}ACTOR:{actor}{d}ACTION:{action}{d}AMOUNT:{amount:.precision$}{d}TS:{timestamp}{d}PREV:{prev_hash}"
    )
}

/// Build the block that follows `prev`, stamped with the current time.
pub fn make_block(prev: &Block, input: BlockInput) -> Block {
    make_block_at(prev, input, now_timestamp())
}

/// Like [`make_block`] with an explicit timestamp. The amount is rounded but
/// not checked; rejecting non-positive amounts happens before this point.
pub fn make_block_at(prev: &Block, input: BlockInput, timestamp: f64) -> Block {
    Block {
        index: prev.index + 1,
        timestamp,
        actor: normalize_actor(&input.actor),
        action: input.action,
        amount: round_amount(input.amount),
        note: input.note.unwrap_or_default().trim().to_string(),
        prev_hash: prev.hash.clone(),
        wallet_address: input.wallet_address.unwrap_or_default(),
        signed_message: input.signed_message.unwrap_or_default(),
        signature: input.signature.unwrap_or_default(),
        hash: String::new(),
    }
    .sealed()
}
