pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
pub const ZERO_HASH_CHAR: char = '0';

pub const GENESIS_ACTOR: &str = "SYSTEM";
pub const GENESIS_NOTE: &str = "Ledger created";
pub const UNKNOWN_ACTOR: &str = "UNKNOWN";

/// Fractional digits kept on every amount, and used in the canonical message.
pub const AMOUNT_DECIMALS: i32 = 2;

/// Delimiter shared by the digest payload and the canonical message.
pub const FIELD_DELIMITER: char = '|';
