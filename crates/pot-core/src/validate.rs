//! Full-chain replay.

use crate::{Action, Block};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The first structural problem found while replaying a chain. `index` is
/// the position in the chain of the offending block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainFault {
    #[error("chain is empty")]
    Empty,
    #[error("first block is not a genesis block")]
    MissingGenesis,
    #[error("block {index}: prev_hash does not match the previous block's hash")]
    PrevHashMismatch { index: usize },
    #[error("block {index}: stored hash does not match its recomputed digest")]
    DigestMismatch { index: usize },
}

impl ChainFault {
    pub fn index(&self) -> Option<usize> {
        match self {
            ChainFault::Empty | ChainFault::MissingGenesis => None,
            ChainFault::PrevHashMismatch { index } | ChainFault::DigestMismatch { index } => {
                Some(*index)
            }
        }
    }
}

/// Replay the whole chain and report the first failing position.
///
/// The first block must be a genesis block. Every later block must point at
/// its predecessor's hash and carry a hash equal to the digest of its own
/// fields. Nothing is cached between calls.
pub fn verify_chain(chain: &[Block]) -> Result<(), ChainFault> {
    let first = chain.first().ok_or(ChainFault::Empty)?;
    if first.action != Action::Genesis {
        return Err(ChainFault::MissingGenesis);
    }
    for (offset, pair) in chain.windows(2).enumerate() {
        let (prev, current) = (&pair[0], &pair[1]);
        let index = offset + 1;
        if current.prev_hash != prev.hash {
            return Err(ChainFault::PrevHashMismatch { index });
        }
        if current.compute_hash() != current.hash {
            return Err(ChainFault::DigestMismatch { index });
        }
    }
    Ok(())
}

pub fn validate_chain(chain: &[Block]) -> bool {
    verify_chain(chain).is_ok()
}
