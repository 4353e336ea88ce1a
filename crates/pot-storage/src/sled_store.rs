use anyhow::{Context, Result};
use pot_core::{Block, ChainStore};
use sled::{Db, Tree};
use std::path::Path;
use tracing::{debug, info};

const TREE_BLOCKS: &str = "blocks";

/// Embedded alternative to the CSV file: one bincode value per block, keyed
/// by the big-endian block index so iteration order is chain order.
#[derive(Clone)]
pub struct SledStore {
  db: Db,
}

impl SledStore {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    let db = sled::open(path)?;
    info!("sled store opened");
    Ok(Self { db })
  }

  fn blocks(&self) -> Result<Tree> {
    Ok(self.db.open_tree(TREE_BLOCKS)?)
  }

  fn put(tree: &Tree, block: &Block) -> Result<()> {
    let bytes = bincode::serialize(block)?;
    tree.insert(block.index.to_be_bytes(), bytes)?;
    Ok(())
  }

  pub fn len(&self) -> Result<usize> {
    Ok(self.blocks()?.len())
  }

  pub fn is_empty(&self) -> Result<bool> {
    Ok(self.blocks()?.is_empty())
  }

  pub fn clear(&self) -> Result<()> {
    self.blocks()?.clear()?;
    self.db.flush()?;
    Ok(())
  }

  pub fn close(&self) -> Result<()> {
    self.db.flush()?;
    Ok(())
  }
}

impl ChainStore for SledStore {
  fn load(&self) -> Result<Vec<Block>> {
    let tree = self.blocks()?;
    let mut chain = Vec::with_capacity(tree.len());
    for entry in tree.iter() {
      let (key, value) = entry?;
      let block: Block = bincode::deserialize(&value)
        .with_context(|| format!("decoding block under key {}", hex::encode(&key)))?;
      chain.push(block);
    }
    debug!(blocks = chain.len(), "sled ledger loaded");
    Ok(chain)
  }

  fn save(&self, chain: &[Block]) -> Result<()> {
    let tree = self.blocks()?;
    tree.clear()?;
    for block in chain {
      Self::put(&tree, block)?;
    }
    self.db.flush()?;
    Ok(())
  }

  fn append(&self, chain: &[Block]) -> Result<()> {
    if let Some(block) = chain.last() {
      Self::put(&self.blocks()?, block)?;
      self.db.flush()?;
    }
    Ok(())
  }
}
