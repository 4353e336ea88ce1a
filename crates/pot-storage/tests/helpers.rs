#![allow(dead_code)]

use std::fs;

use pot_core::{make_block_at, make_genesis, Action, Block, BlockInput};
use pot_storage::sled_store::SledStore;
use rand::Rng;
use tempfile::{tempdir, TempDir};

pub fn create_temp_dir() -> (TempDir, std::path::PathBuf) {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let path = temp_dir.path().to_path_buf();
    (temp_dir, path)
}

pub fn remove_temp_dir(temp_dir: TempDir) {
    let path = temp_dir.path().to_path_buf();
    temp_dir.close().expect("Failed to delete temp dir");
    let _ = fs::remove_dir_all(&path);
    assert!(!path.exists(), "Temp directory should be removed");
}

pub fn create_temp_store() -> (TempDir, SledStore) {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("ledger.sled");
    (
        temp_dir,
        SledStore::open(db_path).expect("Failed to open SledStore"),
    )
}

pub fn teardown_store(temp_dir: TempDir, store: SledStore) {
    store.clear().expect("Failed to clear the store");
    drop(store);
    remove_temp_dir(temp_dir);
}

/// A valid chain of `len` blocks (genesis included) with random members,
/// amounts and a few signed-looking entries.
pub fn random_chain(len: usize) -> Vec<Block> {
    let mut rng = rand::thread_rng();
    let members = ["Alice", "Bob", "Carol", "Dan", "Émile"];
    let mut chain = vec![make_genesis()];
    for i in 1..len {
        let action = if rng.gen_bool(0.75) {
            Action::Deposit
        } else {
            Action::Withdraw
        };
        let mut input = BlockInput::new(
            members[rng.gen_range(0..members.len())],
            action,
            rng.gen_range(0.01..1_000.0),
        )
        .note(format!("entry {i}, \"quoted\""));
        if i % 3 == 0 {
            let sig: [u8; 32] = rng.gen();
            input = input
                .signed_message(format!("POT:test|ACTOR:x|TS:{i}"))
                .attested("0xAbCdEf0000000000000000000000000000000001", format!("0x{}", hex::encode(sig)));
        }
        let timestamp = 1_700_000_000.0 + i as f64 * rng.gen_range(0.5..90.0);
        let block = make_block_at(&chain[i - 1], input, timestamp);
        chain.push(block);
    }
    chain
}
