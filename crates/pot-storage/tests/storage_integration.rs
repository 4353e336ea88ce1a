mod helpers;

use helpers::{create_temp_dir, create_temp_store, random_chain, remove_temp_dir, teardown_store};
use pot_core::{validate_chain, Attestation, ChainStore, Ledger, PotSettings, TxRequest, Action};
use pot_storage::{export_csv, CsvStore, SledStore};
use std::fs;
use std::sync::Arc;

#[tokio::test]
async fn test_csv_round_trip() -> anyhow::Result<()> {
    let (temp_dir, dir) = create_temp_dir();
    let store = CsvStore::in_dir(&dir);
    let chain = random_chain(50);
    store.save(&chain)?;
    let loaded = store.load()?;
    assert_eq!(loaded, chain);
    assert!(validate_chain(&loaded));
    remove_temp_dir(temp_dir);
    Ok(())
}

#[tokio::test]
async fn test_csv_absent_file_is_empty_chain() -> anyhow::Result<()> {
    let (temp_dir, dir) = create_temp_dir();
    let store = CsvStore::in_dir(dir.join("not-created-yet"));
    assert!(store.load()?.is_empty());
    assert!(!store.path().exists());
    remove_temp_dir(temp_dir);
    Ok(())
}

#[tokio::test]
async fn test_csv_save_creates_parent_dir() -> anyhow::Result<()> {
    let (temp_dir, dir) = create_temp_dir();
    let store = CsvStore::in_dir(dir.join("data").join("pots"));
    store.save(&random_chain(3))?;
    assert!(store.path().exists());
    assert_eq!(store.load()?.len(), 3);
    remove_temp_dir(temp_dir);
    Ok(())
}

#[tokio::test]
async fn test_csv_save_replaces_contents() -> anyhow::Result<()> {
    let (temp_dir, dir) = create_temp_dir();
    let store = CsvStore::in_dir(&dir);
    let chain = random_chain(10);
    store.save(&chain)?;
    store.save(&chain[..1])?;
    assert_eq!(store.load()?, chain[..1].to_vec());
    let leftovers: Vec<_> = fs::read_dir(&dir)?.collect();
    assert_eq!(leftovers.len(), 1, "temp files should not be left behind");
    remove_temp_dir(temp_dir);
    Ok(())
}

#[tokio::test]
async fn test_csv_corrupted_file_fails_to_load() -> anyhow::Result<()> {
    let (temp_dir, dir) = create_temp_dir();
    let store = CsvStore::in_dir(&dir);
    store.save(&random_chain(4))?;
    let text = fs::read_to_string(store.path())?;
    fs::write(store.path(), text.replacen("DEPOSIT", "REFUND", 1).replacen("WITHDRAW", "REFUND", 1))?;
    let err = store.load().unwrap_err();
    assert!(format!("{err:#}").contains("REFUND"), "{err:#}");
    remove_temp_dir(temp_dir);
    Ok(())
}

#[tokio::test]
async fn test_export_matches_store_file() -> anyhow::Result<()> {
    let (temp_dir, dir) = create_temp_dir();
    let store = CsvStore::in_dir(&dir);
    let chain = random_chain(8);
    store.save(&chain)?;
    assert_eq!(fs::read_to_string(store.path())?, export_csv(&chain)?);
    remove_temp_dir(temp_dir);
    Ok(())
}

#[tokio::test]
async fn test_sled_round_trip() -> anyhow::Result<()> {
    let (temp_dir, store) = create_temp_store();
    let chain = random_chain(100);
    store.save(&chain)?;
    assert_eq!(store.len()?, 100);
    assert_eq!(store.load()?, chain);
    teardown_store(temp_dir, store);
    Ok(())
}

#[tokio::test]
async fn test_sled_append_writes_tail() -> anyhow::Result<()> {
    let (temp_dir, store) = create_temp_store();
    let chain = random_chain(5);
    for end in 1..=chain.len() {
        store.append(&chain[..end])?;
    }
    assert_eq!(store.load()?, chain);
    teardown_store(temp_dir, store);
    Ok(())
}

#[tokio::test]
async fn test_sled_save_truncates() -> anyhow::Result<()> {
    let (temp_dir, store) = create_temp_store();
    let chain = random_chain(6);
    store.save(&chain)?;
    store.save(&chain[..1])?;
    assert_eq!(store.load()?, chain[..1].to_vec());
    teardown_store(temp_dir, store);
    Ok(())
}

#[tokio::test]
async fn test_sled_persistence() -> anyhow::Result<()> {
    let (temp_dir, dir) = create_temp_dir();
    let db_path = dir.join("ledger.sled");
    let chain = random_chain(12);
    {
        let store = SledStore::open(&db_path)?;
        store.save(&chain)?;
        store.close()?;
    }
    {
        let store = SledStore::open(&db_path)?;
        assert_eq!(store.load()?, chain);
    }
    remove_temp_dir(temp_dir);
    Ok(())
}

#[tokio::test]
async fn test_sled_corrupted_value_fails_to_load() -> anyhow::Result<()> {
    let (temp_dir, dir) = create_temp_dir();
    let db_path = dir.join("ledger.sled");
    {
        let store = SledStore::open(&db_path)?;
        store.save(&random_chain(2))?;
        store.close()?;
    }
    {
        let sled_db = sled::open(&db_path)?;
        let blocks = sled_db.open_tree("blocks")?;
        blocks.insert(1u64.to_be_bytes(), vec![0u8; 3])?;
        sled_db.flush()?;
    }
    let store = SledStore::open(&db_path)?;
    let err = store.load().unwrap_err();
    assert!(
        format!("{err:#}").contains("decoding block under key 0000000000000001"),
        "{err:#}"
    );
    drop(store);
    remove_temp_dir(temp_dir);
    Ok(())
}

#[tokio::test]
async fn test_sled_empty_database() -> anyhow::Result<()> {
    let (temp_dir, store) = create_temp_store();
    assert!(store.is_empty()?);
    assert!(store.load()?.is_empty());
    teardown_store(temp_dir, store);
    Ok(())
}

#[tokio::test]
async fn test_store_trait_compliance() -> anyhow::Result<()> {
    fn assert_store_trait<T: ChainStore>() {}
    assert_store_trait::<CsvStore>();
    assert_store_trait::<SledStore>();
    Ok(())
}

fn deposit(actor: &str, amount: f64) -> TxRequest {
    TxRequest {
        actor: actor.to_string(),
        action: Action::Deposit,
        amount,
    }
}

#[tokio::test]
async fn test_ledger_over_csv_survives_reopen() -> anyhow::Result<()> {
    let (temp_dir, dir) = create_temp_dir();
    let store = Arc::new(CsvStore::in_dir(&dir));
    let blocks = {
        let mut ledger = Ledger::open(store.clone(), PotSettings::default())?;
        for (actor, amount) in [("Alice", 25.0), ("Bob", 10.0)] {
            let pending = ledger.prepare(&deposit(actor, amount))?;
            ledger.commit(&pending, "weekly", &Attestation::Unsigned)?;
        }
        ledger.blocks().to_vec()
    };
    let reopened = Ledger::open(store, PotSettings::default())?;
    assert_eq!(reopened.blocks(), blocks.as_slice());
    assert!(reopened.is_valid());
    remove_temp_dir(temp_dir);
    Ok(())
}

#[tokio::test]
async fn test_ledger_over_sled_reset() -> anyhow::Result<()> {
    let (temp_dir, store) = create_temp_store();
    let store = Arc::new(store);
    let mut ledger = Ledger::open(store.clone(), PotSettings::default())?;
    let pending = ledger.prepare(&deposit("Alice", 5.0))?;
    ledger.commit(&pending, "", &Attestation::Unsigned)?;
    assert_eq!(store.len()?, 2);
    ledger.reset()?;
    assert_eq!(store.load()?, ledger.blocks().to_vec());
    assert_eq!(store.len()?, 1);
    drop(ledger);
    let store = Arc::try_unwrap(store).map_err(|_| anyhow::anyhow!("store still shared"))?;
    teardown_store(temp_dir, store);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_readers() -> anyhow::Result<()> {
    use tokio::task;
    let (temp_dir, dir) = create_temp_dir();
    let store = Arc::new(CsvStore::in_dir(&dir));
    let chain = random_chain(20);
    store.save(&chain)?;
    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        handles.push(task::spawn_blocking(move || store.load()));
    }
    for handle in handles {
        assert_eq!(handle.await??, chain);
    }
    remove_temp_dir(temp_dir);
    Ok(())
}
