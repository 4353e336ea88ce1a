use crate::error::{LedgerError, Result, TxError};
use crate::signature::{Attestation, SignatureVerifier};
use crate::validate::{verify_chain, ChainFault};
use crate::{
    canonical_message, make_block, make_genesis, normalize_actor, round_amount, Action, Block,
    BlockInput,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Trait the storage backends implement for the ledger to persist itself.
/// This lives in `pot-core` to avoid a circular dependency.
pub trait ChainStore: Send + Sync {
    /// The persisted chain, or an empty vec when nothing was saved yet.
    fn load(&self) -> anyhow::Result<Vec<Block>>;
    /// Replace whatever is persisted with `chain`.
    fn save(&self, chain: &[Block]) -> anyhow::Result<()>;
    /// Persist `chain`, whose last block was just appended.
    fn append(&self, chain: &[Block]) -> anyhow::Result<()> {
        self.save(chain)
    }
}

/// Per-pot settings applied at the transaction boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PotSettings {
    pub pot_name: String,
    pub allow_withdrawals: bool,
}

impl Default for PotSettings {
    fn default() -> Self {
        Self {
            pot_name: "SpringBreakFund".to_string(),
            allow_withdrawals: true,
        }
    }
}

/// What a participant asks to record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TxRequest {
    pub actor: String,
    pub action: Action,
    pub amount: f64,
}

impl TxRequest {
    pub fn validate(&self, settings: &PotSettings) -> std::result::Result<(), TxError> {
        if self.actor.trim().is_empty() {
            return Err(TxError::BlankActor);
        }
        if !self.action.is_transaction() {
            return Err(TxError::NotATransaction(self.action));
        }
        if self.action == Action::Withdraw && !settings.allow_withdrawals {
            return Err(TxError::WithdrawalsDisabled);
        }
        // amounts that round to zero would record an empty transaction
        if !(self.amount.is_finite() && round_amount(self.amount) > 0.0) {
            return Err(TxError::NonPositiveAmount(self.amount));
        }
        Ok(())
    }
}

/// A transaction whose fields are frozen together with the canonical message
/// a wallet may sign. Committing always uses these locked values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub pot_name: String,
    pub actor: String,
    pub action: Action,
    pub amount: f64,
    pub timestamp: i64,
    pub prev_hash: String,
    pub message: String,
}

impl PendingTransaction {
    /// True while `message` still matches the locked fields.
    pub fn is_intact(&self) -> bool {
        self.message
            == canonical_message(
                &self.pot_name,
                &self.actor,
                self.action,
                self.amount,
                self.timestamp,
                &self.prev_hash,
            )
    }

    fn request(&self) -> TxRequest {
        TxRequest {
            actor: self.actor.clone(),
            action: self.action,
            amount: self.amount,
        }
    }
}

/// The authoritative in-memory chain plus the store it is persisted to.
///
/// A ledger is never empty: opening an empty store seeds it with genesis, and
/// `reset` keeps the first block. Blocks are only ever appended.
pub struct Ledger<S: ChainStore + ?Sized> {
    store: Arc<S>,
    settings: PotSettings,
    blocks: Vec<Block>,
}

impl<S: ChainStore + ?Sized> Ledger<S> {
    /// Load the persisted chain, seeding and saving genesis when the store is
    /// empty. A loaded chain that fails verification is kept as-is and
    /// reported through [`Ledger::verify`].
    pub fn open(store: Arc<S>, settings: PotSettings) -> Result<Self> {
        let mut blocks = store.load()?;
        if blocks.is_empty() {
            blocks.push(make_genesis());
            store.save(&blocks)?;
            info!("seeded new ledger with genesis block");
        }
        let ledger = Self {
            store,
            settings,
            blocks,
        };
        match ledger.verify() {
            Ok(()) => info!(height = ledger.height(), "ledger loaded"),
            Err(fault) => warn!(%fault, "loaded ledger fails verification"),
        }
        Ok(ledger)
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn settings(&self) -> &PotSettings {
        &self.settings
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn tip(&self) -> &Block {
        // never empty, see `open` and `reset`
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn height(&self) -> u64 {
        self.tip().index
    }

    pub fn verify(&self) -> std::result::Result<(), ChainFault> {
        verify_chain(&self.blocks)
    }

    pub fn is_valid(&self) -> bool {
        self.verify().is_ok()
    }

    /// Validate a request and lock it against the current tip.
    pub fn prepare(&self, request: &TxRequest) -> Result<PendingTransaction> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        self.prepare_at(request, now)
    }

    /// The amount is rounded once here; the locked value is what the message
    /// shows and what the committed block records.
    pub fn prepare_at(&self, request: &TxRequest, timestamp: i64) -> Result<PendingTransaction> {
        request.validate(&self.settings)?;
        let actor = normalize_actor(&request.actor);
        let amount = round_amount(request.amount);
        let prev_hash = self.tip().hash.clone();
        let message = canonical_message(
            &self.settings.pot_name,
            &actor,
            request.action,
            amount,
            timestamp,
            &prev_hash,
        );
        Ok(PendingTransaction {
            pot_name: self.settings.pot_name.clone(),
            actor,
            action: request.action,
            amount,
            timestamp,
            prev_hash,
            message,
        })
    }

    /// Append the block for a pending transaction.
    ///
    /// The pending transaction must still be intact and prepared against the
    /// current tip. If the store rejects the write the block is dropped again
    /// and the chain is left exactly as it was.
    pub fn commit(
        &mut self,
        pending: &PendingTransaction,
        note: &str,
        attestation: &Attestation,
    ) -> Result<&Block> {
        pending.request().validate(&self.settings)?;
        if !pending.is_intact() {
            return Err(LedgerError::MessageMismatch);
        }
        if pending.prev_hash != self.tip().hash {
            return Err(LedgerError::StalePending {
                expected: pending.prev_hash.clone(),
                actual: self.tip().hash.clone(),
            });
        }
        let input = BlockInput::new(pending.actor.as_str(), pending.action, pending.amount)
            .note(note)
            .signed_message(pending.message.as_str())
            .attested(attestation.wallet_address(), attestation.signature());
        let block = make_block(self.tip(), input);
        self.blocks.push(block);
        if let Err(err) = self.store.append(&self.blocks) {
            self.blocks.pop();
            return Err(err.into());
        }
        let block = self.tip();
        info!(
            index = block.index,
            action = %block.action,
            actor = %block.actor,
            amount = block.amount,
            signed = block.is_signed(),
            "block appended"
        );
        Ok(block)
    }

    /// Check the optional wallet fields against the pending message, then
    /// commit. A signature mismatch rejects the transaction.
    pub fn commit_signed<V: SignatureVerifier + ?Sized>(
        &mut self,
        verifier: &V,
        pending: &PendingTransaction,
        note: &str,
        wallet_address: &str,
        signature: &str,
    ) -> Result<&Block> {
        let attestation = Attestation::check(verifier, &pending.message, wallet_address, signature)?;
        self.commit(pending, note, &attestation)
    }

    /// Drop every block after the first one.
    pub fn reset(&mut self) -> Result<()> {
        let removed = self.blocks.split_off(1);
        if let Err(err) = self.store.save(&self.blocks) {
            self.blocks.extend(removed);
            return Err(err.into());
        }
        info!(removed = removed.len(), "ledger reset to genesis");
        Ok(())
    }
}
