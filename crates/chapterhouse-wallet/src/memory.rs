//! In-process wallet.

use std::collections::HashMap;

use async_trait::async_trait;
use chapterhouse_core::UserId;
use tokio::sync::Mutex;
use ulid::Ulid;

use crate::error::WalletError;
use crate::{Wallet, WalletReceipt};

/// Kind of balance movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Money taken for a purchase.
    Consume,
    /// Money returned.
    Refund,
}

/// One applied balance movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletEntry {
    /// Receipt returned to the caller.
    pub receipt_id: String,
    /// Whose balance moved.
    pub user_id: UserId,
    /// Direction.
    pub kind: EntryKind,
    /// Amount in minor units.
    pub amount_cents: i64,
    /// Memo supplied by the caller.
    pub memo: String,
}

#[derive(Debug, Default)]
struct Ledger {
    balances: HashMap<UserId, i64>,
    entries: Vec<WalletEntry>,
}

/// Wallet holding per-user balances in memory.
///
/// One mutex guards every balance, so each consume or refund is atomic.
#[derive(Debug, Default)]
pub struct MemoryWallet {
    ledger: Mutex<Ledger>,
}

impl MemoryWallet {
    /// Create a wallet with no accounts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open or overwrite an account with the given balance.
    pub async fn set_balance(&self, user_id: UserId, balance_cents: i64) {
        self.ledger.lock().await.balances.insert(user_id, balance_cents);
    }

    /// Every applied movement, oldest first.
    pub async fn entries(&self) -> Vec<WalletEntry> {
        self.ledger.lock().await.entries.clone()
    }

    async fn apply(
        &self,
        user_id: &UserId,
        kind: EntryKind,
        amount_cents: i64,
        memo: &str,
    ) -> Result<WalletReceipt, WalletError> {
        if amount_cents <= 0 {
            return Err(WalletError::Configuration(format!(
                "amount must be positive, got {amount_cents}"
            )));
        }

        let mut ledger = self.ledger.lock().await;
        let balance = ledger
            .balances
            .get_mut(user_id)
            .ok_or_else(|| WalletError::AccountNotFound {
                user_id: user_id.to_string(),
            })?;

        let next = match kind {
            EntryKind::Consume if *balance < amount_cents => {
                return Err(WalletError::InsufficientFunds {
                    balance: *balance,
                    required: amount_cents,
                });
            }
            EntryKind::Consume => *balance - amount_cents,
            EntryKind::Refund => balance.saturating_add(amount_cents),
        };
        *balance = next;

        let receipt_id = format!("rcpt_{}", Ulid::new());
        ledger.entries.push(WalletEntry {
            receipt_id: receipt_id.clone(),
            user_id: *user_id,
            kind,
            amount_cents,
            memo: memo.to_string(),
        });

        Ok(WalletReceipt {
            receipt_id,
            balance_after_cents: next,
        })
    }
}

#[async_trait]
impl Wallet for MemoryWallet {
    async fn get_balance(&self, user_id: &UserId) -> Result<i64, WalletError> {
        self.ledger
            .lock()
            .await
            .balances
            .get(user_id)
            .copied()
            .ok_or_else(|| WalletError::AccountNotFound {
                user_id: user_id.to_string(),
            })
    }

    async fn consume(
        &self,
        user_id: &UserId,
        amount_cents: i64,
        memo: &str,
    ) -> Result<WalletReceipt, WalletError> {
        self.apply(user_id, EntryKind::Consume, amount_cents, memo).await
    }

    async fn refund(
        &self,
        user_id: &UserId,
        amount_cents: i64,
        memo: &str,
    ) -> Result<WalletReceipt, WalletError> {
        self.apply(user_id, EntryKind::Refund, amount_cents, memo).await
    }
}
