//! Double-entry transfer transaction
//!
//! # Lock ordering
//!
//! Balance updates take row locks. Two transfers over the same pair of
//! accounts in opposite directions would each lock "their" source first and
//! wait on the other forever. To rule that out, balances are always updated
//! lower account id first, whatever direction the request names:
//!
//! ```text
//! transfer 1 -> 2 : lock 1, lock 2
//! transfer 2 -> 1 : lock 1, lock 2   (credit applied first)
//! ```
//!
//! The transfer row, the entries and the returned result keep the caller's
//! direction; only the update order is canonicalized.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::error::StoreResult;
use super::models::{Account, Entry, Transfer};
use super::queries::{CreateEntryParams, CreateTransferParams, Queries};
use super::store::invalid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTxParams {
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount: i64,
}

impl TransferTxParams {
    pub fn new(from_account_id: i64, to_account_id: i64, amount: i64) -> Self {
        Self {
            from_account_id,
            to_account_id,
            amount,
        }
    }

    /// Checked before a transaction is opened
    pub fn validate(&self) -> StoreResult<()> {
        if self.amount <= 0 {
            return Err(invalid("amount must be greater than zero"));
        }
        if self.from_account_id == self.to_account_id {
            return Err(invalid("source and destination account cannot be the same"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TransferTxResult {
    pub transfer: Transfer,
    pub from_account: Account,
    pub to_account: Account,
    pub from_entry: Entry,
    pub to_entry: Entry,
}

pub(crate) async fn transfer(
    q: &mut dyn Queries,
    arg: TransferTxParams,
) -> StoreResult<TransferTxResult> {
    let transfer = q
        .create_transfer(CreateTransferParams {
            from_account_id: arg.from_account_id,
            to_account_id: arg.to_account_id,
            amount: arg.amount,
        })
        .await?;

    let from_entry = q
        .create_entry(CreateEntryParams {
            account_id: arg.from_account_id,
            amount: -arg.amount,
        })
        .await?;

    let to_entry = q
        .create_entry(CreateEntryParams {
            account_id: arg.to_account_id,
            amount: arg.amount,
        })
        .await?;

    let (from_account, to_account) = if arg.from_account_id < arg.to_account_id {
        add_money(
            q,
            arg.from_account_id,
            -arg.amount,
            arg.to_account_id,
            arg.amount,
        )
        .await?
    } else {
        let (to_account, from_account) = add_money(
            q,
            arg.to_account_id,
            arg.amount,
            arg.from_account_id,
            -arg.amount,
        )
        .await?;
        (from_account, to_account)
    };

    tracing::debug!(
        transfer_id = transfer.id,
        from_account_id = arg.from_account_id,
        to_account_id = arg.to_account_id,
        amount = arg.amount,
        "transfer recorded"
    );

    Ok(TransferTxResult {
        transfer,
        from_account,
        to_account,
        from_entry,
        to_entry,
    })
}

/// Applies two balance deltas in the given order. Callers pass the lower
/// account id first.
async fn add_money(
    q: &mut dyn Queries,
    account_id1: i64,
    amount1: i64,
    account_id2: i64,
    amount2: i64,
) -> StoreResult<(Account, Account)> {
    let account1 = q.add_account_balance(account_id1, amount1).await?;
    let account2 = q.add_account_balance(account_id2, amount2).await?;
    Ok((account1, account2))
}
