//! Database transaction utilities
//!
//! Every workflow change set is written through a [`TransactionGuard`] so the
//! workflow row, its assignments, the transition and the notifications commit together.

use sqlx::{PgPool, Postgres, Transaction};
use std::ops::{Deref, DerefMut};

use flowdesk_core::AppError;

/// Transaction wrapper with explicit commit/rollback.
///
/// A guard dropped without `commit` rolls back when sqlx releases the connection.
///
/// ```ignore
/// let mut tx = TransactionGuard::begin(&pool, "advance").await?;
/// sqlx::query("UPDATE workflows SET ...").execute(&mut **tx).await?;
/// tx.commit().await?;
/// ```
pub struct TransactionGuard<'a> {
    transaction: Transaction<'a, Postgres>,
    label: &'static str,
}

impl<'a> TransactionGuard<'a> {
    pub async fn begin(pool: &'a PgPool, label: &'static str) -> Result<Self, AppError> {
        let transaction = pool.begin().await?;
        tracing::trace!(tx = label, "Transaction started");
        Ok(Self { transaction, label })
    }

    pub async fn commit(self) -> Result<(), AppError> {
        let label = self.label;
        self.transaction.commit().await?;
        tracing::trace!(tx = label, "Transaction committed");
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), AppError> {
        let label = self.label;
        self.transaction.rollback().await?;
        tracing::debug!(tx = label, "Transaction rolled back");
        Ok(())
    }
}

impl<'a> Deref for TransactionGuard<'a> {
    type Target = Transaction<'a, Postgres>;

    fn deref(&self) -> &Self::Target {
        &self.transaction
    }
}

impl<'a> DerefMut for TransactionGuard<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.transaction
    }
}
