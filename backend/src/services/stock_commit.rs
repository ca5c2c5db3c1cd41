//! Stock commit: consume an order's materials exactly once
//!
//! Runs inside one database transaction:
//! 1. lock the order row and check the latch and status
//! 2. re-expand every line and refresh both cached requirement levels
//! 3. lock the inventory rows in ascending material id order
//! 4. approve or reject every decrement at once
//! 5. decrement, write usage history under one batch id, flip the latch
//!
//! Any rejection drops the transaction, so nothing of the attempt remains.

use serde::Serialize;
use shared::{
    lock_order, plan_decrements, MaterialsLatch, OrderStatus, StockDecrement, UsageHistoryEntry,
};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::config::StockConfig;
use crate::error::{AppError, AppResult};
use crate::services::material::{decrement_stock, lock_stock_levels};
use crate::services::requirements::{lock_order_row, rebuild_order};

/// Stock commit service
#[derive(Clone)]
pub struct StockCommitService {
    db: PgPool,
    lock_timeout_ms: u64,
}

/// Why a commit request did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyCommitted,
    StatusNotConfirmed { status: OrderStatus },
}

/// Stock consumed by a successful commit
#[derive(Debug, Clone, Serialize)]
pub struct CommitReceipt {
    pub pedido_id: i64,
    pub batch_id: Uuid,
    pub decrements: Vec<StockDecrement>,
    pub usage: Vec<UsageHistoryEntry>,
}

/// Result of a commit request
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommitOutcome {
    Committed(CommitReceipt),
    Skipped(SkipReason),
}

impl CommitOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed(_))
    }
}

/// Bound the wait for row locks taken by the rest of the transaction
async fn set_lock_timeout(conn: &mut PgConnection, lock_timeout_ms: u64) -> AppResult<()> {
    sqlx::query("SELECT set_config('lock_timeout', $1, true)")
        .bind(format!("{}ms", lock_timeout_ms))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Commit an order's materials inside the caller's transaction.
///
/// Returns `Skipped` when the latch is already set or the order is not in
/// the materials-confirmed status. On error the caller must roll back.
pub(crate) async fn commit_in(
    conn: &mut PgConnection,
    order_id: i64,
    lock_timeout_ms: u64,
) -> AppResult<CommitOutcome> {
    set_lock_timeout(conn, lock_timeout_ms).await?;

    let (status, committed) = lock_order_row(conn, order_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Sales order".to_string()))?;

    let status = OrderStatus::parse(&status)
        .ok_or_else(|| AppError::Internal(format!("Unknown order status {}", status)))?;
    let mut latch = MaterialsLatch::from_flag(committed);

    if !latch.permits_commit(status) {
        let reason = if latch.is_committed() {
            SkipReason::AlreadyCommitted
        } else {
            SkipReason::StatusNotConfirmed { status }
        };
        tracing::debug!(order_id, ?reason, "Stock commit skipped");
        return Ok(CommitOutcome::Skipped(reason));
    }

    // Both cache levels are refreshed so the order list stays the sum of its lines
    let requirements = rebuild_order(conn, order_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Sales order".to_string()))?;

    let levels = lock_stock_levels(conn, &lock_order(&requirements)).await?;
    let decrements = plan_decrements(&requirements, &levels).map_err(|e| {
        tracing::warn!(order_id, error = %e, "Stock commit rejected");
        AppError::from(e)
    })?;

    let batch_id = Uuid::new_v4();
    let mut usage = Vec::with_capacity(decrements.len());
    for decrement in &decrements {
        usage.push(decrement_stock(conn, decrement, Some(order_id), batch_id).await?);
    }

    let flipped = sqlx::query(
        r#"
        UPDATE sales_orders
        SET materiais_baixados = TRUE, updated_at = NOW()
        WHERE id = $1 AND materiais_baixados = FALSE
        "#,
    )
    .bind(order_id)
    .execute(&mut *conn)
    .await?;

    if flipped.rows_affected() != 1 || !latch.latch() {
        return Err(AppError::Conflict {
            resource: "sales_order".to_string(),
            message: format!("Materials of order {} were committed concurrently", order_id),
            message_pt: format!("Os materiais do pedido {} já foram baixados", order_id),
        });
    }

    tracing::info!(
        order_id,
        %batch_id,
        materials = decrements.len(),
        "Order materials committed"
    );

    Ok(CommitOutcome::Committed(CommitReceipt {
        pedido_id: order_id,
        batch_id,
        decrements,
        usage,
    }))
}

impl StockCommitService {
    /// Create a new StockCommitService instance
    pub fn new(db: PgPool, config: &StockConfig) -> Self {
        Self {
            db,
            lock_timeout_ms: config.lock_timeout_ms,
        }
    }

    /// Commit an order's materials in a transaction of its own
    pub async fn commit(&self, order_id: i64) -> AppResult<CommitOutcome> {
        let mut tx = self.db.begin().await?;
        let outcome = commit_in(&mut tx, order_id, self.lock_timeout_ms).await?;
        tx.commit().await?;
        Ok(outcome)
    }
}
