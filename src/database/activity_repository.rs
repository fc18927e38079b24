use crate::database::error::DatabaseError;
use crate::database::repository::{
    ActivityScheduler, ActivityTarget, BusinessRecord, BusinessRecordDirectory,
    BusinessRecordKind, FollowUpActivity,
};
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, FromRow)]
struct OwnedRecordRow {
    id: i64,
    name: String,
    owner_user_id: Option<i64>,
}

impl OwnedRecordRow {
    fn into_record(self, kind: BusinessRecordKind) -> BusinessRecord {
        BusinessRecord {
            kind,
            id: self.id,
            name: self.name,
            owner_user_id: self.owner_user_id,
        }
    }
}

/// Owner lookup over `sale_orders` / `invoices` and task insert into
/// `follow_up_activities`.
pub struct ActivityRepository {
    pool: PgPool,
}

impl ActivityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BusinessRecordDirectory for ActivityRepository {
    async fn find_order(&self, name: &str) -> Result<Option<BusinessRecord>, DatabaseError> {
        let row = sqlx::query_as::<_, OwnedRecordRow>(
            "SELECT id, name, owner_user_id FROM sale_orders WHERE name = $1 LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(row.map(|r| r.into_record(BusinessRecordKind::SaleOrder)))
    }

    async fn find_invoice(&self, name: &str) -> Result<Option<BusinessRecord>, DatabaseError> {
        let row = sqlx::query_as::<_, OwnedRecordRow>(
            "SELECT id, name, owner_user_id FROM invoices WHERE name = $1 LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(row.map(|r| r.into_record(BusinessRecordKind::Invoice)))
    }
}

#[async_trait]
impl ActivityScheduler for ActivityRepository {
    async fn schedule(&self, activity: &FollowUpActivity) -> Result<(), DatabaseError> {
        let (sale_order_id, invoice_id, transaction_id): (Option<i64>, Option<i64>, Option<Uuid>) =
            match activity.target {
                ActivityTarget::SaleOrder(id) => (Some(id), None, None),
                ActivityTarget::Invoice(id) => (None, Some(id), None),
                ActivityTarget::Transaction(id) => (None, None, Some(id)),
            };

        sqlx::query(
            "INSERT INTO follow_up_activities
             (sale_order_id, invoice_id, transaction_id, assignee_user_id, summary, note)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(sale_order_id)
        .bind(invoice_id)
        .bind(transaction_id)
        .bind(activity.assignee_user_id)
        .bind(&activity.summary)
        .bind(&activity.note)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(())
    }
}
