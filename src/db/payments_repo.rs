// src/db/payments_repo.rs

use rust_decimal::Decimal;
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::payments::{Payment, PaymentMethod},
};

#[derive(Clone)]
pub struct PaymentsRepository {
    pool: PgPool,
}

impl PaymentsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn insert_payment<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        order_id: Uuid,
        session_id: Option<Uuid>,
        bank_account_id: Option<Uuid>,
        method: PaymentMethod,
        amount: Decimal,
        notes: Option<&str>,
    ) -> Result<Payment, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (tenant_id, order_id, session_id, bank_account_id, method, amount, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(order_id)
        .bind(session_id)
        .bind(bank_account_id)
        .bind(method)
        .bind(amount)
        .bind(notes)
        .fetch_one(executor)
        .await?;

        Ok(payment)
    }

    pub async fn list_payments<'e, E>(
        &self,
        executor: E,
        order_id: Uuid,
    ) -> Result<Vec<Payment>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE order_id = $1 ORDER BY created_at",
        )
        .bind(order_id)
        .fetch_all(executor)
        .await?;

        Ok(payments)
    }
}
