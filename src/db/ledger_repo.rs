// src/db/ledger_repo.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::customers::{BalanceMovement, BalanceMovementKind, Customer},
};

#[derive(Clone)]
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // =========================================================================
    //  CLIENTES
    // =========================================================================

    pub async fn create_customer<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        full_name: &str,
        credit_limit: Decimal,
    ) -> Result<Customer, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customers (tenant_id, full_name, credit_limit)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(full_name)
        .bind(credit_limit)
        .fetch_one(executor)
        .await?;

        Ok(customer)
    }

    pub async fn get_customer<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        customer_id: Uuid,
    ) -> Result<Option<Customer>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let customer = sqlx::query_as::<_, Customer>(
            "SELECT * FROM customers WHERE id = $1 AND tenant_id = $2",
        )
        .bind(customer_id)
        .bind(tenant_id)
        .fetch_optional(executor)
        .await?;

        Ok(customer)
    }

    /// Trava a linha do cliente. Operações concorrentes sobre pedidos
    /// diferentes do mesmo cliente releem o saldo aqui, dentro da própria
    /// transação, antes de mutá-lo — sem isso, um update de saldo se perde.
    pub async fn get_customer_for_update<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        customer_id: Uuid,
    ) -> Result<Option<Customer>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let customer = sqlx::query_as::<_, Customer>(
            "SELECT * FROM customers WHERE id = $1 AND tenant_id = $2 FOR UPDATE",
        )
        .bind(customer_id)
        .bind(tenant_id)
        .fetch_optional(executor)
        .await?;

        Ok(customer)
    }

    /// Único caminho de escrita da coluna balance. Retorna o saldo
    /// resultante para ser gravado no movimento como snapshot.
    pub async fn adjust_balance<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        customer_id: Uuid,
        signed_amount: Decimal,
    ) -> Result<Decimal, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let new_balance: Decimal = sqlx::query_scalar(
            r#"
            UPDATE customers
            SET balance = balance + $1, updated_at = NOW()
            WHERE id = $2 AND tenant_id = $3
            RETURNING balance
            "#,
        )
        .bind(signed_amount)
        .bind(customer_id)
        .bind(tenant_id)
        .fetch_one(executor)
        .await?;

        Ok(new_balance)
    }

    // =========================================================================
    //  MOVIMENTOS
    // =========================================================================

    /// Append-only: movimentos nunca são alterados nem apagados depois
    /// de criados. O created_at vem de fora (MovementClock) para garantir
    /// ordem estritamente crescente dentro de uma mesma operação.
    pub async fn insert_movement<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        customer_id: Uuid,
        order_id: Option<Uuid>,
        kind: BalanceMovementKind,
        amount: Decimal,
        balance_after: Decimal,
        notes: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Result<BalanceMovement, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let movement = sqlx::query_as::<_, BalanceMovement>(
            r#"
            INSERT INTO balance_movements
                (tenant_id, customer_id, order_id, kind, amount, balance_after, notes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(customer_id)
        .bind(order_id)
        .bind(kind)
        .bind(amount)
        .bind(balance_after)
        .bind(notes)
        .bind(created_at)
        .fetch_one(executor)
        .await?;

        Ok(movement)
    }

    pub async fn list_movements<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        customer_id: Uuid,
    ) -> Result<Vec<BalanceMovement>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let movements = sqlx::query_as::<_, BalanceMovement>(
            r#"
            SELECT * FROM balance_movements
            WHERE tenant_id = $1 AND customer_id = $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant_id)
        .bind(customer_id)
        .fetch_all(executor)
        .await?;

        Ok(movements)
    }

    /// Dívida registrada para um pedido: soma dos movimentos CREDIT_SALE
    /// (negativos). Usada no cancelamento para gerar o estorno exato.
    pub async fn order_debt<'e, E>(
        &self,
        executor: E,
        order_id: Uuid,
    ) -> Result<Decimal, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let debt: Option<Decimal> = sqlx::query_scalar(
            r#"
            SELECT SUM(amount) FROM balance_movements
            WHERE order_id = $1 AND kind = 'CREDIT_SALE'
            "#,
        )
        .bind(order_id)
        .fetch_one(executor)
        .await?;

        Ok(debt.unwrap_or(Decimal::ZERO))
    }
}
