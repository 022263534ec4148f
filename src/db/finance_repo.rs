// src/db/finance_repo.rs

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::finance::{BankAccount, Branch, RegisterSession},
};

#[derive(Clone)]
pub struct FinanceRepository {
    pool: PgPool,
}

impl FinanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // =========================================================================
    //  FILIAIS
    // =========================================================================

    pub async fn create_branch<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        name: &str,
    ) -> Result<Branch, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let branch = sqlx::query_as::<_, Branch>(
            "INSERT INTO branches (tenant_id, name) VALUES ($1, $2) RETURNING *",
        )
        .bind(tenant_id)
        .bind(name)
        .fetch_one(executor)
        .await?;

        Ok(branch)
    }

    // =========================================================================
    //  CONTAS BANCÁRIAS
    // =========================================================================

    pub async fn create_bank_account<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        name: &str,
    ) -> Result<BankAccount, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let account = sqlx::query_as::<_, BankAccount>(
            "INSERT INTO bank_accounts (tenant_id, name) VALUES ($1, $2) RETURNING *",
        )
        .bind(tenant_id)
        .bind(name)
        .fetch_one(executor)
        .await?;

        Ok(account)
    }

    pub async fn get_bank_account<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        account_id: Uuid,
    ) -> Result<Option<BankAccount>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let account = sqlx::query_as::<_, BankAccount>(
            "SELECT * FROM bank_accounts WHERE id = $1 AND tenant_id = $2",
        )
        .bind(account_id)
        .bind(tenant_id)
        .fetch_optional(executor)
        .await?;

        Ok(account)
    }

    /// Credita um pagamento concluído (cartão/transferência) na conta.
    pub async fn credit_bank_account<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        account_id: Uuid,
        amount: Decimal,
    ) -> Result<Decimal, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let new_balance: Decimal = sqlx::query_scalar(
            r#"
            UPDATE bank_accounts
            SET balance = balance + $1
            WHERE id = $2 AND tenant_id = $3
            RETURNING balance
            "#,
        )
        .bind(amount)
        .bind(account_id)
        .bind(tenant_id)
        .fetch_one(executor)
        .await?;

        Ok(new_balance)
    }

    // =========================================================================
    //  SESSÕES DE CAIXA
    // =========================================================================

    pub async fn open_session<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        branch_id: Uuid,
    ) -> Result<RegisterSession, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let session = sqlx::query_as::<_, RegisterSession>(
            "INSERT INTO register_sessions (tenant_id, branch_id) VALUES ($1, $2) RETURNING *",
        )
        .bind(tenant_id)
        .bind(branch_id)
        .fetch_one(executor)
        .await?;

        Ok(session)
    }

    pub async fn close_session<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        session_id: Uuid,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            "UPDATE register_sessions SET closed_at = $1 WHERE id = $2 AND tenant_id = $3 AND closed_at IS NULL",
        )
        .bind(Utc::now())
        .bind(session_id)
        .bind(tenant_id)
        .execute(executor)
        .await?;

        Ok(())
    }

    pub async fn get_session<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        session_id: Uuid,
    ) -> Result<Option<RegisterSession>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let session = sqlx::query_as::<_, RegisterSession>(
            "SELECT * FROM register_sessions WHERE id = $1 AND tenant_id = $2",
        )
        .bind(session_id)
        .bind(tenant_id)
        .fetch_optional(executor)
        .await?;

        Ok(session)
    }
}
