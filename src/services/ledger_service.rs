// src/services/ledger_service.rs

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::{Acquire, Executor, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::LedgerRepository,
    models::customers::{BalanceMovement, BalanceMovementKind, Customer},
};

// ---
// Relógio de movimentos
// ---
// Quando uma mesma operação lógica grava vários movimentos para o mesmo
// cliente, cada um precisa de um timestamp estritamente maior que o
// anterior (nem que seja por um segundo). Sem isso, o replay cronológico
// do ledger e as auditorias FIFO ficam ambíguos.
#[derive(Debug)]
pub struct MovementClock {
    next: DateTime<Utc>,
}

impl MovementClock {
    pub fn new() -> Self {
        Self { next: Utc::now() }
    }

    pub fn tick(&mut self) -> DateTime<Utc> {
        let at = self.next;
        self.next = at + Duration::seconds(1);
        at
    }
}

impl Default for MovementClock {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct LedgerService {
    repo: LedgerRepository,
}

impl LedgerService {
    pub fn new(repo: LedgerRepository) -> Self {
        Self { repo }
    }

    /// Registra um movimento de saldo: atualiza `customers.balance` pelo
    /// valor com sinal e insere a linha do movimento carregando o saldo
    /// *pós*-atualização. Atômico via savepoint.
    ///
    /// Nunca rejeita saldo arbitrariamente negativo — limite de crédito
    /// é regra do orquestrador, não do ledger.
    pub async fn record<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        customer_id: Uuid,
        order_id: Option<Uuid>,
        kind: BalanceMovementKind,
        signed_amount: Decimal,
        at: DateTime<Utc>,
        notes: Option<&str>,
    ) -> Result<BalanceMovement, AppError>
    where
        E: Executor<'e, Database = Postgres> + Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;

        let balance_after = self
            .repo
            .adjust_balance(&mut *tx, tenant_id, customer_id, signed_amount)
            .await?;

        let movement = self
            .repo
            .insert_movement(
                &mut *tx,
                tenant_id,
                customer_id,
                order_id,
                kind,
                signed_amount,
                balance_after,
                notes,
                at,
            )
            .await?;

        tx.commit().await?;
        Ok(movement)
    }

    /// Busca o cliente com lock de linha (FOR UPDATE). Toda operação que
    /// vai mexer no saldo começa por aqui.
    pub async fn customer_for_update<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        customer_id: Uuid,
    ) -> Result<Option<Customer>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        self.repo
            .get_customer_for_update(executor, tenant_id, customer_id)
            .await
    }

    /// Dívida registrada (movimentos CREDIT_SALE) contra um pedido.
    /// Sempre <= 0; zero quando o pedido nunca gerou dívida.
    pub async fn order_debt<'e, E>(
        &self,
        executor: E,
        order_id: Uuid,
    ) -> Result<Decimal, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        self.repo.order_debt(executor, order_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relogio_gera_timestamps_estritamente_crescentes() {
        let mut clock = MovementClock::new();
        let a = clock.tick();
        let b = clock.tick();
        let c = clock.tick();

        assert!(b > a);
        assert!(c > b);
        assert_eq!((b - a).num_seconds(), 1);
        assert_eq!((c - b).num_seconds(), 1);
    }
}
