// src/services/payment_service.rs

use sqlx::{Acquire, Executor, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{FinanceRepository, PaymentsRepository},
    models::payments::{Payment, PaymentEntry, PaymentMethod},
};

#[derive(Clone)]
pub struct PaymentService {
    payments_repo: PaymentsRepository,
    finance_repo: FinanceRepository,
}

impl PaymentService {
    pub fn new(payments_repo: PaymentsRepository, finance_repo: FinanceRepository) -> Self {
        Self {
            payments_repo,
            finance_repo,
        }
    }

    /// Registra linhas de pagamento contra um pedido.
    ///
    /// Pré-condição: se veio um session_id, a sessão de caixa precisa
    /// estar aberta. Para cada linha, o INSERT do pagamento precede o
    /// crédito na conta bancária (rastreabilidade). Não mexe no status
    /// do pedido — "dinheiro recebido" e "pedido quitado" são decisões
    /// separadas, e a segunda é do chamador.
    pub async fn record<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        order_id: Uuid,
        session_id: Option<Uuid>,
        lines: &[PaymentEntry],
    ) -> Result<Vec<Payment>, AppError>
    where
        E: Executor<'e, Database = Postgres> + Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;

        if let Some(sid) = session_id {
            let session = self
                .finance_repo
                .get_session(&mut *tx, tenant_id, sid)
                .await?;
            match session {
                Some(s) if s.is_open() => {}
                _ => return Err(AppError::SessionNotOpen(sid)),
            }
        }

        let mut recorded = Vec::with_capacity(lines.len());

        for line in lines {
            let payment = self
                .payments_repo
                .insert_payment(
                    &mut *tx,
                    tenant_id,
                    order_id,
                    session_id,
                    line.bank_account_id,
                    line.method,
                    line.amount,
                    line.notes.as_deref(),
                )
                .await?;

            // Cartão e transferência caem na conta bancária informada.
            if matches!(line.method, PaymentMethod::Card | PaymentMethod::Transfer) {
                if let Some(account_id) = line.bank_account_id {
                    self.finance_repo
                        .credit_bank_account(&mut *tx, tenant_id, account_id, line.amount)
                        .await?;
                }
            }

            recorded.push(payment);
        }

        tx.commit().await?;
        Ok(recorded)
    }
}
