// src/models/customers.rs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use chrono::{DateTime, Utc};
use uuid::Uuid;

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "balance_movement_kind", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BalanceMovementKind {
    // Dinheiro recebido do cliente (abate dívida ou vira crédito).
    Payment,
    // Crédito do cliente consumido como forma de pagamento.
    CreditUsed,
    // Dívida assumida numa venda a prazo.
    CreditSale,
    // Ajuste manual ou movimento de estorno (cancelamento, reembolso).
    Adjustment,
}

// --- Structs ---

// O saldo é estado global mutável por natureza — por isso a coluna
// `balance` só tem um caminho de escrita: o Ledger. Nenhum outro
// componente pode alterá-la diretamente.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub full_name: String,

    // Positivo: crédito do cliente. Negativo: dívida.
    pub balance: Decimal,
    // Quanto de saldo negativo toleramos sem confirmação extra.
    pub credit_limit: Decimal,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Crédito ainda disponível para vendas a prazo: o limite menos a
    /// dívida já acumulada. Crédito positivo não aumenta o limite — se
    /// existir, já foi consumido como pagamento antes de chegarmos aqui.
    pub fn available_credit(&self) -> Decimal {
        self.credit_limit + self.balance.min(Decimal::ZERO)
    }
}

// Movimento imutável e append-only. `balance_after` guarda o saldo
// resultante; reaplicar todos os movimentos na ordem de criação tem que
// reproduzir `customers.balance` exatamente.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BalanceMovement {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub customer_id: Uuid,
    pub order_id: Option<Uuid>,
    pub kind: BalanceMovementKind,
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn customer(balance: &str, limit: &str) -> Customer {
        Customer {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            full_name: "Cliente Teste".into(),
            balance: Decimal::from_str(balance).unwrap(),
            credit_limit: Decimal::from_str(limit).unwrap(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn credito_disponivel_desconta_divida_existente() {
        // Sem dívida: o limite inteiro está disponível.
        assert_eq!(
            customer("0", "500").available_credit(),
            Decimal::from_str("500").unwrap()
        );
        // Dívida de 200 consome parte do limite.
        assert_eq!(
            customer("-200", "500").available_credit(),
            Decimal::from_str("300").unwrap()
        );
        // Crédito positivo não infla o limite.
        assert_eq!(
            customer("150", "500").available_credit(),
            Decimal::from_str("500").unwrap()
        );
    }
}
