// src/models/orders.rs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::catalog::{SellableKind, SellableRef};

// --- Enums ---

// Ciclo de vida do pedido. O estado inicial é escolhido na criação
// (ON_LAYAWAY para venda programada, PENDING para o resto) e as
// transições legais estão centralizadas em `can_transition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    OnLayaway,
    Completed,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// Tabela exaustiva de transições do pedido. Tudo que não está aqui
    /// é InvalidStatusTransition — os efeitos colaterais (finalize de
    /// estoque, estornos no ledger) ficam por conta do orquestrador.
    pub fn can_transition(self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, to) {
            (Pending | OnLayaway, Completed) => true,
            // Cancelamento cobre também o layaway ainda não pago.
            (Pending | OnLayaway | Completed, Cancelled) => true,
            (Completed, Refunded) => true,
            _ => false,
        }
    }

    /// Pedido ainda em aberto para fins de alocação FIFO de depósitos.
    pub fn is_open(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::OnLayaway)
    }
}

// --- Structs ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub branch_id: Uuid,
    pub customer_id: Option<Uuid>,

    // Sequência monotônica atribuída pelo banco na criação.
    // É ela que ordena a alocação FIFO — nunca o relógio de parede,
    // que pode empatar dentro da mesma resolução de timestamp.
    pub display_id: i64,

    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub notes: Option<String>,

    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub order_id: Uuid,

    pub sellable_kind: SellableKind,
    pub sellable_id: Uuid,

    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn sellable(&self) -> SellableRef {
        SellableRef::new(self.sellable_kind, self.sellable_id)
    }
}

#[cfg(test)]
mod tests {
    use super::OrderStatus::*;
    use super::*;

    #[test]
    fn transicoes_legais() {
        assert!(Pending.can_transition(Completed));
        assert!(OnLayaway.can_transition(Completed));
        assert!(Pending.can_transition(Cancelled));
        assert!(OnLayaway.can_transition(Cancelled));
        assert!(Completed.can_transition(Cancelled));
        assert!(Completed.can_transition(Refunded));
    }

    #[test]
    fn transicoes_ilegais() {
        assert!(!Pending.can_transition(Refunded));
        assert!(!OnLayaway.can_transition(Refunded));
        assert!(!Cancelled.can_transition(Completed));
        assert!(!Cancelled.can_transition(Cancelled));
        assert!(!Refunded.can_transition(Completed));
        assert!(!Refunded.can_transition(Cancelled));
        assert!(!Completed.can_transition(Pending));
        assert!(!Completed.can_transition(OnLayaway));
        assert!(!Pending.can_transition(OnLayaway));
        assert!(!OnLayaway.can_transition(Pending));
    }

    #[test]
    fn status_serializa_em_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&OnLayaway).unwrap(),
            "\"ON_LAYAWAY\""
        );
        let parsed: OrderStatus = serde_json::from_str("\"REFUNDED\"").unwrap();
        assert_eq!(parsed, Refunded);
    }

    #[test]
    fn apenas_pending_e_layaway_sao_abertos() {
        assert!(Pending.is_open());
        assert!(OnLayaway.is_open());
        assert!(!Completed.is_open());
        assert!(!Cancelled.is_open());
        assert!(!Refunded.is_open());
    }
}
