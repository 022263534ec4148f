// src/models/catalog.rs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use chrono::{DateTime, Utc};
use uuid::Uuid;

// --- Enums ---

// Mapeia o CREATE TYPE sellable_kind do banco.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "sellable_kind", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SellableKind {
    Product,
    Variant,
}

// Referência polimórfica de item vendável: um produto ou uma variante.
// Sum type de propósito — o compilador nos obriga a tratar os dois casos
// em toda operação de estoque, inclusive o espelhamento no produto pai.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SellableRef {
    Product(Uuid),
    Variant(Uuid),
}

impl SellableRef {
    pub fn new(kind: SellableKind, id: Uuid) -> Self {
        match kind {
            SellableKind::Product => SellableRef::Product(id),
            SellableKind::Variant => SellableRef::Variant(id),
        }
    }

    pub fn kind(&self) -> SellableKind {
        match self {
            SellableRef::Product(_) => SellableKind::Product,
            SellableRef::Variant(_) => SellableKind::Variant,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            SellableRef::Product(id) | SellableRef::Variant(id) => *id,
        }
    }
}

// --- Structs ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub sku: String,
    pub name: String,
    pub price: Decimal,

    // Estoque físico ainda não comprometido.
    pub current_stock: Decimal,
    // Comprometido com layaway não pago, mas ainda na prateleira.
    pub reserved_stock: Decimal,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProductVariant {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub price_override: Option<Decimal>,

    pub current_stock: Decimal,
    pub reserved_stock: Decimal,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sellable_ref_roundtrip_preserva_kind_e_id() {
        let id = Uuid::new_v4();
        let as_product = SellableRef::new(SellableKind::Product, id);
        let as_variant = SellableRef::new(SellableKind::Variant, id);

        assert_eq!(as_product.kind(), SellableKind::Product);
        assert_eq!(as_variant.kind(), SellableKind::Variant);
        assert_eq!(as_product.id(), id);
        assert_eq!(as_variant.id(), id);
        assert_ne!(as_product, as_variant);
    }
}
