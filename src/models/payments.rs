// src/models/payments.rs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::{Validate, ValidationError};

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_method", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Card,
    Transfer,
    // Pagamento com o saldo de crédito do próprio cliente.
    Balance,
}

// --- Structs ---

// Pagamento concluído. Não existe coluna de status: tentativas que falham
// são rejeitadas antes do INSERT, nunca gravadas.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub order_id: Uuid,
    pub session_id: Option<Uuid>,
    pub bank_account_id: Option<Uuid>,
    pub method: PaymentMethod,
    pub amount: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---
// Validação Customizada
// ---
pub fn validate_positive(val: &Decimal) -> Result<(), ValidationError> {
    if val.is_sign_negative() || val.is_zero() {
        let mut err = ValidationError::new("range");
        err.message = Some("O valor do pagamento deve ser positivo.".into());
        return Err(err);
    }
    Ok(())
}

// Uma linha de pagamento ofertada pelo chamador (dinheiro, cartão, etc).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEntry {
    #[validate(custom(function = validate_positive))]
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub bank_account_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn entry(amount: &str) -> PaymentEntry {
        PaymentEntry {
            amount: Decimal::from_str(amount).unwrap(),
            method: PaymentMethod::Cash,
            bank_account_id: None,
            notes: None,
        }
    }

    #[test]
    fn rejeita_valor_zero_ou_negativo() {
        assert!(entry("0").validate().is_err());
        assert!(entry("-10").validate().is_err());
        assert!(entry("0.01").validate().is_ok());
    }
}
