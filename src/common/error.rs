use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::models::orders::OrderStatus;

// Nosso tipo de erro, com `thiserror` para melhor ergonomia.
// Toda variante daqui aborta a operação inteira no limite da transação:
// o chamador nunca enxerga um pagamento ou estoque aplicado pela metade.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    // Pagamento recebido com sessão de caixa fechada (ou inexistente).
    #[error("A sessão de caixa {0} não está aberta")]
    SessionNotOpen(Uuid),

    // A dívida residual de uma venda a prazo estoura o limite do cliente.
    #[error("Crédito insuficiente: restam {missing} a pagar e o crédito disponível é {available}")]
    InsufficientCredit { missing: Decimal, available: Decimal },

    // O valor ofertado excede o que resta a pagar (fluxo de pagamento avulso).
    #[error("Pagamento excede o saldo devedor: ofertado {offered}, restante {remaining}")]
    Overpayment { offered: Decimal, remaining: Decimal },

    #[error("O pedido {0} já está quitado")]
    AlreadySettled(Uuid),

    #[error("Transição de status inválida: {from:?} -> {to:?}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    // Um item vendável referenciado não existe mais no catálogo.
    // Fatal na criação de venda; na devolução de estoque vira skip + log.
    #[error("Entidade referenciada não existe: {0}")]
    ReferencedEntityMissing(String),

    #[error("Estoque insuficiente para {0}")]
    InsufficientStock(String),

    // Variante para erros de banco de dados (sqlx)
    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    // Variante genérica para qualquer outro erro inesperado.
    // `anyhow::Error` é ótimo para capturar o contexto do erro.
    #[error("Erro interno")]
    InternalServerError(#[from] anyhow::Error),
}
