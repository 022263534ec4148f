// src/services/stock_service.rs

use rust_decimal::Decimal;
use sqlx::{Acquire, Executor, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::CatalogRepository,
    models::catalog::SellableRef,
};

// ---
// Operações da máquina de estados de estoque
// ---
// current_stock = físico ainda não comprometido; reserved_stock =
// comprometido com layaway não pago. Invariante: reserved <= current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockOp {
    /// Layaway criado: compromete sem tirar da prateleira.
    Reserve,
    /// Venda paga na hora: baixa direta do físico.
    Consume,
    /// Layaway quitado: a reserva vira venda de fato.
    Finalize,
    /// Layaway não pago cancelado: desfaz só a reserva.
    Release,
    /// Cancelamento/reembolso de venda consumada: devolve ao físico.
    Restore,
}

impl StockOp {
    /// Deltas (current, reserved) que a operação aplica.
    pub fn deltas(self, qty: Decimal) -> (Decimal, Decimal) {
        match self {
            StockOp::Reserve => (Decimal::ZERO, qty),
            StockOp::Consume => (-qty, Decimal::ZERO),
            StockOp::Finalize => (-qty, -qty),
            StockOp::Release => (Decimal::ZERO, -qty),
            StockOp::Restore => (qty, Decimal::ZERO),
        }
    }

    /// Reserve e consume disputam o estoque disponível (current - reserved).
    fn checks_availability(self) -> bool {
        matches!(self, StockOp::Reserve | StockOp::Consume)
    }

    /// Finalize e release desfazem reserva, então ela precisa existir.
    fn checks_reservation(self) -> bool {
        matches!(self, StockOp::Finalize | StockOp::Release)
    }

    /// Nas devoluções, um item de catálogo já apagado não é fatal:
    /// pedidos históricos podem referenciar entradas que não existem mais.
    fn tolerates_missing(self) -> bool {
        matches!(self, StockOp::Release | StockOp::Restore)
    }
}

#[derive(Clone)]
pub struct StockService {
    catalog_repo: CatalogRepository,
}

impl StockService {
    pub fn new(catalog_repo: CatalogRepository) -> Self {
        Self { catalog_repo }
    }

    pub async fn reserve<'e, E>(&self, executor: E, tenant_id: Uuid, sellable: SellableRef, qty: Decimal) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres> + Acquire<'e, Database = Postgres>,
    {
        self.apply(executor, tenant_id, sellable, qty, StockOp::Reserve).await
    }

    pub async fn consume<'e, E>(&self, executor: E, tenant_id: Uuid, sellable: SellableRef, qty: Decimal) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres> + Acquire<'e, Database = Postgres>,
    {
        self.apply(executor, tenant_id, sellable, qty, StockOp::Consume).await
    }

    pub async fn finalize<'e, E>(&self, executor: E, tenant_id: Uuid, sellable: SellableRef, qty: Decimal) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres> + Acquire<'e, Database = Postgres>,
    {
        self.apply(executor, tenant_id, sellable, qty, StockOp::Finalize).await
    }

    pub async fn release<'e, E>(&self, executor: E, tenant_id: Uuid, sellable: SellableRef, qty: Decimal) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres> + Acquire<'e, Database = Postgres>,
    {
        self.apply(executor, tenant_id, sellable, qty, StockOp::Release).await
    }

    pub async fn restore<'e, E>(&self, executor: E, tenant_id: Uuid, sellable: SellableRef, qty: Decimal) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres> + Acquire<'e, Database = Postgres>,
    {
        self.apply(executor, tenant_id, sellable, qty, StockOp::Restore).await
    }

    /// Aplica a operação travando a(s) linha(s) primeiro. Para variante,
    /// os mesmos deltas espelham no produto pai, de modo que o agregado
    /// do pai continue sendo a soma das variantes.
    async fn apply<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        sellable: SellableRef,
        qty: Decimal,
        op: StockOp,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres> + Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;
        let (current_delta, reserved_delta) = op.deltas(qty);

        match sellable {
            SellableRef::Product(product_id) => {
                let Some(product) = self
                    .catalog_repo
                    .get_product_for_update(&mut *tx, tenant_id, product_id)
                    .await?
                else {
                    return self.missing(op, sellable, tx).await;
                };

                check_counters(op, &format!("produto {}", product.sku), qty,
                    product.current_stock, product.reserved_stock)?;

                self.catalog_repo
                    .apply_product_delta(&mut *tx, tenant_id, product_id, current_delta, reserved_delta)
                    .await?;
            }
            SellableRef::Variant(variant_id) => {
                let Some(variant) = self
                    .catalog_repo
                    .get_variant_for_update(&mut *tx, tenant_id, variant_id)
                    .await?
                else {
                    return self.missing(op, sellable, tx).await;
                };

                // Trava o pai também, antes de qualquer escrita.
                let parent = self
                    .catalog_repo
                    .get_product_for_update(&mut *tx, tenant_id, variant.product_id)
                    .await?;

                check_counters(op, &format!("variante {}", variant.name), qty,
                    variant.current_stock, variant.reserved_stock)?;

                self.catalog_repo
                    .apply_variant_delta(&mut *tx, tenant_id, variant_id, current_delta, reserved_delta)
                    .await?;

                if let Some(parent) = parent {
                    self.catalog_repo
                        .apply_product_delta(&mut *tx, tenant_id, parent.id, current_delta, reserved_delta)
                        .await?;
                } else {
                    // Pai apagado com variante viva: não pode derrubar a
                    // operação, mas o agregado ficou inconsistente.
                    tracing::warn!(
                        variant_id = %variant_id,
                        "Produto pai da variante não existe mais; espelhamento de estoque pulado"
                    );
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn missing(
        &self,
        op: StockOp,
        sellable: SellableRef,
        tx: sqlx::Transaction<'_, Postgres>,
    ) -> Result<(), AppError> {
        if op.tolerates_missing() {
            tracing::warn!(
                sellable_id = %sellable.id(),
                op = ?op,
                "Item vendável não existe mais no catálogo; devolução de estoque pulada"
            );
            tx.commit().await?;
            Ok(())
        } else {
            Err(AppError::ReferencedEntityMissing(format!(
                "item vendável {}",
                sellable.id()
            )))
        }
    }
}

/// Valida os contadores antes de aplicar os deltas.
fn check_counters(
    op: StockOp,
    label: &str,
    qty: Decimal,
    current: Decimal,
    reserved: Decimal,
) -> Result<(), AppError> {
    if op.checks_availability() && current - reserved < qty {
        return Err(AppError::InsufficientStock(label.to_string()));
    }
    if op.checks_reservation() && reserved < qty {
        return Err(AppError::InsufficientStock(label.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn deltas_por_operacao() {
        let q = dec("2");
        assert_eq!(StockOp::Reserve.deltas(q), (dec("0"), dec("2")));
        assert_eq!(StockOp::Consume.deltas(q), (dec("-2"), dec("0")));
        assert_eq!(StockOp::Finalize.deltas(q), (dec("-2"), dec("-2")));
        assert_eq!(StockOp::Release.deltas(q), (dec("0"), dec("-2")));
        assert_eq!(StockOp::Restore.deltas(q), (dec("2"), dec("0")));
    }

    // Ciclo do layaway sobre contadores puros: reservar 2 de 20 deixa
    // 20/2; quitar deixa 18/0; o caminho alternativo (cancelar sem
    // pagar) volta para 20/0 sem tocar o físico.
    #[test]
    fn ciclo_layaway_fecha_contadores() {
        let (mut current, mut reserved) = (dec("20"), dec("0"));
        let apply = |cur: &mut Decimal, res: &mut Decimal, op: StockOp, q: Decimal| {
            let (dc, dr) = op.deltas(q);
            *cur += dc;
            *res += dr;
        };

        apply(&mut current, &mut reserved, StockOp::Reserve, dec("2"));
        assert_eq!((current, reserved), (dec("20"), dec("2")));

        apply(&mut current, &mut reserved, StockOp::Finalize, dec("2"));
        assert_eq!((current, reserved), (dec("18"), dec("0")));

        // Reembolso do layaway quitado devolve o físico.
        apply(&mut current, &mut reserved, StockOp::Restore, dec("2"));
        assert_eq!((current, reserved), (dec("20"), dec("0")));
    }

    #[test]
    fn reserva_respeita_disponivel() {
        // 5 em estoque, 4 já reservados: só 1 disponível.
        assert!(check_counters(StockOp::Reserve, "p", dec("2"), dec("5"), dec("4")).is_err());
        assert!(check_counters(StockOp::Reserve, "p", dec("1"), dec("5"), dec("4")).is_ok());
        assert!(check_counters(StockOp::Consume, "p", dec("2"), dec("5"), dec("4")).is_err());
    }

    #[test]
    fn finalize_e_release_exigem_reserva_existente() {
        assert!(check_counters(StockOp::Finalize, "p", dec("3"), dec("10"), dec("2")).is_err());
        assert!(check_counters(StockOp::Release, "p", dec("3"), dec("10"), dec("2")).is_err());
        assert!(check_counters(StockOp::Release, "p", dec("2"), dec("10"), dec("2")).is_ok());
    }

    #[test]
    fn restore_nunca_bloqueia() {
        assert!(check_counters(StockOp::Restore, "p", dec("99"), dec("0"), dec("0")).is_ok());
    }
}
