// src/services/checkout_service.rs
//
// O orquestrador de alocação de pagamentos: os casos de uso de topo
// (nova venda, pagamento de pedido, depósito genérico com FIFO) e as
// reversões (cancelamento, reembolso). Cada operação roda inteira
// dentro de uma única transação: ou commita tudo, ou nada.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{Acquire, Executor, PgConnection, Postgres};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    common::error::AppError,
    db::OrdersRepository,
    models::catalog::{SellableKind, SellableRef},
    models::customers::BalanceMovementKind,
    models::orders::{Order, OrderStatus},
    models::payments::{validate_positive, PaymentEntry, PaymentMethod},
    services::ledger_service::{LedgerService, MovementClock},
    services::payment_service::PaymentService,
    services::stock_service::StockService,
};

// ---
// Validação Customizada
// ---
fn validate_not_negative(val: &Decimal) -> Result<(), ValidationError> {
    if val.is_sign_negative() {
        let mut err = ValidationError::new("range");
        err.message = Some("O valor não pode ser negativo.".into());
        return Err(err);
    }
    Ok(())
}

// ---
// Payloads
// ---

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewSaleItem {
    pub sellable_kind: SellableKind,
    pub sellable_id: Uuid,

    #[validate(custom(function = validate_positive))]
    pub quantity: Decimal,

    // Preço zero é permitido (brinde); negativo não.
    #[validate(custom(function = validate_not_negative))]
    pub unit_price: Decimal,
}

impl NewSaleItem {
    pub fn sellable(&self) -> SellableRef {
        SellableRef::new(self.sellable_kind, self.sellable_id)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewSaleInput {
    pub branch_id: Uuid,
    pub customer_id: Option<Uuid>,

    // Venda programada: reserva estoque em vez de consumir.
    #[serde(default)]
    pub layaway: bool,

    // O cliente quer abater o total com o crédito que tem em saldo.
    #[serde(default)]
    pub use_customer_credit: bool,

    pub session_id: Option<Uuid>,

    #[validate(length(min = 1, message = "A venda precisa de ao menos um item."), nested)]
    pub items: Vec<NewSaleItem>,

    #[validate(nested)]
    pub payments: Vec<PaymentEntry>,

    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PayOrderInput {
    #[serde(default)]
    pub use_customer_credit: bool,

    pub session_id: Option<Uuid>,

    #[validate(nested)]
    pub payments: Vec<PaymentEntry>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DepositInput {
    // Filial que ancora o pedido sintético de sobra de crédito.
    pub branch_id: Uuid,

    pub session_id: Option<Uuid>,

    #[validate(length(min = 1, message = "O depósito precisa de ao menos um pagamento."), nested)]
    pub payments: Vec<PaymentEntry>,
}

// ---
// Resultado do depósito
// ---

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositAllocation {
    pub order_id: Uuid,
    pub amount: Decimal,
    pub settled: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositOutcome {
    pub allocations: Vec<DepositAllocation>,
    // Sobra que virou crédito puro no saldo do cliente.
    pub credited_to_balance: Decimal,
}

// ---
// Lógica pura de alocação
// ---

/// Trunca as linhas ofertadas ao que ainda falta pagar, descartando o
/// excedente sem erro. Política deliberada do fluxo de NOVA venda; o
/// fluxo de pagamento avulso rejeita excedente em vez de truncar, e os
/// dois caminhos ficam separados de propósito — unificá-los esconderia
/// bugs reais de overpayment no segundo.
fn cap_entries(entries: &[PaymentEntry], mut remaining: Decimal) -> Vec<PaymentEntry> {
    let mut out = Vec::new();
    for entry in entries {
        if remaining <= Decimal::ZERO {
            break;
        }
        let applied = entry.amount.min(remaining);
        if applied <= Decimal::ZERO {
            continue;
        }
        remaining -= applied;
        out.push(PaymentEntry {
            amount: applied,
            method: entry.method,
            bank_account_id: entry.bank_account_id,
            notes: entry.notes.clone(),
        });
    }
    out
}

/// Decide o destino de um pagamento avulso antes de qualquer escrita:
/// pedido já quitado vira `AlreadySettled`, excedente além da tolerância
/// vira `Overpayment`, senão retorna o restante a pagar.
fn check_outstanding(
    order_id: Uuid,
    total: Decimal,
    already_paid: Decimal,
    balance_used: Decimal,
    direct_offered: Decimal,
    tolerance: Decimal,
) -> Result<Decimal, AppError> {
    let remaining = total - already_paid;
    if remaining <= tolerance {
        return Err(AppError::AlreadySettled(order_id));
    }
    if balance_used + direct_offered > remaining + tolerance {
        return Err(AppError::Overpayment {
            offered: balance_used + direct_offered,
            remaining,
        });
    }
    Ok(remaining)
}

/// Distribui um valor ofertado sobre as dívidas em aberto, da mais
/// antiga para a mais nova. Muta `dues` (o que cada pedido ainda deve)
/// e retorna os pares (índice, valor aplicado) mais a sobra.
fn allocate_fifo(
    offered: Decimal,
    dues: &mut [Decimal],
    tolerance: Decimal,
) -> (Vec<(usize, Decimal)>, Decimal) {
    let mut left = offered;
    let mut allocations = Vec::new();

    for (idx, due) in dues.iter_mut().enumerate() {
        if left <= Decimal::ZERO {
            break;
        }
        if *due <= tolerance {
            continue;
        }
        let applied = left.min(*due);
        *due -= applied;
        left -= applied;
        allocations.push((idx, applied));
    }

    (allocations, left)
}

// ---
// Serviço
// ---

#[derive(Clone)]
pub struct CheckoutService {
    orders_repo: OrdersRepository,
    payments: PaymentService,
    ledger: LedgerService,
    stock: StockService,
    // Tolerância de arredondamento para considerar um pedido quitado.
    tolerance: Decimal,
}

impl CheckoutService {
    pub fn new(
        orders_repo: OrdersRepository,
        payments: PaymentService,
        ledger: LedgerService,
        stock: StockService,
        tolerance: Decimal,
    ) -> Self {
        Self {
            orders_repo,
            payments,
            ledger,
            stock,
            tolerance,
        }
    }

    // =========================================================================
    //  a) NOVA VENDA
    // =========================================================================

    pub async fn create_sale<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        input: NewSaleInput,
    ) -> Result<Order, AppError>
    where
        E: Executor<'e, Database = Postgres> + Acquire<'e, Database = Postgres>,
    {
        input.validate()?;

        let mut tx = executor.begin().await?;
        let mut clock = MovementClock::new();

        let initial_status = if input.layaway {
            OrderStatus::OnLayaway
        } else {
            OrderStatus::Pending
        };

        // O total é fixado aqui, a partir dos itens, e não muda mais.
        let total: Decimal = input
            .items
            .iter()
            .map(|item| item.quantity * item.unit_price)
            .sum();

        // Lock no cliente antes de qualquer linha de estoque: a ordem de
        // travamento é sempre cliente -> estoque/pedido em todos os fluxos.
        let customer = match input.customer_id {
            Some(cid) => Some(
                self.ledger
                    .customer_for_update(&mut *tx, tenant_id, cid)
                    .await?
                    .ok_or_else(|| AppError::ReferencedEntityMissing(format!("cliente {}", cid)))?,
            ),
            None => None,
        };

        let order = self
            .orders_repo
            .create_order(
                &mut *tx,
                tenant_id,
                input.branch_id,
                input.customer_id,
                initial_status,
                total,
                input.notes.as_deref(),
                None,
            )
            .await?;

        // Itens + comprometimento de estoque. Item sumido do catálogo é
        // fatal aqui (diferente da devolução, que pula e loga).
        for item in &input.items {
            let sellable = item.sellable();
            self.orders_repo
                .add_order_item(&mut *tx, tenant_id, order.id, sellable, item.quantity, item.unit_price)
                .await?;

            if input.layaway {
                self.stock
                    .reserve(&mut *tx, tenant_id, sellable, item.quantity)
                    .await?;
            } else {
                self.stock
                    .consume(&mut *tx, tenant_id, sellable, item.quantity)
                    .await?;
            }
        }

        let mut paid = Decimal::ZERO;

        // 1. Crédito em saldo como forma de pagamento.
        if input.use_customer_credit {
            if let Some(c) = &customer {
                if c.balance > Decimal::ZERO {
                    let used = c.balance.min(total);
                    let line = PaymentEntry {
                        amount: used,
                        method: PaymentMethod::Balance,
                        bank_account_id: None,
                        notes: None,
                    };
                    self.payments
                        .record(&mut *tx, tenant_id, order.id, input.session_id, &[line])
                        .await?;
                    self.ledger
                        .record(
                            &mut *tx,
                            tenant_id,
                            c.id,
                            Some(order.id),
                            BalanceMovementKind::CreditUsed,
                            -used,
                            clock.tick(),
                            Some("Crédito em saldo usado na venda"),
                        )
                        .await?;
                    paid += used;
                }
            }
        }

        // 2. Pagamentos diretos, truncados ao restante (sem erro).
        let capped = cap_entries(&input.payments, total - paid);
        if !capped.is_empty() {
            self.payments
                .record(&mut *tx, tenant_id, order.id, input.session_id, &capped)
                .await?;
            paid += capped.iter().map(|e| e.amount).sum::<Decimal>();
        }

        // 3. O que sobrou vira dívida — se o limite do cliente aguentar.
        let remaining = total - paid;
        if remaining > self.tolerance {
            let Some(c) = &customer else {
                return Err(AppError::InsufficientCredit {
                    missing: remaining,
                    available: Decimal::ZERO,
                });
            };
            let available = c.available_credit();
            if remaining > available + self.tolerance {
                return Err(AppError::InsufficientCredit {
                    missing: remaining,
                    available,
                });
            }
            self.ledger
                .record(
                    &mut *tx,
                    tenant_id,
                    c.id,
                    Some(order.id),
                    BalanceMovementKind::CreditSale,
                    -remaining,
                    clock.tick(),
                    Some("Dívida assumida na venda a prazo"),
                )
                .await?;
            // O status permanece o inicial (PENDING ou ON_LAYAWAY).
        } else {
            self.complete_order(&mut tx, tenant_id, &order).await?;
        }

        let order = self.reload_order(&mut tx, tenant_id, order.id).await?;
        tx.commit().await?;
        Ok(order)
    }

    // =========================================================================
    //  b) PAGAMENTO DE PEDIDO EXISTENTE
    // =========================================================================

    pub async fn pay_order<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        order_id: Uuid,
        input: PayOrderInput,
    ) -> Result<Order, AppError>
    where
        E: Executor<'e, Database = Postgres> + Acquire<'e, Database = Postgres>,
    {
        input.validate()?;

        let mut tx = executor.begin().await?;
        let mut clock = MovementClock::new();

        // Leitura sem lock só para descobrir o cliente: a ordem de
        // travamento é sempre cliente -> pedido, a mesma do depósito.
        // O customer_id de um pedido nunca muda depois de criado.
        let preview = self
            .orders_repo
            .get_order(&mut *tx, tenant_id, order_id)
            .await?
            .ok_or_else(|| AppError::ReferencedEntityMissing(format!("pedido {}", order_id)))?;

        let customer = match preview.customer_id {
            Some(cid) => self.ledger.customer_for_update(&mut *tx, tenant_id, cid).await?,
            None => None,
        };

        // Lock no pedido: serializa pagamentos concorrentes contra ele.
        let order = self
            .orders_repo
            .get_order_for_update(&mut *tx, tenant_id, order_id)
            .await?
            .ok_or_else(|| AppError::ReferencedEntityMissing(format!("pedido {}", order_id)))?;

        match order.status {
            OrderStatus::Completed => return Err(AppError::AlreadySettled(order.id)),
            OrderStatus::Cancelled | OrderStatus::Refunded => {
                return Err(AppError::InvalidStatusTransition {
                    from: order.status,
                    to: OrderStatus::Completed,
                })
            }
            OrderStatus::Pending | OrderStatus::OnLayaway => {}
        }

        let already_paid = self.orders_repo.total_paid(&mut *tx, order.id).await?;

        let balance_used = if input.use_customer_credit {
            let due = (order.total_amount - already_paid).max(Decimal::ZERO);
            customer
                .as_ref()
                .map(|c| c.balance.max(Decimal::ZERO).min(due))
                .unwrap_or(Decimal::ZERO)
        } else {
            Decimal::ZERO
        };

        // Aqui excedente é ERRO, não truncamento — ver cap_entries.
        let direct_offered: Decimal = input.payments.iter().map(|e| e.amount).sum();
        let remaining = check_outstanding(
            order.id,
            order.total_amount,
            already_paid,
            balance_used,
            direct_offered,
            self.tolerance,
        )?;

        if balance_used > Decimal::ZERO {
            if let Some(c) = &customer {
                let line = PaymentEntry {
                    amount: balance_used,
                    method: PaymentMethod::Balance,
                    bank_account_id: None,
                    notes: None,
                };
                self.payments
                    .record(&mut *tx, tenant_id, order.id, input.session_id, &[line])
                    .await?;
                self.ledger
                    .record(
                        &mut *tx,
                        tenant_id,
                        c.id,
                        Some(order.id),
                        BalanceMovementKind::CreditUsed,
                        -balance_used,
                        clock.tick(),
                        Some("Crédito em saldo usado no pagamento"),
                    )
                    .await?;
            }
        }

        // O capping aqui só apara o ruído <= tolerância que passou acima.
        let capped = cap_entries(&input.payments, remaining - balance_used);
        let direct_total: Decimal = capped.iter().map(|e| e.amount).sum();
        if !capped.is_empty() {
            self.payments
                .record(&mut *tx, tenant_id, order.id, input.session_id, &capped)
                .await?;
        }

        // Dinheiro recebido abate a dívida registrada na criação do
        // pedido — sinal oposto ao movimento de CREDIT_SALE.
        if let Some(c) = &customer {
            if direct_total > Decimal::ZERO {
                self.ledger
                    .record(
                        &mut *tx,
                        tenant_id,
                        c.id,
                        Some(order.id),
                        BalanceMovementKind::Payment,
                        direct_total,
                        clock.tick(),
                        Some("Pagamento recebido"),
                    )
                    .await?;
            }
        }

        if already_paid + balance_used + direct_total >= order.total_amount - self.tolerance {
            self.complete_order(&mut tx, tenant_id, &order).await?;
        }

        let order = self.reload_order(&mut tx, tenant_id, order.id).await?;
        tx.commit().await?;
        Ok(order)
    }

    // =========================================================================
    //  c) DEPÓSITO GENÉRICO DO CLIENTE (alocação FIFO)
    // =========================================================================

    pub async fn apply_deposit<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        customer_id: Uuid,
        input: DepositInput,
    ) -> Result<DepositOutcome, AppError>
    where
        E: Executor<'e, Database = Postgres> + Acquire<'e, Database = Postgres>,
    {
        input.validate()?;

        let mut tx = executor.begin().await?;
        let mut clock = MovementClock::new();

        self.ledger
            .customer_for_update(&mut *tx, tenant_id, customer_id)
            .await?
            .ok_or_else(|| AppError::ReferencedEntityMissing(format!("cliente {}", customer_id)))?;

        // Pedidos em aberto, do mais antigo para o mais novo, travados.
        let open_orders = self
            .orders_repo
            .list_open_orders_for_update(&mut *tx, tenant_id, customer_id)
            .await?;

        let mut dues = Vec::with_capacity(open_orders.len());
        for order in &open_orders {
            let paid = self.orders_repo.total_paid(&mut *tx, order.id).await?;
            dues.push(order.total_amount - paid);
        }

        let mut allocations = Vec::new();
        let mut credited = Decimal::ZERO;
        let mut deposit_order: Option<Order> = None;

        for entry in &input.payments {
            let (allocated, leftover) = allocate_fifo(entry.amount, &mut dues, self.tolerance);

            for (idx, applied) in allocated {
                let order = &open_orders[idx];
                let line = PaymentEntry {
                    amount: applied,
                    method: entry.method,
                    bank_account_id: entry.bank_account_id,
                    notes: entry.notes.clone(),
                };
                self.payments
                    .record(&mut *tx, tenant_id, order.id, input.session_id, &[line])
                    .await?;
                self.ledger
                    .record(
                        &mut *tx,
                        tenant_id,
                        customer_id,
                        Some(order.id),
                        BalanceMovementKind::Payment,
                        applied,
                        clock.tick(),
                        Some("Depósito alocado ao pedido (FIFO)"),
                    )
                    .await?;

                let settled = dues[idx] <= self.tolerance;
                if settled {
                    self.complete_order(&mut tx, tenant_id, order).await?;
                }
                allocations.push(DepositAllocation {
                    order_id: order.id,
                    amount: applied,
                    settled,
                });
            }

            // Sobra vira crédito puro, ancorada num pedido sintético de
            // total zero para o pagamento ter onde morar.
            if leftover > Decimal::ZERO {
                let anchor_id = match &deposit_order {
                    Some(anchor) => anchor.id,
                    None => {
                        let anchor = self
                            .orders_repo
                            .create_order(
                                &mut *tx,
                                tenant_id,
                                input.branch_id,
                                Some(customer_id),
                                OrderStatus::Completed,
                                Decimal::ZERO,
                                Some("Depósito de saldo"),
                                Some(chrono::Utc::now()),
                            )
                            .await?;
                        let id = anchor.id;
                        deposit_order = Some(anchor);
                        id
                    }
                };

                let line = PaymentEntry {
                    amount: leftover,
                    method: entry.method,
                    bank_account_id: entry.bank_account_id,
                    notes: entry.notes.clone(),
                };
                self.payments
                    .record(&mut *tx, tenant_id, anchor_id, input.session_id, &[line])
                    .await?;
                self.ledger
                    .record(
                        &mut *tx,
                        tenant_id,
                        customer_id,
                        Some(anchor_id),
                        BalanceMovementKind::Payment,
                        leftover,
                        clock.tick(),
                        Some("Depósito convertido em crédito de saldo"),
                    )
                    .await?;
                credited += leftover;
            }
        }

        tx.commit().await?;
        Ok(DepositOutcome {
            allocations,
            credited_to_balance: credited,
        })
    }

    // =========================================================================
    //  REVERSÕES
    // =========================================================================

    /// Cancela um pedido. Com pagamentos já recebidos, só com
    /// `full_reversal` explícito — aí o valor pago volta como crédito
    /// no saldo do cliente.
    pub async fn cancel_order<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        order_id: Uuid,
        full_reversal: bool,
    ) -> Result<Order, AppError>
    where
        E: Executor<'e, Database = Postgres> + Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;
        let mut clock = MovementClock::new();

        // Cliente antes do pedido, como nos outros fluxos.
        let preview = self
            .orders_repo
            .get_order(&mut *tx, tenant_id, order_id)
            .await?
            .ok_or_else(|| AppError::ReferencedEntityMissing(format!("pedido {}", order_id)))?;
        if let Some(cid) = preview.customer_id {
            self.ledger.customer_for_update(&mut *tx, tenant_id, cid).await?;
        }

        let order = self
            .orders_repo
            .get_order_for_update(&mut *tx, tenant_id, order_id)
            .await?
            .ok_or_else(|| AppError::ReferencedEntityMissing(format!("pedido {}", order_id)))?;

        if !order.status.can_transition(OrderStatus::Cancelled) {
            return Err(AppError::InvalidStatusTransition {
                from: order.status,
                to: OrderStatus::Cancelled,
            });
        }

        let paid = self.orders_repo.total_paid(&mut *tx, order.id).await?;
        if paid > Decimal::ZERO && !full_reversal {
            return Err(AppError::InvalidStatusTransition {
                from: order.status,
                to: OrderStatus::Cancelled,
            });
        }

        // Devolução de estoque. Layaway em aberto só tinha reserva;
        // nos outros casos o físico foi baixado e volta.
        let items = self
            .orders_repo
            .list_order_items(&mut *tx, tenant_id, order.id)
            .await?;
        for item in &items {
            if order.status == OrderStatus::OnLayaway {
                self.stock
                    .release(&mut *tx, tenant_id, item.sellable(), item.quantity)
                    .await?;
            } else {
                self.stock
                    .restore(&mut *tx, tenant_id, item.sellable(), item.quantity)
                    .await?;
            }
        }

        if let Some(cid) = order.customer_id {
            // Dívida registrada para este pedido é anulada por um
            // movimento de sinal oposto — nunca editando o histórico.
            let debt = self.ledger.order_debt(&mut *tx, order.id).await?;
            if debt < Decimal::ZERO {
                self.ledger
                    .record(
                        &mut *tx,
                        tenant_id,
                        cid,
                        Some(order.id),
                        BalanceMovementKind::Adjustment,
                        -debt,
                        clock.tick(),
                        Some("Estorno de dívida por cancelamento"),
                    )
                    .await?;
            }

            if full_reversal && paid > Decimal::ZERO {
                self.ledger
                    .record(
                        &mut *tx,
                        tenant_id,
                        cid,
                        Some(order.id),
                        BalanceMovementKind::Adjustment,
                        paid,
                        clock.tick(),
                        Some("Pagamentos estornados para o saldo"),
                    )
                    .await?;
            }
        }

        self.orders_repo
            .update_status(&mut *tx, tenant_id, order.id, OrderStatus::Cancelled, Some(chrono::Utc::now()))
            .await?;

        let order = self.reload_order(&mut tx, tenant_id, order.id).await?;
        tx.commit().await?;
        Ok(order)
    }

    /// Reembolsa um pedido concluído: devolve o estoque e credita no
    /// saldo do cliente o que foi pago.
    pub async fn refund_order<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> Result<Order, AppError>
    where
        E: Executor<'e, Database = Postgres> + Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;
        let mut clock = MovementClock::new();

        // Cliente antes do pedido, como nos outros fluxos.
        let preview = self
            .orders_repo
            .get_order(&mut *tx, tenant_id, order_id)
            .await?
            .ok_or_else(|| AppError::ReferencedEntityMissing(format!("pedido {}", order_id)))?;
        if let Some(cid) = preview.customer_id {
            self.ledger.customer_for_update(&mut *tx, tenant_id, cid).await?;
        }

        let order = self
            .orders_repo
            .get_order_for_update(&mut *tx, tenant_id, order_id)
            .await?
            .ok_or_else(|| AppError::ReferencedEntityMissing(format!("pedido {}", order_id)))?;

        if !order.status.can_transition(OrderStatus::Refunded) {
            return Err(AppError::InvalidStatusTransition {
                from: order.status,
                to: OrderStatus::Refunded,
            });
        }

        let items = self
            .orders_repo
            .list_order_items(&mut *tx, tenant_id, order.id)
            .await?;
        for item in &items {
            self.stock
                .restore(&mut *tx, tenant_id, item.sellable(), item.quantity)
                .await?;
        }

        let paid = self.orders_repo.total_paid(&mut *tx, order.id).await?;
        if let Some(cid) = order.customer_id {
            if paid > Decimal::ZERO {
                self.ledger
                    .record(
                        &mut *tx,
                        tenant_id,
                        cid,
                        Some(order.id),
                        BalanceMovementKind::Adjustment,
                        paid,
                        clock.tick(),
                        Some("Reembolso creditado no saldo"),
                    )
                    .await?;
            }
        }

        self.orders_repo
            .update_status(&mut *tx, tenant_id, order.id, OrderStatus::Refunded, Some(chrono::Utc::now()))
            .await?;

        let order = self.reload_order(&mut tx, tenant_id, order.id).await?;
        tx.commit().await?;
        Ok(order)
    }

    // =========================================================================
    //  AUXILIARES
    // =========================================================================

    /// Transição para COMPLETED. Se o pedido era layaway, a reserva de
    /// cada item vira venda de fato (finalize).
    async fn complete_order(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        order: &Order,
    ) -> Result<(), AppError> {
        if !order.status.can_transition(OrderStatus::Completed) {
            return Err(AppError::InvalidStatusTransition {
                from: order.status,
                to: OrderStatus::Completed,
            });
        }

        if order.status == OrderStatus::OnLayaway {
            let items = self
                .orders_repo
                .list_order_items(&mut *conn, tenant_id, order.id)
                .await?;
            for item in &items {
                self.stock
                    .finalize(&mut *conn, tenant_id, item.sellable(), item.quantity)
                    .await?;
            }
        }

        self.orders_repo
            .update_status(&mut *conn, tenant_id, order.id, OrderStatus::Completed, Some(chrono::Utc::now()))
            .await
    }

    async fn reload_order(
        &self,
        conn: &mut PgConnection,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> Result<Order, AppError> {
        self.orders_repo
            .get_order(&mut *conn, tenant_id, order_id)
            .await?
            .ok_or_else(|| AppError::ReferencedEntityMissing(format!("pedido {}", order_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn tol() -> Decimal {
        dec("0.01")
    }

    fn entry(amount: &str) -> PaymentEntry {
        PaymentEntry {
            amount: dec(amount),
            method: PaymentMethod::Cash,
            bank_account_id: None,
            notes: None,
        }
    }

    // --- cap_entries (política de truncamento da nova venda) ---

    #[test]
    fn truncamento_apara_excedente_sem_erro() {
        // Restam 100; ofertados 80 + 50: a segunda linha é aparada para 20.
        let capped = cap_entries(&[entry("80"), entry("50")], dec("100"));
        assert_eq!(capped.len(), 2);
        assert_eq!(capped[0].amount, dec("80"));
        assert_eq!(capped[1].amount, dec("20"));
    }

    #[test]
    fn truncamento_descarta_linhas_apos_quitar() {
        let capped = cap_entries(&[entry("100"), entry("30")], dec("100"));
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].amount, dec("100"));
    }

    #[test]
    fn truncamento_com_nada_a_pagar_nao_gera_linhas() {
        assert!(cap_entries(&[entry("10")], Decimal::ZERO).is_empty());
    }

    #[test]
    fn truncamento_preserva_metodo_e_conta() {
        let bank = Uuid::new_v4();
        let offered = PaymentEntry {
            amount: dec("500"),
            method: PaymentMethod::Card,
            bank_account_id: Some(bank),
            notes: Some("maquininha".into()),
        };
        let capped = cap_entries(&[offered], dec("120"));
        assert_eq!(capped[0].amount, dec("120"));
        assert_eq!(capped[0].method, PaymentMethod::Card);
        assert_eq!(capped[0].bank_account_id, Some(bank));
    }

    // --- check_outstanding (quitação idempotente e overpayment) ---

    #[test]
    fn ofertado_dentro_da_tolerancia_passa() {
        // Total 100, pagos 40: restam 60. Ofertar 60.01 com tol 0.01 passa.
        let remaining = check_outstanding(
            Uuid::new_v4(),
            dec("100"),
            dec("40"),
            Decimal::ZERO,
            dec("60.01"),
            tol(),
        );
        assert_eq!(remaining.unwrap(), dec("60"));
    }

    #[test]
    fn ofertado_alem_da_tolerancia_e_rejeitado() {
        let err = check_outstanding(
            Uuid::new_v4(),
            dec("100"),
            dec("40"),
            Decimal::ZERO,
            dec("60.02"),
            tol(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            AppError::Overpayment { offered, remaining }
                if offered == dec("60.02") && remaining == dec("60")
        ));
    }

    #[test]
    fn saldo_usado_conta_para_o_teto_do_pagamento() {
        // 30 de saldo + 31 diretos contra 60 restantes: excede.
        let err = check_outstanding(
            Uuid::new_v4(),
            dec("100"),
            dec("40"),
            dec("30"),
            dec("31"),
            tol(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Overpayment { .. }));
    }

    #[test]
    fn pedido_ja_quitado_rejeita_novo_pagamento() {
        // Restam 0.005, dentro da tolerância: o pedido conta como quitado
        // e pagar de novo é erro, não um pagamento duplicado.
        let order_id = Uuid::new_v4();
        let err = check_outstanding(
            order_id,
            dec("100"),
            dec("99.995"),
            Decimal::ZERO,
            dec("10"),
            tol(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::AlreadySettled(id) if id == order_id));
    }

    // --- allocate_fifo (propriedades do depósito) ---

    #[test]
    fn fifo_quita_do_mais_antigo_para_o_mais_novo() {
        // Dois pedidos em aberto: 500 (antigo) e 800 (novo); depósito 1500.
        let mut dues = vec![dec("500"), dec("800")];
        let (allocated, leftover) = allocate_fifo(dec("1500"), &mut dues, tol());

        assert_eq!(allocated, vec![(0, dec("500")), (1, dec("800"))]);
        assert_eq!(leftover, dec("200"));
        assert_eq!(dues, vec![dec("0"), dec("0")]);
    }

    #[test]
    fn fifo_parcial_para_no_primeiro_pedido() {
        let mut dues = vec![dec("500"), dec("800")];
        let (allocated, leftover) = allocate_fifo(dec("200"), &mut dues, tol());

        assert_eq!(allocated, vec![(0, dec("200"))]);
        assert_eq!(leftover, Decimal::ZERO);
        // O antigo continua devendo 300 e o novo não recebeu nada.
        assert_eq!(dues, vec![dec("300"), dec("800")]);
    }

    #[test]
    fn fifo_pula_pedidos_ja_quitados() {
        let mut dues = vec![dec("0"), dec("100")];
        let (allocated, leftover) = allocate_fifo(dec("50"), &mut dues, tol());

        assert_eq!(allocated, vec![(1, dec("50"))]);
        assert_eq!(leftover, Decimal::ZERO);
    }

    #[test]
    fn fifo_sem_pedidos_abertos_vira_sobra_integral() {
        let mut dues: Vec<Decimal> = vec![];
        let (allocated, leftover) = allocate_fifo(dec("75"), &mut dues, tol());

        assert!(allocated.is_empty());
        assert_eq!(leftover, dec("75"));
    }

    #[test]
    fn fifo_nunca_aloca_mais_que_o_ofertado() {
        let mut dues = vec![dec("10"), dec("20"), dec("30")];
        let (allocated, leftover) = allocate_fifo(dec("25"), &mut dues, tol());

        let applied: Decimal = allocated.iter().map(|(_, a)| *a).sum();
        assert_eq!(applied + leftover, dec("25"));
        assert_eq!(allocated, vec![(0, dec("10")), (1, dec("15"))]);
    }
}
