// src/db/orders_repo.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::catalog::SellableRef,
    models::orders::{Order, OrderItem, OrderStatus},
};

#[derive(Clone)]
pub struct OrdersRepository {
    pool: PgPool,
}

impl OrdersRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Pool para o chamador abrir a transação da operação.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // =========================================================================
    //  CRIAÇÃO
    // =========================================================================

    /// Insere o pedido já com o total calculado pelo orquestrador.
    /// O display_id (sequência FIFO) é atribuído pelo banco.
    pub async fn create_order<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        branch_id: Uuid,
        customer_id: Option<Uuid>,
        status: OrderStatus,
        total_amount: Decimal,
        notes: Option<&str>,
        closed_at: Option<DateTime<Utc>>,
    ) -> Result<Order, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let order = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (tenant_id, branch_id, customer_id, status, total_amount, notes, closed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(branch_id)
        .bind(customer_id)
        .bind(status)
        .bind(total_amount)
        .bind(notes)
        .bind(closed_at)
        .fetch_one(executor)
        .await?;

        Ok(order)
    }

    pub async fn add_order_item<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        order_id: Uuid,
        sellable: SellableRef,
        quantity: Decimal,
        unit_price: Decimal,
    ) -> Result<OrderItem, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let line_total = quantity * unit_price;

        let item = sqlx::query_as::<_, OrderItem>(
            r#"
            INSERT INTO order_items (tenant_id, order_id, sellable_kind, sellable_id, quantity, unit_price, line_total)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(order_id)
        .bind(sellable.kind())
        .bind(sellable.id())
        .bind(quantity)
        .bind(unit_price)
        .bind(line_total)
        .fetch_one(executor)
        .await?;

        Ok(item)
    }

    // =========================================================================
    //  LEITURA
    // =========================================================================

    pub async fn get_order<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> Result<Option<Order>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let order = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE id = $1 AND tenant_id = $2",
        )
        .bind(order_id)
        .bind(tenant_id)
        .fetch_optional(executor)
        .await?;

        Ok(order)
    }

    /// Trava a linha do pedido. Dois pagamentos concorrentes contra o
    /// mesmo pedido serializam aqui — sem isso, ambos leriam o mesmo
    /// "restante a pagar" e produziriam um overpayment.
    pub async fn get_order_for_update<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> Result<Option<Order>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let order = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE id = $1 AND tenant_id = $2 FOR UPDATE",
        )
        .bind(order_id)
        .bind(tenant_id)
        .fetch_optional(executor)
        .await?;

        Ok(order)
    }

    pub async fn list_order_items<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> Result<Vec<OrderItem>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let items = sqlx::query_as::<_, OrderItem>(
            "SELECT * FROM order_items WHERE tenant_id = $1 AND order_id = $2 ORDER BY created_at",
        )
        .bind(tenant_id)
        .bind(order_id)
        .fetch_all(executor)
        .await?;

        Ok(items)
    }

    /// Soma dos pagamentos já registrados para o pedido.
    pub async fn total_paid<'e, E>(
        &self,
        executor: E,
        order_id: Uuid,
    ) -> Result<Decimal, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let total: Option<Decimal> = sqlx::query_scalar(
            "SELECT SUM(amount) FROM payments WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_one(executor)
        .await?;

        Ok(total.unwrap_or(Decimal::ZERO))
    }

    /// Pedidos em aberto do cliente, do mais antigo para o mais novo,
    /// já travados para a alocação FIFO do depósito.
    pub async fn list_open_orders_for_update<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        customer_id: Uuid,
    ) -> Result<Vec<Order>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT * FROM orders
            WHERE tenant_id = $1
              AND customer_id = $2
              AND status IN ('PENDING', 'ON_LAYAWAY')
            ORDER BY display_id ASC
            FOR UPDATE
            "#,
        )
        .bind(tenant_id)
        .bind(customer_id)
        .fetch_all(executor)
        .await?;

        Ok(orders)
    }

    // =========================================================================
    //  STATUS
    // =========================================================================

    pub async fn update_status<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        order_id: Uuid,
        status: OrderStatus,
        closed_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            "UPDATE orders SET status = $1, closed_at = $2 WHERE id = $3 AND tenant_id = $4",
        )
        .bind(status)
        .bind(closed_at)
        .bind(order_id)
        .bind(tenant_id)
        .execute(executor)
        .await?;

        Ok(())
    }
}
