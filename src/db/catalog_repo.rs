// src/db/catalog_repo.rs

use rust_decimal::Decimal;
use sqlx::{Acquire, Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::catalog::{Product, ProductVariant},
};

#[derive(Clone)]
pub struct CatalogRepository {
    pool: PgPool,
}

impl CatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // =========================================================================
    //  PRODUTOS
    // =========================================================================

    pub async fn create_product<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        sku: &str,
        name: &str,
        price: Decimal,
        initial_stock: Decimal,
    ) -> Result<Product, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let product = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (tenant_id, sku, name, price, current_stock)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(sku)
        .bind(name)
        .bind(price)
        .bind(initial_stock)
        .fetch_one(executor)
        .await?;

        Ok(product)
    }

    /// Cria uma variante e soma o estoque inicial dela no agregado do pai,
    /// para que o total do produto continue sendo a soma das variantes.
    pub async fn create_variant<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        product_id: Uuid,
        name: &str,
        price_override: Option<Decimal>,
        initial_stock: Decimal,
    ) -> Result<ProductVariant, AppError>
    where
        E: Executor<'e, Database = Postgres> + Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;

        let variant = sqlx::query_as::<_, ProductVariant>(
            r#"
            INSERT INTO product_variants (tenant_id, product_id, name, price_override, current_stock)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(product_id)
        .bind(name)
        .bind(price_override)
        .bind(initial_stock)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE products
            SET current_stock = current_stock + $1, updated_at = NOW()
            WHERE id = $2 AND tenant_id = $3
            "#,
        )
        .bind(initial_stock)
        .bind(product_id)
        .bind(tenant_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(variant)
    }

    // =========================================================================
    //  LEITURA COM LOCK (para mutação de estoque)
    // =========================================================================

    pub async fn get_product_for_update<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<Product>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let product = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE id = $1 AND tenant_id = $2 FOR UPDATE",
        )
        .bind(product_id)
        .bind(tenant_id)
        .fetch_optional(executor)
        .await?;

        Ok(product)
    }

    pub async fn get_variant_for_update<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        variant_id: Uuid,
    ) -> Result<Option<ProductVariant>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let variant = sqlx::query_as::<_, ProductVariant>(
            "SELECT * FROM product_variants WHERE id = $1 AND tenant_id = $2 FOR UPDATE",
        )
        .bind(variant_id)
        .bind(tenant_id)
        .fetch_optional(executor)
        .await?;

        Ok(variant)
    }

    // =========================================================================
    //  DELTAS DE ESTOQUE
    // =========================================================================
    // Quem decide os sinais é o StockService; aqui só aplicamos.

    pub async fn apply_product_delta<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        product_id: Uuid,
        current_delta: Decimal,
        reserved_delta: Decimal,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            UPDATE products
            SET current_stock = current_stock + $1,
                reserved_stock = reserved_stock + $2,
                updated_at = NOW()
            WHERE id = $3 AND tenant_id = $4
            "#,
        )
        .bind(current_delta)
        .bind(reserved_delta)
        .bind(product_id)
        .bind(tenant_id)
        .execute(executor)
        .await?;

        Ok(())
    }

    pub async fn apply_variant_delta<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        variant_id: Uuid,
        current_delta: Decimal,
        reserved_delta: Decimal,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            UPDATE product_variants
            SET current_stock = current_stock + $1,
                reserved_stock = reserved_stock + $2,
                updated_at = NOW()
            WHERE id = $3 AND tenant_id = $4
            "#,
        )
        .bind(current_delta)
        .bind(reserved_delta)
        .bind(variant_id)
        .bind(tenant_id)
        .execute(executor)
        .await?;

        Ok(())
    }
}
