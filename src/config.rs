// src/config.rs

use std::{env, str::FromStr, time::Duration};

use anyhow::Context;
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    db::{
        CatalogRepository, FinanceRepository, LedgerRepository, OrdersRepository,
        PaymentsRepository,
    },
    services::{CheckoutService, LedgerService, PaymentService, StockService},
};

// Tolerância de arredondamento padrão para considerar um pedido quitado.
const DEFAULT_SETTLEMENT_TOLERANCE: &str = "0.01";

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub settlement_tolerance: Decimal,
    pub catalog_repo: CatalogRepository,
    pub orders_repo: OrdersRepository,
    pub ledger_repo: LedgerRepository,
    pub payments_repo: PaymentsRepository,
    pub finance_repo: FinanceRepository,
    pub ledger_service: LedgerService,
    pub payment_service: PaymentService,
    pub stock_service: StockService,
    pub checkout_service: CheckoutService,
}

impl AppState {
    pub async fn new() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").context("DATABASE_URL deve ser definida")?;

        let db_pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&database_url)
            .await?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        let raw_tolerance = env::var("SETTLEMENT_TOLERANCE")
            .unwrap_or_else(|_| DEFAULT_SETTLEMENT_TOLERANCE.to_string());
        let settlement_tolerance = Decimal::from_str(&raw_tolerance)
            .context("SETTLEMENT_TOLERANCE deve ser um decimal válido")?;

        // --- Monta o gráfico de dependências ---
        let catalog_repo = CatalogRepository::new(db_pool.clone());
        let orders_repo = OrdersRepository::new(db_pool.clone());
        let ledger_repo = LedgerRepository::new(db_pool.clone());
        let payments_repo = PaymentsRepository::new(db_pool.clone());
        let finance_repo = FinanceRepository::new(db_pool.clone());

        let ledger_service = LedgerService::new(ledger_repo.clone());
        let payment_service = PaymentService::new(payments_repo.clone(), finance_repo.clone());
        let stock_service = StockService::new(catalog_repo.clone());
        let checkout_service = CheckoutService::new(
            orders_repo.clone(),
            payment_service.clone(),
            ledger_service.clone(),
            stock_service.clone(),
            settlement_tolerance,
        );

        Ok(Self {
            db_pool,
            settlement_tolerance,
            catalog_repo,
            orders_repo,
            ledger_repo,
            payments_repo,
            finance_repo,
            ledger_service,
            payment_service,
            stock_service,
            checkout_service,
        })
    }
}
