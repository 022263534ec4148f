// src/lib.rs
//
// Motor de pagamentos e conciliação de saldo para o back office
// multi-filial: ledger de saldo dos clientes, registro de pagamentos,
// máquina de estados de estoque e o orquestrador de alocação.

pub mod common;
pub mod config;
pub mod db;
pub mod models;
pub mod services;

pub use common::error::AppError;
pub use config::AppState;

/// Inicializa o logger. Chamar uma vez, no início do binário.
pub fn init_tracing() {
    tracing_subscriber::fmt().with_target(false).compact().init();
}

/// Roda as migrações do SQLx contra o pool informado.
pub async fn run_migrations(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!().run(pool).await?;
    tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");
    Ok(())
}
