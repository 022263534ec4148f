pub mod catalog_repo;
pub use catalog_repo::CatalogRepository;
pub mod orders_repo;
pub use orders_repo::OrdersRepository;
pub mod payments_repo;
pub use payments_repo::PaymentsRepository;
pub mod ledger_repo;
pub use ledger_repo::LedgerRepository;
pub mod finance_repo;
pub use finance_repo::FinanceRepository;
