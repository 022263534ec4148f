pub mod ledger_service;
pub use ledger_service::{LedgerService, MovementClock};
pub mod payment_service;
pub use payment_service::PaymentService;
pub mod stock_service;
pub use stock_service::{StockOp, StockService};
pub mod checkout_service;
pub use checkout_service::CheckoutService;
