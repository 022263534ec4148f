pub mod catalog;
pub mod customers;
pub mod finance;
pub mod orders;
pub mod payments;
