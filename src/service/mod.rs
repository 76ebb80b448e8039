pub mod customer_service;

pub use crate::config::DeliveryMode;
pub use customer_service::CustomerService;
