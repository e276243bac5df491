//! Route modules.

pub mod checkout;
pub mod health;
pub mod products;
