//! Price-sensitivity and weekly-retention analytics for the super-group
//! order program: order aggregates from the local store are reconciled
//! against benchmark-market and purchase-ledger reference prices.

pub mod aliases;
pub mod benchmark;
pub mod config;
pub mod db;
pub mod geocode;
pub mod ledger;
pub mod models;
pub mod orders;
pub mod pricing;
pub mod retention;
pub mod sensitivity;
