//! Domain models for the MoneyFlow ledger.
//!
//! This module contains all database-backed models representing
//! the entities that money moves between: wallets, transaction legs,
//! businesses with their investments, and savings groups.

pub mod business;
pub mod group_member;
pub mod investment;
pub mod savings_group;
pub mod transaction;
pub mod wallet;

// Re-export all models for convenient access
pub use business::{Business, BusinessStatus};
pub use group_member::GroupMember;
pub use investment::{Investment, InvestmentStatus};
pub use savings_group::SavingsGroup;
pub use transaction::{NewTransaction, Transaction, TransactionStatus, TransactionType};
pub use wallet::{VirtualAccount, Wallet};
