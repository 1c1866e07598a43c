pub mod business_repository;
pub mod ledger_store;
pub mod memory;
pub mod postgres;
pub mod savings_repository;
pub mod transaction_repository;
pub mod wallet_repository;

// Re-export the store contract and its implementations
pub use business_repository::BusinessRepository;
pub use ledger_store::{
    ContributionOrder, ContributionReceipt, DepositSettlement, InternalTransfer, InvestmentOrder,
    InvestmentReceipt, LedgerStore, RepaymentOrder, RepaymentReceipt, ReturnPayment, TransferReceipt,
    WithdrawalReversal,
};
pub use memory::InMemoryLedgerStore;
pub use postgres::PgLedgerStore;
pub use savings_repository::SavingsRepository;
pub use transaction_repository::TransactionRepository;
pub use wallet_repository::WalletRepository;
