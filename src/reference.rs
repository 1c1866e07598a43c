//! Operation references.
//!
//! Every transaction leg is keyed by a reference of the form
//! `MF-<OP>-<unix millis>-<5 hex chars>`, e.g. `MF-DEP-1700000000000-ab12f`.
//! Legs of one logical movement share the base reference and add a suffix
//! (`-OUT`/`-IN`, `-RECEIVED`, `-REFUND`). Uniqueness is probabilistic; a
//! collision surfaces as a duplicate-key error from the store, which callers
//! may retry.

use std::fmt;

pub const PREFIX: &str = "MF";

/// Suffix of the sender leg of an internal transfer
pub const OUT_SUFFIX: &str = "-OUT";
/// Suffix of the recipient leg of an internal transfer
pub const IN_SUFFIX: &str = "-IN";
/// Suffix of the owner leg of an investment
pub const RECEIVED_SUFFIX: &str = "-RECEIVED";
/// Suffix of the compensating credit after a failed withdrawal
pub const REFUND_SUFFIX: &str = "-REFUND";

/// Operation code embedded in a reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Deposit,
    Withdrawal,
    Transfer,
    PaymentLink,
    Investment,
    Repayment,
    Return,
    GroupContribution,
    VirtualAccountDeposit,
}

impl OpCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpCode::Deposit => "DEP",
            OpCode::Withdrawal => "WDR",
            OpCode::Transfer => "TRF",
            OpCode::PaymentLink => "LNK",
            OpCode::Investment => "INV",
            OpCode::Repayment => "RPY",
            OpCode::Return => "RET",
            OpCode::GroupContribution => "GRP",
            OpCode::VirtualAccountDeposit => "VAD",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generate a fresh reference for `op`
pub fn generate(op: OpCode) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let short_id = rand::random::<u32>() & 0xF_FFFF;
    format!("{}-{}-{}-{:05x}", PREFIX, op, millis, short_id)
}

/// Reference for a gateway-originated virtual account credit.
///
/// Derived from the gateway's own reference so redelivered webhooks map to
/// the same leg.
pub fn virtual_account_deposit(gateway_reference: &str) -> String {
    format!("{}-{}-{}", PREFIX, OpCode::VirtualAccountDeposit, gateway_reference)
}

/// Gateway-mandated form `<merchantId>_<reference>`
pub fn merchant_reference(merchant_id: &str, reference: &str) -> String {
    format!("{}_{}", merchant_id, reference)
}

/// Strip a `<merchantId>_` prefix if present
pub fn strip_merchant_prefix<'a>(merchant_id: &str, reference: &'a str) -> &'a str {
    reference
        .strip_prefix(merchant_id)
        .and_then(|rest| rest.strip_prefix('_'))
        .unwrap_or(reference)
}

pub fn with_suffix(base: &str, suffix: &str) -> String {
    format!("{}{}", base, suffix)
}

/// Reference of the refund leg compensating `withdrawal_reference`
pub fn refund_of(withdrawal_reference: &str) -> String {
    with_suffix(withdrawal_reference, REFUND_SUFFIX)
}
