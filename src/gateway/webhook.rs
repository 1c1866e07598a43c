//! Webhook authentication and payload parsing.
//!
//! The gateway signs every webhook body with HMAC-SHA512 keyed by the
//! merchant secret and sends the hex digest in a header. The boundary must
//! check the signature before any reference from the body reaches the ledger.

use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use sha2::Sha512;
use std::str::FromStr;

use super::GatewayError;

type HmacSha512 = Hmac<Sha512>;

/// Header carrying the body signature
pub const SIGNATURE_HEADER: &str = "x-squad-encrypted-body";

/// Compute the hex HMAC-SHA512 of `body` (uppercase, as the gateway sends it)
pub fn sign(secret: &str, body: &[u8]) -> Result<String, GatewayError> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|e| GatewayError::InvalidResponse(format!("Invalid webhook secret: {}", e)))?;
    mac.update(body);
    Ok(hex::encode_upper(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex signature (either case) against `body`
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

fn decimal_from_any<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let parsed = match &value {
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    };
    parsed.ok_or_else(|| serde::de::Error::custom(format!("invalid amount: {}", value)))
}

/// Charge notification (`charge_successful` and friends)
#[derive(Debug, Clone, Deserialize)]
pub struct ChargeWebhook {
    #[serde(rename = "Event")]
    pub event: String,
    #[serde(rename = "TransactionRef")]
    pub transaction_ref: String,
    #[serde(rename = "Body", default)]
    pub body: Value,
}

impl ChargeWebhook {
    pub fn is_successful_charge(&self) -> bool {
        self.event.eq_ignore_ascii_case("charge_successful")
    }
}

/// Credit into a wallet's virtual account
#[derive(Debug, Clone, Deserialize)]
pub struct VirtualAccountWebhook {
    pub transaction_reference: String,
    pub virtual_account_number: String,
    #[serde(deserialize_with = "decimal_from_any")]
    pub principal_amount: Decimal,
    #[serde(default)]
    pub transaction_indicator: Option<String>,
    #[serde(default)]
    pub customer_identifier: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
}

impl VirtualAccountWebhook {
    /// Only credit notifications move money into the wallet
    pub fn is_credit(&self) -> bool {
        self.transaction_indicator
            .as_deref()
            .map(|i| i.eq_ignore_ascii_case("C"))
            .unwrap_or(true)
    }
}

/// Parse a charge webhook body after its signature has been checked
pub fn parse_charge(body: &[u8]) -> Result<ChargeWebhook, GatewayError> {
    serde_json::from_slice(body).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
}

/// Parse a virtual-account webhook body after its signature has been checked
pub fn parse_virtual_account(body: &[u8]) -> Result<VirtualAccountWebhook, GatewayError> {
    serde_json::from_slice(body).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "sandbox_sk_94f2b798466408ef4d19e848ee1a4d1a3e93f104046f";

    #[test]
    fn test_signature_round_trip() {
        let body = br#"{"Event":"charge_successful","TransactionRef":"MF-DEP-1-abcde","Body":{}}"#;
        let signature = sign(SECRET, body).unwrap();
        assert_eq!(signature.len(), 128);
        assert!(verify_signature(SECRET, body, &signature));
        assert!(verify_signature(SECRET, body, &signature.to_lowercase()));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let body = br#"{"TransactionRef":"MF-DEP-1-abcde","amount":1000}"#;
        let signature = sign(SECRET, body).unwrap();
        let tampered = br#"{"TransactionRef":"MF-DEP-1-abcde","amount":9000}"#;
        assert!(!verify_signature(SECRET, tampered, &signature));
        assert!(!verify_signature("other-secret", body, &signature));
        assert!(!verify_signature(SECRET, body, "not-hex"));
    }

    #[test]
    fn test_parse_charge() {
        let body = br#"{"Event":"charge_successful","TransactionRef":"MF-DEP-1-abcde","Body":{"amount":100000}}"#;
        let webhook = parse_charge(body).unwrap();
        assert!(webhook.is_successful_charge());
        assert_eq!(webhook.transaction_ref, "MF-DEP-1-abcde");
    }

    #[test]
    fn test_parse_virtual_account() {
        let body = br#"{
            "transaction_reference": "REF2023091512345",
            "virtual_account_number": "7834927713",
            "principal_amount": "5000.00",
            "settled_amount": "4975.00",
            "transaction_indicator": "C"
        }"#;
        let webhook = parse_virtual_account(body).unwrap();
        assert_eq!(webhook.principal_amount, Decimal::new(5000, 0));
        assert!(webhook.is_credit());

        let numeric = br#"{"transaction_reference":"R1","virtual_account_number":"1","principal_amount":250.5}"#;
        assert_eq!(
            parse_virtual_account(numeric).unwrap().principal_amount,
            Decimal::new(2505, 1)
        );
    }
}
