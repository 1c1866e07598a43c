use async_trait::async_trait;
use reqwest::{Client, Method};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{
    BankAccount, GatewayError, GatewayResult, GatewayTransactionStatus, InitializeRequest,
    InitializeResponse, PaymentGateway, PaymentLinkRequest, PaymentLinkResponse, TransferRequest,
    TransferResponse, VerifyResponse,
};
use crate::config::GatewayConfig;

const CURRENCY: &str = "NGN";
const PAYMENT_LINK_BASE: &str = "https://pay.squadco.com";

/// Standard response envelope: `{status, success, message, data}`
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

impl<T> Envelope<T> {
    /// An explicit `success` flag wins; `status` only decides when it is absent
    fn is_success(&self) -> bool {
        match self.success {
            Some(success) => success,
            None => self.status == Some(200),
        }
    }
}

#[derive(Debug, Deserialize)]
struct InitiateData {
    checkout_url: String,
    #[serde(default)]
    transaction_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    #[serde(default)]
    transaction_ref: Option<String>,
    transaction_status: String,
    transaction_amount: Value,
    #[serde(default)]
    gateway_transaction_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransferData {
    #[serde(default)]
    transaction_reference: Option<String>,
    #[serde(default)]
    nip_transaction_reference: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupData {
    account_name: String,
    #[serde(default)]
    account_number: Option<String>,
}

/// Convert major units to the minor units (kobo) the API expects
pub(crate) fn to_minor_units(amount: Decimal) -> GatewayResult<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .ok_or_else(|| GatewayError::InvalidResponse(format!("Amount out of range: {}", amount)))
}

/// Parse a minor-unit amount that may arrive as a number or a string
pub(crate) fn from_minor_units(value: &Value) -> GatewayResult<Decimal> {
    let kobo = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| GatewayError::InvalidResponse(format!("Invalid amount: {}", value)))?;
    Ok(Decimal::new(kobo, 2))
}

/// Live adapter for the payment processor's REST API
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: Client,
    base_url: String,
    secret_key: String,
    callback_url: String,
}

impl HttpPaymentGateway {
    pub fn new(config: &GatewayConfig) -> GatewayResult<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
            callback_url: config.callback_url.clone(),
        })
    }

    /// Send a request and unwrap the response envelope
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> GatewayResult<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Gateway {} {}", method, url);

        let mut request = self
            .client
            .request(method, &url)
            .bearer_auth(&self.secret_key);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout
            } else {
                GatewayError::Http(e)
            }
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout
            } else {
                GatewayError::Http(e)
            }
        })?;

        let envelope: Envelope<T> = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(e) if status.is_server_error() => {
                return Err(GatewayError::Unavailable(format!("{}: {}", status, e)))
            }
            Err(e) => return Err(GatewayError::InvalidResponse(e.to_string())),
        };

        if status.is_server_error() {
            return Err(GatewayError::Unavailable(
                envelope.message.unwrap_or_else(|| status.to_string()),
            ));
        }

        if !status.is_success() || !envelope.is_success() {
            let message = envelope
                .message
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("rejected").to_string());
            warn!("Gateway rejected {}: {} ({})", path, message, status);
            return Err(GatewayError::Rejected(message));
        }

        envelope
            .data
            .ok_or_else(|| GatewayError::InvalidResponse(format!("{} returned no data", path)))
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn initialize_transaction(&self, request: InitializeRequest) -> GatewayResult<InitializeResponse> {
        let body = json!({
            "amount": to_minor_units(request.amount)?,
            "email": request.email,
            "currency": CURRENCY,
            "initiate_type": "inline",
            "transaction_ref": request.reference,
            "customer_name": request.customer_name,
            "callback_url": self.callback_url,
            "metadata": request.metadata,
        });

        let data: InitiateData = self
            .call(Method::POST, "/transaction/initiate", Some(body))
            .await?;

        Ok(InitializeResponse {
            checkout_url: data.checkout_url,
            reference: data.transaction_ref.unwrap_or(request.reference),
        })
    }

    async fn verify_transaction(&self, reference: &str) -> GatewayResult<VerifyResponse> {
        let path = format!("/transaction/verify/{}", reference);
        let data: VerifyData = self.call(Method::GET, &path, None).await?;

        Ok(VerifyResponse {
            reference: data.transaction_ref.unwrap_or_else(|| reference.to_string()),
            status: GatewayTransactionStatus::parse(&data.transaction_status),
            amount: from_minor_units(&data.transaction_amount)?,
            gateway_reference: data.gateway_transaction_ref,
        })
    }

    async fn transfer_funds(&self, request: TransferRequest) -> GatewayResult<TransferResponse> {
        let body = json!({
            "remark": request.remark,
            "bank_code": request.bank_code,
            "currency_id": CURRENCY,
            "amount": to_minor_units(request.amount)?.to_string(),
            "account_number": request.account_number,
            "transaction_reference": request.reference,
            "account_name": request.account_name,
        });

        let data: TransferData = self
            .call(Method::POST, "/payout/transfer", Some(body))
            .await?;

        Ok(TransferResponse {
            reference: data.transaction_reference.unwrap_or(request.reference),
            gateway_reference: data.nip_transaction_reference,
        })
    }

    async fn lookup_bank_account(&self, bank_code: &str, account_number: &str) -> GatewayResult<BankAccount> {
        let body = json!({
            "bank_code": bank_code,
            "account_number": account_number,
        });

        let data: LookupData = self
            .call(Method::POST, "/payout/account/lookup", Some(body))
            .await?;

        Ok(BankAccount {
            bank_code: bank_code.to_string(),
            account_number: data.account_number.unwrap_or_else(|| account_number.to_string()),
            account_name: data.account_name,
        })
    }

    async fn create_payment_link(&self, request: PaymentLinkRequest) -> GatewayResult<PaymentLinkResponse> {
        let body = json!({
            "name": request.name,
            "hash": request.hash,
            "link_status": 1,
            "amount": to_minor_units(request.amount)?,
            "currency_id": CURRENCY,
            "description": request.description,
            "redirect_link": request.redirect_link,
            "return_msg": "Payment received",
        });

        let data: Value = self
            .call(Method::POST, "/payment_link/otp", Some(body))
            .await?;

        let payment_url = data
            .get("payment_url")
            .or_else(|| data.get("link_url"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}/{}", PAYMENT_LINK_BASE, request.hash));

        Ok(PaymentLinkResponse {
            hash: request.hash,
            payment_url,
        })
    }
}

impl std::fmt::Debug for HttpPaymentGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPaymentGateway")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
