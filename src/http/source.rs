//! Transaction source backed by the processor and internal ledger APIs

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;

use super::{build_client, get_json, RetryPolicy};
use crate::traits::TransactionSource;
use crate::types::*;

/// Processor fee model: 2.9% plus a fixed 0.30
fn processor_fee(amount: &BigDecimal) -> RunResult<BigDecimal> {
    let rate = BigDecimal::from_str("0.029")
        .map_err(|e| ReconciliationError::Validation(e.to_string()))?;
    let fixed = BigDecimal::from_str("0.30")
        .map_err(|e| ReconciliationError::Validation(e.to_string()))?;
    Ok(amount * rate + fixed)
}

/// `TXN_{PROCESSOR}_{YYYYMMDD}_{id:04}`, shared by both APIs so records join
pub fn api_transaction_id(processor: &str, run_date: NaiveDate, record_id: u64) -> String {
    format!(
        "TXN_{}_{}_{:04}",
        processor.to_uppercase(),
        run_date.format("%Y%m%d"),
        record_id
    )
}

/// Sale record exported by the processor API
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorRecord {
    pub id: u64,
    pub price: serde_json::Number,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl ProcessorRecord {
    pub fn into_transaction(
        self,
        processor: &str,
        run_date: NaiveDate,
        at: DateTime<Utc>,
    ) -> RunResult<Transaction> {
        let amount = decimal_from_json(&self.price)?;
        if amount <= BigDecimal::from(0) {
            return Err(ReconciliationError::Validation(format!(
                "record {} has non-positive price {}",
                self.id, amount
            )));
        }
        let fee = processor_fee(&amount)?;
        let merchant = self
            .brand
            .or(self.category)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| "UNKNOWN".to_string())
            .to_uppercase();

        Ok(TransactionBuilder::new(
            api_transaction_id(processor, run_date, self.id),
            processor,
            amount,
            at,
        )
        .merchant_id(merchant)
        .reference_number(format!("REF_{}_{}", processor.to_uppercase(), self.id))
        .fee(fee)
        .build())
    }
}

/// Ledger entry exported by the internal API
#[derive(Debug, Clone, Deserialize)]
pub struct InternalRecord {
    pub id: u64,
    #[serde(rename = "userId", default)]
    pub user_id: u64,
}

impl InternalRecord {
    /// Internal amounts are booked at 2.50 per record id
    pub fn into_transaction(self, processor: &str, run_date: NaiveDate, at: DateTime<Utc>) -> Transaction {
        let amount = BigDecimal::from(self.id) * BigDecimal::new(250.into(), 2);
        TransactionBuilder::new(
            api_transaction_id(processor, run_date, self.id),
            processor,
            amount,
            at,
        )
        .merchant_id(format!("MERCH_{:03}", self.user_id))
        .reference_number(format!("INT_{}", self.id))
        .build()
    }
}

/// Pull the record list out of a response that is either a bare array or
/// an object holding the array under `key`
fn record_list(body: Value, key: &str) -> RunResult<Vec<Value>> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut fields) => match fields.remove(key) {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(ReconciliationError::Fetch(format!(
                "response has no '{}' list",
                key
            ))),
        },
        _ => Err(ReconciliationError::Fetch(
            "response is neither a list nor an object".to_string(),
        )),
    }
}

/// Decode each record, skipping the ones that do not map cleanly
fn map_records<R, F>(items: Vec<Value>, limit: Option<usize>, processor: &str, mut map: F) -> Vec<Transaction>
where
    R: for<'de> Deserialize<'de>,
    F: FnMut(R) -> RunResult<Transaction>,
{
    let limit = limit.unwrap_or(usize::MAX);
    let mut transactions = Vec::new();
    for item in items {
        if transactions.len() >= limit {
            break;
        }
        let mapped = serde_json::from_value::<R>(item)
            .map_err(ReconciliationError::from)
            .and_then(&mut map);
        match mapped {
            Ok(transaction) => transactions.push(transaction),
            Err(err) => tracing::warn!(processor, error = %err, "skipping invalid record"),
        }
    }
    transactions
}

/// Fetches processor exports from `{processor_api}/products` and internal
/// ledger entries from `{internal_api}/posts`
#[derive(Debug, Clone)]
pub struct HttpTransactionSource {
    client: Client,
    processor_api_base_url: String,
    internal_api_base_url: String,
    retry: RetryPolicy,
    processor_limit: Option<usize>,
    internal_limit: Option<usize>,
}

impl HttpTransactionSource {
    pub fn new(
        processor_api_base_url: impl Into<String>,
        internal_api_base_url: impl Into<String>,
    ) -> RunResult<Self> {
        Ok(Self {
            client: build_client()?,
            processor_api_base_url: processor_api_base_url.into().trim_end_matches('/').to_string(),
            internal_api_base_url: internal_api_base_url.into().trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
            processor_limit: None,
            internal_limit: None,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Cap how many records are taken from each API
    pub fn with_limits(mut self, processor: Option<usize>, internal: Option<usize>) -> Self {
        self.processor_limit = processor;
        self.internal_limit = internal;
        self
    }
}

#[async_trait]
impl TransactionSource for HttpTransactionSource {
    async fn fetch_processor_transactions(
        &self,
        processor: &str,
        run_date: NaiveDate,
    ) -> RunResult<Vec<Transaction>> {
        let url = format!("{}/products", self.processor_api_base_url);
        let body = get_json(&self.client, &url, self.retry).await.map_err(|e| {
            tracing::error!(processor, url = %url, error = %e, "failed to fetch processor data");
            e
        })?;

        let at = Utc::now();
        let transactions = map_records(
            record_list(body, "products")?,
            self.processor_limit,
            processor,
            |record: ProcessorRecord| record.into_transaction(processor, run_date, at),
        );

        tracing::info!(processor, count = transactions.len(), "fetched processor transactions");
        Ok(transactions)
    }

    async fn fetch_internal_transactions(
        &self,
        processor: &str,
        run_date: NaiveDate,
        _processor_transactions: &[Transaction],
    ) -> RunResult<Vec<Transaction>> {
        let url = format!("{}/posts", self.internal_api_base_url);
        let body = get_json(&self.client, &url, self.retry).await.map_err(|e| {
            tracing::error!(processor, url = %url, error = %e, "failed to fetch internal data");
            e
        })?;

        let at = Utc::now();
        let transactions = map_records(
            record_list(body, "data")?,
            self.internal_limit,
            processor,
            |record: InternalRecord| Ok(record.into_transaction(processor, run_date, at)),
        );

        tracing::info!(processor, count = transactions.len(), "fetched internal transactions");
        Ok(transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_server;
    use std::time::Duration;

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    fn run_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 15).unwrap()
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            initial_interval: Duration::from_millis(10),
            max_elapsed: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_processor_record_mapping() {
        let record: ProcessorRecord =
            serde_json::from_str(r#"{"id": 7, "price": 549.99, "category": "smartphones"}"#).unwrap();
        let txn = record.into_transaction("stripe", run_date(), Utc::now()).unwrap();

        assert_eq!(txn.transaction_id, "TXN_STRIPE_20240515_0007");
        assert_eq!(txn.amount, dec("549.99"));
        assert_eq!(txn.fee, dec("16.24971"));
        assert_eq!(txn.merchant_id, "SMARTPHONES");
        assert_eq!(txn.reference_number, "REF_STRIPE_7");
        assert_eq!(txn.processor_name, "stripe");
    }

    #[test]
    fn test_non_positive_price_is_rejected() {
        let record: ProcessorRecord = serde_json::from_str(r#"{"id": 1, "price": 0}"#).unwrap();
        assert!(matches!(
            record.into_transaction("stripe", run_date(), Utc::now()),
            Err(ReconciliationError::Validation(_))
        ));
    }

    #[test]
    fn test_internal_record_mapping() {
        let record: InternalRecord = serde_json::from_str(r#"{"id": 3, "userId": 2}"#).unwrap();
        let txn = record.into_transaction("stripe", run_date(), Utc::now());

        assert_eq!(txn.transaction_id, "TXN_STRIPE_20240515_0003");
        assert_eq!(txn.amount, dec("7.50"));
        assert_eq!(txn.merchant_id, "MERCH_002");
        assert_eq!(txn.fee, BigDecimal::from(0));
    }

    #[test]
    fn test_record_list_shapes() {
        let wrapped = serde_json::json!({"products": [{"id": 1}], "total": 1});
        assert_eq!(record_list(wrapped, "products").unwrap().len(), 1);
        assert_eq!(record_list(serde_json::json!([1, 2]), "data").unwrap().len(), 2);
        assert!(record_list(serde_json::json!({"items": []}), "data").is_err());
        assert!(record_list(serde_json::json!("nope"), "data").is_err());
    }

    #[tokio::test]
    async fn test_fetches_and_maps_both_apis() {
        let products = r#"{"products": [
            {"id": 1, "price": 9.99, "brand": "Apple"},
            {"id": 2, "price": "not a number"},
            {"id": 3, "price": 0.1, "category": "beauty"}
        ]}"#;
        let posts = r#"[{"id": 1, "userId": 7}, {"id": 2, "userId": 7}]"#;
        let (base_url, server) = test_server::serve(vec![
            (200, products.to_string()),
            (200, posts.to_string()),
        ])
        .await;

        let source = HttpTransactionSource::new(format!("{}/", base_url), base_url.clone())
            .unwrap()
            .with_retry(fast_retry());

        let processor = source
            .fetch_processor_transactions("stripe", run_date())
            .await
            .unwrap();
        let internal = source
            .fetch_internal_transactions("stripe", run_date(), &processor)
            .await
            .unwrap();

        let ids: Vec<&str> = processor.iter().map(|t| t.transaction_id.as_str()).collect();
        assert_eq!(ids, vec!["TXN_STRIPE_20240515_0001", "TXN_STRIPE_20240515_0003"]);
        assert_eq!(processor[0].merchant_id, "APPLE");
        assert_eq!(processor[1].amount, dec("0.1"));
        assert_eq!(internal.len(), 2);
        assert_eq!(internal[0].transaction_id, processor[0].transaction_id);

        let requests = server.await.unwrap();
        assert!(requests[0].request_line.starts_with("GET /products "));
        assert!(requests[1].request_line.starts_with("GET /posts "));
    }

    #[tokio::test]
    async fn test_limits_cap_record_count() {
        let posts = r#"{"data": [{"id": 1}, {"id": 2}, {"id": 3}]}"#;
        let (base_url, _server) = test_server::serve(vec![(200, posts.to_string())]).await;

        let source = HttpTransactionSource::new(base_url.clone(), base_url)
            .unwrap()
            .with_retry(fast_retry())
            .with_limits(None, Some(2));

        let internal = source
            .fetch_internal_transactions("paypal", run_date(), &[])
            .await
            .unwrap();
        assert_eq!(internal.len(), 2);
        assert_eq!(internal[1].merchant_id, "MERCH_000");
    }

    #[tokio::test]
    async fn test_unexpected_shape_is_a_fetch_error() {
        let (base_url, _server) = test_server::serve(vec![(200, r#"{"error": "down"}"#.to_string())]).await;

        let source = HttpTransactionSource::new(base_url.clone(), base_url)
            .unwrap()
            .with_retry(fast_retry());
        assert!(matches!(
            source.fetch_processor_transactions("stripe", run_date()).await,
            Err(ReconciliationError::Fetch(_))
        ));
    }
}
