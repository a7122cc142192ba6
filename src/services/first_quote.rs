use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::services::quotes::QuoteApi;

/// Field names under which listings carry the owning client.
pub const CLIENT_ID_FIELDS: [&str; 5] = ["clientId", "client_id", "cliente", "clienteId", "userId"];

/// Decides whether a submission is the client's first quote.
#[derive(Clone)]
pub struct FirstQuoteDetector {
    api: Arc<dyn QuoteApi>,
}

impl FirstQuoteDetector {
    pub fn new(api: Arc<dyn QuoteApi>) -> Self {
        Self { api }
    }

    /// True iff the client has no quotes yet. Any unrecoverable listing
    /// failure answers `false`.
    #[instrument(skip(self))]
    pub async fn is_first_quote(&self, client_id: &str) -> bool {
        let quotes = match self.api.list_client_quotes(client_id).await {
            Ok(quotes) => quotes,
            Err(e) => {
                warn!("Client quote listing failed, filtering the full listing: {}", e);
                match self.api.list_quotes().await {
                    Ok(all) => all
                        .into_iter()
                        .filter(|quote| belongs_to(quote, client_id))
                        .collect(),
                    Err(e) => {
                        warn!("Quote listing unavailable; assuming a repeat client: {}", e);
                        return false;
                    }
                }
            }
        };

        debug!(existing = quotes.len(), "Prior quotes counted");
        quotes.is_empty()
    }
}

fn belongs_to(quote: &Value, client_id: &str) -> bool {
    CLIENT_ID_FIELDS
        .iter()
        .filter_map(|field| quote.get(*field))
        .any(|value| id_matches(value, client_id))
}

fn id_matches(value: &Value, client_id: &str) -> bool {
    match value {
        Value::String(id) => id == client_id,
        Value::Number(id) => id.to_string() == client_id,
        // populated references: {"_id": "..."} / {"id": ...}
        Value::Object(map) => ["_id", "id"]
            .iter()
            .filter_map(|key| map.get(*key))
            .any(|nested| id_matches(nested, client_id)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ServiceError;
    use crate::models::{QuoteRequest, QuoteResponse};
    use async_trait::async_trait;
    use mockall::mock;
    use mockall::predicate::*;
    use serde_json::json;

    mock! {
        pub Api {}

        #[async_trait]
        impl QuoteApi for Api {
            async fn create_quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, ServiceError>;
            async fn list_client_quotes(&self, client_id: &str) -> Result<Vec<Value>, ServiceError>;
            async fn list_quotes(&self) -> Result<Vec<Value>, ServiceError>;
        }
    }

    #[tokio::test]
    async fn empty_client_listing_is_first_quote() {
        let mut api = MockApi::new();
        api.expect_list_client_quotes()
            .with(eq("c-1"))
            .returning(|_| Ok(vec![]));
        api.expect_list_quotes().never();

        assert!(FirstQuoteDetector::new(Arc::new(api)).is_first_quote("c-1").await);
    }

    #[tokio::test]
    async fn fallback_filters_by_any_client_field() {
        let mut api = MockApi::new();
        api.expect_list_client_quotes()
            .returning(|_| Err(ServiceError::NetworkError("404 route".into())));
        api.expect_list_quotes().returning(|| {
            Ok(vec![
                json!({"_id": "q1", "clienteId": "someone-else"}),
                json!({"_id": "q2", "cliente": {"_id": "c-9"}}),
            ])
        });

        let detector = FirstQuoteDetector::new(Arc::new(api));
        assert!(!detector.is_first_quote("c-9").await);
    }

    #[tokio::test]
    async fn fallback_without_matches_is_first_quote() {
        let mut api = MockApi::new();
        api.expect_list_client_quotes()
            .returning(|_| Err(ServiceError::Timeout));
        api.expect_list_quotes()
            .returning(|| Ok(vec![json!({"userId": 7}), json!({"status": "pendiente"})]));

        let detector = FirstQuoteDetector::new(Arc::new(api));
        assert!(detector.is_first_quote("8").await);
        assert!(!belongs_to(&json!({"userId": 7}), "8"));
        assert!(belongs_to(&json!({"userId": 7}), "7"));
    }

    #[tokio::test]
    async fn listing_errors_answer_false() {
        let mut api = MockApi::new();
        api.expect_list_client_quotes()
            .returning(|_| Err(ServiceError::NetworkError("down".into())));
        api.expect_list_quotes()
            .returning(|| Err(ServiceError::NetworkError("down".into())));

        assert!(!FirstQuoteDetector::new(Arc::new(api)).is_first_quote("c-1").await);
    }
}
