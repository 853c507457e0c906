//! Payment collaborator. The core only needs an authorize call that either
//! yields a payment id or declines; everything else about payments lives in
//! the external service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::BookingError;

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Authorizes a charge ahead of booking confirmation. A decline must
    /// prevent the booking from being confirmed.
    async fn authorize(&self, amount_cents: u32, user_id: Uuid) -> Result<String, BookingError>;
}

#[derive(Debug, Serialize)]
struct AuthorizeRequest {
    amount_cents: u32,
    user_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct AuthorizeResponse {
    approved: bool,
    payment_id: Option<String>,
    reason: Option<String>,
}

#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpPaymentGateway {
    pub fn new(base_url: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn authorize_url(&self) -> Result<Url, BookingError> {
        self.base_url
            .join("authorize")
            .map_err(|err| BookingError::Database(format!("invalid payment url: {err}")))
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn authorize(&self, amount_cents: u32, user_id: Uuid) -> Result<String, BookingError> {
        let url = self.authorize_url()?;
        let response = self
            .client
            .post(url.as_str())
            .json(&AuthorizeRequest {
                amount_cents,
                user_id,
            })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|err| BookingError::Database(format!("payment service: {err}")))?;

        let body: AuthorizeResponse = response
            .json()
            .await
            .map_err(|err| BookingError::Database(format!("payment service: {err}")))?;

        if !body.approved {
            return Err(BookingError::PaymentDeclined {
                reason: body.reason.unwrap_or_else(|| "declined".to_string()),
            });
        }
        body.payment_id.ok_or(BookingError::PaymentDeclined {
            reason: "approved without a payment id".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn test_authorize_approved() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/authorize");
                then.status(200)
                    .json_body(serde_json::json!({"approved": true, "payment_id": "pay_123"}));
            })
            .await;

        let gateway = HttpPaymentGateway::new(Url::parse(&server.base_url()).unwrap());
        let payment_id = gateway.authorize(1500, Uuid::new_v4()).await.unwrap();
        assert_eq!(payment_id, "pay_123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_authorize_declined() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/authorize");
                then.status(200).json_body(serde_json::json!({
                    "approved": false,
                    "reason": "insufficient funds"
                }));
            })
            .await;

        let gateway = HttpPaymentGateway::new(Url::parse(&server.base_url()).unwrap());
        let err = gateway.authorize(1500, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, BookingError::PaymentDeclined { reason } if reason == "insufficient funds"));
    }

    #[tokio::test]
    async fn test_authorize_service_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/authorize");
                then.status(503);
            })
            .await;

        let gateway = HttpPaymentGateway::new(Url::parse(&server.base_url()).unwrap());
        let err = gateway.authorize(1500, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, BookingError::Database(_)));
    }
}
