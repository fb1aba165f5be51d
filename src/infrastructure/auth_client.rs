use crate::domain::models::Token;
use crate::infrastructure::config::ApiConfig;
use crate::infrastructure::error::ApiError;
use crate::infrastructure::http::{HttpRequest, HttpTransport};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

/// Token-endpoint client: exchanges an authorization code or a refresh token
/// for a fresh credential pair.
#[derive(Clone)]
pub struct AuthClient {
    config: ApiConfig,
    transport: Arc<dyn HttpTransport>,
}

/// Token endpoint payload. `created_at` is epoch seconds and absent on some
/// API versions, in which case the token counts as issued now.
#[derive(Debug, Deserialize)]
struct ApiTokenResponse {
    access_token: String,
    token_type: String,
    expires_in: i64,
    refresh_token: String,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    created_at: Option<DateTime<Utc>>,
}

impl ApiTokenResponse {
    fn into_token(self, now: DateTime<Utc>) -> Token {
        let issued_at = self.created_at.unwrap_or(now);
        Token {
            auth: self.access_token,
            refresh: self.refresh_token,
            valid_until: issued_at + Duration::seconds(self.expires_in),
        }
    }
}

impl AuthClient {
    pub fn new(config: ApiConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self { config, transport }
    }

    pub async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<Token, ApiError> {
        self.request_token(serde_json::json!({
            "grant_type": "authorization_code",
            "client_id": self.config.client_id,
            "code": code,
            "code_verifier": code_verifier,
            "redirect_uri": self.config.redirect_uri,
        }))
        .await
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<Token, ApiError> {
        self.request_token(serde_json::json!({
            "grant_type": "refresh_token",
            "client_id": self.config.client_id,
            "refresh_token": refresh_token,
            "scope": self.config.scope(),
        }))
        .await
    }

    async fn request_token(&self, body: serde_json::Value) -> Result<Token, ApiError> {
        let request = HttpRequest::post_json(self.config.token_url()?, &body)?;
        let payload = self.transport.execute(request).await?.into_body()?;

        let response = serde_json::from_slice::<ApiTokenResponse>(&payload)
            .map_err(|error| ApiError::Decoding(format!("invalid token payload: {error}")))?;
        debug!(token_type = %response.token_type, "token endpoint returned a credential");
        Ok(response.into_token(Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::http::testing::ScriptedTransport;

    fn client(transport: Arc<ScriptedTransport>) -> AuthClient {
        AuthClient::new(ApiConfig::default(), transport)
    }

    #[tokio::test]
    async fn refresh_posts_grant_and_decodes_epoch_seconds() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(
            200,
            serde_json::json!({
                "access_token": "new-access",
                "token_type": "bearer",
                "expires_in": 3600,
                "refresh_token": "new-refresh",
                "created_at": 1_767_225_600
            }),
        );

        let token = client(Arc::clone(&transport))
            .refresh("old-refresh")
            .await
            .expect("refresh token");

        assert_eq!(token.auth, "new-access");
        assert_eq!(token.refresh, "new-refresh");
        let issued = DateTime::from_timestamp(1_767_225_600, 0).expect("timestamp");
        assert_eq!(token.valid_until, issued + Duration::seconds(3600));

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, reqwest::Method::POST);
        assert_eq!(
            requests[0].url.as_str(),
            "https://auth.tesla.com/oauth2/v3/token"
        );
        let body: serde_json::Value =
            serde_json::from_slice(requests[0].body.as_deref().expect("body")).expect("json body");
        assert_eq!(body["grant_type"], "refresh_token");
        assert_eq!(body["client_id"], "ownerapi");
        assert_eq!(body["refresh_token"], "old-refresh");
        assert_eq!(body["scope"], "openid email offline_access");
    }

    #[tokio::test]
    async fn missing_created_at_counts_as_issued_now() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(
            200,
            serde_json::json!({
                "access_token": "a",
                "token_type": "bearer",
                "expires_in": 300,
                "refresh_token": "r"
            }),
        );

        let before = Utc::now();
        let token = client(transport).refresh("r").await.expect("refresh");
        let after = Utc::now();

        assert!(token.valid_until >= before + Duration::seconds(300));
        assert!(token.valid_until <= after + Duration::seconds(300));
    }

    #[tokio::test]
    async fn exchange_sends_code_and_verifier() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(
            200,
            serde_json::json!({
                "access_token": "a",
                "token_type": "bearer",
                "expires_in": 300,
                "refresh_token": "r",
                "created_at": 1_767_225_600
            }),
        );

        client(Arc::clone(&transport))
            .exchange_code("the-code", "the-verifier")
            .await
            .expect("exchange");

        let requests = transport.requests();
        let body: serde_json::Value =
            serde_json::from_slice(requests[0].body.as_deref().expect("body")).expect("json body");
        assert_eq!(body["grant_type"], "authorization_code");
        assert_eq!(body["code"], "the-code");
        assert_eq!(body["code_verifier"], "the-verifier");
        assert_eq!(body["redirect_uri"], "https://auth.tesla.com/void/callback");
    }

    #[tokio::test]
    async fn malformed_token_payload_is_a_decoding_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(200, serde_json::json!({ "access_token": "only" }));

        let result = client(transport).refresh("r").await;
        assert!(matches!(result, Err(ApiError::Decoding(_))));
    }

    #[tokio::test]
    async fn token_endpoint_http_errors_propagate() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(400, serde_json::json!({ "error": "invalid_grant" }));

        let result = client(transport).refresh("r").await;
        assert_eq!(result, Err(ApiError::HttpError(400)));
    }
}
