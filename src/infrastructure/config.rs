use crate::infrastructure::error::ApiError;
use url::Url;

const DEFAULT_AUTHORIZE_ENDPOINT: &str = "https://auth.tesla.com/oauth2/v3/authorize";
const DEFAULT_TOKEN_ENDPOINT: &str = "https://auth.tesla.com/oauth2/v3/token";
const DEFAULT_REDIRECT_URI: &str = "https://auth.tesla.com/void/callback";
const DEFAULT_API_BASE: &str = "https://owner-api.teslamotors.com/";
const DEFAULT_CLIENT_ID: &str = "ownerapi";
const DEFAULT_SCOPES: [&str; 3] = ["openid", "email", "offline_access"];

/// Endpoints and OAuth client settings. Defaults point at the production
/// vendor services; everything is overridable so tests can run against a
/// scripted transport.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub authorize_endpoint: String,
    pub token_endpoint: String,
    pub api_base: String,
}

impl ApiConfig {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    pub fn scope(&self) -> String {
        self.scopes.join(" ")
    }

    pub fn api_base_url(&self) -> Result<Url, ApiError> {
        Url::parse(&self.api_base)
            .map_err(|error| ApiError::Config(format!("invalid api base url: {error}")))
    }

    pub fn authorize_url(&self) -> Result<Url, ApiError> {
        Url::parse(&self.authorize_endpoint)
            .map_err(|error| ApiError::Config(format!("invalid authorize endpoint: {error}")))
    }

    pub fn token_url(&self) -> Result<Url, ApiError> {
        Url::parse(&self.token_endpoint)
            .map_err(|error| ApiError::Config(format!("invalid token endpoint: {error}")))
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(ToString::to_string).collect(),
            authorize_endpoint: DEFAULT_AUTHORIZE_ENDPOINT.to_string(),
            token_endpoint: DEFAULT_TOKEN_ENDPOINT.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}
