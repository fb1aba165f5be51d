use crate::domain::models::Token;
use crate::infrastructure::auth_client::AuthClient;
use crate::infrastructure::config::ApiConfig;
use crate::infrastructure::error::ApiError;
use crate::infrastructure::session_store::SessionStore;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use url::Url;

const VERIFIER_LENGTH: usize = 64;
const STATE_LENGTH: usize = 16;
// The unreserved characters RFC 7636 allows in a code verifier.
const VERIFIER_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// A PKCE verifier/challenge pair binding the authorization code to this
/// client: challenge = base64url(SHA-256(verifier)), unpadded.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    verifier: String,
    challenge: String,
}

impl PkceChallenge {
    pub fn generate() -> Self {
        Self::from_verifier(random_string(VERIFIER_LENGTH))
    }

    pub fn from_verifier(verifier: String) -> Self {
        let digest = Sha256::digest(verifier.as_bytes());
        let challenge = URL_SAFE_NO_PAD.encode(digest);
        Self {
            verifier,
            challenge,
        }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn challenge(&self) -> &str {
        &self.challenge
    }
}

fn random_string(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| VERIFIER_CHARSET[rng.gen_range(0..VERIFIER_CHARSET.len())] as char)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInPhase {
    Idle,
    AwaitingUser,
    ExchangingCode,
    Obtained,
    Failed,
}

/// The interactive surface (embedded browser, system webview) that presents
/// the authorize URL and resolves with the terminal redirect URL.
#[async_trait]
pub trait AuthorizeUrlHandler: Send + Sync {
    async fn authorize(&self, url: Url) -> Result<Url, ApiError>;
}

/// Drives the interactive OAuth2 authorization-code exchange: PKCE pair,
/// authorize URL, user interaction, code-for-token exchange, persistence.
pub struct SignInFlow {
    config: ApiConfig,
    auth_client: AuthClient,
    session: Arc<SessionStore>,
    phase: Mutex<SignInPhase>,
}

impl SignInFlow {
    pub fn new(config: ApiConfig, auth_client: AuthClient, session: Arc<SessionStore>) -> Self {
        Self {
            config,
            auth_client,
            session,
            phase: Mutex::new(SignInPhase::Idle),
        }
    }

    pub fn phase(&self) -> SignInPhase {
        *self
            .phase
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn sign_in(&self, handler: &dyn AuthorizeUrlHandler) -> Result<Token, ApiError> {
        let result = self.run(handler).await;
        match &result {
            Ok(_) => {
                info!("sign-in complete");
                self.set_phase(SignInPhase::Obtained);
            }
            Err(error) => {
                debug!(%error, "sign-in failed");
                self.set_phase(SignInPhase::Failed);
            }
        }
        result
    }

    async fn run(&self, handler: &dyn AuthorizeUrlHandler) -> Result<Token, ApiError> {
        let pkce = PkceChallenge::generate();
        let state = random_string(STATE_LENGTH);
        let url = self.authorization_url(&pkce, &state)?;

        self.set_phase(SignInPhase::AwaitingUser);
        let redirect = handler.authorize(url).await?;
        let code = authorization_code(&redirect).ok_or(ApiError::NotLoggedIn)?;

        self.set_phase(SignInPhase::ExchangingCode);
        let token = self.auth_client.exchange_code(&code, pkce.verifier()).await?;
        self.session.set_token(Some(token.clone()))?;
        Ok(token)
    }

    fn authorization_url(&self, pkce: &PkceChallenge, state: &str) -> Result<Url, ApiError> {
        let mut url = self.config.authorize_url()?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.scope())
            .append_pair("code_challenge", pkce.challenge())
            .append_pair("code_challenge_method", "S256")
            .append_pair("state", state);
        Ok(url)
    }

    fn set_phase(&self, phase: SignInPhase) {
        let mut guard = self
            .phase
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = phase;
    }
}

fn authorization_code(redirect: &Url) -> Option<String> {
    redirect
        .query_pairs()
        .find(|(name, _)| name == "code")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}
