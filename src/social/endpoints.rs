use crate::config::OAuthAppConfig;
use crate::error::VetdeskError;
use crate::social::provider::{Provider, ProviderEndpoints};
use crate::social::upstream::{UpstreamBody, scalar_at};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, CsrfToken, PkceCodeChallenge, PkceCodeVerifier,
    RedirectUrl, Scope, basic::BasicClient,
};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

/// Token endpoint response. Providers disagree on everything but
/// `access_token`, so the rest is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

impl TokenSet {
    pub fn expires_at(&self, issued_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in
            .filter(|secs| *secs > 0)
            .and_then(Duration::try_seconds)
            .and_then(|ttl| issued_at.checked_add_signed(ttl))
    }
}

/// Who the token belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountProfile {
    pub account_id: String,
    pub display_name: Option<String>,
}

impl AccountProfile {
    pub fn from_json(provider: Provider, json: &Value) -> Option<Self> {
        let (id_ptr, name_ptr) = provider.profile_pointers()?;
        let account_id = scalar_at(json, id_ptr)?;
        let display_name = scalar_at(json, name_ptr).or_else(|| scalar_at(json, "/email"));
        Some(Self {
            account_id,
            display_name,
        })
    }
}

/// Stateless OAuth 2.0 calls against a provider's endpoints.
pub struct SocialOauthEndpoints;

impl SocialOauthEndpoints {
    /// Consent-page URL plus the CSRF state to check on the callback.
    pub fn build_authorize_url(
        endpoints: &ProviderEndpoints,
        app: &OAuthAppConfig,
        redirect_uri: &str,
        challenge: PkceCodeChallenge,
    ) -> Result<(url::Url, CsrfToken), VetdeskError> {
        let client = BasicClient::new(ClientId::new(app.client_id.clone()))
            .set_auth_uri(AuthUrl::new(endpoints.auth_url.clone())?)
            .set_redirect_uri(RedirectUrl::new(redirect_uri.to_string())?);

        let mut request = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(endpoints.scopes.iter().cloned().map(Scope::new))
            .set_pkce_challenge(challenge);
        if endpoints.offline_access {
            request = request
                .add_extra_param("access_type", "offline")
                .add_extra_param("prompt", "consent");
        }
        Ok(request.url())
    }

    /// Exchange an authorization code at the provider's token endpoint.
    ///
    /// Codes are single-use, so this is never retried.
    pub async fn exchange_authorization_code(
        provider: Provider,
        endpoints: &ProviderEndpoints,
        app: &OAuthAppConfig,
        code: &AuthorizationCode,
        redirect_uri: &str,
        verifier: Option<&PkceCodeVerifier>,
        http_client: &reqwest::Client,
    ) -> Result<TokenSet, VetdeskError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", "authorization_code"),
            ("code", code.secret().as_str()),
            ("redirect_uri", redirect_uri),
            ("client_id", app.client_id.as_str()),
            ("client_secret", app.client_secret.as_str()),
        ];
        if let Some(verifier) = verifier {
            form.push(("code_verifier", verifier.secret().as_str()));
        }

        let resp = http_client
            .post(endpoints.token_url.as_str())
            .header(ACCEPT, "application/json")
            .form(&form)
            .send()
            .await?;
        let upstream = UpstreamBody::read(resp).await?;
        if !upstream.status.is_success() {
            return Err(upstream.into_error(provider, "token exchange"));
        }

        let status = upstream.status.as_u16();
        let token = upstream
            .json
            .clone()
            .and_then(|json| serde_json::from_value::<TokenSet>(json).ok())
            .ok_or_else(|| VetdeskError::Provider {
                provider,
                stage: "token exchange",
                status,
                code: "invalid_token_response".to_string(),
                description: upstream.text.clone(),
            })?;
        info!(%provider, "authorization code exchanged");
        Ok(token)
    }

    pub async fn fetch_profile(
        provider: Provider,
        endpoints: &ProviderEndpoints,
        access_token: &str,
        http_client: &reqwest::Client,
    ) -> Result<AccountProfile, VetdeskError> {
        let resp = http_client
            .get(endpoints.profile_url.as_str())
            .bearer_auth(access_token)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let upstream = UpstreamBody::read(resp).await?;
        if !upstream.status.is_success() {
            return Err(upstream.into_error(provider, "profile fetch"));
        }
        let status = upstream.status.as_u16();
        let profile = upstream
            .json
            .as_ref()
            .and_then(|json| AccountProfile::from_json(provider, json))
            .ok_or_else(|| VetdeskError::Provider {
                provider,
                stage: "profile fetch",
                status,
                code: "invalid_profile_response".to_string(),
                description: upstream.text.clone(),
            })?;
        debug!(%provider, account_id = %profile.account_id, "profile fetched");
        Ok(profile)
    }
}

/// Claims of an OpenID Connect id_token. The signature is not checked.
pub fn id_token_claims(id_token: &str) -> Option<Value> {
    let payload_b64 = id_token.split('.').nth(1)?;
    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload_b64.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice::<Value>(&decoded).ok()
}
