use crate::config::{OAuthAppConfig, SocialConfig, TwitterAppConfig};
use crate::db::{NewSocialAccount, SocialAccount, Storage};
use crate::error::VetdeskError;
use crate::social::endpoints::{AccountProfile, SocialOauthEndpoints, TokenSet, id_token_claims};
use crate::social::provider::{Provider, ProviderEndpoints, TwitterEndpoints};
use crate::social::twitter::{RequestToken, TwitterOauth};
use backon::{ExponentialBuilder, Retryable};
use chrono::Utc;
use oauth2::{AuthorizationCode, CsrfToken, PkceCodeChallenge, PkceCodeVerifier};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

fn default_retry_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(1))
        .with_max_delay(Duration::from_secs(3))
        .with_max_times(3)
        .with_jitter()
}

/// Connects social accounts and persists the resulting tokens.
#[derive(Clone)]
pub struct SocialService {
    http: reqwest::Client,
    config: Arc<SocialConfig>,
    storage: Storage,
    overrides: Arc<HashMap<Provider, ProviderEndpoints>>,
    twitter: Arc<TwitterEndpoints>,
}

impl SocialService {
    /// Create a new service with a preconfigured HTTP client.
    pub fn new(
        config: SocialConfig,
        storage: Storage,
        proxy: Option<&Url>,
    ) -> Result<Self, VetdeskError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("vetdesk/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15));
        if let Some(proxy_url) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url.as_str())?);
        }
        let http = builder.build()?;

        Ok(Self {
            http,
            config: Arc::new(config),
            storage,
            overrides: Arc::new(HashMap::new()),
            twitter: Arc::new(TwitterEndpoints::default()),
        })
    }

    /// Point a provider at different endpoints, e.g. a staging tenant.
    pub fn with_endpoints(mut self, provider: Provider, endpoints: ProviderEndpoints) -> Self {
        Arc::make_mut(&mut self.overrides).insert(provider, endpoints);
        self
    }

    pub fn with_twitter_endpoints(mut self, endpoints: TwitterEndpoints) -> Self {
        self.twitter = Arc::new(endpoints);
        self
    }

    fn endpoints(&self, provider: Provider) -> Result<ProviderEndpoints, VetdeskError> {
        self.overrides
            .get(&provider)
            .cloned()
            .or_else(|| provider.endpoints())
            .ok_or_else(|| {
                VetdeskError::OauthFlow(format!("{provider} does not use OAuth 2.0"))
            })
    }

    fn oauth2_app(&self, provider: Provider) -> Result<&OAuthAppConfig, VetdeskError> {
        self.config
            .oauth2_app(provider)
            .filter(|app| app.is_configured())
            .ok_or(VetdeskError::ProviderNotConfigured(provider))
    }

    fn twitter_app(&self) -> Result<&TwitterAppConfig, VetdeskError> {
        Some(&self.config.twitter)
            .filter(|app| app.is_configured())
            .ok_or(VetdeskError::ProviderNotConfigured(Provider::Twitter))
    }

    /// Consent-page URL for an OAuth 2.0 provider plus the CSRF state to check.
    pub fn authorize_url(
        &self,
        provider: Provider,
        challenge: PkceCodeChallenge,
    ) -> Result<(Url, CsrfToken), VetdeskError> {
        let app = self.oauth2_app(provider)?;
        let endpoints = self.endpoints(provider)?;
        SocialOauthEndpoints::build_authorize_url(&endpoints, app, &app.redirect_uri, challenge)
    }

    /// Exchange an authorization code, resolve the account it belongs to
    /// and store the tokens.
    pub async fn connect_oauth2(
        &self,
        provider: Provider,
        code: AuthorizationCode,
        verifier: Option<PkceCodeVerifier>,
        redirect_uri: Option<&str>,
    ) -> Result<SocialAccount, VetdeskError> {
        let app = self.oauth2_app(provider)?;
        let endpoints = self.endpoints(provider)?;
        let redirect_uri = redirect_uri
            .filter(|r| !r.is_empty())
            .unwrap_or(app.redirect_uri.as_str());

        let issued_at = Utc::now();
        let token = SocialOauthEndpoints::exchange_authorization_code(
            provider,
            &endpoints,
            app,
            &code,
            redirect_uri,
            verifier.as_ref(),
            &self.http,
        )
        .await?;

        let profile = match profile_from_token(provider, &token) {
            Some(profile) => profile,
            None => self.fetch_profile_with_retry(provider, &endpoints, &token).await?,
        };

        let account = self
            .storage
            .upsert_social_account(NewSocialAccount {
                provider,
                account_id: profile.account_id,
                display_name: profile.display_name,
                expires_at: token.expires_at(issued_at),
                access_token: token.access_token,
                refresh_token: token.refresh_token,
                token_secret: None,
                scope: token.scope,
            })
            .await?;
        info!(%provider, account_id = %account.account_id, "social account connected");
        Ok(account)
    }

    async fn fetch_profile_with_retry(
        &self,
        provider: Provider,
        endpoints: &ProviderEndpoints,
        token: &TokenSet,
    ) -> Result<AccountProfile, VetdeskError> {
        (|| async {
            SocialOauthEndpoints::fetch_profile(
                provider,
                endpoints,
                &token.access_token,
                &self.http,
            )
            .await
        })
        .retry(default_retry_policy())
        .when(|e: &VetdeskError| e.is_retryable())
        .notify(|err, dur: Duration| {
            warn!(%provider, "profile fetch retrying after error {}, sleeping {:?}", err, dur);
        })
        .await
    }

    /// Obtain a Twitter request token and the URL the user must visit.
    pub async fn begin_twitter(&self) -> Result<(RequestToken, Url), VetdeskError> {
        let app = self.twitter_app()?;
        let request_token =
            (|| async { TwitterOauth::request_token(&self.twitter, app, &self.http).await })
                .retry(default_retry_policy())
                .when(|e: &VetdeskError| e.is_retryable())
                .notify(|err, dur: Duration| {
                    warn!("twitter request token retrying after error {}, sleeping {:?}", err, dur);
                })
                .await?;
        let url = TwitterOauth::authorize_url(&self.twitter, &request_token)?;
        Ok((request_token, url))
    }

    /// Finish the Twitter flow and store the token credentials.
    pub async fn complete_twitter(
        &self,
        request_token: &RequestToken,
        verifier: &str,
    ) -> Result<SocialAccount, VetdeskError> {
        let app = self.twitter_app()?;
        if verifier.trim().is_empty() {
            return Err(VetdeskError::OauthFlow(
                "missing `oauth_verifier`".to_string(),
            ));
        }
        let access =
            TwitterOauth::access_token(&self.twitter, app, request_token, verifier, &self.http)
                .await?;

        let account = self
            .storage
            .upsert_social_account(NewSocialAccount {
                provider: Provider::Twitter,
                account_id: access.user_id,
                display_name: access.screen_name,
                access_token: access.oauth_token,
                refresh_token: None,
                token_secret: Some(access.oauth_token_secret),
                scope: None,
                expires_at: None,
            })
            .await?;
        info!(account_id = %account.account_id, "twitter account connected");
        Ok(account)
    }
}

/// Some providers identify the account in the token response itself.
fn profile_from_token(provider: Provider, token: &TokenSet) -> Option<AccountProfile> {
    match provider {
        Provider::Google | Provider::Linkedin => {
            let claims = id_token_claims(token.id_token.as_deref()?)?;
            AccountProfile::from_json(provider, &claims)
        }
        _ => None,
    }
}
