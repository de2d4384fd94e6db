use crate::db::SocialAccount;
use crate::middleware::auth::RequireKeyAuth;
use crate::router::AppState;
use crate::social::{Provider, RequestToken};
use crate::VetdeskError;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use oauth2::{AuthorizationCode, CsrfToken, PkceCodeChallenge, PkceCodeVerifier};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use time::Duration;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct AuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub oauth_token: Option<String>,
    pub oauth_verifier: Option<String>,
    pub denied: Option<String>,
}

/// Body of `POST /oauth/{provider}/exchange`, used when the front end ran
/// the consent popup itself and relays what the provider handed back.
#[derive(Debug, Deserialize)]
pub struct ExchangeRequest {
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub oauth_token: Option<String>,
    pub oauth_token_secret: Option<String>,
    pub oauth_verifier: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AccountsQuery {
    pub provider: Option<String>,
}

const CSRF_COOKIE: &str = "oauth_csrf_token";
const PKCE_COOKIE: &str = "oauth_pkce_verifier";
const PROVIDER_COOKIE: &str = "oauth_provider";
const TWITTER_TOKEN_COOKIE: &str = "oauth1_request_token";
const TWITTER_SECRET_COOKIE: &str = "oauth1_request_secret";

const SESSION_COOKIES: [&str; 5] = [
    CSRF_COOKIE,
    PKCE_COOKIE,
    PROVIDER_COOKIE,
    TWITTER_TOKEN_COOKIE,
    TWITTER_SECRET_COOKIE,
];

/// GET /oauth/{provider}/authorize -> redirects to the provider's consent page.
pub async fn oauth_authorize(
    _auth: RequireKeyAuth,
    State(state): State<AppState>,
    Path(provider): Path<String>,
    jar: PrivateCookieJar,
) -> Result<Response, VetdeskError> {
    let provider: Provider = provider.parse()?;
    let secure = !state.insecure_cookie;

    if provider.is_oauth1() {
        let (request_token, auth_url) = state.social.begin_twitter().await?;
        let jar = jar
            .add(build_cookie(PROVIDER_COOKIE, provider.to_string(), secure))
            .add(build_cookie(
                TWITTER_TOKEN_COOKIE,
                request_token.oauth_token,
                secure,
            ))
            .add(build_cookie(
                TWITTER_SECRET_COOKIE,
                request_token.oauth_token_secret,
                secure,
            ));
        info!(%provider, "Dispatching OAuth redirect");
        return Ok((jar, Redirect::temporary(auth_url.as_str())).into_response());
    }

    let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
    let (auth_url, csrf_token) = state.social.authorize_url(provider, challenge)?;
    let jar = store_oauth_cookies(jar, provider, &csrf_token, verifier.secret(), secure);

    info!(%provider, "Dispatching OAuth redirect");
    Ok((jar, Redirect::temporary(auth_url.as_str())).into_response())
}

/// GET /oauth/{provider}/callback -> completes the flow started by `oauth_authorize`.
pub async fn oauth_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<AuthCallbackQuery>,
    jar: PrivateCookieJar,
) -> Response {
    let provider: Provider = match provider.parse() {
        Ok(p) => p,
        Err(err) => return respond_with_error(clear_oauth_cookies(jar), err),
    };

    let session = match load_oauth_session(&jar, provider) {
        Ok(session) => session,
        Err(err) => return respond_with_error(clear_oauth_cookies(jar), err),
    };
    let jar = clear_oauth_cookies(jar);

    let outcome = match session {
        OauthSession::Oauth2 { csrf, pkce } => {
            oauth2_callback(&state, provider, &query, &csrf, pkce).await
        }
        OauthSession::Twitter(request_token) => {
            twitter_callback(&state, &query, &request_token).await
        }
    };

    match outcome {
        Ok(account) => {
            info!(%provider, "OAuth callback stored account");
            (jar, Json(account)).into_response()
        }
        Err(err) => respond_with_error(jar, err),
    }
}

async fn oauth2_callback(
    state: &AppState,
    provider: Provider,
    query: &AuthCallbackQuery,
    csrf_cookie: &str,
    pkce_verifier: String,
) -> Result<SocialAccount, VetdeskError> {
    if let Some(error) = query.error.as_deref() {
        let description = query.error_description.as_deref().unwrap_or("no description");
        return Err(VetdeskError::OauthFlow(format!(
            "{provider} denied authorization: {error} - {description}"
        )));
    }

    let state_param = query
        .state
        .as_deref()
        .ok_or_else(|| VetdeskError::OauthFlow("missing `state` in callback".to_string()))?;
    if !bool::from(state_param.as_bytes().ct_eq(csrf_cookie.as_bytes())) {
        return Err(VetdeskError::OauthFlow("CSRF token mismatch".to_string()));
    }

    let code = query
        .code
        .as_deref()
        .ok_or_else(|| VetdeskError::OauthFlow("missing `code` in callback".to_string()))?;

    state
        .social
        .connect_oauth2(
            provider,
            AuthorizationCode::new(code.to_owned()),
            Some(PkceCodeVerifier::new(pkce_verifier)),
            None,
        )
        .await
}

async fn twitter_callback(
    state: &AppState,
    query: &AuthCallbackQuery,
    request_token: &RequestToken,
) -> Result<SocialAccount, VetdeskError> {
    if query.denied.is_some() {
        return Err(VetdeskError::OauthFlow(
            "twitter authorization was denied".to_string(),
        ));
    }
    let token_param = query.oauth_token.as_deref().ok_or_else(|| {
        VetdeskError::OauthFlow("missing `oauth_token` in callback".to_string())
    })?;
    if !bool::from(
        token_param
            .as_bytes()
            .ct_eq(request_token.oauth_token.as_bytes()),
    ) {
        return Err(VetdeskError::OauthFlow(
            "request token mismatch".to_string(),
        ));
    }
    let verifier = query.oauth_verifier.as_deref().ok_or_else(|| {
        VetdeskError::OauthFlow("missing `oauth_verifier` in callback".to_string())
    })?;

    state.social.complete_twitter(request_token, verifier).await
}

/// POST /oauth/{provider}/exchange -> finish a flow whose redirect landed in the front end.
pub async fn oauth_exchange(
    _auth: RequireKeyAuth,
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Json(body): Json<ExchangeRequest>,
) -> Result<Json<SocialAccount>, VetdeskError> {
    let provider: Provider = provider.parse()?;

    let account = if provider.is_oauth1() {
        let (Some(oauth_token), Some(oauth_token_secret), Some(verifier)) =
            (body.oauth_token, body.oauth_token_secret, body.oauth_verifier)
        else {
            return Err(VetdeskError::validation(
                "oauth_token, oauth_token_secret and oauth_verifier are required",
            ));
        };
        let request_token = RequestToken {
            oauth_token,
            oauth_token_secret,
        };
        state.social.complete_twitter(&request_token, &verifier).await?
    } else {
        let code = body
            .code
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| VetdeskError::validation("`code` is required"))?;
        state
            .social
            .connect_oauth2(
                provider,
                AuthorizationCode::new(code),
                body.code_verifier.map(PkceCodeVerifier::new),
                body.redirect_uri.as_deref(),
            )
            .await?
    };
    Ok(Json(account))
}

/// GET /social/accounts[?provider=...]
pub async fn list_accounts(
    _auth: RequireKeyAuth,
    State(state): State<AppState>,
    Query(query): Query<AccountsQuery>,
) -> Result<Json<Vec<SocialAccount>>, VetdeskError> {
    let provider = query
        .provider
        .as_deref()
        .map(str::parse::<Provider>)
        .transpose()?;
    Ok(Json(state.storage.list_social_accounts(provider).await?))
}

/// DELETE /social/accounts/{id}
pub async fn delete_account(
    _auth: RequireKeyAuth,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, VetdeskError> {
    state.storage.delete_social_account(id).await?;
    info!(account = id, "social account disconnected");
    Ok(StatusCode::NO_CONTENT)
}

enum OauthSession {
    Oauth2 { csrf: String, pkce: String },
    Twitter(RequestToken),
}

fn store_oauth_cookies(
    jar: PrivateCookieJar,
    provider: Provider,
    csrf: &CsrfToken,
    pkce_verifier: &str,
    secure: bool,
) -> PrivateCookieJar {
    jar.add(build_cookie(PROVIDER_COOKIE, provider.to_string(), secure))
        .add(build_cookie(CSRF_COOKIE, csrf.secret().to_string(), secure))
        .add(build_cookie(PKCE_COOKIE, pkce_verifier.to_string(), secure))
}

fn cookie_value(jar: &PrivateCookieJar, name: &str) -> Option<String> {
    jar.get(name).map(|c| c.value().to_owned())
}

fn load_oauth_session(
    jar: &PrivateCookieJar,
    provider: Provider,
) -> Result<OauthSession, VetdeskError> {
    let started_for = cookie_value(jar, PROVIDER_COOKIE)
        .ok_or_else(|| VetdeskError::OauthFlow("Missing OAuth session cookie".to_string()))?;
    if started_for != provider.as_str() {
        return Err(VetdeskError::OauthFlow(format!(
            "OAuth session was started for {started_for}, not {provider}"
        )));
    }

    if provider.is_oauth1() {
        let (Some(oauth_token), Some(oauth_token_secret)) = (
            cookie_value(jar, TWITTER_TOKEN_COOKIE),
            cookie_value(jar, TWITTER_SECRET_COOKIE),
        ) else {
            return Err(VetdeskError::OauthFlow(
                "Missing request token in cookie".to_string(),
            ));
        };
        return Ok(OauthSession::Twitter(RequestToken {
            oauth_token,
            oauth_token_secret,
        }));
    }

    let csrf = cookie_value(jar, CSRF_COOKIE)
        .ok_or_else(|| VetdeskError::OauthFlow("Missing CSRF token in cookie".to_string()))?;
    let pkce = cookie_value(jar, PKCE_COOKIE)
        .ok_or_else(|| VetdeskError::OauthFlow("Missing PKCE verifier in cookie".to_string()))?;
    Ok(OauthSession::Oauth2 { csrf, pkce })
}

fn clear_oauth_cookies(jar: PrivateCookieJar) -> PrivateCookieJar {
    SESSION_COOKIES
        .iter()
        .fold(jar, |jar, name| jar.remove(clear_cookie(name)))
}

fn build_cookie(name: &str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build(Cookie::new(name.to_string(), value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(Duration::minutes(15))
        .build()
}

fn clear_cookie(name: &str) -> Cookie<'static> {
    Cookie::build(Cookie::new(name.to_string(), ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

fn respond_with_error(jar: PrivateCookieJar, err: VetdeskError) -> Response {
    (jar, err.into_response()).into_response()
}
