mod common;

use axum::{
    Form, Json, Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use common::{CLINIC_KEY, TempDb, body_json, build_state, get_request, json_request, test_config};
use serde_json::json;
use std::collections::HashMap;
use tokio::net::TcpListener;
use tower::ServiceExt;
use vetdesk::social::{Provider, ProviderEndpoints, SocialService, TwitterEndpoints};

async fn fake_token(Form(form): Form<HashMap<String, String>>) -> Response {
    if form.get("client_secret").map(String::as_str) != Some("fb-secret") {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"message": "bad client", "type": "OAuthException", "code": 1}})),
        )
            .into_response();
    }
    match form.get("code").map(String::as_str) {
        Some("expired") => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": {
                    "message": "This authorization code has expired.",
                    "type": "OAuthException",
                    "code": 100
                }
            })),
        )
            .into_response(),
        _ => Json(json!({
            "access_token": "fb-token-123",
            "token_type": "bearer",
            "expires_in": 5183944
        }))
        .into_response(),
    }
}

async fn fake_profile(headers: HeaderMap) -> Response {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if bearer != Some("Bearer fb-token-123") {
        return (StatusCode::UNAUTHORIZED, "no token").into_response();
    }
    Json(json!({"id": "1020", "name": "Happy Paws"})).into_response()
}

fn oauth1_header_ok(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| {
            v.starts_with("OAuth ")
                && v.contains("oauth_consumer_key=\"tw-key\"")
                && v.contains("oauth_signature_method=\"HMAC-SHA1\"")
                && v.contains("oauth_signature=\"")
        })
}

async fn fake_request_token(headers: HeaderMap) -> Response {
    if !oauth1_header_ok(&headers) {
        return (StatusCode::UNAUTHORIZED, "Could not authenticate you.").into_response();
    }
    "oauth_token=req-token&oauth_token_secret=req-secret&oauth_callback_confirmed=true"
        .into_response()
}

async fn fake_access_token(headers: HeaderMap) -> Response {
    let signed_with_request_token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("oauth_token=\"req-token\"") && v.contains("oauth_verifier=\"pin-42\""));
    if !oauth1_header_ok(&headers) || !signed_with_request_token {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"errors": [{"code": 32, "message": "Could not authenticate you."}]})),
        )
            .into_response();
    }
    "oauth_token=acc-token&oauth_token_secret=acc-secret&user_id=6253282&screen_name=happypaws"
        .into_response()
}

/// Serve a fake provider on an ephemeral port and return its base URL.
async fn spawn_fake_provider() -> String {
    let app = Router::new()
        .route("/token", post(fake_token))
        .route("/me", get(fake_profile))
        .route("/oauth/request_token", post(fake_request_token))
        .route("/oauth/access_token", post(fake_access_token));
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind fake provider");
    let addr = listener.local_addr().expect("no local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

async fn app_with_fake_provider(db: &TempDb) -> Router {
    let base = spawn_fake_provider().await;
    let mut cfg = test_config();
    cfg.social.facebook.client_id = "fb-id".to_string();
    cfg.social.facebook.client_secret = "fb-secret".to_string();
    cfg.social.facebook.redirect_uri = "http://clinic.test/oauth/facebook/callback".to_string();
    cfg.social.twitter.consumer_key = "tw-key".to_string();
    cfg.social.twitter.consumer_secret = "tw-secret".to_string();
    cfg.social.twitter.callback_url = "http://clinic.test/oauth/twitter/callback".to_string();

    let social = SocialService::new(cfg.social.clone(), db.storage.clone(), None)
        .expect("failed to build social service")
        .with_endpoints(
            Provider::Facebook,
            ProviderEndpoints {
                auth_url: format!("{base}/dialog/oauth"),
                token_url: format!("{base}/token"),
                profile_url: format!("{base}/me"),
                scopes: vec!["pages_show_list".to_string()],
                offline_access: false,
            },
        )
        .with_twitter_endpoints(TwitterEndpoints {
            request_token_url: format!("{base}/oauth/request_token"),
            authorize_url: format!("{base}/oauth/authorize"),
            access_token_url: format!("{base}/oauth/access_token"),
        });
    let state = build_state(db, &cfg, social).await;
    vetdesk::vetdesk_router(state)
}

#[tokio::test]
async fn exchange_stores_account_without_leaking_tokens() {
    let db = TempDb::new("oauth-exchange").await;
    let app = app_with_fake_provider(&db).await;

    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/oauth/facebook/exchange",
            json!({"code": "good-code"}),
        ))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);
    let account = body_json(resp).await;
    assert_eq!(account["provider"], "facebook");
    assert_eq!(account["account_id"], "1020");
    assert_eq!(account["display_name"], "Happy Paws");
    assert!(account.get("access_token").is_none());

    let stored = db
        .storage
        .list_social_accounts(Some(Provider::Facebook))
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].access_token, "fb-token-123");
    assert!(stored[0].expires_at.is_some());

    let resp = app
        .oneshot(get_request("/social/accounts"))
        .await
        .expect("request failed");
    assert_eq!(body_json(resp).await.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn exchange_failure_surfaces_upstream_code() {
    let db = TempDb::new("oauth-exchange-error").await;
    let app = app_with_fake_provider(&db).await;

    let resp = app
        .oneshot(json_request(
            "POST",
            "/oauth/facebook/exchange",
            json!({"code": "expired"}),
        ))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(resp).await;
    assert_eq!(body["error"]["code"], "OAuthException");
    let message = body["error"]["message"].as_str().unwrap_or_default();
    assert!(message.contains("token exchange"));
    assert!(message.contains("This authorization code has expired."));
    assert!(
        db.storage
            .list_social_accounts(None)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn app_without_redirect_uri_is_not_configured() {
    let db = TempDb::new("oauth-no-redirect").await;
    let mut cfg = test_config();
    cfg.social.youtube.client_id = "yt-id".to_string();
    cfg.social.youtube.client_secret = "yt-secret".to_string();
    let social = SocialService::new(cfg.social.clone(), db.storage.clone(), None)
        .expect("failed to build social service");
    let app = vetdesk::vetdesk_router(build_state(&db, &cfg, social).await);

    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/oauth/youtube/exchange",
            json!({"code": "abc", "redirect_uri": "http://clinic.test/popup"}),
        ))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(resp).await["error"]["code"], "NOT_CONFIGURED");

    let resp = app
        .oneshot(get_request("/oauth/youtube/authorize"))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn unconfigured_and_unknown_providers_are_rejected() {
    let db = TempDb::new("oauth-unconfigured").await;
    let app = app_with_fake_provider(&db).await;

    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/oauth/google/exchange",
            json!({"code": "abc"}),
        ))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(resp).await["error"]["code"], "NOT_CONFIGURED");

    let resp = app
        .oneshot(json_request(
            "POST",
            "/oauth/myspace/exchange",
            json!({"code": "abc"}),
        ))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

fn session_cookies(resp: &Response) -> String {
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .collect::<Vec<_>>()
        .join("; ")
}

#[tokio::test]
async fn authorize_then_callback_round_trip() {
    let db = TempDb::new("oauth-callback").await;
    let app = app_with_fake_provider(&db).await;

    let resp = app
        .clone()
        .oneshot(get_request("/oauth/facebook/authorize"))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = resp
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("missing Location")
        .to_string();
    let location = url::Url::parse(&location).expect("Location is not a URL");
    assert!(location.path().ends_with("/dialog/oauth"));
    let params: HashMap<String, String> = location.query_pairs().into_owned().collect();
    assert_eq!(params["client_id"], "fb-id");
    assert_eq!(params["code_challenge_method"], "S256");
    let csrf = params["state"].clone();
    let cookies = session_cookies(&resp);
    assert!(!cookies.is_empty());

    let forged = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/oauth/facebook/callback?code=good-code&state=forged")
                .header(header::COOKIE, cookies.as_str())
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_eq!(forged.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(forged).await["error"]["code"], "OAUTH_FLOW");

    let resp = app
        .oneshot(
            Request::builder()
                .uri(format!("/oauth/facebook/callback?code=good-code&state={csrf}"))
                .header(header::COOKIE, cookies.as_str())
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["account_id"], "1020");
}

#[tokio::test]
async fn callback_without_session_is_rejected() {
    let db = TempDb::new("oauth-no-session").await;
    let app = app_with_fake_provider(&db).await;

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/oauth/facebook/callback?code=good-code&state=x")
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn twitter_three_legged_flow() {
    let db = TempDb::new("oauth-twitter").await;
    let app = app_with_fake_provider(&db).await;

    let resp = app
        .clone()
        .oneshot(get_request("/oauth/twitter/authorize"))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = resp
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(location.ends_with("/oauth/authorize?oauth_token=req-token"));
    let cookies = session_cookies(&resp);

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/oauth/twitter/callback?oauth_token=req-token&oauth_verifier=pin-42")
                .header(header::COOKIE, cookies.as_str())
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);
    let account = body_json(resp).await;
    assert_eq!(account["provider"], "twitter");
    assert_eq!(account["account_id"], "6253282");
    assert_eq!(account["display_name"], "happypaws");

    let stored = db
        .storage
        .list_social_accounts(Some(Provider::Twitter))
        .await
        .unwrap();
    assert_eq!(stored[0].access_token, "acc-token");
    assert_eq!(stored[0].token_secret.as_deref(), Some("acc-secret"));

    let resp = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/social/accounts/{}", stored[0].id))
                .header("x-api-key", CLINIC_KEY)
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn twitter_exchange_with_wrong_verifier_reports_upstream_error() {
    let db = TempDb::new("oauth-twitter-error").await;
    let app = app_with_fake_provider(&db).await;

    let resp = app
        .oneshot(json_request(
            "POST",
            "/oauth/twitter/exchange",
            json!({
                "oauth_token": "req-token",
                "oauth_token_secret": "req-secret",
                "oauth_verifier": "wrong"
            }),
        ))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(resp).await;
    assert_eq!(body["error"]["code"], "32");
}
