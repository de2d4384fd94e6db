use crate::config::TwitterAppConfig;
use crate::error::VetdeskError;
use crate::social::oauth1::{OAuth1Signer, fresh_nonce};
use crate::social::provider::{Provider, TwitterEndpoints};
use crate::social::upstream::UpstreamBody;
use chrono::Utc;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::collections::HashMap;
use tracing::info;
use url::Url;

/// Temporary credentials from the request-token step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestToken {
    pub oauth_token: String,
    pub oauth_token_secret: String,
}

/// Token credentials for a connected Twitter account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwitterAccess {
    pub oauth_token: String,
    pub oauth_token_secret: String,
    pub user_id: String,
    pub screen_name: Option<String>,
}

/// Stateless OAuth 1.0a calls against Twitter.
pub struct TwitterOauth;

impl TwitterOauth {
    /// Step 1: obtain temporary credentials bound to `callback_url`.
    pub async fn request_token(
        endpoints: &TwitterEndpoints,
        app: &TwitterAppConfig,
        http_client: &reqwest::Client,
    ) -> Result<RequestToken, VetdeskError> {
        let url = Url::parse(&endpoints.request_token_url)?;
        let signer = OAuth1Signer::new(&app.consumer_key, &app.consumer_secret);
        let callback = if app.callback_url.is_empty() {
            "oob"
        } else {
            app.callback_url.as_str()
        };
        let header = signer.authorization(
            "POST",
            &url,
            &[("oauth_callback", callback)],
            &[],
            &fresh_nonce(),
            Utc::now().timestamp(),
        );

        let fields = post_signed(http_client, url, header, "request token").await?;
        if fields.get("oauth_callback_confirmed").map(String::as_str) != Some("true") {
            return Err(VetdeskError::OauthFlow(
                "twitter did not confirm the callback URL".to_string(),
            ));
        }
        Ok(RequestToken {
            oauth_token: required(&fields, "oauth_token", "request token")?,
            oauth_token_secret: required(&fields, "oauth_token_secret", "request token")?,
        })
    }

    /// Step 2: where to send the user to approve the request token.
    pub fn authorize_url(
        endpoints: &TwitterEndpoints,
        request_token: &RequestToken,
    ) -> Result<Url, VetdeskError> {
        let mut url = Url::parse(&endpoints.authorize_url)?;
        url.query_pairs_mut()
            .append_pair("oauth_token", &request_token.oauth_token);
        Ok(url)
    }

    /// Step 3: trade the approved request token and verifier for token credentials.
    pub async fn access_token(
        endpoints: &TwitterEndpoints,
        app: &TwitterAppConfig,
        request_token: &RequestToken,
        verifier: &str,
        http_client: &reqwest::Client,
    ) -> Result<TwitterAccess, VetdeskError> {
        let url = Url::parse(&endpoints.access_token_url)?;
        let signer = OAuth1Signer::new(&app.consumer_key, &app.consumer_secret).with_token(
            &request_token.oauth_token,
            &request_token.oauth_token_secret,
        );
        let header = signer.authorization(
            "POST",
            &url,
            &[("oauth_verifier", verifier)],
            &[],
            &fresh_nonce(),
            Utc::now().timestamp(),
        );

        let fields = post_signed(http_client, url, header, "access token").await?;
        let access = TwitterAccess {
            oauth_token: required(&fields, "oauth_token", "access token")?,
            oauth_token_secret: required(&fields, "oauth_token_secret", "access token")?,
            user_id: required(&fields, "user_id", "access token")?,
            screen_name: fields.get("screen_name").cloned(),
        };
        info!(user_id = %access.user_id, "twitter access token obtained");
        Ok(access)
    }
}

async fn post_signed(
    http_client: &reqwest::Client,
    url: Url,
    authorization: String,
    stage: &'static str,
) -> Result<HashMap<String, String>, VetdeskError> {
    let resp = http_client
        .post(url)
        .header(AUTHORIZATION, authorization)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .send()
        .await?;
    let upstream = UpstreamBody::read(resp).await?;
    if !upstream.status.is_success() {
        return Err(upstream.into_error(Provider::Twitter, stage));
    }
    Ok(parse_form(&upstream.text))
}

pub fn parse_form(body: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(body.trim().as_bytes())
        .into_owned()
        .collect()
}

fn required(
    fields: &HashMap<String, String>,
    key: &str,
    stage: &'static str,
) -> Result<String, VetdeskError> {
    fields
        .get(key)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| VetdeskError::Provider {
            provider: Provider::Twitter,
            stage,
            status: 200,
            code: "invalid_response".to_string(),
            description: format!("missing `{key}` in response"),
        })
}
