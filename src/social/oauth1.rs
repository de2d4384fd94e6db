//! OAuth 1.0a request signing (RFC 5849, HMAC-SHA1), as used by Twitter's
//! three-legged flow.

use base64::Engine;
use hmac::{Hmac, Mac};
use rand::{Rng, distr::Alphanumeric};
use sha1::Sha1;
use url::Url;

type HmacSha1 = Hmac<Sha1>;

/// RFC 3986 percent-encoding: only `A-Z a-z 0-9 - . _ ~` pass through.
pub fn encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

/// Consumer credentials plus the (optional) token currently held.
#[derive(Debug, Clone)]
pub struct OAuth1Signer {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub token: Option<String>,
    pub token_secret: Option<String>,
}

impl OAuth1Signer {
    pub fn new(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            token: None,
            token_secret: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>, secret: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self.token_secret = Some(secret.into());
        self
    }

    /// Build the `Authorization: OAuth ...` header value for a request.
    ///
    /// `protocol_extra` carries additional `oauth_*` parameters such as
    /// `oauth_callback` or `oauth_verifier`; `body` carries form parameters
    /// that are sent in the request body and therefore signed too.
    pub fn authorization(
        &self,
        method: &str,
        url: &Url,
        protocol_extra: &[(&str, &str)],
        body: &[(&str, &str)],
        nonce: &str,
        timestamp: i64,
    ) -> String {
        let timestamp = timestamp.to_string();
        let mut oauth: Vec<(String, String)> = vec![
            ("oauth_consumer_key".into(), self.consumer_key.clone()),
            ("oauth_nonce".into(), nonce.to_string()),
            ("oauth_signature_method".into(), "HMAC-SHA1".into()),
            ("oauth_timestamp".into(), timestamp),
            ("oauth_version".into(), "1.0".into()),
        ];
        if let Some(token) = &self.token {
            oauth.push(("oauth_token".into(), token.clone()));
        }
        oauth.extend(
            protocol_extra
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );

        let mut signed: Vec<(String, String)> = oauth.clone();
        signed.extend(body.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        let base = signature_base_string(method, url, &signed);
        let signature = self.sign(&base);
        oauth.push(("oauth_signature".into(), signature));

        oauth.sort();
        let fields = oauth
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
            .collect::<Vec<_>>()
            .join(", ");
        format!("OAuth {fields}")
    }

    /// HMAC-SHA1 over the base string, keyed by `consumer_secret&token_secret`.
    pub fn sign(&self, base_string: &str) -> String {
        let key = format!(
            "{}&{}",
            encode(&self.consumer_secret),
            encode(self.token_secret.as_deref().unwrap_or(""))
        );
        let mut mac =
            HmacSha1::new_from_slice(key.as_bytes()).expect("HMAC accepts keys of any length");
        mac.update(base_string.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }
}

/// `METHOD&enc(base_uri)&enc(normalized_params)`; query parameters of `url`
/// are folded into the parameter set.
pub fn signature_base_string(method: &str, url: &Url, params: &[(String, String)]) -> String {
    let mut all: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    all.extend(params.iter().cloned());

    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        encode(&base_string_uri(url)),
        encode(&normalize_params(&all))
    )
}

/// Scheme and host lowercased, default port dropped, no query or fragment.
pub fn base_string_uri(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{}:{}{}", url.scheme(), host, port, url.path()),
        None => format!("{}://{}{}", url.scheme(), host, url.path()),
    }
}

/// Encode every name and value, sort by name then value, join with `&`.
pub fn normalize_params(params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (encode(k), encode(v)))
        .collect();
    encoded.sort();
    encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn fresh_nonce() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}
