use crate::social::provider::Provider;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use url::Url;

/// Process-wide configuration, resolved once on first access.
pub static CONFIG: LazyLock<Config> =
    LazyLock::new(|| Config::load().expect("FATAL: invalid vetdesk configuration"));

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub basic: BasicConfig,
    pub messaging: MessagingConfig,
    pub social: SocialConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicConfig {
    pub listen_addr: String,
    pub database_url: String,
    pub loglevel: String,
    /// Key expected on protected routes.
    pub clinic_key: String,
    pub insecure_cookie: bool,
    pub proxy: Option<Url>,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            database_url: "sqlite:vetdesk.sqlite".to_string(),
            loglevel: "info".to_string(),
            clinic_key: "pwd".to_string(),
            insecure_cookie: false,
            proxy: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    pub send_per_minute: u32,
    pub channel_capacity: usize,
    pub history_limit: i64,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            send_per_minute: 120,
            channel_capacity: 256,
            history_limit: 50,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthAppConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl OAuthAppConfig {
    /// Every field is needed: the redirect URI goes into both the consent
    /// URL and the token request.
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty()
            && !self.client_secret.is_empty()
            && !self.redirect_uri.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TwitterAppConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub callback_url: String,
}

impl TwitterAppConfig {
    pub fn is_configured(&self) -> bool {
        !self.consumer_key.is_empty() && !self.consumer_secret.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialConfig {
    pub google: OAuthAppConfig,
    pub youtube: OAuthAppConfig,
    pub facebook: OAuthAppConfig,
    pub instagram: OAuthAppConfig,
    pub linkedin: OAuthAppConfig,
    pub twitter: TwitterAppConfig,
}

impl SocialConfig {
    /// OAuth 2.0 app settings; `None` for Twitter, which signs with OAuth 1.0a.
    pub fn oauth2_app(&self, provider: Provider) -> Option<&OAuthAppConfig> {
        match provider {
            Provider::Google => Some(&self.google),
            Provider::Youtube => Some(&self.youtube),
            Provider::Facebook => Some(&self.facebook),
            Provider::Instagram => Some(&self.instagram),
            Provider::Linkedin => Some(&self.linkedin),
            Provider::Twitter => None,
        }
    }
}

impl Config {
    /// Defaults, then `config.toml`, then `VETDESK_*` environment variables.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("config.toml"))
            .merge(Env::prefixed("VETDESK_").split("__"))
    }

    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }
}
