use crate::error::VetdeskError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
pub const YOUTUBE_CHANNELS_URL: &str =
    "https://www.googleapis.com/youtube/v3/channels?part=snippet&mine=true";
pub const FACEBOOK_AUTH_URL: &str = "https://www.facebook.com/v19.0/dialog/oauth";
pub const FACEBOOK_TOKEN_URL: &str = "https://graph.facebook.com/v19.0/oauth/access_token";
pub const FACEBOOK_ME_URL: &str = "https://graph.facebook.com/v19.0/me?fields=id,name";
pub const INSTAGRAM_AUTH_URL: &str = "https://api.instagram.com/oauth/authorize";
pub const INSTAGRAM_TOKEN_URL: &str = "https://api.instagram.com/oauth/access_token";
pub const INSTAGRAM_ME_URL: &str = "https://graph.instagram.com/me?fields=id,username";
pub const LINKEDIN_AUTH_URL: &str = "https://www.linkedin.com/oauth/v2/authorization";
pub const LINKEDIN_TOKEN_URL: &str = "https://www.linkedin.com/oauth/v2/accessToken";
pub const LINKEDIN_USERINFO_URL: &str = "https://api.linkedin.com/v2/userinfo";
pub const TWITTER_REQUEST_TOKEN_URL: &str = "https://api.twitter.com/oauth/request_token";
pub const TWITTER_AUTHORIZE_URL: &str = "https://api.twitter.com/oauth/authorize";
pub const TWITTER_ACCESS_TOKEN_URL: &str = "https://api.twitter.com/oauth/access_token";

/// Social platforms the clinic can connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "social_provider", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Youtube,
    Facebook,
    Instagram,
    Linkedin,
    Twitter,
}

impl Provider {
    pub const ALL: [Provider; 6] = [
        Provider::Google,
        Provider::Youtube,
        Provider::Facebook,
        Provider::Instagram,
        Provider::Linkedin,
        Provider::Twitter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Youtube => "youtube",
            Provider::Facebook => "facebook",
            Provider::Instagram => "instagram",
            Provider::Linkedin => "linkedin",
            Provider::Twitter => "twitter",
        }
    }

    /// Twitter still runs the signed OAuth 1.0a flow.
    pub fn is_oauth1(&self) -> bool {
        matches!(self, Provider::Twitter)
    }

    /// Fixed OAuth 2.0 endpoints; `None` for OAuth 1.0a providers.
    pub fn endpoints(&self) -> Option<ProviderEndpoints> {
        let (auth_url, token_url, profile_url, scopes): (_, _, _, &[&str]) = match self {
            Provider::Google => (
                GOOGLE_AUTH_URL,
                GOOGLE_TOKEN_URL,
                GOOGLE_USERINFO_URL,
                &["openid", "email", "profile"],
            ),
            Provider::Youtube => (
                GOOGLE_AUTH_URL,
                GOOGLE_TOKEN_URL,
                YOUTUBE_CHANNELS_URL,
                &["https://www.googleapis.com/auth/youtube.readonly"],
            ),
            Provider::Facebook => (
                FACEBOOK_AUTH_URL,
                FACEBOOK_TOKEN_URL,
                FACEBOOK_ME_URL,
                &["public_profile", "pages_show_list"],
            ),
            Provider::Instagram => (
                INSTAGRAM_AUTH_URL,
                INSTAGRAM_TOKEN_URL,
                INSTAGRAM_ME_URL,
                &["user_profile", "user_media"],
            ),
            Provider::Linkedin => (
                LINKEDIN_AUTH_URL,
                LINKEDIN_TOKEN_URL,
                LINKEDIN_USERINFO_URL,
                &["openid", "profile", "email"],
            ),
            Provider::Twitter => return None,
        };
        Some(ProviderEndpoints {
            auth_url: auth_url.to_string(),
            token_url: token_url.to_string(),
            profile_url: profile_url.to_string(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            offline_access: matches!(self, Provider::Google | Provider::Youtube),
        })
    }

    /// Where the stable account id and display name sit in the profile
    /// response. Twitter has no JSON profile step.
    pub(crate) fn profile_pointers(&self) -> Option<(&'static str, &'static str)> {
        let pointers = match self {
            Provider::Google | Provider::Linkedin => ("/sub", "/name"),
            Provider::Youtube => ("/items/0/id", "/items/0/snippet/title"),
            Provider::Facebook => ("/id", "/name"),
            Provider::Instagram => ("/id", "/username"),
            Provider::Twitter => return None,
        };
        Some(pointers)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = VetdeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| VetdeskError::UnknownProvider(s.to_string()))
    }
}

/// OAuth 2.0 endpoint set. Kept as owned strings so callers can point a
/// provider somewhere else (sandbox hosts, local fakes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub auth_url: String,
    pub token_url: String,
    pub profile_url: String,
    pub scopes: Vec<String>,
    /// Ask for a refresh token (`access_type=offline&prompt=consent`).
    pub offline_access: bool,
}

/// Twitter OAuth 1.0a endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwitterEndpoints {
    pub request_token_url: String,
    pub authorize_url: String,
    pub access_token_url: String,
}

impl Default for TwitterEndpoints {
    fn default() -> Self {
        Self {
            request_token_url: TWITTER_REQUEST_TOKEN_URL.to_string(),
            authorize_url: TWITTER_AUTHORIZE_URL.to_string(),
            access_token_url: TWITTER_ACCESS_TOKEN_URL.to_string(),
        }
    }
}
