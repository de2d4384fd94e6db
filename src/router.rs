use crate::config::{BasicConfig, MessagingConfig};
use crate::db::Storage;
use crate::handlers::messages::{list_thread_messages, list_threads, send_message, socket_handler};
use crate::handlers::social_oauth::{
    delete_account, list_accounts, oauth_authorize, oauth_callback, oauth_exchange,
};
use crate::middleware::auth::ClinicKey;
use crate::service::MessageBusHandle;
use crate::social::SocialService;
use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef},
    routing::{delete, get, post},
};
use axum_extra::extract::cookie::Key;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

const SEND_BODY_LIMIT: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub bus: MessageBusHandle,
    pub social: SocialService,
    pub clinic_key: Arc<str>,
    pub history_limit: i64,
    pub send_limiter: Arc<DefaultDirectRateLimiter>,
    pub insecure_cookie: bool,
    cookie_key: Key,
}

impl AppState {
    pub fn new(
        storage: Storage,
        bus: MessageBusHandle,
        social: SocialService,
        basic: &BasicConfig,
        messaging: &MessagingConfig,
    ) -> Self {
        let per_minute = NonZeroU32::new(messaging.send_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            storage,
            bus,
            social,
            clinic_key: Arc::from(basic.clinic_key.as_str()),
            history_limit: messaging.history_limit.max(1),
            send_limiter: Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))),
            insecure_cookie: basic.insecure_cookie,
            // OAuth cookies only live for one consent round trip.
            cookie_key: Key::generate(),
        }
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

impl FromRef<AppState> for ClinicKey {
    fn from_ref(state: &AppState) -> Self {
        ClinicKey(state.clinic_key.clone())
    }
}

pub fn vetdesk_router(state: AppState) -> Router {
    Router::new()
        .route("/threads", get(list_threads))
        .route("/threads/{id}/messages", get(list_thread_messages))
        .route(
            "/send",
            post(send_message).layer(DefaultBodyLimit::max(SEND_BODY_LIMIT)),
        )
        .route("/socket", get(socket_handler))
        .route("/oauth/{provider}/authorize", get(oauth_authorize))
        .route("/oauth/{provider}/callback", get(oauth_callback))
        .route("/oauth/{provider}/exchange", post(oauth_exchange))
        .route("/social/accounts", get(list_accounts))
        .route("/social/accounts/{id}", delete(delete_account))
        .with_state(state)
}
