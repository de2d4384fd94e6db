use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use vetdesk::social::{Provider, SocialService};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = &*vetdesk::config::CONFIG;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.basic.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database_url = %cfg.basic.database_url,
        proxy = %cfg.basic.proxy.as_ref().map(|u| u.as_str()).unwrap_or("<none>"),
        loglevel = %cfg.basic.loglevel,
        send_per_minute = cfg.messaging.send_per_minute,
    );
    if cfg.basic.clinic_key == "pwd" {
        warn!("clinic_key is the default value; set VETDESK_BASIC__CLINIC_KEY");
    }

    for provider in Provider::ALL {
        let configured = match cfg.social.oauth2_app(provider) {
            Some(app) => app.is_configured(),
            None => cfg.social.twitter.is_configured(),
        };
        if !configured {
            info!(%provider, "social provider not configured");
        }
    }

    let storage = vetdesk::db::Storage::connect(&cfg.basic.database_url).await?;
    let bus =
        vetdesk::service::message_bus::spawn(storage.clone(), cfg.messaging.channel_capacity)
            .await?;
    let social = SocialService::new(
        cfg.social.clone(),
        storage.clone(),
        cfg.basic.proxy.as_ref(),
    )?;

    let state = vetdesk::AppState::new(storage, bus, social, &cfg.basic, &cfg.messaging);
    let app = vetdesk::vetdesk_router(state);

    let listener = TcpListener::bind(&cfg.basic.listen_addr).await?;
    info!("HTTP server listening on {}", cfg.basic.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
    }
}
