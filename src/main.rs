use family_office::{
    client::BackendClient,
    config::{database, platform::PlatformConfig, settings},
    core::{goals::Goals, stocks::Stocks},
    errors::{Error, Result},
    hooks::DataContext,
};
use dotenvy::dotenv;
use std::{env, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Load cache and realtime settings
    let settings = settings::load_default_settings()
        .inspect_err(|e| error!("Failed to load settings: {}", e))?;

    // 4. Provision tables when a direct database connection is configured
    if env::var("DATABASE_URL").is_ok() {
        let db = database::create_connection().await?;
        database::create_tables(&db)
            .await
            .inspect(|_| info!("Database schema is up to date."))
            .inspect_err(|e| error!("Failed to provision tables: {}", e))?;
    }

    // 5. Sign in
    let client = Arc::new(BackendClient::from_config(
        PlatformConfig::from_env(),
        settings.realtime.clone(),
    ));
    let email = env::var("FAMILY_OFFICE_EMAIL").map_err(Error::from)?;
    let password = env::var("FAMILY_OFFICE_PASSWORD").map_err(Error::from)?;
    let session = client
        .sign_in(&email, &password)
        .await
        .inspect_err(|e| error!("Sign-in failed: {}", e))?;
    info!("Signed in as {}", session.owner());

    // 6. Warm the cache
    let ctx = DataContext::new(client, &settings);
    let summary = ctx.query_portfolio_summary().data().await?;
    info!(
        "Portfolio: invested {:.2}, current {:.2}, P/L {:.2} ({:.2}%)",
        summary.total_investment,
        summary.total_current_value,
        summary.total_profit_loss,
        summary.profit_loss_percentage
    );
    let net_worth = ctx.query_net_worth().data().await?;
    info!(
        "Net worth {:.2} ({:.2} assets, {:.2} liabilities)",
        net_worth.net_worth, net_worth.total_assets, net_worth.total_liabilities
    );

    // 7. Follow live changes until interrupted
    let mut stocks = ctx.live::<Stocks>().await?;
    let mut goals = ctx.live::<Goals>().await?;
    loop {
        tokio::select! {
            Some(event) = stocks.recv() => {
                info!("{:?} on stock {}", event.event_type, event.id);
            }
            Some(event) = goals.recv() => {
                info!("{:?} on goal {}", event.event_type, event.id);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down.");
                break;
            }
        }
    }

    ctx.sign_out().await
}
