//! Standalone poll loop for deployments that run the API without
//! `INTERNAL_TICKER`. Reads the same environment as the server.

use color_eyre::eyre::Result;
use dotenv::dotenv;
use liveclass_api::config::ApiConfig;
use liveclass_api::ticker::Ticker;
use liveclass_db::{create_pool, schema::initialize_database};
use tracing::info;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    dotenv().ok();

    let config = ApiConfig::from_env()?;

    let subscriber = FmtSubscriber::builder().with_max_level(config.log_level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let db_pool = create_pool(&config.database_url).await?;
    initialize_database(&db_pool).await?;

    let engine = liveclass_api::build_engine(&config, db_pool)?;
    let ticker = Ticker::new(engine, config.sweep_interval);

    tokio::select! {
        _ = ticker.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutting down session ticker");
        }
    }

    Ok(())
}
