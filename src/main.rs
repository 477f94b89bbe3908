use anyhow::{Context, Result};
use std::sync::Arc;

use weatherdash::web::{self, AppState};
use weatherdash::{OpenWeatherClient, WeatherDashConfig, WeatherService, WeatherStore, database, logging};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before anything reads the environment
    let _ = dotenvy::dotenv();

    let config = WeatherDashConfig::load().context("Failed to load configuration")?;
    logging::init(&config.logging)?;
    tracing::info!("Starting weatherdash v{}", weatherdash::VERSION);

    let pool = database::create_pool(&config.database)
        .await
        .context("Failed to open database")?;
    database::migrate(&pool)
        .await
        .context("Failed to run database migrations")?;

    let client = OpenWeatherClient::new(&config.provider)?;
    let store = WeatherStore::new(pool);
    let service = WeatherService::new(Arc::new(client), store, &config.cache)
        .with_history_limit(config.provider.max_history_days);

    let state = AppState::new(service)?;
    web::run(state, &config.server).await?;
    Ok(())
}
