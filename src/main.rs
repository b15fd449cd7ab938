mod config;
mod core;
mod error;
mod geohash;
mod handlers;
mod indexers;
mod join;
mod models;
mod mutexes;
mod persisters;
#[cfg(test)]
mod testing;

use crate::config::Config;
use crate::handlers::{routes, Settings};
use actix_web::{self, web::Data};
use indexers::GeohashIndexer;
use log::info;
use mutexes::RedisMutex;
use persisters::MongoPersister;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load()?;
    let mutex = RedisMutex::connect(redis::Client::open(config.redis_url.as_str())?, config.lock_expire, config.lock_timeout).await?;
    let indexer = GeohashIndexer::new(config.geohash_precision)?.with_boundary(config.geohash_boundary);
    let persister = MongoPersister::new(
        mongodb::Client::with_options(mongodb::options::ClientOptions::parse(&config.mongodb_url).await?)?
            .database(&config.mongodb_database),
    );
    let settings = Settings {
        fetch: config.fetch_options(),
        boundary: config.geohash_boundary,
    };

    info!("listening on {}", config.bind_address);
    actix_web::HttpServer::new(move || {
        actix_web::App::new()
            .app_data(Data::new(mutex.clone()))
            .app_data(Data::new(indexer.clone()))
            .app_data(Data::new(persister.clone()))
            .app_data(Data::new(settings))
            .configure(routes::<RedisMutex, GeohashIndexer, MongoPersister>)
    })
    .bind(&config.bind_address)?
    .run()
    .await?;
    Ok(())
}
