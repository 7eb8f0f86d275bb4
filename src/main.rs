mod config;
mod entrypoint;
mod error;
mod handlers;
mod models;
mod network;
mod postprocess;
mod preprocess;
mod service;
#[cfg(test)]
mod testutil;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::Cli;
use crate::handlers::AppState;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let context = cli.handler_context();
    tracing::info!(
        model = context.model_name(),
        model_dir = %context.system_properties.model_dir.display(),
        gpu_id = ?context.system_properties.gpu_id,
        "model will be loaded on the first request"
    );

    let state = web::Data::new(AppState {
        handler: &entrypoint::PRETRAINED_RESNET,
        context,
    });

    let (host, port) = cli.bind_addr();
    tracing::info!("Server running at http://{}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .configure(handlers::configure)
    })
    .bind((host, port))?
    .run()
    .await?;

    Ok(())
}
