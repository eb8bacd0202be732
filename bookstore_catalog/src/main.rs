use std::sync::Arc;

use actix_web::{App, HttpServer};
use anyhow::Context;
use paperclip::actix::{web, OpenApiExt};
use tracing_actix_web::TracingLogger;

use bookstore_catalog::app_config::{config_app, config_user_registration};
use bookstore_catalog::catalog_repository::{
    InMemoryCatalogRepository, PostgresCatalogRepository, SharedCatalogRepository,
};
use bookstore_catalog::settings::Settings;
use bookstore_catalog::telemetry::init_telemetry;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("Failed to load settings")?;
    init_telemetry(&settings.service_name, settings.jaeger_enabled)?;

    let catalog: SharedCatalogRepository = if settings.use_in_memory_db {
        tracing::info!("Using in memory catalog");
        Arc::new(InMemoryCatalogRepository::default())
    } else {
        Arc::new(
            PostgresCatalogRepository::init(settings.postgres())
                .await
                .context("Failed to init postgres")?,
        )
    };

    let allow_user_registration = settings.allow_user_registration;
    tracing::info!(
        "Starting HTTP server at http://{}:{}",
        settings.bind_address,
        settings.port
    );

    HttpServer::new(move || {
        let app = App::new()
            .wrap_api()
            .app_data(web::Data::new(catalog.clone()))
            .wrap(TracingLogger::default())
            .configure(config_app);
        let app = if allow_user_registration {
            app.configure(config_user_registration)
        } else {
            app
        };
        app.with_json_spec_at("/apispec/v2").build()
    })
    .bind((settings.bind_address.as_str(), settings.port))?
    .run()
    .await
    .context("HTTP server failed")
}
