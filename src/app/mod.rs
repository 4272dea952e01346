use actix_web::{
    HttpResponse, web::{self, Data},
    middleware, App, HttpServer, Result
};
use actix_cors::Cors;
use log::info;
use std::sync::Arc;
use std::time;

use crate::shared::util::config::{self, StorageBackend};

use crate::jobs::handlers::memory_handler::MemoryHandler;
use crate::jobs::handlers::postgres_handler::PostgresHandler;
use crate::jobs::util::handler::{HandlerError, JobDataHandler};

use crate::jobs::app as jobs_app;

use crate::shared::types::app as app_types;


async fn not_found() -> Result<HttpResponse> {
    let response = app_types::ErrorResponse{ error: "Resource not found".to_string() };
    Ok(HttpResponse::NotFound().json(response))
}

/// Job store selected by `storage.backend`, initialised
pub async fn job_handler() -> Result<Arc<dyn JobDataHandler>, HandlerError> {
    let handler: Arc<dyn JobDataHandler> = match config::get_config().storage.backend {
        StorageBackend::Memory => Arc::new(MemoryHandler::new()),
        StorageBackend::Postgres => Arc::new(PostgresHandler::new().await?)
    };
    handler.init().await?;
    Ok(handler)
}

/// App factory shared by the server and the HTTP tests
pub fn configure(handler: Arc<dyn JobDataHandler>) -> impl FnOnce(&mut web::ServiceConfig) {
    move |app: &mut web::ServiceConfig| {
        app
            .app_data(Data::from(handler))
            .configure(jobs_app::routes);
    }
}

pub async fn start() -> std::io::Result<()> {
    config::get_config().server.init_logging();

    let handler = job_handler().await
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;

    info!("Job store backend: {:?}", config::get_config().storage.backend);
    println!("starting HTTP server at http://localhost:{}", config::get_config().server.port);

    HttpServer::new(move || {
        App::new()
            .configure(configure(handler.clone()))
            .wrap(Cors::permissive())
            .wrap(middleware::NormalizePath::trim())
            .wrap(middleware::Logger::default())
            .default_service(web::route().to(not_found))
    })
        .keep_alive(time::Duration::from_secs(30))
        .bind(("127.0.0.1", config::get_config().server.port))?
        .run().await
}
