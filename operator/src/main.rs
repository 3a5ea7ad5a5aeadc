use clap::Parser;
pub use controller::*;
use controller::config::{Config, LogFormat};
use tracing_subscriber::{prelude::*, EnvFilter, Registry};

use actix_web::{
    get, middleware, web::Data, App, HttpRequest, HttpResponse, HttpServer, Responder,
};

#[get("/metrics")]
async fn metrics(c: Data<Manager>, _req: HttpRequest) -> impl Responder {
    let metrics = c.metrics();
    HttpResponse::Ok()
        .content_type("application/openmetrics-text; version=1.0.0; charset=utf-8")
        .body(metrics)
}

#[get("/health")]
async fn health(_: HttpRequest) -> impl Responder {
    HttpResponse::Ok().json("healthy")
}

#[get("/")]
async fn index(c: Data<Manager>, _req: HttpRequest) -> impl Responder {
    let d = c.diagnostics().await;
    HttpResponse::Ok().json(&d)
}

fn init_tracing(format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| Error::Stdio(std::io::Error::other(e)))?;
    let result = match format {
        LogFormat::Json => tracing::subscriber::set_global_default(
            Registry::default()
                .with(tracing_subscriber::fmt::layer().json())
                .with(env_filter),
        ),
        LogFormat::Text => tracing::subscriber::set_global_default(
            Registry::default()
                .with(tracing_subscriber::fmt::layer())
                .with(env_filter),
        ),
    };
    result.map_err(|e| Error::Stdio(std::io::Error::other(e)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    init_tracing(config.log_format)?;

    let bind = config.bind.clone();
    // Start kubernetes controller
    let (manager, controller) = Manager::new(config).await?;

    // Start web server
    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(manager.clone()))
            .wrap(middleware::Logger::default().exclude("/health"))
            .service(index)
            .service(health)
            .service(metrics)
    })
    .bind(&bind)
    .map_err(Error::Stdio)?
    .shutdown_timeout(5);

    tokio::select! {
        () = controller => tracing::warn!("Jaeger controller exited"),
        _ = server.run() => tracing::info!("actix exited"),
    }
    Ok(())
}
