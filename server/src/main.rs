// shelf-server/src/main.rs

use shelf_server::config::AppConfig;
use shelf_server::state::{AppState, Backends};
use shelf_server::web::configure_app_routes;

use actix_web::{web, App, HttpServer};
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
  tracing_subscriber::fmt()
    .with_max_level(Level::INFO)
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_span_events(FmtSpan::CLOSE)
    .init();

  tracing::info!("Starting bookstore order server...");

  let app_config = match AppConfig::from_env() {
    Ok(cfg) => cfg,
    Err(e) => {
      tracing::error!(error = %e, "Failed to load application configuration.");
      return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()));
    }
  };

  let backends = match Backends::from_config(&app_config).await {
    Ok(backends) => backends,
    Err(e) => {
      tracing::error!(error = %e, "Failed to initialize backends.");
      return Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()));
    }
  };

  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);
  let app_state = AppState::assemble(app_config, backends);
  tracing::info!("Order pipelines registered.");

  let shutdown = CancellationToken::new();
  let worker = tokio::spawn(app_state.delivery_worker().run(shutdown.clone()));

  tracing::info!("Attempting to bind server to {}...", server_address);
  let state_for_server = app_state.clone();
  let served = HttpServer::new(move || {
    App::new()
      .app_data(web::Data::new(state_for_server.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await;

  // The worker finishes its current poll before exiting.
  shutdown.cancel();
  if let Err(e) = worker.await {
    tracing::error!(error = %e, "Delivery worker task ended abnormally.");
  }
  tracing::info!("Server stopped.");
  served
}
