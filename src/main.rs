use std::process;

use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;
use trellis::{
    config,
    error::AppError,
    infra::{error::InfraError, http, telemetry, watch},
    site::{self, Application},
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Routes => run_routes(),
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let app = Application::build(&settings)?;

    let watcher_handle = watch::spawn(
        app.watcher(),
        app.queue.clone(),
        app.cache.consumer(app.queue.clone()),
        app.cache.config.watch_interval(),
    );

    let result = serve_http(&settings, &app).await;

    watcher_handle.abort();
    let _ = watcher_handle.await;

    result
}

fn run_routes() -> Result<(), AppError> {
    let routes = site::graph().finalize()?;
    for chain in routes.chains() {
        println!("{chain}");
    }
    Ok(())
}

async fn serve_http(settings: &config::Settings, app: &Application) -> Result<(), AppError> {
    let router = http::build_router(app.http_state());

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;

    info!(
        target = "trellis::serve",
        addr = %settings.server.addr,
        "Listening"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    info!(target = "trellis::serve", "Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
