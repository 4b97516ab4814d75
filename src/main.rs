use clap::Parser;
use tollgate::cli::{
    Args, build_settings, handle_create_admin, init_logging, load_jwt_secret, open_database,
};
use tollgate::{ServerConfig, run_server};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(jwt_secret) = load_jwt_secret(args.jwt_secret_file.as_deref()) else {
        std::process::exit(1);
    };

    let Some(settings) = build_settings(&args) else {
        std::process::exit(1);
    };

    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    if let Some(username) = args.create_admin.as_deref() {
        if let Err(e) = handle_create_admin(&db, username, args.admin_email.as_deref()).await {
            error!(error = %e, "Failed to create admin user");
            std::process::exit(1);
        }
    }

    let config = match ServerConfig::sqlite(&db, jwt_secret, settings).await {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration from database");
            std::process::exit(1);
        }
    };

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    match listener.local_addr() {
        Ok(local_addr) => info!(address = %local_addr, "Listening"),
        Err(_) => info!(address = %addr, "Listening"),
    }

    if let Err(e) = run_server(config, listener).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
