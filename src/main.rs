use clap::Parser;
use mentoreed::cleanup::flush_expired_tokens;
use mentoreed::cli::{
    Args, build_config, deactivate_user, handle_create_staff, init_logging, load_jwt_secret,
    open_database, validate_public_origin,
};
use mentoreed::run_server;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    if args.flush_expired_tokens {
        let code = if flush_expired_tokens(&db).await.is_some() { 0 } else { 1 };
        std::process::exit(code);
    }

    if let Some(username) = &args.deactivate_user {
        let code = if deactivate_user(&db, username).await { 0 } else { 1 };
        std::process::exit(code);
    }

    let Some(jwt_secret) = load_jwt_secret(args.jwt_secret_file.as_deref()) else {
        std::process::exit(1);
    };

    if let (Some(username), Some(email)) = (&args.create_staff_user, &args.staff_email) {
        handle_create_staff(&db, username, email).await;
    }

    let Some(public_origin) = validate_public_origin(&args.public_origin) else {
        std::process::exit(1);
    };

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let config = build_config(&args, db, &public_origin, jwt_secret);

    match listener.local_addr() {
        Ok(local_addr) => info!(address = %local_addr, "Listening"),
        Err(e) => error!(error = %e, "Failed to read local address"),
    }

    if let Err(e) = run_server(config, listener).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
