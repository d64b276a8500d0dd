use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod db;
mod error;
mod routes;
mod sse;
mod state;

use state::AppState;

#[derive(Parser, Debug)]
#[command(name = "horizon")]
#[command(about = "Personal-finance projection server")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP server
    Run {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: String,

        /// Path to the SQLite database
        #[arg(long, default_value = "horizon.db")]
        db: PathBuf,

        /// Re-open the database on every request, picking up external
        /// writes to the file
        #[arg(long)]
        watch: bool,

        /// Log level (debug, info, warn, error)
        #[arg(long, default_value = "info")]
        log_level: String,
    },
}

fn init_logging(level: &str) {
    let default_filter = format!("horizon_server={level},horizon_core=warn,tower_http=info");
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    match args.command {
        Command::Run {
            addr,
            db,
            watch,
            log_level,
        } => run(addr, db, watch, &log_level).await,
    }
}

async fn run(addr: String, db_path: PathBuf, watch: bool, log_level: &str) -> color_eyre::Result<()> {
    init_logging(log_level);

    let conn = rusqlite::Connection::open(&db_path)?;
    db::init_db(&conn)?;
    let state = if watch {
        drop(conn);
        AppState::per_request(db_path.clone())
    } else {
        AppState::shared(conn)
    };

    let app = routes::router(state).layer(TraceLayer::new_for_http());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        "starting horizon server, listening on {addr}\n  sqlite db: {} (watch: {watch})",
        db_path.display()
    );
    axum::serve(listener, app).await?;

    Ok(())
}
