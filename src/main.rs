use tracing::{error, info};

use agora::forum::{ForumRepository, PostRepository};
use agora::{Config, Database, MemberRepository};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = agora::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        agora::logging::init_console_only(&config.logging.level);
    }

    info!("Agora - forum access control and discussion kernel");

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {e}");
        std::process::exit(1);
    }

    let db = match Database::open(&config.database.path).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to open database: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = log_summary(&db).await {
        error!("Failed to read forum summary: {e}");
        std::process::exit(1);
    }
}

async fn log_summary(db: &Database) -> agora::Result<()> {
    let forums = ForumRepository::new(db.pool());
    let holders = forums.list_holders().await?.len();
    let forum_count = forums.count().await?;
    let posts = PostRepository::new(db.pool()).count().await?;
    let members = MemberRepository::new(db.pool()).count().await?;

    info!(
        schema_version = db.schema_version().await?,
        holders, forums = forum_count, posts, members, "Database ready"
    );
    Ok(())
}
