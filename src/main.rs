use tracing::{error, info};

use parley::chat::{NewRoom, RoomRepository};
use parley::{Config, Database, GatewayServer};

/// Rooms seeded when storage is empty, so a fresh install is usable.
const DEFAULT_ROOMS: &[(&str, &str, usize)] = &[
    ("gaming", "Gaming", 50),
    ("technology", "Technology", 50),
    ("movies-tv", "Movies & TV", 50),
    ("fitness", "Fitness", 50),
];

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            Config::default()
        }
    };

    // Initialize logging
    if let Err(e) = parley::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        parley::logging::init_console_only(&config.logging.level);
    }

    info!("Parley - real-time chat gateway");

    let db = match Database::open(&config.database.path).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to open database: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = seed_default_rooms(&db).await {
        error!("Failed to seed default rooms: {e}");
    }

    let server = GatewayServer::new(&config.server, &config.chat, db);
    if let Err(e) = server.run().await {
        error!("Gateway server error: {e}");
        std::process::exit(1);
    }
}

/// Create the default rooms when storage holds none.
async fn seed_default_rooms(db: &Database) -> parley::Result<()> {
    let repo = RoomRepository::new(db.pool());
    if repo.count().await? > 0 {
        return Ok(());
    }

    for (id, name, capacity) in DEFAULT_ROOMS {
        repo.create(&NewRoom::new(*id, *name).with_capacity(*capacity))
            .await?;
        info!("Seeded room '{}'", name);
    }
    Ok(())
}
