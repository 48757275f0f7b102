use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use rand::Rng;

use crate::core::artwork::ArtworkStore;
use crate::core::db::EventDb;
use crate::core::settings::{ConfigStore, Settings};
use crate::core::user::Participant;
use crate::integrations::discord::DiscordOAuth;
use crate::logsink::LogSink;
use crate::web::session::SessionStore;

mod core;
mod error;
mod integrations;
mod logsink;
mod web;

/// Shared handles passed into the web layer.
#[derive(Clone)]
pub struct Services {
    pub db: Arc<EventDb>,
    pub config: Arc<ConfigStore>,
    pub sessions: Arc<SessionStore>,
    pub oauth: Arc<DiscordOAuth>,
    pub artworks: Arc<ArtworkStore>,
    pub sink: LogSink,
}

#[derive(Parser, Debug)]
#[command(name = "artswap")]
#[command(version = "0.1")]
#[command(about = "Backend for a community art exchange event.", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: RunType,
}

#[derive(Subcommand, Debug)]
enum RunType {
    /// Create and initialize a new settings file.
    /// The output .json file will need to be manually edited to fill in the
    /// OAuth application credentials and the guild/admin details.
    Init { settings_file: PathBuf },

    /// Run the signup server from a settings file.
    Run { settings_file: PathBuf },

    /// Insert randomly generated participants for local testing.
    Seed {
        settings_file: PathBuf,

        /// How many dummy participants to create.
        #[arg(short, long, default_value_t = 5)]
        count: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    match &args.command {
        RunType::Init { settings_file } => {
            let template = serde_json::to_string_pretty(&Settings::template())?;
            std::fs::write(settings_file, template)?;
            log::info!(
                "Settings template written to {}, open it in a text editor and fill in the missing fields",
                settings_file.display()
            );
            Ok(())
        }
        RunType::Run { settings_file } => {
            let config = Arc::new(ConfigStore::load(settings_file)?);
            let settings = config.snapshot().await;

            let db = Arc::new(EventDb::open(&settings.db_file).await?);

            let artworks = Arc::new(ArtworkStore::new(settings.artwork_dir.clone()));
            artworks.ensure_root().await?;

            let (sink, _sink_task) = LogSink::start(256);

            let services = Services {
                db,
                sessions: Arc::new(SessionStore::new()),
                oauth: Arc::new(DiscordOAuth::new(&settings)),
                config,
                artworks,
                sink,
            };

            log::info!("artswap initialized");
            web::run_http_server(services).await
        }
        RunType::Seed {
            settings_file,
            count,
        } => {
            let config = ConfigStore::load(settings_file)?;
            let settings = config.snapshot().await;
            let db = EventDb::open(&settings.db_file).await?;

            seed_participants(&db, *count).await?;
            log::info!("Created and inserted {} dummy participants", count);
            Ok(())
        }
    }
}

/// Generates dummy participants with random snowflakes and usernames, the
/// same shape real signups produce.
async fn seed_participants(db: &EventDb, count: u32) -> anyhow::Result<()> {
    for _ in 0..count {
        let participant = {
            let mut rng = rand::thread_rng();

            // 18 digit snowflakes, same length as Discord's
            let snowflake = rng
                .gen_range(100_000_000_000_000_000u64..1_000_000_000_000_000_000u64)
                .to_string();
            let name_len = rng.gen_range(5..=10);
            let username: String = (0..name_len)
                .map(|_| rng.gen_range(b'a'..=b'z') as char)
                .collect();

            Participant {
                avatar_url: format!("avatar_{}.jpg", username),
                snowflake,
                username,
                partner: None,
                in_server: rng.gen_bool(0.5),
                is_admin: false,
                is_banned: false,
            }
        };

        db.add_participant(&participant).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seed_creates_requested_count() {
        let db = EventDb::open_in_memory().await.unwrap();
        seed_participants(&db, 8).await.unwrap();

        let all = db.get_all_participants().await.unwrap();
        assert_eq!(all.len(), 8);
        for participant in all {
            assert_eq!(participant.snowflake.len(), 18);
            assert!(participant.partner.is_none());
            assert!(!participant.is_banned);
        }
    }
}
