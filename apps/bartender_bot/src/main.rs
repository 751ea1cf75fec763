use anyhow::Context;
use hotelbot::{Defaults, cli};
use tracing::{Level, info};

const BIN: &str = "bartender_bot";
const PERSONA: &str = include_str!("../../../personas/bartender.json");
const DEFAULTS: Defaults = Defaults {
    room_id: 206,
    username: "joejoegopro",
    lock_file: "/tmp/clabo-bot-joe.lock",
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,bartender_bot=info".into()),
        )
        .with_target(false)
        .with_max_level(Level::INFO)
        .init();

    let cfg = cli::parse_args(BIN, &DEFAULTS);
    info!(ws_url = %cfg.ws_url, room = cfg.room_id, user = %cfg.username, "bartender starting");

    let end = cli::launch(cfg, PERSONA)
        .await
        .context("bartender session")?;
    info!(?end, "bartender stopped");
    Ok(())
}
