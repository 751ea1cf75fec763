use anyhow::Context;
use hotelbot::{Defaults, SessionEnd, cli};
use tracing::{Level, info};

const BIN: &str = "builder_bot";
const PERSONA: &str = include_str!("../../../personas/builder.json");
const DEFAULTS: Defaults = Defaults {
    room_id: 206,
    username: "dude",
    lock_file: "/tmp/clabo-bot.lock",
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,builder_bot=info".into()),
        )
        .with_target(false)
        .with_max_level(Level::INFO)
        .init();

    let cfg = cli::parse_args(BIN, &DEFAULTS);
    info!(ws_url = %cfg.ws_url, room = cfg.room_id, user = %cfg.username, "builder starting");

    let end = cli::launch(cfg, PERSONA)
        .await
        .context("builder session")?;
    match end {
        SessionEnd::Finished => info!("build session complete"),
        SessionEnd::Closed => info!("build session cut short"),
    }
    Ok(())
}
