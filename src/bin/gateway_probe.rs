//! A thin CLI exercising the documented CLI surface: connects to the
//! gateway, logs every dispatch event's name, and exits cleanly on Ctrl-C.
//!
//! This binary is intentionally dumb: it owns the one external collaborator
//! the library core doesn't (the `/gateway/bot` HTTP fetch) and otherwise
//! just wires [`portcullis::Client`] up to `tracing`.

use portcullis::{Client, Config, Intents, RunOutcome, GATEWAY_URL};
use std::sync::Arc;
use tracing::{error, info, warn};

struct Args {
    token: String,
    intents: Intents,
    zlib_stream: bool,
    log_level: String,
}

fn parse_args() -> Args {
    let mut token = std::env::var("DISCORD_TOKEN").ok();
    let mut intents = Intents::empty();
    let mut zlib_stream = false;
    let mut log_level = "info".to_owned();

    let mut raw = std::env::args().skip(1);
    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "--token" => token = raw.next(),
            "--env-token" => token = std::env::var("DISCORD_TOKEN").ok(),
            "--standard-intents" => {
                intents = Intents::GUILDS
                    | Intents::GUILD_MESSAGES
                    | Intents::GUILD_MESSAGE_REACTIONS
                    | Intents::DIRECT_MESSAGES;
            }
            "--no-intents" => intents = Intents::empty(),
            "--zlib-stream" => zlib_stream = true,
            "--log-level" => {
                if let Some(level) = raw.next() {
                    log_level = level;
                }
            }
            other => eprintln!("ignoring unrecognized argument: {other}"),
        }
    }

    let token = token.unwrap_or_else(|| {
        eprintln!("no token provided: pass --token <TOKEN> or set DISCORD_TOKEN");
        std::process::exit(1);
    });

    Args {
        token,
        intents,
        zlib_stream,
        log_level,
    }
}

/// Perform the single `GET /gateway/bot` call this crate's core deliberately
/// doesn't make (see crate docs). Run on a blocking thread: `ureq` is
/// synchronous, and the rest of this binary is async.
async fn fetch_gateway_url(token: &str) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let authorization = format!("Bot {token}");

    tokio::task::spawn_blocking(move || {
        let body: serde_json::Value = ureq::get("https://discord.com/api/v10/gateway/bot")
            .set("Authorization", &authorization)
            .call()?
            .into_json()?;

        body.get("url")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| "gateway response missing `url` field".into())
    })
    .await?
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenvy::dotenv().ok();

    let args = parse_args();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.log_level.clone())),
        )
        .init();

    let gateway_url = match fetch_gateway_url(&args.token).await {
        Ok(url) => url,
        Err(error) => {
            warn!(%error, "falling back to the well-known gateway endpoint");
            GATEWAY_URL.to_owned()
        }
    };

    let config = Config::builder(format!("Bot {}", args.token))
        .intents(args.intents)
        .zlib_stream(args.zlib_stream)
        .build();

    let client = Arc::new(Client::new(config));

    client.on_dispatch(|event| {
        info!(name = %event.name, seq = event.seq, "dispatch");
    });

    let shutdown_client = Arc::clone(&client);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl-C, shutting down");
            shutdown_client.shutdown();
        }
    });

    match client.run(gateway_url).await {
        RunOutcome::Shutdown => {
            info!("shut down cleanly");
        }
        RunOutcome::Fatal(error) => {
            error!(%error, "gateway connection failed fatally");
            std::process::exit(1);
        }
        RunOutcome::Interrupt(interrupt) => {
            error!(%interrupt, "gateway connection was interrupted and reconnection is disabled");
            std::process::exit(1);
        }
    }
}
