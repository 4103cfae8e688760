//! ESCE session CLI
//!
//! Drives the session authority and badge tracker against a live API.

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use esce_session::AppContext;
use esce_session::badges::{BadgeCategory, VisibleBadges};
use esce_session::config::{AppConfig, ConfigArgs};
use esce_session::navigation::Visibility;
use esce_session::session::{Identity, ProbeOutcome, SessionEvent};
use esce_session::telemetry;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store a token and identity snapshot obtained from a login
    Login {
        /// Bearer token
        #[arg(long)]
        token: String,
        /// Identity snapshot as JSON, e.g. '{"id": 7, "name": "Mai"}'
        #[arg(long)]
        user: String,
        /// Keep the credential in the durable store
        #[arg(long)]
        remember: bool,
    },
    /// Remove the stored credential
    Logout,
    /// Validate the stored session with the server
    Status,
    /// Fetch badge totals and print unseen counts
    Badges,
    /// Enter a route, acknowledging its badge category
    Visit {
        /// Route, e.g. /admin/posts-approval
        route: String,
    },
    /// Make a category's badge show every pending item again
    Reset {
        /// posts | services | upgrade-requests | messages
        category: BadgeCategory,
    },
    /// Poll badges and validate the session until Ctrl-C
    ///
    /// Reads commands from stdin: `go <route>`, `hide`, `show`, `reset <category>`.
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present)
    let _ = dotenv();

    let cli = Cli::parse();
    telemetry::init(cli.verbose);

    let config = AppConfig::load_with(&cli.config).context("failed to load configuration")?;
    info!(
        name: "config.loaded",
        base_url = %config.api.base_url,
        storage = %config.storage.dir,
        "Configuration loaded"
    );

    let ctx = AppContext::from_config(config).context("failed to open stores")?;

    match cli.command {
        Command::Login {
            token,
            user,
            remember,
        } => {
            let identity = Identity::from_snapshot(&user).context("invalid --user JSON")?;
            ctx.authority.establish(&token, &identity, remember)?;
            if remember {
                println!("Signed in.");
            } else {
                println!("Signed in for this process only; use --remember to persist.");
            }
        }
        Command::Logout => {
            ctx.authority.logout();
            println!("Signed out.");
        }
        Command::Status => match ctx.authority.validate_session(&ctx.client).await {
            ProbeOutcome::NoSession => println!("Not signed in."),
            ProbeOutcome::Refreshed(identity) => {
                println!(
                    "Signed in as {} (id {}, role {})",
                    identity.name.as_deref().unwrap_or("<unnamed>"),
                    identity.id.unwrap_or_default(),
                    identity.role_name.as_deref().unwrap_or("-"),
                );
            }
            ProbeOutcome::Purged(reason) => println!("Session ended: {reason}"),
            ProbeOutcome::Inconclusive(why) => {
                println!("Could not reach the server ({why}); session kept.");
            }
        },
        Command::Badges => {
            refresh_badges(&ctx).await?;
            print_badges(&ctx.badges.visible());
        }
        Command::Visit { route } => {
            refresh_badges(&ctx).await?;
            ctx.navigator.navigate(route.as_str());
            match ctx.badges.on_route(&route) {
                Some(category) => println!("Acknowledged {category}."),
                None => println!("No badge category for {route}."),
            }
            print_badges(&ctx.badges.visible());
        }
        Command::Reset { category } => {
            ctx.badges.reset_watermark(category);
            println!("Reset {category}.");
        }
        Command::Watch => watch(&ctx).await?,
    }

    Ok(())
}

async fn refresh_badges(ctx: &AppContext) -> anyhow::Result<()> {
    if !ctx.authority.is_authenticated() {
        anyhow::bail!("not signed in");
    }
    if !ctx.badges.fetch_raw_totals(&ctx.client).await {
        eprintln!("Badge totals unavailable; showing last known values.");
    }
    Ok(())
}

fn print_badges(badges: &VisibleBadges) {
    for category in BadgeCategory::ALL {
        println!("{:<18} {}", category.to_string(), badges.get(category));
    }
}

async fn watch(ctx: &AppContext) -> anyhow::Result<()> {
    let monitor = ctx.start_monitor();
    let poller = ctx.start_poller();
    let mut badges = ctx.badges.subscribe();
    let mut events = ctx.authority.subscribe();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    println!("Watching; Ctrl-C to stop.");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = badges.changed() => {
                if changed.is_err() {
                    break;
                }
                let visible = *badges.borrow_and_update();
                println!("-- badges (total {})", visible.total());
                print_badges(&visible);
            }
            event = events.recv() => match event {
                Ok(SessionEvent::Purged { reason, .. }) => println!("-- session ended: {reason}"),
                Ok(SessionEvent::Redirect { to }) => println!("-- redirect to {to}"),
                Ok(SessionEvent::Refreshed { identity }) => {
                    println!("-- session confirmed for id {}", identity.id.unwrap_or_default());
                }
                Ok(SessionEvent::Established { .. }) => {}
                Err(RecvError::Lagged(n)) => println!("-- missed {n} session events"),
                Err(RecvError::Closed) => break,
            },
            line = stdin.next_line(), if stdin_open => match line? {
                Some(line) => handle_command(ctx, line.trim()),
                None => stdin_open = false,
            },
        }
    }

    poller.stop().await;
    monitor.stop().await;
    Ok(())
}

fn handle_command(ctx: &AppContext, line: &str) {
    let (verb, arg) = line.split_once(' ').unwrap_or((line, ""));
    match verb {
        "go" if !arg.is_empty() => ctx.navigator.navigate(arg.trim()),
        "hide" => ctx.navigator.set_visibility(Visibility::Hidden),
        "show" => ctx.navigator.set_visibility(Visibility::Visible),
        "reset" => match arg.trim().parse::<BadgeCategory>() {
            Ok(category) => ctx.badges.reset_watermark(category),
            Err(e) => eprintln!("{e}"),
        },
        "" => {}
        _ => eprintln!("commands: go <route> | hide | show | reset <category>"),
    }
}
