use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "relay-bot")]
#[command(about = "Teams agent relay bot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay-bot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the bot server (/api/messages, /api/notify).
    Serve {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay-bot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from PORT, config, or 3978)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Send one message straight to the agent and print the reply as the bot would show it.
    Ask {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay-bot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Session id passed to the agent.
        #[arg(long, default_value = "cli")]
        session: String,

        /// Print the parsed history as JSON after the reply.
        #[arg(long)]
        history: bool,

        /// Message text.
        #[arg(required = true)]
        message: Vec<String>,
    },

    /// Ask a running bot to send a proactive message.
    Notify {
        /// Base URL of the running bot.
        #[arg(long, default_value = "http://127.0.0.1:3978")]
        url: String,

        /// User id or AAD object id the bot has seen.
        #[arg(long)]
        user: String,

        /// Message text.
        #[arg(required = true)]
        message: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("relay-bot {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("serve failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Ask {
            config,
            session,
            history,
            message,
        }) => {
            if let Err(e) = run_ask(config, &session, history, &message.join(" ")).await {
                log::error!("ask failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Notify { url, user, message }) => {
            if let Err(e) = run_notify(&url, &user, &message.join(" ")).await {
                eprintln!("notify failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_serve(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = lib::config::load_config(config_path)?;
    config.server.port = port.unwrap_or_else(|| lib::config::resolve_port(&config));
    log::info!(
        "starting bot with config {} on {}:{}",
        path.display(),
        config.server.bind,
        config.server.port
    );
    lib::gateway::run_gateway(config).await
}

async fn run_ask(
    config_path: Option<std::path::PathBuf>,
    session: &str,
    show_history: bool,
    message: &str,
) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    let agent = lib::agent::AgentClient::from_config(&config);
    let raw = agent.chat(session, message, None).await;
    let reply = lib::normalize::normalize(&raw);
    println!("{}", reply.display);
    if show_history {
        println!("{}", serde_json::to_string_pretty(&reply.history)?);
    }
    Ok(())
}

async fn run_notify(base_url: &str, user: &str, message: &str) -> anyhow::Result<()> {
    let url = format!("{}/api/notify", base_url.trim_end_matches('/'));
    let res = reqwest::Client::new()
        .post(&url)
        .json(&serde_json::json!({ "user_id": user, "message": message }))
        .send()
        .await?;
    let status = res.status();
    let body: serde_json::Value = res.json().await.unwrap_or(serde_json::Value::Null);
    if status.is_success() {
        println!("sent to {}", user);
        return Ok(());
    }
    if let Some(known) = body.get("knownUsers").and_then(|v| v.as_array()) {
        let known: Vec<&str> = known.iter().filter_map(|v| v.as_str()).collect();
        anyhow::bail!(
            "{} {}; known users: {}",
            status,
            body.get("error").and_then(|v| v.as_str()).unwrap_or(""),
            if known.is_empty() { "(none)".to_string() } else { known.join(", ") }
        );
    }
    anyhow::bail!("{} {}", status, body)
}
