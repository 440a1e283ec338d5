//! Explorer - Rust 出行助手智能体
//!
//! 入口：解析命令行、初始化日志、加载配置，运行对话 REPL 或行程规划。

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use explorer::agent::{create_agent_components, TurnHints};
use explorer::config::{load_config, AppConfig};
use explorer::core::{spawn_session, Command, TerminalState};
use explorer::itinerary::TripPreferences;
use explorer::tools::TravelMode;

#[derive(Parser)]
#[command(name = "explorer", version, about = "Budapest travel assistant with a bounded decide/execute loop")]
struct Cli {
    /// 额外的配置文件（覆盖 config/default.toml）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 打印每轮的过程事件（规划 / 调用 / 观察）
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// 对话（默认）
    Chat(ChatArgs),
    /// 生成一日行程
    Itinerary(ItineraryArgs),
}

#[derive(Args, Default)]
struct ChatArgs {
    /// 偏好的出行方式
    #[arg(long, value_enum)]
    mode: Option<TravelMode>,
    /// 回复语言
    #[arg(long)]
    language: Option<String>,
}

#[derive(Args)]
struct ItineraryArgs {
    #[arg(long, default_value = "Deák Ferenc tér")]
    start: String,
    /// 兴趣，逗号分隔（museums,food,history,...）
    #[arg(long, value_delimiter = ',')]
    interests: Vec<String>,
    #[arg(long, default_value_t = 4)]
    hours: u32,
    #[arg(long, value_enum, default_value_t = TravelMode::Transit)]
    mode: TravelMode,
    /// 特殊要求（可提到想去的景点）
    #[arg(long, default_value = "")]
    requests: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 日志：默认 warn（--debug 时 explorer=debug），可通过 RUST_LOG 覆盖
    explorer::observability::init(if cli.debug { "info,explorer=debug" } else { "warn" });

    let cfg = load_config(cli.config.clone()).or_else(|e| {
        if cli.config.is_some() {
            Err(anyhow::Error::new(e).context("Failed to load config"))
        } else {
            tracing::warn!("Config load failed ({}), using defaults", e);
            Ok(AppConfig::default())
        }
    })?;

    match cli.command.unwrap_or(Cmd::Chat(ChatArgs::default())) {
        Cmd::Chat(args) => run_chat(&cfg, args, cli.debug).await,
        Cmd::Itinerary(args) => run_itinerary(&cfg, args).await,
    }
}

async fn run_chat(cfg: &AppConfig, args: ChatArgs, debug: bool) -> anyhow::Result<()> {
    let components = create_agent_components(cfg).context("Failed to build agent")?;
    let hints = TurnHints {
        transport_mode: args.mode,
        language: args.language.or_else(|| cfg.app.language.clone()),
    };

    let (cmd_tx, mut state_rx) = spawn_session(components.orchestrator.clone());
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!(
        "{} ready ({} capabilities). Type /clear to reset, /quit to exit.",
        cfg.app.name,
        components.registry.len()
    );

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                cmd_tx.send(Command::Clear).context("Session task stopped")?;
                state_rx.changed().await.context("Session task stopped")?;
                println!("(conversation cleared)");
                continue;
            }
            _ => {}
        }

        let turn = state_rx.borrow().turn;
        cmd_tx
            .send(Command::Submit(hints.apply(line)))
            .context("Session task stopped")?;
        let state = loop {
            state_rx.changed().await.context("Session task stopped")?;
            let s = state_rx.borrow_and_update().clone();
            if s.turn > turn {
                break s;
            }
        };

        if debug {
            for ev in &state.trace {
                println!("  · {}", serde_json::to_string(ev).unwrap_or_default());
            }
        }
        let reply = state.last_reply.unwrap_or_default();
        match state.terminal {
            Some(TerminalState::Aborted) => println!("! {reply}"),
            _ => println!("{reply}"),
        }
    }

    let _ = cmd_tx.send(Command::Quit);
    Ok(())
}

async fn run_itinerary(cfg: &AppConfig, args: ItineraryArgs) -> anyhow::Result<()> {
    let components = create_agent_components(cfg).context("Failed to build agent")?;
    let prefs = TripPreferences {
        start_location: args.start,
        interests: args
            .interests
            .into_iter()
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty())
            .collect(),
        available_hours: args.hours,
        transport_mode: args.mode,
        special_requests: args.requests,
    };
    let itinerary = components
        .itinerary
        .create_itinerary(&prefs)
        .await
        .context("Itinerary planning failed")?;
    println!("{}", itinerary.text);
    Ok(())
}
