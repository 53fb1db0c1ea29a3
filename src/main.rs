use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use memchat::embeddings::build_embedder;
use memchat::{
    build_extractor, build_generator, Config, ConversationRecord, ConversationStore,
    Orchestrator, RelationshipGraph, TurnOutcome,
};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "memchat")]
#[command(version, about = "Chatbot with long-term conversation memory and an entity graph")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive session (default). `/clear` resets memory, `/quit` exits.
    Chat,
    /// Run a single turn and print the reply
    Ask {
        /// What to say
        text: String,
    },
    /// Show the stored exchanges most similar to a query, without generating
    Recall {
        query: String,
        /// Number of memories to show (defaults to memory.top_k)
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Reset the conversation memory file
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logger before config so loading can log; `[logging].level` is applied once known
    let rust_log_set = std::env::var_os("RUST_LOG").is_some();
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "trace")).init();
    if !rust_log_set {
        log::set_max_level(log::LevelFilter::Info);
    }

    let config = Config::load()?;

    if !rust_log_set {
        match config.log_level() {
            Some(level) => log::set_max_level(level),
            None => log::warn!(
                "Unknown logging.level {:?}, keeping info",
                config.logging.level
            ),
        }
    }

    log::info!("Starting memchat v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Memory file: {}", config.storage_file().display());

    match args.command.unwrap_or(Command::Chat) {
        Command::Chat => {
            let mut bot = build_orchestrator(&config).await?;
            run_chat(&mut bot, &config).await?;
        }
        Command::Ask { text } => {
            let mut bot = build_orchestrator(&config).await?;
            let outcome = bot.handle_turn(&text).await;
            export_graph(&bot, &config);
            print_outcome(&outcome);
        }
        Command::Recall { query, k } => {
            let store = open_store(&config)?;
            let top_k = k.unwrap_or(config.memory.top_k);
            let scored = store
                .retrieve_scored(&query, top_k)
                .await
                .context("Failed to search conversation memory")?;

            if scored.is_empty() {
                println!("No memories yet.");
            }
            for (rank, hit) in scored.iter().enumerate() {
                println!("{}. (score: {:.3})", rank + 1, hit.score);
                println!("   User: {}", hit.record.user);
                println!("   Bot:  {}", hit.record.bot);
            }
        }
        Command::Clear => {
            let mut store = open_store(&config)?;
            store.clear().context("Failed to clear conversation memory")?;
            println!("Memory cleared: {}", store.path().display());
        }
    }

    Ok(())
}

fn open_store(config: &Config) -> Result<ConversationStore> {
    let embedder = build_embedder(config).context("Failed to set up embedder")?;
    Ok(ConversationStore::open(config.storage_file(), embedder))
}

async fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let store = open_store(config)?;
    log::info!("Loaded {} past exchanges", store.len());

    let extractor = build_extractor(config).context("Failed to set up entity extractor")?;
    let graph = RelationshipGraph::new(extractor, config.edge_policy());

    let generator = build_generator(config)
        .await
        .context("Failed to initialise generation backend")?;

    Ok(Orchestrator::new(
        store,
        graph,
        generator,
        config.sampling(),
        config.memory.top_k,
    ))
}

async fn run_chat(bot: &mut Orchestrator, config: &Config) -> Result<()> {
    println!("memchat ready. Type /clear to forget everything, /quit to exit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();

        match input {
            "" => continue,
            "/quit" => break,
            "/clear" => {
                match bot.store_mut().clear() {
                    Ok(()) => println!("Memory cleared."),
                    Err(e) => log::error!("Failed to clear memory: {}", e),
                }
                continue;
            }
            _ => {}
        }

        let outcome = bot.handle_turn(input).await;
        export_graph(bot, config);
        print_outcome(&outcome);
    }

    Ok(())
}

fn export_graph(bot: &Orchestrator, config: &Config) {
    let path = &config.graph.html_path;
    if let Err(e) = bot.graph().render().write_html(path) {
        log::warn!("Failed to write graph to {}: {}", path.display(), e);
    }
}

fn print_outcome(outcome: &TurnOutcome) {
    println!("Bot: {}", outcome.response);
    if !outcome.related.is_empty() {
        println!("Related memories:");
        outcome.related.iter().for_each(print_record);
    }
}

fn print_record(record: &ConversationRecord) {
    println!("  - User: {}", record.user);
    println!("    Bot:  {}", record.bot);
}
