use std::sync::Arc;
use std::time::Duration;

use assistant::config::LogFormat;
use assistant::gateway::memory::InMemoryMemoryStore;
use assistant::gateway::openai::OpenAiCompatibleGateway;
use assistant::gateway::transport::ConsoleTransport;
use assistant::{AssistantRuntime, Collaborators, RuntimeConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Conversation id used for stdin input
const CONSOLE_CONVERSATION: &str = "console";

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before reading config so LLM keys and timings are picked up.
    let env_file = dotenvy::dotenv().ok();
    let config = RuntimeConfig::from_env()?;
    init_tracing(config.log_format);
    match env_file {
        Some(path) => tracing::info!(path = %path.display(), "Loaded environment from .env"),
        None => tracing::info!("No .env file found; using process environment only"),
    }

    let api_key = config
        .llm_api_key
        .clone()
        .ok_or_else(|| anyhow::anyhow!("LLM_API_KEY must be set"))?;
    let model = OpenAiCompatibleGateway::new(&config.llm_base_url, api_key, &config.llm_model);
    tracing::info!(model = model.model(), base_url = %config.llm_base_url, "Model gateway configured");

    let collaborators = Collaborators {
        model: Arc::new(model),
        memory: Arc::new(InMemoryMemoryStore::new()),
        transport: Arc::new(ConsoleTransport),
    };
    let runtime = AssistantRuntime::start(config, collaborators).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if !handle_line(&runtime, line.trim()).await? {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl-C received");
                break;
            }
        }
    }

    runtime.shutdown(SHUTDOWN_TIMEOUT).await;
    Ok(())
}

/// Returns false when the user asked to quit
async fn handle_line(runtime: &AssistantRuntime, line: &str) -> anyhow::Result<bool> {
    match line {
        "" => {}
        "/quit" | "/exit" => return Ok(false),
        "/heartbeat" => match runtime.trigger_heartbeat() {
            Ok(()) => println!("background round requested"),
            Err(err) => println!("{err}"),
        },
        "/actors" => {
            let stats = runtime.registry().stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            for id in runtime.registry().live_ids().await? {
                // May have finished since the listing.
                let Ok(view) = runtime.registry().get(&id).await else {
                    continue;
                };
                println!(
                    "  {} {} {}",
                    view.id,
                    view.status,
                    view.progress.unwrap_or_default()
                );
            }
        }
        text => runtime.submit(CONSOLE_CONVERSATION, text, serde_json::Map::new())?,
    }
    Ok(true)
}
