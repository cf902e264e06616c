//! Command-line interface parsing and the interactive query loop.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::info;

use crate::core::chat_completion::OpenAiChatClient;
use crate::core::config::Config;
use crate::core::session::Session;
use crate::logging;
use crate::mcp::launcher::ServerLaunch;
use crate::mcp::transport::stdio::StdioTransport;

pub const USAGE: &str = "Usage: toolbridge <path_to_server_script>";
const QUIT_COMMAND: &str = "quit";

#[derive(Parser, Debug)]
#[command(name = "toolbridge")]
#[command(about = "Chat with an LLM that can call tools from a local MCP server")]
#[command(
    long_about = "Toolbridge starts an MCP server script, lists its tools and opens an \
interactive prompt. Each query is sent to an OpenAI-compatible chat completion API together \
with the server's tools; tool calls requested by the model are run on the server.\n\n\
Environment Variables:\n\
  OPENAI_API_KEY    API key (the variable name can be changed in config.toml)\n\
  OPENAI_BASE_URL   Custom API base URL (defaults to https://api.deepseek.com)\n\
  TOOLBRIDGE_LOG    Log filter, e.g. 'toolbridge=debug' (falls back to RUST_LOG)\n\n\
Type 'quit' or press Ctrl+D to exit."
)]
pub struct Args {
    /// MCP server script to launch (.py or .js)
    #[arg(value_name = "SERVER_SCRIPT")]
    pub server_script: Option<PathBuf>,

    /// Model to use instead of the configured one
    #[arg(short = 'm', long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Write logs to the specified file instead of stderr
    #[arg(short = 'l', long)]
    pub log: Option<String>,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let Some(script) = args.server_script else {
        eprintln!("{USAGE}");
        std::process::exit(1);
    };
    logging::init(args.log.as_deref())?;

    let env = |key: &str| std::env::var(key).ok();
    let mut config = Config::load()?;
    config.apply_env_overrides(env);
    if let Some(model) = args.model.filter(|model| !model.trim().is_empty()) {
        config.model = model;
    }
    let api_key = config
        .api_key(env)
        .ok_or_else(|| format!("{} environment variable not set", config.api_key_env))?;

    let launch = ServerLaunch::from_script(&script, &config)?;
    let model = OpenAiChatClient::new(&config.base_url, &api_key, &config.model)?;
    info!(model = model.model(), base_url = %config.base_url, "Using chat model");

    let transport = StdioTransport::connect(&launch).await?;
    let mut session =
        Session::bootstrap(Arc::new(transport), Arc::new(model), &config.system_prompt).await?;
    println!("\nConnected to server with tools: {:?}", session.tool_names());

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let result = chat_loop(&mut session, stdin, &mut stdout).await;
    session.shutdown().await;
    result.map_err(Into::into)
}

/// Reads queries line by line until `quit` or end of input and writes each
/// answer back.
pub async fn chat_loop<R, W>(session: &mut Session, input: R, output: &mut W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    output
        .write_all(b"\nMCP Client Started!\nType your queries or 'quit' to exit.\n")
        .await?;
    let mut lines = input.lines();
    loop {
        output.write_all(b"\nQuery: ").await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.eq_ignore_ascii_case(QUIT_COMMAND) {
            break;
        }

        let answer = session.process_query(query).await;
        output.write_all(format!("\n{answer}\n").as_bytes()).await?;
    }
    output.flush().await
}

#[cfg(test)]
mod tests;
