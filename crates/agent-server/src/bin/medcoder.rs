//! medcoder
//!
//! Command-line ICD-10 coding: reads a patient note, runs one analysis and
//! prints the model's answer.

use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::{Agent, AgentBuilder, Conversation, Role, ToolRegistry};
use agent_runtime::{OpenAiConfig, OpenAiProvider};
use icd_coder::{
    note_analysis_request, register_tools, BuiltinCatalog, DEFAULT_PATIENT_NOTE,
    MEDICAL_CODER_PROMPT,
};

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";

#[derive(Debug, Parser)]
#[command(name = "medcoder", version, about = "Suggest ICD-10-CM codes for a patient note")]
struct Args {
    /// Patient note as a .txt file; read from stdin when omitted
    #[arg(value_name = "FILE")]
    note: Option<PathBuf>,

    /// Model name [default: gpt-4o-mini, or llama3.2 with --ollama]
    #[arg(long, env = "OPENAI_MODEL")]
    model: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    base_url: String,

    /// API key; may be empty for local servers
    #[arg(long, env = "OPENAI_API_KEY", default_value = "", hide_env_values = true)]
    api_key: String,

    /// Maximum model calls before giving up
    #[arg(long, env = "AGENT_MAX_ITERATIONS", default_value_t = 10)]
    max_iterations: usize,

    /// Use a local Ollama server instead of --base-url
    #[arg(long)]
    ollama: bool,

    /// Seconds to wait for each tool call
    #[arg(long, default_value_t = 30)]
    tool_timeout: u64,

    /// Print every tool call and result before the answer
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn model(&self) -> String {
        self.model.clone().unwrap_or_else(|| {
            let default = if self.ollama { DEFAULT_OLLAMA_MODEL } else { DEFAULT_MODEL };
            default.to_string()
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    dotenvy::dotenv().ok();
    let args = Args::parse();

    let note = match &args.note {
        Some(path) => read_note_file(path)?,
        None => {
            let stdin = io::stdin();
            if stdin.is_terminal() {
                eprintln!("Please enter the patient notes (press Enter twice to use the default note):");
            }
            read_note(stdin.lock())?
        }
    };
    let note = if note.trim().is_empty() {
        DEFAULT_PATIENT_NOTE.to_string()
    } else {
        note
    };

    let model = args.model();
    let config = if args.ollama {
        OpenAiConfig::ollama()
    } else {
        OpenAiConfig {
            base_url: args.base_url,
            api_key: args.api_key,
            ..OpenAiConfig::default()
        }
    };
    let provider = OpenAiProvider::from_config(config)?;

    let mut tools = ToolRegistry::new();
    register_tools(&mut tools, Arc::new(BuiltinCatalog::new()))?;

    let agent = AgentBuilder::new()
        .provider(Arc::new(provider))
        .tools(tools)
        .system_prompt(MEDICAL_CODER_PROMPT)
        .model(model)
        .max_iterations(args.max_iterations)
        .tool_timeout(Some(Duration::from_secs(args.tool_timeout)))
        .build()?;

    let answered = analyze(&agent, &note, args.verbose, &mut io::stdout()).await?;
    Ok(if answered { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Run one analysis and print the answer, or the explanation when the run
/// failed. Returns whether the model answered.
async fn analyze(
    agent: &Agent,
    note: &str,
    verbose: bool,
    out: &mut impl Write,
) -> io::Result<bool> {
    let (reply, conversation) = agent
        .respond(Conversation::from_messages(vec![note_analysis_request(note)]))
        .await;

    if verbose {
        if let Some(conversation) = &conversation {
            print_trace(conversation);
        }
    }
    writeln!(out, "{}", reply.text())?;
    Ok(conversation.is_some())
}

fn read_note_file(path: &Path) -> anyhow::Result<String> {
    let is_text = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
    if !is_text {
        bail!("unsupported note format: {} (expected a .txt file)", path.display());
    }
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

/// Read lines until two consecutive blank lines (or one leading blank line) or EOF
fn read_note(reader: impl BufRead) -> io::Result<String> {
    let mut lines: Vec<String> = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let blank = line.trim().is_empty();
        if blank && lines.last().is_none_or(|prev| prev.trim().is_empty()) {
            break;
        }
        lines.push(line);
    }
    Ok(lines.join("\n").trim_end().to_string())
}

fn print_trace(conversation: &Conversation) {
    for message in conversation.messages() {
        match message.role {
            Role::Assistant if message.requests_tools() => {
                for call in &message.tool_calls {
                    let arguments = serde_json::to_string(&call.arguments).unwrap_or_default();
                    eprintln!("=== Using {} tool === {arguments}", call.name);
                }
            }
            Role::Tool => {
                let marker = if message.is_error { "error" } else { "result" };
                eprintln!("--- {marker} ---\n{}", message.text());
            }
            _ => {}
        }
    }
}
