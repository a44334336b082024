use application::{IndexStats, QueryEngine};
use clap::Parser;
use colored::Colorize;
use domain::models::{ChatReply, ChatRequest, ReplyStatus};
use infrastructure::config::Config;
use infrastructure::llm_client::LlmClient;
use shared::types::Result;
use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "docqa")]
#[command(about = "Ask questions about a single document")]
pub struct Cli {
    /// Document to index (overrides DOCQA_DOCUMENT)
    #[arg(long, short = 'd')]
    pub document: Option<PathBuf>,

    /// Number of chunks to retrieve per question
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Print raw JSON replies
    #[arg(long)]
    pub json: bool,

    /// Debug logging
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Ask once and exit; without it an interactive session starts
    #[arg(trailing_var_arg = true)]
    pub question: Vec<String>,
}

impl Cli {
    /// Flags win over environment settings.
    pub fn apply(&self, config: &mut Config) {
        if let Some(document) = &self.document {
            config.document_path = Some(document.clone());
        }
        if let Some(top_k) = self.top_k {
            config.retrieval.top_k = top_k;
        }
    }
}

pub struct CliApp {
    config: Config,
    json: bool,
}

impl CliApp {
    pub fn new(cli: &Cli) -> Result<Self> {
        Self::with_config(cli, Config::load_unvalidated()?)
    }

    /// Flags are applied before validation so they can fix a bad env value.
    pub fn with_config(cli: &Cli, mut config: Config) -> Result<Self> {
        cli.apply(&mut config);
        config.validate()?;
        debug!(
            provider = ?config.model.provider,
            base_url = %config.model.base_url,
            top_k = config.retrieval.top_k,
            "configuration loaded"
        );
        Ok(Self {
            config,
            json: cli.json,
        })
    }

    pub async fn run(&self, cli: Cli) -> Result<()> {
        let engine = self.start().await?;
        let question = cli.question.join(" ");
        if question.trim().is_empty() {
            self.interactive(&engine).await
        } else {
            let reply = engine.answer_query(ChatRequest::new(question)).await;
            self.print_reply(&reply)?;
            if reply.is_answer() {
                Ok(())
            } else {
                anyhow::bail!("question was not answered")
            }
        }
    }

    async fn start(&self) -> Result<QueryEngine> {
        let path = self.config.document_path()?.clone();
        let client = Arc::new(LlmClient::new(self.config.model.clone())?);
        let engine = QueryEngine::new(&self.config, client.clone(), client)?;

        eprintln!("{}", format!("Indexing {}...", path.display()).cyan());
        let stats = engine.build(&path).await?;
        eprintln!("{}", summary(&stats).green());
        Ok(engine)
    }

    async fn interactive(&self, engine: &QueryEngine) -> Result<()> {
        println!("Ask about the document. Type 'exit' to quit.");
        if std::io::stdin().is_terminal() {
            use dialoguer::{theme::ColorfulTheme, Input};
            loop {
                let input: String = Input::with_theme(&ColorfulTheme::default())
                    .with_prompt("Question")
                    .allow_empty(true)
                    .interact_text()?;
                if is_exit(&input) {
                    break;
                }
                let reply = engine.answer_query(ChatRequest::new(input)).await;
                self.print_reply(&reply)?;
            }
        } else {
            for line in std::io::stdin().lock().lines() {
                let line = line?;
                if is_exit(&line) {
                    break;
                }
                let reply = engine.answer_query(ChatRequest::new(line)).await;
                self.print_reply(&reply)?;
            }
        }
        Ok(())
    }

    fn print_reply(&self, reply: &ChatReply) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(reply)?);
            return Ok(());
        }
        match (reply, reply.status()) {
            (ChatReply::Answer { answer }, _) => println!("{}", answer),
            (ChatReply::Error { error, .. }, Some(ReplyStatus::ClientError)) => {
                eprintln!("{}", error.yellow())
            }
            (ChatReply::Error { error, .. }, _) => eprintln!("{}", error.red()),
        }
        Ok(())
    }
}

fn is_exit(input: &str) -> bool {
    matches!(input.trim().to_lowercase().as_str(), "exit" | "quit")
}

fn summary(stats: &IndexStats) -> String {
    let dimension = stats
        .dimension
        .map(|d| d.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "Indexed {} chunks (dimension {}) in {}ms",
        stats.chunks,
        dimension,
        stats.elapsed.as_millis()
    )
}
