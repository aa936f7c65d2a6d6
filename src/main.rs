//! Deep Research Orchestrator CLI.
//!
//! Runs a single Research Loop invocation end-to-end, printing each event
//! as it arrives and the final structured outcome once synthesis finishes.

use clap::Parser;
use deep_research_orchestrator::events::Event;
use deep_research_orchestrator::{build_clients, Config, EventSink, ResearchLoop, ResearchRequest, Secrets};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "deep-research", about = "Iterative deep research orchestrator")]
struct Args {
    /// The research question to investigate.
    topic: String,

    /// Maximum number of search→extract→analyze depth iterations.
    #[arg(long)]
    max_depth: Option<u32>,

    /// Wall-clock budget for the research loop, in seconds.
    #[arg(long)]
    time_limit_secs: Option<u64>,

    /// Hard outer deadline past which in-flight calls are cancelled, in
    /// seconds.
    #[arg(long)]
    hard_deadline_secs: Option<u64>,
}

/// Prints each event to stdout as it is emitted, mirroring the teacher's
/// `ctx.stream(&status)` progress-notification pattern in
/// `tools/browser_research.rs`, generalized from a bare string to the typed
/// event stream.
struct StdoutEventSink;

#[async_trait::async_trait]
impl EventSink for StdoutEventSink {
    async fn emit(&self, event: Event) {
        match &event {
            Event::ProgressInit(p) => {
                println!("[init] max_depth={} total_steps={}", p.max_depth, p.total_steps);
            }
            Event::DepthDelta(d) => {
                println!("[depth {}/{}] completed={}/{}", d.current, d.max, d.completed_steps, d.total_steps);
            }
            Event::ActivityDelta(a) => {
                println!(
                    "  [{:?}/{:?}] {} (depth {}, {}/{})",
                    a.kind, a.status, a.message, a.depth, a.completed_steps, a.total_steps
                );
            }
            Event::SourceDelta(s) => {
                println!("  [source] {} — {}", s.title, s.url);
            }
            Event::Finish(f) => {
                println!("\n=== Final analysis ===\n{}", f.content);
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = Config::load()?;
    let secrets = Secrets::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let clients = build_clients(&config, &secrets);

    let mut request = ResearchRequest::new(args.topic).with_max_depth(args.max_depth.unwrap_or(config.max_depth));
    if let Some(secs) = args.time_limit_secs {
        request = request.with_time_limit(Duration::from_secs(secs));
    } else {
        request = request.with_time_limit(config.time_limit());
    }

    let hard_deadline = args
        .hard_deadline_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.hard_deadline());

    let research_loop = ResearchLoop::new(clients, Arc::new(StdoutEventSink));
    let outcome = research_loop.run_with_hard_deadline(request, hard_deadline).await;

    if !outcome.success {
        if let Some(err) = &outcome.error {
            eprintln!("research did not complete successfully: {err}");
        }
        std::process::exit(1);
    }

    Ok(())
}
