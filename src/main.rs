//! Chorus - Main entry point.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use chorus::{
    agent::{OrchestratorDeps, RespondRequest, ResponseOrchestrator, ResponseOutcome},
    chat::{Identity, Message},
    cli::{Cli, Command, SendArgs},
    config::Config,
    llm::OpenAiCompatibleCompletion,
    prompt::{NoRules, PromptTemplates},
    store::InMemoryMessageStore,
    task::InMemoryHumanLoopRegistry,
    tools::{InMemoryToolLog, ToolServerPool},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load .env if present
    let _ = dotenvy::dotenv();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chorus=info"));
    if cli.log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    let config = Config::from_env()?;

    match cli.command {
        Command::Config => {
            println!("{config:#?}");
            Ok(())
        }
        Command::Send(args) => send(config, args).await,
    }
}

async fn send(config: Config, args: SendArgs) -> anyhow::Result<()> {
    let model = config.completion.model_selection()?;
    let completion = Arc::new(OpenAiCompatibleCompletion::new(config.completion.clone())?);
    // No tool servers or task orchestrator are wired up from the command line.
    let pool = Arc::new(ToolServerPool::new());

    let deps = OrchestratorDeps {
        completion,
        tool_servers: Arc::clone(&pool),
        catalog: pool,
        tasks: None,
        human_loop: Arc::new(InMemoryHumanLoopRegistry::new()),
        store: Arc::new(InMemoryMessageStore::new()),
        tool_log: Arc::new(InMemoryToolLog::new()),
        rules: Arc::new(NoRules),
        templates: PromptTemplates::new(),
        config: config.orchestrator,
    };
    let orchestrator = Arc::new(ResponseOrchestrator::new(deps).with_default_model(model));

    let user = Identity::new("cli-user", whoami()).with_display_name("You");
    let assistant = Identity::new("chorus", "chorus").with_display_name("Chorus");
    orchestrator
        .chats()
        .push(Message::user(args.chat.clone(), &user, args.message.clone()))
        .await;

    let request = RespondRequest::new(
        args.chat.clone(),
        user,
        assistant,
        args.message.clone(),
        args.mode_context()?,
    );

    // Ctrl-C stops the stream and keeps the partial reply.
    let stream_id = request.stream_id.clone();
    let abort_handle = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                orchestrator.abort(&stream_id).await;
            }
        })
    };

    let outcome = orchestrator.respond(request).await;
    abort_handle.abort();
    let outcome = outcome?;

    if let Some(message) = orchestrator.chats().get(outcome.message_id()).await {
        println!("{}", message.text);
        for call in &message.tool_calls {
            println!("  [tool] {} ({})", call.function_name, call.status);
        }
    }

    match outcome {
        ResponseOutcome::Failed { reason, .. } => anyhow::bail!("response failed: {reason}"),
        ResponseOutcome::AwaitingHuman { thread_id, .. } => {
            eprintln!("Waiting for human input on thread {thread_id}");
            Ok(())
        }
        ResponseOutcome::Completed { .. } | ResponseOutcome::Stopped { .. } => Ok(()),
    }
}

fn whoami() -> String {
    std::env::var("USER").unwrap_or_else(|_| "user".to_string())
}
