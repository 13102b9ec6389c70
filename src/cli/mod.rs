//! CLI command handling.
//!
//! Provides subcommands for:
//! - Sending one message through the orchestrator (`send`)
//! - Showing the resolved configuration (`config`)

use clap::{ColorChoice, Parser, Subcommand};

use crate::chat::{ActiveFile, KnowledgeSelection, ModeContext, Section};

#[derive(Parser, Debug)]
#[command(name = "chorus")]
#[command(about = "Route a chat message through Ask, Query or Agent mode")]
#[command(
    long_about = "Chorus picks a response mode from the section a message was sent from.\nExamples:\n  chorus send -m \"hello\"  # Ask mode\n  chorus send --section knowledge --kb docs -m \"what is X?\"  # Query mode"
)]
#[command(version)]
#[command(color = ColorChoice::Auto)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "CHORUS_LOG_JSON")]
    pub log_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one message and print the assistant's reply
    Send(SendArgs),

    /// Print the configuration resolved from the environment
    Config,
}

#[derive(clap::Args, Debug, Clone)]
pub struct SendArgs {
    /// Message text
    #[arg(short, long)]
    pub message: String,

    /// Section the message is sent from (chat, avatar, file-edit, knowledge, agents)
    #[arg(long, default_value = "chat")]
    pub section: Section,

    /// Knowledge base ids (repeatable)
    #[arg(long = "kb")]
    pub knowledge_bases: Vec<String>,

    /// Tool server ids (repeatable)
    #[arg(long = "tool-server")]
    pub tool_servers: Vec<String>,

    /// Workspace id forwarded to the completion service
    #[arg(long)]
    pub workspace: Option<String>,

    /// File to attach as the active editor file
    #[arg(long)]
    pub file: Option<std::path::PathBuf>,

    /// Chat id to post into
    #[arg(long, default_value = "cli")]
    pub chat: String,
}

impl SendArgs {
    /// Build the mode context for this invocation.
    pub fn mode_context(&self) -> std::io::Result<ModeContext> {
        let mut ctx = ModeContext::new(self.section)
            .with_knowledge(KnowledgeSelection {
                kb_ids: self.knowledge_bases.clone(),
                ..Default::default()
            })
            .with_tool_servers(self.tool_servers.clone());
        if let Some(workspace) = &self.workspace {
            ctx = ctx.with_workspace(workspace.clone());
        }
        if let Some(path) = &self.file {
            let content = std::fs::read_to_string(path)?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            ctx = ctx.with_active_file(ActiveFile::new(name, content));
        }
        Ok(ctx)
    }
}
