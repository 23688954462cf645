use clap::Parser;
use std::path::PathBuf;

/// CLI arguments for pawchat
#[derive(Parser)]
#[command(name = "pawchat")]
#[command(about = "Pawchat - local-first pet-care chat with a simulated counterpart")]
#[command(version = "0.1.0")]
pub struct Cli {
    /// Directory holding the durable chat collections
    #[arg(long, value_name = "DIR", default_value = "pawchat-data")]
    pub data_dir: PathBuf,

    /// Counterpart id the conversation is opened with
    #[arg(long, default_value = "caretaker-1")]
    pub counterpart: String,

    /// Display name for the counterpart
    #[arg(long, default_value = "Happy Paws Caretaking")]
    pub name: String,

    /// Persistence collection the conversation lives in
    #[arg(long, default_value = "caretaker_chats")]
    pub collection: String,

    /// Schedule a simulated reply for every message kind, not just text
    #[arg(long)]
    pub reply_always: bool,

    /// Keep everything in memory; skip the on-disk store
    #[arg(long)]
    pub ephemeral: bool,

    /// Show recorder ticks and delivery updates as they happen
    #[arg(long, short = 'v')]
    pub verbose: bool,
}
