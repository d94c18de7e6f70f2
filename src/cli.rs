use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "parley",
    about = "Chat with an AI agent from your terminal",
    long_about = "Parley signs you in to a Supabase project, sends your messages to an inference endpoint and streams the stored conversation back as it is written.",
    version
)]
pub struct Cli {
    /// Base URL of the Supabase project
    #[arg(long, env = "SUPABASE_URL")]
    pub supabase_url: Option<String>,

    /// Public anon key of the Supabase project
    #[arg(long, env = "SUPABASE_ANON_KEY")]
    pub supabase_anon_key: Option<String>,

    /// Inference endpoint that receives chat messages
    #[arg(long, env = "API_URL")]
    pub api_url: Option<String>,

    /// Directory holding `.parley/` (defaults to the current directory)
    #[arg(long)]
    pub workspace: Option<PathBuf>,

    #[arg(short, long)]
    pub verbose: bool,
}
