mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cli::{AmiArgs, InstanceArgs, TemplateArgs};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List & prune machine images
    Ami(AmiArgs),
    /// Launch template workflows
    Template(TemplateArgs),
    /// EC2 instance workflows
    Instance(InstanceArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    use Commands::*;
    match cli.command {
        Ami(args) => args.main().await,
        Template(args) => args.main().await,
        Instance(args) => args.main().await,
    }
}
