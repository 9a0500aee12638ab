mod batch;
mod commands;
mod docker;
mod ecr;
mod error;
mod iam;
mod lambda;
mod logger;
mod logs;
mod package;
mod process;
mod project;
mod runner;
mod schedule;
mod utils;
mod waiter;

use crate::commands::Commands;
use crate::logger::Logger;
use crate::runner::{Runnable, Runner};
use clap::Parser;

#[derive(Parser)]
#[command(
    name = "red",
    version,
    about = "Really Easy Deployments",
    long_about = None,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Derive a runner from the command and run it
async fn run(command: impl Runnable) {
    let run = command.runner().run().await;

    if let Err(error) = run {
        eprintln!("\n{}\n{error}", console::style("Error").red().bold());
        std::process::exit(1);
    }
}

#[tokio::main]
async fn main() {
    Logger::init();

    // Match all commands here, in one place
    match Cli::parse().command {
        Commands::Init(cmd) => run(cmd).await,
        Commands::Deploy(cmd) => run(cmd).await,
        Commands::Run(cmd) => run(cmd).await,
        Commands::Sched(cmd) => run(cmd).await,
        Commands::Kill(cmd) => run(cmd).await,
        Commands::Log(cmd) => run(cmd).await,
    }
}
