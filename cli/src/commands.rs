pub mod deploy;
pub mod init;
pub mod kill;
pub mod log;
pub mod run;
pub mod sched;

use crate::logger::Logger;
use clap::Subcommand;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

#[derive(Subcommand)]
pub enum Commands {
    /// Scaffold a new project directory
    Init(init::InitCommand),

    /// Provision cloud resources and ship the current code
    Deploy(deploy::DeployCommand),

    /// Execute the workload now, or put it on a schedule
    Run(run::RunCommand),

    /// List schedules of the project
    Sched(sched::SchedCommand),

    /// Tear the project down, or delete a single schedule
    Kill(kill::KillCommand),

    /// Browse execution logs of the project
    Log(log::LogCommand),
}

/// A spinner for long running phases, attached to the shared progress area
pub(crate) fn spinner(message: &str) -> ProgressBar {
    let bar = Logger::multi_progress().add(ProgressBar::new_spinner());

    bar.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} {msg}")
            .unwrap(),
    );
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));

    bar
}
