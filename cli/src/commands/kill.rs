use crate::batch::Batch;
use crate::commands::spinner;
use crate::ecr::Registry;
use crate::error::Error;
use crate::iam::Roles;
use crate::lambda::Function;
use crate::logs::Logs;
use crate::project::ComputeType;
use crate::runner::{Runnable, Runner};
use crate::schedule::Schedules;
use crate::utils::slugify;

#[derive(clap::Args, Clone)]
pub(crate) struct KillCommand {
    /// Delete a single schedule instead of the whole project
    #[arg(short, long)]
    schedule: Option<String>,
}

impl Runnable for KillCommand {
    fn runner(&self) -> impl Runner {
        KillRunner {
            command: self.clone(),
        }
    }
}

pub(crate) struct KillRunner {
    command: KillCommand,
}

impl Runner for KillRunner {
    /// Tear the project down, or delete a single schedule
    ///
    /// Teardown runs as an ordered list of steps. Resources that are
    /// already gone are skipped quietly, a step failing for a real
    /// reason is reported and the remaining steps still run.
    async fn run(&mut self) -> Result<(), Error> {
        let project = self.project().await?;
        let config = self.sdk_config().await;

        if let Some(schedule) = &self.command.schedule {
            let schedule = slugify(schedule);

            Schedules::new(&config)
                .delete(&project.name, &schedule)
                .await?;

            println!(
                "{}",
                console::style(format!("Deleted schedule: {schedule}"))
                    .green()
                    .bold()
            );

            return Ok(());
        }

        let progress = spinner("Deleting project...");
        let name = &project.name;
        let schedule_role = format!("{name}_schedule");

        let roles = Roles::new(&config);
        let schedules = Schedules::new(&config);
        let logs = Logs::new(&config);

        progress.set_message("Deleting schedules");
        tolerate("schedule group", schedules.delete_group(name).await);

        match project.compute_type {
            ComputeType::Batch => {
                let batch = Batch::new(&config);

                progress.set_message("Deleting the Batch environment");
                tolerate("job queue disable", batch.disable_job_queue(name).await);
                tolerate("job queue", batch.delete_job_queue(name).await);
                tolerate(
                    "compute environment disable",
                    batch.disable_compute_environment(name).await,
                );
                tolerate(
                    "compute environment",
                    batch.delete_compute_environment(name).await,
                );
                tolerate(
                    "job definitions",
                    batch.deregister_job_definitions(name).await,
                );

                progress.set_message("Deleting logs and roles");
                tolerate("log group", logs.delete_group(&project.log_group()).await);
                tolerate("project role", roles.delete_role(name).await);
                tolerate("schedule role", roles.delete_role(&schedule_role).await);
            }
            _ => {
                progress.set_message("Deleting the function");
                tolerate("function", Function::new(&config).delete(name).await);

                progress.set_message("Deleting roles and the repository");
                tolerate("project role", roles.delete_role(name).await);
                tolerate("schedule role", roles.delete_role(&schedule_role).await);
                tolerate("repository", Registry::new(&config).delete(name).await);
            }
        }

        progress.finish_and_clear();
        println!("{}", console::style("Project deleted").green().bold());

        Ok(())
    }
}

/// Report a failed teardown step and keep going
fn tolerate(step: &str, result: eyre::Result<()>) {
    if let Err(e) = result {
        log::warn!("Teardown step failed ({step}): {e:#}");
        println!("{}", console::style(format!("Skipping {step}")).dim());
    }
}
