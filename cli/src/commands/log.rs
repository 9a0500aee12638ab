use crate::error::Error;
use crate::logs::{Logs, LATEST_STREAM};
use crate::runner::{Runnable, Runner};
use clap::ArgAction;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Select;

#[derive(clap::Args, Clone)]
pub(crate) struct LogCommand {
    /// Print the most recent stream without prompting
    #[arg(short, long, action = ArgAction::SetTrue)]
    latest: bool,
}

impl Runnable for LogCommand {
    fn runner(&self) -> impl Runner {
        LogRunner {
            command: self.clone(),
        }
    }
}

pub(crate) struct LogRunner {
    command: LogCommand,
}

impl Runner for LogRunner {
    /// Browse execution logs of the project
    async fn run(&mut self) -> Result<(), Error> {
        let project = self.project().await?;
        let config = self.sdk_config().await;

        let logs = Logs::new(&config);
        let group = project.log_group();

        let stream = if self.command.latest {
            LATEST_STREAM.to_string()
        } else {
            let streams = logs.streams(&group).await?;

            if streams.is_empty() {
                println!("{}", console::style("No log streams yet").dim());
                return Ok(());
            }

            let items: Vec<String> = streams
                .iter()
                .map(|stream| {
                    format!(
                        "{}  {}",
                        stream.name,
                        stream.last_event.as_deref().unwrap_or("no events")
                    )
                })
                .collect();

            let selected = Select::with_theme(&ColorfulTheme::default())
                .with_prompt("Select a log stream")
                .items(&items)
                .default(0)
                .interact()
                .map_err(|e| {
                    self.error(
                        Some("Log stream selection failed"),
                        Some("Use --latest to print the most recent stream instead."),
                        Some(Box::new(e)),
                    )
                })?;

            streams[selected].name.clone()
        };

        for line in logs.events(&group, &stream).await? {
            println!("{line}");
        }

        Ok(())
    }
}
