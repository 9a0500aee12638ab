use crate::error::Error;
use crate::runner::{Runnable, Runner};
use crate::schedule::Schedules;

#[derive(clap::Args, Clone)]
pub(crate) struct SchedCommand {}

impl Runnable for SchedCommand {
    fn runner(&self) -> impl Runner {
        SchedRunner {}
    }
}

pub(crate) struct SchedRunner {}

impl Runner for SchedRunner {
    /// Print the schedules of the project
    async fn run(&mut self) -> Result<(), Error> {
        let project = self.project().await?;
        let config = self.sdk_config().await;

        let schedules = Schedules::new(&config).list(&project.name).await?;

        if schedules.is_empty() {
            println!("{}", console::style("No schedules").dim());
            return Ok(());
        }

        println!(
            "{}",
            console::style(format!("Schedules of {}", project.name)).bold()
        );

        for (index, schedule) in schedules.iter().enumerate() {
            println!(
                "{}. {}  {}",
                index + 1,
                schedule.name,
                console::style(schedule.created.as_deref().unwrap_or("")).dim()
            );
        }

        Ok(())
    }
}
