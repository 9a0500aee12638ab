use crate::{error::Error, project::Project};
use aws_config::{BehaviorVersion, SdkConfig};
use std::error::Error as StdError;

pub(crate) trait Runner {
    /// Resolved AWS SDK config (region, credentials) for the invocation
    async fn sdk_config(&self) -> SdkConfig {
        aws_config::defaults(BehaviorVersion::latest()).load().await
    }

    /// Current working project
    async fn project(&self) -> Result<Project, Error> {
        let project = Project::from_current_dir();

        if project.is_err() {
            return Err(self.error(
                Some("Project not found"),
                Some("Could not find a .red config in the current directory"),
                None,
            ));
        }

        Ok(project?)
    }

    /// Run the command
    ///
    /// Returns an error shown to the user in case of failure
    async fn run(&mut self) -> Result<(), Error>;

    /// Construct an error shown to the user
    fn error(
        &self,
        title: Option<&str>,
        description: Option<&str>,
        origin: Option<Box<dyn StdError>>,
    ) -> Error {
        if let Some(origin) = origin {
            log::error!("{origin:?}");
        }

        if let Some(title) = title {
            Error::new(title, description)
        } else {
            Error::new(
                "Failed to run the command",
                Some("Check red.log in the project directory for details."),
            )
        }
    }
}

/// Return a runner for a command
pub(crate) trait Runnable {
    fn runner(&self) -> impl Runner;
}
