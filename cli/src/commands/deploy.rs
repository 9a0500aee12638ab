use crate::batch::Batch;
use crate::commands::spinner;
use crate::docker::Docker;
use crate::ecr::Registry;
use crate::error::Error;
use crate::iam::Roles;
use crate::lambda::{Code, Function};
use crate::logs::Logs;
use crate::package;
use crate::project::{ComputeType, Project};
use crate::runner::{Runnable, Runner};
use clap::ArgAction;

#[derive(clap::Args, Clone)]
pub(crate) struct DeployCommand {
    /// Skip the image build phase (container workloads only)
    #[arg(long, action = ArgAction::SetTrue)]
    skip_build: bool,

    /// Build but do not push the image (container workloads only)
    #[arg(long, action = ArgAction::SetTrue)]
    skip_push: bool,

    /// Only ship the image, do not touch compute infrastructure
    #[arg(long, action = ArgAction::SetTrue)]
    no_infra: bool,
}

impl Runnable for DeployCommand {
    fn runner(&self) -> impl Runner {
        DeployRunner {
            command: self.clone(),
        }
    }
}

pub(crate) struct DeployRunner {
    command: DeployCommand,
}

impl Runner for DeployRunner {
    /// Reconcile every resource of the project and ship the current code
    async fn run(&mut self) -> Result<(), Error> {
        let project = self.project().await?;
        let config = self.sdk_config().await;
        let progress = spinner("Deploying project...");

        match project.compute_type {
            ComputeType::LambdaCode => {
                progress.set_message("Bundling the deployment package");
                let bundle = package::bundle(&project).await?;

                progress.set_message("Provisioning the function");
                let role_arn = workload_role(&Roles::new(&config), &project).await?;

                Function::new(&config)
                    .ensure(&project.name, &role_arn, Code::Zip(bundle), &project)
                    .await?;
            }
            ComputeType::Lambda | ComputeType::Batch => {
                let registry = Registry::new(&config);
                let uri = registry.ensure(&project.name).await?;

                if !self.command.skip_build {
                    progress.set_message("Building and pushing the image");

                    let (endpoint, password) = registry.credentials().await?;

                    Docker::login(&endpoint, "AWS", &password)?;
                    Docker::build(&uri)?;

                    if !self.command.skip_push {
                        Docker::push(&uri)?;
                    }
                }

                if self.command.no_infra || self.command.skip_push {
                    progress.finish_and_clear();
                    println!("{}", console::style("Image shipped").green().bold());
                    return Ok(());
                }

                let roles = Roles::new(&config);
                let role_arn = workload_role(&roles, &project).await?;

                if project.compute_type == ComputeType::Batch {
                    progress.set_message("Provisioning the Batch environment");

                    Logs::new(&config)
                        .ensure_group(&project.log_group(), &project.name)
                        .await?;

                    let batch = Batch::new(&config);

                    batch
                        .ensure_compute_environment(&project.name, &role_arn, &project)
                        .await?;
                    batch.ensure_job_queue(&project.name, &project.name).await?;
                    batch
                        .register_job_definition(
                            &project.name,
                            &uri,
                            &role_arn,
                            &project.log_group(),
                            &project,
                        )
                        .await?;
                } else {
                    progress.set_message("Provisioning the function");

                    Function::new(&config)
                        .ensure(&project.name, &role_arn, Code::Image(uri), &project)
                        .await?;
                }
            }
        }

        progress.finish_and_clear();
        println!("{}", console::style("Project deployed").green().bold());

        Ok(())
    }
}

/// Role the workload itself runs under
///
/// A pre-existing Role from the config short-circuits provisioning
/// entirely, otherwise the role matching the compute type is ensured.
pub(crate) async fn workload_role(roles: &Roles, project: &Project) -> eyre::Result<String> {
    if let Some(arn) = &project.role {
        log::info!("Using the preconfigured role: {arn}");
        return Ok(arn.clone());
    }

    match project.compute_type {
        ComputeType::Batch => roles.ensure_batch_role(&project.name).await,
        _ => {
            roles
                .ensure_lambda_role(&project.name, project.iam_policy.as_ref())
                .await
        }
    }
}
