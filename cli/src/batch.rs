use crate::project::{Arch, Project};
use crate::waiter::{self, wait_until};
use aws_config::SdkConfig;
use aws_sdk_batch::types::{
    AssignPublicIp, CeState, CeStatus, CeType, ComputeEnvironmentOrder, ComputeResource,
    ContainerOverrides, ContainerProperties, CrType, FargatePlatformConfiguration,
    JobDefinitionType, JobTimeout, JqState, JqStatus, KeyValuePair, LogConfiguration, LogDriver,
    NetworkConfiguration, PlatformCapability, ResourceRequirement, ResourceType, RetryStrategy,
    RuntimePlatform,
};
use eyre::{Context, ContextCompat};

/// AWS Batch resources of the project
///
/// Compute environment, job queue and job definition all share the
/// project name. The environment and the queue are reused across
/// deploys, the job definition is replaced on every one.
pub struct Batch {
    client: aws_sdk_batch::Client,
    region: String,
}

impl Batch {
    pub fn new(config: &SdkConfig) -> Self {
        Batch {
            client: aws_sdk_batch::Client::new(config),
            region: config.region().map(ToString::to_string).unwrap_or_default(),
        }
    }

    /// Create the Fargate compute environment if absent and wait for it
    /// to become VALID
    pub async fn ensure_compute_environment(
        &self,
        name: &str,
        service_role: &str,
        project: &Project,
    ) -> eyre::Result<()> {
        if self.compute_environment_status(name).await?.is_some() {
            log::info!("Compute environment already exists: {name}");
            return Ok(());
        }

        log::info!("Creating compute environment: {name}");

        self.client
            .create_compute_environment()
            .compute_environment_name(name)
            .r#type(CeType::Managed)
            .state(CeState::Enabled)
            .service_role(service_role)
            .compute_resources(
                ComputeResource::builder()
                    .r#type(CrType::Fargate)
                    .maxv_cpus(100)
                    .set_subnets(Some(project.vpc.subnet_ids.clone()))
                    .set_security_group_ids(Some(project.vpc.security_group_ids.clone()))
                    .build(),
            )
            .send()
            .await
            .wrap_err("Failed to create compute environment")?;

        let client = self.client.clone();
        let name_owned = name.to_string();

        wait_until(
            "compute environment to become VALID",
            waiter::POLL_INTERVAL,
            waiter::BATCH_MAX_WAIT,
            move || {
                let client = client.clone();
                let name = name_owned.clone();

                async move {
                    let described = client
                        .describe_compute_environments()
                        .compute_environments(&name)
                        .send()
                        .await
                        .wrap_err("Failed to describe compute environments")?;

                    Ok(described
                        .compute_environments()
                        .first()
                        .and_then(|e| e.status())
                        .is_some_and(|s| *s == CeStatus::Valid))
                }
            },
        )
        .await
    }

    /// Create the job queue bound to the compute environment if absent
    /// and wait for it to become VALID
    pub async fn ensure_job_queue(&self, name: &str, compute_environment: &str) -> eyre::Result<()> {
        if self.job_queue_status(name).await?.is_some() {
            log::info!("Job queue already exists: {name}");
            return Ok(());
        }

        log::info!("Creating job queue: {name}");

        self.client
            .create_job_queue()
            .job_queue_name(name)
            .state(JqState::Enabled)
            .priority(1)
            .compute_environment_order(
                ComputeEnvironmentOrder::builder()
                    .order(1)
                    .compute_environment(compute_environment)
                    .build(),
            )
            .send()
            .await
            .wrap_err("Failed to create job queue")?;

        let client = self.client.clone();
        let name_owned = name.to_string();

        wait_until(
            "job queue to become VALID",
            waiter::POLL_INTERVAL,
            waiter::BATCH_MAX_WAIT,
            move || {
                let client = client.clone();
                let name = name_owned.clone();

                async move {
                    let described = client
                        .describe_job_queues()
                        .job_queues(&name)
                        .send()
                        .await
                        .wrap_err("Failed to describe job queues")?;

                    Ok(described
                        .job_queues()
                        .first()
                        .and_then(|q| q.status())
                        .is_some_and(|s| *s == JqStatus::Valid))
                }
            },
        )
        .await
    }

    /// Register a fresh job definition revision for the pushed image
    ///
    /// Registration is deliberately not idempotent: prior active
    /// revisions are deregistered first, so exactly one ACTIVE revision
    /// exists after every deploy.
    pub async fn register_job_definition(
        &self,
        name: &str,
        image_uri: &str,
        role_arn: &str,
        log_group: &str,
        project: &Project,
    ) -> eyre::Result<String> {
        self.deregister_job_definitions(name).await?;

        log::info!("Registering job definition: {name}");

        let assign_public_ip = match project.assign_public_ip() {
            "ENABLED" => AssignPublicIp::Enabled,
            _ => AssignPublicIp::Disabled,
        };

        let mut container = ContainerProperties::builder()
            .image(image_uri)
            .job_role_arn(role_arn)
            .execution_role_arn(role_arn)
            .fargate_platform_configuration(
                FargatePlatformConfiguration::builder()
                    .platform_version("LATEST")
                    .build(),
            )
            .network_configuration(
                NetworkConfiguration::builder()
                    .assign_public_ip(assign_public_ip)
                    .build(),
            )
            .resource_requirements(
                ResourceRequirement::builder()
                    .r#type(ResourceType::Vcpu)
                    .value(project.vcpus())
                    .build(),
            )
            .resource_requirements(
                ResourceRequirement::builder()
                    .r#type(ResourceType::Memory)
                    .value(project.memory_size().to_string())
                    .build(),
            )
            .log_configuration(
                LogConfiguration::builder()
                    .log_driver(LogDriver::Awslogs)
                    .options("awslogs-group", log_group)
                    .options("awslogs-region", &self.region)
                    .options("awslogs-stream-prefix", name)
                    .build(),
            );

        for (key, value) in &project.env {
            container = container.environment(
                KeyValuePair::builder().name(key).value(value).build(),
            );
        }

        if project.arch == Arch::Arm64 {
            container = container.runtime_platform(
                RuntimePlatform::builder()
                    .cpu_architecture("ARM64")
                    .operating_system_family("LINUX")
                    .build(),
            );
        }

        let registered = self
            .client
            .register_job_definition()
            .job_definition_name(name)
            .r#type(JobDefinitionType::Container)
            .platform_capabilities(PlatformCapability::Fargate)
            .timeout(
                JobTimeout::builder()
                    .attempt_duration_seconds(project.timeout())
                    .build(),
            )
            .retry_strategy(RetryStrategy::builder().attempts(1).build())
            .propagate_tags(true)
            .container_properties(container.build())
            .send()
            .await
            .wrap_err("Failed to register job definition")?;

        let arn = registered
            .job_definition_arn()
            .wrap_err("Registered job definition has no ARN")?
            .to_string();

        let client = self.client.clone();
        let arn_owned = arn.clone();

        wait_until(
            "job definition to become ACTIVE",
            waiter::POLL_INTERVAL,
            waiter::BATCH_MAX_WAIT,
            move || {
                let client = client.clone();
                let arn = arn_owned.clone();

                async move {
                    let described = client
                        .describe_job_definitions()
                        .job_definitions(&arn)
                        .send()
                        .await
                        .wrap_err("Failed to describe job definitions")?;

                    Ok(described
                        .job_definitions()
                        .first()
                        .and_then(|d| d.status())
                        .is_some_and(|s| s == "ACTIVE"))
                }
            },
        )
        .await?;

        Ok(arn)
    }

    /// Environment variables baked into the active job definition
    pub async fn job_definition_env(&self, name: &str) -> eyre::Result<Vec<(String, String)>> {
        let described = self
            .client
            .describe_job_definitions()
            .job_definition_name(name)
            .status("ACTIVE")
            .send()
            .await
            .wrap_err("Failed to describe job definitions")?;

        let mut env = vec![];

        for definition in described.job_definitions() {
            let pairs = definition
                .container_properties()
                .map(|c| c.environment())
                .unwrap_or_default();

            for pair in pairs {
                if let (Some(name), Some(value)) = (pair.name(), pair.value()) {
                    env.push((name.to_string(), value.to_string()));
                }
            }
        }

        Ok(env)
    }

    /// Submit a job with optional environment overrides
    pub async fn submit_job(
        &self,
        job_name: &str,
        queue: &str,
        definition: &str,
        env: Vec<(String, String)>,
    ) -> eyre::Result<String> {
        let mut request = self
            .client
            .submit_job()
            .job_name(job_name)
            .job_queue(queue)
            .job_definition(definition);

        if !env.is_empty() {
            let mut overrides = ContainerOverrides::builder();

            for (name, value) in env {
                overrides =
                    overrides.environment(KeyValuePair::builder().name(name).value(value).build());
            }

            request = request.container_overrides(overrides.build());
        }

        let submitted = request.send().await.wrap_err("Failed to submit batch job")?;

        Ok(submitted
            .job_id()
            .wrap_err("Submitted job has no id")?
            .to_string())
    }

    /// Disable the job queue and wait for the DISABLED state to settle
    pub async fn disable_job_queue(&self, name: &str) -> eyre::Result<()> {
        log::info!("Disabling job queue: {name}");

        self.client
            .update_job_queue()
            .job_queue(name)
            .state(JqState::Disabled)
            .send()
            .await
            .wrap_err("Failed to disable job queue")?;

        let client = self.client.clone();
        let name_owned = name.to_string();

        wait_until(
            "job queue to be disabled",
            waiter::POLL_INTERVAL,
            waiter::BATCH_MAX_WAIT,
            move || {
                let client = client.clone();
                let name = name_owned.clone();

                async move {
                    let described = client
                        .describe_job_queues()
                        .job_queues(&name)
                        .send()
                        .await
                        .wrap_err("Failed to describe job queues")?;

                    let Some(queue) = described.job_queues().first() else {
                        return Ok(true);
                    };

                    Ok(queue.status().is_some_and(|s| *s == JqStatus::Valid)
                        && queue.state().is_some_and(|s| *s == JqState::Disabled))
                }
            },
        )
        .await
    }

    /// Delete the job queue and wait until it is gone
    pub async fn delete_job_queue(&self, name: &str) -> eyre::Result<()> {
        log::info!("Deleting job queue: {name}");

        self.client
            .delete_job_queue()
            .job_queue(name)
            .send()
            .await
            .wrap_err("Failed to delete job queue")?;

        let client = self.client.clone();
        let name_owned = name.to_string();

        wait_until(
            "job queue to be deleted",
            waiter::POLL_INTERVAL,
            waiter::BATCH_MAX_WAIT,
            move || {
                let client = client.clone();
                let name = name_owned.clone();

                async move {
                    let described = client
                        .describe_job_queues()
                        .job_queues(&name)
                        .send()
                        .await
                        .wrap_err("Failed to describe job queues")?;

                    Ok(described.job_queues().is_empty()
                        || described
                            .job_queues()
                            .first()
                            .and_then(|q| q.status())
                            .is_some_and(|s| *s == JqStatus::Deleted))
                }
            },
        )
        .await
    }

    /// Disable the compute environment and wait for it to settle
    pub async fn disable_compute_environment(&self, name: &str) -> eyre::Result<()> {
        log::info!("Disabling compute environment: {name}");

        self.client
            .update_compute_environment()
            .compute_environment(name)
            .state(CeState::Disabled)
            .send()
            .await
            .wrap_err("Failed to disable compute environment")?;

        let client = self.client.clone();
        let name_owned = name.to_string();

        wait_until(
            "compute environment to be disabled",
            waiter::POLL_INTERVAL,
            waiter::BATCH_MAX_WAIT,
            move || {
                let client = client.clone();
                let name = name_owned.clone();

                async move {
                    let described = client
                        .describe_compute_environments()
                        .compute_environments(&name)
                        .send()
                        .await
                        .wrap_err("Failed to describe compute environments")?;

                    let Some(env) = described.compute_environments().first() else {
                        return Ok(true);
                    };

                    Ok(env.status().is_some_and(|s| *s == CeStatus::Valid)
                        && env.state().is_some_and(|s| *s == CeState::Disabled))
                }
            },
        )
        .await
    }

    /// Delete the compute environment and wait until it is gone
    pub async fn delete_compute_environment(&self, name: &str) -> eyre::Result<()> {
        log::info!("Deleting compute environment: {name}");

        self.client
            .delete_compute_environment()
            .compute_environment(name)
            .send()
            .await
            .wrap_err("Failed to delete compute environment")?;

        let client = self.client.clone();
        let name_owned = name.to_string();

        wait_until(
            "compute environment to be deleted",
            waiter::POLL_INTERVAL,
            waiter::BATCH_MAX_WAIT,
            move || {
                let client = client.clone();
                let name = name_owned.clone();

                async move {
                    let described = client
                        .describe_compute_environments()
                        .compute_environments(&name)
                        .send()
                        .await
                        .wrap_err("Failed to describe compute environments")?;

                    Ok(described.compute_environments().is_empty()
                        || described
                            .compute_environments()
                            .first()
                            .and_then(|e| e.status())
                            .is_some_and(|s| *s == CeStatus::Deleted))
                }
            },
        )
        .await
    }

    /// Deregister every revision of the definition that is not INACTIVE
    pub async fn deregister_job_definitions(&self, name: &str) -> eyre::Result<()> {
        let described = self
            .client
            .describe_job_definitions()
            .job_definition_name(name)
            .send()
            .await
            .wrap_err("Failed to describe job definitions")?;

        for definition in described.job_definitions() {
            if definition.status() == Some("INACTIVE") {
                continue;
            }

            let arn = definition
                .job_definition_arn()
                .wrap_err("Job definition has no ARN")?;

            log::info!("Deregistering job definition revision: {arn}");

            self.client
                .deregister_job_definition()
                .job_definition(arn)
                .send()
                .await
                .wrap_err("Failed to deregister job definition")?;
        }

        Ok(())
    }

    async fn compute_environment_status(&self, name: &str) -> eyre::Result<Option<CeStatus>> {
        let described = self
            .client
            .describe_compute_environments()
            .compute_environments(name)
            .send()
            .await
            .wrap_err("Failed to describe compute environments")?;

        Ok(described
            .compute_environments()
            .first()
            .and_then(|e| e.status())
            .cloned())
    }

    async fn job_queue_status(&self, name: &str) -> eyre::Result<Option<JqStatus>> {
        let described = self
            .client
            .describe_job_queues()
            .job_queues(name)
            .send()
            .await
            .wrap_err("Failed to describe job queues")?;

        Ok(described
            .job_queues()
            .first()
            .and_then(|q| q.status())
            .cloned())
    }
}
