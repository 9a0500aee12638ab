use crate::project::{Arch, Project};
use crate::waiter::{self, wait_until};
use aws_config::SdkConfig;
use aws_sdk_lambda::error::ProvideErrorMetadata;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::{
    Architecture, Environment, FunctionCode, InvocationType, LastUpdateStatus, LogType,
    PackageType, Runtime, State, VpcConfig,
};
use base64::Engine;
use eyre::{Context, ContextCompat};
use std::collections::HashMap;

/// Deployable function code, either a pushed image or zip bytes
pub enum Code {
    Image(String),
    Zip(Vec<u8>),
}

/// Lambda function of the project
pub struct Function {
    client: aws_sdk_lambda::Client,
}

impl Function {
    pub fn new(config: &SdkConfig) -> Self {
        Function {
            client: aws_sdk_lambda::Client::new(config),
        }
    }

    /// Create the function, or update its configuration and code
    ///
    /// Updates are unconditional, every deploy pushes the current config
    /// and code. The only change signal is the version counter in the
    /// environment variables, bumped on each update and set to 1 on the
    /// first create. Architecture is applied on create only, the
    /// provider does not allow changing it in place.
    pub async fn ensure(
        &self,
        name: &str,
        role_arn: &str,
        code: Code,
        project: &Project,
    ) -> eyre::Result<()> {
        let existing = self.client.get_function().function_name(name).send().await;

        match existing {
            Ok(existing) => {
                log::info!("Updating Lambda function: {name}");

                let current_version = existing
                    .configuration()
                    .and_then(|c| c.environment())
                    .and_then(|e| e.variables())
                    .and_then(|vars| vars.get("version"))
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(0);

                let mut request = self
                    .client
                    .update_function_configuration()
                    .function_name(name)
                    .timeout(project.timeout())
                    .memory_size(project.memory_size())
                    .role(role_arn)
                    .environment(self.environment(project, current_version + 1));

                if !project.vpc.subnet_ids.is_empty() {
                    request = request.vpc_config(self.vpc_config(project));
                }

                request
                    .send()
                    .await
                    .wrap_err("Failed to update function configuration")?;

                self.wait_updated(name).await?;

                let mut request = self.client.update_function_code().function_name(name);

                request = match code {
                    Code::Image(uri) => request.image_uri(format!("{uri}:latest")),
                    Code::Zip(bytes) => request.zip_file(Blob::new(bytes)),
                };

                request
                    .send()
                    .await
                    .wrap_err("Failed to update function code")?;

                self.wait_active(name).await;
                log::info!("Lambda function updated: {name}");
            }
            Err(e) if e.code() == Some("ResourceNotFoundException") => {
                log::info!("Creating Lambda function: {name}");

                let mut request = self
                    .client
                    .create_function()
                    .function_name(name)
                    .timeout(project.timeout())
                    .memory_size(project.memory_size())
                    .role(role_arn)
                    .architectures(match project.arch {
                        Arch::X86_64 => Architecture::X8664,
                        Arch::Arm64 => Architecture::Arm64,
                    })
                    .environment(self.environment(project, 1));

                if !project.vpc.subnet_ids.is_empty() {
                    request = request.vpc_config(self.vpc_config(project));
                }

                request = match code {
                    Code::Image(uri) => request.package_type(PackageType::Image).code(
                        FunctionCode::builder()
                            .image_uri(format!("{uri}:latest"))
                            .build(),
                    ),
                    Code::Zip(bytes) => request
                        .package_type(PackageType::Zip)
                        .runtime(Runtime::Python312)
                        .handler("main.handler")
                        .code(FunctionCode::builder().zip_file(Blob::new(bytes)).build()),
                };

                request
                    .send()
                    .await
                    .wrap_err("Failed to create function")?;

                self.wait_active(name).await;
                log::info!("Lambda function created: {name}");
            }
            Err(e) => return Err(e).wrap_err("Failed to get function"),
        }

        Ok(())
    }

    /// Invoke the function with a JSON payload
    ///
    /// Detached invocations are fire-and-forget. Attached ones request
    /// the execution log tail and print it out decoded.
    pub async fn invoke(
        &self,
        name: &str,
        payload: &serde_json::Value,
        detached: bool,
    ) -> eyre::Result<()> {
        let invocation_type = if detached {
            InvocationType::Event
        } else {
            InvocationType::RequestResponse
        };

        let mut request = self
            .client
            .invoke()
            .function_name(name)
            .payload(Blob::new(payload.to_string().into_bytes()))
            .invocation_type(invocation_type);

        if !detached {
            request = request.log_type(LogType::Tail);
        }

        let response = request.send().await.wrap_err("Failed to invoke function")?;

        if detached {
            println!("Lambda function executed");
            return Ok(());
        }

        let log = response
            .log_result()
            .wrap_err("No execution log returned")?;

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(log)
            .wrap_err("Execution log is not valid base64")?;

        println!("{}", String::from_utf8_lossy(&decoded));

        Ok(())
    }

    /// ARN of the deployed function
    pub async fn arn(&self, name: &str) -> eyre::Result<String> {
        let function = self
            .client
            .get_function()
            .function_name(name)
            .send()
            .await
            .wrap_err("Failed to get function")?;

        function
            .configuration()
            .and_then(|c| c.function_arn())
            .map(|arn| arn.to_string())
            .wrap_err("Function has no ARN")
    }

    /// Delete the function, tolerating one that was never created
    pub async fn delete(&self, name: &str) -> eyre::Result<()> {
        let deleted = self
            .client
            .delete_function()
            .function_name(name)
            .send()
            .await;

        match deleted {
            Ok(_) => {
                log::info!("Deleting Lambda function: {name}");
                Ok(())
            }
            Err(e) if e.code() == Some("ResourceNotFoundException") => {
                log::info!("Lambda function not found: {name}");
                Ok(())
            }
            Err(e) => Err(e).wrap_err("Failed to delete function"),
        }
    }

    /// Wait for an in-flight configuration update to finish
    async fn wait_updated(&self, name: &str) -> eyre::Result<()> {
        let client = self.client.clone();
        let name_owned = name.to_string();

        wait_until(
            "function update to finish",
            waiter::POLL_INTERVAL,
            waiter::LAMBDA_MAX_WAIT,
            move || {
                let client = client.clone();
                let name = name_owned.clone();

                async move {
                    let function = client
                        .get_function()
                        .function_name(&name)
                        .send()
                        .await
                        .wrap_err("Failed to get function")?;

                    Ok(function
                        .configuration()
                        .and_then(|c| c.last_update_status())
                        .is_none_or(|s| *s != LastUpdateStatus::InProgress))
                }
            },
        )
        .await
    }

    /// Wait for the function to become Active
    ///
    /// A timeout here is a soft failure, the function usually finishes
    /// activating on its own shortly after.
    async fn wait_active(&self, name: &str) {
        let client = self.client.clone();
        let name_owned = name.to_string();

        let result = wait_until(
            "function to become Active",
            waiter::POLL_INTERVAL,
            waiter::LAMBDA_MAX_WAIT,
            move || {
                let client = client.clone();
                let name = name_owned.clone();

                async move {
                    let function = client
                        .get_function()
                        .function_name(&name)
                        .send()
                        .await
                        .wrap_err("Failed to get function")?;

                    let configuration = function.configuration();

                    let active = configuration
                        .and_then(|c| c.state())
                        .is_some_and(|s| *s == State::Active);

                    let settled = configuration
                        .and_then(|c| c.last_update_status())
                        .is_none_or(|s| *s == LastUpdateStatus::Successful);

                    Ok(active && settled)
                }
            },
        )
        .await;

        if let Err(e) = result {
            log::warn!("Function did not report Active in time: {e}");
        }
    }

    fn environment(&self, project: &Project, version: u64) -> Environment {
        Environment::builder()
            .set_variables(Some(environment_variables(project, version)))
            .build()
    }

    fn vpc_config(&self, project: &Project) -> VpcConfig {
        VpcConfig::builder()
            .set_subnet_ids(Some(project.vpc.subnet_ids.clone()))
            .set_security_group_ids(Some(project.vpc.security_group_ids.clone()))
            .build()
    }
}

/// Project environment with the version counter force-set on top
fn environment_variables(project: &Project, version: u64) -> HashMap<String, String> {
    let mut variables: HashMap<String, String> = project.env.clone().into_iter().collect();

    variables.insert("version".to_string(), version.to_string());

    variables
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_counter_overrides_project_env() {
        let mut project = Project::default();
        project
            .env
            .insert("version".to_string(), "oops".to_string());
        project.env.insert("MODE".to_string(), "full".to_string());

        let variables = environment_variables(&project, 7);

        assert_eq!(variables.get("version"), Some(&"7".to_string()));
        assert_eq!(variables.get("MODE"), Some(&"full".to_string()));
    }

    #[test]
    fn first_deploy_starts_at_version_one() {
        let variables = environment_variables(&Project::default(), 1);

        assert_eq!(variables.get("version"), Some(&"1".to_string()));
    }
}
