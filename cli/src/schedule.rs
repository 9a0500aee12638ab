use crate::utils::millis_to_date;
use aws_config::SdkConfig;
use aws_sdk_scheduler::error::ProvideErrorMetadata;
use aws_sdk_scheduler::types::{
    ActionAfterCompletion, FlexibleTimeWindow, FlexibleTimeWindowMode, ScheduleState, Target,
};
use eyre::Context;

/// When a schedule fires
///
/// Cron schedules recur and stay around after every run. One-shot
/// schedules fire at a single timestamp and delete themselves once done.
pub enum Occurrence {
    Cron(String),
    Once(String),
}

/// What a schedule invokes
pub enum ScheduleTarget {
    /// Submit a Batch job through the universal submitJob target
    Batch {
        environment: Vec<(String, String)>,
    },
    /// Invoke a Lambda function with a JSON payload
    Lambda {
        function_arn: String,
        payload: serde_json::Value,
    },
}

/// A schedule rendered for listing
pub struct ScheduleSummary {
    pub name: String,
    pub created: Option<String>,
}

/// EventBridge schedules of the project
///
/// Every project owns one schedule group named after it, all of its
/// schedules live in that group.
pub struct Schedules {
    client: aws_sdk_scheduler::Client,
    sts: aws_sdk_sts::Client,
    region: String,
}

impl Schedules {
    pub fn new(config: &SdkConfig) -> Self {
        Schedules {
            client: aws_sdk_scheduler::Client::new(config),
            sts: aws_sdk_sts::Client::new(config),
            region: config
                .region()
                .map(|r| r.to_string())
                .unwrap_or_default(),
        }
    }

    /// Create the project's schedule group, or reuse the existing one
    pub async fn ensure_group(&self, name: &str) -> eyre::Result<()> {
        let created = self
            .client
            .create_schedule_group()
            .name(name)
            .send()
            .await;

        match created {
            Ok(_) => {
                // Fresh groups take a moment to accept schedules
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                log::info!("Created schedule group: {name}");
                Ok(())
            }
            Err(e) if e.code() == Some("ConflictException") => {
                log::info!("Reusing schedule group: {name}");
                Ok(())
            }
            Err(e) => Err(e).wrap_err("Failed to create schedule group"),
        }
    }

    /// Create a schedule in the project's group
    ///
    /// The timezone comes from the TZ environment variable so cron
    /// expressions read the way the user's clock does.
    pub async fn create(
        &self,
        project_name: &str,
        schedule_name: &str,
        occurrence: &Occurrence,
        target: ScheduleTarget,
        role_arn: &str,
    ) -> eyre::Result<()> {
        let (target_arn, input) = match target {
            ScheduleTarget::Batch { environment } => {
                let account = self.account_id().await?;

                let environment: Vec<serde_json::Value> = environment
                    .into_iter()
                    .map(|(name, value)| serde_json::json!({"Name": name, "Value": value}))
                    .collect();

                let input = serde_json::json!({
                    "JobName": format!("scheduled_{project_name}"),
                    "JobQueue": self.batch_arn(&account, "job-queue", project_name),
                    "JobDefinition": self.batch_arn(&account, "job-definition", project_name),
                    "ContainerOverrides": {"Environment": environment},
                });

                (
                    "arn:aws:scheduler:::aws-sdk:batch:submitJob".to_string(),
                    input.to_string(),
                )
            }
            ScheduleTarget::Lambda {
                function_arn,
                payload,
            } => (function_arn, payload.to_string()),
        };

        let target = Target::builder()
            .arn(target_arn)
            .role_arn(role_arn)
            .input(input)
            .build()
            .wrap_err("Invalid schedule target")?;

        self.client
            .create_schedule()
            .name(schedule_name)
            .group_name(project_name)
            .schedule_expression(expression(occurrence))
            .schedule_expression_timezone(
                std::env::var("TZ").unwrap_or_else(|_| "UTC".to_string()),
            )
            .action_after_completion(action_after_completion(occurrence))
            .flexible_time_window(
                FlexibleTimeWindow::builder()
                    .mode(FlexibleTimeWindowMode::Off)
                    .build()
                    .wrap_err("Invalid time window")?,
            )
            .target(target)
            .state(ScheduleState::Enabled)
            .send()
            .await
            .wrap_err("Failed to create schedule")?;

        log::info!("Created schedule: {schedule_name}");
        Ok(())
    }

    /// Schedules of the project, in listing order
    pub async fn list(&self, project_name: &str) -> eyre::Result<Vec<ScheduleSummary>> {
        let response = self
            .client
            .list_schedules()
            .group_name(project_name)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) if e.code() == Some("ResourceNotFoundException") => return Ok(Vec::new()),
            Err(e) => return Err(e).wrap_err("Failed to list schedules"),
        };

        let schedules = response
            .schedules()
            .iter()
            .filter_map(|schedule| {
                Some(ScheduleSummary {
                    name: schedule.name()?.to_string(),
                    created: schedule
                        .creation_date()
                        .and_then(|d| d.to_millis().ok())
                        .map(millis_to_date),
                })
            })
            .collect();

        Ok(schedules)
    }

    /// Delete one schedule, tolerating one that is already gone
    pub async fn delete(&self, project_name: &str, schedule_name: &str) -> eyre::Result<()> {
        let deleted = self
            .client
            .delete_schedule()
            .group_name(project_name)
            .name(schedule_name)
            .send()
            .await;

        match deleted {
            Ok(_) => {
                log::info!("Deleted schedule: {schedule_name}");
                Ok(())
            }
            Err(e) if e.code() == Some("ResourceNotFoundException") => {
                log::info!("Schedule not found: {schedule_name}");
                Ok(())
            }
            Err(e) => Err(e).wrap_err("Failed to delete schedule"),
        }
    }

    /// Delete the project's schedule group with everything in it
    pub async fn delete_group(&self, name: &str) -> eyre::Result<()> {
        let deleted = self
            .client
            .delete_schedule_group()
            .name(name)
            .send()
            .await;

        match deleted {
            Ok(_) => {
                log::info!("Deleted schedule group: {name}");
                Ok(())
            }
            Err(e) if e.code() == Some("ResourceNotFoundException") => {
                log::info!("Schedule group not found: {name}");
                Ok(())
            }
            Err(e) => Err(e).wrap_err("Failed to delete schedule group"),
        }
    }

    async fn account_id(&self) -> eyre::Result<String> {
        let identity = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .wrap_err("Failed to resolve the account")?;

        identity
            .account()
            .map(|a| a.to_string())
            .ok_or_else(|| eyre::eyre!("Caller identity has no account"))
    }

    fn batch_arn(&self, account: &str, resource: &str, name: &str) -> String {
        format!("arn:aws:batch:{}:{account}:{resource}/{name}", self.region)
    }
}

fn expression(occurrence: &Occurrence) -> String {
    match occurrence {
        Occurrence::Cron(cron) => format!("cron({cron})"),
        Occurrence::Once(at) => format!("at({at})"),
    }
}

/// One-shot schedules clean themselves up after firing, recurring
/// ones stay
fn action_after_completion(occurrence: &Occurrence) -> ActionAfterCompletion {
    match occurrence {
        Occurrence::Cron(_) => ActionAfterCompletion::None,
        Occurrence::Once(_) => ActionAfterCompletion::Delete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cron_schedules_recur() {
        let occurrence = Occurrence::Cron("0 12 * * ? *".to_string());

        assert_eq!(expression(&occurrence), "cron(0 12 * * ? *)");
        assert_eq!(
            action_after_completion(&occurrence),
            ActionAfterCompletion::None
        );
    }

    #[test]
    fn one_shot_schedules_delete_themselves() {
        let occurrence = Occurrence::Once("2026-01-01T09:00:00".to_string());

        assert_eq!(expression(&occurrence), "at(2026-01-01T09:00:00)");
        assert_eq!(
            action_after_completion(&occurrence),
            ActionAfterCompletion::Delete
        );
    }
}
