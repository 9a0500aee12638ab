use crate::batch::Batch;
use crate::error::Error;
use crate::iam::Roles;
use crate::lambda::Function;
use crate::project::ComputeType;
use crate::runner::{Runnable, Runner};
use crate::schedule::{Occurrence, ScheduleTarget, Schedules};
use crate::utils::slugify;
use clap::ArgAction;

#[derive(clap::Args, Clone)]
pub(crate) struct RunCommand {
    /// JSON payload passed to the workload
    #[arg(short, long, default_value = "{}")]
    payload: String,

    /// Recurring schedule, a cron expression
    #[arg(short, long)]
    cron: Option<String>,

    /// Name for the created schedule
    #[arg(long = "schedule_name")]
    schedule_name: Option<String>,

    /// One-shot schedule, yyyy-mm-ddThh:mm:ss
    #[arg(short, long)]
    once: Option<String>,

    /// Do not wait for the execution to finish
    #[arg(short, long, action = ArgAction::SetTrue)]
    detached: bool,
}

impl Runnable for RunCommand {
    fn runner(&self) -> impl Runner {
        RunRunner {
            command: self.clone(),
        }
    }
}

pub(crate) struct RunRunner {
    command: RunCommand,
}

impl Runner for RunRunner {
    /// Execute the workload now, or register a schedule for it
    async fn run(&mut self) -> Result<(), Error> {
        let project = self.project().await?;

        // The payload is parsed exactly once, malformed input fails here
        // before anything is touched in the cloud
        let payload = parse_payload(&self.command.payload).map_err(|e| {
            self.error(
                Some("Invalid JSON payload"),
                Some("The --payload option must be a valid JSON document."),
                Some(Box::new(e)),
            )
        })?;

        let config = self.sdk_config().await;

        let occurrence = match (&self.command.cron, &self.command.once) {
            (Some(cron), _) => Some(Occurrence::Cron(cron.clone())),
            (None, Some(once)) => Some(Occurrence::Once(once.clone())),
            (None, None) => None,
        };

        if let Some(occurrence) = occurrence {
            let Some(schedule_name) = &self.command.schedule_name else {
                return Err(self.error(
                    Some("Schedule name required"),
                    Some("Pass --schedule_name together with --cron or --once."),
                    None,
                ));
            };

            let schedule_name = slugify(schedule_name);
            let schedules = Schedules::new(&config);

            schedules.ensure_group(&project.name).await?;

            let role_arn = Roles::new(&config)
                .ensure_scheduler_role(&project.name)
                .await?;

            let target = match project.compute_type {
                ComputeType::Batch => {
                    let mut environment =
                        Batch::new(&config).job_definition_env(&project.name).await?;
                    environment.extend(payload_env(&payload));

                    ScheduleTarget::Batch { environment }
                }
                _ => ScheduleTarget::Lambda {
                    function_arn: Function::new(&config).arn(&project.name).await?,
                    payload,
                },
            };

            schedules
                .create(&project.name, &schedule_name, &occurrence, target, &role_arn)
                .await?;

            println!(
                "{}",
                console::style(format!("Schedule created: {schedule_name}"))
                    .green()
                    .bold()
            );

            return Ok(());
        }

        match project.compute_type {
            ComputeType::Batch => {
                let batch = Batch::new(&config);

                let mut environment = batch.job_definition_env(&project.name).await?;
                environment.extend(payload_env(&payload));

                let job_id = batch
                    .submit_job(
                        &format!("{}_execution", project.name),
                        &project.name,
                        &project.name,
                        environment,
                    )
                    .await?;

                println!(
                    "{}",
                    console::style(format!("Batch job submitted: {job_id}"))
                        .green()
                        .bold()
                );
            }
            _ => {
                Function::new(&config)
                    .invoke(&project.name, &payload, self.command.detached)
                    .await?;
            }
        }

        Ok(())
    }
}

/// Parse the raw --payload option, the single place it happens
fn parse_payload(raw: &str) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::from_str(raw)
}

/// Top-level payload fields as environment variable overrides
///
/// Batch jobs have no payload channel, the fields are injected as
/// environment variables instead. Non-string values keep their JSON
/// rendering.
fn payload_env(payload: &serde_json::Value) -> Vec<(String, String)> {
    let Some(object) = payload.as_object() else {
        return Vec::new();
    };

    object
        .iter()
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };

            (key.clone(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_fields_become_env_overrides() {
        let env = payload_env(&json!({"MODE": "full", "RETRIES": 3}));

        assert!(env.contains(&("MODE".to_string(), "full".to_string())));
        assert!(env.contains(&("RETRIES".to_string(), "3".to_string())));
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert!(parse_payload("{not json").is_err());
        assert!(parse_payload("").is_err());
        assert_eq!(parse_payload("{}").unwrap(), json!({}));
    }

    #[test]
    fn non_object_payloads_add_nothing() {
        assert!(payload_env(&json!([1, 2, 3])).is_empty());
        assert!(payload_env(&json!("text")).is_empty());
    }
}
