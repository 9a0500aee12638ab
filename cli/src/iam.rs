use aws_config::SdkConfig;
use aws_sdk_iam::error::ProvideErrorMetadata;
use aws_sdk_iam::types::PolicyScopeType;
use eyre::{Context, ContextCompat};
use serde_json::json;
use std::time::Duration;

/// Managed policy granting Lambda functions CloudWatch access
const LAMBDA_BASIC_EXECUTION: &str =
    "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";

/// IAM roles and policies for the project
///
/// Roles are created once and reused on later deploys, the trust policy
/// is never rotated. Custom policies are versioned in place instead.
pub struct Roles {
    client: aws_sdk_iam::Client,
}

impl Roles {
    pub fn new(config: &SdkConfig) -> Self {
        Roles {
            client: aws_sdk_iam::Client::new(config),
        }
    }

    /// Execution role for a Lambda function
    ///
    /// Trusts the Lambda service, always carries the basic execution
    /// policy, plus the custom policy from the project config when set.
    pub async fn ensure_lambda_role(
        &self,
        role_name: &str,
        custom_policy: Option<&serde_json::Value>,
    ) -> eyre::Result<String> {
        self.ensure_role(
            role_name,
            &lambda_trust_policy(),
            Some(LAMBDA_BASIC_EXECUTION),
            role_name,
            custom_policy,
        )
        .await
    }

    /// Service role letting EventBridge Scheduler trigger the project
    pub async fn ensure_scheduler_role(&self, project_name: &str) -> eyre::Result<String> {
        self.ensure_role(
            &format!("{project_name}_schedule"),
            &scheduler_trust_policy(),
            None,
            &format!("{project_name}_schedule_policy"),
            Some(&scheduler_policy()),
        )
        .await
    }

    /// Minimal viable service role for a Fargate Batch environment
    ///
    /// Shared between the compute environment service role and the job
    /// (execution) role, so it trusts ECS, ECS tasks and Batch at once.
    pub async fn ensure_batch_role(&self, role_name: &str) -> eyre::Result<String> {
        if let Some(arn) = self.role_arn(role_name).await? {
            log::info!("Role {role_name} already exists");
            return Ok(arn);
        }

        self.ensure_role(
            role_name,
            &batch_trust_policy(),
            None,
            role_name,
            Some(&batch_policy()),
        )
        .await
    }

    /// Create-or-reuse a role with the given trust and policies
    ///
    /// The custom policy is created when missing and updated in place
    /// when present, replacing the default version. Old non-default
    /// versions are pruned to stay under the provider's version limit.
    pub async fn ensure_role(
        &self,
        role_name: &str,
        trust_policy: &serde_json::Value,
        managed_policy_arn: Option<&str>,
        custom_policy_name: &str,
        custom_policy: Option<&serde_json::Value>,
    ) -> eyre::Result<String> {
        let created = self
            .client
            .create_role()
            .role_name(role_name)
            .assume_role_policy_document(trust_policy.to_string())
            .description(format!("RED project role {role_name}"))
            .send()
            .await;

        let role_arn = match created {
            Ok(created) => {
                let arn = created
                    .role()
                    .map(|r| r.arn().to_string())
                    .wrap_err("Created role has no ARN")?;

                log::info!("Created IAM role: {arn}");

                // The provider needs a moment to propagate a fresh role
                // before anything can assume it
                tokio::time::sleep(Duration::from_secs(10)).await;

                arn
            }
            Err(e) if e.code() == Some("EntityAlreadyExists") => {
                log::info!("IAM role {role_name} already exists, reusing it");

                self.role_arn(role_name)
                    .await?
                    .wrap_err("Role exists but could not be described")?
            }
            Err(e) => return Err(e).wrap_err("Failed to create IAM role"),
        };

        let attached = self
            .client
            .list_attached_role_policies()
            .role_name(role_name)
            .send()
            .await
            .wrap_err("Failed to list attached role policies")?;

        let is_attached = |arn: &str| {
            attached
                .attached_policies()
                .iter()
                .any(|p| p.policy_arn() == Some(arn))
        };

        if let Some(managed) = managed_policy_arn {
            if !is_attached(managed) {
                self.client
                    .attach_role_policy()
                    .role_name(role_name)
                    .policy_arn(managed)
                    .send()
                    .await
                    .wrap_err("Failed to attach managed policy")?;
            }
        }

        let Some(custom_policy) = custom_policy else {
            return Ok(role_arn);
        };

        let custom_policy_arn = self
            .ensure_policy(custom_policy_name, custom_policy)
            .await?;

        if !is_attached(&custom_policy_arn) {
            self.client
                .attach_role_policy()
                .role_name(role_name)
                .policy_arn(&custom_policy_arn)
                .send()
                .await
                .wrap_err("Failed to attach custom policy")?;

            log::info!("Attached custom policy to {role_name}");
        }

        Ok(role_arn)
    }

    /// Create the custom policy, or push a new default version to it
    async fn ensure_policy(
        &self,
        policy_name: &str,
        document: &serde_json::Value,
    ) -> eyre::Result<String> {
        let created = self
            .client
            .create_policy()
            .policy_name(policy_name)
            .policy_document(document.to_string())
            .send()
            .await;

        match created {
            Ok(created) => {
                let arn = created
                    .policy()
                    .and_then(|p| p.arn())
                    .map(|arn| arn.to_string())
                    .wrap_err("Created policy has no ARN")?;

                log::info!("Created custom policy: {arn}");
                Ok(arn)
            }
            Err(e) if e.code() == Some("EntityAlreadyExists") => {
                log::info!("Custom policy {policy_name} already exists, updating it");

                let policies = self
                    .client
                    .list_policies()
                    .scope(PolicyScopeType::Local)
                    .path_prefix("/")
                    .send()
                    .await
                    .wrap_err("Failed to list customer managed policies")?;

                let arn = policies
                    .policies()
                    .iter()
                    .find(|p| p.policy_name() == Some(policy_name))
                    .and_then(|p| p.arn())
                    .map(|arn| arn.to_string())
                    .wrap_err("Existing policy not found in the listing")?;

                self.prune_policy_versions(&arn).await?;

                self.client
                    .create_policy_version()
                    .policy_arn(&arn)
                    .policy_document(document.to_string())
                    .set_as_default(true)
                    .send()
                    .await
                    .wrap_err("Failed to create new policy version")?;

                Ok(arn)
            }
            Err(e) => Err(e).wrap_err("Failed to create custom policy"),
        }
    }

    /// Delete every non-default version except the newest one
    async fn prune_policy_versions(&self, policy_arn: &str) -> eyre::Result<()> {
        let versions = self
            .client
            .list_policy_versions()
            .policy_arn(policy_arn)
            .send()
            .await
            .wrap_err("Failed to list policy versions")?;

        let newest = versions
            .versions()
            .iter()
            .max_by_key(|v| v.create_date().map(|d| d.secs()))
            .and_then(|v| v.version_id().map(|id| id.to_string()));

        for version in versions.versions() {
            let id = version.version_id().unwrap_or_default();

            if Some(id.to_string()) != newest && !version.is_default_version() {
                self.client
                    .delete_policy_version()
                    .policy_arn(policy_arn)
                    .version_id(id)
                    .send()
                    .await
                    .wrap_err("Failed to delete old policy version")?;

                log::info!("Deleted old policy version: {id}");
            }
        }

        Ok(())
    }

    async fn role_arn(&self, role_name: &str) -> eyre::Result<Option<String>> {
        let role = self.client.get_role().role_name(role_name).send().await;

        match role {
            Ok(role) => Ok(role.role().map(|r| r.arn().to_string())),
            Err(e) if e.code() == Some("NoSuchEntity") => {
                Ok(None)
            }
            Err(e) => Err(e).wrap_err("Failed to get IAM role"),
        }
    }

    /// Detach and delete everything attached to the role, then the role
    ///
    /// A missing role is fine, teardown tolerates resources that were
    /// never created. Customer managed policies are deleted along the
    /// way, AWS managed ones only detached.
    pub async fn delete_role(&self, role_name: &str) -> eyre::Result<()> {
        let attached = self
            .client
            .list_attached_role_policies()
            .role_name(role_name)
            .send()
            .await;

        let attached = match attached {
            Ok(attached) => attached,
            Err(e) if e.code() == Some("NoSuchEntity") => {
                log::info!("IAM role not found: {role_name}");
                return Ok(());
            }
            Err(e) => return Err(e).wrap_err("Failed to list attached role policies"),
        };

        for policy in attached.attached_policies() {
            let Some(arn) = policy.policy_arn() else {
                continue;
            };

            self.client
                .detach_role_policy()
                .role_name(role_name)
                .policy_arn(arn)
                .send()
                .await
                .wrap_err("Failed to detach role policy")?;

            // Only customer managed policies can (and should) be deleted,
            // and all non-default versions have to go first
            if !arn.starts_with("arn:aws:iam::aws:") {
                if let Ok(versions) = self.client.list_policy_versions().policy_arn(arn).send().await
                {
                    for version in versions.versions() {
                        if !version.is_default_version() {
                            let _ = self
                                .client
                                .delete_policy_version()
                                .policy_arn(arn)
                                .version_id(version.version_id().unwrap_or_default())
                                .send()
                                .await;
                        }
                    }
                }

                if let Err(e) = self.client.delete_policy().policy_arn(arn).send().await {
                    log::warn!("Could not delete policy {arn}: {e}");
                }
            }
        }

        log::info!("Deleting IAM role: {role_name}");

        self.client
            .delete_role()
            .role_name(role_name)
            .send()
            .await
            .wrap_err("Failed to delete IAM role")?;

        Ok(())
    }
}

fn lambda_trust_policy() -> serde_json::Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": {"Service": "lambda.amazonaws.com"},
            "Action": "sts:AssumeRole",
        }]
    })
}

fn scheduler_trust_policy() -> serde_json::Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": {"Service": "scheduler.amazonaws.com"},
            "Action": "sts:AssumeRole",
        }]
    })
}

/// Permissions the scheduler needs to trigger either compute type
fn scheduler_policy() -> serde_json::Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Action": [
                "batch:SubmitJob",
                "batch:DescribeJobDefinitions",
                "batch:DescribeJobQueues",
                "lambda:InvokeFunction",
            ],
            "Resource": ["*"],
        }]
    })
}

fn batch_trust_policy() -> serde_json::Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": {
                "Service": [
                    "ecs.amazonaws.com",
                    "ecs-tasks.amazonaws.com",
                    "batch.amazonaws.com",
                ]
            },
            "Action": "sts:AssumeRole",
        }]
    })
}

/// Minimal permission set for a managed Fargate environment
fn batch_policy() -> serde_json::Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Sid": "BatchCompute",
                "Effect": "Allow",
                "Action": [
                    "ec2:Describe*",
                    "ec2:CreateLaunchTemplate",
                    "ec2:DeleteLaunchTemplate",
                    "ec2:RequestSpotFleet",
                    "ec2:CancelSpotFleetRequests",
                    "ec2:ModifySpotFleetRequest",
                    "ec2:TerminateInstances",
                    "ec2:RunInstances",
                    "autoscaling:Describe*",
                    "autoscaling:CreateLaunchConfiguration",
                    "autoscaling:CreateAutoScalingGroup",
                    "autoscaling:UpdateAutoScalingGroup",
                    "autoscaling:SetDesiredCapacity",
                    "autoscaling:DeleteLaunchConfiguration",
                    "autoscaling:DeleteAutoScalingGroup",
                    "autoscaling:CreateOrUpdateTags",
                    "autoscaling:SuspendProcesses",
                    "autoscaling:PutNotificationConfiguration",
                    "autoscaling:TerminateInstanceInAutoScalingGroup",
                    "ecs:Describe*",
                    "ecs:List*",
                    "ecs:CreateCluster",
                    "ecs:DeleteCluster",
                    "ecs:RegisterTaskDefinition",
                    "ecs:DeregisterTaskDefinition",
                    "ecs:RunTask",
                    "ecs:StartTask",
                    "ecs:StopTask",
                    "ecs:UpdateContainerAgent",
                    "ecs:DeregisterContainerInstance",
                    "logs:CreateLogGroup",
                    "logs:CreateLogStream",
                    "logs:PutLogEvents",
                    "logs:DescribeLogGroups",
                    "iam:GetInstanceProfile",
                    "iam:GetRole",
                ],
                "Resource": "*",
            },
            {
                "Sid": "BatchTaskTags",
                "Effect": "Allow",
                "Action": "ecs:TagResource",
                "Resource": ["arn:aws:ecs:*:*:task/*_Batch_*"],
            },
            {
                "Sid": "BatchPullImages",
                "Effect": "Allow",
                "Action": [
                    "ecr:GetAuthorizationToken",
                    "ecr:BatchCheckLayerAvailability",
                    "ecr:GetDownloadUrlForLayer",
                    "ecr:BatchGetImage",
                ],
                "Resource": "*",
            },
            {
                "Sid": "BatchPassRole",
                "Effect": "Allow",
                "Action": "iam:PassRole",
                "Resource": ["*"],
                "Condition": {
                    "StringEquals": {
                        "iam:PassedToService": [
                            "ec2.amazonaws.com",
                            "ecs-tasks.amazonaws.com",
                        ]
                    }
                },
            },
            {
                "Sid": "BatchServiceLinkedRole",
                "Effect": "Allow",
                "Action": "iam:CreateServiceLinkedRole",
                "Resource": "*",
                "Condition": {
                    "StringEquals": {
                        "iam:AWSServiceName": [
                            "spot.amazonaws.com",
                            "spotfleet.amazonaws.com",
                            "autoscaling.amazonaws.com",
                            "ecs.amazonaws.com",
                        ]
                    }
                },
            },
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_policies_name_the_right_services() {
        assert_eq!(
            lambda_trust_policy()["Statement"][0]["Principal"]["Service"],
            "lambda.amazonaws.com"
        );
        assert_eq!(
            scheduler_trust_policy()["Statement"][0]["Principal"]["Service"],
            "scheduler.amazonaws.com"
        );

        let services = &batch_trust_policy()["Statement"][0]["Principal"]["Service"];
        assert!(services
            .as_array()
            .unwrap()
            .contains(&serde_json::Value::String("batch.amazonaws.com".into())));
    }

    #[test]
    fn scheduler_policy_can_trigger_both_compute_types() {
        let actions = scheduler_policy()["Statement"][0]["Action"].clone();
        let actions = actions.as_array().unwrap();

        assert!(actions.contains(&serde_json::Value::String("batch:SubmitJob".into())));
        assert!(actions.contains(&serde_json::Value::String("lambda:InvokeFunction".into())));
    }

    #[test]
    fn batch_policy_allows_image_pulls() {
        let statements = batch_policy()["Statement"].clone();

        let pulls = statements
            .as_array()
            .unwrap()
            .iter()
            .find(|s| s["Sid"] == "BatchPullImages")
            .unwrap();

        assert!(pulls["Action"]
            .as_array()
            .unwrap()
            .contains(&serde_json::Value::String("ecr:BatchGetImage".into())));
    }
}
