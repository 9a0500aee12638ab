use crate::error::Error;
use eyre::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Name of the project config file
pub const CONFIG_FILE: &str = ".red";

/// Managing user's project
///
/// Maps one2one from the .red JSON document in the project directory.
/// Loaded once per invocation, the project name is the prefix for every
/// cloud resource the tool provisions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Project {
    /// Project name (used as the name of all resources)
    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Type", default)]
    pub compute_type: ComputeType,

    /// Attempt duration for Batch, execution limit for Lambda, in seconds
    #[serde(rename = "Timeout")]
    pub timeout: Option<i32>,

    #[serde(rename = "MemorySize")]
    pub memory_size: Option<i32>,

    /// Fargate vCPUs requested for Batch jobs
    #[serde(rename = "Cpu")]
    pub cpu: Option<f32>,

    #[serde(rename = "Arch", default)]
    pub arch: Arch,

    /// Environment variables injected into the workload
    #[serde(rename = "Env", default)]
    pub env: BTreeMap<String, String>,

    #[serde(rename = "assignPublicIp")]
    pub assign_public_ip: Option<String>,

    #[serde(rename = "VPC", default)]
    pub vpc: Vpc,

    /// Custom policy document attached to the project role
    #[serde(rename = "IamPolicy", skip_serializing_if = "Option::is_none")]
    pub iam_policy: Option<serde_json::Value>,

    /// Pre-existing role ARN, skips role provisioning when set
    #[serde(rename = "Role", skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComputeType {
    #[default]
    Lambda,
    Batch,
    LambdaCode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Arch {
    #[default]
    #[serde(rename = "x86_64")]
    X86_64,
    #[serde(rename = "arm64")]
    Arm64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vpc {
    #[serde(rename = "SubnetIds", default)]
    pub subnet_ids: Vec<String>,

    #[serde(rename = "SecurityGroupIds", default)]
    pub security_group_ids: Vec<String>,
}

impl Project {
    /// Load the project config from the current directory
    pub fn from_current_dir() -> eyre::Result<Self> {
        Self::from_path(Path::new(CONFIG_FILE))
    }

    pub fn from_path(path: &Path) -> eyre::Result<Self> {
        let raw = std::fs::read_to_string(path).wrap_err(Error::new(
            &format!("Failed to read the {CONFIG_FILE} file"),
            Some("Run this command from a project directory created with \"red init\"."),
        ))?;

        let project: Project = serde_json::from_str(&raw).wrap_err(Error::new(
            &format!("Failed to parse the {CONFIG_FILE} file"),
            Some("The file must be a valid JSON document."),
        ))?;

        if project.name.is_empty() {
            return Err(Error::new(
                &format!("Name must be defined in the {CONFIG_FILE} file"),
                Some("Add a non-empty \"Name\" field."),
            )
            .into());
        }

        Ok(project)
    }

    /// CloudWatch log group for the project
    ///
    /// Lambda owns its groups under the /aws/lambda/ prefix, Batch logs
    /// go to a group named after the project itself.
    pub fn log_group(&self) -> String {
        match self.compute_type {
            ComputeType::Batch => self.name.clone(),
            _ => format!("/aws/lambda/{}", self.name),
        }
    }

    pub fn timeout(&self) -> i32 {
        self.timeout.unwrap_or(match self.compute_type {
            ComputeType::Batch => 10000,
            _ => 300,
        })
    }

    pub fn memory_size(&self) -> i32 {
        self.memory_size.unwrap_or(match self.compute_type {
            ComputeType::Batch => 2048,
            _ => 128,
        })
    }

    /// Requested vCPUs rendered the way Batch expects them
    ///
    /// Whole numbers lose the fractional part ("1", not "1.0"), Fargate
    /// fractions are kept as is ("0.25").
    pub fn vcpus(&self) -> String {
        let cpu = self.cpu.unwrap_or(1.0);

        if cpu.fract() == 0.0 {
            format!("{}", cpu as i64)
        } else {
            format!("{cpu}")
        }
    }

    pub fn assign_public_ip(&self) -> &str {
        self.assign_public_ip.as_deref().unwrap_or("DISABLED")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_batch_config() {
        let project: Project = serde_json::from_str(
            r#"{
                "Name": "cruncher",
                "Type": "Batch",
                "Timeout": 10000,
                "Cpu": 1,
                "MemorySize": 2048,
                "assignPublicIp": "ENABLED",
                "Arch": "x86_64",
                "VPC": {"SubnetIds": ["subnet-1"], "SecurityGroupIds": ["sg-1"]}
            }"#,
        )
        .unwrap();

        assert_eq!(project.name, "cruncher");
        assert_eq!(project.compute_type, ComputeType::Batch);
        assert_eq!(project.vcpus(), "1");
        assert_eq!(project.assign_public_ip(), "ENABLED");
        assert_eq!(project.vpc.subnet_ids, vec!["subnet-1"]);
        assert_eq!(project.log_group(), "cruncher");
    }

    #[test]
    fn lambda_defaults_apply() {
        let project: Project = serde_json::from_str(r#"{"Name": "fn"}"#).unwrap();

        assert_eq!(project.compute_type, ComputeType::Lambda);
        assert_eq!(project.timeout(), 300);
        assert_eq!(project.memory_size(), 128);
        assert_eq!(project.arch, Arch::X86_64);
        assert_eq!(project.log_group(), "/aws/lambda/fn");
        assert_eq!(project.assign_public_ip(), "DISABLED");
    }

    #[test]
    fn fractional_vcpus_keep_precision() {
        let project: Project =
            serde_json::from_str(r#"{"Name": "fn", "Type": "Batch", "Cpu": 0.25}"#).unwrap();

        assert_eq!(project.vcpus(), "0.25");
    }

    #[test]
    fn missing_name_is_rejected() {
        let dir = std::env::temp_dir().join("red-test-noname");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE);
        std::fs::write(&path, r#"{"Type": "Lambda"}"#).unwrap();

        let result = Project::from_path(&path);
        assert!(result.is_err());
    }
}
