use crate::error::Error;
use crate::project::CONFIG_FILE;
use crate::runner::{Runnable, Runner};
use crate::utils::slugify;
use clap::ArgAction;
use eyre::WrapErr;
use serde_json::json;
use std::fs;
use std::path::Path;

const BATCH_DOCKERFILE: &str = r#"FROM python:3.13
COPY . .
ENTRYPOINT [ "python", "main.py" ]
"#;

const BATCH_MAIN: &str = r#"def handler():
    print("hello world")

if __name__ == "__main__":
    handler()
"#;

const LAMBDA_DOCKERFILE: &str = r#"# Define custom function directory
ARG FUNCTION_DIR="/function"

FROM python:3.12 AS build-image

# Include global arg in this stage of the build
ARG FUNCTION_DIR

# Copy function code
RUN mkdir -p ${FUNCTION_DIR}
COPY . ${FUNCTION_DIR}

# Install the function's dependencies
RUN pip install \
    --target ${FUNCTION_DIR} \
        awslambdaric

# Use a slim version of the base Python image to reduce the final image size
FROM python:3.12-slim

# Include global arg in this stage of the build
ARG FUNCTION_DIR
# Set working directory to function root directory
WORKDIR ${FUNCTION_DIR}

# Copy in the built dependencies
COPY --from=build-image ${FUNCTION_DIR} ${FUNCTION_DIR}

# Set runtime interface client as default command for the container runtime
ENTRYPOINT [ "/usr/local/bin/python", "-m", "awslambdaric" ]
# Pass the name of the function handler as an argument to the runtime
CMD [ "lambda_function.handler" ]
"#;

const LAMBDA_FUNCTION: &str = r#"import sys

def handler(event, context):
    print('Hello from AWS Lambda using Python' + sys.version + '!')
    return 'Hello from AWS Lambda using Python' + sys.version + '!'
"#;

#[derive(clap::Args, Clone)]
pub(crate) struct InitCommand {
    /// Name of the project
    name: String,

    /// Scaffold a Batch workload instead of a Lambda container
    #[arg(short, long, action = ArgAction::SetTrue)]
    batch: bool,

    /// Scaffold a zip-deployed Lambda instead of a container
    #[arg(short, long, action = ArgAction::SetTrue)]
    code: bool,
}

impl Runnable for InitCommand {
    fn runner(&self) -> impl Runner {
        InitRunner {
            command: self.clone(),
        }
    }
}

pub(crate) struct InitRunner {
    command: InitCommand,
}

impl Runner for InitRunner {
    /// Create the project directory with the config and starter sources
    async fn run(&mut self) -> Result<(), Error> {
        let name = slugify(&self.command.name);

        if name.is_empty() {
            return Err(self.error(
                Some("Invalid project name"),
                Some("The name must contain at least one letter or digit."),
                None,
            ));
        }

        let dir = Path::new(&name);

        if dir.exists() {
            return Err(self.error(
                Some("Directory already exists"),
                Some("Choose a different name or delete the existing directory."),
                None,
            ));
        }

        fs::create_dir_all(dir).wrap_err(Error::new(
            "Failed to create the project directory",
            Some("Please verify you have proper file system permissions."),
        ))?;

        let config = config_template(&name, self.command.batch, self.command.code);

        fs::write(
            dir.join(CONFIG_FILE),
            serde_json::to_string_pretty(&config).wrap_err("Failed to render the config")?,
        )
        .wrap_err("Failed to write the config file")?;

        if self.command.code {
            fs::write(dir.join("main.py"), LAMBDA_FUNCTION)
                .wrap_err("Failed to write main.py")?;
            fs::write(dir.join("requirements.txt"), "")
                .wrap_err("Failed to write requirements.txt")?;
        } else if self.command.batch {
            fs::write(dir.join("Dockerfile"), BATCH_DOCKERFILE)
                .wrap_err("Failed to write the Dockerfile")?;
            fs::write(dir.join("main.py"), BATCH_MAIN).wrap_err("Failed to write main.py")?;
        } else {
            fs::write(dir.join("Dockerfile"), LAMBDA_DOCKERFILE)
                .wrap_err("Failed to write the Dockerfile")?;
            fs::write(dir.join("lambda_function.py"), LAMBDA_FUNCTION)
                .wrap_err("Failed to write lambda_function.py")?;
        }

        println!(
            "\n{}\n\n  1. cd {name}\n  2. Develop your {}\n  3. red deploy\n",
            console::style("Project created, next steps:").green().bold(),
            if self.command.code { "function" } else { "container" },
        );

        Ok(())
    }
}

/// Starter config for the selected compute type
fn config_template(name: &str, batch: bool, code: bool) -> serde_json::Value {
    if batch {
        json!({
            "Name": name,
            "Type": "Batch",
            "Timeout": 10000,
            "Cpu": 1,
            "MemorySize": 2048,
            "assignPublicIp": "ENABLED",
            "Arch": "x86_64",
            "VPC": {"SubnetIds": [], "SecurityGroupIds": []},
        })
    } else {
        json!({
            "Name": name,
            "Type": if code { "LambdaCode" } else { "Lambda" },
            "Timeout": 300,
            "MemorySize": 128,
            "Arch": "x86_64",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{ComputeType, Project};

    #[test]
    fn templates_parse_as_projects() {
        let batch: Project =
            serde_json::from_value(config_template("cruncher", true, false)).unwrap();
        assert_eq!(batch.compute_type, ComputeType::Batch);
        assert_eq!(batch.vcpus(), "1");

        let lambda: Project =
            serde_json::from_value(config_template("api", false, false)).unwrap();
        assert_eq!(lambda.compute_type, ComputeType::Lambda);
        assert_eq!(lambda.timeout(), 300);

        let code: Project = serde_json::from_value(config_template("fn", false, true)).unwrap();
        assert_eq!(code.compute_type, ComputeType::LambdaCode);
    }
}
