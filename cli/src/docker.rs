use crate::process::Process;
use eyre::Context;
use std::process::{Command, Stdio};

/// Docker operations for container workloads
///
/// All of them shell out to the local docker binary through the Process
/// wrapper, so the build output streams to the terminal and lands in the
/// audit log.
pub struct Docker;

impl Docker {
    /// Authenticate the local docker daemon against the registry
    pub fn login(registry: &str, username: &str, password: &str) -> eyre::Result<()> {
        let child = Command::new("docker")
            .args(["login", "--username", username, "--password-stdin", registry])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .wrap_err("Failed to run docker login, is docker installed?")?;

        let mut process = Process::new(child);
        process.write_stdin(password.as_bytes())?;

        let status = process.log()?;

        if !status.success() {
            process.print_error();
            return Err(eyre::eyre!("Docker login failed"));
        }

        log::info!("Docker login successful");
        Ok(())
    }

    /// Build the project image from the Dockerfile in the current directory
    pub fn build(uri: &str) -> eyre::Result<()> {
        let child = Command::new("docker")
            .args(["build", "-t", &format!("{uri}:latest"), "."])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .wrap_err("Failed to run docker build, is docker installed?")?;

        let mut process = Process::new(child);
        let status = process.log()?;

        if !status.success() {
            process.print_error();
            return Err(eyre::eyre!("Docker build failed"));
        }

        log::info!("Built container image: {uri}:latest");
        Ok(())
    }

    /// Push the built image to the registry
    pub fn push(uri: &str) -> eyre::Result<()> {
        let child = Command::new("docker")
            .args(["push", &format!("{uri}:latest")])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .wrap_err("Failed to run docker push, is docker installed?")?;

        let mut process = Process::new(child);
        let status = process.log()?;

        if !status.success() {
            process.print_error();
            return Err(eyre::eyre!("Docker push failed"));
        }

        log::info!("Pushed container image: {uri}:latest");
        Ok(())
    }

    /// Run a one-off container with the current directory mounted
    ///
    /// Used to vendor Python dependencies for the target platform when
    /// bundling zip deployments.
    pub fn run(image: &str, platform: &str, command: &str) -> eyre::Result<()> {
        let cwd = std::env::current_dir().wrap_err("Failed to read the current directory")?;

        let child = Command::new("docker")
            .args([
                "run",
                "--rm",
                "--platform",
                platform,
                "-v",
                &format!("{}:/work", cwd.display()),
                "-w",
                "/work",
                "--entrypoint",
                "sh",
                image,
                "-c",
                command,
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .wrap_err("Failed to run docker, is docker installed?")?;

        let mut process = Process::new(child);
        let status = process.log()?;

        if !status.success() {
            process.print_error();
            return Err(eyre::eyre!("Docker run failed"));
        }

        Ok(())
    }
}
