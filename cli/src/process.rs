use eyre::{Context, ContextCompat};
use std::process::{Child, ExitStatus};
use std::{
    io::{BufRead, BufReader, Read, Write},
    sync::{Arc, Mutex},
};

/// A wrapper over an external collaborator process (docker and friends)
///
/// Streams the output one dimmed line at a time while the command runs,
/// and keeps the full transcript for the audit log and error replay.
pub struct Process {
    child: Child,

    stdout_lines: Arc<Mutex<Vec<String>>>,
    stderr_lines: Arc<Mutex<Vec<String>>>,
}

impl Process {
    pub fn new(child: Child) -> Self {
        Process {
            child,
            stdout_lines: Arc::new(Mutex::new(Vec::new())),
            stderr_lines: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Feed the given bytes into the child's stdin and close it
    ///
    /// Used for docker login which reads the registry password from stdin.
    pub fn write_stdin(&mut self, input: &[u8]) -> eyre::Result<()> {
        let mut stdin = self
            .child
            .stdin
            .take()
            .wrap_err("Failed to capture stdin")?;

        stdin.write_all(input).wrap_err("Failed to write to stdin")?;

        Ok(())
    }

    /// A thread printing out lines as they arrive, and accumulating them
    fn thread(
        &self,
        reader: BufReader<impl Read + Send + 'static>,
        lock: Arc<Mutex<Vec<String>>>,
    ) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || {
            for line in reader.lines().map_while(Result::ok) {
                if let Ok(mut lines) = lock.lock() {
                    lines.push(line.clone());
                }

                log::info!("{}", line.trim());

                // Clear the line and print the output dimmed, in one line
                print!("\r\x1B[K");

                let line_trimmed = if line.trim().len() > 48 {
                    format!("{}...", line.trim().chars().take(45).collect::<String>())
                } else {
                    line.trim().to_string()
                };

                print!("{}", console::style(&line_trimmed.trim()).dim());
                let _ = std::io::stdout().flush();
            }
        })
    }

    /// Run the process to completion, logging output in real-time
    pub fn log(&mut self) -> eyre::Result<ExitStatus> {
        let stdout = self
            .child
            .stdout
            .take()
            .wrap_err("Failed to capture stdout")?;

        let stderr = self
            .child
            .stderr
            .take()
            .wrap_err("Failed to capture stderr")?;

        let stdout_thread = self.thread(BufReader::new(stdout), Arc::clone(&self.stdout_lines));
        let stderr_thread = self.thread(BufReader::new(stderr), Arc::clone(&self.stderr_lines));

        let status = self.child.wait().wrap_err("Command failed to complete")?;

        stdout_thread.join().unwrap();
        stderr_thread.join().unwrap();

        // Clean up old output
        print!("\r\x1B[K");

        Ok(status)
    }

    /// If there was an error, print the full stderr
    pub fn print_error(&self) {
        if let Ok(lines) = self.stderr_lines.lock() {
            println!(
                "\n{}\n{}",
                console::style("Error:").red().bold(),
                lines.join("\n")
            );
        }
    }
}
