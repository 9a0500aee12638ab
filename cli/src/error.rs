/// User-facing error in unified format
///
/// Carries a short message plus an optional hint on how to recover.
#[derive(Debug)]
pub struct Error {
    message: String,
    hint: Option<String>,
}

impl Error {
    pub fn new(message: &str, hint: Option<&str>) -> Self {
        Error {
            message: message.to_string(),
            hint: hint.map(|h| h.to_string()),
        }
    }
}

/// Print the message with the hint dimmed below it
impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}\n\n{}",
            self.message,
            console::style(self.hint.clone().unwrap_or_default()).dim()
        )
    }
}

impl std::error::Error for Error {}

/// Convert any eyre report into a terminating user-facing error
impl From<eyre::ErrReport> for Error {
    fn from(error: eyre::ErrReport) -> Self {
        let error = error
            .downcast::<Error>()
            .unwrap_or_else(|err| Error::new(&err.to_string(), None));

        eprintln!("\n\n{}\n{error}", console::style("Error").red().bold());

        // The Error is used as a terminating error only
        std::process::exit(1)
    }
}
