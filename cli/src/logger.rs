use std::fs::OpenOptions;
use std::sync::OnceLock;

use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;

/// Log file every operation gets appended to, for audit purposes
pub const AUDIT_LOG_FILE: &str = "red.log";

/// Set up log levels, formatting, and the log sink
///
/// All operational logs go to the red.log audit file in the project directory
/// by default. Set RED_LOG_STDERR=1 to print them to the terminal instead,
/// and RUST_LOG to control the level as usual.
pub struct Logger {
    multi_progress: MultiProgress,
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

impl<'a> Logger {
    pub fn init() -> &'a Self {
        LOGGER.get_or_init(|| {
            let mut builder = env_logger::Builder::from_env(
                env_logger::Env::default().default_filter_or("info"),
            );

            // The sink is selected once at startup and never changes
            if std::env::var("RED_LOG_STDERR").is_err() {
                if let Ok(file) = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(AUDIT_LOG_FILE)
                {
                    builder.target(env_logger::Target::Pipe(Box::new(file)));
                }
            }

            let logger = builder.build();
            let level = logger.filter();
            let multi_progress = MultiProgress::new();

            LogWrapper::new(multi_progress.clone(), logger)
                .try_init()
                .unwrap();
            log::set_max_level(level);

            Self { multi_progress }
        })
    }

    pub fn multi_progress() -> &'a MultiProgress {
        &Self::init().multi_progress
    }
}
