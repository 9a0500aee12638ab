use crate::utils::millis_to_date;
use aws_config::SdkConfig;
use aws_sdk_cloudwatchlogs::error::ProvideErrorMetadata;
use aws_sdk_cloudwatchlogs::types::OrderBy;
use eyre::Context;

/// Stream name option that selects the most recent stream
pub const LATEST_STREAM: &str = "_latest";

/// A log stream rendered for the selection prompt
pub struct Stream {
    pub name: String,
    pub last_event: Option<String>,
}

/// CloudWatch log groups and streams of the project
pub struct Logs {
    client: aws_sdk_cloudwatchlogs::Client,
}

impl Logs {
    pub fn new(config: &SdkConfig) -> Self {
        Logs {
            client: aws_sdk_cloudwatchlogs::Client::new(config),
        }
    }

    /// Create the log group, or leave the existing one as is
    pub async fn ensure_group(&self, group: &str, project_name: &str) -> eyre::Result<()> {
        let created = self
            .client
            .create_log_group()
            .log_group_name(group)
            .tags("Name", project_name)
            .send()
            .await;

        match created {
            Ok(_) => {
                log::info!("Created log group: {group}");
                Ok(())
            }
            Err(e) if e.code() == Some("ResourceAlreadyExistsException") => {
                log::info!("Reusing log group: {group}");
                Ok(())
            }
            Err(e) => Err(e).wrap_err("Failed to create log group"),
        }
    }

    /// Most recently active streams in the group, newest first
    pub async fn streams(&self, group: &str) -> eyre::Result<Vec<Stream>> {
        let response = self
            .client
            .describe_log_streams()
            .log_group_name(group)
            .order_by(OrderBy::LastEventTime)
            .descending(true)
            .limit(10)
            .send()
            .await
            .wrap_err("Failed to list log streams")?;

        let streams = response
            .log_streams()
            .iter()
            .filter_map(|stream| {
                Some(Stream {
                    name: stream.log_stream_name()?.to_string(),
                    last_event: stream.last_event_timestamp().map(millis_to_date),
                })
            })
            .collect();

        Ok(streams)
    }

    /// All events of a stream, oldest first
    ///
    /// The special name "_latest" resolves to the most recently active
    /// stream of the group.
    pub async fn events(&self, group: &str, stream: &str) -> eyre::Result<Vec<String>> {
        let stream = if stream == LATEST_STREAM {
            self.streams(group)
                .await?
                .into_iter()
                .next()
                .map(|s| s.name)
                .ok_or_else(|| eyre::eyre!("No log streams found in group {group}"))?
        } else {
            stream.to_string()
        };

        let response = self
            .client
            .get_log_events()
            .log_group_name(group)
            .log_stream_name(&stream)
            .start_from_head(true)
            .send()
            .await
            .wrap_err("Failed to read log events")?;

        let events = response
            .events()
            .iter()
            .filter_map(|event| {
                let timestamp = event.timestamp().map(millis_to_date)?;
                let message = event.message()?;
                Some(format!("{timestamp}  {message}"))
            })
            .collect();

        Ok(events)
    }

    /// Delete the log group, tolerating one that was never created
    pub async fn delete_group(&self, group: &str) -> eyre::Result<()> {
        let deleted = self
            .client
            .delete_log_group()
            .log_group_name(group)
            .send()
            .await;

        match deleted {
            Ok(_) => {
                log::info!("Deleted log group: {group}");
                Ok(())
            }
            Err(e) if e.code() == Some("ResourceNotFoundException") => {
                log::info!("Log group not found: {group}");
                Ok(())
            }
            Err(e) => Err(e).wrap_err("Failed to delete log group"),
        }
    }
}
