//! Chat commands: `!status`, `!status <host>` and `!uptime <host>`
//!
//! Commands only read the status board and the sample store; they never
//! probe hosts or touch the schedules.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::config::Host;
use crate::discord::{Message, MessageBuilder};
use crate::presentation::render::{render, render_uptime};
use crate::status::StatusBoard;
use crate::storage::{BucketGranularity, DISPLAY_BUCKETS, SampleStore, WindowEntry, fill_window};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    StatusAll,
    Status(String),
    Uptime(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("not a command")]
    NotACommand,
    #[error("Usage: `!status [hostname]`")]
    StatusUsage,
    #[error("Usage: `!uptime <hostname>`")]
    UptimeUsage,
}

impl FromStr for BotCommand {
    type Err = CommandError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let mut parts = content.split_whitespace();
        let command = parts.next().ok_or(CommandError::NotACommand)?;
        let args: Vec<&str> = parts.collect();

        match (command, args.as_slice()) {
            ("!status", []) => Ok(BotCommand::StatusAll),
            ("!status", [host]) => Ok(BotCommand::Status(host.to_string())),
            ("!status", _) => Err(CommandError::StatusUsage),
            ("!uptime", [host]) => Ok(BotCommand::Uptime(host.to_string())),
            ("!uptime", _) => Err(CommandError::UptimeUsage),
            _ => Err(CommandError::NotACommand),
        }
    }
}

/// Everything a command needs to answer
#[derive(Clone)]
pub struct CommandContext {
    hosts: Arc<[Host]>,
    board: StatusBoard,
    store: Arc<dyn SampleStore>,
    granularity: BucketGranularity,
}

fn text(content: impl ToString) -> Message {
    MessageBuilder::new().content(content).build()
}

impl CommandContext {
    pub fn new(hosts: Arc<[Host]>, board: StatusBoard, store: Arc<dyn SampleStore>) -> Self {
        Self {
            hosts,
            board,
            store,
            granularity: BucketGranularity::HOURLY,
        }
    }

    pub fn granularity(mut self, granularity: BucketGranularity) -> Self {
        self.granularity = granularity;
        self
    }

    fn host(&self, name: &str) -> Option<&Host> {
        self.hosts.iter().find(|host| host.name == name)
    }

    async fn window(&self, hostname: &str, now: DateTime<Utc>) -> Vec<WindowEntry> {
        self.store
            .window(hostname, DISPLAY_BUCKETS, now)
            .await
            .unwrap_or_else(|e| {
                warn!("cannot read uptime history of {hostname}: {e}");
                fill_window(&self.granularity.window_buckets(DISPLAY_BUCKETS, now), &[])
            })
    }

    async fn status_of(&self, host: &Host, now: DateTime<Utc>) -> Message {
        match self.board.get(&host.name).await {
            Some(status) => {
                let window = self.window(&host.name, now).await;
                MessageBuilder::new()
                    .add_embed(render(host, &status, &window))
                    .build()
            }
            None => text(format!("Host `{}` has not been checked yet", host.name)),
        }
    }

    pub async fn execute(&self, command: &BotCommand, now: DateTime<Utc>) -> Vec<Message> {
        debug!("executing {command:?}");

        match command {
            BotCommand::StatusAll => {
                let mut replies = Vec::with_capacity(self.hosts.len());
                for host in self.hosts.iter() {
                    replies.push(self.status_of(host, now).await);
                }
                replies
            }
            BotCommand::Status(name) => match self.host(name) {
                Some(host) => vec![self.status_of(host, now).await],
                None => vec![text(format!("Host `{name}` not found"))],
            },
            BotCommand::Uptime(name) => match self.host(name) {
                Some(host) => {
                    let window = self.window(&host.name, now).await;
                    vec![
                        MessageBuilder::new()
                            .add_embed(render_uptime(&host.name, &window))
                            .build(),
                    ]
                }
                None => vec![text(format!("Host `{name}` not found"))],
            },
        }
    }

    /// Replies to a chat message, or nothing if it is not a command
    pub async fn answer(&self, content: &str, now: DateTime<Utc>) -> Vec<Message> {
        match content.parse::<BotCommand>() {
            Ok(command) => self.execute(&command, now).await,
            Err(CommandError::NotACommand) => Vec::new(),
            Err(usage) => vec![text(usage)],
        }
    }
}
