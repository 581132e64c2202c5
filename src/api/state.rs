//! Shared state of the API handlers

use std::sync::Arc;

use crate::commands::CommandContext;
use crate::config::Host;
use crate::discord::DiscordClient;
use crate::status::StatusBoard;
use crate::storage::SampleStore;

#[derive(Clone)]
pub struct ApiState {
    pub hosts: Arc<[Host]>,
    pub board: StatusBoard,
    pub store: Arc<dyn SampleStore>,
    pub commands: CommandContext,
    /// Delivers command replies when the request names a channel
    pub discord: Option<DiscordClient>,
}

impl ApiState {
    pub fn new(hosts: Arc<[Host]>, board: StatusBoard, store: Arc<dyn SampleStore>) -> Self {
        let commands = CommandContext::new(hosts.clone(), board.clone(), store.clone());
        Self {
            hosts,
            board,
            store,
            commands,
            discord: None,
        }
    }

    pub fn with_discord(mut self, client: DiscordClient) -> Self {
        self.discord = Some(client);
        self
    }

    pub fn host(&self, name: &str) -> Option<&Host> {
        self.hosts.iter().find(|host| host.name == name)
    }
}
