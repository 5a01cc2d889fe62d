use anyhow::Result;

use crate::Commands;

use super::container::Container;
use super::controller::ChatController;

pub struct Router<'a> {
    chat_controller: ChatController<'a>,
}

impl<'a> Router<'a> {
    pub fn new(container: &'a Container) -> Self {
        Self {
            chat_controller: ChatController::new(container),
        }
    }

    pub async fn route(&self, command: Commands) -> Result<String> {
        match command {
            Commands::Chat { profile, no_stream } => {
                let profile = profile.resolve().await?;
                self.chat_controller.run(profile, !no_stream).await
            }
            Commands::Ask {
                text,
                profile,
                stream,
            } => {
                let profile = profile.resolve().await?;
                self.chat_controller.ask(text, profile, stream).await
            }
            Commands::Check => self.chat_controller.check().await,
        }
    }
}
