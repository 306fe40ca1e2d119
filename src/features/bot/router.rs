use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;

use crate::core::error::Result;
use crate::features::auth::{AuthOutcome, AuthService};
use crate::features::bot::attachments::incoming_file;
use crate::features::bot::commands::{parse_file_id, Command};
use crate::features::bot::replies;
use crate::features::uploads::models::IncomingFile;
use crate::features::uploads::{LinkService, UploadService};
use crate::modules::telegram::types::Message;

/// Maps inbound messages to bot operations and renders the reply
pub struct CommandRouter {
    auth: Arc<AuthService>,
    uploads: Arc<UploadService>,
    links: Arc<LinkService>,
    bot_username: Option<String>,
}

impl CommandRouter {
    pub fn new(
        auth: Arc<AuthService>,
        uploads: Arc<UploadService>,
        links: Arc<LinkService>,
        bot_username: Option<String>,
    ) -> Self {
        Self {
            auth,
            uploads,
            links,
            bot_username,
        }
    }

    fn link_ttl(&self) -> Duration {
        self.uploads.policy().link_ttl
    }

    /// Handle one message, returning the reply text if any
    ///
    /// Errors never escape: they become the reply. Infrastructure failures
    /// are logged inside a span carrying the user id.
    pub async fn route(&self, message: &Message) -> Option<String> {
        let user = message.from.as_ref().filter(|u| !u.is_bot)?;
        let user_id = user.id;

        let outcome = match message.text.as_deref() {
            Some(text) => {
                let command = Command::parse(text, self.bot_username.as_deref())?;
                let span = tracing::info_span!("command", user_id, name = command.name());
                self.handle_command(user_id, command).instrument(span).await
            }
            None => {
                // Service messages, stickers and the like get no reply
                let file = incoming_file(message)?;
                let span = tracing::info_span!("upload", user_id, kind = file.kind());
                self.handle_file(user_id, file).instrument(span).await
            }
        };

        Some(outcome.unwrap_or_else(|e| {
            let _guard = tracing::info_span!("reply", user_id).entered();
            if !e.is_infrastructure() {
                tracing::debug!("Request rejected: {}", e);
            }
            e.user_message()
        }))
    }

    async fn handle_command(&self, user_id: i64, command: Command) -> Result<String> {
        match command {
            Command::Start => self.start(user_id).await,
            Command::Auth(args) => self.authenticate(user_id, &args).await,
            Command::List => self.list(user_id).await,
            Command::Delete(args) => self.delete(user_id, &args).await,
            Command::Regenerate(args) => self.regenerate(user_id, &args).await,
        }
    }

    async fn start(&self, user_id: i64) -> Result<String> {
        if !self.auth.is_authenticated(user_id).await {
            return Ok(replies::START_UNAUTHENTICATED.to_string());
        }
        Ok(replies::start(self.uploads.policy()))
    }

    async fn authenticate(&self, user_id: i64, args: &[String]) -> Result<String> {
        if !self.auth.password_required() {
            return Ok(replies::AUTH_NOT_REQUIRED.to_string());
        }
        let [password] = args else {
            return Ok(replies::AUTH_USAGE.to_string());
        };

        let reply = match self.auth.authenticate(user_id, password).await? {
            AuthOutcome::Authenticated => replies::AUTH_SUCCESS,
            AuthOutcome::NotRequired => replies::AUTH_NOT_REQUIRED,
            AuthOutcome::WrongPassword => replies::AUTH_FAILED,
        };
        Ok(reply.to_string())
    }

    async fn list(&self, user_id: i64) -> Result<String> {
        self.auth.require_authenticated(user_id).await?;
        let records = self.uploads.list_recent(user_id).await?;
        Ok(replies::upload_list(&records))
    }

    async fn delete(&self, user_id: i64, args: &[String]) -> Result<String> {
        self.auth.require_authenticated(user_id).await?;
        let record_id = parse_file_id(args, replies::DELETE_USAGE)?;
        self.links.delete(user_id, record_id).await?;
        Ok(replies::DELETE_SUCCESS.to_string())
    }

    async fn regenerate(&self, user_id: i64, args: &[String]) -> Result<String> {
        self.auth.require_authenticated(user_id).await?;
        let record_id = parse_file_id(args, replies::REGENERATE_USAGE)?;
        let link = self.links.regenerate(user_id, record_id).await?;
        Ok(replies::regenerated(&link, self.link_ttl()))
    }

    async fn handle_file(&self, user_id: i64, file: IncomingFile) -> Result<String> {
        let receipt = self.uploads.upload(user_id, Some(file)).await?;
        Ok(replies::upload_receipt(&receipt, self.link_ttl()))
    }
}
