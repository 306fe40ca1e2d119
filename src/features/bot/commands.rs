use lazy_static::lazy_static;
use regex::Regex;

use crate::core::error::{AppError, Result};

lazy_static! {
    /// Bot command with optional `@botname` suffix and free-form arguments
    /// - Matches: "/list", "/auth secret", "/delete@relay_bot 12"
    /// - Rejects: "list", "/ list", "hello /list"
    static ref COMMAND_REGEX: Regex =
        Regex::new(r"(?s)^/([A-Za-z0-9_]+)(?:@([A-Za-z0-9_]+))?(?:\s+(.*))?$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Auth(Vec<String>),
    List,
    Delete(Vec<String>),
    Regenerate(Vec<String>),
}

impl Command {
    /// Parse a message text into a command
    ///
    /// Returns `None` for plain text, unknown commands, and commands addressed
    /// to a different bot.
    pub fn parse(text: &str, bot_username: Option<&str>) -> Option<Command> {
        let captures = COMMAND_REGEX.captures(text.trim())?;

        if let (Some(target), Some(own)) = (captures.get(2), bot_username) {
            if !target.as_str().eq_ignore_ascii_case(own) {
                return None;
            }
        }

        let args: Vec<String> = captures
            .get(3)
            .map(|m| m.as_str().split_whitespace().map(String::from).collect())
            .unwrap_or_default();

        match captures.get(1)?.as_str().to_ascii_lowercase().as_str() {
            "start" | "help" => Some(Command::Start),
            "auth" => Some(Command::Auth(args)),
            "list" => Some(Command::List),
            "delete" => Some(Command::Delete(args)),
            "regenerate" => Some(Command::Regenerate(args)),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Auth(_) => "auth",
            Command::List => "list",
            Command::Delete(_) => "delete",
            Command::Regenerate(_) => "regenerate",
        }
    }
}

/// Extract the single record id argument of /delete and /regenerate
pub fn parse_file_id(args: &[String], usage: &str) -> Result<i64> {
    let [arg] = args else {
        return Err(AppError::BadRequest(usage.to_string()));
    };
    arg.parse::<i64>()
        .map_err(|_| AppError::BadRequest("Invalid file ID.".to_string()))
}
