use std::time::Duration;

use crate::core::config::UploadPolicyConfig;
use crate::features::uploads::models::{RegeneratedLink, UploadReceipt, UploadRecord};

pub const START_UNAUTHENTICATED: &str = "Please authenticate using /auth <password>";
pub const AUTH_NOT_REQUIRED: &str = "Authentication is not required.";
pub const AUTH_USAGE: &str = "Usage: /auth <password>";
pub const AUTH_SUCCESS: &str = "Authentication successful! You can now use the bot.";
pub const AUTH_FAILED: &str = "Incorrect password.";
pub const DELETE_USAGE: &str = "Usage: /delete <file_id>";
pub const DELETE_SUCCESS: &str = "File deleted successfully.";
pub const REGENERATE_USAGE: &str = "Usage: /regenerate <file_id>";
pub const NO_UPLOADS: &str = "No uploaded files found.";

/// Compact lifetime label, e.g. "24h" or "90m"
pub fn ttl_label(ttl: Duration) -> String {
    let secs = ttl.as_secs();
    if secs >= 3600 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

pub fn start(policy: &UploadPolicyConfig) -> String {
    format!(
        "Hi! Send me any file (up to {}MB) to upload to cloud storage. \
         You'll get a temporary link ({}). Use /list, /delete, or /regenerate to manage files.",
        policy.max_file_size / 1024 / 1024,
        ttl_label(policy.link_ttl)
    )
}

pub fn upload_receipt(receipt: &UploadReceipt, ttl: Duration) -> String {
    format!(
        "File uploaded! ID: {}\nName: {}\nSize: {:.2} KB\nLink (expires in {}):\n{}",
        receipt.id,
        receipt.file_name,
        receipt.file_size as f64 / 1024.0,
        ttl_label(ttl),
        receipt.url
    )
}

pub fn upload_list(records: &[UploadRecord]) -> String {
    if records.is_empty() {
        return NO_UPLOADS.to_string();
    }

    let mut message = String::from("Your recent uploads:\n");
    for record in records {
        let expires = record
            .expires_at_utc()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        message.push_str(&format!(
            "ID: {}, Name: {}, Expires: {}\n",
            record.id, record.file_name, expires
        ));
    }
    message
}

pub fn regenerated(link: &RegeneratedLink, ttl: Duration) -> String {
    format!("New link (expires in {}):\n{}", ttl_label(ttl), link.url)
}
