pub mod models;
pub mod services;
pub mod workers;

pub use services::{LinkService, UploadService};
pub use workers::ExpirySweeper;
