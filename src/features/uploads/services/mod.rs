mod link_service;
mod upload_service;

pub use link_service::LinkService;
pub use upload_service::UploadService;
pub(crate) use upload_service::key_in_use;
