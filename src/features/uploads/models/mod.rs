mod incoming_file;
mod upload_record;

pub use incoming_file::{FileHandle, IncomingFile};
pub use upload_record::{RegeneratedLink, UploadReceipt, UploadRecord};
