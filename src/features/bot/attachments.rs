use crate::features::uploads::models::{FileHandle, IncomingFile};
use crate::modules::telegram::types::Message;

/// Pick the uploadable attachment of a message
///
/// Precedence: document, photo (largest size), video, audio, voice.
pub fn incoming_file(message: &Message) -> Option<IncomingFile> {
    if let Some(doc) = &message.document {
        return Some(IncomingFile::Document(FileHandle {
            file_id: doc.file_id.clone(),
            file_name: doc.file_name.clone(),
            mime_type: doc.mime_type.clone(),
            size_bytes: doc.file_size.unwrap_or(0),
        }));
    }

    if let Some(largest) = message.photo.as_ref().and_then(|sizes| sizes.last()) {
        return Some(IncomingFile::Photo(FileHandle {
            file_id: largest.file_id.clone(),
            file_name: None,
            mime_type: None,
            size_bytes: largest.file_size.unwrap_or(0),
        }));
    }

    if let Some(video) = &message.video {
        return Some(IncomingFile::Video(FileHandle {
            file_id: video.file_id.clone(),
            file_name: video.file_name.clone(),
            mime_type: video.mime_type.clone(),
            size_bytes: video.file_size.unwrap_or(0),
        }));
    }

    if let Some(audio) = &message.audio {
        return Some(IncomingFile::Audio(FileHandle {
            file_id: audio.file_id.clone(),
            file_name: audio.file_name.clone(),
            mime_type: audio.mime_type.clone(),
            size_bytes: audio.file_size.unwrap_or(0),
        }));
    }

    message.voice.as_ref().map(|voice| {
        IncomingFile::Voice(FileHandle {
            file_id: voice.file_id.clone(),
            file_name: None,
            mime_type: voice.mime_type.clone(),
            size_bytes: voice.file_size.unwrap_or(0),
        })
    })
}
