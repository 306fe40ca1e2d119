/// Transport-level reference to an attachment's content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    /// Opaque id used to fetch the bytes from the transport
    pub file_id: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    /// Size reported by the transport; 0 when unknown
    pub size_bytes: u64,
}

/// Attachment kinds accepted for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingFile {
    Document(FileHandle),
    Photo(FileHandle),
    Video(FileHandle),
    Audio(FileHandle),
    Voice(FileHandle),
}

impl IncomingFile {
    pub fn handle(&self) -> &FileHandle {
        match self {
            IncomingFile::Document(h)
            | IncomingFile::Photo(h)
            | IncomingFile::Video(h)
            | IncomingFile::Audio(h)
            | IncomingFile::Voice(h) => h,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            IncomingFile::Document(_) => "document",
            IncomingFile::Photo(_) => "photo",
            IncomingFile::Video(_) => "video",
            IncomingFile::Audio(_) => "audio",
            IncomingFile::Voice(_) => "voice",
        }
    }

    pub fn file_id(&self) -> &str {
        &self.handle().file_id
    }

    pub fn size_bytes(&self) -> u64 {
        self.handle().size_bytes
    }

    /// Name the file is stored and listed under
    ///
    /// Attachments without a name (photos, voice notes) get `file_{epoch}`
    /// plus an extension when one can be inferred.
    pub fn resolved_name(&self, upload_epoch: i64) -> String {
        if let Some(name) = self
            .handle()
            .file_name
            .as_deref()
            .map(sanitize_file_name)
            .filter(|n| !n.is_empty())
        {
            return name;
        }

        match self.default_extension() {
            Some(ext) => format!("file_{}.{}", upload_epoch, ext),
            None => format!("file_{}", upload_epoch),
        }
    }

    fn default_extension(&self) -> Option<&'static str> {
        match self {
            IncomingFile::Photo(_) => Some("jpg"),
            IncomingFile::Voice(_) => Some("ogg"),
            _ => self
                .handle()
                .mime_type
                .as_deref()
                .and_then(|m| mime_guess::get_mime_extensions_str(m))
                .and_then(|exts| exts.first().copied()),
        }
    }

    /// MIME type sent with the stored object
    pub fn content_type(&self, resolved_name: &str) -> String {
        if let Some(mime) = self.handle().mime_type.as_deref().filter(|m| !m.is_empty()) {
            return mime.to_string();
        }
        match self {
            IncomingFile::Photo(_) => "image/jpeg".to_string(),
            IncomingFile::Voice(_) => "audio/ogg".to_string(),
            _ => mime_guess::from_path(resolved_name)
                .first_or_octet_stream()
                .to_string(),
        }
    }
}

/// Keep only the final path component so names cannot nest inside the key
fn sanitize_file_name(name: &str) -> String {
    name.rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}
