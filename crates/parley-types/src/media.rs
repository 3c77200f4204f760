//! Attachment media types accepted by the backend.

/// Media type assumed when an attachment arrives without one.
pub const DEFAULT_MEDIA_TYPE: &str = "image/jpeg";

/// Media types the backend accepts as inline data.
pub const SUPPORTED_MEDIA_TYPES: &[&str] = &[
    "application/pdf",
    "application/x-javascript",
    "application/x-python",
    "text/plain",
    "text/html",
    "text/css",
    "text/md",
    "text/csv",
    "text/xml",
    "text/rtf",
    "image/png",
    "image/jpeg",
    "image/webp",
    "image/heic",
    "image/heif",
    "video/mp4",
    "video/mpeg",
    "video/mov",
    "video/avi",
    "video/x-flv",
    "video/mpg",
    "video/webm",
    "video/wmv",
    "video/3gpp",
    "audio/wav",
    "audio/mp3",
    "audio/mpeg",
    "audio/aiff",
    "audio/aac",
    "audio/ogg",
    "audio/flac",
];

pub fn is_supported(media_type: &str) -> bool {
    SUPPORTED_MEDIA_TYPES.contains(&media_type)
}

/// Normalize an attachment's media type.
///
/// Blank input becomes [`DEFAULT_MEDIA_TYPE`]; anything else is trimmed,
/// lowercased, and must appear in [`SUPPORTED_MEDIA_TYPES`].
pub fn normalize_media_type(media_type: &str) -> Result<String, String> {
    let trimmed = media_type.trim();
    if trimmed.is_empty() {
        return Ok(DEFAULT_MEDIA_TYPE.to_string());
    }
    let lowered = trimmed.to_ascii_lowercase();
    if is_supported(&lowered) {
        Ok(lowered)
    } else {
        Err(format!("unsupported media type: '{trimmed}'"))
    }
}
