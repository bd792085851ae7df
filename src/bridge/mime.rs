//! Supported file types, content sniffing and MIME compatibility.

use super::config::UploadConfig;

/// Broad grouping used for size ceilings and parse decisions.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FileCategory {
    /// Raster images.
    Image,
    /// Office documents and PDF.
    Document,
    /// Plain and structured text.
    Text,
    /// Source code.
    Code,
    /// Audio clips.
    Audio,
    /// Video clips.
    Video,
}

impl FileCategory {
    /// Size ceiling for this category.
    #[must_use]
    pub const fn max_size(self, limits: &UploadConfig) -> u64 {
        match self {
            Self::Image => limits.max_image_size,
            _ => limits.max_file_size,
        }
    }

    /// Whether the backend should index files of this category by default.
    #[must_use]
    pub const fn parse_by_default(self) -> bool {
        matches!(self, Self::Document | Self::Text)
    }
}

/// Entry of the supported-type table.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FileTypeInfo {
    /// Canonical MIME type.
    pub mime: &'static str,
    /// Extension including the leading dot.
    pub extension: &'static str,
    /// Category.
    pub category: FileCategory,
}

const fn entry(mime: &'static str, extension: &'static str, category: FileCategory) -> FileTypeInfo {
    FileTypeInfo {
        mime,
        extension,
        category,
    }
}

/// MIME types the backend accepts.
pub const SUPPORTED_TYPES: &[FileTypeInfo] = &[
    entry("image/jpeg", ".jpg", FileCategory::Image),
    entry("image/png", ".png", FileCategory::Image),
    entry("image/gif", ".gif", FileCategory::Image),
    entry("image/webp", ".webp", FileCategory::Image),
    entry("application/pdf", ".pdf", FileCategory::Document),
    entry("application/msword", ".doc", FileCategory::Document),
    entry(
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ".docx",
        FileCategory::Document,
    ),
    entry("application/vnd.ms-excel", ".xls", FileCategory::Document),
    entry(
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ".xlsx",
        FileCategory::Document,
    ),
    entry("application/vnd.ms-powerpoint", ".ppt", FileCategory::Document),
    entry(
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        ".pptx",
        FileCategory::Document,
    ),
    entry("text/plain", ".txt", FileCategory::Text),
    entry("text/markdown", ".md", FileCategory::Text),
    entry("text/csv", ".csv", FileCategory::Text),
    entry("application/json", ".json", FileCategory::Text),
    entry("application/xml", ".xml", FileCategory::Text),
    entry("text/xml", ".xml", FileCategory::Text),
    entry("text/javascript", ".js", FileCategory::Code),
    entry("application/javascript", ".js", FileCategory::Code),
    entry("text/html", ".html", FileCategory::Code),
    entry("text/css", ".css", FileCategory::Code),
    entry("application/x-python", ".py", FileCategory::Code),
    entry("text/x-python", ".py", FileCategory::Code),
    entry("audio/mpeg", ".mp3", FileCategory::Audio),
    entry("audio/wav", ".wav", FileCategory::Audio),
    entry("audio/ogg", ".ogg", FileCategory::Audio),
    entry("audio/mp4", ".m4a", FileCategory::Audio),
    entry("video/mp4", ".mp4", FileCategory::Video),
    entry("video/avi", ".avi", FileCategory::Video),
    entry("video/mov", ".mov", FileCategory::Video),
];

/// Fallback extension for unrecognised types.
pub const FALLBACK_EXTENSION: &str = ".bin";

/// Strip parameters (`; charset=...`) and lowercase a MIME type.
#[must_use]
pub fn essence(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Look up a MIME type in the supported table.
#[must_use]
pub fn lookup(mime: &str) -> Option<&'static FileTypeInfo> {
    let wanted = essence(mime);
    SUPPORTED_TYPES.iter().find(|info| info.mime == wanted)
}

/// Extension for a MIME type, `.bin` when unknown.
#[must_use]
pub fn extension_for(mime: &str) -> &'static str {
    lookup(mime).map_or(FALLBACK_EXTENSION, |info| info.extension)
}

/// Guess a MIME type from a file name's extension.
#[must_use]
pub fn guess_from_name(name: &str) -> Option<String> {
    let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
    if let Some(info) = SUPPORTED_TYPES
        .iter()
        .find(|info| info.extension.trim_start_matches('.') == ext)
    {
        return Some(info.mime.to_string());
    }
    match ext.as_str() {
        "jpeg" => Some("image/jpeg".to_string()),
        "markdown" => Some("text/markdown".to_string()),
        _ => mime_guess::from_ext(&ext).first().map(|m| m.essence_str().to_string()),
    }
}

/// Sniff a MIME type from leading bytes.
///
/// Recognises the signatures the backend cares about and otherwise decides
/// between `text/plain; charset=utf-8` and `application/octet-stream`.
#[must_use]
pub fn sniff(data: &[u8]) -> &'static str {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"%PDF-", "application/pdf"),
        (b"PK\x03\x04", "application/zip"),
        (b"\xd0\xcf\x11\xe0\xa1\xb1\x1a\xe1", "application/x-ole-storage"),
        (b"ID3", "audio/mpeg"),
        (b"OggS", "application/ogg"),
    ];

    if data.is_empty() {
        return "text/plain; charset=utf-8";
    }

    for &(magic, mime) in SIGNATURES {
        if data.starts_with(magic) {
            return mime;
        }
    }

    if data.len() >= 12 && &data[..4] == b"RIFF" {
        match &data[8..12] {
            b"WEBP" => return "image/webp",
            b"WAVE" => return "audio/wave",
            b"AVI " => return "video/avi",
            _ => {}
        }
    }
    if data.len() >= 12 && &data[4..8] == b"ftyp" {
        return "video/mp4";
    }

    let head = &data[..data.len().min(512)];
    let trimmed = head
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map_or(head, |start| &head[start..]);
    if starts_with_ignore_case(trimmed, b"<!doctype html") || starts_with_ignore_case(trimmed, b"<html") {
        return "text/html; charset=utf-8";
    }
    if trimmed.starts_with(b"<?xml") {
        return "text/xml; charset=utf-8";
    }

    if looks_textual(head) {
        "text/plain; charset=utf-8"
    } else {
        "application/octet-stream"
    }
}

fn starts_with_ignore_case(data: &[u8], prefix: &[u8]) -> bool {
    data.len() >= prefix.len() && data[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn looks_textual(head: &[u8]) -> bool {
    let binary = head
        .iter()
        .any(|&b| b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r' | 0x0c | 0x1b));
    if binary {
        return false;
    }
    // A multi-byte char may straddle the 512-byte window.
    match std::str::from_utf8(head) {
        Ok(_) => true,
        Err(err) => err.error_len().is_none(),
    }
}

/// Whether a sniffed type is acceptable for a declared one.
#[must_use]
pub fn is_compatible(detected: &str, declared: &str) -> bool {
    let detected = essence(detected);
    let declared = essence(declared);
    if detected == declared {
        return true;
    }

    let allowed: &[&str] = match declared.as_str() {
        "text/plain" => &["text/plain", "application/octet-stream"],
        "text/markdown" | "application/json" | "text/csv" | "text/javascript"
        | "application/javascript" | "text/css" | "text/x-python" | "application/x-python" => {
            &["text/plain"]
        }
        "application/xml" => &["text/xml", "text/plain"],
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        | "application/vnd.openxmlformats-officedocument.presentationml.presentation" => {
            &["application/zip"]
        }
        "application/msword" | "application/vnd.ms-excel" | "application/vnd.ms-powerpoint" => {
            &["application/x-ole-storage"]
        }
        "audio/wav" => &["audio/wave"],
        "audio/ogg" => &["application/ogg"],
        _ => &[],
    };

    allowed.contains(&detected.as_str())
}
