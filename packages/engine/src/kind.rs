use crate::error::ProcessError;

/// Media categories the engine can derive from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classify a blob by MIME content type. Anything outside `image/*`
    /// and `video/*` fails fast, before any record or dispatch exists.
    pub fn from_content_type(content_type: &str) -> Result<Self, ProcessError> {
        if content_type.starts_with("image/") {
            Ok(Self::Image)
        } else if content_type.starts_with("video/") {
            Ok(Self::Video)
        } else {
            Err(ProcessError::UnsupportedSource(content_type.to_string()))
        }
    }

    /// Endpoint path segment for single-call variant dispatch.
    pub fn variant_path(&self) -> &'static str {
        match self {
            Self::Image => "image/variant",
            Self::Video => "video/variant",
        }
    }
}
