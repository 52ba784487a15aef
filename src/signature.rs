use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The closed set of image formats we accept.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ImageType {
    Jpeg = 0,
    Png = 1,
    Gif = 2,
}

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47];
const GIF_MAGIC: &[u8] = &[0x47, 0x49, 0x46];

/// Anything shorter cannot be a real image, whatever its first bytes are.
pub const MIN_SIGNATURE_LEN: usize = 4;

impl ImageType {
    pub const ALL: [ImageType; 3] = [ImageType::Jpeg, ImageType::Png, ImageType::Gif];

    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            _ => None,
        }
    }

    pub fn as_mime(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
        }
    }

    pub fn magic(self) -> &'static [u8] {
        match self {
            Self::Jpeg => JPEG_MAGIC,
            Self::Png => PNG_MAGIC,
            Self::Gif => GIF_MAGIC,
        }
    }

    /// Whether `bytes` starts with the magic signature of this format.
    pub fn matches_signature(self, bytes: &[u8]) -> bool {
        bytes.len() >= MIN_SIGNATURE_LEN && bytes.starts_with(self.magic())
    }

    /// The allow-list as a human readable string, e.g. for error responses.
    pub fn allowed_list() -> String {
        Self::ALL
            .iter()
            .map(|ty| ty.as_mime())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_mime())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unsupported image type: {0:?}")]
pub struct UnsupportedType(pub String);

impl FromStr for ImageType {
    type Err = UnsupportedType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_mime(s).ok_or_else(|| UnsupportedType(s.to_owned()))
    }
}

/// Checks `bytes` against the signature of the claimed MIME type.
///
/// Unknown MIME types never match.
pub fn matches_signature(bytes: &[u8], claimed_mime: &str) -> bool {
    ImageType::from_mime(claimed_mime).is_some_and(|ty| ty.matches_signature(bytes))
}
