//! Asset loading pipeline
//!
//! Paths are fetched through a host-provided [`Fetch`] primitive and decoded
//! by file extension. [`AssetFetcher`] batches queued paths, reports progress
//! as events and resolves every path at most once; failed fetches surface as
//! `None` entries in the resulting [`AssetMap`].

pub mod fetch;
pub mod fetcher;
pub mod image_loader;

pub use fetch::{Fetch, FetchResponse, FileFetch, MemoryFetch};
pub use fetcher::AssetFetcher;
pub use image_loader::ImageData;

use serde_json::Value;
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::rc::Rc;
use thiserror::Error;

/// Asset loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// Nothing exists at the path (status 404)
    #[error("Asset not found: {0}")]
    NotFound(String),

    /// The host answered with a non-success status
    #[error("Fetching '{path}' failed with status {status}")]
    HttpStatus {
        /// Requested path
        path: String,
        /// Response status
        status: u16,
    },

    /// Path escapes the asset root or is otherwise unusable
    #[error("Invalid asset path: {0}")]
    InvalidPath(String),

    /// IO error during asset loading
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image data could not be decoded
    #[error("Failed to decode asset: {0}")]
    Decode(String),

    /// JSON data could not be parsed
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Text data was not valid UTF-8
    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// How an asset is decoded, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// png, jpg, jpeg, gif, bmp, webp
    Image,
    /// mp3, ogg, wav, m4a, flac
    Audio,
    /// mp4, webm, ogv
    Video,
    /// json
    Json,
    /// Anything else
    Text,
}

impl AssetKind {
    /// Kind for a path, from its extension (case-insensitive)
    pub fn from_path(path: &str) -> Self {
        let extension = Path::new(path)
            .extension()
            .and_then(|extension| extension.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" => Self::Image,
            "mp3" | "ogg" | "wav" | "m4a" | "flac" => Self::Audio,
            "mp4" | "webm" | "ogv" => Self::Video,
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Playable handle over encoded video data
///
/// Decoding and presentation belong to the host; the handle tracks playback
/// state for the systems driving it.
pub struct MediaHandle {
    path: String,
    data: Rc<[u8]>,
    playing: Cell<bool>,
    position_ms: Cell<f64>,
}

impl MediaHandle {
    /// Wrap encoded media data
    pub fn new(path: impl Into<String>, data: impl Into<Rc<[u8]>>) -> Self {
        Self {
            path: path.into(),
            data: data.into(),
            playing: Cell::new(false),
            position_ms: Cell::new(0.0),
        }
    }

    /// Source path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Encoded bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Start or resume playback
    pub fn play(&self) {
        self.playing.set(true);
    }

    /// Pause playback, keeping the position
    pub fn pause(&self) {
        self.playing.set(false);
    }

    /// Whether playback is running
    pub fn is_playing(&self) -> bool {
        self.playing.get()
    }

    /// Advance the playback position while playing
    pub fn advance(&self, delta_ms: f64) {
        if self.is_playing() {
            self.position_ms.set(self.position_ms.get() + delta_ms);
        }
    }

    /// Playback position in milliseconds
    pub fn position_ms(&self) -> f64 {
        self.position_ms.get()
    }
}

impl fmt::Debug for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaHandle")
            .field("path", &self.path)
            .field("bytes", &self.data.len())
            .field("playing", &self.is_playing())
            .finish()
    }
}

/// Decoded asset
#[derive(Clone)]
pub enum Asset {
    /// Decoded RGBA8 image
    Image(Rc<ImageData>),
    /// Raw audio bytes
    Audio(Rc<[u8]>),
    /// Video playback handle
    Video(Rc<MediaHandle>),
    /// Parsed JSON document
    Json(Rc<Value>),
    /// UTF-8 text
    Text(Rc<str>),
}

impl Asset {
    /// Decode a fetched body according to the path's [`AssetKind`]
    pub fn decode(path: &str, body: Vec<u8>) -> Result<Self, AssetError> {
        let asset = match AssetKind::from_path(path) {
            AssetKind::Image => Self::Image(Rc::new(ImageData::from_bytes(&body)?)),
            AssetKind::Audio => Self::Audio(Rc::from(body)),
            AssetKind::Video => Self::Video(Rc::new(MediaHandle::new(path, body))),
            AssetKind::Json => Self::Json(Rc::new(serde_json::from_slice(&body)?)),
            AssetKind::Text => Self::Text(Rc::from(String::from_utf8(body)?)),
        };
        Ok(asset)
    }

    /// Kind of the decoded asset
    pub fn kind(&self) -> AssetKind {
        match self {
            Self::Image(_) => AssetKind::Image,
            Self::Audio(_) => AssetKind::Audio,
            Self::Video(_) => AssetKind::Video,
            Self::Json(_) => AssetKind::Json,
            Self::Text(_) => AssetKind::Text,
        }
    }

    /// Image data, for image assets
    pub fn as_image(&self) -> Option<&ImageData> {
        match self {
            Self::Image(image) => Some(image),
            _ => None,
        }
    }

    /// Raw bytes, for audio assets
    pub fn as_audio(&self) -> Option<&[u8]> {
        match self {
            Self::Audio(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Playback handle, for video assets
    pub fn as_video(&self) -> Option<&MediaHandle> {
        match self {
            Self::Video(media) => Some(media),
            _ => None,
        }
    }

    /// Parsed document, for JSON assets
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Text, for text assets
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image(image) => write!(
                f,
                "Image({}x{}, {} bytes)",
                image.width,
                image.height,
                image.size_bytes()
            ),
            Self::Audio(bytes) => write!(f, "Audio({} bytes)", bytes.len()),
            Self::Video(media) => write!(f, "Video({})", media.path()),
            Self::Json(value) => write!(f, "Json({value})"),
            Self::Text(text) => write!(f, "Text({} chars)", text.chars().count()),
        }
    }
}

/// Resolved assets by path; cloning shares the same map
///
/// A path that failed to fetch or decode is present with no asset.
#[derive(Clone, Default)]
pub struct AssetMap {
    assets: Rc<HashMap<String, Option<Asset>>>,
}

impl AssetMap {
    /// Asset for a path, `None` if it failed or was never requested
    pub fn get(&self, path: &str) -> Option<&Asset> {
        self.assets.get(path).and_then(Option::as_ref)
    }

    /// Whether the path was requested, successfully or not
    pub fn contains(&self, path: &str) -> bool {
        self.assets.contains_key(path)
    }

    /// Requested paths that produced no asset
    pub fn failed(&self) -> Vec<&str> {
        self.assets
            .iter()
            .filter(|(_, asset)| asset.is_none())
            .map(|(path, _)| path.as_str())
            .collect()
    }

    /// Every requested path with its result
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Asset>)> {
        self.assets
            .iter()
            .map(|(path, asset)| (path.as_str(), asset.as_ref()))
    }

    /// Number of requested paths
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Whether nothing was requested
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

impl FromIterator<(String, Option<Asset>)> for AssetMap {
    fn from_iter<I: IntoIterator<Item = (String, Option<Asset>)>>(iter: I) -> Self {
        Self {
            assets: Rc::new(iter.into_iter().collect()),
        }
    }
}

impl fmt::Debug for AssetMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.assets.iter()).finish()
    }
}
