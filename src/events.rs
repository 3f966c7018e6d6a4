use std::fmt;

use crate::error::ErrorInfo;

/// Notifications for the playback layer, queued in the order of the
/// transitions that caused them.
#[derive(Debug, Clone, PartialEq)]
pub enum LoaderEvent {
    /// The active rendition is about to change.
    MediaChanging { from: String, to: String },
    /// The active rendition changed and is loaded.
    MediaChange { uri: String },
    /// The first media playlist was loaded.
    LoadedMetadata { uri: String },
    /// A playlist request failed; the loader reverted to its previous state.
    Error(ErrorInfo),
}

impl fmt::Display for LoaderEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LoaderEvent::MediaChanging { from, to } => write!(f, "media-changing {} -> {}", from, to),
            LoaderEvent::MediaChange { uri } => write!(f, "media-change {}", uri),
            LoaderEvent::LoadedMetadata { uri } => write!(f, "loaded-metadata {}", uri),
            LoaderEvent::Error(info) => write!(f, "error ({}) {}", info.severity, info.message),
        }
    }
}
