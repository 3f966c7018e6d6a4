//! A live HLS playlist loader (HTTP Live Streaming) [link]
//! (https://tools.ietf.org/html/rfc8216).
//!
//! The loader fetches a master playlist, loads the selected media playlist,
//! keeps a live media playlist fresh by polling it, merges every snapshot
//! into the previous one and switches between renditions.
//!
//! [`PlaylistLoader`] does no I/O itself. It drives an [`HttpClient`], a
//! [`RefreshScheduler`] and a [`ManifestParser`], and reports what happened
//! through [`LoaderEvent`]s. The `parser` feature (on by default) provides
//! [`M3u8Parser`]; the `runtime` feature wires everything to tokio and
//! reqwest.
//!
//! # Examples
//!
//! Parsing a playlist and let the parser figure out if it's a media or master playlist.
//!
//! ```
//! use m3u8_loader::{parse_playlist_res, Manifest};
//!
//! let bytes = b"#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=150000\nlow/index.m3u8\n";
//!
//! match parse_playlist_res(bytes) {
//!     Ok(Manifest::Master(pl)) => println!("Master playlist:\n{}", pl),
//!     Ok(Manifest::Media(pl)) => println!("Media playlist:\n{}", pl),
//!     Err(e) => panic!("Parsing error: \n{}", e),
//! }
//! ```
//!
//! Driving the loader by hand
//!
//! ```
//! use std::time::Duration;
//! use m3u8_loader::{
//!     FetchRequest, FetchResponse, HttpClient, LoaderConfig, LoaderState, M3u8Parser,
//!     PlaylistLoader, RefreshScheduler, RequestId, TimerId,
//! };
//!
//! #[derive(Default)]
//! struct Requests(Vec<FetchRequest>);
//!
//! impl HttpClient for Requests {
//!     fn fetch(&mut self, request: FetchRequest) {
//!         self.0.push(request);
//!     }
//!     fn abort(&mut self, _id: RequestId) {}
//! }
//!
//! struct NoTimers;
//!
//! impl RefreshScheduler for NoTimers {
//!     fn schedule(&mut self, _id: TimerId, _delay: Duration) {}
//!     fn cancel(&mut self, _id: TimerId) {}
//! }
//!
//! let mut loader = PlaylistLoader::new(
//!     "http://example.com/vod.m3u8",
//!     Requests::default(),
//!     NoTimers,
//!     M3u8Parser,
//!     LoaderConfig::default(),
//! );
//! loader.start().unwrap();
//!
//! let body = "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:10,\n0.ts\n#EXT-X-ENDLIST\n";
//! loader.handle_response(RequestId(0), Ok(FetchResponse::ok(body)));
//!
//! assert_eq!(loader.state(), LoaderState::HaveMetadata);
//! assert_eq!(loader.media().unwrap().segments.len(), 1);
//! ```

pub mod attributes;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod live;
pub mod loader;
#[cfg(feature = "parser")]
pub mod parser;
pub mod playlist;
pub mod reconcile;
pub mod resolve;
#[cfg(feature = "runtime")]
pub mod runtime;
pub mod selector;

pub use config::LoaderConfig;
#[cfg(feature = "runtime")]
pub use config::RuntimeConfig;
pub use error::{Error, ErrorInfo, ProtocolError, Result, Severity, TransportError, UsageError};
pub use events::LoaderEvent;
pub use http::{
    FetchError, FetchRequest, FetchResponse, FetchResult, HttpClient, RefreshScheduler, RequestId,
    TimerId,
};
pub use loader::{LoaderState, PlaylistLoader};
#[cfg(feature = "parser")]
pub use parser::{
    is_master_playlist, parse_master_playlist_res, parse_media_playlist_res, parse_playlist,
    parse_playlist_res, M3u8Parser,
};
pub use playlist::{Manifest, ManifestParser, MasterPlaylist, MediaPlaylist, Segment};
pub use resolve::resolve_url;
