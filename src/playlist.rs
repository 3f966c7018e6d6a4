//! Contains the playlist model shared by the parser, the reconciler and the loader.
//!
//! The main types here are [`MasterPlaylist`], which owns every rendition as a
//! [`MediaPlaylist`], and [`Manifest`], which is what a parser hands back for
//! one fetched document.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Utc};

use crate::attributes::KeyMethod;
use crate::error::{ProtocolError, UsageError};
use crate::resolve::resolve_url;

/// One parsed manifest document.
///
/// A Playlist is a Media Playlist if all URI lines in the Playlist
/// identify Media Segments.  A Playlist is a Master Playlist if all URI
/// lines in the Playlist identify Media Playlists.
#[derive(Debug, Clone, PartialEq)]
pub enum Manifest {
    Master(MasterPlaylist),
    Media(MediaPlaylist),
}

/// Turns a fetched playlist body into a [`Manifest`].
///
/// `uri` is the URI the body was fetched from, for error reporting.
pub trait ManifestParser {
    fn parse(&self, uri: &str, body: &[u8]) -> Result<Manifest, ProtocolError>;
}

// -----------------------------------------------------------------------------------------------
// Master Playlist
// -----------------------------------------------------------------------------------------------

/// A [Master Playlist](https://tools.ietf.org/html/rfc8216#section-4.3.4)
/// provides a set of renditions, each of which describes a different
/// version of the same content.
///
/// Renditions are stored once, in order. The URI lookup maps to positions in
/// that same list, so a record reached by URI and by index is the same record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MasterPlaylist {
    pub uri: String,
    pub resolved_uri: String,
    pub version: Option<usize>,
    /// `#EXT-X-INDEPENDENT-SEGMENTS`
    pub independent_segments: bool,
    /// `#EXT-X-MEDIA` tags: kind → group id → name → track.
    pub media_groups: BTreeMap<TrackKind, BTreeMap<String, BTreeMap<String, AlternateTrack>>>,
    playlists: Vec<MediaPlaylist>,
    by_uri: HashMap<String, usize>,
}

impl MasterPlaylist {
    pub fn new(uri: impl Into<String>) -> MasterPlaylist {
        let uri = uri.into();
        MasterPlaylist {
            resolved_uri: uri.clone(),
            uri,
            ..Default::default()
        }
    }

    /// Appends a rendition and registers it by URI.
    ///
    /// When the URI is already registered the first registration is kept; the
    /// new entry is still reachable by index.
    pub fn push_playlist(&mut self, playlist: MediaPlaylist) -> usize {
        let index = self.playlists.len();
        self.by_uri.entry(playlist.uri.clone()).or_insert(index);
        self.playlists.push(playlist);
        index
    }

    pub fn playlists(&self) -> &[MediaPlaylist] {
        &self.playlists
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MediaPlaylist> {
        self.playlists.iter()
    }

    pub fn len(&self) -> usize {
        self.playlists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.playlists.is_empty()
    }

    pub fn position(&self, uri: &str) -> Option<usize> {
        self.by_uri.get(uri).copied()
    }

    pub fn playlist(&self, uri: &str) -> Option<&MediaPlaylist> {
        self.position(uri).map(|i| &self.playlists[i])
    }

    pub fn playlist_mut(&mut self, uri: &str) -> Option<&mut MediaPlaylist> {
        let index = self.position(uri)?;
        self.playlists.get_mut(index)
    }

    pub fn playlist_at(&self, index: usize) -> Option<&MediaPlaylist> {
        self.playlists.get(index)
    }

    pub fn playlist_at_mut(&mut self, index: usize) -> Option<&mut MediaPlaylist> {
        self.playlists.get_mut(index)
    }

    pub fn add_alternate_track(&mut self, track: AlternateTrack) {
        self.media_groups
            .entry(track.kind)
            .or_default()
            .entry(track.group_id.clone())
            .or_default()
            .insert(track.name.clone(), track);
    }

    pub fn alternate_tracks(&self, kind: TrackKind) -> impl Iterator<Item = &AlternateTrack> {
        self.media_groups
            .get(&kind)
            .into_iter()
            .flat_map(|groups| groups.values())
            .flat_map(|tracks| tracks.values())
    }

    /// Resolves every rendition and alternate-track URI against the master's
    /// own resolved URI. Already resolved URIs are left alone.
    pub fn resolve_uris(&mut self) {
        let base = self.resolved_uri.clone();
        for playlist in &mut self.playlists {
            if playlist.resolved_uri.is_none() {
                playlist.resolved_uri = Some(resolve_url(&base, &playlist.uri));
            }
        }
        for track in self
            .media_groups
            .values_mut()
            .flat_map(|groups| groups.values_mut())
            .flat_map(|tracks| tracks.values_mut())
        {
            if let (Some(uri), None) = (&track.uri, &track.resolved_uri) {
                track.resolved_uri = Some(resolve_url(&base, uri));
            }
        }
    }

    /// Marks a rendition ineligible until `until`.
    pub fn exclude(&mut self, uri: &str, until: DateTime<Utc>) -> Result<(), UsageError> {
        let playlist = self
            .playlist_mut(uri)
            .ok_or_else(|| UsageError::UnknownPlaylist {
                uri: uri.to_string(),
            })?;
        playlist.exclude_until = Some(until);
        Ok(())
    }
}

/// Selection metadata from `#EXT-X-STREAM-INF:<attribute-list>`
/// ([section 4.3.4.2](https://tools.ietf.org/html/rfc8216#section-4.3.4.2)).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantAttributes {
    pub bandwidth: Option<u64>,
    pub average_bandwidth: Option<u64>,
    pub codecs: Option<String>,
    pub resolution: Option<Resolution>,
    pub frame_rate: Option<f64>,
    pub audio: Option<String>,
    pub video: Option<String>,
    pub subtitles: Option<String>,
    pub closed_captions: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u64,
    pub height: u64,
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Resolution, String> {
        let (width, height) = s
            .split_once('x')
            .ok_or_else(|| format!("Unable to create Resolution from {:?}", s))?;
        Ok(Resolution {
            width: width.parse().map_err(|_| format!("bad width in {:?}", s))?,
            height: height.parse().map_err(|_| format!("bad height in {:?}", s))?,
        })
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// [`#EXT-X-MEDIA:<attribute-list>`](https://tools.ietf.org/html/rfc8216#section-4.3.4.1)
///
/// An alternative rendition of the same content, e.g. an audio track in
/// another language.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlternateTrack {
    pub kind: TrackKind,
    pub group_id: String,
    pub name: String,
    pub language: Option<String>,
    pub assoc_language: Option<String>,
    pub default: bool,
    pub autoselect: bool,
    pub forced: bool,
    pub instream_id: Option<String>,
    pub characteristics: Option<String>,
    pub uri: Option<String>,
    pub resolved_uri: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum TrackKind {
    #[default]
    Audio,
    Video,
    Subtitles,
    ClosedCaptions,
}

impl FromStr for TrackKind {
    type Err = String;

    fn from_str(s: &str) -> Result<TrackKind, String> {
        match s {
            "AUDIO" => Ok(TrackKind::Audio),
            "VIDEO" => Ok(TrackKind::Video),
            "SUBTITLES" => Ok(TrackKind::Subtitles),
            "CLOSED-CAPTIONS" => Ok(TrackKind::ClosedCaptions),
            _ => Err(format!("Unable to create TrackKind from {:?}", s)),
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "AUDIO"),
            TrackKind::Video => write!(f, "VIDEO"),
            TrackKind::Subtitles => write!(f, "SUBTITLES"),
            TrackKind::ClosedCaptions => write!(f, "CLOSED-CAPTIONS"),
        }
    }
}

// -----------------------------------------------------------------------------------------------
// Media Playlist
// -----------------------------------------------------------------------------------------------

/// A [Media Playlist](https://tools.ietf.org/html/rfc8216#section-4.3.3)
/// contains a list of Media Segments, which when played sequentially will
/// play the multimedia presentation.
///
/// The same type describes a rendition inside a master playlist. Such an
/// entry starts out as a stub (URI and attributes only) and acquires its
/// segments once its own manifest has been fetched and merged in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaPlaylist {
    pub uri: String,
    pub resolved_uri: Option<String>,
    pub attributes: VariantAttributes,
    /// The rendition is ineligible for selection until this instant.
    pub exclude_until: Option<DateTime<Utc>>,
    /// `#EXT-X-ENDLIST`
    pub end_list: bool,
    /// `#EXT-X-TARGETDURATION:<s>`
    pub target_duration: Option<f64>,
    /// `#EXT-X-MEDIA-SEQUENCE:<number>`
    pub media_sequence: u64,
    /// `#EXT-X-DISCONTINUITY-SEQUENCE:<number>`
    pub discontinuity_sequence: u64,
    /// `#EXT-X-PLAYLIST-TYPE`
    pub playlist_type: Option<MediaPlaylistType>,
    pub version: Option<usize>,
    pub segments: Vec<Segment>,
}

impl MediaPlaylist {
    pub fn new(uri: impl Into<String>) -> MediaPlaylist {
        MediaPlaylist {
            uri: uri.into(),
            ..Default::default()
        }
    }

    pub fn is_live(&self) -> bool {
        !self.end_list
    }

    pub fn target_duration_or(&self, default: f64) -> f64 {
        self.target_duration.filter(|d| *d > 0.0).unwrap_or(default)
    }

    pub fn total_duration(&self) -> f64 {
        self.segments.iter().map(|s| s.duration).sum()
    }

    /// The URI relative segment URIs are resolved against.
    pub fn base_uri(&self) -> &str {
        self.resolved_uri.as_deref().unwrap_or(&self.uri)
    }
}

/// [`#EXT-X-PLAYLIST-TYPE:<EVENT|VOD>`](https://tools.ietf.org/html/rfc8216#section-4.3.3.5)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaPlaylistType {
    Event,
    Vod,
}

impl FromStr for MediaPlaylistType {
    type Err = String;

    fn from_str(s: &str) -> Result<MediaPlaylistType, String> {
        match s {
            "EVENT" => Ok(MediaPlaylistType::Event),
            "VOD" => Ok(MediaPlaylistType::Vod),
            _ => Err(format!("Unable to create MediaPlaylistType from {:?}", s)),
        }
    }
}

// -----------------------------------------------------------------------------------------------
// Media Segment
// -----------------------------------------------------------------------------------------------

/// A [Media Segment](https://tools.ietf.org/html/rfc8216#section-3).
///
/// `start` and `end` are precise media times established downstream (by the
/// demuxer). They are taken as given and never computed here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Segment {
    pub uri: String,
    pub resolved_uri: Option<String>,
    /// `#EXTINF:<duration>,[<title>]`
    pub duration: f64,
    pub title: Option<String>,
    /// `#EXT-X-BYTERANGE:<n>[@<o>]`
    pub byte_range: Option<ByteRange>,
    /// `#EXT-X-DISCONTINUITY`
    pub discontinuity: bool,
    /// `#EXT-X-KEY:<attribute-list>`
    pub key: Option<SegmentKey>,
    /// `#EXT-X-MAP:<attribute-list>`
    pub map: Option<SegmentMap>,
    /// `#EXT-X-PROGRAM-DATE-TIME:<date-time-msec>`
    pub program_date_time: Option<DateTime<FixedOffset>>,
    pub start: Option<f64>,
    pub end: Option<f64>,
}

impl Segment {
    pub fn new(uri: impl Into<String>, duration: f64) -> Segment {
        Segment {
            uri: uri.into(),
            duration,
            ..Default::default()
        }
    }
}

/// [`#EXT-X-KEY:<attribute-list>`](https://tools.ietf.org/html/rfc8216#section-4.3.2.4)
///
/// Media Segments MAY be encrypted. The key applies to every segment between
/// it and the next `EXT-X-KEY` tag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentKey {
    pub method: KeyMethod,
    pub uri: Option<String>,
    pub resolved_uri: Option<String>,
    pub iv: Option<String>,
    pub keyformat: Option<String>,
    pub keyformatversions: Option<String>,
}

/// [`#EXT-X-MAP:<attribute-list>`](https://tools.ietf.org/html/rfc8216#section-4.3.2.5)
///
/// Where to obtain the Media Initialization Section required to parse the
/// segments that follow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentMap {
    pub uri: String,
    pub resolved_uri: Option<String>,
    pub byte_range: Option<ByteRange>,
}

/// [`#EXT-X-BYTERANGE:<n>[@<o>]`](https://tools.ietf.org/html/rfc8216#section-4.3.2.2)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteRange {
    pub length: u64,
    pub offset: Option<u64>,
}

// -----------------------------------------------------------------------------------------------
// Display
// -----------------------------------------------------------------------------------------------

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Manifest::Master(p) => write!(f, "{}", p),
            Manifest::Media(p) => write!(f, "{}", p),
        }
    }
}

impl fmt::Display for MasterPlaylist {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "[Master Playlist {:?} | {} renditions | {} media groups]",
            self.uri,
            self.playlists.len(),
            self.media_groups.len()
        )?;
        for (i, playlist) in self.playlists.iter().enumerate() {
            write!(f, " {} -> [Rendition | uri: {:?}", i + 1, playlist.uri)?;
            if let Some(bandwidth) = playlist.attributes.bandwidth {
                write!(f, " ~ bandwidth: {}", bandwidth)?;
            }
            if let Some(resolution) = &playlist.attributes.resolution {
                write!(f, " ~ res: {}", resolution)?;
            }
            if let Some(until) = &playlist.exclude_until {
                write!(f, " ~ excluded until: {}", until)?;
            }
            writeln!(f, "]")?;
        }
        Ok(())
    }
}

impl fmt::Display for MediaPlaylist {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[Media Playlist {:?} | target: {:?} ~ seq: {} ~ segments: {}",
            self.uri,
            self.target_duration,
            self.media_sequence,
            self.segments.len(),
        )?;
        if self.end_list {
            write!(f, " [endlist]")?;
        }
        writeln!(f, "]")?;

        for (i, segment) in self.segments.iter().enumerate() {
            write!(f, " {} -> {}", i + 1, segment)?;
        }
        Ok(())
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[Segment | duration: {:?}", self.duration)?;
        if let Some(v) = &self.byte_range {
            write!(f, " ~ byterange: {:?}", v)?;
        }
        if self.discontinuity {
            write!(f, " [discontinuity]")?;
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            write!(f, " ~ timing: {}..{}", start, end)?;
        }
        writeln!(f, " ~ uri: {:?}]", self.uri)
    }
}
