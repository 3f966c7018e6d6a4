use nom::branch::alt;
use nom::bytes::complete::{is_not, tag, take_till, take_while1};
use nom::character::complete::{char, line_ending, multispace0, space0, u64 as decimal};
use nom::combinator::{eof, map, map_res, opt, rest};
use nom::multi::{fold_many0, many0};
use nom::number::complete::double;
use nom::sequence::{delimited, pair, preceded, separated_pair, terminated, tuple};
use nom::IResult;

use chrono::{DateTime, FixedOffset};
use std::collections::HashMap;
use std::str;
use std::string;

use crate::attributes::{KeyMethod, QuotedOrUnquoted};
use crate::error::ProtocolError;
use crate::playlist::*;

/// Parse an m3u8 playlist, letting the parser figure out whether it is a
/// master or a media playlist.
///
/// # Examples
///
/// ```
/// use m3u8_loader::{parse_playlist, Manifest};
///
/// let input = b"#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXTINF:6,\nseg0.ts\n";
/// match parse_playlist(input) {
///     Ok((_, Manifest::Media(pl))) => assert_eq!(pl.segments.len(), 1),
///     Ok((_, Manifest::Master(_))) => panic!("expected a media playlist"),
///     Err(e) => panic!("Parsing error: \n{}", e),
/// }
/// ```
pub fn parse_playlist(input: &[u8]) -> IResult<&[u8], Manifest> {
    let (rest, lines) = manifest_lines(input)?;
    let manifest = match classify(&lines) {
        Some(true) => Manifest::Master(master_playlist_from_lines(&lines)),
        _ => Manifest::Media(media_playlist_from_lines(&lines)),
    };
    Ok((rest, manifest))
}

/// Parses an m3u8 playlist just like `parse_playlist`, dropping the remaining input.
pub fn parse_playlist_res(input: &[u8]) -> Result<Manifest, nom::Err<nom::error::Error<&[u8]>>> {
    parse_playlist(input).map(|(_, manifest)| manifest)
}

/// Parse input as a master playlist
pub fn parse_master_playlist_res(
    input: &[u8],
) -> Result<MasterPlaylist, nom::Err<nom::error::Error<&[u8]>>> {
    manifest_lines(input).map(|(_, lines)| master_playlist_from_lines(&lines))
}

/// Parse input as a media playlist
pub fn parse_media_playlist_res(
    input: &[u8],
) -> Result<MediaPlaylist, nom::Err<nom::error::Error<&[u8]>>> {
    manifest_lines(input).map(|(_, lines)| media_playlist_from_lines(&lines))
}

/// When a media tag or no master tag is found first, this returns false.
pub fn is_master_playlist(input: &[u8]) -> bool {
    manifest_lines(input)
        .ok()
        .and_then(|(_, lines)| classify(&lines))
        .unwrap_or(false)
}

/// The default [`ManifestParser`] collaborator.
#[derive(Debug, Clone, Copy, Default)]
pub struct M3u8Parser;

impl ManifestParser for M3u8Parser {
    fn parse(&self, uri: &str, body: &[u8]) -> Result<Manifest, ProtocolError> {
        let mut manifest = parse_playlist_res(body).map_err(|e| ProtocolError::new(uri, describe(e)))?;
        match &mut manifest {
            Manifest::Master(master) => {
                master.uri = uri.to_string();
                master.resolved_uri = uri.to_string();
            }
            Manifest::Media(media) => media.uri = uri.to_string(),
        }
        Ok(manifest)
    }
}

fn describe(err: nom::Err<nom::error::Error<&[u8]>>) -> String {
    match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let near = &e.input[..e.input.len().min(32)];
            format!("{:?} near {:?}", e.code, String::from_utf8_lossy(near))
        }
        nom::Err::Incomplete(_) => "incomplete manifest".to_string(),
    }
}

// -----------------------------------------------------------------------------------------------
// Lines
// -----------------------------------------------------------------------------------------------

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Splits a manifest into its non-empty lines, after the mandatory `#EXTM3U`.
fn manifest_lines(i: &[u8]) -> IResult<&[u8], Vec<&[u8]>> {
    preceded(
        pair(opt(tag(BOM)), m3u_tag),
        many0(map(
            preceded(multispace0, terminated(is_not("\r\n"), opt(line_ending))),
            trim_end,
        )),
    )(i)
}

fn m3u_tag(i: &[u8]) -> IResult<&[u8], ()> {
    map(tag("#EXTM3U"), |_| ())(i)
}

fn trim_end(line: &[u8]) -> &[u8] {
    let len = line
        .iter()
        .rposition(|c| !c.is_ascii_whitespace())
        .map_or(0, |p| p + 1);
    &line[..len]
}

/// `Some(true)` if the first classifying tag is a master tag, `Some(false)`
/// if it is a media tag, `None` if there is none.
fn classify(lines: &[&[u8]]) -> Option<bool> {
    lines
        .iter()
        .find_map(|line| playlist_kind_tag(line).ok().map(|(_, is_master)| is_master))
}

fn playlist_kind_tag(i: &[u8]) -> IResult<&[u8], bool> {
    alt((
        // Media tags go first so that #EXT-X-MEDIA-SEQUENCE is not taken for #EXT-X-MEDIA.
        map(
            alt((
                tag("#EXT-X-TARGETDURATION"),
                tag("#EXT-X-MEDIA-SEQUENCE"),
                tag("#EXT-X-DISCONTINUITY-SEQUENCE"),
                tag("#EXT-X-ENDLIST"),
                tag("#EXT-X-PLAYLIST-TYPE"),
                tag("#EXT-X-I-FRAMES-ONLY"),
                tag("#EXTINF"),
                tag("#EXT-X-BYTERANGE"),
                tag("#EXT-X-DISCONTINUITY"),
                tag("#EXT-X-KEY"),
                tag("#EXT-X-MAP"),
                tag("#EXT-X-PROGRAM-DATE-TIME"),
                tag("#EXT-X-DATERANGE"),
            )),
            |_| false,
        ),
        map(
            alt((
                tag("#EXT-X-STREAM-INF"),
                tag("#EXT-X-I-FRAME-STREAM-INF"),
                tag("#EXT-X-MEDIA"),
                tag("#EXT-X-SESSION-KEY"),
                tag("#EXT-X-SESSION-DATA"),
            )),
            |_| true,
        ),
    ))(i)
}

// -----------------------------------------------------------------------------------------------
// Master Playlist
// -----------------------------------------------------------------------------------------------

#[derive(Debug)]
enum MasterTag {
    Version(usize),
    Variant(VariantAttributes),
    AlternateTrack(AlternateTrack),
    IndependentSegments,
    Uri(String),
    Ignored,
}

fn master_tag(line: &[u8]) -> MasterTag {
    let parsed: IResult<&[u8], MasterTag> = alt((
        map(version_tag, MasterTag::Version),
        map(
            preceded(tag("#EXT-X-STREAM-INF:"), attribute_list),
            |attrs| MasterTag::Variant(variant_attributes(attrs)),
        ),
        map_res(
            preceded(tag("#EXT-X-MEDIA:"), attribute_list),
            |attrs| alternate_track(attrs).map(MasterTag::AlternateTrack),
        ),
        map(terminated(tag("#EXT-X-INDEPENDENT-SEGMENTS"), eof), |_| {
            MasterTag::IndependentSegments
        }),
        // I-frame variants, session data and unknown tags
        map(preceded(char('#'), rest), |_| MasterTag::Ignored),
        map_res(rest, |uri: &[u8]| from_utf8_slice(uri).map(MasterTag::Uri)),
    ))(line);

    parsed.map(|(_, tag)| tag).unwrap_or(MasterTag::Ignored)
}

fn master_playlist_from_lines(lines: &[&[u8]]) -> MasterPlaylist {
    let mut master = MasterPlaylist::default();
    let mut pending_variant: Option<VariantAttributes> = None;

    for line in lines {
        match master_tag(line) {
            MasterTag::Version(v) => master.version = Some(v),
            MasterTag::Variant(attributes) => pending_variant = Some(attributes),
            MasterTag::AlternateTrack(track) => master.add_alternate_track(track),
            MasterTag::IndependentSegments => master.independent_segments = true,
            MasterTag::Uri(uri) => {
                if let Some(attributes) = pending_variant.take() {
                    master.push_playlist(MediaPlaylist {
                        uri,
                        attributes,
                        ..Default::default()
                    });
                }
            }
            MasterTag::Ignored => (),
        }
    }

    master
}

fn variant_attributes(mut attrs: HashMap<String, QuotedOrUnquoted>) -> VariantAttributes {
    VariantAttributes {
        bandwidth: attrs.remove("BANDWIDTH").and_then(|v| v.parse_u64()),
        average_bandwidth: attrs.remove("AVERAGE-BANDWIDTH").and_then(|v| v.parse_u64()),
        codecs: attrs.remove("CODECS").map(QuotedOrUnquoted::into_string),
        resolution: attrs
            .remove("RESOLUTION")
            .and_then(|v| v.as_str().parse().ok()),
        frame_rate: attrs
            .remove("FRAME-RATE")
            .and_then(|v| v.as_str().parse().ok()),
        audio: attrs.remove("AUDIO").map(QuotedOrUnquoted::into_string),
        video: attrs.remove("VIDEO").map(QuotedOrUnquoted::into_string),
        subtitles: attrs.remove("SUBTITLES").map(QuotedOrUnquoted::into_string),
        closed_captions: attrs
            .remove("CLOSED-CAPTIONS")
            .map(QuotedOrUnquoted::into_string),
    }
}

fn alternate_track(mut attrs: HashMap<String, QuotedOrUnquoted>) -> Result<AlternateTrack, String> {
    let kind = attrs
        .remove("TYPE")
        .ok_or("EXT-X-MEDIA without TYPE")?
        .as_str()
        .parse()?;
    let group_id = attrs
        .remove("GROUP-ID")
        .ok_or("EXT-X-MEDIA without GROUP-ID")?
        .into_string();
    let name = attrs
        .remove("NAME")
        .ok_or("EXT-X-MEDIA without NAME")?
        .into_string();
    let flag = |v: Option<QuotedOrUnquoted>| v.map_or(false, |v| v.is_yes());

    Ok(AlternateTrack {
        kind,
        group_id,
        name,
        language: attrs.remove("LANGUAGE").map(QuotedOrUnquoted::into_string),
        assoc_language: attrs
            .remove("ASSOC-LANGUAGE")
            .map(QuotedOrUnquoted::into_string),
        default: flag(attrs.remove("DEFAULT")),
        autoselect: flag(attrs.remove("AUTOSELECT")),
        forced: flag(attrs.remove("FORCED")),
        instream_id: attrs.remove("INSTREAM-ID").map(QuotedOrUnquoted::into_string),
        characteristics: attrs
            .remove("CHARACTERISTICS")
            .map(QuotedOrUnquoted::into_string),
        uri: attrs.remove("URI").map(QuotedOrUnquoted::into_string),
        resolved_uri: None,
    })
}

// -----------------------------------------------------------------------------------------------
// Media Playlist
// -----------------------------------------------------------------------------------------------

#[derive(Debug)]
enum MediaTag {
    Version(usize),
    TargetDuration(f64),
    MediaSequence(u64),
    DiscontinuitySequence(u64),
    PlaylistType(MediaPlaylistType),
    EndList,
    Segment(SegmentTag),
    Ignored,
}

/// All media segment tags we act on.
#[derive(Debug)]
enum SegmentTag {
    Extinf(f64, Option<String>),
    ByteRange(ByteRange),
    Discontinuity,
    /// `None` for `METHOD=NONE`, which ends encryption.
    Key(Option<SegmentKey>),
    Map(SegmentMap),
    ProgramDateTime(DateTime<FixedOffset>),
    Uri(String),
}

fn media_tag(line: &[u8]) -> MediaTag {
    let parsed: IResult<&[u8], MediaTag> = alt((
        map(version_tag, MediaTag::Version),
        map(preceded(tag("#EXT-X-TARGETDURATION:"), double), MediaTag::TargetDuration),
        map(preceded(tag("#EXT-X-MEDIA-SEQUENCE:"), decimal), MediaTag::MediaSequence),
        map(
            preceded(tag("#EXT-X-DISCONTINUITY-SEQUENCE:"), decimal),
            MediaTag::DiscontinuitySequence,
        ),
        map(preceded(tag("#EXT-X-PLAYLIST-TYPE:"), playlist_type), MediaTag::PlaylistType),
        map(terminated(tag("#EXT-X-ENDLIST"), eof), |_| MediaTag::EndList),
        map(media_segment_tag, MediaTag::Segment),
        map(preceded(char('#'), rest), |_| MediaTag::Ignored),
    ))(line);

    parsed.map(|(_, tag)| tag).unwrap_or(MediaTag::Ignored)
}

fn media_segment_tag(i: &[u8]) -> IResult<&[u8], SegmentTag> {
    alt((
        map(preceded(tag("#EXTINF:"), duration_title_tag), |(duration, title)| {
            SegmentTag::Extinf(duration, title)
        }),
        map(preceded(tag("#EXT-X-BYTERANGE:"), byte_range_val), SegmentTag::ByteRange),
        map(terminated(tag("#EXT-X-DISCONTINUITY"), eof), |_| SegmentTag::Discontinuity),
        map(preceded(tag("#EXT-X-KEY:"), key), SegmentTag::Key),
        map(preceded(tag("#EXT-X-MAP:"), extmap), SegmentTag::Map),
        map(
            preceded(tag("#EXT-X-PROGRAM-DATE-TIME:"), program_date_time),
            SegmentTag::ProgramDateTime,
        ),
        map_res(
            preceded(nom::combinator::not(char('#')), rest),
            |uri: &[u8]| from_utf8_slice(uri).map(SegmentTag::Uri),
        ),
    ))(i)
}

fn media_playlist_from_lines(lines: &[&[u8]]) -> MediaPlaylist {
    let mut media_playlist = MediaPlaylist::default();
    let mut next_segment = Segment::default();
    let mut encryption_key: Option<SegmentKey> = None;
    let mut map: Option<SegmentMap> = None;

    for line in lines {
        match media_tag(line) {
            MediaTag::Version(v) => media_playlist.version = Some(v),
            MediaTag::TargetDuration(d) => media_playlist.target_duration = Some(d),
            MediaTag::MediaSequence(n) => media_playlist.media_sequence = n,
            MediaTag::DiscontinuitySequence(n) => media_playlist.discontinuity_sequence = n,
            MediaTag::PlaylistType(t) => media_playlist.playlist_type = Some(t),
            MediaTag::EndList => media_playlist.end_list = true,
            MediaTag::Segment(segment_tag) => match segment_tag {
                SegmentTag::Extinf(d, t) => {
                    next_segment.duration = d;
                    next_segment.title = t;
                }
                SegmentTag::ByteRange(b) => next_segment.byte_range = Some(b),
                SegmentTag::Discontinuity => next_segment.discontinuity = true,
                SegmentTag::Key(k) => encryption_key = k,
                SegmentTag::Map(m) => map = Some(m),
                SegmentTag::ProgramDateTime(d) => next_segment.program_date_time = Some(d),
                SegmentTag::Uri(u) => {
                    next_segment.uri = u;
                    next_segment.key = encryption_key.clone();
                    next_segment.map = map.clone();
                    media_playlist
                        .segments
                        .push(std::mem::take(&mut next_segment));
                }
            },
            MediaTag::Ignored => (),
        }
    }

    media_playlist
}

fn playlist_type(i: &[u8]) -> IResult<&[u8], MediaPlaylistType> {
    map_res(rest, |typ: &[u8]| {
        str::from_utf8(typ)
            .map_err(|e| e.to_string())
            .and_then(|typ| typ.trim().parse::<MediaPlaylistType>())
    })(i)
}

fn duration_title_tag(i: &[u8]) -> IResult<&[u8], (f64, Option<String>)> {
    map(
        pair(double, opt(preceded(char(','), rest))),
        |(duration, title): (f64, Option<&[u8]>)| {
            let title = title
                .map(|t| String::from_utf8_lossy(t).trim().to_string())
                .filter(|t| !t.is_empty());
            (duration, title)
        },
    )(i)
}

fn key(i: &[u8]) -> IResult<&[u8], Option<SegmentKey>> {
    map_res(attribute_list, |mut attrs| -> Result<Option<SegmentKey>, &str> {
        let method: KeyMethod = attrs.remove("METHOD").ok_or("METHOD is missing")?.into();
        if method == KeyMethod::None {
            return Ok(None);
        }
        Ok(Some(SegmentKey {
            method,
            uri: attrs.remove("URI").map(QuotedOrUnquoted::into_string),
            resolved_uri: None,
            iv: attrs.remove("IV").map(QuotedOrUnquoted::into_string),
            keyformat: attrs.remove("KEYFORMAT").map(QuotedOrUnquoted::into_string),
            keyformatversions: attrs
                .remove("KEYFORMATVERSIONS")
                .map(QuotedOrUnquoted::into_string),
        }))
    })(i)
}

fn extmap(i: &[u8]) -> IResult<&[u8], SegmentMap> {
    map_res(attribute_list, |mut attrs| -> Result<SegmentMap, &str> {
        let uri = match attrs.remove("URI") {
            Some(QuotedOrUnquoted::Quoted(s)) => Ok(s),
            Some(QuotedOrUnquoted::Unquoted(_)) => {
                Err("Can't create URI attribute from unquoted string")
            }
            None => Err("URI is empty"),
        }?;
        let byte_range = match attrs.remove("BYTERANGE") {
            Some(QuotedOrUnquoted::Quoted(s)) => match byte_range_val(s.as_bytes()) {
                IResult::Ok((_, range)) => Ok(Some(range)),
                IResult::Err(_) => Err("Invalid byte range"),
            },
            Some(QuotedOrUnquoted::Unquoted(_)) => {
                Err("Can't create BYTERANGE attribute from unquoted string")
            }
            None => Ok(None),
        }?;

        Ok(SegmentMap {
            uri,
            resolved_uri: None,
            byte_range,
        })
    })(i)
}

fn program_date_time(i: &[u8]) -> IResult<&[u8], DateTime<FixedOffset>> {
    map_res(rest, |s: &[u8]| -> Result<DateTime<FixedOffset>, String> {
        let s = str::from_utf8(s).map_err(|e| e.to_string())?;
        DateTime::parse_from_rfc3339(s.trim()).map_err(|e| e.to_string())
    })(i)
}

// -----------------------------------------------------------------------------------------------
// Basic tags
// -----------------------------------------------------------------------------------------------

fn version_tag(i: &[u8]) -> IResult<&[u8], usize> {
    map(preceded(tag("#EXT-X-VERSION:"), decimal), |v| v as usize)(i)
}

// -----------------------------------------------------------------------------------------------
// Util
// -----------------------------------------------------------------------------------------------

fn attribute_list(i: &[u8]) -> IResult<&[u8], HashMap<String, QuotedOrUnquoted>> {
    fold_many0(
        terminated(attribute, opt(char(','))),
        HashMap::new,
        |mut acc: HashMap<_, _>, (name, value)| {
            acc.insert(name, value);
            acc
        },
    )(i)
}

fn is_attribute_name_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'-'
}

fn attribute(i: &[u8]) -> IResult<&[u8], (String, QuotedOrUnquoted)> {
    separated_pair(
        preceded(space0, map_res(take_while1(is_attribute_name_char), from_utf8_slice)),
        char('='),
        alt((quoted, unquoted)),
    )(i)
}

fn quoted(i: &[u8]) -> IResult<&[u8], QuotedOrUnquoted> {
    map_res(
        delimited(char('"'), take_till(|c| c == b'"'), char('"')),
        |s: &[u8]| from_utf8_slice(s).map(QuotedOrUnquoted::Quoted),
    )(i)
}

fn unquoted(i: &[u8]) -> IResult<&[u8], QuotedOrUnquoted> {
    map_res(is_not(","), |s: &[u8]| {
        str::from_utf8(s).map(|s| QuotedOrUnquoted::Unquoted(s.trim().to_string()))
    })(i)
}

fn byte_range_val(i: &[u8]) -> IResult<&[u8], ByteRange> {
    map(
        tuple((decimal, opt(preceded(char('@'), decimal)))),
        |(length, offset)| ByteRange { length, offset },
    )(i)
}

fn from_utf8_slice(s: &[u8]) -> Result<String, string::FromUtf8Error> {
    String::from_utf8(s.to_vec())
}
