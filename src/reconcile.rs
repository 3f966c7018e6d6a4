//! Merging of successive snapshots of the same media playlist.
//!
//! A live playlist is a sliding window: each refresh drops segments off the
//! front and appends new ones at the back. The update is authoritative, but
//! what an earlier snapshot already knew (resolved URIs, established timing)
//! survives wherever the update does not say otherwise.

use tracing::trace;

use crate::playlist::{MasterPlaylist, MediaPlaylist, Segment, SegmentKey, SegmentMap, VariantAttributes};
use crate::resolve::resolve_segment;

/// Field-by-field merge where `update` wins on conflict.
///
/// A field is "present" on the update when it is `Some` (or `true` for
/// flags); absent fields keep the current value.
pub trait Overlay {
    fn overlay(&mut self, update: Self);
}

fn overlay_option<T>(current: &mut Option<T>, update: Option<T>) {
    if update.is_some() {
        *current = update;
    }
}

fn overlay_nested<T: Overlay>(current: &mut Option<T>, update: Option<T>) {
    match (current.as_mut(), update) {
        (Some(current), Some(update)) => current.overlay(update),
        (None, Some(update)) => *current = Some(update),
        (_, None) => {}
    }
}

impl Overlay for SegmentKey {
    fn overlay(&mut self, update: SegmentKey) {
        self.method = update.method;
        overlay_option(&mut self.uri, update.uri);
        overlay_option(&mut self.resolved_uri, update.resolved_uri);
        overlay_option(&mut self.iv, update.iv);
        overlay_option(&mut self.keyformat, update.keyformat);
        overlay_option(&mut self.keyformatversions, update.keyformatversions);
    }
}

impl Overlay for SegmentMap {
    fn overlay(&mut self, update: SegmentMap) {
        self.uri = update.uri;
        overlay_option(&mut self.resolved_uri, update.resolved_uri);
        overlay_option(&mut self.byte_range, update.byte_range);
    }
}

impl Overlay for Segment {
    fn overlay(&mut self, update: Segment) {
        let Segment {
            uri,
            resolved_uri,
            duration,
            title,
            byte_range,
            discontinuity,
            key,
            map,
            program_date_time,
            start,
            end,
        } = update;

        self.uri = uri;
        self.duration = duration;
        self.discontinuity |= discontinuity;
        overlay_option(&mut self.resolved_uri, resolved_uri);
        overlay_option(&mut self.title, title);
        overlay_option(&mut self.byte_range, byte_range);
        overlay_option(&mut self.program_date_time, program_date_time);
        overlay_option(&mut self.start, start);
        overlay_option(&mut self.end, end);
        overlay_nested(&mut self.key, key);
        overlay_nested(&mut self.map, map);
    }
}

impl Overlay for VariantAttributes {
    fn overlay(&mut self, update: VariantAttributes) {
        overlay_option(&mut self.bandwidth, update.bandwidth);
        overlay_option(&mut self.average_bandwidth, update.average_bandwidth);
        overlay_option(&mut self.codecs, update.codecs);
        overlay_option(&mut self.resolution, update.resolution);
        overlay_option(&mut self.frame_rate, update.frame_rate);
        overlay_option(&mut self.audio, update.audio);
        overlay_option(&mut self.video, update.video);
        overlay_option(&mut self.subtitles, update.subtitles);
        overlay_option(&mut self.closed_captions, update.closed_captions);
    }
}

/// Overlays everything but the segment list, which needs the sequence offset
/// and is merged by [`merge_segments`].
impl Overlay for MediaPlaylist {
    fn overlay(&mut self, update: MediaPlaylist) {
        let MediaPlaylist {
            uri,
            resolved_uri,
            attributes,
            exclude_until,
            end_list,
            target_duration,
            media_sequence,
            discontinuity_sequence,
            playlist_type,
            version,
            segments,
        } = update;

        self.uri = uri;
        self.end_list |= end_list;
        self.media_sequence = media_sequence;
        self.discontinuity_sequence = discontinuity_sequence;
        overlay_option(&mut self.resolved_uri, resolved_uri);
        overlay_option(&mut self.exclude_until, exclude_until);
        overlay_option(&mut self.target_duration, target_duration);
        overlay_option(&mut self.playlist_type, playlist_type);
        overlay_option(&mut self.version, version);
        self.attributes.overlay(attributes);
        self.segments = segments;
    }
}

/// Merges `update` onto `original`, where `offset` segments have scrolled out
/// of the window since `original` was taken.
///
/// The result always has `update.len()` segments. Update position `j` lines up
/// with original position `j + offset`; where such an original exists it is
/// the base the update is overlaid onto, elsewhere the update is used as is.
/// Negative or oversized offsets simply leave no overlap.
pub fn merge_segments(original: &[Segment], update: Vec<Segment>, offset: i64) -> Vec<Segment> {
    update
        .into_iter()
        .enumerate()
        .map(|(j, segment)| {
            let aligned = i64::try_from(j)
                .ok()
                .and_then(|j| j.checked_add(offset))
                .and_then(|i| usize::try_from(i).ok())
                .and_then(|i| original.get(i));
            match aligned {
                Some(base) => {
                    let mut merged = base.clone();
                    merged.overlay(segment);
                    merged
                }
                None => segment,
            }
        })
        .collect()
}

/// Whether `new` carries anything `old` does not: a changed segment count or
/// a changed media sequence.
pub fn is_material_update(old: &MediaPlaylist, new: &MediaPlaylist) -> bool {
    old.segments.len() != new.segments.len() || old.media_sequence != new.media_sequence
}

/// Merges a freshly fetched media playlist into the matching rendition of
/// `master`, in place.
///
/// Returns the merged rendition, or `None` when no rendition has the
/// update's URI or the update is not material (nothing to propagate).
pub fn merge_master(master: &mut MasterPlaylist, update: MediaPlaylist) -> Option<&MediaPlaylist> {
    let playlist = master.playlist(&update.uri)?;
    if !is_material_update(playlist, &update) {
        trace!(uri = %update.uri, seq = update.media_sequence, "playlist unchanged");
        return None;
    }
    merge_rendition(master, update)
}

/// Like [`merge_master`], but merges even when the update is not material.
///
/// Returns `None` only when no rendition has the update's URI.
pub fn merge_rendition(master: &mut MasterPlaylist, update: MediaPlaylist) -> Option<&MediaPlaylist> {
    let playlist = master.playlist_mut(&update.uri)?;

    // Sequence numbers span the whole u64 range.
    let delta = i128::from(update.media_sequence) - i128::from(playlist.media_sequence);
    let offset = delta.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64;
    let mut update = update;
    let segments = std::mem::take(&mut update.segments);
    let merged = merge_segments(&playlist.segments, segments, offset);

    playlist.overlay(update);
    playlist.segments = merged;

    let base = playlist.base_uri().to_string();
    for segment in &mut playlist.segments {
        resolve_segment(&base, segment);
    }

    Some(&*playlist)
}
