//! Which renditions may currently be selected.

use chrono::{DateTime, Utc};

use crate::playlist::{MasterPlaylist, MediaPlaylist};

/// A rendition is eligible unless it is excluded until some later instant.
pub fn is_eligible(playlist: &MediaPlaylist, now: DateTime<Utc>) -> bool {
    playlist.exclude_until.map_or(true, |until| until <= now)
}

pub fn eligible_count(master: &MasterPlaylist, now: DateTime<Utc>) -> usize {
    master.iter().filter(|p| is_eligible(p, now)).count()
}

/// Whether `active` is already at the bandwidth floor of the eligible
/// renditions.
///
/// Renditions with the same bandwidth do not count as lower. Eligible
/// renditions that do not advertise a bandwidth are treated as the lowest.
pub fn is_lowest_eligible(
    master: &MasterPlaylist,
    active: Option<&MediaPlaylist>,
    now: DateTime<Utc>,
) -> bool {
    let current = match active.and_then(|p| p.attributes.bandwidth) {
        Some(bandwidth) => bandwidth,
        None => return false,
    };
    !master
        .iter()
        .filter(|p| is_eligible(p, now))
        .any(|p| p.attributes.bandwidth.unwrap_or(0) < current)
}

/// The eligible rendition with the lowest advertised bandwidth.
pub fn lowest_eligible(master: &MasterPlaylist, now: DateTime<Utc>) -> Option<&MediaPlaylist> {
    master
        .iter()
        .filter(|p| is_eligible(p, now))
        .filter(|p| p.attributes.bandwidth.is_some())
        .min_by_key(|p| p.attributes.bandwidth)
}
