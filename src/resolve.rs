//! Resolution of relative playlist, segment, key and init-segment URIs.

use url::Url;

use crate::playlist::Segment;

/// Resolves `relative` against `base`.
///
/// Absolute URIs are returned unchanged. When `base` is not an absolute URL
/// itself, `relative` is joined onto the directory part of `base`.
pub fn resolve_url(base: &str, relative: &str) -> String {
    if let Ok(absolute) = Url::parse(relative) {
        return absolute.into();
    }
    match Url::parse(base) {
        Ok(base_url) => base_url
            .join(relative)
            .map(String::from)
            .unwrap_or_else(|_| relative.to_string()),
        Err(_) => join_path(base, relative),
    }
}

fn join_path(base: &str, relative: &str) -> String {
    if relative.starts_with('/') {
        return relative.to_string();
    }
    match base.rfind('/') {
        Some(slash) => format!("{}{}", &base[..=slash], relative),
        None => relative.to_string(),
    }
}

/// Fills in the segment's `resolved_uri` and those of its key and map.
/// Fields that are already resolved are never touched.
pub fn resolve_segment(base: &str, segment: &mut Segment) {
    if segment.resolved_uri.is_none() {
        segment.resolved_uri = Some(resolve_url(base, &segment.uri));
    }
    if let Some(key) = &mut segment.key {
        if let (Some(uri), None) = (&key.uri, &key.resolved_uri) {
            key.resolved_uri = Some(resolve_url(base, uri));
        }
    }
    if let Some(map) = &mut segment.map {
        if map.resolved_uri.is_none() {
            map.resolved_uri = Some(resolve_url(base, &map.uri));
        }
    }
}
