//! The playlist loader state machine.
//!
//! [`PlaylistLoader`] is sans-IO: it never performs a request or sleeps
//! itself. It asks its [`HttpClient`] to fetch and its [`RefreshScheduler`]
//! to arm timers, and it is told about completions through
//! [`PlaylistLoader::handle_response`] and
//! [`PlaylistLoader::handle_refresh_timer`]. Every request and every timer
//! carries a generation token; a completion whose token is not the current
//! one is discarded.
//!
//! ```text
//!  Nothing ──start──▶ (master fetch) ──▶ HaveMaster ──select_media──▶ SwitchingMedia
//!                                                                        │
//!        ┌──────────── refresh timer / refresh_now ◀── HaveMetadata ◀────┘
//!        └──────────────────────────────────────────▶ HaveMetadata ──select_media──▶ SwitchingMedia
//! ```
//!
//! At most one request is in flight and at most one refresh timer is armed
//! at any time: every fetch goes through the same abort-then-fetch path.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, trace, warn};

use crate::config::LoaderConfig;
use crate::error::{Error, ErrorInfo, ProtocolError, Result, TransportError, UsageError};
use crate::events::LoaderEvent;
use crate::http::{FetchRequest, FetchResult, HttpClient, RefreshScheduler, RequestId, TimerId};
use crate::live::LiveWindow;
use crate::playlist::{Manifest, ManifestParser, MasterPlaylist, MediaPlaylist};
use crate::reconcile::{merge_master, merge_rendition};
use crate::resolve::resolve_url;
use crate::selector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoaderState {
    /// No master playlist yet.
    #[default]
    Nothing,
    /// The master playlist is loaded, no rendition is.
    HaveMaster,
    /// A rendition is active and loaded.
    HaveMetadata,
    /// A rendition request is in flight.
    SwitchingMedia,
}

impl fmt::Display for LoaderState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LoaderState::Nothing => write!(f, "HAVE_NOTHING"),
            LoaderState::HaveMaster => write!(f, "HAVE_MASTER"),
            LoaderState::HaveMetadata => write!(f, "HAVE_METADATA"),
            LoaderState::SwitchingMedia => write!(f, "SWITCHING_MEDIA"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Purpose {
    Master,
    /// First load of a rendition or a switch. Failure reverts to `previous_state`.
    Media { previous_state: LoaderState },
    Refresh,
}

#[derive(Debug, Clone)]
struct PendingRequest {
    id: RequestId,
    /// Rendition URI as listed in the master, or the source URI for the master.
    uri: String,
    resolved_uri: String,
    purpose: Purpose,
}

pub struct PlaylistLoader<H, S, P> {
    src: String,
    config: LoaderConfig,
    http: H,
    scheduler: S,
    parser: P,

    state: LoaderState,
    master: Option<MasterPlaylist>,
    /// Index of the active rendition in the master.
    active: Option<usize>,

    pending: Option<PendingRequest>,
    next_request: u64,
    timer: Option<TimerId>,
    next_timer: u64,
    refresh_delay: Option<Duration>,

    bandwidth: Option<f64>,
    live_window: LiveWindow,
    events: VecDeque<LoaderEvent>,
    disposed: bool,
}

impl<H, S, P> fmt::Debug for PlaylistLoader<H, S, P> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PlaylistLoader")
            .field("src", &self.src)
            .field("state", &self.state)
            .field("active", &self.active)
            .field("pending", &self.pending)
            .field("timer", &self.timer)
            .field("disposed", &self.disposed)
            .finish()
    }
}

impl<H, S, P> PlaylistLoader<H, S, P>
where
    H: HttpClient,
    S: RefreshScheduler,
    P: ManifestParser,
{
    pub fn new(src: impl Into<String>, http: H, scheduler: S, parser: P, config: LoaderConfig) -> Self {
        let mut live_window = LiveWindow::new();
        if config.track_expired_time {
            live_window.enable();
        }
        PlaylistLoader {
            src: src.into(),
            config,
            http,
            scheduler,
            parser,
            state: LoaderState::Nothing,
            master: None,
            active: None,
            pending: None,
            next_request: 0,
            timer: None,
            next_timer: 0,
            refresh_delay: None,
            bandwidth: None,
            live_window,
            events: VecDeque::new(),
            disposed: false,
        }
    }

    // -------------------------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------------------------

    /// Requests the master playlist.
    pub fn start(&mut self) -> Result<()> {
        self.check_disposed()?;
        if self.state != LoaderState::Nothing || self.pending.is_some() {
            return Err(UsageError::AlreadyStarted.into());
        }
        let src = self.src.clone();
        self.issue_request(src.clone(), src, Purpose::Master);
        Ok(())
    }

    /// Makes `uri` the active rendition.
    ///
    /// `uri` is a rendition URI as listed in the master, or its resolved form.
    /// Selecting the active rendition does nothing; selecting a complete
    /// (`#EXT-X-ENDLIST`) rendition that is already loaded switches without a
    /// request.
    pub fn select_media(&mut self, uri: &str) -> Result<()> {
        self.check_disposed()?;
        let master = self.master.as_ref().ok_or(UsageError::NoMaster {
            operation: "select a media playlist",
        })?;
        let index = master
            .position(uri)
            .or_else(|| {
                master
                    .iter()
                    .position(|p| p.resolved_uri.as_deref() == Some(uri))
            })
            .ok_or_else(|| UsageError::UnknownPlaylist {
                uri: uri.to_string(),
            })?;

        if self.active == Some(index) {
            trace!(uri, "rendition already active");
            return Ok(());
        }

        let (target_uri, resolved_uri, complete) = match master.playlist_at(index) {
            Some(target) => (
                target.uri.clone(),
                target
                    .resolved_uri
                    .clone()
                    .unwrap_or_else(|| resolve_url(&master.resolved_uri, &target.uri)),
                target.end_list,
            ),
            None => {
                return Err(UsageError::UnknownPlaylist {
                    uri: uri.to_string(),
                }
                .into())
            }
        };
        let from = self.active_uri().map(str::to_string);

        if complete {
            debug!(uri = %target_uri, "switching to complete rendition without a request");
            self.cancel_refresh();
            self.abort_pending();
            self.active = Some(index);
            self.set_state(LoaderState::HaveMetadata);
            if let Some(from) = from {
                self.events.push_back(LoaderEvent::MediaChanging {
                    from,
                    to: target_uri.clone(),
                });
            }
            info!(uri = %target_uri, "media playlist active");
            self.events
                .push_back(LoaderEvent::MediaChange { uri: target_uri });
            return Ok(());
        }

        let previous_state = match &self.pending {
            Some(pending) if pending.resolved_uri == resolved_uri => {
                trace!(uri = %resolved_uri, "rendition already being requested");
                return Ok(());
            }
            Some(PendingRequest {
                purpose: Purpose::Media { previous_state },
                ..
            }) => *previous_state,
            _ => self.state,
        };

        self.set_state(LoaderState::SwitchingMedia);
        if let Some(from) = from {
            self.events.push_back(LoaderEvent::MediaChanging {
                from,
                to: target_uri.clone(),
            });
        }
        self.issue_request(target_uri, resolved_uri, Purpose::Media { previous_state });
        Ok(())
    }

    /// Re-fetches the active rendition now.
    ///
    /// There is no automatic retry after a failed refresh; this is how a
    /// caller resumes polling. Does nothing while a switch is in flight.
    pub fn refresh_now(&mut self) -> Result<()> {
        self.check_disposed()?;
        if self.master.is_none() {
            return Err(UsageError::NoMaster {
                operation: "refresh",
            }
            .into());
        }
        if self.state == LoaderState::SwitchingMedia {
            trace!("switch in flight, not refreshing");
            return Ok(());
        }
        let (uri, resolved_uri) = self
            .active_playlist()
            .map(|p| (p.uri.clone(), p.base_uri().to_string()))
            .ok_or(UsageError::NoActivePlaylist)?;
        self.issue_request(uri, resolved_uri, Purpose::Refresh);
        Ok(())
    }

    /// Stops all network activity. A pending switch is abandoned and the
    /// loader returns to the state it was in before the switch.
    pub fn pause(&mut self) {
        self.cancel_refresh();
        if let Some(PendingRequest {
            purpose: Purpose::Media { previous_state },
            ..
        }) = self.abort_pending()
        {
            self.set_state(previous_state);
        }
    }

    /// Undoes [`pause`](Self::pause): starts the master load if it never
    /// completed, otherwise refreshes a live active rendition right away.
    pub fn resume(&mut self) -> Result<()> {
        self.check_disposed()?;
        if self.pending.is_some() {
            return Ok(());
        }
        if self.master.is_none() {
            return self.start();
        }
        let live = self.active_playlist().map_or(false, MediaPlaylist::is_live);
        if live && self.state == LoaderState::HaveMetadata {
            return self.refresh_now();
        }
        Ok(())
    }

    /// Aborts the in-flight request and cancels the refresh timer for good.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        debug!(src = %self.src, "disposing playlist loader");
        self.cancel_refresh();
        self.abort_pending();
        self.disposed = true;
    }

    pub fn enable_expired_tracking(&mut self) {
        self.live_window.enable();
    }

    /// Makes a rendition ineligible for selection until `until`.
    pub fn exclude_playlist(&mut self, uri: &str, until: DateTime<Utc>) -> Result<()> {
        self.check_disposed()?;
        let master = self.master.as_mut().ok_or(UsageError::NoMaster {
            operation: "exclude a media playlist",
        })?;
        master.exclude(uri, until)?;
        Ok(())
    }

    // -------------------------------------------------------------------------------------------
    // Completions
    // -------------------------------------------------------------------------------------------

    pub fn handle_response(&mut self, id: RequestId, result: FetchResult) {
        let pending = match self.pending.take() {
            Some(pending) if pending.id == id => pending,
            other => {
                self.pending = other;
                trace!(%id, "discarding stale response");
                return;
            }
        };

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                let error = TransportError::network(pending.resolved_uri.clone(), e.reason);
                return self.request_failed(pending, error.into());
            }
        };
        if !response.is_success() {
            let body = Some(String::from_utf8_lossy(&response.body).into_owned())
                .filter(|b| !b.is_empty());
            let error = TransportError::http_status(pending.resolved_uri.clone(), response.status, body);
            return self.request_failed(pending, error.into());
        }
        if let Some(bandwidth) = response.bandwidth {
            self.bandwidth = Some(bandwidth);
        }

        let manifest = match self.parser.parse(&pending.resolved_uri, &response.body) {
            Ok(manifest) => manifest,
            Err(e) => return self.request_failed(pending, e.with_status(response.status).into()),
        };

        match (pending.purpose, manifest) {
            (Purpose::Master, Manifest::Master(master)) => self.master_loaded(pending, master, response.status),
            (Purpose::Master, Manifest::Media(media)) => {
                debug!(uri = %self.src, "source is a media playlist, inferring a master");
                let mut master = MasterPlaylist::new(self.src.clone());
                let mut rendition = MediaPlaylist::new(self.src.clone());
                rendition.resolved_uri = Some(self.src.clone());
                master.push_playlist(rendition);
                self.master = Some(master);
                self.set_state(LoaderState::HaveMaster);
                self.media_loaded(pending, LoaderState::HaveMaster, media);
            }
            (Purpose::Media { previous_state }, Manifest::Media(media)) => {
                self.media_loaded(pending, previous_state, media)
            }
            (Purpose::Refresh, Manifest::Media(media)) => self.refreshed(pending, media),
            (_, Manifest::Master(_)) => {
                let error = ProtocolError::new(
                    pending.resolved_uri.clone(),
                    "expected a media playlist, got a master playlist",
                )
                .with_status(response.status);
                self.request_failed(pending, error.into())
            }
        }
    }

    pub fn handle_refresh_timer(&mut self, id: TimerId) {
        if self.timer != Some(id) {
            trace!(%id, "discarding stale refresh timer");
            return;
        }
        self.timer = None;
        if self.state != LoaderState::HaveMetadata || self.pending.is_some() {
            return;
        }
        let (uri, resolved_uri) = match self.active_playlist() {
            Some(active) if active.is_live() => (active.uri.clone(), active.base_uri().to_string()),
            _ => return,
        };
        self.issue_request(uri, resolved_uri, Purpose::Refresh);
    }

    /// Next queued notification, in the order the transitions happened.
    pub fn poll_event(&mut self) -> Option<LoaderEvent> {
        self.events.pop_front()
    }

    // -------------------------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------------------------

    pub fn state(&self) -> LoaderState {
        self.state
    }

    pub fn src(&self) -> &str {
        &self.src
    }

    pub fn master(&self) -> Option<&MasterPlaylist> {
        self.master.as_ref()
    }

    /// The active rendition.
    pub fn media(&self) -> Option<&MediaPlaylist> {
        self.active_playlist()
    }

    /// Last transfer rate reported for a successful playlist response, in bits per second.
    pub fn bandwidth(&self) -> Option<f64> {
        self.bandwidth
    }

    pub fn expired_seconds(&self) -> f64 {
        self.live_window.expired_seconds()
    }

    /// Delay the refresh timer was last armed with (or would have been, for a
    /// complete rendition).
    pub fn refresh_delay(&self) -> Option<Duration> {
        self.refresh_delay
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn eligible_count(&self) -> usize {
        self.master
            .as_ref()
            .map_or(0, |master| selector::eligible_count(master, Utc::now()))
    }

    pub fn is_lowest_eligible(&self) -> bool {
        self.master.as_ref().map_or(false, |master| {
            selector::is_lowest_eligible(master, self.active_playlist(), Utc::now())
        })
    }

    // -------------------------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------------------------

    fn check_disposed(&self) -> Result<()> {
        if self.disposed {
            return Err(UsageError::Disposed.into());
        }
        Ok(())
    }

    fn active_playlist(&self) -> Option<&MediaPlaylist> {
        let index = self.active?;
        self.master.as_ref()?.playlist_at(index)
    }

    fn active_uri(&self) -> Option<&str> {
        self.active_playlist().map(|p| p.uri.as_str())
    }

    fn set_state(&mut self, state: LoaderState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "loader state");
            self.state = state;
        }
    }

    fn issue_request(&mut self, uri: String, resolved_uri: String, purpose: Purpose) {
        self.cancel_refresh();
        self.abort_pending();

        let id = RequestId(self.next_request);
        self.next_request += 1;
        debug!(%id, uri = %resolved_uri, purpose = ?purpose, "requesting playlist");

        self.pending = Some(PendingRequest {
            id,
            uri,
            resolved_uri: resolved_uri.clone(),
            purpose,
        });
        self.http.fetch(FetchRequest {
            id,
            uri: resolved_uri,
            with_credentials: self.config.with_credentials,
        });
    }

    fn abort_pending(&mut self) -> Option<PendingRequest> {
        let pending = self.pending.take()?;
        trace!(id = %pending.id, uri = %pending.resolved_uri, "aborting playlist request");
        self.http.abort(pending.id);
        Some(pending)
    }

    fn arm_refresh(&mut self, delay: Duration) {
        self.cancel_refresh();
        let id = TimerId(self.next_timer);
        self.next_timer += 1;
        debug!(%id, delay_ms = delay.as_millis() as u64, "scheduling playlist refresh");
        self.timer = Some(id);
        self.scheduler.schedule(id, delay);
    }

    fn cancel_refresh(&mut self) {
        if let Some(id) = self.timer.take() {
            self.scheduler.cancel(id);
        }
    }

    fn master_loaded(&mut self, pending: PendingRequest, mut master: MasterPlaylist, status: u16) {
        if master.is_empty() {
            let error = ProtocolError::new(pending.resolved_uri.clone(), "master playlist lists no renditions")
                .with_status(status);
            return self.request_failed(pending, error.into());
        }
        master.uri = self.src.clone();
        master.resolved_uri = pending.resolved_uri;
        master.resolve_uris();
        debug!(uri = %master.uri, renditions = master.len(), "master playlist loaded");

        let first = master.playlist_at(0).map(|p| p.uri.clone());
        self.master = Some(master);
        self.set_state(LoaderState::HaveMaster);

        if self.config.auto_select_first_variant {
            if let Some(first) = first {
                if let Err(e) = self.select_media(&first) {
                    warn!(uri = %first, error = %e, "could not select the first rendition");
                }
            }
        }
    }

    /// First load of a rendition, or the response to a switch.
    fn media_loaded(&mut self, pending: PendingRequest, previous_state: LoaderState, mut media: MediaPlaylist) {
        media.uri = pending.uri.clone();
        media.resolved_uri = Some(pending.resolved_uri.clone());

        let Some(master) = self.master.as_mut() else {
            return;
        };
        let Some(index) = master.position(&pending.uri) else {
            let error = UsageError::UnknownPlaylist {
                uri: pending.uri.clone(),
            };
            return self.request_failed(pending, error.into());
        };
        let previous = match self.active {
            Some(active) if self.live_window.is_tracking() => master.playlist_at(active).cloned(),
            _ => None,
        };

        // A first load may look identical to the stub it replaces, so the
        // rendition is merged unconditionally.
        let Some(merged) = merge_rendition(master, media) else {
            return;
        };
        self.live_window.update(previous.as_ref(), merged);
        let delay = fresh_delay(merged, &self.config);
        let live = merged.is_live();

        self.active = Some(index);
        self.refresh_delay = Some(delay);
        self.set_state(LoaderState::HaveMetadata);
        info!(uri = %pending.uri, live, "media playlist active");

        self.events.push_back(match previous_state {
            LoaderState::HaveMaster => LoaderEvent::LoadedMetadata { uri: pending.uri },
            _ => LoaderEvent::MediaChange { uri: pending.uri },
        });
        if live {
            self.arm_refresh(delay);
        }
    }

    fn refreshed(&mut self, pending: PendingRequest, mut media: MediaPlaylist) {
        media.uri = pending.uri.clone();
        media.resolved_uri = Some(pending.resolved_uri.clone());

        let (Some(master), Some(active)) = (self.master.as_mut(), self.active) else {
            return;
        };
        let previous = if self.live_window.is_tracking() {
            master.playlist_at(active).cloned()
        } else {
            None
        };

        let (delay, live) = match merge_master(master, media) {
            Some(merged) => {
                self.live_window.update(previous.as_ref(), merged);
                debug!(
                    uri = %merged.uri,
                    seq = merged.media_sequence,
                    segments = merged.segments.len(),
                    "live playlist updated"
                );
                (fresh_delay(merged, &self.config), merged.is_live())
            }
            None => match master.playlist_at(active) {
                Some(unchanged) => (
                    backoff_delay(self.refresh_delay, unchanged, &self.config),
                    unchanged.is_live(),
                ),
                None => return,
            },
        };

        self.refresh_delay = Some(delay);
        if live {
            self.arm_refresh(delay);
        }
    }

    fn request_failed(&mut self, pending: PendingRequest, error: Error) {
        warn!(uri = %pending.resolved_uri, severity = %error.severity(), error = %error, "playlist request failed");

        match pending.purpose {
            Purpose::Master => self.set_state(LoaderState::Nothing),
            Purpose::Media { previous_state } => {
                self.set_state(previous_state);
                let resume_refresh = previous_state == LoaderState::HaveMetadata
                    && self.active_playlist().map_or(false, MediaPlaylist::is_live);
                if let (true, Some(delay)) = (resume_refresh, self.refresh_delay) {
                    self.arm_refresh(delay);
                }
            }
            Purpose::Refresh => {}
        }

        self.events
            .push_back(LoaderEvent::Error(ErrorInfo::new(pending.uri, &error)));
    }
}

/// Refresh delay after a playlist changed: one target duration.
fn fresh_delay(playlist: &MediaPlaylist, config: &LoaderConfig) -> Duration {
    let target = playlist.target_duration_or(config.default_target_duration.as_secs_f64());
    Duration::try_from_secs_f64(target)
        .unwrap_or(config.default_target_duration)
        .max(config.min_refresh_delay)
}

/// Refresh delay after a poll found nothing new: half the previous delay,
/// but never below half a target duration.
fn backoff_delay(previous: Option<Duration>, playlist: &MediaPlaylist, config: &LoaderConfig) -> Duration {
    let target = fresh_delay(playlist, config);
    let halved = previous.unwrap_or(target) / 2;
    halved.max(target / 2).max(config.min_refresh_delay)
}
