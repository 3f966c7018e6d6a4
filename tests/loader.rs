#![cfg(feature = "parser")]

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use chrono::Utc;
use m3u8_loader::*;

const MASTER_URI: &str = "http://example.com/live/master.m3u8";

const MASTER: &str = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=800000
a.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=1200000
b.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=500000
c.m3u8
";

// -----------------------------------------------------------------------------------------------
// Fakes

#[derive(Default)]
struct Network {
    fetched: Vec<FetchRequest>,
    aborted: Vec<RequestId>,
}

#[derive(Clone, Default)]
struct FakeHttp(Rc<RefCell<Network>>);

impl HttpClient for FakeHttp {
    fn fetch(&mut self, request: FetchRequest) {
        self.0.borrow_mut().fetched.push(request);
    }

    fn abort(&mut self, id: RequestId) {
        self.0.borrow_mut().aborted.push(id);
    }
}

#[derive(Default)]
struct Timers {
    scheduled: Vec<(TimerId, Duration)>,
    cancelled: Vec<TimerId>,
}

#[derive(Clone, Default)]
struct FakeScheduler(Rc<RefCell<Timers>>);

impl RefreshScheduler for FakeScheduler {
    fn schedule(&mut self, id: TimerId, delay: Duration) {
        self.0.borrow_mut().scheduled.push((id, delay));
    }

    fn cancel(&mut self, id: TimerId) {
        self.0.borrow_mut().cancelled.push(id);
    }
}

struct Harness {
    loader: PlaylistLoader<FakeHttp, FakeScheduler, M3u8Parser>,
    network: Rc<RefCell<Network>>,
    timers: Rc<RefCell<Timers>>,
}

impl Harness {
    fn new(src: &str, config: LoaderConfig) -> Harness {
        let http = FakeHttp::default();
        let scheduler = FakeScheduler::default();
        let network = Rc::clone(&http.0);
        let timers = Rc::clone(&scheduler.0);
        Harness {
            loader: PlaylistLoader::new(src, http, scheduler, M3u8Parser, config),
            network,
            timers,
        }
    }

    /// Loader with the master playlist loaded.
    fn with_master() -> Harness {
        let mut h = Harness::new(MASTER_URI, LoaderConfig::default());
        h.loader.start().unwrap();
        h.respond(MASTER);
        h
    }

    /// Loader with `a.m3u8` active: live, sequence 5, target duration 6, three segments.
    fn with_live_a() -> Harness {
        let mut h = Harness::with_master();
        h.loader.select_media("a.m3u8").unwrap();
        h.respond(&media(5, 6, 3, false));
        h.drain_events();
        h
    }

    fn fetch_count(&self) -> usize {
        self.network.borrow().fetched.len()
    }

    fn last_request(&self) -> FetchRequest {
        self.network.borrow().fetched.last().cloned().expect("no request issued")
    }

    fn aborted(&self) -> Vec<RequestId> {
        self.network.borrow().aborted.clone()
    }

    fn respond(&mut self, body: &str) {
        let id = self.last_request().id;
        self.loader
            .handle_response(id, Ok(FetchResponse::ok(body.to_string())));
    }

    fn respond_status(&mut self, status: u16) {
        let id = self.last_request().id;
        self.loader.handle_response(
            id,
            Ok(FetchResponse {
                status,
                body: "not found".into(),
                bandwidth: None,
            }),
        );
    }

    fn schedule_count(&self) -> usize {
        self.timers.borrow().scheduled.len()
    }

    fn last_timer(&self) -> (TimerId, Duration) {
        *self.timers.borrow().scheduled.last().expect("no timer armed")
    }

    fn cancelled(&self) -> Vec<TimerId> {
        self.timers.borrow().cancelled.clone()
    }

    fn fire_timer(&mut self) {
        let (id, _) = self.last_timer();
        self.loader.handle_refresh_timer(id);
    }

    fn drain_events(&mut self) -> Vec<LoaderEvent> {
        std::iter::from_fn(|| self.loader.poll_event()).collect()
    }
}

fn media(seq: u64, target: u64, count: u64, end_list: bool) -> String {
    let mut body = format!("#EXTM3U\n#EXT-X-TARGETDURATION:{}\n#EXT-X-MEDIA-SEQUENCE:{}\n", target, seq);
    for i in seq..seq + count {
        body.push_str(&format!("#EXTINF:{},\nseg{}.ts\n", target, i));
    }
    if end_list {
        body.push_str("#EXT-X-ENDLIST\n");
    }
    body
}

fn error_info(event: &LoaderEvent) -> &ErrorInfo {
    match event {
        LoaderEvent::Error(info) => info,
        other => panic!("expected an error event, got {:?}", other),
    }
}

// -----------------------------------------------------------------------------------------------
// Master

#[test]
fn master_load() {
    let mut h = Harness::new(MASTER_URI, LoaderConfig::default());
    assert_eq!(h.loader.state(), LoaderState::Nothing);

    h.loader.start().unwrap();
    assert_eq!(h.last_request().uri, MASTER_URI);
    h.respond(MASTER);

    assert_eq!(h.loader.state(), LoaderState::HaveMaster);
    let master = h.loader.master().unwrap();
    assert_eq!(master.len(), 3);
    assert_eq!(
        master.playlist("b.m3u8").unwrap().resolved_uri.as_deref(),
        Some("http://example.com/live/b.m3u8")
    );
    assert!(h.loader.media().is_none());
    assert!(h.drain_events().is_empty());
}

#[test]
fn master_failure_stays_in_nothing() {
    let mut h = Harness::new(MASTER_URI, LoaderConfig::default());
    h.loader.start().unwrap();
    let id = h.last_request().id;
    h.loader
        .handle_response(id, Err(FetchError::new("connection reset")));

    assert_eq!(h.loader.state(), LoaderState::Nothing);
    let events = h.drain_events();
    assert_eq!(events.len(), 1);
    let info = error_info(&events[0]);
    assert_eq!(info.uri, MASTER_URI);
    assert_eq!(info.status, None);
    assert_eq!(info.severity, Severity::Fatal);
    // no implicit retry
    assert_eq!(h.fetch_count(), 1);

    h.loader.start().unwrap();
    assert_eq!(h.fetch_count(), 2);
}

#[test]
fn start_twice_is_a_usage_error() {
    let mut h = Harness::new(MASTER_URI, LoaderConfig::default());
    h.loader.start().unwrap();
    assert!(matches!(
        h.loader.start(),
        Err(Error::Usage(UsageError::AlreadyStarted))
    ));
    assert_eq!(h.fetch_count(), 1);
}

#[test]
fn media_source_becomes_single_variant_master() {
    let src = "http://example.com/vod/index.m3u8";
    let mut h = Harness::new(src, LoaderConfig::default());
    h.loader.start().unwrap();
    h.respond(&media(0, 10, 2, true));

    assert_eq!(h.loader.state(), LoaderState::HaveMetadata);
    let master = h.loader.master().unwrap();
    assert_eq!(master.len(), 1);
    assert_eq!(master.uri, src);
    let active = h.loader.media().unwrap();
    assert_eq!(active.uri, src);
    assert_eq!(active.segments.len(), 2);
    assert_eq!(
        active.segments[1].resolved_uri.as_deref(),
        Some("http://example.com/vod/seg1.ts")
    );
    assert_eq!(
        h.drain_events(),
        vec![LoaderEvent::LoadedMetadata { uri: src.to_string() }]
    );
    assert_eq!(h.schedule_count(), 0);
}

#[test]
fn empty_master_is_a_protocol_error() {
    let mut h = Harness::new(MASTER_URI, LoaderConfig::default());
    h.loader.start().unwrap();
    h.respond("#EXTM3U\n#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"a\",NAME=\"en\",URI=\"en.m3u8\"\n");

    assert_eq!(h.loader.state(), LoaderState::Nothing);
    let events = h.drain_events();
    let info = error_info(&events[0]);
    assert_eq!(info.status, Some(200));
    assert_eq!(info.severity, Severity::Recoverable);
}

#[test]
fn auto_select_first_variant() {
    let config = LoaderConfig::default().with_auto_select_first_variant(true);
    let mut h = Harness::new(MASTER_URI, config);
    h.loader.start().unwrap();
    h.respond(MASTER);

    assert_eq!(h.loader.state(), LoaderState::SwitchingMedia);
    assert_eq!(h.last_request().uri, "http://example.com/live/a.m3u8");
}

#[test]
fn credentials_are_forwarded() {
    let config = LoaderConfig::default().with_credentials(true);
    let mut h = Harness::new(MASTER_URI, config);
    h.loader.start().unwrap();
    assert!(h.last_request().with_credentials);
}

// -----------------------------------------------------------------------------------------------
// Live refresh

#[test]
fn end_to_end_live_refresh() {
    let mut h = Harness::with_master();

    h.loader.select_media("a.m3u8").unwrap();
    assert_eq!(h.loader.state(), LoaderState::SwitchingMedia);
    h.respond(&media(5, 6, 3, false));

    assert_eq!(h.loader.state(), LoaderState::HaveMetadata);
    assert_eq!(
        h.drain_events(),
        vec![LoaderEvent::LoadedMetadata {
            uri: "a.m3u8".to_string()
        }]
    );
    assert_eq!(h.last_timer().1, Duration::from_millis(6000));

    // one segment appended, the oldest dropped
    h.fire_timer();
    assert_eq!(h.last_request().uri, "http://example.com/live/a.m3u8");
    h.respond(&media(6, 6, 3, false));
    let active = h.loader.media().unwrap();
    assert_eq!(active.media_sequence, 6);
    assert_eq!(active.segments.len(), 3);
    assert_eq!(active.segments[2].uri, "seg8.ts");
    assert_eq!(h.last_timer().1, Duration::from_millis(6000));

    // nothing new
    h.fire_timer();
    h.respond(&media(6, 6, 3, false));
    assert_eq!(h.loader.state(), LoaderState::HaveMetadata);
    assert_eq!(h.last_timer().1, Duration::from_millis(3000));
    assert!(h.drain_events().is_empty());
}

#[test]
fn repeated_noop_refreshes_settle_at_half_target() {
    let mut h = Harness::with_live_a();
    for _ in 0..4 {
        h.fire_timer();
        h.respond(&media(5, 6, 3, false));
    }
    assert_eq!(h.last_timer().1, Duration::from_millis(3000));
    assert_eq!(h.loader.refresh_delay(), Some(Duration::from_millis(3000)));
}

#[test]
fn complete_playlist_is_never_refreshed() {
    let mut h = Harness::with_master();
    h.loader.select_media("a.m3u8").unwrap();
    h.respond(&media(0, 6, 3, true));

    assert_eq!(h.loader.state(), LoaderState::HaveMetadata);
    assert_eq!(h.schedule_count(), 0);
}

#[test]
fn playlist_ending_stops_refresh() {
    let mut h = Harness::with_live_a();
    let scheduled = h.schedule_count();
    h.fire_timer();
    h.respond(&media(6, 6, 3, true));

    assert!(h.loader.media().unwrap().end_list);
    assert_eq!(h.schedule_count(), scheduled);
}

#[test]
fn refresh_failure_does_not_rearm() {
    let mut h = Harness::with_live_a();
    let scheduled = h.schedule_count();
    h.fire_timer();
    h.respond_status(500);

    assert_eq!(h.loader.state(), LoaderState::HaveMetadata);
    let events = h.drain_events();
    let info = error_info(&events[0]);
    assert_eq!(info.uri, "a.m3u8");
    assert_eq!(info.status, Some(500));
    assert_eq!(info.severity, Severity::Fatal);
    assert_eq!(info.body.as_deref(), Some("not found"));
    assert_eq!(h.schedule_count(), scheduled);

    // the caller resumes polling explicitly
    h.loader.refresh_now().unwrap();
    h.respond(&media(6, 6, 3, false));
    assert_eq!(h.schedule_count(), scheduled + 1);
}

#[test]
fn unparsable_refresh_is_recoverable() {
    let mut h = Harness::with_live_a();
    h.fire_timer();
    h.respond("<html>gateway</html>");

    let events = h.drain_events();
    let info = error_info(&events[0]);
    assert_eq!(info.status, Some(200));
    assert_eq!(info.severity, Severity::Recoverable);
    assert_eq!(h.loader.media().unwrap().media_sequence, 5);
}

#[test]
fn master_in_place_of_media_is_an_error() {
    let mut h = Harness::with_live_a();
    h.fire_timer();
    h.respond(MASTER);

    let events = h.drain_events();
    assert!(error_info(&events[0]).message.contains("master"));
}

#[test]
fn stale_timer_is_discarded() {
    let mut h = Harness::with_live_a();
    let (stale, _) = h.last_timer();

    h.loader.refresh_now().unwrap();
    assert!(h.cancelled().contains(&stale));
    let fetches = h.fetch_count();

    h.loader.handle_refresh_timer(stale);
    assert_eq!(h.fetch_count(), fetches);
}

#[test]
fn bandwidth_is_recorded() {
    let mut h = Harness::with_live_a();
    assert_eq!(h.loader.bandwidth(), None);

    h.fire_timer();
    let id = h.last_request().id;
    h.loader.handle_response(
        id,
        Ok(FetchResponse::ok(media(6, 6, 3, false)).with_bandwidth(2_500_000.0)),
    );
    assert_eq!(h.loader.bandwidth(), Some(2_500_000.0));
}

#[test]
fn expired_time_is_tracked_across_refreshes() {
    let mut h = Harness::with_live_a();
    h.loader.enable_expired_tracking();

    h.fire_timer();
    h.respond(&media(7, 6, 3, false));
    assert_eq!(h.loader.expired_seconds(), 12.0);

    h.fire_timer();
    h.respond(&media(8, 6, 3, false));
    assert_eq!(h.loader.expired_seconds(), 18.0);
}

#[test]
fn media_sequence_extremes() {
    let src = "http://example.com/live/index.m3u8";
    let config = LoaderConfig::default().with_expired_time_tracking(true);
    let mut h = Harness::new(src, config);
    h.loader.start().unwrap();
    h.respond(
        "#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXT-X-MEDIA-SEQUENCE:9223372036854775807\n\
         #EXTINF:6,\na.ts\n#EXTINF:6,\nb.ts\n",
    );

    assert_eq!(h.loader.state(), LoaderState::HaveMetadata);
    let active = h.loader.media().unwrap();
    assert_eq!(active.media_sequence, i64::MAX as u64);
    let uris: Vec<&str> = active.segments.iter().map(|s| s.uri.as_str()).collect();
    assert_eq!(uris, ["a.ts", "b.ts"]);

    h.fire_timer();
    h.respond("#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXT-X-MEDIA-SEQUENCE:18446744073709551615\n#EXTINF:6,\nc.ts\n");
    let active = h.loader.media().unwrap();
    assert_eq!(active.media_sequence, u64::MAX);
    assert_eq!(active.segments[0].uri, "c.ts");
    let expired = h.loader.expired_seconds();
    assert!(expired.is_finite() && expired > 0.0);

    // the sequence restarting is taken as is
    h.fire_timer();
    h.respond("#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXT-X-MEDIA-SEQUENCE:0\n#EXTINF:6,\nd.ts\n");
    let active = h.loader.media().unwrap();
    assert_eq!(active.media_sequence, 0);
    assert_eq!(active.segments.len(), 1);
    assert_eq!(active.segments[0].uri, "d.ts");
    assert_eq!(h.loader.expired_seconds(), expired);
    assert!(h.drain_events().iter().all(|e| !matches!(e, LoaderEvent::Error(_))));
}

#[test]
fn expired_time_is_not_tracked_by_default() {
    let mut h = Harness::with_live_a();
    h.fire_timer();
    h.respond(&media(7, 6, 3, false));
    assert_eq!(h.loader.expired_seconds(), 0.0);
}

// -----------------------------------------------------------------------------------------------
// Switching

#[test]
fn switch_to_active_rendition_is_a_noop() {
    let mut h = Harness::with_live_a();
    let fetches = h.fetch_count();

    h.loader.select_media("a.m3u8").unwrap();
    h.loader
        .select_media("http://example.com/live/a.m3u8")
        .unwrap();

    assert_eq!(h.fetch_count(), fetches);
    assert_eq!(h.loader.state(), LoaderState::HaveMetadata);
    assert!(h.drain_events().is_empty());
}

#[test]
fn duplicate_switch_issues_one_request() {
    let mut h = Harness::with_live_a();
    let fetches = h.fetch_count();

    h.loader.select_media("b.m3u8").unwrap();
    h.loader.select_media("b.m3u8").unwrap();

    assert_eq!(h.fetch_count(), fetches + 1);
    assert_eq!(
        h.drain_events(),
        vec![LoaderEvent::MediaChanging {
            from: "a.m3u8".to_string(),
            to: "b.m3u8".to_string()
        }]
    );
}

#[test]
fn switch_success() {
    let mut h = Harness::with_live_a();
    let (timer, _) = h.last_timer();

    h.loader.select_media("b.m3u8").unwrap();
    assert_eq!(h.loader.state(), LoaderState::SwitchingMedia);
    assert!(h.cancelled().contains(&timer));
    // still serving a until b arrives
    assert_eq!(h.loader.media().unwrap().uri, "a.m3u8");

    h.respond(&media(40, 4, 3, false));
    assert_eq!(h.loader.state(), LoaderState::HaveMetadata);
    assert_eq!(h.loader.media().unwrap().uri, "b.m3u8");
    assert_eq!(h.last_timer().1, Duration::from_millis(4000));
    assert_eq!(
        h.drain_events(),
        vec![
            LoaderEvent::MediaChanging {
                from: "a.m3u8".to_string(),
                to: "b.m3u8".to_string()
            },
            LoaderEvent::MediaChange {
                uri: "b.m3u8".to_string()
            },
        ]
    );
}

#[test]
fn switch_aborts_refresh_in_flight() {
    let mut h = Harness::with_live_a();
    h.fire_timer();
    let refresh = h.last_request().id;

    h.loader.select_media("b.m3u8").unwrap();
    assert!(h.aborted().contains(&refresh));

    // the aborted refresh completes anyway
    h.loader
        .handle_response(refresh, Ok(FetchResponse::ok(media(9, 6, 3, false))));
    assert_eq!(h.loader.state(), LoaderState::SwitchingMedia);
    assert_eq!(h.loader.media().unwrap().media_sequence, 5);
}

#[test]
fn superseded_switch_response_is_discarded() {
    let mut h = Harness::with_live_a();
    h.loader.select_media("b.m3u8").unwrap();
    let to_b = h.last_request().id;
    h.loader.select_media("c.m3u8").unwrap();
    assert!(h.aborted().contains(&to_b));

    h.loader
        .handle_response(to_b, Ok(FetchResponse::ok(media(1, 6, 3, false))));
    assert_eq!(h.loader.state(), LoaderState::SwitchingMedia);

    h.respond(&media(1, 6, 3, false));
    assert_eq!(h.loader.media().unwrap().uri, "c.m3u8");
    assert!(h.loader.master().unwrap().playlist("b.m3u8").unwrap().segments.is_empty());
    let events = h.drain_events();
    assert_eq!(
        events.last(),
        Some(&LoaderEvent::MediaChange {
            uri: "c.m3u8".to_string()
        })
    );
}

#[test]
fn switch_failure_reverts_and_resumes_refresh() {
    let mut h = Harness::with_live_a();
    h.loader.select_media("b.m3u8").unwrap();
    let scheduled = h.schedule_count();
    h.respond_status(404);

    assert_eq!(h.loader.state(), LoaderState::HaveMetadata);
    assert_eq!(h.loader.media().unwrap().uri, "a.m3u8");
    let events = h.drain_events();
    let info = error_info(&events[1]);
    assert_eq!(info.uri, "b.m3u8");
    assert_eq!(info.status, Some(404));
    assert_eq!(info.severity, Severity::Recoverable);

    assert_eq!(h.schedule_count(), scheduled + 1);
    assert_eq!(h.last_timer().1, Duration::from_millis(6000));
}

#[test]
fn first_load_failure_reverts_to_have_master() {
    let mut h = Harness::with_master();
    h.loader.select_media("a.m3u8").unwrap();
    h.respond_status(503);

    assert_eq!(h.loader.state(), LoaderState::HaveMaster);
    assert!(h.loader.media().is_none());
    let events = h.drain_events();
    assert_eq!(error_info(&events[0]).severity, Severity::Fatal);
    assert_eq!(h.schedule_count(), 0);

    // a later attempt still counts as the first load
    h.loader.select_media("a.m3u8").unwrap();
    h.respond(&media(5, 6, 3, false));
    assert_eq!(
        h.drain_events(),
        vec![LoaderEvent::LoadedMetadata {
            uri: "a.m3u8".to_string()
        }]
    );
}

#[test]
fn switch_to_complete_rendition_needs_no_request() {
    let mut h = Harness::with_master();
    h.loader.select_media("b.m3u8").unwrap();
    h.respond(&media(0, 10, 4, true));
    h.loader.select_media("a.m3u8").unwrap();
    h.respond(&media(5, 6, 3, false));
    h.drain_events();
    let (timer, _) = h.last_timer();
    let fetches = h.fetch_count();

    h.loader.select_media("b.m3u8").unwrap();

    assert_eq!(h.fetch_count(), fetches);
    assert_eq!(h.loader.state(), LoaderState::HaveMetadata);
    assert_eq!(h.loader.media().unwrap().uri, "b.m3u8");
    assert!(h.cancelled().contains(&timer));
    assert_eq!(
        h.drain_events(),
        vec![
            LoaderEvent::MediaChanging {
                from: "a.m3u8".to_string(),
                to: "b.m3u8".to_string()
            },
            LoaderEvent::MediaChange {
                uri: "b.m3u8".to_string()
            },
        ]
    );
}

#[test]
fn switching_back_keeps_merged_history() {
    let mut h = Harness::with_live_a();
    h.loader.select_media("b.m3u8").unwrap();
    h.respond(&media(0, 6, 2, false));
    h.loader.select_media("a.m3u8").unwrap();
    h.respond(&media(6, 6, 3, false));

    let a = h.loader.media().unwrap();
    assert_eq!(a.uri, "a.m3u8");
    assert_eq!(a.media_sequence, 6);
    assert_eq!(
        a.segments[0].resolved_uri.as_deref(),
        Some("http://example.com/live/seg6.ts")
    );
}

// -----------------------------------------------------------------------------------------------
// Usage errors

#[test]
fn select_before_master_is_a_usage_error() {
    let mut h = Harness::new(MASTER_URI, LoaderConfig::default());
    let err = h.loader.select_media("a.m3u8").unwrap_err();
    assert!(matches!(err, Error::Usage(UsageError::NoMaster { .. })));
    assert!(err.is_usage_error());
    assert_eq!(h.fetch_count(), 0);
}

#[test]
fn unknown_rendition_is_a_usage_error() {
    let mut h = Harness::with_live_a();
    let fetches = h.fetch_count();

    let err = h.loader.select_media("zzz.m3u8").unwrap_err();
    assert_eq!(
        err,
        Error::Usage(UsageError::UnknownPlaylist {
            uri: "zzz.m3u8".to_string()
        })
    );
    assert_eq!(h.fetch_count(), fetches);
    assert_eq!(h.loader.state(), LoaderState::HaveMetadata);
}

#[test]
fn refresh_without_active_rendition() {
    let mut h = Harness::with_master();
    assert!(matches!(
        h.loader.refresh_now(),
        Err(Error::Usage(UsageError::NoActivePlaylist))
    ));
}

// -----------------------------------------------------------------------------------------------
// Selection

#[test]
fn eligibility_follows_exclusions() {
    let mut h = Harness::with_live_a();
    assert_eq!(h.loader.eligible_count(), 3);
    // c is cheaper
    assert!(!h.loader.is_lowest_eligible());

    let until = Utc::now() + chrono::Duration::seconds(60);
    h.loader.exclude_playlist("c.m3u8", until).unwrap();
    assert_eq!(h.loader.eligible_count(), 2);
    assert!(h.loader.is_lowest_eligible());

    assert!(h.loader.exclude_playlist("zzz.m3u8", until).is_err());
}

// -----------------------------------------------------------------------------------------------
// Pause, resume and dispose

#[test]
fn pause_abandons_switch() {
    let mut h = Harness::with_live_a();
    h.loader.select_media("b.m3u8").unwrap();
    let to_b = h.last_request().id;

    h.loader.pause();
    assert_eq!(h.loader.state(), LoaderState::HaveMetadata);
    assert!(h.aborted().contains(&to_b));

    h.loader.resume().unwrap();
    assert_eq!(h.last_request().uri, "http://example.com/live/a.m3u8");
}

#[test]
fn resume_before_master_starts() {
    let mut h = Harness::new(MASTER_URI, LoaderConfig::default());
    h.loader.start().unwrap();
    h.loader.pause();
    assert_eq!(h.aborted(), vec![RequestId(0)]);

    h.loader.resume().unwrap();
    assert_eq!(h.fetch_count(), 2);
    assert_eq!(h.last_request().uri, MASTER_URI);
}

#[test]
fn dispose_cancels_everything() {
    let mut h = Harness::with_live_a();
    let (timer, _) = h.last_timer();

    h.loader.dispose();
    h.loader.dispose();
    assert!(h.loader.is_disposed());
    assert_eq!(h.cancelled(), vec![timer]);

    let fetches = h.fetch_count();
    h.loader.handle_refresh_timer(timer);
    assert_eq!(h.fetch_count(), fetches);
    assert!(matches!(
        h.loader.select_media("b.m3u8"),
        Err(Error::Usage(UsageError::Disposed))
    ));
    assert!(matches!(
        h.loader.resume(),
        Err(Error::Usage(UsageError::Disposed))
    ));
    let until = Utc::now() + chrono::Duration::seconds(60);
    assert!(matches!(
        h.loader.exclude_playlist("c.m3u8", until),
        Err(Error::Usage(UsageError::Disposed))
    ));
    assert_eq!(h.loader.eligible_count(), 3);
}

#[test]
fn response_after_dispose_is_discarded() {
    let mut h = Harness::new(MASTER_URI, LoaderConfig::default());
    h.loader.start().unwrap();
    h.loader.dispose();
    assert_eq!(h.aborted(), vec![RequestId(0)]);

    h.respond(MASTER);
    assert_eq!(h.loader.state(), LoaderState::Nothing);
    assert!(h.loader.master().is_none());
    assert!(h.drain_events().is_empty());
}
