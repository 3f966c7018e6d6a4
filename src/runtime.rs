//! Runs a [`PlaylistLoader`] on tokio.
//!
//! The loader lives in a single task. Requests and refresh timers are
//! spawned as their own tasks and report back over a channel, so the loader
//! is only ever touched from its task and never needs a lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tracing::{debug, trace, warn};

use crate::config::{LoaderConfig, RuntimeConfig};
use crate::error::{Result, UsageError};
use crate::events::LoaderEvent;
use crate::http::{
    FetchError, FetchRequest, FetchResponse, FetchResult, HttpClient, RefreshScheduler, RequestId,
    TimerId,
};
use crate::loader::{LoaderState, PlaylistLoader};
use crate::playlist::{ManifestParser, MediaPlaylist};

/// Performs one playlist GET.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    async fn fetch(&self, uri: &str, with_credentials: bool) -> FetchResult;
}

/// [`Fetcher`] backed by shared [`reqwest::Client`]s.
///
/// Credentialed requests go through a client with a cookie store, so cookies
/// set by the server are sent back on later playlist requests. Anonymous
/// requests never carry cookies.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    anonymous: reqwest::Client,
    credentialed: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(config: &RuntimeConfig) -> reqwest::Result<ReqwestFetcher> {
        Ok(ReqwestFetcher {
            anonymous: client_builder(config).build()?,
            credentialed: client_builder(config).cookie_store(true).build()?,
        })
    }

    /// Uses `anonymous` for plain requests and `credentialed` for requests
    /// made with credentials.
    pub fn with_clients(anonymous: reqwest::Client, credentialed: reqwest::Client) -> ReqwestFetcher {
        ReqwestFetcher {
            anonymous,
            credentialed,
        }
    }

    fn client(&self, with_credentials: bool) -> &reqwest::Client {
        if with_credentials {
            &self.credentialed
        } else {
            &self.anonymous
        }
    }
}

fn client_builder(config: &RuntimeConfig) -> reqwest::ClientBuilder {
    let builder = reqwest::Client::builder().timeout(config.request_timeout);
    match &config.user_agent {
        Some(user_agent) => builder.user_agent(user_agent.clone()),
        None => builder,
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, uri: &str, with_credentials: bool) -> FetchResult {
        let started = Instant::now();
        let response = self
            .client(with_credentials)
            .get(uri)
            .send()
            .await
            .map_err(|e| FetchError::new(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::new(e.to_string()))?;

        let elapsed = started.elapsed().as_secs_f64();
        let bandwidth = (elapsed > 0.0).then(|| body.len() as f64 * 8.0 / elapsed);
        trace!(uri, status, with_credentials, bytes = body.len(), "playlist response");

        Ok(FetchResponse {
            status,
            body,
            bandwidth,
        })
    }
}

#[derive(Debug)]
enum Completion {
    Response(RequestId, FetchResult),
    Timer(TimerId),
}

/// [`HttpClient`] that runs every request as a tokio task.
pub struct TokioHttp<F> {
    fetcher: Arc<F>,
    completions: mpsc::UnboundedSender<Completion>,
    in_flight: HashMap<RequestId, AbortHandle>,
}

impl<F: Fetcher> HttpClient for TokioHttp<F> {
    fn fetch(&mut self, request: FetchRequest) {
        self.in_flight.retain(|_, task| !task.is_finished());

        let fetcher = Arc::clone(&self.fetcher);
        let completions = self.completions.clone();
        let id = request.id;
        let task = tokio::spawn(async move {
            let result = fetcher.fetch(&request.uri, request.with_credentials).await;
            // The loader task is gone when this fails.
            let _ = completions.send(Completion::Response(request.id, result));
        });
        self.in_flight.insert(id, task.abort_handle());
    }

    fn abort(&mut self, id: RequestId) {
        if let Some(task) = self.in_flight.remove(&id) {
            task.abort();
        }
    }
}

/// [`RefreshScheduler`] backed by `tokio::time::sleep`.
pub struct TokioScheduler {
    completions: mpsc::UnboundedSender<Completion>,
    armed: HashMap<TimerId, AbortHandle>,
}

impl RefreshScheduler for TokioScheduler {
    fn schedule(&mut self, id: TimerId, delay: Duration) {
        self.armed.retain(|_, task| !task.is_finished());

        let completions = self.completions.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = completions.send(Completion::Timer(id));
        });
        self.armed.insert(id, task.abort_handle());
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(task) = self.armed.remove(&id) {
            task.abort();
        }
    }
}

/// A point-in-time view of a running loader.
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderSnapshot {
    pub state: LoaderState,
    /// The active rendition, segments included.
    pub media: Option<MediaPlaylist>,
    pub bandwidth: Option<f64>,
    pub expired_seconds: f64,
    pub eligible_count: usize,
}

enum Command {
    SelectMedia {
        uri: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Refresh {
        reply: oneshot::Sender<Result<()>>,
    },
    Pause,
    Resume {
        reply: oneshot::Sender<Result<()>>,
    },
    EnableExpiredTracking,
    Exclude {
        uri: String,
        until: DateTime<Utc>,
        reply: oneshot::Sender<Result<()>>,
    },
    Snapshot {
        reply: oneshot::Sender<LoaderSnapshot>,
    },
    Dispose,
}

/// Controls a loader spawned with [`spawn_loader`].
///
/// Cheap to clone. Once the loader is disposed every call fails with
/// [`UsageError::Disposed`].
#[derive(Debug, Clone)]
pub struct LoaderHandle {
    commands: mpsc::Sender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            Command::SelectMedia { .. } => "SelectMedia",
            Command::Refresh { .. } => "Refresh",
            Command::Pause => "Pause",
            Command::Resume { .. } => "Resume",
            Command::EnableExpiredTracking => "EnableExpiredTracking",
            Command::Exclude { .. } => "Exclude",
            Command::Snapshot { .. } => "Snapshot",
            Command::Dispose => "Dispose",
        };
        f.write_str(name)
    }
}

impl LoaderHandle {
    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| UsageError::Disposed.into())
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply)).await?;
        response.await.map_err(|_| UsageError::Disposed.into())
    }

    pub async fn select_media(&self, uri: impl Into<String>) -> Result<()> {
        let uri = uri.into();
        self.request(|reply| Command::SelectMedia { uri, reply }).await?
    }

    pub async fn refresh(&self) -> Result<()> {
        self.request(|reply| Command::Refresh { reply }).await?
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(Command::Pause).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.request(|reply| Command::Resume { reply }).await?
    }

    pub async fn enable_expired_tracking(&self) -> Result<()> {
        self.send(Command::EnableExpiredTracking).await
    }

    pub async fn exclude_playlist(&self, uri: impl Into<String>, until: DateTime<Utc>) -> Result<()> {
        let uri = uri.into();
        self.request(|reply| Command::Exclude { uri, until, reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<LoaderSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Stops the loader task. Calling it again is harmless.
    pub async fn dispose(&self) {
        let _ = self.commands.send(Command::Dispose).await;
    }
}

/// Spawns a loader for `src` using reqwest and the built-in m3u8 parser.
#[cfg(feature = "parser")]
pub fn spawn_loader(
    src: impl Into<String>,
    config: LoaderConfig,
    runtime: RuntimeConfig,
) -> Result<(LoaderHandle, mpsc::UnboundedReceiver<LoaderEvent>)> {
    let src = src.into();
    let fetcher = ReqwestFetcher::new(&runtime)
        .map_err(|e| crate::error::TransportError::network(src.clone(), e.to_string()))?;
    Ok(spawn_loader_with(
        src,
        fetcher,
        crate::parser::M3u8Parser,
        config,
        runtime,
    ))
}

/// Spawns a loader task for `src` and starts loading the master playlist.
///
/// Loader events arrive on the returned receiver in the order they happened.
/// The task ends when the loader is disposed or every handle is dropped.
pub fn spawn_loader_with<F, P>(
    src: impl Into<String>,
    fetcher: F,
    parser: P,
    config: LoaderConfig,
    runtime: RuntimeConfig,
) -> (LoaderHandle, mpsc::UnboundedReceiver<LoaderEvent>)
where
    F: Fetcher,
    P: ManifestParser + Send + 'static,
{
    let (completions_tx, completions) = mpsc::unbounded_channel();
    let (commands_tx, commands) = mpsc::channel(runtime.command_buffer.max(1));
    let (events_tx, events) = mpsc::unbounded_channel();

    let http = TokioHttp {
        fetcher: Arc::new(fetcher),
        completions: completions_tx.clone(),
        in_flight: HashMap::new(),
    };
    let scheduler = TokioScheduler {
        completions: completions_tx,
        armed: HashMap::new(),
    };
    let loader = PlaylistLoader::new(src, http, scheduler, parser, config);

    tokio::spawn(drive(loader, commands, completions, events_tx));
    (
        LoaderHandle {
            commands: commands_tx,
        },
        events,
    )
}

async fn drive<F, P>(
    mut loader: PlaylistLoader<TokioHttp<F>, TokioScheduler, P>,
    mut commands: mpsc::Receiver<Command>,
    mut completions: mpsc::UnboundedReceiver<Completion>,
    events: mpsc::UnboundedSender<LoaderEvent>,
) where
    F: Fetcher,
    P: ManifestParser,
{
    debug!(src = %loader.src(), "playlist loader task started");
    if let Err(e) = loader.start() {
        warn!(error = %e, "could not start playlist loader");
    }

    loop {
        forward_events(&mut loader, &events);

        tokio::select! {
            Some(completion) = completions.recv() => match completion {
                Completion::Response(id, result) => loader.handle_response(id, result),
                Completion::Timer(id) => loader.handle_refresh_timer(id),
            },
            command = commands.recv() => match command {
                Some(Command::Dispose) | None => break,
                Some(command) => apply(&mut loader, command),
            },
        }
    }

    loader.dispose();
    forward_events(&mut loader, &events);
    debug!(src = %loader.src(), "playlist loader task stopped");
}

fn apply<H, S, P>(loader: &mut PlaylistLoader<H, S, P>, command: Command)
where
    H: HttpClient,
    S: RefreshScheduler,
    P: ManifestParser,
{
    trace!(?command, "loader command");
    // A dropped reply receiver only means the caller stopped waiting.
    match command {
        Command::SelectMedia { uri, reply } => {
            let _ = reply.send(loader.select_media(&uri));
        }
        Command::Refresh { reply } => {
            let _ = reply.send(loader.refresh_now());
        }
        Command::Pause => loader.pause(),
        Command::Resume { reply } => {
            let _ = reply.send(loader.resume());
        }
        Command::EnableExpiredTracking => loader.enable_expired_tracking(),
        Command::Exclude { uri, until, reply } => {
            let _ = reply.send(loader.exclude_playlist(&uri, until));
        }
        Command::Snapshot { reply } => {
            let _ = reply.send(LoaderSnapshot {
                state: loader.state(),
                media: loader.media().cloned(),
                bandwidth: loader.bandwidth(),
                expired_seconds: loader.expired_seconds(),
                eligible_count: loader.eligible_count(),
            });
        }
        Command::Dispose => loader.dispose(),
    }
}

fn forward_events<H, S, P>(loader: &mut PlaylistLoader<H, S, P>, events: &mpsc::UnboundedSender<LoaderEvent>)
where
    H: HttpClient,
    S: RefreshScheduler,
    P: ManifestParser,
{
    while let Some(event) = loader.poll_event() {
        trace!(%event, "loader event");
        // Nobody listening is fine.
        let _ = events.send(event);
    }
}
