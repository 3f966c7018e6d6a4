use std::time::Duration;

// --- Loader Configuration ---
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Forwarded on every playlist request. `ReqwestFetcher` sends credentialed
    /// requests through a client that keeps cookies.
    pub with_credentials: bool,
    /// Used when a media playlist has no `#EXT-X-TARGETDURATION`.
    pub default_target_duration: Duration,
    /// No refresh is ever scheduled sooner than this.
    pub min_refresh_delay: Duration,
    /// Select the first rendition as soon as the master playlist is loaded.
    pub auto_select_first_variant: bool,
    /// Track expired live time from the first refresh on.
    pub track_expired_time: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            with_credentials: false,
            default_target_duration: Duration::from_secs(10),
            min_refresh_delay: Duration::from_millis(500),
            auto_select_first_variant: false,
            track_expired_time: false,
        }
    }
}

impl LoaderConfig {
    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = with_credentials;
        self
    }

    pub fn with_default_target_duration(mut self, duration: Duration) -> Self {
        self.default_target_duration = duration;
        self
    }

    pub fn with_min_refresh_delay(mut self, delay: Duration) -> Self {
        self.min_refresh_delay = delay;
        self
    }

    pub fn with_auto_select_first_variant(mut self, enabled: bool) -> Self {
        self.auto_select_first_variant = enabled;
        self
    }

    pub fn with_expired_time_tracking(mut self, enabled: bool) -> Self {
        self.track_expired_time = enabled;
        self
    }
}

// --- Runtime Configuration ---
#[cfg(feature = "runtime")]
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Capacity of the command channel into the loader task.
    pub command_buffer: usize,
    /// Per-request timeout for playlist fetches.
    pub request_timeout: Duration,
    pub user_agent: Option<String>,
}

#[cfg(feature = "runtime")]
impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command_buffer: 32,
            request_timeout: Duration::from_secs(15),
            user_agent: None,
        }
    }
}
