//! # Watcher Options
//!
//! Everything a watcher needs, supplied once at construction.
//!
//! | Option | Default | Environment |
//! |--------|---------|-------------|
//! | `channel` | `studio.policies` | `POLICY_WATCHER_CHANNEL` |
//! | `local_id` | random UUID v4 | `POLICY_WATCHER_LOCAL_ID` |
//! | `ignore_self` | `false` | `POLICY_WATCHER_IGNORE_SELF` |
//! | `no_subscribe` | `false` | `POLICY_WATCHER_NO_SUBSCRIBE` |
//!
//! `transport` and `log` are mandatory. `engine` is mandatory unless a
//! custom `update_callback` replaces the default dispatcher.

use crate::dispatcher::{default_update_callback, UpdateCallback};
use crate::error::ConfigError;
use crate::log::WatcherLog;
use policy_bus::ChannelTransport;
use policy_types::PolicyEngine;
use std::env;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Channel used when none is configured.
pub const DEFAULT_CHANNEL: &str = "studio.policies";

/// Construction options for a [`Watcher`](crate::Watcher).
#[derive(Clone, Default)]
pub struct WatcherOptions {
    /// Broker connection. Shared, never owned by the watcher.
    pub transport: Option<Arc<dyn ChannelTransport>>,

    /// Local policy engine the default dispatcher applies changes to.
    pub engine: Option<Arc<dyn PolicyEngine>>,

    /// Channel every participating process agrees on.
    pub channel: String,

    /// Identifier stamped on outgoing messages.
    pub local_id: String,

    /// Drop messages this instance published itself.
    pub ignore_self: bool,

    /// Publish only; do not start a listener.
    pub no_subscribe: bool,

    /// Logger handle. Shared, never owned by the watcher.
    pub log: Option<Arc<dyn WatcherLog>>,

    /// Replaces the default dispatcher.
    pub update_callback: Option<UpdateCallback>,
}

impl WatcherOptions {
    /// Empty options; fill in with the `with_*` builders.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Options seeded from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `POLICY_WATCHER_CHANNEL`: Channel name (default: studio.policies)
    /// - `POLICY_WATCHER_LOCAL_ID`: Instance identifier (default: random)
    /// - `POLICY_WATCHER_IGNORE_SELF`: Drop own messages (default: false)
    /// - `POLICY_WATCHER_NO_SUBSCRIBE`: Publish only (default: false)
    pub fn from_env() -> Self {
        let flag = |name: &str| {
            env::var(name)
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(false)
        };

        Self {
            channel: env::var("POLICY_WATCHER_CHANNEL").unwrap_or_default(),
            local_id: env::var("POLICY_WATCHER_LOCAL_ID").unwrap_or_default(),
            ignore_self: flag("POLICY_WATCHER_IGNORE_SELF"),
            no_subscribe: flag("POLICY_WATCHER_NO_SUBSCRIBE"),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn ChannelTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn with_engine(mut self, engine: Arc<dyn PolicyEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    #[must_use]
    pub fn with_log(mut self, log: Arc<dyn WatcherLog>) -> Self {
        self.log = Some(log);
        self
    }

    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    #[must_use]
    pub fn with_local_id(mut self, local_id: impl Into<String>) -> Self {
        self.local_id = local_id.into();
        self
    }

    #[must_use]
    pub fn ignore_self(mut self, ignore: bool) -> Self {
        self.ignore_self = ignore;
        self
    }

    #[must_use]
    pub fn no_subscribe(mut self, no_subscribe: bool) -> Self {
        self.no_subscribe = no_subscribe;
        self
    }

    #[must_use]
    pub fn with_callback(mut self, callback: UpdateCallback) -> Self {
        self.update_callback = Some(callback);
        self
    }

    /// Validate and fill in defaults.
    pub(crate) fn resolve(self) -> Result<ResolvedOptions, ConfigError> {
        let transport = self.transport.ok_or(ConfigError::MissingTransport)?;
        let log = self.log.ok_or(ConfigError::MissingLogger)?;

        let callback = match (self.update_callback, self.engine) {
            (Some(callback), _) => callback,
            (None, Some(engine)) => default_update_callback(engine, log.clone()),
            (None, None) => return Err(ConfigError::MissingEngine),
        };

        let channel = if self.channel.is_empty() {
            DEFAULT_CHANNEL.to_string()
        } else {
            self.channel
        };
        let local_id = if self.local_id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            self.local_id
        };

        Ok(ResolvedOptions {
            transport,
            log,
            channel,
            local_id,
            ignore_self: self.ignore_self,
            no_subscribe: self.no_subscribe,
            callback,
        })
    }
}

impl fmt::Debug for WatcherOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherOptions")
            .field("transport", &self.transport.is_some())
            .field("engine", &self.engine.is_some())
            .field("channel", &self.channel)
            .field("local_id", &self.local_id)
            .field("ignore_self", &self.ignore_self)
            .field("no_subscribe", &self.no_subscribe)
            .field("log", &self.log.is_some())
            .field("update_callback", &self.update_callback.is_some())
            .finish()
    }
}

/// Validated options with every default filled in.
pub(crate) struct ResolvedOptions {
    pub transport: Arc<dyn ChannelTransport>,
    pub log: Arc<dyn WatcherLog>,
    pub channel: String,
    pub local_id: String,
    pub ignore_self: bool,
    pub no_subscribe: bool,
    pub callback: UpdateCallback,
}
