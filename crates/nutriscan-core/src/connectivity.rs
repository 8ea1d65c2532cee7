use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

use crate::source::ProductSource;

/// Cached belief about whether the service is reachable.
///
/// Only explicit refreshes change it. A failed lookup falls back to the cache
/// but leaves the belief alone, so one slow request doesn't flip the whole
/// session offline.
#[derive(Debug)]
pub struct ConnectivityBelief {
    online: AtomicBool,
    last_checked: Mutex<Option<DateTime<Utc>>>,
}

impl ConnectivityBelief {
    /// Starts out assuming the service is up
    pub fn new() -> Self {
        Self::with_initial(true)
    }

    pub fn with_initial(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
            last_checked: Mutex::new(None),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    pub fn set(&self, online: bool) {
        self.online.store(online, Ordering::Release);
        if let Ok(mut checked) = self.last_checked.lock() {
            *checked = Some(Utc::now());
        }
    }

    pub fn last_checked(&self) -> Option<DateTime<Utc>> {
        self.last_checked.lock().ok().and_then(|checked| *checked)
    }

    /// Probe the service and store the answer. A probe that outlives
    /// `timeout` counts as offline.
    pub async fn refresh(&self, source: &dyn ProductSource, timeout: Duration) -> bool {
        let online = match tokio::time::timeout(timeout, source.health_check()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                debug!("Health check failed: {}", e);
                false
            }
            Err(_) => {
                debug!("Health check timed out after {:?}", timeout);
                false
            }
        };

        if online != self.is_online() {
            info!(
                "Service is now {}",
                if online { "online" } else { "offline" }
            );
        }
        self.set(online);
        online
    }
}

impl Default for ConnectivityBelief {
    fn default() -> Self {
        Self::new()
    }
}
