//! Cached `Date` header value, refreshed in the background.

use arc_swap::ArcSwap;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const UPDATE_INTERVAL: Duration = Duration::from_millis(800);

/// Formats the HTTP date once per interval instead of once per response. Cloning shares the
/// value; the refresh task stops when the last clone is dropped.
#[derive(Debug, Clone)]
pub struct DateService {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    current: Arc<ArcSwap<Bytes>>,
    handle: JoinHandle<()>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn now() -> Bytes {
    let mut buf = faf_http_date::get_date_buff_no_key();
    faf_http_date::get_date_no_key(&mut buf);
    Bytes::from_owner(buf)
}

impl DateService {
    /// Starts the refresh task on the current tokio runtime.
    pub fn start() -> Self {
        Self::with_update_interval(UPDATE_INTERVAL)
    }

    pub fn with_update_interval(update_interval: Duration) -> Self {
        let current = Arc::new(ArcSwap::from_pointee(now()));
        let current_arc = Arc::clone(&current);

        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(update_interval).await;
                current_arc.store(Arc::new(now()));
            }
        });

        Self { inner: Arc::new(Inner { current, handle }) }
    }

    /// The current date, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
    pub fn current(&self) -> Bytes {
        self.inner.current.load().as_ref().clone()
    }
}
