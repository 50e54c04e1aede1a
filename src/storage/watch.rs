//! Reactive change notification for the cache.
//!
//! Every committing write bumps a per-table version counter; a subscription
//! re-runs its query on each bump and always yields the current value first.
//! Delivery is in-order per observer, and bursts of writes may coalesce into
//! a single re-evaluation (observers always converge on the latest state).

use std::future::Future;
use std::sync::Arc;

use futures::stream::Stream;
use tokio::sync::watch;

/// Cache tables that can be observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Feeds,
    Entries,
    Enclosures,
    Conf,
}

struct Inner {
    feeds: watch::Sender<u64>,
    entries: watch::Sender<u64>,
    enclosures: watch::Sender<u64>,
    conf: watch::Sender<u64>,
}

/// Per-table version counters shared by all clones of a [`Database`].
///
/// [`Database`]: super::Database
#[derive(Clone)]
pub struct ChangeNotifier {
    inner: Arc<Inner>,
}

impl ChangeNotifier {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                feeds: watch::channel(0).0,
                entries: watch::channel(0).0,
                enclosures: watch::channel(0).0,
                conf: watch::channel(0).0,
            }),
        }
    }

    fn sender(&self, table: Table) -> &watch::Sender<u64> {
        match table {
            Table::Feeds => &self.inner.feeds,
            Table::Entries => &self.inner.entries,
            Table::Enclosures => &self.inner.enclosures,
            Table::Conf => &self.inner.conf,
        }
    }

    /// Record a committed write to `table`.
    pub(crate) fn notify(&self, table: Table) {
        self.sender(table).send_modify(|version| *version += 1);
    }

    /// Subscribe to version bumps for `table`. The receiver's current value
    /// reflects the table's version at subscription time.
    pub fn subscribe(&self, table: Table) -> watch::Receiver<u64> {
        self.sender(table).subscribe()
    }
}

/// Turn a table subscription plus a query closure into a stream of query
/// results: the current value immediately, then one re-evaluation per
/// observed change. The stream ends if the notifier is dropped or the query
/// reports that its subject disappeared (`None`).
pub fn observe<T, F, Fut>(rx: watch::Receiver<u64>, query: F) -> impl Stream<Item = T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    futures::stream::unfold(
        (rx, query, true),
        |(mut rx, mut query, first)| async move {
            if !first {
                rx.changed().await.ok()?;
            }
            let value = query().await?;
            Some((value, (rx, query, false)))
        },
    )
}
