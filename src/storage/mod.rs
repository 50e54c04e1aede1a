mod conf;
mod enclosures;
mod entries;
mod feeds;
mod schema;
mod types;
mod watch;

pub use schema::Database;
pub use types::{
    Conf, Enclosure, Entry, Feed, FeedPreferences, FlagChanges, Link, LinkRel, SortOrder,
    StorageError,
};
pub use watch::{observe, ChangeNotifier, Table};
