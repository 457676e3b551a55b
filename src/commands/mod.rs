//! Command implementations behind the command line interface.
//!
//! Commands write their user facing output to a caller supplied writer.

pub mod add;
pub mod init;
pub mod list;
pub mod raw_feed;

pub use add::{add_feeds, find_free_name, slugify, AddOptions};
pub use init::init;
pub use list::list;
pub use raw_feed::raw_feed;
