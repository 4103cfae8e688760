//! Badge delta tracking.
//!
//! The server reports absolute per-category counts ("12 posts pending").
//! A badge shows how many of those arrived since the user last opened the
//! category's listing page:
//!
//! ```text
//! visible[c] = max(0, raw[c] - watermark[c])
//! ```
//!
//! Watermarks are persisted in the durable store and set to the current raw
//! total whenever navigation enters the category's route.

mod category;
mod counts;
mod poller;
mod tracker;

pub use category::BadgeCategory;
pub use counts::{BadgeCounts, BadgeSummary, RawTotals, VisibleBadges, Watermarks};
pub use poller::BadgePoller;
pub use tracker::{BadgeSource, BadgeTracker};
