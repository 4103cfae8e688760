//! Per-category counters and the badge summary normalization boundary.

use serde::{Deserialize, Serialize};

use super::BadgeCategory;

/// One number per badge category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeCounts {
    pub posts: u64,
    pub services: u64,
    pub upgrade_requests: u64,
    pub messages: u64,
}

/// Server-reported absolute counts.
pub type RawTotals = BadgeCounts;

/// "Seen up to" values, one per category.
pub type Watermarks = BadgeCounts;

/// Unseen counts shown to the user.
pub type VisibleBadges = BadgeCounts;

impl BadgeCounts {
    pub fn get(&self, category: BadgeCategory) -> u64 {
        match category {
            BadgeCategory::Posts => self.posts,
            BadgeCategory::Services => self.services,
            BadgeCategory::UpgradeRequests => self.upgrade_requests,
            BadgeCategory::Messages => self.messages,
        }
    }

    pub fn set(&mut self, category: BadgeCategory, value: u64) {
        let slot = match category {
            BadgeCategory::Posts => &mut self.posts,
            BadgeCategory::Services => &mut self.services,
            BadgeCategory::UpgradeRequests => &mut self.upgrade_requests,
            BadgeCategory::Messages => &mut self.messages,
        };
        *slot = value;
    }

    /// `max(0, raw − watermark)` for every category.
    pub fn unseen(raw: &RawTotals, watermarks: &Watermarks) -> VisibleBadges {
        let mut visible = Self::default();
        for category in BadgeCategory::ALL {
            visible.set(
                category,
                raw.get(category).saturating_sub(watermarks.get(category)),
            );
        }
        visible
    }

    /// Sum over all categories.
    pub fn total(&self) -> u64 {
        BadgeCategory::ALL.into_iter().map(|c| self.get(c)).sum()
    }
}

/// Body of `GET /statistics/admin-badges`.
///
/// Keys arrive PascalCase or camelCase; missing keys read as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeSummary {
    #[serde(default, alias = "PendingPosts")]
    pub pending_posts: u64,
    #[serde(default, alias = "PendingServices")]
    pub pending_services: u64,
    #[serde(default, alias = "PendingUpgradeRequests")]
    pub pending_upgrade_requests: u64,
    #[serde(default, alias = "UnreadMessages")]
    pub unread_messages: u64,
}

impl From<BadgeSummary> for RawTotals {
    fn from(summary: BadgeSummary) -> Self {
        Self {
            posts: summary.pending_posts,
            services: summary.pending_services,
            upgrade_requests: summary.pending_upgrade_requests,
            messages: summary.unread_messages,
        }
    }
}
