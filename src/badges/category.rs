//! Badge categories and their listing routes.

use std::fmt;
use std::str::FromStr;

use crate::session::route_path;

/// A category of items that can show an unseen-count badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BadgeCategory {
    Posts,
    Services,
    UpgradeRequests,
    Messages,
}

impl BadgeCategory {
    pub const ALL: [Self; 4] = [
        Self::Posts,
        Self::Services,
        Self::UpgradeRequests,
        Self::Messages,
    ];

    /// Key of this category's watermark in the durable store.
    pub fn storage_key(self) -> &'static str {
        match self {
            Self::Posts => "viewedBadge.posts",
            Self::Services => "viewedBadge.services",
            Self::UpgradeRequests => "viewedBadge.upgradeRequests",
            Self::Messages => "viewedBadge.messages",
        }
    }

    /// The dedicated listing route; entering it acknowledges the badge.
    pub fn route(self) -> &'static str {
        match self {
            Self::Posts => "/admin/posts-approval",
            Self::Services => "/admin/services-approval",
            Self::UpgradeRequests => "/admin/upgrade-requests",
            Self::Messages => "/admin/chat",
        }
    }

    /// The category whose listing route is `route`, if any.
    pub fn from_route(route: &str) -> Option<Self> {
        let path = route_path(route);
        Self::ALL.into_iter().find(|c| c.route() == path)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Posts => "posts",
            Self::Services => "services",
            Self::UpgradeRequests => "upgrade-requests",
            Self::Messages => "messages",
        }
    }
}

impl fmt::Display for BadgeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BadgeCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "posts" => Ok(Self::Posts),
            "services" => Ok(Self::Services),
            "upgrade-requests" | "upgrades" => Ok(Self::UpgradeRequests),
            "messages" | "chat" => Ok(Self::Messages),
            other => Err(format!("unknown badge category: {other}")),
        }
    }
}
