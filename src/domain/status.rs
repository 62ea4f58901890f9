use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Item state bits. The integer encoding is persisted and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusFlag(i64);

impl StatusFlag {
    pub const NONE: StatusFlag = StatusFlag(0);
    pub const UNREAD: StatusFlag = StatusFlag(1);
    pub const STARRED: StatusFlag = StatusFlag(2);
    pub const DELETED: StatusFlag = StatusFlag(4);
    pub const UPDATED: StatusFlag = StatusFlag(8);

    pub const fn from_bits(bits: i64) -> Self {
        StatusFlag(bits)
    }

    pub const fn bits(self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn set(self, flags: StatusFlag) -> Self {
        StatusFlag(self.0 | flags.0)
    }

    #[must_use]
    pub const fn clear(self, flags: StatusFlag) -> Self {
        StatusFlag(self.0 & !flags.0)
    }

    /// True when every bit of `flags` is set.
    pub const fn has(self, flags: StatusFlag) -> bool {
        self.0 & flags.0 == flags.0
    }

    /// Builds the `(mask, expected)` pair for item listings: a row matches
    /// when `status & mask == expected`. Deleted items never match; unless
    /// `show_all` is requested only unread items do.
    pub const fn filter(show_all: bool) -> (StatusFlag, StatusFlag) {
        if show_all {
            (StatusFlag::DELETED, StatusFlag::NONE)
        } else {
            (
                StatusFlag(StatusFlag::DELETED.0 | StatusFlag::UNREAD.0),
                StatusFlag::UNREAD,
            )
        }
    }
}

impl BitOr for StatusFlag {
    type Output = StatusFlag;

    fn bitor(self, rhs: StatusFlag) -> StatusFlag {
        self.set(rhs)
    }
}

impl BitOrAssign for StatusFlag {
    fn bitor_assign(&mut self, rhs: StatusFlag) {
        *self = self.set(rhs);
    }
}

impl fmt::Display for StatusFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.has(StatusFlag::UNREAD) {
            names.push("unread");
        }
        if self.has(StatusFlag::STARRED) {
            names.push("starred");
        }
        if self.has(StatusFlag::DELETED) {
            names.push("deleted");
        }
        if self.has(StatusFlag::UPDATED) {
            names.push("updated");
        }
        if names.is_empty() {
            write!(f, "read")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}
