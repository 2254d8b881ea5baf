//! Binary outcome types shared by managed objects and their hooks.

use std::ops::BitOr;

/// Whether an operation modified state that needs to be persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Change {
    Changed,
    #[default]
    Unchanged,
}

impl Change {
    pub fn is_changed(self) -> bool {
        self == Change::Changed
    }

    pub fn is_unchanged(self) -> bool {
        self == Change::Unchanged
    }
}

impl From<bool> for Change {
    fn from(changed: bool) -> Self {
        if changed {
            Change::Changed
        } else {
            Change::Unchanged
        }
    }
}

/// `Changed` if either side changed.
impl BitOr for Change {
    type Output = Change;

    fn bitor(self, rhs: Change) -> Change {
        Change::from(self.is_changed() || rhs.is_changed())
    }
}

/// Outcome of a write. There is no partial success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Success {
    Success,
    Failure,
}

impl Success {
    pub fn is_success(self) -> bool {
        self == Success::Success
    }

    pub fn is_failure(self) -> bool {
        self == Success::Failure
    }
}

impl From<bool> for Success {
    fn from(ok: bool) -> Self {
        if ok {
            Success::Success
        } else {
            Success::Failure
        }
    }
}
