use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Marker on a stored state recording which aspect of the dynamics at that
/// state a model change invalidated. Flags combine; `DELETED` dominates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangeFlags(u8);

impl ChangeFlags {
    pub const NONE: ChangeFlags = ChangeFlags(0);
    pub const DELETED: ChangeFlags = ChangeFlags(1);
    pub const OBSERVATION_BEFORE: ChangeFlags = ChangeFlags(1 << 1);
    pub const OBSERVATION_AFTER: ChangeFlags = ChangeFlags(1 << 2);
    pub const REWARD_BEFORE: ChangeFlags = ChangeFlags(1 << 3);
    pub const REWARD_AFTER: ChangeFlags = ChangeFlags(1 << 4);
    pub const TRANSITION: ChangeFlags = ChangeFlags(1 << 5);

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: ChangeFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ChangeFlags {
    type Output = ChangeFlags;

    fn bitor(self, rhs: ChangeFlags) -> ChangeFlags {
        ChangeFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for ChangeFlags {
    fn bitor_assign(&mut self, rhs: ChangeFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for ChangeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let mut first = true;
        let mut put = |f: &mut fmt::Formatter<'_>, name: &str| -> fmt::Result {
            if !first {
                write!(f, "|")?;
            }
            first = false;
            write!(f, "{name}")
        };
        if self.contains(ChangeFlags::DELETED) {
            put(f, "deleted")?;
        }
        if self.contains(ChangeFlags::OBSERVATION_BEFORE) {
            put(f, "obs-before")?;
        }
        if self.contains(ChangeFlags::OBSERVATION_AFTER) {
            put(f, "obs-after")?;
        }
        if self.contains(ChangeFlags::REWARD_BEFORE) {
            put(f, "reward-before")?;
        }
        if self.contains(ChangeFlags::REWARD_AFTER) {
            put(f, "reward-after")?;
        }
        if self.contains(ChangeFlags::TRANSITION) {
            put(f, "transition")?;
        }
        Ok(())
    }
}
