use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// 消息投递目标（位标记）。`ALL = SELF | OTHERS`。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination(u8);

impl Destination {
    pub const NONE: Destination = Destination(0);
    /// 仅发送者本人
    pub const SELF: Destination = Destination(1);
    /// 频道内其他连接
    pub const OTHERS: Destination = Destination(2);
    pub const ALL: Destination = Destination(3);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: Destination) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl Default for Destination {
    fn default() -> Self {
        Self::ALL
    }
}

impl BitOr for Destination {
    type Output = Destination;

    fn bitor(self, rhs: Self) -> Self::Output {
        Destination(self.0 | rhs.0)
    }
}

impl BitOrAssign for Destination {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Destination {
    type Output = Destination;

    fn bitand(self, rhs: Self) -> Self::Output {
        Destination(self.0 & rhs.0)
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Destination::NONE => write!(f, "None"),
            Destination::SELF => write!(f, "Self"),
            Destination::OTHERS => write!(f, "Others"),
            Destination::ALL => write!(f, "All"),
            Destination(bits) => write!(f, "Destination({bits:#04b})"),
        }
    }
}
