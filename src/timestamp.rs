//! Log-sequence timestamps
//!
//! Every oplog entry, data record and checkpoint is stamped with a
//! `Timestamp`: wall-clock seconds plus an increment that orders events
//! within the same second. Ordering is lexicographic on `(secs, inc)`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Totally ordered log-sequence timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    /// Seconds component
    #[serde(rename = "t")]
    pub secs: u32,
    /// Increment within the second
    #[serde(rename = "i")]
    pub inc: u32,
}

impl Timestamp {
    /// The null timestamp `(0, 0)`. Never assigned to a log entry.
    pub const NULL: Timestamp = Timestamp { secs: 0, inc: 0 };

    /// Lowest meaningful timestamp, `(0, 1)`. Used by the minValid sentinel.
    pub const MIN_VALID: Timestamp = Timestamp { secs: 0, inc: 1 };

    /// Create a timestamp
    pub const fn new(secs: u32, inc: u32) -> Self {
        Self { secs, inc }
    }

    /// Returns true for `(0, 0)`
    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    /// The timestamp one tick before this one, or `None` for `(0, 0)`.
    pub fn prev_tick(&self) -> Option<Timestamp> {
        if self.inc > 0 {
            Some(Timestamp::new(self.secs, self.inc - 1))
        } else if self.secs > 0 {
            Some(Timestamp::new(self.secs - 1, u32::MAX))
        } else {
            None
        }
    }

    /// The timestamp one tick after this one.
    ///
    /// Rolls into the next second when the increment is exhausted.
    pub fn next_tick(&self) -> Timestamp {
        match self.inc.checked_add(1) {
            Some(inc) => Timestamp::new(self.secs, inc),
            None => Timestamp::new(self.secs.saturating_add(1), 1),
        }
    }

    /// Encode as 8 bytes (secs LE, inc LE)
    pub fn to_le_bytes(&self) -> [u8; 8] {
        let mut buf = [0u8; 8];
        buf[0..4].copy_from_slice(&self.secs.to_le_bytes());
        buf[4..8].copy_from_slice(&self.inc.to_le_bytes());
        buf
    }

    /// Decode from 8 bytes written by `to_le_bytes`
    pub fn from_le_bytes(bytes: [u8; 8]) -> Self {
        let secs = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let inc = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Self { secs, inc }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({}, {})", self.secs, self.inc)
    }
}

/// Parses `secs,inc` or `secs:inc`, the form operators type on the command line.
impl FromStr for Timestamp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (secs, inc) = s
            .split_once(',')
            .or_else(|| s.split_once(':'))
            .ok_or_else(|| format!("expected SECS,INC but got '{}'", s))?;
        let secs = secs
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid seconds '{}': {}", secs.trim(), e))?;
        let inc = inc
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid increment '{}': {}", inc.trim(), e))?;
        Ok(Self { secs, inc })
    }
}

/// Hands out strictly increasing timestamps driven by the wall clock.
///
/// Within one wall-clock second the increment ticks; if the clock goes
/// backwards the clock keeps ticking from the last issued value.
#[derive(Debug, Clone)]
pub struct LogicalClock {
    last: Timestamp,
}

impl LogicalClock {
    /// Create a clock that will only issue timestamps after `last`
    pub fn starting_after(last: Timestamp) -> Self {
        Self { last }
    }

    /// Last issued timestamp
    pub fn last(&self) -> Timestamp {
        self.last
    }

    /// Issue the next timestamp
    pub fn tick(&mut self) -> Timestamp {
        let wall = chrono::Utc::now().timestamp().clamp(0, u32::MAX as i64) as u32;
        let next = if wall > self.last.secs {
            Timestamp::new(wall, 1)
        } else {
            self.last.next_tick()
        };
        self.last = next;
        next
    }
}
