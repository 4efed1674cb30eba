use std::fmt;

/// Lifetime counters kept by every spawn register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterStats {
    /// Objects constructed.
    pub spawned: u64,
    /// Pooled objects handed out instead of constructing.
    pub reused: u64,
    /// Releases that hid the object instead of destroying it.
    pub hidden: u64,
    pub destroyed: u64,
    pub forgotten: u64,
    /// Spawn attempts that produced no object.
    pub failed: u64,
}

impl fmt::Display for RegisterStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "spawned={} reused={} hidden={} destroyed={} forgotten={} failed={}",
            self.spawned, self.reused, self.hidden, self.destroyed, self.forgotten, self.failed
        )
    }
}
