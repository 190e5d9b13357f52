use super::error::DbError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of one horizontal partition.
pub type ShardId = u32;

/// Logical database a caller wants to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Target {
    Master,
    Shard(ShardId),
}

impl Target {
    pub fn is_shard(&self) -> bool {
        matches!(self, Target::Shard(_))
    }

    pub fn shard_id(&self) -> Option<ShardId> {
        match self {
            Target::Shard(id) => Some(*id),
            Target::Master => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Master => write!(f, "master"),
            Target::Shard(id) => write!(f, "shard-{}", id),
        }
    }
}

/// Which physical environment a handle lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// The write-capable primary host
    Primary,
    /// Read-only mirror at the given replica index
    Replica(usize),
}

/// Position of one connection handle inside the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub side: Side,
    pub target: Target,
}

impl Location {
    pub fn primary(target: Target) -> Self {
        Self {
            side: Side::Primary,
            target,
        }
    }

    pub fn replica(index: usize, target: Target) -> Self {
        Self {
            side: Side::Replica(index),
            target,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.side {
            Side::Primary => write!(f, "{}", self.target),
            Side::Replica(index) => write!(f, "replica-{}/{}", index, self.target),
        }
    }
}

/// Access mode requested by a repository.
///
/// Parses the short codes `W`, `R` and `BAK` as well as the long names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    Write,
    Read,
    Backup,
}

impl Mode {
    pub fn code(&self) -> &'static str {
        match self {
            Mode::Write => "W",
            Mode::Read => "R",
            Mode::Backup => "BAK",
        }
    }
}

impl FromStr for Mode {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "W" | "WRITE" => Ok(Mode::Write),
            "R" | "READ" => Ok(Mode::Read),
            "BAK" | "BACKUP" => Ok(Mode::Backup),
            _ => Err(DbError::InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Deterministic logical database names derived from a fixed prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseNaming {
    prefix: String,
}

impl DatabaseNaming {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn master(&self) -> String {
        format!("{}_master", self.prefix)
    }

    pub fn shard(&self, id: ShardId) -> String {
        format!("{}_shard_{}", self.prefix, id)
    }

    pub fn for_target(&self, target: Target) -> String {
        match target {
            Target::Master => self.master(),
            Target::Shard(id) => self.shard(id),
        }
    }
}

impl Default for DatabaseNaming {
    fn default() -> Self {
        Self::new("game")
    }
}
