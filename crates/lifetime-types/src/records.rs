//! Per-object records exchanged between the staleness pass and the
//! allocation-site pass.
//!
//! Each record type is one line of its channel. Field order is the column
//! order on disk, so it must stay stable across releases.

use serde::{Deserialize, Serialize};

use crate::ids::{Incarnation, ObjectId, SiteId, Timestamp};

/// Full temporal record for an object that became unreachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessRecord {
    pub object: ObjectId,
    pub created: Timestamp,
    pub site: SiteId,
    pub last_use: Timestamp,
    pub unreachable: Timestamp,
    /// `unreachable - last_use`
    pub staleness: u64,
}

/// Last time an object was used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastUseRecord {
    pub object: ObjectId,
    pub created: Timestamp,
    pub last_use: Timestamp,
}

/// Time at which an object became permanently unreachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreachableRecord {
    pub object: ObjectId,
    pub created: Timestamp,
    pub unreachable: Timestamp,
}

/// Re-attribution of an object to another allocation site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteUpdateRecord {
    pub object: ObjectId,
    pub created: Timestamp,
    pub site: SiteId,
    pub time: Timestamp,
}

impl LastUseRecord {
    pub fn incarnation(&self) -> Incarnation {
        Incarnation::new(self.object, self.created)
    }
}

impl UnreachableRecord {
    pub fn incarnation(&self) -> Incarnation {
        Incarnation::new(self.object, self.created)
    }
}

impl SiteUpdateRecord {
    pub fn incarnation(&self) -> Incarnation {
        Incarnation::new(self.object, self.created)
    }
}
