//! Attribution metadata accumulated from contributing data sources.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Numeric id of one credit entry, as carried by metatiles and bound
/// layer definitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CreditId(pub u16);

/// One attribution entry surfaced to the UI.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Credit {
    pub id: CreditId,
    /// Human-readable notice, e.g. a copyright line.
    pub notice: String,
}

/// Map-wide credit table.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CreditRegistry {
    credits: HashMap<CreditId, Credit>,
}

impl CreditRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, credit: Credit) {
        self.credits.insert(credit.id, credit);
    }

    pub fn find(&self, id: CreditId) -> Option<&Credit> {
        self.credits.get(&id)
    }
}
