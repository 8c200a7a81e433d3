use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::pricing::RateTable;

/// A courier company whose driver pool a request is matched into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Courier {
    pub id: Uuid,
    pub name: String,
    /// Custom per-km rates; `None` means the default table applies.
    pub rates: Option<RateTable>,
    pub created_at: DateTime<Utc>,
}
