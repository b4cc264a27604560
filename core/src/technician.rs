//! Technician records: profile, points ledger entries, promotions.

use crate::types::{EntityId, Points};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicianProfile {
    pub technician_id:            EntityId,
    pub user_id:                  EntityId,
    pub name:                     String,
    pub total_points:             Points,
    /// Cached; recomputed after every points mutation.
    pub current_level_id:         EntityId,
    pub average_rating:           f64,
    pub rating_count:             u32,
    pub total_services_completed: u32,
    pub max_concurrent_jobs:      u32,
    pub is_available:             bool,
    pub created_at:               DateTime<Utc>,
}

impl TechnicianProfile {
    /// Whether another job fits next to `open_jobs` already assigned.
    pub fn can_accept_job(&self, open_jobs: u32) -> bool {
        self.is_available && open_jobs < self.max_concurrent_jobs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointsSource {
    ServiceCompletion,
    Rating,
    PromotionBonus,
    Manual,
}

impl PointsSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServiceCompletion => "service_completion",
            Self::Rating            => "rating",
            Self::PromotionBonus    => "promotion_bonus",
            Self::Manual            => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "service_completion" => Some(Self::ServiceCompletion),
            "rating"             => Some(Self::Rating),
            "promotion_bonus"    => Some(Self::PromotionBonus),
            "manual"             => Some(Self::Manual),
            _ => None,
        }
    }
}

/// One ledger line. The ledger sum per technician equals `total_points`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsAdjustment {
    pub entry_id:      EntityId,
    pub technician_id: EntityId,
    pub delta:         Points,
    pub source:        PointsSource,
    pub reason:        String,
    pub actor:         String,
    pub service_id:    Option<EntityId>,
    pub created_at:    DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionRecord {
    pub promotion_id:  EntityId,
    pub technician_id: EntityId,
    pub from_level_id: EntityId,
    pub to_level_id:   EntityId,
    pub bonus_points:  Points,
    pub notes:         Option<String>,
    pub actor:         String,
    pub created_at:    DateTime<Utc>,
}

/// Row of the points leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub technician_id:            EntityId,
    pub name:                     String,
    pub total_points:             Points,
    pub level_code:               String,
    pub average_rating:           f64,
    pub total_services_completed: u32,
}
