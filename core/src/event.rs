//! The desk event log.
//!
//! RULE: Every mutation appends exactly one event per state change, inside
//! the same transaction as the change itself.

use crate::{
    estimation::WarrantyReason,
    types::{EntityId, Money, Points},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Variants are appended as features land and never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeskEvent {
    // ── Technicians ────────────────────────────────
    TechnicianRegistered {
        technician_id: EntityId,
        user_id:       EntityId,
        level_id:      EntityId,
    },
    AvailabilityChanged {
        technician_id: EntityId,
        is_available:  bool,
    },
    PointsAdjusted {
        technician_id: EntityId,
        entry_id:      EntityId,
        source:        String,
        delta:         Points,
        total_points:  Points,
    },
    LevelChanged {
        technician_id: EntityId,
        from_level_id: EntityId,
        to_level_id:   EntityId,
        total_points:  Points,
    },
    TechnicianPromoted {
        technician_id: EntityId,
        promotion_id:  EntityId,
        from_level_id: EntityId,
        to_level_id:   EntityId,
        bonus_points:  Points,
    },
    LevelsConfigured {
        level_count: usize,
    },

    // ── Services ───────────────────────────────────
    DeviceRegistered {
        device_id: EntityId,
    },
    ServiceCreated {
        service_id:     EntityId,
        ticket_number:  String,
        device_id:      EntityId,
        estimated_cost: Money,
        is_repeated:    bool,
    },
    WarrantyFlagged {
        service_id: EntityId,
        reason:     WarrantyReason,
    },
    TechnicianAssigned {
        service_id:    EntityId,
        technician_id: EntityId,
    },
    ServiceCompleted {
        service_id:    EntityId,
        technician_id: EntityId,
    },
    ServiceRated {
        service_id:    EntityId,
        technician_id: EntityId,
        stars:         u8,
    },
}

impl DeskEvent {
    /// Stable name for the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::TechnicianRegistered { .. } => "technician_registered",
            Self::AvailabilityChanged { .. }  => "availability_changed",
            Self::PointsAdjusted { .. }       => "points_adjusted",
            Self::LevelChanged { .. }         => "level_changed",
            Self::TechnicianPromoted { .. }   => "technician_promoted",
            Self::LevelsConfigured { .. }     => "levels_configured",
            Self::DeviceRegistered { .. }     => "device_registered",
            Self::ServiceCreated { .. }       => "service_created",
            Self::WarrantyFlagged { .. }      => "warranty_flagged",
            Self::TechnicianAssigned { .. }   => "technician_assigned",
            Self::ServiceCompleted { .. }     => "service_completed",
            Self::ServiceRated { .. }         => "service_rated",
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:         Option<i64>,
    pub event_type: String,
    pub actor:      String,
    pub payload:    String, // JSON-serialized DeskEvent
    pub created_at: DateTime<Utc>,
}
