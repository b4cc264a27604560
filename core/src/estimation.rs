//! Service estimation rules: estimate pricing, repeat-service detection,
//! and the warranty auto-flag policy.
//!
//! Everything here is pure: callers fetch the fault catalog and the
//! device's service history, pass them in, and persist the results.

use crate::types::{EntityId, Money};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fault {
    pub fault_id:      EntityId,
    pub name:          String,
    pub default_price: Money,
    #[serde(default = "default_active")]
    pub is_active:     bool,
}

fn default_active() -> bool {
    true
}

/// One earlier service on a device, as needed for repeat detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorService {
    pub service_id: EntityId,
    pub device_id:  EntityId,
    pub fault_ids:  Vec<EntityId>,
    pub created_at: DateTime<Utc>,
}

/// Derived per intake. Never persisted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PreviousServiceInfo {
    pub is_repeated:             bool,
    pub last_service_id:         Option<EntityId>,
    pub days_since_last_service: Option<i64>,
    pub matching_fault_ids:      Vec<EntityId>,
    pub has_fault_match:         bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarrantyReason {
    SameFault,
    StaffOverride,
}

impl WarrantyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SameFault     => "SAME_FAULT",
            Self::StaffOverride => "STAFF_OVERRIDE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "SAME_FAULT"     => Some(Self::SameFault),
            "STAFF_OVERRIDE" => Some(Self::StaffOverride),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WarrantyStatus {
    pub is_warranty_repair: bool,
    pub reason:             Option<WarrantyReason>,
}

impl WarrantyStatus {
    pub fn none() -> Self {
        Self::default()
    }
}

/// Sum of `default_price` over the selected faults. Each fault id counts
/// once; ids missing from the catalog contribute nothing.
pub fn compute_estimate(selected_fault_ids: &[EntityId], catalog: &[Fault]) -> Money {
    let selected: HashSet<&str> = selected_fault_ids.iter().map(String::as_str).collect();
    let mut counted: HashSet<&str> = HashSet::new();
    catalog
        .iter()
        .filter(|f| selected.contains(f.fault_id.as_str()))
        .filter(|f| counted.insert(f.fault_id.as_str()))
        .map(|f| f.default_price)
        .sum()
}

/// Compare a new intake against the most recent earlier service on the
/// same device. `history` is ordered most recent first; entries for other
/// devices are skipped.
pub fn detect_repeat_service(
    device_id:     &str,
    new_fault_ids: &[EntityId],
    history:       &[PriorService],
    now:           DateTime<Utc>,
) -> PreviousServiceInfo {
    let Some(last) = history.iter().find(|s| s.device_id == device_id) else {
        return PreviousServiceInfo::default();
    };

    let previous: HashSet<&str> = last.fault_ids.iter().map(String::as_str).collect();
    let mut seen: HashSet<&str> = HashSet::new();
    let matching_fault_ids: Vec<EntityId> = new_fault_ids
        .iter()
        .filter(|id| previous.contains(id.as_str()) && seen.insert(id.as_str()))
        .cloned()
        .collect();

    let elapsed = (now - last.created_at).num_seconds();
    PreviousServiceInfo {
        is_repeated:             true,
        last_service_id:         Some(last.service_id.clone()),
        days_since_last_service: Some(elapsed.div_euclid(SECONDS_PER_DAY)),
        has_fault_match:         !matching_fault_ids.is_empty(),
        matching_fault_ids,
    }
}

/// A same-fault repeat is the only condition that flags warranty
/// automatically.
pub fn auto_warranty(info: &PreviousServiceInfo) -> WarrantyStatus {
    if info.has_fault_match {
        WarrantyStatus { is_warranty_repair: true, reason: Some(WarrantyReason::SameFault) }
    } else {
        WarrantyStatus::none()
    }
}

/// Staff marking a repair as warranty by hand. An automatic same-fault
/// flag is kept as is.
pub fn staff_override(current: WarrantyStatus) -> WarrantyStatus {
    match current.reason {
        Some(WarrantyReason::SameFault) => current,
        _ => WarrantyStatus {
            is_warranty_repair: true,
            reason:             Some(WarrantyReason::StaffOverride),
        },
    }
}
