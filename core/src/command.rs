use crate::{
    estimation::PreviousServiceInfo,
    level::{PromotionCandidate, TechnicianLevel},
    level_engine::LedgerBalance,
    service_desk::{Device, ServiceRecord},
    technician::{LeaderboardEntry, PointsAdjustment, PromotionRecord, TechnicianProfile},
    types::{EntityId, Points},
};
use serde::{Deserialize, Serialize};

/// All commands the desk accepts from an outer surface (REST handler, runner).
/// Variants are added per feature and never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum DeskCommand {
    // ── Technicians ───────────────────────────────
    RegisterTechnician {
        user_id: EntityId,
        name:    String,
        #[serde(default)]
        max_concurrent_jobs: Option<u32>,
    },
    SetAvailability {
        technician_id: EntityId,
        is_available:  bool,
    },
    PromotionEligibility {
        technician_id: EntityId,
    },
    PromoteTechnician {
        technician_id: EntityId,
        to_level_id:   EntityId,
        #[serde(default)]
        notes:         Option<String>,
    },
    AdjustPoints {
        technician_id: EntityId,
        delta:         Points,
        reason:        String,
    },
    ConfigureLevels {
        levels: Vec<TechnicianLevel>,
    },
    VerifyLedger {
        technician_id: EntityId,
    },
    Leaderboard {
        #[serde(default = "default_leaderboard_limit")]
        limit: usize,
    },

    // ── Services ──────────────────────────────────
    RegisterDevice {
        customer_name: String,
        #[serde(default)]
        description:   String,
    },
    CreateIntake {
        device_id: EntityId,
        fault_ids: Vec<EntityId>,
        #[serde(default)]
        staff_warranty: bool,
    },
    OverrideWarranty {
        service_id: EntityId,
    },
    AssignTechnician {
        service_id:    EntityId,
        technician_id: EntityId,
    },
    CompleteService {
        service_id: EntityId,
    },
    RateService {
        service_id: EntityId,
        stars:      u8,
    },
}

fn default_leaderboard_limit() -> usize {
    10
}

impl DeskCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RegisterTechnician { .. }   => "register_technician",
            Self::SetAvailability { .. }      => "set_availability",
            Self::PromotionEligibility { .. } => "promotion_eligibility",
            Self::PromoteTechnician { .. }    => "promote_technician",
            Self::AdjustPoints { .. }         => "adjust_points",
            Self::ConfigureLevels { .. }      => "configure_levels",
            Self::VerifyLedger { .. }         => "verify_ledger",
            Self::Leaderboard { .. }          => "leaderboard",
            Self::RegisterDevice { .. }       => "register_device",
            Self::CreateIntake { .. }         => "create_intake",
            Self::OverrideWarranty { .. }     => "override_warranty",
            Self::AssignTechnician { .. }     => "assign_technician",
            Self::CompleteService { .. }      => "complete_service",
            Self::RateService { .. }          => "rate_service",
        }
    }
}

/// What a command produced, ready to hand back across the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandOutcome {
    Technician { technician: TechnicianProfile },
    Eligibility { candidate: Option<PromotionCandidate> },
    Promoted { promotion: PromotionRecord },
    Points { entry: PointsAdjustment },
    Ledger { balance: LedgerBalance },
    Leaderboard { entries: Vec<LeaderboardEntry> },
    Device { device: Device },
    Intake { service: ServiceRecord, previous: PreviousServiceInfo },
    Service { service: ServiceRecord },
    Done,
}
