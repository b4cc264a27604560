//! The desk owns the store, configuration and clock, and hands out the
//! rule engines that operate on them.
//!
//! RULES:
//!   - Every mutation goes through TechnicianLevelEngine or ServiceDesk.
//!   - Every command runs in one transaction; a rejected command leaves
//!     no ledger entry and no event behind.

use crate::{
    clock::{Clock, FixedClock, SystemClock},
    command::{CommandOutcome, DeskCommand},
    config::DeskConfig,
    error::DeskResult,
    level::validate_levels,
    level_engine::TechnicianLevelEngine,
    service_desk::{NewIntake, ServiceDesk},
    store::DeskStore,
};
use chrono::{TimeZone, Utc};

pub struct Desk {
    store:  DeskStore,
    config: DeskConfig,
    clock:  Box<dyn Clock>,
}

impl Desk {
    pub fn new(store: DeskStore, config: DeskConfig, clock: Box<dyn Clock>) -> Self {
        Self { store, config, clock }
    }

    /// Open the database, migrate, load configuration from `data_dir`, and
    /// sync the level table and fault catalog into the store.
    pub fn build(db_path: &str, data_dir: &str) -> DeskResult<Self> {
        let store = DeskStore::open(db_path)?;
        store.migrate()?;
        let config = DeskConfig::load(data_dir)?;
        let desk = Self::new(store, config, Box::new(SystemClock));
        desk.bootstrap()?;
        Ok(desk)
    }

    /// In-memory desk with test defaults, a fixed clock at
    /// 2024-01-01T09:00:00Z, and the default level table and catalog.
    pub fn build_test() -> DeskResult<(Self, FixedClock)> {
        let start = Utc
            .with_ymd_and_hms(2024, 1, 1, 9, 0, 0)
            .single()
            .ok_or_else(|| anyhow::anyhow!("invalid test clock start"))?;
        Self::build_test_with(DeskConfig::default_test(), FixedClock::at(start))
    }

    pub fn build_test_with(config: DeskConfig, clock: FixedClock) -> DeskResult<(Self, FixedClock)> {
        let store = DeskStore::in_memory()?;
        store.migrate()?;
        let desk = Self::new(store, config, Box::new(clock.clone()));
        desk.bootstrap()?;
        Ok((desk, clock))
    }

    /// Seed the level table on first run and upsert the fault catalog.
    /// A level table already in the store wins over the configured one;
    /// change it through `ConfigureLevels`.
    pub fn bootstrap(&self) -> DeskResult<()> {
        self.store.atomically(|store| {
            if store.levels()?.is_empty() {
                validate_levels(&self.config.levels)?;
                for level in &self.config.levels {
                    store.upsert_level(level)?;
                }
                log::info!("seeded {} technician levels", self.config.levels.len());
            }
            for fault in &self.config.faults {
                store.upsert_fault(fault)?;
            }
            Ok(())
        })
    }

    pub fn store(&self) -> &DeskStore {
        &self.store
    }

    pub fn config(&self) -> &DeskConfig {
        &self.config
    }

    pub fn technicians(&self) -> TechnicianLevelEngine<'_> {
        TechnicianLevelEngine::new(&self.store, &self.config, self.clock.as_ref())
    }

    pub fn services(&self) -> ServiceDesk<'_> {
        ServiceDesk::new(&self.store, &self.config, self.clock.as_ref())
    }

    /// Dispatch one command on behalf of `actor`.
    pub fn execute(&self, command: DeskCommand, actor: &str) -> DeskResult<CommandOutcome> {
        let name = command.name();
        let result = self.store.atomically(|_| self.dispatch(command, actor));
        match &result {
            Ok(_) => log::debug!("{actor}: {name} ok"),
            Err(e) => log::warn!("{actor}: {name} rejected: {e}"),
        }
        result
    }

    fn dispatch(&self, command: DeskCommand, actor: &str) -> DeskResult<CommandOutcome> {
        let technicians = self.technicians();
        let services = self.services();
        let outcome = match command {
            DeskCommand::RegisterTechnician { user_id, name, max_concurrent_jobs } => {
                let technician =
                    technicians.register_technician(&user_id, &name, max_concurrent_jobs, actor)?;
                CommandOutcome::Technician { technician }
            }
            DeskCommand::SetAvailability { technician_id, is_available } => {
                technicians.set_availability(&technician_id, is_available, actor)?;
                CommandOutcome::Technician { technician: technicians.profile(&technician_id)? }
            }
            DeskCommand::PromotionEligibility { technician_id } => CommandOutcome::Eligibility {
                candidate: technicians.promotion_eligibility(&technician_id)?,
            },
            DeskCommand::PromoteTechnician { technician_id, to_level_id, notes } => {
                let promotion =
                    technicians.promote(&technician_id, &to_level_id, notes.as_deref(), actor)?;
                CommandOutcome::Promoted { promotion }
            }
            DeskCommand::AdjustPoints { technician_id, delta, reason } => {
                let technician = technicians.adjust_points(&technician_id, delta, &reason, actor)?;
                CommandOutcome::Technician { technician }
            }
            DeskCommand::ConfigureLevels { levels } => {
                technicians.configure_levels(&levels, actor)?;
                CommandOutcome::Done
            }
            DeskCommand::VerifyLedger { technician_id } => CommandOutcome::Ledger {
                balance: technicians.verify_ledger(&technician_id)?,
            },
            DeskCommand::Leaderboard { limit } => CommandOutcome::Leaderboard {
                entries: technicians.leaderboard(limit)?,
            },
            DeskCommand::RegisterDevice { customer_name, description } => CommandOutcome::Device {
                device: services.register_device(&customer_name, &description, actor)?,
            },
            DeskCommand::CreateIntake { device_id, fault_ids, staff_warranty } => {
                let outcome = services.create_intake(
                    &NewIntake { device_id, fault_ids, staff_warranty },
                    actor,
                )?;
                CommandOutcome::Intake { service: outcome.service, previous: outcome.previous }
            }
            DeskCommand::OverrideWarranty { service_id } => CommandOutcome::Service {
                service: services.override_warranty(&service_id, actor)?,
            },
            DeskCommand::AssignTechnician { service_id, technician_id } => CommandOutcome::Service {
                service: services.assign_technician(&service_id, &technician_id, actor)?,
            },
            DeskCommand::CompleteService { service_id } => CommandOutcome::Points {
                entry: services.complete_service(&service_id, actor)?,
            },
            DeskCommand::RateService { service_id, stars } => CommandOutcome::Points {
                entry: services.rate_service(&service_id, stars, actor)?,
            },
        };
        Ok(outcome)
    }
}
