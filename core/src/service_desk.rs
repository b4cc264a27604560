//! Service desk: device intake, technician assignment, completion, rating.
//!
//! Intake prices the selected faults, compares them with the device's most
//! recent earlier service, and applies the warranty policy before the
//! service is persisted:
//!   - same fault as the last service  → warranty, `SAME_FAULT`, no charge
//!   - repeat visit without fault match → no flag unless staff override it
//!     (`STAFF_OVERRIDE`)
//!
//! Completion and rating feed the technician levelling engine.

use crate::{
    clock::Clock,
    config::DeskConfig,
    error::{DeskError, DeskResult},
    estimation::{self, Fault, PreviousServiceInfo, WarrantyStatus},
    event::DeskEvent,
    level_engine::TechnicianLevelEngine,
    store::DeskStore,
    technician::PointsAdjustment,
    types::{EntityId, Money},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub device_id:     EntityId,
    pub customer_name: String,
    pub description:   String,
    pub created_at:    DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Received,
    Assigned,
    Completed,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received  => "received",
            Self::Assigned  => "assigned",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "received"  => Some(Self::Received),
            "assigned"  => Some(Self::Assigned),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub service_id:          EntityId,
    pub ticket_number:       String,
    pub device_id:           EntityId,
    pub status:              ServiceStatus,
    pub fault_ids:           Vec<EntityId>,
    pub estimated_cost:      Money,
    /// Zero for warranty repairs.
    pub chargeable_amount:   Money,
    pub technician_id:       Option<EntityId>,
    pub warranty:            WarrantyStatus,
    pub previous_service_id: Option<EntityId>,
    pub rating:              Option<u8>,
    pub created_at:          DateTime<Utc>,
    pub completed_at:        Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewIntake {
    pub device_id:      EntityId,
    pub fault_ids:      Vec<EntityId>,
    /// Staff asked for warranty treatment regardless of fault match.
    #[serde(default)]
    pub staff_warranty: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeOutcome {
    pub service:  ServiceRecord,
    pub previous: PreviousServiceInfo,
}

pub struct ServiceDesk<'a> {
    store:  &'a DeskStore,
    config: &'a DeskConfig,
    clock:  &'a dyn Clock,
}

fn chargeable(estimate: Money, warranty: WarrantyStatus) -> Money {
    if warranty.is_warranty_repair { 0.0 } else { estimate }
}

impl<'a> ServiceDesk<'a> {
    pub fn new(store: &'a DeskStore, config: &'a DeskConfig, clock: &'a dyn Clock) -> Self {
        Self { store, config, clock }
    }

    fn technicians(&self) -> TechnicianLevelEngine<'a> {
        TechnicianLevelEngine::new(self.store, self.config, self.clock)
    }

    pub fn register_device(
        &self,
        customer_name: &str,
        description:   &str,
        actor:         &str,
    ) -> DeskResult<Device> {
        if customer_name.trim().is_empty() {
            return Err(DeskError::Validation("device customer_name is required".into()));
        }
        self.store.atomically(|store| {
            let now = self.clock.now();
            let device = Device {
                device_id:     format!("DEV-{}", Uuid::new_v4().simple()),
                customer_name: customer_name.trim().to_string(),
                description:   description.trim().to_string(),
                created_at:    now,
            };
            store.insert_device(&device)?;
            store.append_event(
                &DeskEvent::DeviceRegistered { device_id: device.device_id.clone() },
                actor,
                now,
            )?;
            Ok(device)
        })
    }

    /// `{prefix}-{YYYYMMDD}-{seq}`, sequential per prefix and day.
    fn next_ticket_number(&self, store: &DeskStore, now: DateTime<Utc>) -> DeskResult<String> {
        let numbering = &self.config.documents;
        let period = now.format("%Y%m%d").to_string();
        let seq = store.next_document_sequence(&numbering.service_prefix, &period)?;
        Ok(format!(
            "{}-{}-{:0width$}",
            numbering.service_prefix,
            period,
            seq,
            width = numbering.sequence_width
        ))
    }

    /// Resolve the selected ids against the catalog, keeping first-seen
    /// order and dropping duplicates.
    fn selected_faults(&self, store: &DeskStore, fault_ids: &[EntityId]) -> DeskResult<Vec<Fault>> {
        let mut seen = HashSet::new();
        let mut faults = Vec::new();
        for id in fault_ids {
            if !seen.insert(id.as_str()) {
                continue;
            }
            match store.find_fault(id)? {
                Some(f) if f.is_active => faults.push(f),
                Some(_) => {
                    return Err(DeskError::Validation(format!("fault '{id}' is no longer offered")))
                }
                None => return Err(DeskError::Validation(format!("unknown fault '{id}'"))),
            }
        }
        Ok(faults)
    }

    pub fn create_intake(&self, intake: &NewIntake, actor: &str) -> DeskResult<IntakeOutcome> {
        self.store.atomically(|store| {
            if store.find_device(&intake.device_id)?.is_none() {
                return Err(DeskError::not_found("device", intake.device_id.as_str()));
            }
            let faults = self.selected_faults(store, &intake.fault_ids)?;
            let fault_ids: Vec<EntityId> = faults.iter().map(|f| f.fault_id.clone()).collect();
            let now = self.clock.now();

            let estimated_cost = estimation::compute_estimate(&fault_ids, &faults);
            let history = store.device_history(&intake.device_id)?;
            let previous =
                estimation::detect_repeat_service(&intake.device_id, &fault_ids, &history, now);

            let mut warranty = estimation::auto_warranty(&previous);
            if intake.staff_warranty {
                warranty = estimation::staff_override(warranty);
            }

            let service = ServiceRecord {
                service_id:          format!("SVC-{}", Uuid::new_v4().simple()),
                ticket_number:       self.next_ticket_number(store, now)?,
                device_id:           intake.device_id.clone(),
                status:              ServiceStatus::Received,
                fault_ids,
                estimated_cost,
                chargeable_amount:   chargeable(estimated_cost, warranty),
                technician_id:       None,
                warranty,
                previous_service_id: previous.last_service_id.clone(),
                rating:              None,
                created_at:          now,
                completed_at:        None,
            };
            store.insert_service(&service, &faults)?;
            store.append_event(
                &DeskEvent::ServiceCreated {
                    service_id:     service.service_id.clone(),
                    ticket_number:  service.ticket_number.clone(),
                    device_id:      service.device_id.clone(),
                    estimated_cost: service.estimated_cost,
                    is_repeated:    previous.is_repeated,
                },
                actor,
                now,
            )?;
            if let Some(reason) = warranty.reason {
                store.append_event(
                    &DeskEvent::WarrantyFlagged { service_id: service.service_id.clone(), reason },
                    actor,
                    now,
                )?;
            }

            log::info!(
                "intake {} for device {}: estimate {:.2}, repeat={}, warranty={:?}",
                service.ticket_number,
                service.device_id,
                service.estimated_cost,
                previous.is_repeated,
                warranty.reason.map(|r| r.as_str())
            );
            Ok(IntakeOutcome { service, previous })
        })
    }

    /// Staff decision to treat an existing, not yet completed service as a
    /// warranty repair.
    pub fn override_warranty(&self, service_id: &str, actor: &str) -> DeskResult<ServiceRecord> {
        self.store.atomically(|store| {
            let mut service = store.get_service(service_id)?;
            if service.status == ServiceStatus::Completed {
                return Err(DeskError::InvalidState {
                    service_id: service_id.to_string(),
                    status:     service.status.as_str().to_string(),
                    expected:   "received or assigned",
                });
            }
            let updated = estimation::staff_override(service.warranty);
            if updated == service.warranty {
                return Ok(service);
            }
            service.warranty = updated;
            service.chargeable_amount = chargeable(service.estimated_cost, updated);
            store.update_service_warranty(service_id, updated, service.chargeable_amount)?;
            if let Some(reason) = updated.reason {
                store.append_event(
                    &DeskEvent::WarrantyFlagged { service_id: service_id.to_string(), reason },
                    actor,
                    self.clock.now(),
                )?;
            }
            Ok(service)
        })
    }

    pub fn assign_technician(
        &self,
        service_id:    &str,
        technician_id: &str,
        actor:         &str,
    ) -> DeskResult<ServiceRecord> {
        self.store.atomically(|store| {
            let mut service = store.get_service(service_id)?;
            if service.status != ServiceStatus::Received {
                return Err(DeskError::InvalidState {
                    service_id: service_id.to_string(),
                    status:     service.status.as_str().to_string(),
                    expected:   "received",
                });
            }
            let technician = store.get_technician(technician_id)?;
            let open_jobs = store.open_job_count(technician_id)?;
            if !technician.can_accept_job(open_jobs) {
                let reason = if technician.is_available {
                    format!("{open_jobs} of {} jobs already open", technician.max_concurrent_jobs)
                } else {
                    "marked unavailable".to_string()
                };
                return Err(DeskError::TechnicianUnavailable {
                    technician_id: technician_id.to_string(),
                    reason,
                });
            }

            store.assign_service(service_id, technician_id)?;
            store.append_event(
                &DeskEvent::TechnicianAssigned {
                    service_id:    service_id.to_string(),
                    technician_id: technician_id.to_string(),
                },
                actor,
                self.clock.now(),
            )?;
            service.status = ServiceStatus::Assigned;
            service.technician_id = Some(technician_id.to_string());
            Ok(service)
        })
    }

    /// Close out an assigned service and award the technician's points.
    pub fn complete_service(&self, service_id: &str, actor: &str) -> DeskResult<PointsAdjustment> {
        self.store.atomically(|store| {
            let service = store.get_service(service_id)?;
            let technician_id = match (service.status, service.technician_id) {
                (ServiceStatus::Assigned, Some(t)) => t,
                (status, _) => {
                    return Err(DeskError::InvalidState {
                        service_id: service_id.to_string(),
                        status:     status.as_str().to_string(),
                        expected:   "assigned",
                    })
                }
            };
            let now = self.clock.now();
            store.mark_service_completed(service_id, now)?;
            store.append_event(
                &DeskEvent::ServiceCompleted {
                    service_id:    service_id.to_string(),
                    technician_id: technician_id.clone(),
                },
                actor,
                now,
            )?;
            self.technicians().award_service_completion(&technician_id, service_id, actor)
        })
    }

    /// Customer rating on a completed service. One rating per service.
    pub fn rate_service(
        &self,
        service_id: &str,
        stars:      u8,
        actor:      &str,
    ) -> DeskResult<PointsAdjustment> {
        self.store.atomically(|store| {
            let service = store.get_service(service_id)?;
            if service.status != ServiceStatus::Completed {
                return Err(DeskError::InvalidState {
                    service_id: service_id.to_string(),
                    status:     service.status.as_str().to_string(),
                    expected:   "completed",
                });
            }
            if service.rating.is_some() {
                return Err(DeskError::Validation(format!("service '{service_id}' is already rated")));
            }
            let technician_id = service
                .technician_id
                .ok_or_else(|| DeskError::Validation(format!("service '{service_id}' has no technician")))?;

            let entry = self.technicians().apply_rating(&technician_id, service_id, stars, actor)?;
            store.set_service_rating(service_id, stars)?;
            store.append_event(
                &DeskEvent::ServiceRated {
                    service_id: service_id.to_string(),
                    technician_id,
                    stars,
                },
                actor,
                self.clock.now(),
            )?;
            Ok(entry)
        })
    }

    pub fn service(&self, service_id: &str) -> DeskResult<ServiceRecord> {
        self.store.get_service(service_id)
    }

    /// Read-only preview of what an intake would produce.
    pub fn preview_intake(&self, intake: &NewIntake) -> DeskResult<(Money, PreviousServiceInfo)> {
        if self.store.find_device(&intake.device_id)?.is_none() {
            return Err(DeskError::not_found("device", intake.device_id.as_str()));
        }
        let faults = self.selected_faults(self.store, &intake.fault_ids)?;
        let fault_ids: Vec<EntityId> = faults.iter().map(|f| f.fault_id.clone()).collect();
        let history = self.store.device_history(&intake.device_id)?;
        let info = estimation::detect_repeat_service(
            &intake.device_id,
            &fault_ids,
            &history,
            self.clock.now(),
        );
        Ok((estimation::compute_estimate(&fault_ids, &faults), info))
    }
}
