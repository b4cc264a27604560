//! Assignment, completion, and rating: the service lifecycle and the
//! points it feeds into the technician ledger.

use repairdesk_core::{
    clock::FixedClock,
    desk::Desk,
    error::DeskError,
    service_desk::{NewIntake, ServiceRecord, ServiceStatus},
    technician::{PointsSource, TechnicianProfile},
};

struct Shop {
    desk:   Desk,
    _clock: FixedClock,
    device: String,
}

impl Shop {
    fn new() -> Self {
        let (desk, clock) = Desk::build_test().expect("build test desk");
        let device = desk
            .services()
            .register_device("Tomas Berg", "Tablet", "front-desk")
            .expect("register device")
            .device_id;
        Self { desk, _clock: clock, device }
    }

    fn technician(&self, user_id: &str, max_jobs: u32) -> TechnicianProfile {
        self.desk
            .technicians()
            .register_technician(user_id, user_id, Some(max_jobs), "admin")
            .unwrap()
    }

    fn intake(&self) -> ServiceRecord {
        self.desk
            .services()
            .create_intake(
                &NewIntake {
                    device_id:      self.device.clone(),
                    fault_ids:      vec!["flt-charging".into()],
                    staff_warranty: false,
                },
                "front-desk",
            )
            .unwrap()
            .service
    }

    fn completed_by(&self, tech: &TechnicianProfile) -> ServiceRecord {
        let service = self.intake();
        let services = self.desk.services();
        services.assign_technician(&service.service_id, &tech.technician_id, "lead").unwrap();
        services.complete_service(&service.service_id, "lead").unwrap();
        services.service(&service.service_id).unwrap()
    }
}

#[test]
fn assignment_moves_service_to_assigned() {
    let shop = Shop::new();
    let tech = shop.technician("user-1", 2);
    let service = shop.intake();

    let assigned = shop
        .desk
        .services()
        .assign_technician(&service.service_id, &tech.technician_id, "lead")
        .unwrap();
    assert_eq!(assigned.status, ServiceStatus::Assigned);
    assert_eq!(assigned.technician_id.as_deref(), Some(tech.technician_id.as_str()));
    assert_eq!(shop.desk.store().open_job_count(&tech.technician_id).unwrap(), 1);
}

#[test]
fn capacity_limit_blocks_further_assignments() {
    let shop = Shop::new();
    let tech = shop.technician("user-1", 1);
    let first = shop.intake();
    let second = shop.intake();
    let services = shop.desk.services();

    services.assign_technician(&first.service_id, &tech.technician_id, "lead").unwrap();
    let err = services
        .assign_technician(&second.service_id, &tech.technician_id, "lead")
        .unwrap_err();
    assert!(matches!(err, DeskError::TechnicianUnavailable { .. }), "got {err:?}");
    assert_eq!(services.service(&second.service_id).unwrap().status, ServiceStatus::Received);

    // Completing the first job frees the slot.
    services.complete_service(&first.service_id, "lead").unwrap();
    services.assign_technician(&second.service_id, &tech.technician_id, "lead").unwrap();
}

#[test]
fn unavailable_technician_is_rejected() {
    let shop = Shop::new();
    let tech = shop.technician("user-1", 3);
    shop.desk.technicians().set_availability(&tech.technician_id, false, "lead").unwrap();

    let service = shop.intake();
    let err = shop
        .desk
        .services()
        .assign_technician(&service.service_id, &tech.technician_id, "lead")
        .unwrap_err();
    match err {
        DeskError::TechnicianUnavailable { reason, .. } => assert!(reason.contains("unavailable")),
        other => panic!("expected TechnicianUnavailable, got {other:?}"),
    }
}

#[test]
fn completion_requires_assignment() {
    let shop = Shop::new();
    let service = shop.intake();
    let err = shop.desk.services().complete_service(&service.service_id, "lead").unwrap_err();
    assert!(matches!(err, DeskError::InvalidState { expected: "assigned", .. }), "got {err:?}");
}

/// Completion points scale with the level multiplier: 50 at bronze,
/// round(50 × 1.25) = 63 at silver.
#[test]
fn completion_points_follow_level_multiplier() {
    let shop = Shop::new();
    let tech = shop.technician("user-1", 3);

    let service = shop.completed_by(&tech);
    assert_eq!(service.status, ServiceStatus::Completed);
    assert!(service.completed_at.is_some());

    let engine = shop.desk.technicians();
    let entry = engine.points_history(&tech.technician_id).unwrap().remove(0);
    assert_eq!(entry.source, PointsSource::ServiceCompletion);
    assert_eq!(entry.delta, 50);
    assert_eq!(entry.service_id.as_deref(), Some(service.service_id.as_str()));

    engine.adjust_points(&tech.technician_id, 1000, "opening balance", "admin").unwrap();
    shop.completed_by(&tech);
    let last = engine.points_history(&tech.technician_id).unwrap().pop().unwrap();
    assert_eq!(last.delta, 63);

    let profile = engine.profile(&tech.technician_id).unwrap();
    assert_eq!(profile.total_services_completed, 2);
    assert_eq!(profile.total_points, 50 + 1000 + 63);
}

#[test]
fn rating_updates_average_and_points() {
    let shop = Shop::new();
    let tech = shop.technician("user-1", 3);
    let first = shop.completed_by(&tech);
    let second = shop.completed_by(&tech);
    let services = shop.desk.services();

    let entry = services.rate_service(&first.service_id, 5, "customer").unwrap();
    assert_eq!(entry.source, PointsSource::Rating);
    assert_eq!(entry.delta, 25);
    services.rate_service(&second.service_id, 2, "customer").unwrap();

    let profile = shop.desk.technicians().profile(&tech.technician_id).unwrap();
    assert_eq!(profile.rating_count, 2);
    assert!((profile.average_rating - 3.5).abs() < 1e-9, "average {}", profile.average_rating);
    assert_eq!(profile.total_points, 50 + 50 + 25 - 10);
    assert_eq!(services.service(&first.service_id).unwrap().rating, Some(5));
}

#[test]
fn service_is_rated_once() {
    let shop = Shop::new();
    let tech = shop.technician("user-1", 3);
    let service = shop.completed_by(&tech);
    let services = shop.desk.services();

    services.rate_service(&service.service_id, 4, "customer").unwrap();
    let err = services.rate_service(&service.service_id, 1, "customer").unwrap_err();
    assert!(matches!(err, DeskError::Validation(_)), "got {err:?}");
    assert_eq!(shop.desk.technicians().profile(&tech.technician_id).unwrap().rating_count, 1);
}

#[test]
fn open_service_cannot_be_rated() {
    let shop = Shop::new();
    let service = shop.intake();
    let err = shop.desk.services().rate_service(&service.service_id, 5, "customer").unwrap_err();
    assert!(matches!(err, DeskError::InvalidState { expected: "completed", .. }), "got {err:?}");
}

/// An out-of-range rating leaves no trace: no rating, no ledger entry, no event.
#[test]
fn out_of_range_rating_rolls_back() {
    let shop = Shop::new();
    let tech = shop.technician("user-1", 3);
    let service = shop.completed_by(&tech);
    let events_before = shop.desk.store().event_count().unwrap();

    for stars in [0, 6, 7] {
        let err = shop.desk.services().rate_service(&service.service_id, stars, "customer").unwrap_err();
        assert!(matches!(err, DeskError::Validation(_)), "{stars}: got {err:?}");
    }

    assert_eq!(shop.desk.services().service(&service.service_id).unwrap().rating, None);
    assert_eq!(shop.desk.store().points_entry_count(&tech.technician_id).unwrap(), 1);
    assert_eq!(shop.desk.store().event_count().unwrap(), events_before);
    assert!(shop.desk.technicians().verify_ledger(&tech.technician_id).unwrap().is_consistent());
}

#[test]
fn completed_service_cannot_be_overridden() {
    let shop = Shop::new();
    let tech = shop.technician("user-1", 3);
    let service = shop.completed_by(&tech);
    let err = shop.desk.services().override_warranty(&service.service_id, "manager").unwrap_err();
    assert!(matches!(err, DeskError::InvalidState { .. }), "got {err:?}");
}
