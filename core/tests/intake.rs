//! Service intake tests: estimates, repeat detection, warranty flags,
//! ticket numbering.

use repairdesk_core::{
    clock::FixedClock,
    desk::Desk,
    error::DeskError,
    estimation::{Fault, WarrantyReason},
    service_desk::{Device, NewIntake, ServiceStatus},
};

fn build_with_device() -> (Desk, FixedClock, Device) {
    let (desk, clock) = Desk::build_test().expect("build test desk");
    let device = desk
        .services()
        .register_device("Priya Shah", "Phone, black, cracked corner", "front-desk")
        .expect("register device");
    (desk, clock, device)
}

fn intake(device: &Device, faults: &[&str]) -> NewIntake {
    NewIntake {
        device_id:      device.device_id.clone(),
        fault_ids:      faults.iter().map(|f| f.to_string()).collect(),
        staff_warranty: false,
    }
}

#[test]
fn first_intake_is_priced_and_numbered() {
    let (desk, _, device) = build_with_device();
    let outcome = desk
        .services()
        .create_intake(&intake(&device, &["flt-screen", "flt-battery", "flt-screen"]), "front-desk")
        .unwrap();

    let service = &outcome.service;
    assert_eq!(service.estimated_cost, 165.0, "duplicate screen counted once");
    assert_eq!(service.chargeable_amount, 165.0);
    assert_eq!(service.fault_ids, vec!["flt-screen".to_string(), "flt-battery".to_string()]);
    assert_eq!(service.ticket_number, "SRV-20240101-0001");
    assert_eq!(service.status, ServiceStatus::Received);
    assert!(!outcome.previous.is_repeated);
    assert!(outcome.previous.matching_fault_ids.is_empty());
    assert!(!service.warranty.is_warranty_repair);

    let stored = desk.services().service(&service.service_id).unwrap();
    assert_eq!(&stored, service);
}

#[test]
fn empty_selection_estimates_zero() {
    let (desk, _, device) = build_with_device();
    let outcome = desk.services().create_intake(&intake(&device, &[]), "front-desk").unwrap();
    assert_eq!(outcome.service.estimated_cost, 0.0);
}

/// Same fault as the last visit auto-flags a no-charge warranty repair.
#[test]
fn same_fault_repeat_is_warranty() {
    let (desk, clock, device) = build_with_device();
    let services = desk.services();
    let first = services
        .create_intake(&intake(&device, &["flt-screen", "flt-battery"]), "front-desk")
        .unwrap();

    clock.advance_days(10);
    let second = services
        .create_intake(&intake(&device, &["flt-battery", "flt-water"]), "front-desk")
        .unwrap();

    let info = &second.previous;
    assert!(info.is_repeated);
    assert!(info.has_fault_match);
    assert_eq!(info.matching_fault_ids, vec!["flt-battery".to_string()]);
    assert_eq!(info.days_since_last_service, Some(10));
    assert_eq!(info.last_service_id.as_deref(), Some(first.service.service_id.as_str()));

    let service = &second.service;
    assert!(service.warranty.is_warranty_repair);
    assert_eq!(service.warranty.reason, Some(WarrantyReason::SameFault));
    assert_eq!(service.estimated_cost, 125.0);
    assert_eq!(service.chargeable_amount, 0.0);
    assert_eq!(service.previous_service_id.as_deref(), Some(first.service.service_id.as_str()));

    assert_eq!(desk.store().events_of_type("warranty_flagged").unwrap().len(), 1);
}

/// A repeat visit without a shared fault is not flagged automatically.
#[test]
fn repeat_without_fault_match_is_not_flagged() {
    let (desk, clock, device) = build_with_device();
    let services = desk.services();
    services.create_intake(&intake(&device, &["flt-screen"]), "front-desk").unwrap();

    clock.advance_days(3);
    let second = services.create_intake(&intake(&device, &["flt-charging"]), "front-desk").unwrap();

    assert!(second.previous.is_repeated);
    assert!(!second.previous.has_fault_match);
    assert!(!second.service.warranty.is_warranty_repair);
    assert_eq!(second.service.warranty.reason, None);
    assert_eq!(second.service.chargeable_amount, 30.0);
}

/// Only the latest earlier service is compared.
#[test]
fn older_matching_service_is_ignored() {
    let (desk, clock, device) = build_with_device();
    let services = desk.services();
    services.create_intake(&intake(&device, &["flt-screen"]), "front-desk").unwrap();
    clock.advance_days(5);
    services.create_intake(&intake(&device, &["flt-speaker"]), "front-desk").unwrap();
    clock.advance_days(5);

    let third = services.create_intake(&intake(&device, &["flt-screen"]), "front-desk").unwrap();
    assert!(third.previous.is_repeated);
    assert!(!third.previous.has_fault_match);
    assert_eq!(third.previous.days_since_last_service, Some(5));
    assert!(!third.service.warranty.is_warranty_repair);
}

#[test]
fn staff_override_at_intake() {
    let (desk, _, device) = build_with_device();
    let services = desk.services();
    services.create_intake(&intake(&device, &["flt-screen"]), "front-desk").unwrap();

    let mut request = intake(&device, &["flt-camera"]);
    request.staff_warranty = true;
    let outcome = services.create_intake(&request, "branch-manager").unwrap();

    assert_eq!(outcome.service.warranty.reason, Some(WarrantyReason::StaffOverride));
    assert_eq!(outcome.service.chargeable_amount, 0.0);
    assert_eq!(outcome.service.estimated_cost, 65.0);
}

#[test]
fn staff_override_after_intake() {
    let (desk, _, device) = build_with_device();
    let services = desk.services();
    services.create_intake(&intake(&device, &["flt-screen"]), "front-desk").unwrap();
    let second = services.create_intake(&intake(&device, &["flt-speaker"]), "front-desk").unwrap();

    let updated = services.override_warranty(&second.service.service_id, "branch-manager").unwrap();
    assert_eq!(updated.warranty.reason, Some(WarrantyReason::StaffOverride));
    assert_eq!(updated.chargeable_amount, 0.0);

    let stored = services.service(&second.service.service_id).unwrap();
    assert_eq!(stored.warranty, updated.warranty);
}

#[test]
fn override_keeps_same_fault_reason() {
    let (desk, _, device) = build_with_device();
    let services = desk.services();
    services.create_intake(&intake(&device, &["flt-screen"]), "front-desk").unwrap();
    let second = services.create_intake(&intake(&device, &["flt-screen"]), "front-desk").unwrap();

    let updated = services.override_warranty(&second.service.service_id, "branch-manager").unwrap();
    assert_eq!(updated.warranty.reason, Some(WarrantyReason::SameFault));
}

#[test]
fn ticket_numbers_run_per_day() {
    let (desk, clock, device) = build_with_device();
    let services = desk.services();
    let tickets: Vec<String> = (0..3)
        .map(|_| {
            services
                .create_intake(&intake(&device, &["flt-software"]), "front-desk")
                .unwrap()
                .service
                .ticket_number
        })
        .collect();
    assert_eq!(tickets, ["SRV-20240101-0001", "SRV-20240101-0002", "SRV-20240101-0003"]);

    clock.advance_days(1);
    let next_day = services.create_intake(&intake(&device, &["flt-software"]), "front-desk").unwrap();
    assert_eq!(next_day.service.ticket_number, "SRV-20240102-0001");
}

#[test]
fn unknown_or_retired_fault_is_rejected() {
    let (desk, _, device) = build_with_device();
    desk.store()
        .upsert_fault(&Fault {
            fault_id:      "flt-retired".into(),
            name:          "Headphone jack".into(),
            default_price: 15.0,
            is_active:     false,
        })
        .unwrap();

    for fault in ["flt-nope", "flt-retired"] {
        let err = desk
            .services()
            .create_intake(&intake(&device, &["flt-screen", fault]), "front-desk")
            .unwrap_err();
        assert!(matches!(err, DeskError::Validation(_)), "{fault}: got {err:?}");
    }
    assert_eq!(desk.store().service_count().unwrap(), 0);
}

#[test]
fn unknown_device_is_not_found() {
    let (desk, _, _) = build_with_device();
    let err = desk
        .services()
        .create_intake(
            &NewIntake { device_id: "DEV-missing".into(), fault_ids: vec![], staff_warranty: false },
            "front-desk",
        )
        .unwrap_err();
    assert!(matches!(err, DeskError::NotFound { entity: "device", .. }), "got {err:?}");
}

/// Preview issues no writes.
#[test]
fn preview_matches_intake_without_persisting() {
    let (desk, _, device) = build_with_device();
    let services = desk.services();
    services.create_intake(&intake(&device, &["flt-water"]), "front-desk").unwrap();
    let events_before = desk.store().event_count().unwrap();

    let (estimate, info) = services.preview_intake(&intake(&device, &["flt-water", "flt-screen"])).unwrap();
    assert_eq!(estimate, 200.0);
    assert!(info.has_fault_match);
    assert_eq!(desk.store().service_count().unwrap(), 1);
    assert_eq!(desk.store().event_count().unwrap(), events_before);
}
