//! Command dispatch: JSON in, outcome out, one transaction per command.

use repairdesk_core::{
    command::{CommandOutcome, DeskCommand},
    desk::Desk,
    error::DeskError,
};

fn cmd(json: &str) -> DeskCommand {
    serde_json::from_str(json).expect("valid command json")
}

#[test]
fn commands_parse_from_tagged_json() {
    assert_eq!(
        cmd(r#"{"cmd":"leaderboard"}"#),
        DeskCommand::Leaderboard { limit: 10 },
        "limit defaults to 10"
    );
    assert_eq!(
        cmd(r#"{"cmd":"rate_service","service_id":"SVC-1","stars":4}"#),
        DeskCommand::RateService { service_id: "SVC-1".into(), stars: 4 }
    );
    assert!(serde_json::from_str::<DeskCommand>(r#"{"cmd":"launch_rockets"}"#).is_err());
}

/// A full job driven only through commands.
#[test]
fn job_lifecycle_through_commands() {
    let (desk, _) = Desk::build_test().unwrap();

    let technician_id = match desk
        .execute(cmd(r#"{"cmd":"register_technician","user_id":"u-1","name":"Asha Rao"}"#), "admin")
        .unwrap()
    {
        CommandOutcome::Technician { technician } => technician.technician_id,
        other => panic!("unexpected outcome {other:?}"),
    };
    let device_id = match desk
        .execute(DeskCommand::RegisterDevice { customer_name: "Kenji Mori".into(), description: "Laptop".into() }, "front-desk")
        .unwrap()
    {
        CommandOutcome::Device { device } => device.device_id,
        other => panic!("unexpected outcome {other:?}"),
    };

    let service_id = match desk
        .execute(
            DeskCommand::CreateIntake {
                device_id,
                fault_ids: vec!["flt-battery".into(), "flt-charging".into()],
                staff_warranty: false,
            },
            "front-desk",
        )
        .unwrap()
    {
        CommandOutcome::Intake { service, previous } => {
            assert_eq!(service.estimated_cost, 75.0);
            assert!(!previous.is_repeated);
            service.service_id
        }
        other => panic!("unexpected outcome {other:?}"),
    };

    desk.execute(
        DeskCommand::AssignTechnician { service_id: service_id.clone(), technician_id: technician_id.clone() },
        "lead",
    )
    .unwrap();
    let completed = desk.execute(DeskCommand::CompleteService { service_id: service_id.clone() }, "lead").unwrap();
    assert!(matches!(completed, CommandOutcome::Points { ref entry } if entry.delta == 50));
    desk.execute(DeskCommand::RateService { service_id, stars: 4 }, "customer").unwrap();

    match desk.execute(DeskCommand::VerifyLedger { technician_id }, "admin").unwrap() {
        CommandOutcome::Ledger { balance } => {
            assert!(balance.is_consistent());
            assert_eq!(balance.total_points, 60);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn rejected_command_writes_nothing() {
    let (desk, _) = Desk::build_test().unwrap();
    let technician = match desk
        .execute(cmd(r#"{"cmd":"register_technician","user_id":"u-1","name":"Asha Rao"}"#), "admin")
        .unwrap()
    {
        CommandOutcome::Technician { technician } => technician,
        other => panic!("unexpected outcome {other:?}"),
    };
    let events_before = desk.store().event_count().unwrap();

    let err = desk
        .execute(
            DeskCommand::AdjustPoints { technician_id: technician.technician_id.clone(), delta: 10, reason: String::new() },
            "admin",
        )
        .unwrap_err();
    assert!(matches!(err, DeskError::Validation(_)), "got {err:?}");
    assert_eq!(desk.store().event_count().unwrap(), events_before);
    assert_eq!(desk.store().points_entry_count(&technician.technician_id).unwrap(), 0);
}

#[test]
fn outcomes_serialize_with_tag() {
    let json = serde_json::to_value(CommandOutcome::Done).unwrap();
    assert_eq!(json["outcome"], "done");
}
