//! desk-runner: headless runner for the repair desk.
//!
//! Usage:
//!   desk-runner --seed 12345 --intakes 60 --db desk.db
//!   desk-runner --db desk.db --ipc-mode < commands.jsonl

use anyhow::Result;
use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use repairdesk_core::{
    command::DeskCommand,
    desk::Desk,
    estimation::Fault,
    service_desk::{NewIntake, ServiceStatus},
    technician::TechnicianProfile,
};
use std::env;
use std::io::{self, BufRead, Write};

const TECHNICIAN_NAMES: &[&str] = &["Asha Rao", "Ravi Kumar", "Meera Iyer", "Tomas Berg", "Lena Fischer"];
const CUSTOMER_NAMES: &[&str] = &[
    "Priya Shah", "Daniel Okafor", "Sofia Marin", "Kenji Mori", "Amara Nwosu", "Jonas Weber",
    "Lucia Gomez", "Arjun Nair", "Hana Novak", "Omar Haddad",
];
const DEVICES: &[&str] = &["Phone", "Tablet", "Laptop", "Smartwatch"];

/// One line of IPC input: a desk command plus the acting user.
#[derive(serde::Deserialize)]
struct IpcRequest {
    #[serde(default = "default_actor")]
    actor:   String,
    #[serde(flatten)]
    command: DeskCommand,
}

fn default_actor() -> String {
    "ipc".to_string()
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let intakes = parse_arg(&args, "--intakes", 40usize);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or(":memory:");
    let data_dir = args
        .windows(2)
        .find(|w| w[0] == "--data-dir")
        .map(|w| w[1].as_str())
        .unwrap_or("./data");

    let desk = Desk::build(db, data_dir)?;

    if ipc_mode {
        run_ipc_loop(&desk)?;
    } else {
        println!("Repair desk: desk-runner");
        println!("  seed:      {seed}");
        println!("  intakes:   {intakes}");
        println!("  db:        {db}");
        println!("  data_dir:  {data_dir}");
        println!();
        run_demo(&desk, seed, intakes)?;
        print_summary(&desk)?;
    }

    Ok(())
}

fn run_ipc_loop(desk: &Desk) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<IpcRequest>(&buffer) {
            Ok(request) => match desk.execute(request.command, &request.actor) {
                Ok(outcome) => serde_json::json!({ "ok": true, "result": outcome }),
                Err(e) => serde_json::json!({ "ok": false, "error": e.to_string() }),
            },
            Err(e) => serde_json::json!({ "ok": false, "error": e.to_string() }),
        };
        writeln!(stdout, "{reply}")?;
        stdout.flush()?;
    }
    Ok(())
}

/// Drive a seeded day at the shop: staff technicians, take in devices,
/// assign and finish jobs, collect ratings.
fn run_demo(desk: &Desk, seed: u64, intakes: usize) -> Result<()> {
    let mut rng = Pcg64Mcg::seed_from_u64(seed);
    let technicians = desk.technicians();
    let services = desk.services();

    let mut staff: Vec<TechnicianProfile> = Vec::new();
    for (i, name) in TECHNICIAN_NAMES.iter().enumerate() {
        let user_id = format!("user-{}", i + 1);
        let max_jobs = rng.gen_range(1..=3);
        // A file-backed desk keeps its staff between runs.
        let tech = match desk.store().technician_by_user(&user_id)? {
            Some(existing) => existing,
            None => technicians.register_technician(&user_id, name, Some(max_jobs), "admin")?,
        };
        staff.push(tech);
    }

    let mut devices = Vec::new();
    for name in CUSTOMER_NAMES {
        let kind = DEVICES.choose(&mut rng).copied().unwrap_or("Phone");
        devices.push(services.register_device(name, kind, "front-desk")?.device_id);
    }

    let catalog: Vec<Fault> = desk.store().all_faults()?.into_iter().filter(|f| f.is_active).collect();
    if catalog.is_empty() {
        anyhow::bail!("fault catalog has no active faults");
    }

    for _ in 0..intakes {
        let Some(device_id) = devices.choose(&mut rng).cloned() else { break };
        let fault_count = rng.gen_range(1..=2);
        let fault_ids = catalog
            .choose_multiple(&mut rng, fault_count)
            .map(|f| f.fault_id.clone())
            .collect();
        let intake = NewIntake { device_id, fault_ids, staff_warranty: rng.gen_bool(0.05) };
        let outcome = services.create_intake(&intake, "front-desk")?;

        let mut order: Vec<&TechnicianProfile> = staff.iter().collect();
        order.shuffle(&mut rng);
        for tech in order {
            match services.assign_technician(&outcome.service.service_id, &tech.technician_id, "lead") {
                Ok(_) => break,
                Err(e) => log::debug!("{}: {e}", tech.name),
            }
        }

        // Finish some open work so technicians free up.
        for service in desk.store().services_in_status(ServiceStatus::Assigned)? {
            if !rng.gen_bool(0.6) {
                continue;
            }
            services.complete_service(&service.service_id, "lead")?;
            if rng.gen_bool(0.7) {
                let stars = *[5u8, 5, 4, 4, 4, 3, 2, 1].choose(&mut rng).unwrap_or(&4);
                services.rate_service(&service.service_id, stars, "customer")?;
            }
        }
    }

    // Review: promote anyone the level table says has outgrown their tier.
    for tech in &staff {
        if let Some(candidate) = technicians.promotion_eligibility(&tech.technician_id)? {
            technicians.promote(&tech.technician_id, &candidate.level.level_id, Some("end of run review"), "admin")?;
        }
    }
    Ok(())
}

fn print_summary(desk: &Desk) -> Result<()> {
    let store = desk.store();
    let technicians = desk.technicians();

    println!("=== RUN SUMMARY ===");
    println!("  services:       {}", store.service_count()?);
    println!("  warranty jobs:  {}", store.warranty_service_count()?);
    println!("  open (recvd):   {}", store.services_in_status(ServiceStatus::Received)?.len());
    println!("  open (assgnd):  {}", store.services_in_status(ServiceStatus::Assigned)?.len());
    println!("  completed:      {}", store.services_in_status(ServiceStatus::Completed)?.len());
    println!("  events logged:  {}", store.event_count()?);

    println!();
    println!("=== LEADERBOARD ===");
    for (rank, entry) in technicians.leaderboard(10)?.iter().enumerate() {
        let balance = technicians.verify_ledger(&entry.technician_id)?;
        println!(
            "  {:>2}. {:<14} {:<9} {:>6} pts | rating {:.2} | ledger {}",
            rank + 1,
            entry.name,
            entry.level_code,
            entry.total_points,
            entry.average_rating,
            if balance.is_consistent() { "ok" } else { "MISMATCH" }
        );
    }
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
