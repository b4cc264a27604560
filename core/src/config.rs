use crate::{
    estimation::Fault,
    level::{validate_levels, TechnicianLevel},
    types::Points,
};
use serde::{Deserialize, Serialize};

// ── Technician levels ──────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct LevelsFile {
    levels: Vec<TechnicianLevel>,
}

// ── Points rules ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingPoints {
    pub stars:  u8,
    pub points: Points,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsRules {
    /// Points for a completed service before the level multiplier.
    pub service_completion_base: Points,
    /// Points per customer rating, one row per star value 1..=5.
    pub rating_points: Vec<RatingPoints>,
    pub default_max_concurrent_jobs: u32,
}

impl PointsRules {
    pub fn points_for_rating(&self, stars: u8) -> Option<Points> {
        self.rating_points
            .iter()
            .find(|r| r.stars == stars)
            .map(|r| r.points)
    }
}

// ── Fault catalog ──────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct FaultCatalogFile {
    faults: Vec<Fault>,
}

// ── Document numbering ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentNumbering {
    pub service_prefix: String,
    pub sequence_width: usize,
}

#[derive(Debug, Clone)]
pub struct DeskConfig {
    pub levels:    Vec<TechnicianLevel>,
    pub points:    PointsRules,
    pub faults:    Vec<Fault>,
    pub documents: DocumentNumbering,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
    serde_json::from_str(&content).map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))
}

impl DeskConfig {
    /// Load from the data/ directory.
    /// In tests, use DeskConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let levels_file: LevelsFile =
            read_json(&format!("{data_dir}/levels/technician_levels.json"))?;
        validate_levels(&levels_file.levels)?;

        let points: PointsRules = read_json(&format!("{data_dir}/points/points_rules.json"))?;
        for stars in 1..=5u8 {
            if points.points_for_rating(stars).is_none() {
                anyhow::bail!("points_rules.json has no rating_points row for {stars} stars");
            }
        }

        let fault_file: FaultCatalogFile =
            read_json(&format!("{data_dir}/faults/fault_catalog.json"))?;
        let documents: DocumentNumbering =
            read_json(&format!("{data_dir}/documents/numbering.json"))?;

        log::info!(
            "loaded config from {data_dir}: {} levels, {} faults",
            levels_file.levels.len(),
            fault_file.faults.len()
        );

        Ok(Self {
            levels: levels_file.levels,
            points,
            faults: fault_file.faults,
            documents,
        })
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        let level = |id: &str, code: &str, min: Points, max: Option<Points>, mult: f64, pct: f64, bonus: Points, order: i32| {
            TechnicianLevel {
                level_id:          id.into(),
                code:              code.into(),
                name:              format!("{}{}", &code[..1], code[1..].to_lowercase()),
                min_points:        min,
                max_points:        max,
                points_multiplier: mult,
                incentive_percent: pct,
                promotion_bonus:   bonus,
                sort_order:        order,
            }
        };
        let fault = |id: &str, name: &str, price: f64| Fault {
            fault_id:      id.into(),
            name:          name.into(),
            default_price: price,
            is_active:     true,
        };

        Self {
            levels: vec![
                level("lvl-bronze", "BRONZE", 0, Some(999), 1.0, 2.0, 0, 1),
                level("lvl-silver", "SILVER", 1000, Some(4999), 1.25, 4.0, 100, 2),
                level("lvl-gold", "GOLD", 5000, None, 1.5, 6.0, 250, 3),
            ],
            points: PointsRules {
                service_completion_base: 50,
                rating_points: vec![
                    RatingPoints { stars: 1, points: -20 },
                    RatingPoints { stars: 2, points: -10 },
                    RatingPoints { stars: 3, points: 0 },
                    RatingPoints { stars: 4, points: 10 },
                    RatingPoints { stars: 5, points: 25 },
                ],
                default_max_concurrent_jobs: 3,
            },
            faults: vec![
                fault("flt-screen", "Screen replacement", 120.0),
                fault("flt-battery", "Battery replacement", 45.0),
                fault("flt-charging", "Charging port repair", 30.0),
                fault("flt-water", "Water damage treatment", 80.0),
                fault("flt-speaker", "Speaker replacement", 25.0),
                fault("flt-camera", "Camera module replacement", 65.0),
                fault("flt-software", "Software reinstall", 20.0),
            ],
            documents: DocumentNumbering {
                service_prefix: "SRV".into(),
                sequence_width: 4,
            },
        }
    }
}
