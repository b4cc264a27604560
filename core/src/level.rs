//! Technician level tiers and the pure rules over them.
//!
//! A level table is an ordered list of tiers whose point ranges partition
//! the non-negative integers. Each tier is stored with an inclusive
//! `max_points` (or none for the top tier) and evaluated as a closed-open
//! `PointRange`, so boundary totals always land in exactly one tier.

use crate::{
    error::{DeskError, DeskResult},
    types::{EntityId, Money, Points},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicianLevel {
    pub level_id:          EntityId,
    pub code:              String,
    pub name:              String,
    pub min_points:        Points,
    /// Inclusive upper bound. `None` marks the open-ended top tier.
    pub max_points:        Option<Points>,
    pub points_multiplier: f64,
    pub incentive_percent: f64,
    /// Bonus granted once when a technician is promoted into this tier.
    #[serde(default)]
    pub promotion_bonus:   Points,
    pub sort_order:        i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointRange {
    /// `[start, end)`
    Bounded { start: Points, end: Points },
    /// `[start, +inf)`
    Open { start: Points },
}

impl PointRange {
    pub fn contains(&self, points: Points) -> bool {
        match *self {
            Self::Bounded { start, end } => start <= points && points < end,
            Self::Open { start }         => start <= points,
        }
    }

    pub fn start(&self) -> Points {
        match *self {
            Self::Bounded { start, .. } | Self::Open { start } => start,
        }
    }
}

impl TechnicianLevel {
    /// Fails when `max_points` has no successor (`i64::MAX`).
    pub fn range(&self) -> DeskResult<PointRange> {
        match self.max_points {
            Some(max) => {
                let end = max.checked_add(1).ok_or_else(|| {
                    DeskError::Configuration(format!(
                        "level '{}' max_points {max} is out of range",
                        self.code
                    ))
                })?;
                Ok(PointRange::Bounded { start: self.min_points, end })
            }
            None => Ok(PointRange::Open { start: self.min_points }),
        }
    }

    /// Incentive payable on `amount` at this tier.
    pub fn incentive_for(&self, amount: Money) -> Money {
        amount * self.incentive_percent / 100.0
    }
}

/// A technician's candidate tier for a manual promotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionCandidate {
    pub level:                  TechnicianLevel,
    pub points_above_threshold: Points,
}

fn sorted(levels: &[TechnicianLevel]) -> Vec<&TechnicianLevel> {
    let mut ordered: Vec<&TechnicianLevel> = levels.iter().collect();
    ordered.sort_by_key(|l| l.sort_order);
    ordered
}

/// Resolve the single tier whose range contains `total_points`.
///
/// A deficit total (below zero) is looked up as zero and holds the entry
/// tier; the stored total is never rewritten. Returns
/// `DeskError::Configuration` when no tier matches.
pub fn resolve_level(total_points: Points, levels: &[TechnicianLevel]) -> DeskResult<&TechnicianLevel> {
    let lookup = total_points.max(0);
    let mut found: Option<&TechnicianLevel> = None;
    for level in levels {
        if !level.range()?.contains(lookup) {
            continue;
        }
        if let Some(first) = found {
            return Err(DeskError::Configuration(format!(
                "levels '{}' and '{}' both cover {total_points} points",
                first.code, level.code
            )));
        }
        found = Some(level);
    }
    found.ok_or_else(|| DeskError::Configuration(format!("no level covers {total_points} points")))
}

/// Check that the tiers, ordered by `sort_order`, partition `[0, +inf)`:
/// first tier starts at 0, each tier starts right after the previous one
/// ends, and only the last tier is open-ended.
pub fn validate_levels(levels: &[TechnicianLevel]) -> DeskResult<()> {
    let ordered = sorted(levels);
    let Some(first) = ordered.first() else {
        return Err(DeskError::Configuration("level table is empty".into()));
    };
    if first.min_points != 0 {
        return Err(DeskError::Configuration(format!(
            "lowest level '{}' starts at {} instead of 0",
            first.code, first.min_points
        )));
    }

    let mut expected_start = 0;
    for (idx, level) in ordered.iter().enumerate() {
        let is_last = idx + 1 == ordered.len();
        if level.min_points != expected_start {
            return Err(DeskError::Configuration(format!(
                "level '{}' starts at {} but the previous level ends before {}",
                level.code, level.min_points, expected_start
            )));
        }
        match level.range()? {
            PointRange::Bounded { start, end } => {
                if end <= start {
                    return Err(DeskError::Configuration(format!(
                        "level '{}' has max_points below min_points",
                        level.code
                    )));
                }
                if is_last {
                    return Err(DeskError::Configuration(format!(
                        "top level '{}' must be open-ended",
                        level.code
                    )));
                }
                expected_start = end;
            }
            PointRange::Open { .. } => {
                if !is_last {
                    return Err(DeskError::Configuration(format!(
                        "level '{}' is open-ended but is not the top level",
                        level.code
                    )));
                }
            }
        }
    }

    let mut ids = std::collections::HashSet::new();
    let mut codes = std::collections::HashSet::new();
    for level in levels {
        if !ids.insert(level.level_id.as_str()) {
            return Err(DeskError::Configuration(format!(
                "duplicate level id '{}'",
                level.level_id
            )));
        }
        if !codes.insert(level.code.as_str()) {
            return Err(DeskError::Configuration(format!(
                "duplicate level code '{}'",
                level.code
            )));
        }
    }
    Ok(())
}

/// The highest tier reachable with `total_points` that sits strictly above
/// `current_level_id`. Promotions jump straight to that tier.
pub fn promotion_candidate(
    current_level_id: &str,
    total_points:     Points,
    levels:           &[TechnicianLevel],
) -> DeskResult<Option<PromotionCandidate>> {
    let current = find_level(current_level_id, levels)?;
    let candidate = sorted(levels)
        .into_iter()
        .filter(|l| l.sort_order > current.sort_order && l.min_points <= total_points)
        .last()
        .map(|l| PromotionCandidate {
            level:                  l.clone(),
            points_above_threshold: total_points - l.min_points,
        });
    Ok(candidate)
}

pub fn find_level<'a>(level_id: &str, levels: &'a [TechnicianLevel]) -> DeskResult<&'a TechnicianLevel> {
    levels
        .iter()
        .find(|l| l.level_id == level_id)
        .ok_or_else(|| DeskError::not_found("level", level_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(code: &str, min: Points, max: Option<Points>, order: i32) -> TechnicianLevel {
        TechnicianLevel {
            level_id:          code.to_lowercase(),
            code:              code.into(),
            name:              code.into(),
            min_points:        min,
            max_points:        max,
            points_multiplier: 1.0,
            incentive_percent: 5.0,
            promotion_bonus:   0,
            sort_order:        order,
        }
    }

    fn ladder() -> Vec<TechnicianLevel> {
        vec![
            level("BRONZE", 0, Some(999), 1),
            level("SILVER", 1000, Some(4999), 2),
            level("GOLD", 5000, None, 3),
        ]
    }

    #[test]
    fn tier_boundaries_resolve_to_one_level() {
        let levels = ladder();
        assert_eq!(resolve_level(999, &levels).unwrap().code, "BRONZE");
        assert_eq!(resolve_level(1000, &levels).unwrap().code, "SILVER");
        assert_eq!(resolve_level(4999, &levels).unwrap().code, "SILVER");
        assert_eq!(resolve_level(5000, &levels).unwrap().code, "GOLD");
        assert_eq!(resolve_level(i64::MAX / 2, &levels).unwrap().code, "GOLD");
    }

    #[test]
    fn every_total_lands_in_its_own_range() {
        let levels = ladder();
        for points in (0..7000).step_by(7) {
            let found = resolve_level(points, &levels).unwrap();
            assert!(found.range().unwrap().contains(points), "{points} outside {}", found.code);
        }
    }

    #[test]
    fn deficit_holds_entry_tier() {
        assert_eq!(resolve_level(-250, &ladder()).unwrap().code, "BRONZE");
    }

    #[test]
    fn gap_in_ranges_is_a_configuration_error() {
        let levels = vec![level("BRONZE", 0, Some(999), 1), level("GOLD", 2000, None, 2)];
        assert!(matches!(resolve_level(1500, &levels), Err(DeskError::Configuration(_))));
        assert!(matches!(validate_levels(&levels), Err(DeskError::Configuration(_))));
    }

    #[test]
    fn overlapping_ranges_fail_validation() {
        let levels = vec![level("BRONZE", 0, Some(1000), 1), level("SILVER", 1000, None, 2)];
        assert!(validate_levels(&levels).is_err());
        assert!(resolve_level(1000, &levels).is_err());
    }

    #[test]
    fn bounded_top_tier_fails_validation() {
        let levels = vec![level("BRONZE", 0, Some(999), 1), level("SILVER", 1000, Some(1999), 2)];
        assert!(validate_levels(&levels).is_err());
        assert!(validate_levels(&ladder()).is_ok());
    }

    #[test]
    fn max_points_without_successor_is_a_configuration_error() {
        let levels = vec![level("BRONZE", 0, Some(i64::MAX), 1), level("SILVER", 5, None, 2)];
        assert!(matches!(validate_levels(&levels), Err(DeskError::Configuration(_))));
        assert!(matches!(resolve_level(10, &levels), Err(DeskError::Configuration(_))));
    }

    #[test]
    fn duplicate_codes_fail_validation() {
        let mut levels = ladder();
        levels[1].code = "BRONZE".into();
        assert!(matches!(validate_levels(&levels), Err(DeskError::Configuration(_))));
    }

    #[test]
    fn candidate_skips_straight_to_highest_reachable_tier() {
        let levels = ladder();
        let candidate = promotion_candidate("bronze", 6200, &levels).unwrap().unwrap();
        assert_eq!(candidate.level.code, "GOLD");
        assert_eq!(candidate.points_above_threshold, 1200);
    }

    #[test]
    fn candidate_is_never_at_or_below_current() {
        let levels = ladder();
        assert!(promotion_candidate("silver", 4000, &levels).unwrap().is_none());
        assert!(promotion_candidate("gold", 9000, &levels).unwrap().is_none());
        assert!(promotion_candidate("silver", 500, &levels).unwrap().is_none());
    }

    #[test]
    fn incentive_is_a_percentage_of_amount() {
        let gold = level("GOLD", 5000, None, 3);
        assert!((gold.incentive_for(2000.0) - 100.0).abs() < 1e-9);
    }
}
