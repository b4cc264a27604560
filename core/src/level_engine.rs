//! Technician levelling engine: points, levels, promotions.
//!
//! Owns every write to a technician's standing. Each public mutation runs
//! as one immediate transaction: read the profile, apply the delta,
//! recompute the cached level, append the ledger entry, log the events.
//! Concurrent ratings and completions for the same technician therefore
//! serialise instead of losing updates.
//!
//! The cached level is always `resolve_level(total_points)` after a points
//! mutation. A promotion is the one path that sets the level explicitly;
//! eligibility is computed on demand and never stored.

use crate::{
    clock::Clock,
    config::DeskConfig,
    error::{DeskError, DeskResult},
    event::DeskEvent,
    level::{self, PromotionCandidate, TechnicianLevel},
    store::DeskStore,
    technician::{
        LeaderboardEntry, PointsAdjustment, PointsSource, PromotionRecord, TechnicianProfile,
    },
    types::{Money, Points},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ledger sum against the stored running total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerBalance {
    pub ledger_sum:   Points,
    pub total_points: Points,
}

impl LedgerBalance {
    pub fn is_consistent(&self) -> bool {
        self.ledger_sum == self.total_points
    }
}

pub struct TechnicianLevelEngine<'a> {
    store:  &'a DeskStore,
    config: &'a DeskConfig,
    clock:  &'a dyn Clock,
}

struct PointsChange<'r> {
    delta:      Points,
    source:     PointsSource,
    reason:     &'r str,
    service_id: Option<&'r str>,
    stars:      Option<u8>,
}

impl<'a> TechnicianLevelEngine<'a> {
    pub fn new(store: &'a DeskStore, config: &'a DeskConfig, clock: &'a dyn Clock) -> Self {
        Self { store, config, clock }
    }

    // ── Profiles ───────────────────────────────────────────────────

    /// Create the profile for a user who has just been given the technician
    /// role. Starts at zero points in the entry tier.
    pub fn register_technician(
        &self,
        user_id:             &str,
        name:                &str,
        max_concurrent_jobs: Option<u32>,
        actor:               &str,
    ) -> DeskResult<TechnicianProfile> {
        if user_id.trim().is_empty() || name.trim().is_empty() {
            return Err(DeskError::Validation("technician user_id and name are required".into()));
        }
        let max_jobs = max_concurrent_jobs.unwrap_or(self.config.points.default_max_concurrent_jobs);
        if max_jobs == 0 {
            return Err(DeskError::Validation("max_concurrent_jobs must be at least 1".into()));
        }

        self.store.atomically(|store| {
            if store.technician_by_user(user_id)?.is_some() {
                return Err(DeskError::Validation(format!(
                    "user '{user_id}' already has a technician profile"
                )));
            }
            let levels = store.levels()?;
            let entry = level::resolve_level(0, &levels)?;
            let now = self.clock.now();
            let profile = TechnicianProfile {
                technician_id:            format!("TECH-{}", Uuid::new_v4().simple()),
                user_id:                  user_id.to_string(),
                name:                     name.trim().to_string(),
                total_points:             0,
                current_level_id:         entry.level_id.clone(),
                average_rating:           0.0,
                rating_count:             0,
                total_services_completed: 0,
                max_concurrent_jobs:      max_jobs,
                is_available:             true,
                created_at:               now,
            };
            store.insert_technician(&profile)?;
            store.append_event(
                &DeskEvent::TechnicianRegistered {
                    technician_id: profile.technician_id.clone(),
                    user_id:       profile.user_id.clone(),
                    level_id:      profile.current_level_id.clone(),
                },
                actor,
                now,
            )?;
            log::info!("registered technician {} ({})", profile.technician_id, profile.name);
            Ok(profile)
        })
    }

    pub fn set_availability(
        &self,
        technician_id: &str,
        is_available:  bool,
        actor:         &str,
    ) -> DeskResult<()> {
        self.store.atomically(|store| {
            store.set_technician_availability(technician_id, is_available)?;
            store.append_event(
                &DeskEvent::AvailabilityChanged {
                    technician_id: technician_id.to_string(),
                    is_available,
                },
                actor,
                self.clock.now(),
            )
        })
    }

    // ── Levels ─────────────────────────────────────────────────────

    pub fn levels(&self) -> DeskResult<Vec<TechnicianLevel>> {
        self.store.levels()
    }

    /// Replace the level table. Profiles keep their cached level, so a
    /// lowered threshold shows up through `promotion_eligibility`.
    pub fn configure_levels(&self, levels: &[TechnicianLevel], actor: &str) -> DeskResult<()> {
        level::validate_levels(levels)?;
        self.store.atomically(|store| {
            let keep: Vec<&str> = levels.iter().map(|l| l.level_id.as_str()).collect();
            for profile in store.all_technicians()? {
                if !keep.contains(&profile.current_level_id.as_str()) {
                    return Err(DeskError::Configuration(format!(
                        "level '{}' is held by technician '{}' and cannot be removed",
                        profile.current_level_id, profile.technician_id
                    )));
                }
            }
            // Codes are unique; clear departing rows and park the rest
            // before upserting.
            store.prune_levels(&keep)?;
            store.park_level_codes()?;
            for l in levels {
                store.upsert_level(l)?;
            }
            store.append_event(
                &DeskEvent::LevelsConfigured { level_count: levels.len() },
                actor,
                self.clock.now(),
            )?;
            log::info!("level table replaced with {} levels", levels.len());
            Ok(())
        })
    }

    pub fn promotion_eligibility(&self, technician_id: &str) -> DeskResult<Option<PromotionCandidate>> {
        let profile = self.store.get_technician(technician_id)?;
        let levels = self.store.levels()?;
        level::promotion_candidate(&profile.current_level_id, profile.total_points, &levels)
    }

    /// Move a technician to a strictly higher level and grant that level's
    /// configured bonus. The total, bonus included, must reach the target's
    /// `min_points`. Never demotes.
    pub fn promote(
        &self,
        technician_id: &str,
        to_level_id:   &str,
        notes:         Option<&str>,
        actor:         &str,
    ) -> DeskResult<PromotionRecord> {
        self.store.atomically(|store| {
            let mut profile = store.get_technician(technician_id)?;
            let levels = store.levels()?;
            let current = level::find_level(&profile.current_level_id, &levels)?;
            let target = level::find_level(to_level_id, &levels).map_err(|_| {
                DeskError::InvalidPromotion {
                    technician_id: technician_id.to_string(),
                    reason:        format!("unknown level '{to_level_id}'"),
                }
            })?;
            if target.sort_order <= current.sort_order {
                return Err(DeskError::InvalidPromotion {
                    technician_id: technician_id.to_string(),
                    reason:        format!(
                        "target level '{}' is not above current level '{}'",
                        target.code, current.code
                    ),
                });
            }
            // Points must carry the target tier, or the next recompute
            // would drop the technician straight back down.
            let total_after_bonus = profile.total_points.saturating_add(target.promotion_bonus);
            if total_after_bonus < target.min_points {
                return Err(DeskError::InvalidPromotion {
                    technician_id: technician_id.to_string(),
                    reason:        format!(
                        "{total_after_bonus} points (bonus included) do not reach level '{}' at {}",
                        target.code, target.min_points
                    ),
                });
            }

            let now = self.clock.now();
            let from_level_id = profile.current_level_id.clone();
            let record = PromotionRecord {
                promotion_id:  format!("PROMO-{}", Uuid::new_v4().simple()),
                technician_id: technician_id.to_string(),
                from_level_id: from_level_id.clone(),
                to_level_id:   target.level_id.clone(),
                bonus_points:  target.promotion_bonus,
                notes:         notes.map(str::to_string).filter(|n| !n.trim().is_empty()),
                actor:         actor.to_string(),
                created_at:    now,
            };

            profile.current_level_id = target.level_id.clone();
            let reason = format!("promotion to {}", target.code);
            self.apply_change(
                store,
                &mut profile,
                &levels,
                PointsChange {
                    delta:      target.promotion_bonus,
                    source:     PointsSource::PromotionBonus,
                    reason:     &reason,
                    service_id: None,
                    stars:      None,
                },
                false,
                actor,
            )?;
            store.insert_promotion(&record)?;
            store.append_event(
                &DeskEvent::TechnicianPromoted {
                    technician_id: technician_id.to_string(),
                    promotion_id:  record.promotion_id.clone(),
                    from_level_id,
                    to_level_id:   record.to_level_id.clone(),
                    bonus_points:  record.bonus_points,
                },
                actor,
                now,
            )?;
            log::info!(
                "technician {technician_id} promoted {} -> {} (+{} bonus)",
                current.code,
                target.code,
                record.bonus_points
            );
            Ok(record)
        })
    }

    // ── Points ─────────────────────────────────────────────────────

    /// Manual adjustment by an admin. `delta` may be negative and the
    /// total is not floored, so a deficit stays visible.
    pub fn adjust_points(
        &self,
        technician_id: &str,
        delta:         Points,
        reason:        &str,
        actor:         &str,
    ) -> DeskResult<TechnicianProfile> {
        if reason.trim().is_empty() {
            return Err(DeskError::Validation("a reason is required for manual points adjustments".into()));
        }
        self.mutate_points(
            technician_id,
            PointsChange {
                delta,
                source:     PointsSource::Manual,
                reason:     reason.trim(),
                service_id: None,
                stars:      None,
            },
            actor,
        )
        .map(|(profile, _)| profile)
    }

    /// Points for a completed service, scaled by the technician's level.
    pub fn award_service_completion(
        &self,
        technician_id: &str,
        service_id:    &str,
        actor:         &str,
    ) -> DeskResult<PointsAdjustment> {
        self.store.atomically(|store| {
            let profile = store.get_technician(technician_id)?;
            let levels = store.levels()?;
            let current = level::find_level(&profile.current_level_id, &levels)?;
            let earned = (self.config.points.service_completion_base as f64
                * current.points_multiplier)
                .round() as Points;
            let reason = format!("service {service_id} completed");
            let (_, entry) = self.mutate_points(
                technician_id,
                PointsChange {
                    delta:      earned,
                    source:     PointsSource::ServiceCompletion,
                    reason:     &reason,
                    service_id: Some(service_id),
                    stars:      None,
                },
                actor,
            )?;
            Ok(entry)
        })
    }

    /// Record a 1–5 star customer rating: running average plus rating points.
    pub fn apply_rating(
        &self,
        technician_id: &str,
        service_id:    &str,
        stars:         u8,
        actor:         &str,
    ) -> DeskResult<PointsAdjustment> {
        let delta = self
            .config
            .points
            .points_for_rating(stars)
            .filter(|_| (1..=5).contains(&stars))
            .ok_or_else(|| DeskError::Validation(format!("rating must be 1-5 stars, got {stars}")))?;
        let reason = format!("{stars}-star rating on service {service_id}");
        self.mutate_points(
            technician_id,
            PointsChange {
                delta,
                source:     PointsSource::Rating,
                reason:     &reason,
                service_id: Some(service_id),
                stars:      Some(stars),
            },
            actor,
        )
        .map(|(_, entry)| entry)
    }

    fn mutate_points(
        &self,
        technician_id: &str,
        change:        PointsChange<'_>,
        actor:         &str,
    ) -> DeskResult<(TechnicianProfile, PointsAdjustment)> {
        self.store.atomically(|store| {
            let mut profile = store.get_technician(technician_id)?;
            let levels = store.levels()?;
            match change.source {
                PointsSource::ServiceCompletion => profile.total_services_completed += 1,
                PointsSource::Rating => {
                    if let Some(stars) = change.stars {
                        let count = profile.rating_count as f64;
                        profile.average_rating =
                            (profile.average_rating * count + stars as f64) / (count + 1.0);
                        profile.rating_count += 1;
                    }
                }
                PointsSource::PromotionBonus | PointsSource::Manual => {}
            }
            let entry = self.apply_change(store, &mut profile, &levels, change, true, actor)?;
            Ok((profile, entry))
        })
    }

    /// Append the ledger entry, move the running total, optionally
    /// recompute the cached level, persist, and log. Caller holds the
    /// transaction.
    fn apply_change(
        &self,
        store:     &DeskStore,
        profile:   &mut TechnicianProfile,
        levels:    &[TechnicianLevel],
        change:    PointsChange<'_>,
        recompute: bool,
        actor:     &str,
    ) -> DeskResult<PointsAdjustment> {
        let now = self.clock.now();
        let entry = PointsAdjustment {
            entry_id:      format!("PTS-{}", Uuid::new_v4().simple()),
            technician_id: profile.technician_id.clone(),
            delta:         change.delta,
            source:        change.source,
            reason:        change.reason.to_string(),
            actor:         actor.to_string(),
            service_id:    change.service_id.map(str::to_string),
            created_at:    now,
        };

        profile.total_points += change.delta;
        let previous_level = profile.current_level_id.clone();
        if recompute {
            profile.current_level_id = level::resolve_level(profile.total_points, levels)?
                .level_id
                .clone();
        }

        store.insert_points_entry(&entry)?;
        store.update_technician_standing(profile)?;
        store.append_event(
            &DeskEvent::PointsAdjusted {
                technician_id: profile.technician_id.clone(),
                entry_id:      entry.entry_id.clone(),
                source:        entry.source.as_str().to_string(),
                delta:         entry.delta,
                total_points:  profile.total_points,
            },
            actor,
            now,
        )?;
        if recompute && previous_level != profile.current_level_id {
            store.append_event(
                &DeskEvent::LevelChanged {
                    technician_id: profile.technician_id.clone(),
                    from_level_id: previous_level.clone(),
                    to_level_id:   profile.current_level_id.clone(),
                    total_points:  profile.total_points,
                },
                actor,
                now,
            )?;
            log::info!(
                "technician {} level {} -> {} at {} points",
                profile.technician_id,
                previous_level,
                profile.current_level_id,
                profile.total_points
            );
        }

        if profile.total_points < 0 {
            log::warn!(
                "technician {} in points deficit: {} ({:+} {})",
                profile.technician_id,
                profile.total_points,
                change.delta,
                change.source.as_str()
            );
        } else {
            log::debug!(
                "technician {} points {:+} ({}) -> {}",
                profile.technician_id,
                change.delta,
                change.source.as_str(),
                profile.total_points
            );
        }
        Ok(entry)
    }

    // ── Queries ────────────────────────────────────────────────────

    pub fn profile(&self, technician_id: &str) -> DeskResult<TechnicianProfile> {
        self.store.get_technician(technician_id)
    }

    pub fn current_level(&self, technician_id: &str) -> DeskResult<TechnicianLevel> {
        let profile = self.store.get_technician(technician_id)?;
        let levels = self.store.levels()?;
        level::find_level(&profile.current_level_id, &levels).cloned()
    }

    pub fn points_history(&self, technician_id: &str) -> DeskResult<Vec<PointsAdjustment>> {
        self.store.get_technician(technician_id)?;
        self.store.points_history(technician_id)
    }

    pub fn verify_ledger(&self, technician_id: &str) -> DeskResult<LedgerBalance> {
        let profile = self.store.get_technician(technician_id)?;
        Ok(LedgerBalance {
            ledger_sum:   self.store.ledger_sum(technician_id)?,
            total_points: profile.total_points,
        })
    }

    pub fn leaderboard(&self, limit: usize) -> DeskResult<Vec<LeaderboardEntry>> {
        self.store.leaderboard(limit)
    }

    /// Incentive owed to a technician on `amount` at their current level.
    pub fn incentive_for(&self, technician_id: &str, amount: Money) -> DeskResult<Money> {
        Ok(self.current_level(technician_id)?.incentive_for(amount))
    }
}
