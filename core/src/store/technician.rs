//! Store methods for technician profiles, the points ledger, and promotions.

use super::{bool_to_int, DeskStore};
use crate::{
    error::{DeskError, DeskResult},
    technician::{
        LeaderboardEntry, PointsAdjustment, PointsSource, PromotionRecord, TechnicianProfile,
    },
    types::Points,
};
use rusqlite::{params, OptionalExtension};

const PROFILE_COLUMNS: &str = "technician_id, user_id, name, total_points, current_level_id,
    average_rating, rating_count, total_services_completed, max_concurrent_jobs,
    is_available, created_at";

fn profile_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<TechnicianProfile> {
    Ok(TechnicianProfile {
        technician_id:            row.get(0)?,
        user_id:                  row.get(1)?,
        name:                     row.get(2)?,
        total_points:             row.get(3)?,
        current_level_id:         row.get(4)?,
        average_rating:           row.get(5)?,
        rating_count:             row.get::<_, i64>(6)? as u32,
        total_services_completed: row.get::<_, i64>(7)? as u32,
        max_concurrent_jobs:      row.get::<_, i64>(8)? as u32,
        is_available:             row.get::<_, i32>(9)? != 0,
        created_at:               row.get(10)?,
    })
}

fn ledger_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<PointsAdjustment> {
    let source: String = row.get(3)?;
    Ok(PointsAdjustment {
        entry_id:      row.get(0)?,
        technician_id: row.get(1)?,
        delta:         row.get(2)?,
        source:        PointsSource::parse(&source).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                format!("unknown points source '{source}'").into(),
            )
        })?,
        reason:        row.get(4)?,
        actor:         row.get(5)?,
        service_id:    row.get(6)?,
        created_at:    row.get(7)?,
    })
}

impl DeskStore {
    // ── Profiles ───────────────────────────────────────────────────

    pub fn insert_technician(&self, t: &TechnicianProfile) -> DeskResult<()> {
        self.conn.execute(
            "INSERT INTO technician_profile (
                technician_id, user_id, name, total_points, current_level_id,
                average_rating, rating_count, total_services_completed,
                max_concurrent_jobs, is_available, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                &t.technician_id,
                &t.user_id,
                &t.name,
                t.total_points,
                &t.current_level_id,
                t.average_rating,
                t.rating_count as i64,
                t.total_services_completed as i64,
                t.max_concurrent_jobs as i64,
                bool_to_int(t.is_available),
                t.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn find_technician(&self, technician_id: &str) -> DeskResult<Option<TechnicianProfile>> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM technician_profile WHERE technician_id = ?1");
        let profile = self
            .conn
            .query_row(&sql, params![technician_id], profile_row_mapper)
            .optional()?;
        Ok(profile)
    }

    pub fn get_technician(&self, technician_id: &str) -> DeskResult<TechnicianProfile> {
        self.find_technician(technician_id)?
            .ok_or_else(|| DeskError::not_found("technician", technician_id))
    }

    pub fn technician_by_user(&self, user_id: &str) -> DeskResult<Option<TechnicianProfile>> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM technician_profile WHERE user_id = ?1");
        let profile = self
            .conn
            .query_row(&sql, params![user_id], profile_row_mapper)
            .optional()?;
        Ok(profile)
    }

    pub fn all_technicians(&self) -> DeskResult<Vec<TechnicianProfile>> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM technician_profile ORDER BY created_at, rowid");
        let mut stmt = self.conn.prepare(&sql)?;
        let profiles = stmt
            .query_map([], profile_row_mapper)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(profiles)
    }

    /// Write back the mutable profile fields after a points or rating change.
    pub fn update_technician_standing(&self, t: &TechnicianProfile) -> DeskResult<()> {
        let changed = self.conn.execute(
            "UPDATE technician_profile
             SET total_points = ?1, current_level_id = ?2, average_rating = ?3,
                 rating_count = ?4, total_services_completed = ?5
             WHERE technician_id = ?6",
            params![
                t.total_points,
                &t.current_level_id,
                t.average_rating,
                t.rating_count as i64,
                t.total_services_completed as i64,
                &t.technician_id,
            ],
        )?;
        if changed == 0 {
            return Err(DeskError::not_found("technician", t.technician_id.as_str()));
        }
        Ok(())
    }

    pub fn set_technician_availability(&self, technician_id: &str, is_available: bool) -> DeskResult<()> {
        let changed = self.conn.execute(
            "UPDATE technician_profile SET is_available = ?1 WHERE technician_id = ?2",
            params![bool_to_int(is_available), technician_id],
        )?;
        if changed == 0 {
            return Err(DeskError::not_found("technician", technician_id));
        }
        Ok(())
    }

    pub fn leaderboard(&self, limit: usize) -> DeskResult<Vec<LeaderboardEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.technician_id, p.name, p.total_points, l.code,
                    p.average_rating, p.total_services_completed
             FROM technician_profile p
             JOIN technician_level l ON l.level_id = p.current_level_id
             ORDER BY p.total_points DESC, p.average_rating DESC, p.technician_id ASC
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(LeaderboardEntry {
                    technician_id:            row.get(0)?,
                    name:                     row.get(1)?,
                    total_points:             row.get(2)?,
                    level_code:               row.get(3)?,
                    average_rating:           row.get(4)?,
                    total_services_completed: row.get::<_, i64>(5)? as u32,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Points ledger ──────────────────────────────────────────────

    pub fn insert_points_entry(&self, e: &PointsAdjustment) -> DeskResult<()> {
        self.conn.execute(
            "INSERT INTO points_ledger (
                entry_id, technician_id, delta, source, reason, actor, service_id, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                &e.entry_id,
                &e.technician_id,
                e.delta,
                e.source.as_str(),
                &e.reason,
                &e.actor,
                e.service_id.as_deref(),
                e.created_at,
            ],
        )?;
        Ok(())
    }

    /// Ledger entries for one technician, oldest first.
    pub fn points_history(&self, technician_id: &str) -> DeskResult<Vec<PointsAdjustment>> {
        let mut stmt = self.conn.prepare(
            "SELECT entry_id, technician_id, delta, source, reason, actor, service_id, created_at
             FROM points_ledger WHERE technician_id = ?1
             ORDER BY created_at ASC, rowid ASC",
        )?;
        let entries = stmt
            .query_map(params![technician_id], ledger_row_mapper)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn ledger_sum(&self, technician_id: &str) -> DeskResult<Points> {
        let sum: Points = self.conn.query_row(
            "SELECT COALESCE(SUM(delta), 0) FROM points_ledger WHERE technician_id = ?1",
            params![technician_id],
            |row| row.get(0),
        )?;
        Ok(sum)
    }

    pub fn points_entry_count(&self, technician_id: &str) -> DeskResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM points_ledger WHERE technician_id = ?1",
            params![technician_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ── Promotions ─────────────────────────────────────────────────

    pub fn insert_promotion(&self, p: &PromotionRecord) -> DeskResult<()> {
        self.conn.execute(
            "INSERT INTO level_promotion (
                promotion_id, technician_id, from_level_id, to_level_id,
                bonus_points, notes, actor, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                &p.promotion_id,
                &p.technician_id,
                &p.from_level_id,
                &p.to_level_id,
                p.bonus_points,
                p.notes.as_deref(),
                &p.actor,
                p.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn promotions_for(&self, technician_id: &str) -> DeskResult<Vec<PromotionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT promotion_id, technician_id, from_level_id, to_level_id,
                    bonus_points, notes, actor, created_at
             FROM level_promotion WHERE technician_id = ?1
             ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt
            .query_map(params![technician_id], |row| {
                Ok(PromotionRecord {
                    promotion_id:  row.get(0)?,
                    technician_id: row.get(1)?,
                    from_level_id: row.get(2)?,
                    to_level_id:   row.get(3)?,
                    bonus_points:  row.get(4)?,
                    notes:         row.get(5)?,
                    actor:         row.get(6)?,
                    created_at:    row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
