//! Store methods for the technician level table.

use super::DeskStore;
use crate::{error::DeskResult, level::TechnicianLevel};
use rusqlite::params;

fn level_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<TechnicianLevel> {
    Ok(TechnicianLevel {
        level_id:          row.get(0)?,
        code:              row.get(1)?,
        name:              row.get(2)?,
        min_points:        row.get(3)?,
        max_points:        row.get(4)?,
        points_multiplier: row.get(5)?,
        incentive_percent: row.get(6)?,
        promotion_bonus:   row.get(7)?,
        sort_order:        row.get(8)?,
    })
}

impl DeskStore {
    /// All levels ordered by sort_order.
    pub fn levels(&self) -> DeskResult<Vec<TechnicianLevel>> {
        let mut stmt = self.conn.prepare(
            "SELECT level_id, code, name, min_points, max_points, points_multiplier,
                    incentive_percent, promotion_bonus, sort_order
             FROM technician_level ORDER BY sort_order ASC",
        )?;
        let levels = stmt
            .query_map([], level_row_mapper)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(levels)
    }

    pub fn upsert_level(&self, l: &TechnicianLevel) -> DeskResult<()> {
        self.conn.execute(
            "INSERT INTO technician_level (
                level_id, code, name, min_points, max_points, points_multiplier,
                incentive_percent, promotion_bonus, sort_order
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (level_id) DO UPDATE SET
                code = excluded.code,
                name = excluded.name,
                min_points = excluded.min_points,
                max_points = excluded.max_points,
                points_multiplier = excluded.points_multiplier,
                incentive_percent = excluded.incentive_percent,
                promotion_bonus = excluded.promotion_bonus,
                sort_order = excluded.sort_order",
            params![
                &l.level_id,
                &l.code,
                &l.name,
                l.min_points,
                l.max_points,
                l.points_multiplier,
                l.incentive_percent,
                l.promotion_bonus,
                l.sort_order,
            ],
        )?;
        Ok(())
    }

    /// Move every stored code to a placeholder derived from its level id,
    /// so a replacement table may reassign codes between ids without
    /// tripping the UNIQUE constraint midway.
    pub fn park_level_codes(&self) -> DeskResult<()> {
        self.conn
            .execute("UPDATE technician_level SET code = '~' || level_id", [])?;
        Ok(())
    }

    /// Drop levels no longer in `keep_ids` and not referenced by any profile.
    /// Returns how many rows were removed.
    pub fn prune_levels(&self, keep_ids: &[&str]) -> DeskResult<usize> {
        let mut removed = 0;
        for level in self.levels()? {
            if keep_ids.contains(&level.level_id.as_str()) {
                continue;
            }
            removed += self.conn.execute(
                "DELETE FROM technician_level WHERE level_id = ?1
                 AND NOT EXISTS (
                    SELECT 1 FROM technician_profile WHERE current_level_id = ?1
                 )",
                params![&level.level_id],
            )?;
        }
        Ok(removed)
    }
}
