//! Store methods for the fault catalog, devices, and services.

use super::{bool_to_int, DeskStore};
use crate::{
    error::{DeskError, DeskResult},
    estimation::{Fault, PriorService, WarrantyReason, WarrantyStatus},
    service_desk::{Device, ServiceRecord, ServiceStatus},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

const SERVICE_COLUMNS: &str = "service_id, ticket_number, device_id, status, estimated_cost,
    chargeable_amount, technician_id, is_warranty_repair, warranty_reason,
    previous_service_id, rating, created_at, completed_at";

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, message.into())
}

// Fault ids are filled in separately from service_fault.
fn service_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<ServiceRecord> {
    let status: String = row.get(3)?;
    let warranty_reason: Option<String> = row.get(8)?;
    let reason = match warranty_reason {
        Some(r) => Some(
            WarrantyReason::parse(&r)
                .ok_or_else(|| conversion_error(8, format!("unknown warranty reason '{r}'")))?,
        ),
        None => None,
    };
    let rating = match row.get::<_, Option<i64>>(10)? {
        Some(r) => Some(
            u8::try_from(r).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Integer, Box::new(e))
            })?,
        ),
        None => None,
    };
    Ok(ServiceRecord {
        service_id:          row.get(0)?,
        ticket_number:       row.get(1)?,
        device_id:           row.get(2)?,
        status:              ServiceStatus::parse(&status)
            .ok_or_else(|| conversion_error(3, format!("unknown service status '{status}'")))?,
        fault_ids:           Vec::new(),
        estimated_cost:      row.get(4)?,
        chargeable_amount:   row.get(5)?,
        technician_id:       row.get(6)?,
        warranty:            WarrantyStatus {
            is_warranty_repair: row.get::<_, i32>(7)? != 0,
            reason,
        },
        previous_service_id: row.get(9)?,
        rating,
        created_at:          row.get(11)?,
        completed_at:        row.get(12)?,
    })
}

fn fault_row_mapper(row: &rusqlite::Row<'_>) -> rusqlite::Result<Fault> {
    Ok(Fault {
        fault_id:      row.get(0)?,
        name:          row.get(1)?,
        default_price: row.get(2)?,
        is_active:     row.get::<_, i32>(3)? != 0,
    })
}

impl DeskStore {
    // ── Fault catalog ──────────────────────────────────────────────

    pub fn upsert_fault(&self, f: &Fault) -> DeskResult<()> {
        self.conn.execute(
            "INSERT INTO fault (fault_id, name, default_price, is_active)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (fault_id) DO UPDATE SET
                name = excluded.name,
                default_price = excluded.default_price,
                is_active = excluded.is_active",
            params![&f.fault_id, &f.name, f.default_price, bool_to_int(f.is_active)],
        )?;
        Ok(())
    }

    pub fn all_faults(&self) -> DeskResult<Vec<Fault>> {
        let mut stmt = self.conn.prepare(
            "SELECT fault_id, name, default_price, is_active FROM fault ORDER BY fault_id",
        )?;
        let faults = stmt
            .query_map([], fault_row_mapper)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(faults)
    }

    pub fn find_fault(&self, fault_id: &str) -> DeskResult<Option<Fault>> {
        let fault = self
            .conn
            .query_row(
                "SELECT fault_id, name, default_price, is_active FROM fault WHERE fault_id = ?1",
                params![fault_id],
                fault_row_mapper,
            )
            .optional()?;
        Ok(fault)
    }

    // ── Devices ────────────────────────────────────────────────────

    pub fn insert_device(&self, d: &Device) -> DeskResult<()> {
        self.conn.execute(
            "INSERT INTO device (device_id, customer_name, description, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![&d.device_id, &d.customer_name, &d.description, d.created_at],
        )?;
        Ok(())
    }

    pub fn find_device(&self, device_id: &str) -> DeskResult<Option<Device>> {
        let device = self
            .conn
            .query_row(
                "SELECT device_id, customer_name, description, created_at
                 FROM device WHERE device_id = ?1",
                params![device_id],
                |row| {
                    Ok(Device {
                        device_id:     row.get(0)?,
                        customer_name: row.get(1)?,
                        description:   row.get(2)?,
                        created_at:    row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(device)
    }

    // ── Services ───────────────────────────────────────────────────

    /// Insert a service and one service_fault row per fault, priced at
    /// the catalog price of the moment.
    pub fn insert_service(&self, s: &ServiceRecord, faults: &[Fault]) -> DeskResult<()> {
        self.conn.execute(
            "INSERT INTO service (
                service_id, ticket_number, device_id, status, estimated_cost,
                chargeable_amount, technician_id, is_warranty_repair, warranty_reason,
                previous_service_id, rating, created_at, completed_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                &s.service_id,
                &s.ticket_number,
                &s.device_id,
                s.status.as_str(),
                s.estimated_cost,
                s.chargeable_amount,
                s.technician_id.as_deref(),
                bool_to_int(s.warranty.is_warranty_repair),
                s.warranty.reason.map(|r| r.as_str()),
                s.previous_service_id.as_deref(),
                s.rating.map(i64::from),
                s.created_at,
                s.completed_at,
            ],
        )?;
        for fault in faults {
            self.conn.execute(
                "INSERT INTO service_fault (service_id, fault_id, price) VALUES (?1, ?2, ?3)",
                params![&s.service_id, &fault.fault_id, fault.default_price],
            )?;
        }
        Ok(())
    }

    fn service_fault_ids(&self, service_id: &str) -> DeskResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT fault_id FROM service_fault WHERE service_id = ?1 ORDER BY rowid",
        )?;
        let ids = stmt
            .query_map(params![service_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    pub fn find_service(&self, service_id: &str) -> DeskResult<Option<ServiceRecord>> {
        let sql = format!("SELECT {SERVICE_COLUMNS} FROM service WHERE service_id = ?1");
        let service = self
            .conn
            .query_row(&sql, params![service_id], service_row_mapper)
            .optional()?;
        match service {
            Some(mut s) => {
                s.fault_ids = self.service_fault_ids(&s.service_id)?;
                Ok(Some(s))
            }
            None => Ok(None),
        }
    }

    pub fn get_service(&self, service_id: &str) -> DeskResult<ServiceRecord> {
        self.find_service(service_id)?
            .ok_or_else(|| DeskError::not_found("service", service_id))
    }

    /// Earlier services on a device, most recent first.
    pub fn device_history(&self, device_id: &str) -> DeskResult<Vec<PriorService>> {
        let mut stmt = self.conn.prepare(
            "SELECT service_id, device_id, created_at FROM service
             WHERE device_id = ?1
             ORDER BY created_at DESC, rowid DESC",
        )?;
        let heads = stmt
            .query_map(params![device_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, DateTime<Utc>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut history = Vec::with_capacity(heads.len());
        for (service_id, device_id, created_at) in heads {
            let fault_ids = self.service_fault_ids(&service_id)?;
            history.push(PriorService { service_id, device_id, fault_ids, created_at });
        }
        Ok(history)
    }

    pub fn update_service_warranty(
        &self,
        service_id:        &str,
        warranty:          WarrantyStatus,
        chargeable_amount: f64,
    ) -> DeskResult<()> {
        self.conn.execute(
            "UPDATE service
             SET is_warranty_repair = ?1, warranty_reason = ?2, chargeable_amount = ?3
             WHERE service_id = ?4",
            params![
                bool_to_int(warranty.is_warranty_repair),
                warranty.reason.map(|r| r.as_str()),
                chargeable_amount,
                service_id,
            ],
        )?;
        Ok(())
    }

    pub fn assign_service(&self, service_id: &str, technician_id: &str) -> DeskResult<()> {
        self.conn.execute(
            "UPDATE service SET technician_id = ?1, status = ?2 WHERE service_id = ?3",
            params![technician_id, ServiceStatus::Assigned.as_str(), service_id],
        )?;
        Ok(())
    }

    pub fn mark_service_completed(&self, service_id: &str, at: DateTime<Utc>) -> DeskResult<()> {
        self.conn.execute(
            "UPDATE service SET status = ?1, completed_at = ?2 WHERE service_id = ?3",
            params![ServiceStatus::Completed.as_str(), at, service_id],
        )?;
        Ok(())
    }

    pub fn set_service_rating(&self, service_id: &str, stars: u8) -> DeskResult<()> {
        self.conn.execute(
            "UPDATE service SET rating = ?1 WHERE service_id = ?2",
            params![i64::from(stars), service_id],
        )?;
        Ok(())
    }

    /// Services assigned to a technician and not yet completed.
    pub fn open_job_count(&self, technician_id: &str) -> DeskResult<u32> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM service WHERE technician_id = ?1 AND status = ?2",
            params![technician_id, ServiceStatus::Assigned.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    pub fn service_count(&self) -> DeskResult<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM service", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn warranty_service_count(&self) -> DeskResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM service WHERE is_warranty_repair = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn services_in_status(&self, status: ServiceStatus) -> DeskResult<Vec<ServiceRecord>> {
        let sql = format!(
            "SELECT {SERVICE_COLUMNS} FROM service WHERE status = ?1 ORDER BY created_at, rowid"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut services = stmt
            .query_map(params![status.as_str()], service_row_mapper)?
            .collect::<Result<Vec<_>, _>>()?;
        for s in &mut services {
            s.fault_ids = self.service_fault_ids(&s.service_id)?;
        }
        Ok(services)
    }
}

#[cfg(test)]
mod tests {
    use crate::{desk::Desk, error::DeskError, service_desk::NewIntake};

    #[test]
    fn out_of_range_rating_column_is_a_conversion_error() {
        let (desk, _) = Desk::build_test().unwrap();
        let services = desk.services();
        let device = services.register_device("Kenji Mori", "Phone", "front-desk").unwrap();
        let service = services
            .create_intake(
                &NewIntake { device_id: device.device_id, fault_ids: vec![], staff_warranty: false },
                "front-desk",
            )
            .unwrap()
            .service;

        desk.store()
            .conn
            .execute("UPDATE service SET rating = 300 WHERE service_id = ?1", [&service.service_id])
            .unwrap();

        let err = desk.store().get_service(&service.service_id).unwrap_err();
        assert!(
            matches!(err, DeskError::Database(rusqlite::Error::FromSqlConversionFailure(10, _, _))),
            "got {err:?}"
        );
    }
}
