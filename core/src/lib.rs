//! RepairDesk core: technician levelling and service estimation rules for
//! a repair-shop desk, over a SQLite store.

pub mod clock;
pub mod command;
pub mod config;
pub mod desk;
pub mod error;
pub mod estimation;
pub mod event;
pub mod level;
pub mod level_engine;
pub mod service_desk;
pub mod store;
pub mod technician;
pub mod types;
