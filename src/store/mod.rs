//! Storage contract used by the reservation coordinator.
//!
//! A store resolves spots and hands out units of work. Everything written
//! through a [`UnitOfWork`] becomes visible to other units only on
//! [`UnitOfWork::commit`]; dropping an uncommitted unit discards its writes.
//! The only store-specific knowledge the coordinator needs is
//! [`ReservationStore::is_reservation_conflict`].

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::{ReservationStatus, Spot, Ticket, TicketKind};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryStore, MemoryStoreError};
pub use postgres::PgStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for IsolationLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "read_committed" => Ok(IsolationLevel::ReadCommitted),
            "repeatable_read" => Ok(IsolationLevel::RepeatableRead),
            "serializable" => Ok(IsolationLevel::Serializable),
            _ => Err(()),
        }
    }
}

/// History row staged by a reservation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistoryEntry {
    pub spot_id: Uuid,
    pub ticket_kind: TicketKind,
    pub email: String,
    pub status: ReservationStatus,
}

/// Ticket staged for a spot that the same unit of work has marked reserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTicket {
    pub spot_id: Uuid,
    pub ticket_kind: TicketKind,
    pub email: String,
}

pub trait ReservationStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;
    type UnitOfWork: UnitOfWork<Error = Self::Error>;

    /// Spots of `event_id` whose name is in `names`. Unknown names are skipped.
    fn find_spots_by_names(
        &self,
        event_id: Uuid,
        names: &[String],
    ) -> impl Future<Output = Result<Vec<Spot>, Self::Error>> + Send;

    fn begin(
        &self,
        isolation: IsolationLevel,
    ) -> impl Future<Output = Result<Self::UnitOfWork, Self::Error>> + Send;

    /// True when `error` means another unit of work already claimed one of
    /// the spots: a uniqueness violation or a serialization failure.
    fn is_reservation_conflict(error: &Self::Error) -> bool;
}

pub trait UnitOfWork: Send + Sized {
    type Error;

    /// Takes write locks on the listed spots in id order and returns the ids
    /// that still exist. Runs before any other write of the unit so that
    /// concurrent units touching the same spots queue here.
    fn lock_spots(
        &mut self,
        spot_ids: &[Uuid],
    ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send;

    fn append_history(
        &mut self,
        entries: &[NewHistoryEntry],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Moves every listed spot to reserved in one batch.
    fn mark_reserved(
        &mut self,
        spot_ids: &[Uuid],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Creates one ticket per entry, each carrying its spot as seen inside
    /// this unit of work.
    fn issue_tickets(
        &mut self,
        tickets: &[NewTicket],
    ) -> impl Future<Output = Result<Vec<Ticket>, Self::Error>> + Send;

    fn commit(self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
