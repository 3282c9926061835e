//! In-process store with the same transactional contract as Postgres.
//!
//! Writes are buffered per unit of work and applied under one lock at commit.
//! `tickets.spot_id` is unique: staging or committing a ticket for a spot that
//! already holds a committed ticket fails with [`MemoryStoreError::UniqueViolation`].
//! Under repeatable read and serializable, touching a spot that another unit
//! committed after this one began fails with
//! [`MemoryStoreError::SerializationFailure`] instead.
//!
//! Row locks are not modelled: units never block each other, so lock ordering
//! and deadlocks between concurrent units only show up against Postgres
//! (`tests/postgres_reservation.rs`).

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::future::{ready, Future};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use uuid::Uuid;

use super::{IsolationLevel, NewHistoryEntry, NewTicket, ReservationStore, UnitOfWork};
use crate::models::{ReservationHistory, Spot, SpotStatus, Ticket};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryStoreError {
    #[error("duplicate key value violates unique constraint \"{0}\"")]
    UniqueViolation(&'static str),

    #[error("could not serialize access due to concurrent update")]
    SerializationFailure,

    #[error("spot {0} does not exist")]
    UnknownSpot(Uuid),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

const TICKET_SPOT_UNIQUE: &str = "tickets_spot_id_key";

#[derive(Default)]
struct Tables {
    spots: HashMap<Uuid, Spot>,
    history: Vec<ReservationHistory>,
    tickets: Vec<Ticket>,
    // commit sequence number that last modified each spot
    spot_versions: HashMap<Uuid, u64>,
    commit_seq: u64,
    fail_next_commit: Option<MemoryStoreError>,
}

impl Tables {
    fn ticketed(&self, spot_id: Uuid) -> bool {
        self.tickets.iter().any(|t| t.spot_id == spot_id)
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, MemoryStoreError> {
        self.tables
            .lock()
            .map_err(|_| MemoryStoreError::Unavailable("lock poisoned".to_string()))
    }

    /// Seeds an available spot, as event setup would.
    pub fn add_spot(&self, event_id: Uuid, name: &str) -> Spot {
        let spot = Spot {
            id: Uuid::new_v4(),
            event_id,
            name: name.to_string(),
            status: SpotStatus::Available,
        };
        if let Ok(mut tables) = self.lock() {
            tables.spots.insert(spot.id, spot.clone());
        }
        spot
    }

    pub fn spot(&self, id: Uuid) -> Option<Spot> {
        self.lock().ok()?.spots.get(&id).cloned()
    }

    pub fn spot_named(&self, event_id: Uuid, name: &str) -> Option<Spot> {
        self.lock()
            .ok()?
            .spots
            .values()
            .find(|s| s.event_id == event_id && s.name == name)
            .cloned()
    }

    /// Deletes a spot as a concurrent admin request would.
    pub fn remove_spot(&self, id: Uuid) -> Option<Spot> {
        self.lock().ok()?.spots.remove(&id)
    }

    pub fn history(&self) -> Vec<ReservationHistory> {
        self.lock().map(|t| t.history.clone()).unwrap_or_default()
    }

    pub fn tickets(&self) -> Vec<Ticket> {
        self.lock().map(|t| t.tickets.clone()).unwrap_or_default()
    }

    /// Makes the next commit fail with `error` without applying anything.
    pub fn fail_next_commit(&self, error: MemoryStoreError) {
        if let Ok(mut tables) = self.lock() {
            tables.fail_next_commit = Some(error);
        }
    }
}

impl ReservationStore for MemoryStore {
    type Error = MemoryStoreError;
    type UnitOfWork = MemoryUnitOfWork;

    fn find_spots_by_names(
        &self,
        event_id: Uuid,
        names: &[String],
    ) -> impl Future<Output = Result<Vec<Spot>, MemoryStoreError>> + Send {
        let found = self.lock().map(|tables| {
            tables
                .spots
                .values()
                .filter(|s| s.event_id == event_id && names.contains(&s.name))
                .cloned()
                .collect()
        });
        ready(found)
    }

    fn begin(
        &self,
        isolation: IsolationLevel,
    ) -> impl Future<Output = Result<MemoryUnitOfWork, MemoryStoreError>> + Send {
        let unit = self.lock().map(|tables| MemoryUnitOfWork {
            tables: Arc::clone(&self.tables),
            isolation,
            begun_at: tables.commit_seq,
            history: Vec::new(),
            reserved: Vec::new(),
            tickets: Vec::new(),
        });
        ready(unit)
    }

    fn is_reservation_conflict(error: &MemoryStoreError) -> bool {
        matches!(
            error,
            MemoryStoreError::UniqueViolation(_) | MemoryStoreError::SerializationFailure
        )
    }
}

pub struct MemoryUnitOfWork {
    tables: Arc<Mutex<Tables>>,
    isolation: IsolationLevel,
    begun_at: u64,
    history: Vec<ReservationHistory>,
    reserved: Vec<Uuid>,
    tickets: Vec<Ticket>,
}

impl MemoryUnitOfWork {
    fn lock(&self) -> Result<MutexGuard<'_, Tables>, MemoryStoreError> {
        self.tables
            .lock()
            .map_err(|_| MemoryStoreError::Unavailable("lock poisoned".to_string()))
    }

    fn snapshot_isolation(&self) -> bool {
        self.isolation != IsolationLevel::ReadCommitted
    }

    /// Checks that `spot_id` can still be claimed by this unit against
    /// the committed state in `tables`.
    fn check_claim(&self, tables: &Tables, spot_id: Uuid) -> Result<(), MemoryStoreError> {
        let modified_since_begin = tables
            .spot_versions
            .get(&spot_id)
            .is_some_and(|&v| v > self.begun_at);
        if self.snapshot_isolation() && modified_since_begin {
            return Err(MemoryStoreError::SerializationFailure);
        }
        if tables.ticketed(spot_id) {
            return Err(MemoryStoreError::UniqueViolation(TICKET_SPOT_UNIQUE));
        }
        Ok(())
    }

    fn stage_history(&mut self, entries: &[NewHistoryEntry]) -> Result<(), MemoryStoreError> {
        {
            let tables = self.lock()?;
            if let Some(missing) = entries.iter().find(|e| !tables.spots.contains_key(&e.spot_id)) {
                return Err(MemoryStoreError::UnknownSpot(missing.spot_id));
            }
        }
        let now = Utc::now();
        self.history.extend(entries.iter().map(|e| ReservationHistory {
            id: Uuid::new_v4(),
            spot_id: e.spot_id,
            ticket_kind: e.ticket_kind,
            email: e.email.clone(),
            status: e.status,
            created_at: now,
        }));
        Ok(())
    }

    fn stage_locks(&mut self, spot_ids: &[Uuid]) -> Result<Vec<Uuid>, MemoryStoreError> {
        let tables = self.lock()?;
        let mut locked = Vec::with_capacity(spot_ids.len());
        for id in spot_ids {
            if self.snapshot_isolation()
                && tables.spot_versions.get(id).is_some_and(|&v| v > self.begun_at)
            {
                return Err(MemoryStoreError::SerializationFailure);
            }
            if tables.spots.contains_key(id) {
                locked.push(*id);
            }
        }
        locked.sort();
        Ok(locked)
    }

    fn stage_reserved(&mut self, spot_ids: &[Uuid]) -> Result<(), MemoryStoreError> {
        {
            let tables = self.lock()?;
            for id in spot_ids {
                if self.snapshot_isolation()
                    && tables.spot_versions.get(id).is_some_and(|&v| v > self.begun_at)
                {
                    return Err(MemoryStoreError::SerializationFailure);
                }
                if !tables.spots.contains_key(id) {
                    return Err(MemoryStoreError::UnknownSpot(*id));
                }
            }
        }
        self.reserved.extend(spot_ids.iter().copied());
        Ok(())
    }

    fn stage_tickets(&mut self, tickets: &[NewTicket]) -> Result<Vec<Ticket>, MemoryStoreError> {
        let staged_spots: HashSet<Uuid> = self.tickets.iter().map(|t| t.spot_id).collect();
        let issued = {
            let tables = self.lock()?;
            let mut issued = Vec::with_capacity(tickets.len());
            for new in tickets {
                self.check_claim(&tables, new.spot_id)?;
                if staged_spots.contains(&new.spot_id) {
                    return Err(MemoryStoreError::UniqueViolation(TICKET_SPOT_UNIQUE));
                }
                let mut spot = tables
                    .spots
                    .get(&new.spot_id)
                    .cloned()
                    .ok_or(MemoryStoreError::UnknownSpot(new.spot_id))?;
                if self.reserved.contains(&spot.id) {
                    spot.status = SpotStatus::Reserved;
                }
                issued.push(Ticket {
                    id: Uuid::new_v4(),
                    spot_id: new.spot_id,
                    ticket_kind: new.ticket_kind,
                    email: new.email.clone(),
                    created_at: Utc::now(),
                    spot,
                });
            }
            issued
        };
        self.tickets.extend(issued.iter().cloned());
        Ok(issued)
    }

    fn apply(self) -> Result<(), MemoryStoreError> {
        let mut tables = self.lock()?;
        if let Some(err) = tables.fail_next_commit.take() {
            return Err(err);
        }
        for id in self.reserved.iter().chain(self.tickets.iter().map(|t| &t.spot_id)) {
            self.check_claim(&tables, *id)?;
        }

        tables.commit_seq += 1;
        let seq = tables.commit_seq;
        for id in &self.reserved {
            if let Some(spot) = tables.spots.get_mut(id) {
                spot.status = SpotStatus::Reserved;
            }
            tables.spot_versions.insert(*id, seq);
        }
        tables.history.extend(self.history.iter().cloned());
        tables.tickets.extend(self.tickets.iter().cloned());
        Ok(())
    }
}

impl UnitOfWork for MemoryUnitOfWork {
    type Error = MemoryStoreError;

    fn lock_spots(
        &mut self,
        spot_ids: &[Uuid],
    ) -> impl Future<Output = Result<Vec<Uuid>, MemoryStoreError>> + Send {
        ready(self.stage_locks(spot_ids))
    }

    fn append_history(
        &mut self,
        entries: &[NewHistoryEntry],
    ) -> impl Future<Output = Result<(), MemoryStoreError>> + Send {
        ready(self.stage_history(entries))
    }

    fn mark_reserved(
        &mut self,
        spot_ids: &[Uuid],
    ) -> impl Future<Output = Result<(), MemoryStoreError>> + Send {
        ready(self.stage_reserved(spot_ids))
    }

    fn issue_tickets(
        &mut self,
        tickets: &[NewTicket],
    ) -> impl Future<Output = Result<Vec<Ticket>, MemoryStoreError>> + Send {
        ready(self.stage_tickets(tickets))
    }

    fn commit(self) -> impl Future<Output = Result<(), MemoryStoreError>> + Send {
        ready(self.apply())
    }
}
