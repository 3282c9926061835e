//! Reservation coordinator.
//!
//! A reservation validates the request, resolves spot names inside the event
//! and then, in one unit of work, locks the spots, appends history, reserves
//! them and issues one ticket per spot. Nothing is retried: a conflict surfaces as
//! [`ReservationError::Conflict`] and the caller decides.

use std::collections::HashSet;
use tracing::{debug, error, info, warn};

use crate::error::ReservationError;
use crate::models::{
    ReservationRequest, ReservationStatus, ReserveSpotsRequest, Spot, Ticket,
};
use crate::store::{
    IsolationLevel, NewHistoryEntry, NewTicket, ReservationStore, UnitOfWork,
};
use uuid::Uuid;

#[derive(Clone)]
pub struct ReservationService<S> {
    store: S,
    isolation: IsolationLevel,
}

impl<S: ReservationStore> ReservationService<S> {
    pub fn new(store: S, isolation: IsolationLevel) -> Self {
        Self { store, isolation }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn reserve(
        &self,
        event_id: Uuid,
        request: ReserveSpotsRequest,
    ) -> Result<Vec<Ticket>, ReservationError<S::Error>> {
        let request = request.validated(event_id)?;
        let spots = self.resolve_spots(&request).await?;
        self.commit_reservation(&request, &spots).await
    }

    /// Loads the requested spots of the event, failing with the names that
    /// have no match.
    pub async fn resolve_spots(
        &self,
        request: &ReservationRequest,
    ) -> Result<Vec<Spot>, ReservationError<S::Error>> {
        let spots = self
            .store
            .find_spots_by_names(request.event_id, &request.spots)
            .await
            .map_err(ReservationError::Store)?;

        if spots.len() < request.spots.len() {
            let found: HashSet<&str> = spots.iter().map(|s| s.name.as_str()).collect();
            let missing: Vec<String> = request
                .spots
                .iter()
                .filter(|name| !found.contains(name.as_str()))
                .cloned()
                .collect();
            debug!(event_id = %request.event_id, ?missing, "Requested spots not found");
            return Err(ReservationError::SpotsNotFound(missing));
        }

        Ok(spots)
    }

    async fn commit_reservation(
        &self,
        request: &ReservationRequest,
        spots: &[Spot],
    ) -> Result<Vec<Ticket>, ReservationError<S::Error>> {
        let history: Vec<NewHistoryEntry> = spots
            .iter()
            .map(|spot| NewHistoryEntry {
                spot_id: spot.id,
                ticket_kind: request.ticket_kind,
                email: request.email.clone(),
                status: ReservationStatus::Reserved,
            })
            .collect();
        let spot_ids: Vec<Uuid> = spots.iter().map(|s| s.id).collect();
        let new_tickets: Vec<NewTicket> = spots
            .iter()
            .map(|spot| NewTicket {
                spot_id: spot.id,
                ticket_kind: request.ticket_kind,
                email: request.email.clone(),
            })
            .collect();

        let classify = |e: S::Error| Self::classify(request.event_id, e);

        // an early return drops `uow`, which discards everything staged so far
        let mut uow = self.store.begin(self.isolation).await.map_err(classify)?;
        let locked = uow.lock_spots(&spot_ids).await.map_err(classify)?;
        if locked.len() < spot_ids.len() {
            let locked: HashSet<Uuid> = locked.into_iter().collect();
            let missing: Vec<String> = spots
                .iter()
                .filter(|s| !locked.contains(&s.id))
                .map(|s| s.name.clone())
                .collect();
            warn!(event_id = %request.event_id, ?missing, "Spots removed before reservation");
            return Err(ReservationError::SpotsNotFound(missing));
        }
        uow.append_history(&history).await.map_err(classify)?;
        uow.mark_reserved(&spot_ids).await.map_err(classify)?;
        let tickets = uow.issue_tickets(&new_tickets).await.map_err(classify)?;
        uow.commit().await.map_err(classify)?;

        info!(
            event_id = %request.event_id,
            spots = tickets.len(),
            ticket_kind = %request.ticket_kind,
            "Spots reserved"
        );
        Ok(tickets)
    }

    fn classify(event_id: Uuid, error: S::Error) -> ReservationError<S::Error> {
        if S::is_reservation_conflict(&error) {
            warn!(%event_id, %error, "Reservation lost a race for its spots");
            ReservationError::Conflict
        } else {
            error!(%event_id, %error, "Reservation failed in the store");
            ReservationError::Store(error)
        }
    }
}
