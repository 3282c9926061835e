pub mod event;
pub mod spot;
pub mod ticket;
pub mod reservation;

pub use event::{Event, EventChanges, NewEvent};
pub use spot::{NewSpot, Spot, SpotChanges, SpotStatus};
pub use ticket::{Ticket, TicketKind};
pub use reservation::{ReservationHistory, ReservationRequest, ReservationStatus, ReserveSpotsRequest};

use thiserror::Error;

/// Raised when a persisted text column holds a value outside its enum.
#[derive(Debug, Error)]
#[error("unknown {kind} {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}
