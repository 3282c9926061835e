use fake::faker::internet::en::SafeEmail;
use fake::Fake;
use futures::future::join_all;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use spot_reservation::error::ReservationError;
use spot_reservation::models::{ReserveSpotsRequest, SpotStatus, TicketKind};
use spot_reservation::services::ReservationService;
use spot_reservation::store::{IsolationLevel, MemoryStore, MemoryStoreError};

struct Fixture {
    service: ReservationService<MemoryStore>,
    store: MemoryStore,
    event_id: Uuid,
}

fn fixture(names: &[&str], isolation: IsolationLevel) -> Fixture {
    let store = MemoryStore::new();
    let event_id = Uuid::new_v4();
    for name in names {
        store.add_spot(event_id, name);
    }
    Fixture {
        service: ReservationService::new(store.clone(), isolation),
        store,
        event_id,
    }
}

fn request(spots: &[&str], kind: &str, email: &str) -> ReserveSpotsRequest {
    ReserveSpotsRequest {
        spots: Some(json!(spots)),
        ticket_kind: Some(json!(kind)),
        email: Some(json!(email)),
    }
}

fn spot_status(fx: &Fixture, name: &str) -> SpotStatus {
    fx.store
        .spot_named(fx.event_id, name)
        .map(|spot| spot.status)
        .unwrap_or_else(|| panic!("spot {name} was never seeded"))
}

#[tokio::test]
async fn empty_spot_list_fails_without_writes() {
    let fx = fixture(&["A", "B"], IsolationLevel::ReadCommitted);

    for spots in [None, Some(json!([])), Some(json!("A"))] {
        let req = ReserveSpotsRequest {
            spots,
            ticket_kind: Some(json!("full")),
            email: Some(json!("guest@example.com")),
        };
        let err = fx.service.reserve(fx.event_id, req).await.unwrap_err();
        assert!(matches!(err, ReservationError::Validation(_)));
    }

    assert!(fx.store.history().is_empty());
    assert!(fx.store.tickets().is_empty());
}

#[tokio::test]
async fn unknown_ticket_kind_fails_validation() {
    let fx = fixture(&["A"], IsolationLevel::ReadCommitted);

    for kind in ["", "vip", "Full", "student"] {
        let err = fx
            .service
            .reserve(fx.event_id, request(&["A"], kind, "guest@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReservationError::Validation(_)), "kind {kind:?}");
    }
    assert_eq!(spot_status(&fx, "A"), SpotStatus::Available);
}

#[tokio::test]
async fn missing_spot_is_named_in_the_error() {
    let fx = fixture(&["A", "B"], IsolationLevel::ReadCommitted);

    let err = fx
        .service
        .reserve(fx.event_id, request(&["A", "C"], "full", "guest@example.com"))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Spots C not found");
    assert!(matches!(err, ReservationError::SpotsNotFound(ref missing) if missing == &["C"]));
    assert_eq!(spot_status(&fx, "A"), SpotStatus::Available);
}

#[tokio::test]
async fn failed_requests_repeat_identically() {
    let fx = fixture(&["A", "B"], IsolationLevel::ReadCommitted);

    let mut messages = HashSet::new();
    for _ in 0..5 {
        let invalid = fx
            .service
            .reserve(fx.event_id, request(&[], "full", "guest@example.com"))
            .await
            .unwrap_err();
        let missing = fx
            .service
            .reserve(fx.event_id, request(&["A", "Z"], "half", "guest@example.com"))
            .await
            .unwrap_err();
        messages.insert(invalid.to_string());
        messages.insert(missing.to_string());
    }

    assert_eq!(messages.len(), 2);
    assert!(fx.store.history().is_empty());
    assert!(fx.store.tickets().is_empty());
    assert_eq!(spot_status(&fx, "A"), SpotStatus::Available);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_for_one_spot_yield_one_ticket() {
    let fx = fixture(&["A"], IsolationLevel::ReadCommitted);
    let service = Arc::new(fx.service.clone());

    let attempts = (0..8).map(|_| {
        let service = Arc::clone(&service);
        let event_id = fx.event_id;
        let email: String = SafeEmail().fake();
        tokio::spawn(async move {
            service.reserve(event_id, request(&["A"], "full", &email)).await
        })
    });

    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(ReservationError::Conflict)))
        .count();
    assert_eq!(winners, 1);
    assert_eq!(conflicts, 7);

    assert_eq!(fx.store.tickets().len(), 1);
    let spot_id = fx.store.tickets()[0].spot_id;
    assert_eq!(
        fx.store.history().iter().filter(|h| h.spot_id == spot_id).count(),
        1
    );
    assert_eq!(spot_status(&fx, "A"), SpotStatus::Reserved);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn serializable_isolation_also_admits_one_winner() {
    let fx = fixture(&["A", "B"], IsolationLevel::Serializable);
    let service = Arc::new(fx.service.clone());

    let attempts = [vec!["A", "B"], vec!["B"], vec!["B", "A"]].map(|spots| {
        let service = Arc::clone(&service);
        let event_id = fx.event_id;
        tokio::spawn(async move {
            service.reserve(event_id, request(&spots, "half", "guest@example.com")).await
        })
    });

    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert!(results
        .iter()
        .all(|r| r.is_ok() || matches!(r, Err(ReservationError::Conflict))));

    // whichever won, every spot has at most one ticket
    let tickets = fx.store.tickets();
    let spot_ids: HashSet<_> = tickets.iter().map(|t| t.spot_id).collect();
    assert_eq!(spot_ids.len(), tickets.len());
    assert!(!tickets.is_empty());
}

#[tokio::test]
async fn batch_with_a_reserved_spot_fails_entirely() {
    let fx = fixture(&["A", "B"], IsolationLevel::ReadCommitted);

    fx.service
        .reserve(fx.event_id, request(&["B"], "full", "first@example.com"))
        .await
        .unwrap();

    let err = fx
        .service
        .reserve(fx.event_id, request(&["A", "B"], "half", "second@example.com"))
        .await
        .unwrap_err();

    assert!(matches!(err, ReservationError::Conflict));
    assert_eq!(err.to_string(), "Some spots are already reserved");
    assert_eq!(spot_status(&fx, "A"), SpotStatus::Available);
    assert_eq!(fx.store.tickets().len(), 1);
    assert_eq!(fx.store.history().len(), 1);
    assert!(fx.store.tickets().iter().all(|t| t.email == "first@example.com"));
}

#[tokio::test]
async fn every_ticket_matches_a_reserved_spot_and_history_row() {
    let fx = fixture(&["A", "B", "C"], IsolationLevel::ReadCommitted);
    let email: String = SafeEmail().fake();

    let tickets = fx
        .service
        .reserve(fx.event_id, request(&["C", "A", "B"], "half", &email))
        .await
        .unwrap();

    assert_eq!(tickets.len(), 3);
    let history = fx.store.history();
    for ticket in &tickets {
        assert_eq!(ticket.spot.id, ticket.spot_id);
        assert_eq!(ticket.spot.status, SpotStatus::Reserved);
        assert_eq!(fx.store.spot(ticket.spot_id).unwrap().status, SpotStatus::Reserved);
        assert!(history.iter().any(|h| {
            h.spot_id == ticket.spot_id
                && h.ticket_kind == TicketKind::Half
                && h.email == email
        }));
    }
}

#[tokio::test]
async fn aborted_commit_leaves_spots_available() {
    let fx = fixture(&["A", "B"], IsolationLevel::ReadCommitted);
    fx.store
        .fail_next_commit(MemoryStoreError::Unavailable("statement timeout".to_string()));

    let err = fx
        .service
        .reserve(fx.event_id, request(&["A", "B"], "full", "guest@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, ReservationError::Store(MemoryStoreError::Unavailable(_))));
    assert_eq!(spot_status(&fx, "A"), SpotStatus::Available);
    assert_eq!(spot_status(&fx, "B"), SpotStatus::Available);

    // the same request succeeds once the store recovers
    let tickets = fx
        .service
        .reserve(fx.event_id, request(&["A", "B"], "full", "guest@example.com"))
        .await
        .unwrap();
    assert_eq!(tickets.len(), 2);
}

#[tokio::test]
async fn repeated_names_are_rejected_before_any_write() {
    let fx = fixture(&["A", "B"], IsolationLevel::ReadCommitted);

    let err = fx
        .service
        .reserve(fx.event_id, request(&["A", "B", "A"], "full", "guest@example.com"))
        .await
        .unwrap_err();

    assert!(matches!(err, ReservationError::Validation(_)));
    assert_eq!(err.to_string(), "Spots A requested more than once");
    assert!(fx.store.history().is_empty());
    assert!(fx.store.tickets().is_empty());
    assert_eq!(spot_status(&fx, "A"), SpotStatus::Available);
}
