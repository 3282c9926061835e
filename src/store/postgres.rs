use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{IsolationLevel, NewHistoryEntry, NewTicket, ReservationStore, UnitOfWork};
use crate::models::{Spot, SpotStatus, Ticket, TicketKind};

/// SQLSTATE raised when a serializable or repeatable-read transaction loses a race.
const SERIALIZATION_FAILURE: &str = "40001";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// True for `unique_violation` (23505) and `serialization_failure` (40001).
pub fn is_reservation_conflict(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation() || db_err.code().as_deref() == Some(SERIALIZATION_FAILURE)
        }
        _ => false,
    }
}

impl ReservationStore for PgStore {
    type Error = sqlx::Error;
    type UnitOfWork = PgUnitOfWork;

    async fn find_spots_by_names(
        &self,
        event_id: Uuid,
        names: &[String],
    ) -> Result<Vec<Spot>, sqlx::Error> {
        sqlx::query_as::<_, Spot>(
            "SELECT id, event_id, name, status
             FROM spots
             WHERE event_id = $1 AND name = ANY($2)"
        )
        .bind(event_id)
        .bind(names)
        .fetch_all(&self.pool)
        .await
    }

    async fn begin(&self, isolation: IsolationLevel) -> Result<PgUnitOfWork, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        // must be the first statement of the transaction
        sqlx::query(&format!("SET TRANSACTION ISOLATION LEVEL {}", isolation.as_sql()))
            .execute(&mut *tx)
            .await?;
        Ok(PgUnitOfWork { tx })
    }

    fn is_reservation_conflict(error: &sqlx::Error) -> bool {
        is_reservation_conflict(error)
    }
}

/// One reservation transaction. Dropping it without `commit` rolls back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[derive(FromRow)]
struct IssuedTicketRow {
    id: Uuid,
    spot_id: Uuid,
    #[sqlx(try_from = "String")]
    ticket_kind: TicketKind,
    email: String,
    created_at: DateTime<Utc>,
    event_id: Uuid,
    name: String,
    #[sqlx(try_from = "String")]
    status: SpotStatus,
}

impl From<IssuedTicketRow> for Ticket {
    fn from(row: IssuedTicketRow) -> Self {
        Ticket {
            id: row.id,
            spot_id: row.spot_id,
            ticket_kind: row.ticket_kind,
            email: row.email,
            created_at: row.created_at,
            spot: Spot {
                id: row.spot_id,
                event_id: row.event_id,
                name: row.name,
                status: row.status,
            },
        }
    }
}

impl UnitOfWork for PgUnitOfWork {
    type Error = sqlx::Error;

    async fn lock_spots(&mut self, spot_ids: &[Uuid]) -> Result<Vec<Uuid>, sqlx::Error> {
        // NO KEY UPDATE matches the UPDATE below and stays compatible with the
        // key-share locks taken by the history and ticket foreign keys
        sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM spots WHERE id = ANY($1) ORDER BY id FOR NO KEY UPDATE"
        )
        .bind(spot_ids)
        .fetch_all(&mut *self.tx)
        .await
    }

    async fn append_history(&mut self, entries: &[NewHistoryEntry]) -> Result<(), sqlx::Error> {
        let ids: Vec<Uuid> = entries.iter().map(|_| Uuid::new_v4()).collect();
        let spot_ids: Vec<Uuid> = entries.iter().map(|e| e.spot_id).collect();
        let kinds: Vec<String> = entries.iter().map(|e| e.ticket_kind.as_str().to_string()).collect();
        let emails: Vec<String> = entries.iter().map(|e| e.email.clone()).collect();
        let statuses: Vec<String> = entries.iter().map(|e| e.status.as_str().to_string()).collect();

        sqlx::query(
            r#"
            INSERT INTO reservation_history (id, spot_id, ticket_kind, email, status)
            SELECT * FROM UNNEST($1::uuid[], $2::uuid[], $3::text[], $4::text[], $5::text[])
            "#
        )
        .bind(ids)
        .bind(spot_ids)
        .bind(kinds)
        .bind(emails)
        .bind(statuses)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn mark_reserved(&mut self, spot_ids: &[Uuid]) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE spots SET status = $2, updated_at = NOW() WHERE id = ANY($1)")
            .bind(spot_ids)
            .bind(SpotStatus::Reserved.as_str())
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn issue_tickets(&mut self, tickets: &[NewTicket]) -> Result<Vec<Ticket>, sqlx::Error> {
        let ids: Vec<Uuid> = tickets.iter().map(|_| Uuid::new_v4()).collect();
        let spot_ids: Vec<Uuid> = tickets.iter().map(|t| t.spot_id).collect();
        let kinds: Vec<String> = tickets.iter().map(|t| t.ticket_kind.as_str().to_string()).collect();
        let emails: Vec<String> = tickets.iter().map(|t| t.email.clone()).collect();

        let rows = sqlx::query_as::<_, IssuedTicketRow>(
            r#"
            WITH inserted AS (
                INSERT INTO tickets (id, spot_id, ticket_kind, email)
                SELECT * FROM UNNEST($1::uuid[], $2::uuid[], $3::text[], $4::text[])
                RETURNING id, spot_id, ticket_kind, email, created_at
            )
            SELECT i.id, i.spot_id, i.ticket_kind, i.email, i.created_at,
                   s.event_id, s.name, s.status
            FROM inserted i
            JOIN spots s ON s.id = i.spot_id
            "#
        )
        .bind(ids)
        .bind(spot_ids)
        .bind(kinds)
        .bind(emails)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(Ticket::from).collect())
    }

    async fn commit(self) -> Result<(), sqlx::Error> {
        self.tx.commit().await
    }
}
