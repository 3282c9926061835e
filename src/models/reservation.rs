use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use uuid::Uuid;

use super::TicketKind;
use crate::error::ValidationError;

/// Outcome snapshot stored on every history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Reserved,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Reserved => "reserved",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationHistory {
    pub id: Uuid,
    pub spot_id: Uuid,
    pub ticket_kind: TicketKind,
    pub email: String,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
}

/// Reservation body as received from the caller, before any checks. Fields
/// stay untyped so a wrong JSON type is reported by [`Self::validated`] with
/// the same message as a wrong value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReserveSpotsRequest {
    pub spots: Option<Value>,
    pub ticket_kind: Option<Value>,
    pub email: Option<Value>,
}

/// A reservation that passed shape validation. `spots` holds distinct names
/// in request order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRequest {
    pub event_id: Uuid,
    pub spots: Vec<String>,
    pub ticket_kind: TicketKind,
    pub email: String,
}

// null, false, 0, "" and [] all count as absent
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(_) => false,
    }
}

impl ReserveSpotsRequest {
    pub fn validated(self, event_id: Uuid) -> Result<ReservationRequest, ValidationError> {
        let spots = match self.spots {
            Some(Value::Array(items)) if !items.is_empty() => items,
            _ => return Err(ValidationError::new("Spots must be a non-empty array")),
        };

        let ticket_kind = match self.ticket_kind {
            None => return Err(ValidationError::new("Ticket kind must be a non-empty string")),
            Some(ref kind) if is_blank(kind) => {
                return Err(ValidationError::new("Ticket kind must be a non-empty string"))
            }
            Some(Value::String(kind)) => kind
                .parse::<TicketKind>()
                .map_err(|_| ValidationError::new("Ticket kind must be 'full' or 'half'"))?,
            Some(_) => return Err(ValidationError::new("Ticket kind must be 'full' or 'half'")),
        };

        let spots: Vec<String> = spots
            .into_iter()
            .map(|item| match item {
                Value::String(name) => Ok(name),
                _ => Err(ValidationError::new("Spot names must be strings")),
            })
            .collect::<Result<_, _>>()?;

        let mut seen = HashSet::with_capacity(spots.len());
        let mut repeated: Vec<&str> = Vec::new();
        for name in &spots {
            if !seen.insert(name.as_str()) && !repeated.contains(&name.as_str()) {
                repeated.push(name);
            }
        }
        if !repeated.is_empty() {
            return Err(ValidationError::new(format!(
                "Spots {} requested more than once",
                repeated.join(", ")
            )));
        }

        let email = match self.email {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(email)) => email,
            Some(_) => return Err(ValidationError::new("Email must be a string")),
        };

        Ok(ReservationRequest {
            event_id,
            spots,
            ticket_kind,
            // free text, unchecked
            email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn request(spots: Option<Vec<&str>>, kind: Option<&str>) -> ReserveSpotsRequest {
        ReserveSpotsRequest {
            spots: spots.map(|s| json!(s)),
            ticket_kind: kind.map(|k| json!(k)),
            email: Some(json!("guest@example.com")),
        }
    }

    fn from_body(body: Value) -> Result<ReservationRequest, ValidationError> {
        serde_json::from_value::<ReserveSpotsRequest>(body)
            .unwrap()
            .validated(Uuid::new_v4())
    }

    #[test]
    fn missing_or_empty_spots_are_rejected() {
        for spots in [None, Some(vec![])] {
            let err = request(spots, Some("full")).validated(Uuid::new_v4()).unwrap_err();
            assert_eq!(err.to_string(), "Spots must be a non-empty array");
        }
    }

    #[test]
    fn ticket_kind_checks_run_in_order() {
        let err = request(Some(vec!["A1"]), None).validated(Uuid::new_v4()).unwrap_err();
        assert_eq!(err.to_string(), "Ticket kind must be a non-empty string");

        let err = request(Some(vec!["A1"]), Some("")).validated(Uuid::new_v4()).unwrap_err();
        assert_eq!(err.to_string(), "Ticket kind must be a non-empty string");

        let err = request(Some(vec!["A1"]), Some("vip")).validated(Uuid::new_v4()).unwrap_err();
        assert_eq!(err.to_string(), "Ticket kind must be 'full' or 'half'");
    }

    #[test]
    fn spot_check_wins_over_ticket_kind_check() {
        let err = request(Some(vec![]), Some("vip")).validated(Uuid::new_v4()).unwrap_err();
        assert_eq!(err.to_string(), "Spots must be a non-empty array");
    }

    #[test]
    fn wrongly_typed_fields_get_field_messages() {
        let err = from_body(json!({ "spots": ["A"], "ticket_kind": 5 })).unwrap_err();
        assert_eq!(err.to_string(), "Ticket kind must be 'full' or 'half'");

        let err = from_body(json!({ "spots": ["A"], "ticket_kind": 0 })).unwrap_err();
        assert_eq!(err.to_string(), "Ticket kind must be a non-empty string");

        let err = from_body(json!({ "spots": "A", "ticket_kind": "full" })).unwrap_err();
        assert_eq!(err.to_string(), "Spots must be a non-empty array");

        let err = from_body(json!({ "spots": ["A", 7], "ticket_kind": "full" })).unwrap_err();
        assert_eq!(err.to_string(), "Spot names must be strings");

        let err = from_body(json!({ "spots": ["A"], "ticket_kind": "full", "email": 1 })).unwrap_err();
        assert_eq!(err.to_string(), "Email must be a string");
    }

    #[test]
    fn repeated_names_are_rejected() {
        let err = request(Some(vec!["B", "A", "B", "C", "A", "B"]), Some("half"))
            .validated(Uuid::new_v4())
            .unwrap_err();
        assert_eq!(err.to_string(), "Spots B, A requested more than once");
    }

    #[test]
    fn valid_request_keeps_request_order() {
        let event_id = Uuid::new_v4();
        let req = request(Some(vec!["B", "A", "C"]), Some("half"))
            .validated(event_id)
            .unwrap();
        assert_eq!(req.spots, vec!["B", "A", "C"]);
        assert_eq!(req.ticket_kind, TicketKind::Half);
        assert_eq!(req.event_id, event_id);
    }

    #[test]
    fn absent_email_becomes_empty_text() {
        let mut raw = request(Some(vec!["A1"]), Some("full"));
        raw.email = None;
        assert_eq!(raw.validated(Uuid::new_v4()).unwrap().email, "");
    }

    proptest! {
        #[test]
        fn unknown_ticket_kinds_never_validate(kind in "[a-zA-Z]{1,12}") {
            prop_assume!(kind != "full" && kind != "half");
            let result = request(Some(vec!["A1"]), Some(&kind)).validated(Uuid::new_v4());
            prop_assert!(result.is_err());
        }

        #[test]
        fn requests_validate_only_without_repeats(
            names in proptest::collection::vec("[A-D][1-3]", 1..20)
        ) {
            let distinct: HashSet<_> = names.iter().collect();
            let result = request(Some(names.iter().map(String::as_str).collect()), Some("full"))
                .validated(Uuid::new_v4());
            if distinct.len() == names.len() {
                prop_assert_eq!(result.unwrap().spots, names);
            } else {
                prop_assert!(result.is_err());
            }
        }
    }
}
