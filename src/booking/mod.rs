//! Turns a [`BookingRequest`] into a saved calendar item.
//!
//! The date string is parsed with a strict, well-specified grammar and
//! interpreted as local wall-clock time in the configured timezone; the end
//! instant is the start plus the requested duration.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Timelike};
use chrono_tz::Tz;
use tracing::debug;

use crate::ews::models::{Attendee, ResponseType};
use crate::ews::{BookingRequest, CalendarEvent, EwsClient, EwsConfig, EwsError, ItemId, Result};

/// Accepted date-time grammars, tried in order.
const DATE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Parse `input` as local wall-clock time in `tz`, truncated to minute
/// precision. Ambiguous local times resolve to the earliest offset;
/// nonexistent ones (skipped by a DST transition) are rejected.
pub fn parse_local(input: &str, tz: Tz) -> Result<DateTime<Tz>> {
    let trimmed = input.trim();
    let naive = DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| EwsError::InvalidDate {
            input: input.to_string(),
            reason: "expected YYYY-MM-DD HH:MM[:SS]".to_string(),
        })?;

    let truncated = naive
        .with_second(0)
        .and_then(|n| n.with_nanosecond(0))
        .unwrap_or(naive);

    tz.from_local_datetime(&truncated)
        .earliest()
        .ok_or_else(|| EwsError::InvalidDate {
            input: input.to_string(),
            reason: format!("time does not exist in {tz}"),
        })
}

/// Derive the calendar item from the request: localized start, end = start
/// plus duration, and the room resource mailbox as the single required
/// attendee with its response pre-set to Accept.
pub fn derive_event(request: &BookingRequest, tz: Tz) -> Result<CalendarEvent> {
    let start = parse_local(&request.date, tz)?;
    let end = start + Duration::minutes(i64::from(request.duration_minutes));

    Ok(CalendarEvent {
        subject: request.subject.clone(),
        location: request.location.clone(),
        start,
        end,
        required_attendees: vec![Attendee {
            email_address: request.location_mail.clone(),
            response_type: ResponseType::Accept,
        }],
    })
}

/// Run the whole booking: derive the event, resolve the calendar folder,
/// save the item. Two network calls, no retries.
pub async fn book(config: &EwsConfig, request: &BookingRequest, tz: Tz) -> Result<ItemId> {
    let event = derive_event(request, tz)?;
    debug!(
        "Booking {} in {} from {} to {}",
        event.subject, event.location, event.start, event.end
    );

    let client = EwsClient::new(config.clone())?;
    let calendar = client.resolve_calendar().await?;
    client.create_event(&calendar, &event).await
}
