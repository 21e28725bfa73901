//! Data models for the EWS booking client.

use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Connection settings for one Exchange account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EwsConfig {
    /// Exchange hostname, e.g. `mail.example.com`. A full URL is also
    /// accepted and used verbatim as the endpoint.
    pub server: String,
    /// Primary SMTP address, doubles as the login.
    pub username: String,
    pub password: String,
}

impl EwsConfig {
    pub fn new(
        server: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// SOAP endpoint URL. Explicit server configuration, no autodiscover.
    pub fn endpoint(&self) -> String {
        if self.server.contains("://") {
            self.server.trim_end_matches('/').to_string()
        } else {
            format!("https://{}/EWS/Exchange.asmx", self.server)
        }
    }
}

/// Everything the CLI collects for one booking. Immutable for the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub username: String,
    pub server: String,
    /// Display name of the room.
    pub location: String,
    /// Resource mailbox of the room; the single required attendee.
    pub location_mail: String,
    pub subject: String,
    /// Local wall-clock date-time string, parsed by the booking module.
    pub date: String,
    pub duration_minutes: u32,
}

/// Invitation response policy for an attendee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    Accept,
    Tentative,
    Decline,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Accept => "Accept",
            ResponseType::Tentative => "Tentative",
            ResponseType::Decline => "Decline",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attendee {
    pub email_address: String,
    pub response_type: ResponseType,
}

/// A calendar item ready to be saved. Derived once from a
/// [`BookingRequest`] and sent once.
#[derive(Debug, Clone)]
pub struct CalendarEvent {
    pub subject: String,
    pub location: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub required_attendees: Vec<Attendee>,
}

/// EWS folder identifier with its change key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderId {
    pub id: String,
    pub change_key: String,
}

/// Identifier of a saved item, returned by CreateItem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemId {
    pub id: String,
    pub change_key: String,
}
