//! Minimal EWS (Exchange Web Services) client: just enough SOAP to resolve
//! a mailbox calendar folder and save one calendar item into it.

pub mod client;
pub mod error;
pub mod models;

pub use client::EwsClient;
pub use error::{EwsError, Result};
pub use models::{BookingRequest, CalendarEvent, EwsConfig, FolderId, ItemId};
