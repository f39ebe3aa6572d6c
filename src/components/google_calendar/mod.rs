mod actor;
pub mod backend;
pub mod client;
pub mod format;
mod handle;
pub mod memory;
pub mod models;
pub mod resolver;
pub mod time;
pub mod token;

pub use backend::{CalendarBackend, ListQuery};
pub use client::GoogleCalendarClient;
pub use handle::CalendarHandle;
pub use memory::InMemoryCalendar;
pub use models::{CalendarEvent, EventDateTime};
pub use resolver::{EventResolver, NameMatchPolicy, Resolution, ResolutionRequest};
pub use time::{normalize, TimeWindow};
pub use token::{CredentialProvider, StoredToken, TokenManager};
