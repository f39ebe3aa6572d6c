// Export components
pub mod google_calendar;

// Re-export the calendar handle
pub use google_calendar::CalendarHandle;
