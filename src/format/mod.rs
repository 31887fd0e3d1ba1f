//! Presentation helpers shared by handlers and the CLI.

pub mod currency;
pub mod ical;

pub use currency::format_currency;
pub use ical::events_to_ics;
