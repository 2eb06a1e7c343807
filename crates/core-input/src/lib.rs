//! core-input: everything that feeds the event loop from the outside.
//!
//! [`reader`] ingests newline-delimited text from stdin (or a file) into
//! the shared memory buffer, concurrently with user interaction, emitting
//! throttled draw hints so the screen tracks arrival. [`events`] polls the
//! terminal for keystrokes and resizes and forwards them as logical keys.

pub mod events;
pub mod reader;

pub use events::{spawn_event_task, TermEvent};
pub use reader::{spawn_reader_task, ReaderConfig};
