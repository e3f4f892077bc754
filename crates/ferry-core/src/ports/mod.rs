//! Ports - the seams between the queue and the outside world.
//!
//! The queue core only talks to these traits:
//! - `MessageProcessor`: runs one job (external query + summarisation in production)
//! - `StatusCallback`: hears about every status transition
//! - `Clock` / `IdGenerator`: timestamps and ids, swappable in tests

pub mod clock;
pub mod id_generator;
pub mod processor;
pub mod status_callback;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::processor::{BlockingProcessor, MessageProcessor};
pub use self::status_callback::{NoopCallback, StatusCallback};
