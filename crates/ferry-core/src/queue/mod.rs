//! Queue module: work channel, Job Table, retention and the controller.

mod channel;
mod controller;
mod retention;
pub(crate) mod shared;
mod table;

pub use channel::BoundedChannel;
pub use controller::QueueController;
pub use retention::RetentionPolicy;
pub use table::{Claim, JobTable};
