pub mod backoff;
pub mod clock;
pub mod tentative_id;
pub mod validation;

pub use backoff::Backoff;
pub use clock::{Clock, ManualClock, SystemClock};
