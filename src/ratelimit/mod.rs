//! Leaky bucket admission control.

mod bucket;
mod gate;
mod limiter;
mod waiters;

pub use bucket::{Bucket, Fit};
pub use gate::AdmissionGate;
pub use limiter::{Admission, LeakyBucket};
pub use waiters::{Ticket, WaiterRegistry};
