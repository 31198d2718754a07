//! Batch fetch plumbing built on the admission gate.
//!
//! Each work item is admitted once per outbound call. Throttled responses are
//! requeued here; the limiter itself knows nothing about retries.

mod collector;
mod driver;
mod fetcher;
mod item;

pub use collector::{CollectedResponses, FetchedResponse, ResponseCollector, ResponseSender};
pub use driver::{BatchDriver, BatchReport};
pub use fetcher::{FetchOutcome, Fetcher, HttpFetcher};
pub use item::WorkItem;
