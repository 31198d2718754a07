//! Response handler for a batch job.

use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::item::WorkItem;

/// A payload returned for one work item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchedResponse {
    pub id: String,
    pub url: String,
    pub data: serde_json::Value,
}

/// Responses in arrival order, indexed by item id.
#[derive(Debug, Default)]
pub struct CollectedResponses {
    entries: Vec<FetchedResponse>,
    by_id: HashMap<String, Vec<usize>>,
}

impl CollectedResponses {
    pub fn push(&mut self, response: FetchedResponse) {
        self.by_id
            .entry(response.id.clone())
            .or_default()
            .push(self.entries.len());
        self.entries.push(response);
    }

    /// Responses for one item id, in arrival order.
    pub fn for_item<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a FetchedResponse> + 'a {
        self.by_id
            .get(id)
            .into_iter()
            .flatten()
            .map(move |&index| &self.entries[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = &FetchedResponse> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct item ids with at least one response.
    pub fn item_count(&self) -> usize {
        self.by_id.len()
    }

    pub fn into_vec(self) -> Vec<FetchedResponse> {
        self.entries
    }
}

/// Sending half handed to whoever produces responses.
pub type ResponseSender = mpsc::Sender<(WorkItem, serde_json::Value)>;

/// Consumes responses until every sender is dropped.
///
/// Closing the channel is the stop signal.
pub struct ResponseCollector {
    rx: mpsc::Receiver<(WorkItem, serde_json::Value)>,
}

impl ResponseCollector {
    /// Create a collector and the sender feeding it.
    pub fn channel(buffer: usize) -> (ResponseSender, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self { rx })
    }

    /// Run the collector on its own task.
    pub fn spawn(self) -> JoinHandle<CollectedResponses> {
        tokio::spawn(self.run())
    }

    /// Drain the channel until it closes.
    pub async fn run(mut self) -> CollectedResponses {
        let mut collected = CollectedResponses::default();
        while let Some((item, data)) = self.rx.recv().await {
            debug!(item = %item, "Collected response");
            collected.push(FetchedResponse {
                id: item.id,
                url: item.url,
                data,
            });
        }
        collected
    }
}
