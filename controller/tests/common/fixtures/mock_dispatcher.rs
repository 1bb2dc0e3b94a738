//! Recording dispatcher for reconciler tests

use async_trait::async_trait;
use collector::{CollectFn, CollectionResult, CollectionType};
use controller::errors::ControllerError;
use controller::Dispatcher;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

const STORAGE_UNAVAILABLE: &str = "/unavailable";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub request_name: String,
    pub collection_type: CollectionType,
}

/// Dispatcher that records calls and reports whatever result a test sets.
#[derive(Default)]
pub struct MockDispatcher {
    submissions: Mutex<Vec<Submission>>,
    results: Mutex<HashMap<(String, CollectionType), CollectionResult>>,
    purges: Mutex<Vec<Submission>>,
    fail_purge: AtomicBool,
}

impl MockDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_result(&self, request_name: &str, collection_type: CollectionType, result: CollectionResult) {
        self.results
            .lock()
            .unwrap()
            .insert((request_name.to_string(), collection_type), result);
    }

    pub fn fail_purges(&self, fail: bool) {
        self.fail_purge.store(fail, Ordering::SeqCst);
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn purges(&self) -> Vec<Submission> {
        self.purges.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dispatcher for MockDispatcher {
    async fn submit(
        &self,
        request_name: &str,
        collection_type: CollectionType,
        _collect: CollectFn,
    ) -> Result<bool, ControllerError> {
        self.submissions.lock().unwrap().push(Submission {
            request_name: request_name.to_string(),
            collection_type,
        });
        Ok(true)
    }

    async fn last_result(&self, request_name: &str, collection_type: CollectionType) -> CollectionResult {
        self.results
            .lock()
            .unwrap()
            .get(&(request_name.to_string(), collection_type))
            .cloned()
            .unwrap_or(CollectionResult::Unavailable)
    }

    async fn purge_all(
        &self,
        _storage: &str,
        request_name: &str,
        collection_type: CollectionType,
    ) -> Result<(), ControllerError> {
        if self.fail_purge.load(Ordering::SeqCst) {
            return Err(ControllerError::Collector(collector::CollectorError::Io {
                path: STORAGE_UNAVAILABLE.to_string(),
                source: std::io::Error::other("storage unavailable"),
            }));
        }
        self.purges.lock().unwrap().push(Submission {
            request_name: request_name.to_string(),
            collection_type,
        });
        self.results
            .lock()
            .unwrap()
            .remove(&(request_name.to_string(), collection_type));
        Ok(())
    }
}
