//! Bidirectional request/target index
//!
//! Tracks which targets each request currently matches and, in reverse,
//! which requests consume each target. Both maps (and the selectors used
//! for fan-out of target events) sit behind one lock, so every update is
//! applied as a single transaction.
//!
//! The index is a volatile cache: it is rebuilt by reconciling every request
//! after a restart.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::model::{RequestKey, Target, TargetReference};
use crate::selector::Selector;

#[derive(Default)]
struct IndexState {
    request_to_targets: HashMap<RequestKey, HashSet<TargetReference>>,
    target_to_requests: HashMap<TargetReference, HashSet<RequestKey>>,
    selectors: HashMap<RequestKey, Selector>,
}

/// Ordered copy of the index, for inspection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSnapshot {
    pub request_to_targets: BTreeMap<RequestKey, BTreeSet<TargetReference>>,
    pub target_to_requests: BTreeMap<TargetReference, BTreeSet<RequestKey>>,
}

impl IndexSnapshot {
    /// `T ∈ request_to_targets[R]` iff `R ∈ target_to_requests[T]`, and no
    /// empty consumer sets are kept.
    pub fn is_consistent(&self) -> bool {
        let forward_ok = self.request_to_targets.iter().all(|(request, targets)| {
            targets.iter().all(|target| {
                self.target_to_requests
                    .get(target)
                    .is_some_and(|consumers| consumers.contains(request))
            })
        });
        let reverse_ok = self.target_to_requests.iter().all(|(target, consumers)| {
            !consumers.is_empty()
                && consumers.iter().all(|request| {
                    self.request_to_targets
                        .get(request)
                        .is_some_and(|targets| targets.contains(target))
                })
        });
        forward_ok && reverse_ok
    }
}

#[derive(Default)]
pub struct ReverseIndex {
    state: Mutex<IndexState>,
}

impl ReverseIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the matched set of `request` and fixes up the reverse map.
    #[instrument(skip(self, selector, targets), fields(request = %request, matched = targets.len()))]
    pub async fn update(&self, request: &RequestKey, selector: Selector, targets: &[TargetReference]) {
        let current: HashSet<TargetReference> = targets.iter().cloned().collect();

        let mut state = self.state.lock().await;

        let removed: Vec<TargetReference> = state
            .request_to_targets
            .get(request)
            .map(|previous| previous.difference(&current).cloned().collect())
            .unwrap_or_default();

        for target in &current {
            state
                .target_to_requests
                .entry(target.clone())
                .or_default()
                .insert(request.clone());
        }

        for target in &removed {
            erase_consumer(&mut state.target_to_requests, target, request);
        }

        if !removed.is_empty() {
            debug!("{} no longer matches {} targets", request, removed.len());
        }

        state.request_to_targets.insert(request.clone(), current);
        state.selectors.insert(request.clone(), selector);
    }

    /// Drops every trace of `request` from the index.
    #[instrument(skip(self), fields(request = %request))]
    pub async fn remove(&self, request: &RequestKey) {
        let mut state = self.state.lock().await;

        state.request_to_targets.remove(request);
        state.selectors.remove(request);

        // Full scan: removal is rare compared to update.
        state.target_to_requests.retain(|_, consumers| {
            consumers.remove(request);
            !consumers.is_empty()
        });
    }

    /// Requests currently matching `target`.
    pub async fn consumers_of(&self, target: &TargetReference) -> Vec<RequestKey> {
        let state = self.state.lock().await;
        let mut consumers: Vec<RequestKey> = state
            .target_to_requests
            .get(target)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        consumers.sort();
        consumers
    }

    /// Requests that may need reconciling after `target` changed: its current
    /// consumers plus every request whose selector matches its labels now.
    pub async fn requests_for_target(&self, target: &Target) -> Vec<RequestKey> {
        let reference = target.reference();
        let state = self.state.lock().await;

        let mut affected: BTreeSet<RequestKey> = state
            .target_to_requests
            .get(&reference)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();

        affected.extend(
            state
                .selectors
                .iter()
                .filter(|(_, selector)| selector.matches(&target.labels))
                .map(|(request, _)| request.clone()),
        );

        affected.into_iter().collect()
    }

    pub async fn targets_of(&self, request: &RequestKey) -> Vec<TargetReference> {
        let state = self.state.lock().await;
        let mut targets: Vec<TargetReference> = state
            .request_to_targets
            .get(request)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        targets.sort();
        targets
    }

    pub async fn snapshot(&self) -> IndexSnapshot {
        let state = self.state.lock().await;
        IndexSnapshot {
            request_to_targets: state
                .request_to_targets
                .iter()
                .map(|(k, v)| (k.clone(), v.iter().cloned().collect()))
                .collect(),
            target_to_requests: state
                .target_to_requests
                .iter()
                .map(|(k, v)| (k.clone(), v.iter().cloned().collect()))
                .collect(),
        }
    }
}

fn erase_consumer(
    target_to_requests: &mut HashMap<TargetReference, HashSet<RequestKey>>,
    target: &TargetReference,
    request: &RequestKey,
) {
    if let Some(consumers) = target_to_requests.get_mut(target) {
        consumers.remove(request);
        if consumers.is_empty() {
            target_to_requests.remove(target);
        }
    }
}
