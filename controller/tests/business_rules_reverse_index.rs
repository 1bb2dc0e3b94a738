//! Business Rule Tests: Reverse Index
//!
//! The index maps requests to the targets they match and targets back to
//! their consumers. Both directions must agree after every operation.

mod common;

use collector::CollectionType;
use common::fixtures::*;
use controller::model::{RequestKey, TargetKind, TargetReference};
use controller::selector::Selector;
use controller::ReverseIndex;
use rstest::rstest;

fn request(name: &str) -> RequestKey {
    RequestKey::new(CollectionType::Techsupport, namespaces::OPS, name)
}

fn target(name: &str) -> TargetReference {
    TargetReference::new(TargetKind::Cluster, namespaces::FLEET_A, name)
}

/// Small deterministic generator so failures reproduce.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: usize) -> usize {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((self.0 >> 33) as usize) % bound
    }
}

#[rstest]
#[case(1)]
#[case(7)]
#[case(42)]
#[case(20240301)]
#[tokio::test]
async fn test_index_stays_consistent_across_operation_sequences(#[case] seed: u64) {
    let index = ReverseIndex::new();
    let requests: Vec<RequestKey> = (0..4).map(|i| request(&format!("r{}", i))).collect();
    let targets: Vec<TargetReference> = (0..6).map(|i| target(&format!("c{}", i))).collect();
    let mut rng = Lcg(seed);

    for _ in 0..200 {
        let req = &requests[rng.next(requests.len())];
        if rng.next(5) == 0 {
            index.remove(req).await;
        } else {
            let matched: Vec<TargetReference> = targets
                .iter()
                .filter(|_| rng.next(2) == 0)
                .cloned()
                .collect();
            index.update(req, Selector::everything(), &matched).await;

            let mut expected = matched.clone();
            expected.sort();
            assert_eq!(index.targets_of(req).await, expected);
        }

        let snapshot = index.snapshot().await;
        assert!(snapshot.is_consistent(), "index diverged with seed {}", seed);
        assert!(snapshot.target_to_requests.values().all(|set| !set.is_empty()));
    }
}

#[tokio::test]
async fn test_deleting_one_consumer_keeps_the_other() {
    let index = ReverseIndex::new();
    let a = request("a");
    let b = request("b");
    let c1 = target("c1");

    index.update(&a, Selector::everything(), &[c1.clone()]).await;
    index.update(&b, Selector::everything(), &[c1.clone()]).await;
    assert_eq!(index.consumers_of(&c1).await, vec![a.clone(), b.clone()]);

    index.remove(&a).await;
    assert_eq!(index.consumers_of(&c1).await, vec![b]);
    assert!(index.targets_of(&a).await.is_empty());
}

#[tokio::test]
async fn test_removal_drains_every_reference() {
    let index = ReverseIndex::new();
    let a = request("a");
    index
        .update(&a, Selector::everything(), &[target("c1"), target("c2")])
        .await;

    index.remove(&a).await;
    index.remove(&a).await;

    let snapshot = index.snapshot().await;
    assert!(!snapshot.request_to_targets.contains_key(&a));
    assert!(snapshot.target_to_requests.values().all(|set| !set.contains(&a)));
    assert!(snapshot.target_to_requests.is_empty());
}

#[tokio::test]
async fn test_shrinking_match_set_releases_targets() {
    let index = ReverseIndex::new();
    let a = request("a");

    index
        .update(&a, Selector::everything(), &[target("c1"), target("c2")])
        .await;
    index.update(&a, Selector::everything(), &[target("c2")]).await;

    assert!(index.consumers_of(&target("c1")).await.is_empty());
    assert_eq!(index.consumers_of(&target("c2")).await, vec![a]);
}
