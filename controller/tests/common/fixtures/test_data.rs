//! Common test data shared across test files

use chrono::{DateTime, TimeZone, Utc};
use collector::CollectionType;
use controller::model::{CollectionRequest, RequestSpec, Target, TargetKind};
use controller::selector::LabelSelector;

pub mod namespaces {
    pub const OPS: &str = "ops";
    pub const FLEET_A: &str = "a";
    pub const FLEET_B: &str = "b";
}

pub mod schedules {
    pub const EVERY_FIVE_MINUTES: &str = "*/5 * * * *";
    pub const EVERY_MINUTE: &str = "* * * * *";
    pub const HOURLY: &str = "0 * * * *";
}

pub const STORAGE: &str = "/tmp/collections";

/// 2024-03-01 at the given UTC time.
pub fn at(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, hour, minute, second).unwrap()
}

pub fn spec(selector: &[(&str, &str)], schedule: &str) -> RequestSpec {
    RequestSpec {
        cluster_selector: LabelSelector::from_labels(selector.iter().copied()),
        schedule: schedule.to_string(),
        starting_deadline_seconds: None,
        storage: STORAGE.to_string(),
    }
}

pub fn techsupport(
    name: &str,
    selector: &[(&str, &str)],
    schedule: &str,
    created: DateTime<Utc>,
) -> CollectionRequest {
    CollectionRequest::new(
        CollectionType::Techsupport,
        namespaces::OPS,
        name,
        spec(selector, schedule),
        created,
    )
}

pub fn cluster(namespace: &str, name: &str, labels: &[(&str, &str)]) -> Target {
    labels
        .iter()
        .fold(Target::new(TargetKind::Cluster, namespace, name), |t, (k, v)| {
            t.with_label(k, v)
        })
}

pub fn sveltos_cluster(namespace: &str, name: &str, labels: &[(&str, &str)]) -> Target {
    labels.iter().fold(
        Target::new(TargetKind::SveltosCluster, namespace, name),
        |t, (k, v)| t.with_label(k, v),
    )
}
