//! Collection requests, targets and the references between them.

use chrono::{DateTime, Utc};
use collector::CollectionType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::KeyError;
use crate::selector::LabelSelector;

const MAX_LABEL_LENGTH: usize = 63;

/// Checks that `value` is a DNS-1123 label: at most 63 lowercase
/// alphanumerics or '-', starting and ending with an alphanumeric.
pub fn validate_dns_label(field: &'static str, value: &str) -> Result<(), KeyError> {
    let valid = !value.is_empty()
        && value.len() <= MAX_LABEL_LENGTH
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !value.starts_with('-')
        && !value.ends_with('-');
    if valid {
        Ok(())
    } else {
        Err(KeyError::InvalidName {
            field,
            value: value.to_string(),
        })
    }
}

/// Identity of a collection request in the reverse index and the work queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    pub kind: CollectionType,
    pub namespace: String,
    pub name: String,
}

impl RequestKey {
    pub fn new(kind: CollectionType, namespace: &str, name: &str) -> Self {
        Self {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Builds the key of a request, rejecting objects without a valid identity.
    /// Namespace and name end up in job names and artifact paths, so both
    /// must be DNS-1123 labels.
    pub fn from_request(request: &CollectionRequest) -> Result<Self, KeyError> {
        if request.metadata.name.is_empty() {
            return Err(KeyError::MissingName);
        }
        if request.metadata.namespace.is_empty() {
            return Err(KeyError::MissingNamespace {
                name: request.metadata.name.clone(),
            });
        }
        validate_dns_label("namespace", &request.metadata.namespace)?;
        validate_dns_label("name", &request.metadata.name)?;
        Ok(Self::new(
            request.kind,
            &request.metadata.namespace,
            &request.metadata.name,
        ))
    }

    /// Name under which the collector tracks jobs of this request.
    pub fn job_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub namespace: String,
    pub name: String,
    pub creation_timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finalizers: Vec<String>,
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default)]
    pub generation: u64,
}

impl ObjectMeta {
    pub fn new(namespace: &str, name: &str, creation_timestamp: DateTime<Utc>) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            creation_timestamp,
            deletion_timestamp: None,
            finalizers: Vec::new(),
            resource_version: 0,
            generation: 1,
        }
    }

    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    /// Returns `true` when the finalizer was added.
    pub fn add_finalizer(&mut self, finalizer: &str) -> bool {
        if self.has_finalizer(finalizer) {
            return false;
        }
        self.finalizers.push(finalizer.to_string());
        true
    }

    /// Returns `true` when the finalizer was present.
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let before = self.finalizers.len();
        self.finalizers.retain(|f| f != finalizer);
        before != self.finalizers.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSpec {
    #[serde(default)]
    pub cluster_selector: LabelSelector,
    /// Standard 5-field cron expression.
    pub schedule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting_deadline_seconds: Option<i64>,
    /// Directory the collector writes artifacts into.
    pub storage: String,
}

/// Outcome of the most recent collection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionStatus {
    Collected,
    InProgress,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStatus {
    #[serde(default)]
    pub last_run_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_schedule_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_run_status: Option<CollectionStatus>,
    #[serde(default)]
    pub failure_message: String,
    #[serde(default)]
    pub matching_cluster_refs: Vec<TargetReference>,
}

/// A user-declared intent to collect an artifact on a cron schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRequest {
    pub kind: CollectionType,
    pub metadata: ObjectMeta,
    pub spec: RequestSpec,
    #[serde(default)]
    pub status: RequestStatus,
}

impl CollectionRequest {
    pub fn new(
        kind: CollectionType,
        namespace: &str,
        name: &str,
        spec: RequestSpec,
        creation_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            metadata: ObjectMeta::new(namespace, name, creation_timestamp),
            spec,
            status: RequestStatus::default(),
        }
    }

    pub fn key(&self) -> Result<RequestKey, KeyError> {
        RequestKey::from_request(self)
    }

    pub fn finalizer(&self) -> &'static str {
        self.kind.finalizer()
    }
}

/// The two disjoint remote-cluster catalogs.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum TargetKind {
    #[default]
    Cluster,
    SveltosCluster,
}

impl TargetKind {
    pub const ALL: [TargetKind; 2] = [TargetKind::Cluster, TargetKind::SveltosCluster];

    pub fn api_version(&self) -> &'static str {
        match self {
            TargetKind::Cluster => "cluster.x-k8s.io/v1beta1",
            TargetKind::SveltosCluster => "lib.projectsveltos.io/v1beta1",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Cluster => "Cluster",
            TargetKind::SveltosCluster => "SveltosCluster",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        TargetKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value))
    }
}

/// Structural reference to a target, used as a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetReference {
    pub namespace: String,
    pub name: String,
    pub kind: String,
    pub api_version: String,
}

impl TargetReference {
    pub fn new(kind: TargetKind, namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            kind: kind.as_str().to_string(),
            api_version: kind.api_version().to_string(),
        }
    }
}

impl fmt::Display for TargetReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

fn default_ready() -> bool {
    true
}

/// A remote cluster as seen in one of the catalogs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub kind: TargetKind,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub paused: bool,
    #[serde(default = "default_ready")]
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl Target {
    pub fn new(kind: TargetKind, namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            kind,
            labels: BTreeMap::new(),
            paused: false,
            ready: true,
            deletion_timestamp: None,
        }
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn reference(&self) -> TargetReference {
        TargetReference::new(self.kind, &self.namespace, &self.name)
    }
}
