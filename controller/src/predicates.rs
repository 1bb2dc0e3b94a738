//! Event filters deciding which watch notifications trigger a reconcile.

use tracing::debug;

use crate::model::{CollectionRequest, Target};

/// A change notification for a watched object.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<T> {
    Create(T),
    Update { old: Option<T>, new: T },
    Delete(T),
    Generic(T),
}

impl<T> WatchEvent<T> {
    /// The object as it is after the event.
    pub fn object(&self) -> &T {
        match self {
            WatchEvent::Create(obj) | WatchEvent::Delete(obj) | WatchEvent::Generic(obj) => obj,
            WatchEvent::Update { new, .. } => new,
        }
    }
}

/// One filter per event type.
pub struct Predicates<T> {
    pub create: fn(&T) -> bool,
    pub update: fn(Option<&T>, &T) -> bool,
    pub delete: fn(&T) -> bool,
    pub generic: fn(&T) -> bool,
}

impl<T> Predicates<T> {
    pub fn admit(&self, event: &WatchEvent<T>) -> bool {
        match event {
            WatchEvent::Create(obj) => (self.create)(obj),
            WatchEvent::Update { old, new } => (self.update)(old.as_ref(), new),
            WatchEvent::Delete(obj) => (self.delete)(obj),
            WatchEvent::Generic(obj) => (self.generic)(obj),
        }
    }
}

pub const TARGET_PREDICATES: Predicates<Target> = Predicates {
    create: target_create,
    update: target_update,
    delete: always::<Target>,
    generic: never::<Target>,
};

pub const REQUEST_PREDICATES: Predicates<CollectionRequest> = Predicates {
    create: always::<CollectionRequest>,
    update: request_update,
    delete: always::<CollectionRequest>,
    generic: never::<CollectionRequest>,
};

fn always<T>(_: &T) -> bool {
    true
}

fn never<T>(_: &T) -> bool {
    false
}

fn target_create(target: &Target) -> bool {
    if target.paused {
        debug!("Ignoring create of paused {} {}/{}", target.kind.as_str(), target.namespace, target.name);
        return false;
    }
    true
}

fn target_update(old: Option<&Target>, new: &Target) -> bool {
    let Some(old) = old else {
        return true;
    };

    if old.paused && !new.paused {
        debug!("{} {}/{} was unpaused", new.kind.as_str(), new.namespace, new.name);
        return true;
    }
    if !old.ready && new.ready {
        debug!("{} {}/{} became ready", new.kind.as_str(), new.namespace, new.name);
        return true;
    }
    if old.labels != new.labels {
        debug!("{} {}/{} labels changed", new.kind.as_str(), new.namespace, new.name);
        return true;
    }

    false
}

fn request_update(old: Option<&CollectionRequest>, new: &CollectionRequest) -> bool {
    let Some(old) = old else {
        return true;
    };

    if old.metadata.generation != new.metadata.generation || old.spec != new.spec {
        return true;
    }
    if !old.metadata.is_deleting() && new.metadata.is_deleting() {
        return true;
    }

    // Status-only writes come from the reconciler itself.
    false
}
