//! Versioned application state with publish/invalidate semantics.

use std::sync::{Arc, RwLock};

use tokio::sync::watch;
use tracing::debug;

use crate::core::{DatasetVersion, Schedule};

/// An immutable dataset version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub version: DatasetVersion,
    pub schedule: Schedule,
}

/// Holds the current dataset. Writers commit whole new versions; readers take
/// `Arc` snapshots or subscribe to version changes. Last commit wins.
#[derive(Debug)]
pub struct DatasetStore {
    current: RwLock<Arc<Snapshot>>,
    notify: watch::Sender<DatasetVersion>,
}

impl DatasetStore {
    pub fn new(schedule: Schedule) -> Self {
        let version = DatasetVersion::default();
        let (notify, _) = watch::channel(version);
        Self {
            current: RwLock::new(Arc::new(Snapshot { version, schedule })),
            notify,
        }
    }

    pub fn current(&self) -> Arc<Snapshot> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn version(&self) -> DatasetVersion {
        self.current().version
    }

    /// Publish a new dataset and notify subscribers
    pub fn commit(&self, schedule: Schedule) -> DatasetVersion {
        let version = {
            let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
            let version = guard.version.next();
            *guard = Arc::new(Snapshot { version, schedule });
            version
        };
        debug!("committed dataset {}", version);
        self.notify.send_replace(version);
        version
    }

    /// Receiver that observes every commit after this call
    pub fn subscribe(&self) -> watch::Receiver<DatasetVersion> {
        self.notify.subscribe()
    }
}

impl Default for DatasetStore {
    fn default() -> Self {
        Self::new(Schedule::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Lovs, ScheduleRecord};

    fn one_record(name: &str) -> Schedule {
        Schedule::new(
            vec![ScheduleRecord { project_descr: Some(name.into()), ..Default::default() }],
            Lovs::default(),
        )
    }

    #[test]
    fn test_commit_bumps_version_and_keeps_old_snapshots() {
        let store = DatasetStore::default();
        let before = store.current();
        assert_eq!(before.version.get(), 0);

        let v1 = store.commit(one_record("A"));
        assert_eq!(v1.get(), 1);
        assert!(before.schedule.is_empty());
        assert_eq!(store.current().schedule.len(), 1);

        let v2 = store.commit(Schedule::default());
        assert!(v2 > v1);
        assert_eq!(store.version(), v2);
    }

    #[test]
    fn test_subscribers_see_invalidation() {
        let store = DatasetStore::default();
        let mut rx = store.subscribe();
        assert!(!rx.has_changed().unwrap());

        store.commit(one_record("A"));
        store.commit(one_record("B"));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().get(), 2);
        assert!(!rx.has_changed().unwrap());
    }
}
