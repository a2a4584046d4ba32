use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast;

use crate::db::{KeyValueStore, StorageError};
use crate::models::{Inquiry, InquiryStatus};

pub const INQUIRIES_KEY: &str = "inquiries";

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("inquiry id is missing")]
    MissingId,

    #[error("inquiry already exists: {0}")]
    Conflict(String),

    #[error("inquiry not found: {0}")]
    NotFound(String),

    #[error("changes not saved: {0}")]
    Storage(#[from] StorageError),

    #[error("changes not saved: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RepositoryEvent {
    Appended { id: String },
    StatusChanged { id: String, status: InquiryStatus },
}

/// Insertion-ordered inquiry collection mirrored to a key-value store.
///
/// Every mutation writes the full collection before it is applied in memory,
/// and the collection lock is held across the write so mutations apply in
/// the order they were issued.
pub struct InquiryRepository {
    store: Arc<dyn KeyValueStore>,
    inquiries: Mutex<Vec<Inquiry>>,
    events: broadcast::Sender<RepositoryEvent>,
}

impl InquiryRepository {
    pub fn load(store: Arc<dyn KeyValueStore>) -> Result<Self, RepositoryError> {
        let inquiries: Vec<Inquiry> = match store.load(INQUIRIES_KEY)? {
            Some(json) => serde_json::from_str(&json)?,
            None => Vec::new(),
        };

        tracing::info!(count = inquiries.len(), "loaded inquiries");

        let (events, _) = broadcast::channel(256);
        Ok(Self {
            store,
            inquiries: Mutex::new(inquiries),
            events,
        })
    }

    pub fn list(&self) -> Vec<Inquiry> {
        self.collection().clone()
    }

    pub fn get(&self, id: &str) -> Option<Inquiry> {
        self.collection().iter().find(|i| i.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.collection().len()
    }

    pub fn is_empty(&self) -> bool {
        self.collection().is_empty()
    }

    pub fn append(&self, record: Inquiry) -> Result<(), RepositoryError> {
        if record.id.trim().is_empty() {
            return Err(RepositoryError::MissingId);
        }

        let mut inquiries = self.collection();
        if inquiries.iter().any(|i| i.id == record.id) {
            return Err(RepositoryError::Conflict(record.id));
        }

        let id = record.id.clone();
        let mut next = inquiries.clone();
        next.push(record);
        self.persist(&next)?;
        *inquiries = next;
        drop(inquiries);

        tracing::info!(inquiry_id = %id, "inquiry appended");
        // No receivers is fine
        let _ = self.events.send(RepositoryEvent::Appended { id });
        Ok(())
    }

    pub fn update_status(
        &self,
        id: &str,
        status: InquiryStatus,
    ) -> Result<Inquiry, RepositoryError> {
        let mut inquiries = self.collection();
        let index = inquiries
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;

        let mut next = inquiries.clone();
        let previous = next[index].status;
        next[index].status = status;
        let updated = next[index].clone();
        self.persist(&next)?;
        *inquiries = next;
        drop(inquiries);

        tracing::info!(
            inquiry_id = %id,
            from = previous.as_str(),
            to = status.as_str(),
            "inquiry status updated"
        );
        let _ = self.events.send(RepositoryEvent::StatusChanged {
            id: id.to_string(),
            status,
        });
        Ok(updated)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RepositoryEvent> {
        self.events.subscribe()
    }

    fn persist(&self, inquiries: &[Inquiry]) -> Result<(), RepositoryError> {
        let json = serde_json::to_string(inquiries)?;
        self.store.save(INQUIRIES_KEY, &json).map_err(|e| {
            tracing::error!(error = %e, "failed to persist inquiries");
            RepositoryError::from(e)
        })
    }

    fn collection(&self) -> MutexGuard<'_, Vec<Inquiry>> {
        // Memory is only written after a successful persist, so a poisoned
        // guard still holds a consistent collection.
        self.inquiries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::db::MemoryStore;
    use crate::models::InquiryFields;

    struct FlakyStore {
        inner: MemoryStore,
        fail_writes: AtomicBool,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                fail_writes: AtomicBool::new(false),
            }
        }
    }

    impl KeyValueStore for FlakyStore {
        fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.load(key)
        }

        fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StorageError::Unavailable("quota exceeded".to_string()));
            }
            self.inner.save(key, value)
        }
    }

    fn inquiry(name: &str) -> Inquiry {
        Inquiry::new(
            InquiryFields {
                name: name.to_string(),
                phone: "090-0000-0000".to_string(),
                address: "東京都".to_string(),
                preferred_date: None,
                items_description: None,
            },
            None,
            None,
        )
    }

    #[test]
    fn test_empty_store_loads_empty() {
        let repo = InquiryRepository::load(Arc::new(MemoryStore::new())).unwrap();
        assert!(repo.is_empty());
        assert!(repo.list().is_empty());
    }

    #[test]
    fn test_append_keeps_insertion_order() {
        let repo = InquiryRepository::load(Arc::new(MemoryStore::new())).unwrap();
        repo.append(inquiry("A")).unwrap();
        repo.append(inquiry("B")).unwrap();
        repo.append(inquiry("C")).unwrap();

        let names: Vec<_> = repo.list().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_list_is_idempotent() {
        let repo = InquiryRepository::load(Arc::new(MemoryStore::new())).unwrap();
        repo.append(inquiry("A")).unwrap();
        assert_eq!(repo.list(), repo.list());
    }

    #[test]
    fn test_append_rejects_missing_id() {
        let repo = InquiryRepository::load(Arc::new(MemoryStore::new())).unwrap();
        let mut record = inquiry("A");
        record.id = String::new();
        assert!(matches!(repo.append(record), Err(RepositoryError::MissingId)));
        assert!(repo.is_empty());
    }

    #[test]
    fn test_append_rejects_duplicate_id() {
        let repo = InquiryRepository::load(Arc::new(MemoryStore::new())).unwrap();
        let record = inquiry("A");
        repo.append(record.clone()).unwrap();
        assert!(matches!(
            repo.append(record),
            Err(RepositoryError::Conflict(_))
        ));
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn test_update_status_touches_only_target() {
        let repo = InquiryRepository::load(Arc::new(MemoryStore::new())).unwrap();
        let a = inquiry("A");
        let b = inquiry("B");
        repo.append(a.clone()).unwrap();
        repo.append(b.clone()).unwrap();

        let updated = repo.update_status(&a.id, InquiryStatus::Reviewing).unwrap();
        assert_eq!(updated.status, InquiryStatus::Reviewing);

        let list = repo.list();
        let mut expected_a = a.clone();
        expected_a.status = InquiryStatus::Reviewing;
        assert_eq!(list, vec![expected_a, b]);
    }

    #[test]
    fn test_any_status_may_follow_any_status() {
        let repo = InquiryRepository::load(Arc::new(MemoryStore::new())).unwrap();
        let a = inquiry("A");
        repo.append(a.clone()).unwrap();
        repo.update_status(&a.id, InquiryStatus::Cancelled).unwrap();
        repo.update_status(&a.id, InquiryStatus::Pending).unwrap();
        repo.update_status(&a.id, InquiryStatus::Completed).unwrap();
        assert_eq!(repo.get(&a.id).unwrap().status, InquiryStatus::Completed);
    }

    #[test]
    fn test_update_status_unknown_id() {
        let repo = InquiryRepository::load(Arc::new(MemoryStore::new())).unwrap();
        repo.append(inquiry("A")).unwrap();
        let before = repo.list();
        assert!(matches!(
            repo.update_status("missing", InquiryStatus::Reviewing),
            Err(RepositoryError::NotFound(_))
        ));
        assert_eq!(repo.list(), before);
    }

    #[test]
    fn test_reload_yields_same_records() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let repo = InquiryRepository::load(Arc::clone(&store)).unwrap();
        for name in ["A", "B", "C", "D"] {
            repo.append(inquiry(name)).unwrap();
        }
        let id = repo.list()[1].id.clone();
        repo.update_status(&id, InquiryStatus::Completed).unwrap();

        let reloaded = InquiryRepository::load(store).unwrap();
        assert_eq!(reloaded.list(), repo.list());
    }

    #[test]
    fn test_failed_persist_leaves_memory_unchanged() {
        let store = Arc::new(FlakyStore::new());
        let repo = InquiryRepository::load(Arc::clone(&store) as Arc<dyn KeyValueStore>).unwrap();
        let a = inquiry("A");
        repo.append(a.clone()).unwrap();

        store.fail_writes.store(true, Ordering::SeqCst);
        assert!(matches!(
            repo.append(inquiry("B")),
            Err(RepositoryError::Storage(_))
        ));
        assert!(matches!(
            repo.update_status(&a.id, InquiryStatus::Reviewing),
            Err(RepositoryError::Storage(_))
        ));
        assert_eq!(repo.list(), vec![a.clone()]);

        // Recovers once storage is writable again
        store.fail_writes.store(false, Ordering::SeqCst);
        repo.append(inquiry("B")).unwrap();
        assert_eq!(repo.len(), 2);

        let reloaded = InquiryRepository::load(store).unwrap();
        assert_eq!(reloaded.list(), repo.list());
    }

    #[test]
    fn test_corrupt_blob_fails_load() {
        let store = MemoryStore::new();
        store.save(INQUIRIES_KEY, "{not json").unwrap();
        assert!(matches!(
            InquiryRepository::load(Arc::new(store)),
            Err(RepositoryError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_mutations_notify_subscribers() {
        let repo = InquiryRepository::load(Arc::new(MemoryStore::new())).unwrap();
        let mut rx = repo.subscribe();

        let a = inquiry("A");
        repo.append(a.clone()).unwrap();
        repo.update_status(&a.id, InquiryStatus::Reviewing).unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            RepositoryEvent::Appended { id: a.id.clone() }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            RepositoryEvent::StatusChanged {
                id: a.id.clone(),
                status: InquiryStatus::Reviewing,
            }
        );
    }
}
