use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Context, Result, anyhow};

use crate::domain::{AccountId, Cents, LedgerEntry};

use super::Snapshot;

/// Durable keyed storage of ledger entries.
///
/// Implementations serialize `save`, `delete_by_id`, `next_id` and `flush`
/// against each other; queries may run concurrently with one another but
/// never observe a write in progress.
pub trait AccountRepository: Send + Sync {
    /// Insert or replace an entry by id, advancing the id counter past it.
    /// Closed entries are not stored, so a delete cannot be undone by a late save.
    fn save(&self, entry: Arc<LedgerEntry>) -> Result<()>;

    fn find_by_id(&self, id: AccountId) -> Result<Option<Arc<LedgerEntry>>>;

    /// All entries, ordered by id.
    fn find_all(&self) -> Result<Vec<Arc<LedgerEntry>>>;

    /// Returns whether an entry was present.
    fn delete_by_id(&self, id: AccountId) -> Result<bool>;

    /// Case-insensitive substring match on the owner name. A blank query matches nothing.
    fn find_by_owner_name_contains(&self, query: &str) -> Result<Vec<Arc<LedgerEntry>>>;

    fn find_by_balance_greater_than(&self, min_balance: Cents) -> Result<Vec<Arc<LedgerEntry>>>;

    fn exists_by_id(&self, id: AccountId) -> Result<bool>;

    fn count(&self) -> Result<usize>;

    /// Hand out the current id counter and advance it.
    fn next_id(&self) -> Result<AccountId>;

    /// Persist the whole store as one atomic operation.
    fn flush(&self) -> Result<()>;

    /// Final flush, called explicitly by the owning process on shutdown.
    fn close(&self) -> Result<()> {
        self.flush()
    }
}

// ========================
// Shared in-memory store
// ========================

/// Id-keyed entries plus the id counter.
#[derive(Debug)]
pub(crate) struct EntryStore {
    entries: BTreeMap<AccountId, Arc<LedgerEntry>>,
    next_id: AccountId,
}

impl Default for EntryStore {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl EntryStore {
    /// Rebuild from a snapshot, keeping the counter ahead of every stored id.
    pub(crate) fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut store = Self {
            next_id: snapshot.next_id.max(1),
            ..Self::default()
        };
        for record in snapshot.accounts {
            let entry = Arc::new(LedgerEntry::from_record(record));
            store.insert(entry);
        }
        store
    }

    pub(crate) fn to_snapshot(&self) -> Result<Snapshot> {
        let mut accounts = Vec::with_capacity(self.entries.len());
        for entry in self.entries.values() {
            if entry.is_closed()? {
                continue;
            }
            accounts.push(
                entry
                    .snapshot()
                    .context("Failed to capture entries for snapshot")?,
            );
        }
        Ok(Snapshot::new(self.next_id, accounts))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn next_id_value(&self) -> AccountId {
        self.next_id
    }

    fn insert(&mut self, entry: Arc<LedgerEntry>) {
        let id = entry.id();
        if id >= self.next_id {
            self.next_id = id.saturating_add(1);
        }
        self.entries.insert(id, entry);
    }
}

/// `EntryStore` behind a reader/writer lock, shared by every backend.
#[derive(Debug, Default)]
pub(crate) struct SharedStore {
    inner: RwLock<EntryStore>,
}

impl SharedStore {
    pub(crate) fn new(store: EntryStore) -> Self {
        Self {
            inner: RwLock::new(store),
        }
    }

    pub(crate) fn read(&self) -> Result<RwLockReadGuard<'_, EntryStore>> {
        self.inner
            .read()
            .map_err(|_| anyhow!("Repository lock poisoned"))
    }

    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, EntryStore>> {
        self.inner
            .write()
            .map_err(|_| anyhow!("Repository lock poisoned"))
    }

    /// Returns whether the entry was stored.
    pub(crate) fn save(&self, entry: Arc<LedgerEntry>) -> Result<bool> {
        let mut store = self.write()?;
        // Checked under the store lock: a delete either sees this insert or wins.
        if entry.is_closed()? {
            return Ok(false);
        }
        store.insert(entry);
        Ok(true)
    }

    pub(crate) fn find_by_id(&self, id: AccountId) -> Result<Option<Arc<LedgerEntry>>> {
        Ok(self.read()?.entries.get(&id).cloned())
    }

    pub(crate) fn find_all(&self) -> Result<Vec<Arc<LedgerEntry>>> {
        Ok(self.read()?.entries.values().cloned().collect())
    }

    pub(crate) fn delete_by_id(&self, id: AccountId) -> Result<bool> {
        Ok(self.write()?.entries.remove(&id).is_some())
    }

    pub(crate) fn find_by_owner_name_contains(
        &self,
        query: &str,
    ) -> Result<Vec<Arc<LedgerEntry>>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let store = self.read()?;
        let mut matches = Vec::new();
        for entry in store.entries.values() {
            if entry.owner_name()?.to_lowercase().contains(&needle) {
                matches.push(Arc::clone(entry));
            }
        }
        Ok(matches)
    }

    pub(crate) fn find_by_balance_greater_than(
        &self,
        min_balance: Cents,
    ) -> Result<Vec<Arc<LedgerEntry>>> {
        let store = self.read()?;
        let mut matches = Vec::new();
        for entry in store.entries.values() {
            if entry.balance()? > min_balance {
                matches.push(Arc::clone(entry));
            }
        }
        Ok(matches)
    }

    pub(crate) fn exists_by_id(&self, id: AccountId) -> Result<bool> {
        Ok(self.read()?.entries.contains_key(&id))
    }

    pub(crate) fn count(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    pub(crate) fn next_id(&self) -> Result<AccountId> {
        let mut store = self.write()?;
        let id = store.next_id;
        store.next_id = id
            .checked_add(1)
            .ok_or_else(|| anyhow!("Account id space exhausted"))?;
        Ok(id)
    }
}

// ========================
// In-memory backend
// ========================

/// Repository without durable storage; `flush` is a no-op.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    store: SharedStore,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccountRepository for InMemoryRepository {
    fn save(&self, entry: Arc<LedgerEntry>) -> Result<()> {
        self.store.save(entry)?;
        Ok(())
    }

    fn find_by_id(&self, id: AccountId) -> Result<Option<Arc<LedgerEntry>>> {
        self.store.find_by_id(id)
    }

    fn find_all(&self) -> Result<Vec<Arc<LedgerEntry>>> {
        self.store.find_all()
    }

    fn delete_by_id(&self, id: AccountId) -> Result<bool> {
        self.store.delete_by_id(id)
    }

    fn find_by_owner_name_contains(&self, query: &str) -> Result<Vec<Arc<LedgerEntry>>> {
        self.store.find_by_owner_name_contains(query)
    }

    fn find_by_balance_greater_than(&self, min_balance: Cents) -> Result<Vec<Arc<LedgerEntry>>> {
        self.store.find_by_balance_greater_than(min_balance)
    }

    fn exists_by_id(&self, id: AccountId) -> Result<bool> {
        self.store.exists_by_id(id)
    }

    fn count(&self) -> Result<usize> {
        self.store.count()
    }

    fn next_id(&self) -> Result<AccountId> {
        self.store.next_id()
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;

    use super::*;

    fn entry(repo: &InMemoryRepository, owner: &str, balance: Cents) -> Arc<LedgerEntry> {
        let id = repo.next_id().unwrap();
        let entry = Arc::new(LedgerEntry::open(id, owner, "1234").unwrap());
        if balance > 0 {
            entry.deposit(balance).unwrap();
        }
        repo.save(Arc::clone(&entry)).unwrap();
        entry
    }

    #[test]
    fn test_save_and_find() {
        let repo = InMemoryRepository::new();
        let a = entry(&repo, "Alice", 0);
        let b = entry(&repo, "Bob", 0);

        assert_eq!((a.id(), b.id()), (1, 2));
        assert!(repo.exists_by_id(1).unwrap());
        assert!(!repo.exists_by_id(3).unwrap());
        assert_eq!(repo.count().unwrap(), 2);
        assert_eq!(repo.find_by_id(2).unwrap().unwrap().id(), 2);
        assert!(repo.find_by_id(9).unwrap().is_none());

        let ids: Vec<AccountId> = repo.find_all().unwrap().iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_save_advances_counter() {
        let repo = InMemoryRepository::new();
        let external = Arc::new(LedgerEntry::open(10, "Imported", "1234").unwrap());
        repo.save(external).unwrap();
        assert_eq!(repo.next_id().unwrap(), 11);

        // Lower ids do not move the counter back.
        let low = Arc::new(LedgerEntry::open(3, "Low", "1234").unwrap());
        repo.save(low).unwrap();
        assert_eq!(repo.next_id().unwrap(), 12);
    }

    #[test]
    fn test_save_is_upsert() {
        let repo = InMemoryRepository::new();
        let a = entry(&repo, "Alice", 0);
        a.deposit(500).unwrap();
        repo.save(Arc::clone(&a)).unwrap();
        assert_eq!(repo.count().unwrap(), 1);
        assert_eq!(repo.find_by_id(1).unwrap().unwrap().balance().unwrap(), 500);
    }

    #[test]
    fn test_delete() {
        let repo = InMemoryRepository::new();
        entry(&repo, "Alice", 0);
        assert!(repo.delete_by_id(1).unwrap());
        assert!(!repo.delete_by_id(1).unwrap());
        assert_eq!(repo.count().unwrap(), 0);
    }

    #[test]
    fn test_closed_entry_is_not_saved_back() {
        let repo = InMemoryRepository::new();
        let a = entry(&repo, "Alice", 0);
        a.close().unwrap();
        assert!(repo.delete_by_id(1).unwrap());

        // A late save from an operation that loaded the entry earlier.
        repo.save(Arc::clone(&a)).unwrap();
        assert!(!repo.exists_by_id(1).unwrap());
        assert!(repo.store.read().unwrap().to_snapshot().unwrap().accounts.is_empty());
    }

    #[test]
    fn test_find_by_owner_name_contains() {
        let repo = InMemoryRepository::new();
        entry(&repo, "Nurlan Bekov", 0);
        entry(&repo, "Aliya Nurlanova", 0);
        entry(&repo, "Timur", 0);

        assert_eq!(repo.find_by_owner_name_contains("NURLAN").unwrap().len(), 2);
        assert_eq!(repo.find_by_owner_name_contains(" timur ").unwrap().len(), 1);
        assert!(repo.find_by_owner_name_contains("   ").unwrap().is_empty());
        assert!(repo.find_by_owner_name_contains("zzz").unwrap().is_empty());
    }

    #[test]
    fn test_find_by_balance_greater_than() {
        let repo = InMemoryRepository::new();
        entry(&repo, "Poor", 0);
        entry(&repo, "Exact", 5000);
        entry(&repo, "Rich", 9000);

        let rich: Vec<AccountId> = repo
            .find_by_balance_greater_than(5000)
            .unwrap()
            .iter()
            .map(|e| e.id())
            .collect();
        assert_eq!(rich, vec![3]);
    }

    #[test]
    fn test_next_id_is_unique_under_contention() {
        let repo = InMemoryRepository::new();
        let ids: Vec<AccountId> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        (0..100)
                            .map(|_| repo.next_id().unwrap())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        let unique: HashSet<_> = ids.iter().copied().collect();
        assert_eq!(unique.len(), 800);
        assert_eq!(repo.next_id().unwrap(), 801);
    }

    #[test]
    fn test_snapshot_restores_counter() {
        let repo = InMemoryRepository::new();
        entry(&repo, "Alice", 100);
        entry(&repo, "Bob", 0);

        let snapshot = repo.store.read().unwrap().to_snapshot().unwrap();
        assert_eq!(snapshot.next_id, 3);
        assert_eq!(snapshot.accounts.len(), 2);

        // A stale counter is raised past the highest stored id.
        let mut stale = snapshot.clone();
        stale.next_id = 1;
        let restored = EntryStore::from_snapshot(stale);
        assert_eq!(restored.next_id_value(), 3);
        assert_eq!(restored.len(), 2);
    }
}
