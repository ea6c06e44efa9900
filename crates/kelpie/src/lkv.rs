use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use kelpie_common::{Bucket, Error, Key, Result};
use kelpie_lunasa::{Allocator, DataObject};

/// Availability a column reports through `Meta`/`Info`, mirroring the
/// source's `col_availability` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Unavailable,
    Waiting,
    InLocalMemory,
    InRemoteMemory,
    InDisk,
}

#[derive(Debug, Clone)]
pub struct EntryInfo {
    pub user_bytes: usize,
    pub availability: Availability,
}

/// A compute function: given the requesting pattern, an argument string, the
/// matching `(key, ldo)` pairs from the row, and the allocator to use if it
/// needs to produce a fresh (e.g. empty) LDO, produce a result LDO.
pub type ComputeFn = Arc<
    dyn Fn(&Key, &str, &[(Key, DataObject)], &Arc<dyn Allocator>) -> Result<DataObject>
        + Send
        + Sync,
>;

pub type Waiter = Box<dyn FnOnce(Result<DataObject>) + Send>;

struct Column {
    ldo: Option<DataObject>,
    info: EntryInfo,
    waiters: Vec<Waiter>,
}

#[derive(Default)]
struct Row {
    columns: HashMap<String, Column>,
}

/// Process-local row-major key/value table: `bucket -> k1 -> k2 -> column`.
/// Protected by one reader/writer lock per the concurrency model — rows
/// aren't locked individually, so waiter invocation always happens after
/// releasing the write guard to avoid a waiter reentering the LKV while it's
/// held.
pub struct Lkv {
    allocator: Arc<dyn Allocator>,
    rows: RwLock<HashMap<(Bucket, String), Row>>,
    compute_fns: RwLock<HashMap<String, ComputeFn>>,
    started: AtomicBool,
}

impl Lkv {
    pub fn new(allocator: Arc<dyn Allocator>) -> Arc<Self> {
        let lkv = Arc::new(Lkv {
            allocator,
            rows: RwLock::new(HashMap::new()),
            compute_fns: RwLock::new(HashMap::new()),
            started: AtomicBool::new(false),
        });
        lkv.compute_fns
            .try_write()
            .expect("uncontended at construction")
            .insert("pick".to_string(), Arc::new(crate::compute::pick) as ComputeFn);
        lkv
    }

    /// Ops registered before this point may still register compute
    /// functions; afterwards `register_compute` fails, matching the source's
    /// bootstrap-ordered function table.
    pub fn start(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    pub fn allocator(&self) -> &Arc<dyn Allocator> {
        &self.allocator
    }

    pub async fn register_compute(&self, name: &str, f: ComputeFn) -> Result<()> {
        if self.started.load(Ordering::SeqCst) {
            return Err(Error::unavailable("cannot register a compute function after start"));
        }
        let mut fns = self.compute_fns.write().await;
        if fns.contains_key(name) {
            return Err(Error::already_exists(format!("compute function already registered: {name}")));
        }
        fns.insert(name.to_string(), f);
        Ok(())
    }

    fn check_exact(key: &Key) -> Result<()> {
        if key.is_wildcard() {
            return Err(Error::invalid_input("wildcard keys are not allowed here"));
        }
        Ok(())
    }

    /// Insert or overwrite a column and fire any registered waiters with the
    /// new value. Waiters run after the write lock is released.
    pub async fn put(&self, bucket: Bucket, key: &Key, ldo: DataObject) -> Result<EntryInfo> {
        Self::check_exact(key)?;
        let info = EntryInfo {
            user_bytes: ldo.user_capacity(),
            availability: Availability::InLocalMemory,
        };
        let waiters = {
            let mut rows = self.rows.write().await;
            let row = rows.entry((bucket, key.k1().to_string())).or_default();
            let column = row.columns.entry(key.k2().to_string()).or_insert_with(|| Column {
                ldo: None,
                info: info.clone(),
                waiters: Vec::new(),
            });
            column.ldo = Some(ldo.clone());
            column.info = info.clone();
            std::mem::take(&mut column.waiters)
        };
        for waiter in waiters {
            waiter(Ok(ldo.clone()));
        }
        Ok(info)
    }

    /// Clone the stored LDO reference. Never blocks: a column with a waiter
    /// registered but no value yet reports `Waiting`, not `NotFound`.
    pub async fn get(&self, bucket: Bucket, key: &Key) -> Result<(DataObject, EntryInfo)> {
        Self::check_exact(key)?;
        let rows = self.rows.read().await;
        let column = rows
            .get(&(bucket, key.k1().to_string()))
            .and_then(|row| row.columns.get(key.k2()))
            .ok_or(Error::NotFound)?;
        match &column.ldo {
            Some(ldo) => Ok((ldo.clone(), column.info.clone())),
            None => Err(Error::Waiting),
        }
    }

    /// If present, call `callback` immediately; otherwise register it and
    /// return `Waiting`. `put` and `drop` both fire pending waiters exactly
    /// once, with success or failure respectively.
    pub async fn want_local(&self, bucket: Bucket, key: &Key, callback: Waiter) -> Result<()> {
        Self::check_exact(key)?;
        let existing = {
            let rows = self.rows.read().await;
            rows.get(&(bucket, key.k1().to_string()))
                .and_then(|row| row.columns.get(key.k2()))
                .and_then(|column| column.ldo.clone())
        };
        if let Some(ldo) = existing {
            callback(Ok(ldo));
            return Ok(());
        }
        let mut rows = self.rows.write().await;
        let row = rows.entry((bucket, key.k1().to_string())).or_default();
        let column = row.columns.entry(key.k2().to_string()).or_insert_with(|| Column {
            ldo: None,
            info: EntryInfo { user_bytes: 0, availability: Availability::Waiting },
            waiters: Vec::new(),
        });
        column.waiters.push(callback);
        Err(Error::Waiting)
    }

    /// Remove every column matching `pattern` (which may use k1/k2
    /// wildcards, unlike `put`/`get`/`want_local`), firing each removed
    /// column's waiters with `NotFound`.
    pub async fn drop_matching(&self, bucket: Bucket, pattern: &Key) -> Result<()> {
        let waiters = {
            let mut rows = self.rows.write().await;
            let mut fired = Vec::new();
            let row_keys: Vec<String> = rows
                .keys()
                .filter(|(b, k1)| *b == bucket && row_matches(pattern, k1))
                .map(|(_, k1)| k1.clone())
                .collect();
            for k1 in row_keys {
                if let Some(row) = rows.get_mut(&(bucket, k1.clone())) {
                    let col_keys: Vec<String> = row
                        .columns
                        .keys()
                        .filter(|k2| pattern.matches(&Key::new(k1.clone(), (*k2).clone())))
                        .cloned()
                        .collect();
                    for k2 in col_keys {
                        if let Some(column) = row.columns.remove(&k2) {
                            fired.extend(column.waiters);
                        }
                    }
                    if row.columns.is_empty() {
                        rows.remove(&(bucket, k1));
                    }
                }
            }
            fired
        };
        for waiter in waiters {
            waiter(Err(Error::NotFound));
        }
        Ok(())
    }

    /// `(key, size)` pairs whose k1/k2 prefix-match `pattern`.
    pub async fn list_matching(&self, bucket: Bucket, pattern: &Key) -> Vec<(Key, usize)> {
        let rows = self.rows.read().await;
        let mut out = Vec::new();
        for ((b, k1), row) in rows.iter() {
            if *b != bucket || !row_matches(pattern, k1) {
                continue;
            }
            for (k2, column) in row.columns.iter() {
                let key = Key::new(k1.clone(), k2.clone());
                if pattern.matches(&key) {
                    out.push((key, column.info.user_bytes));
                }
            }
        }
        out
    }

    /// Resolve `fname` in the compute registry, gather the `pattern`-matching
    /// `(key, ldo)` pairs in `bucket` (values not yet available are skipped,
    /// not waited on), and invoke the function. A pattern matching zero rows
    /// short-circuits to an empty LDO without calling the function — this is
    /// never a usage error.
    pub async fn do_compute(&self, bucket: Bucket, pattern: &Key, fname: &str, arg: &str) -> Result<DataObject> {
        let f = {
            let fns = self.compute_fns.read().await;
            fns.get(fname)
                .cloned()
                .ok_or_else(|| Error::invalid_input(format!("unregistered compute function: {fname}")))?
        };
        let mut mapping: Vec<(Key, DataObject)> = {
            let rows = self.rows.read().await;
            let mut out = Vec::new();
            for ((b, k1), row) in rows.iter() {
                if *b != bucket || !row_matches(pattern, k1) {
                    continue;
                }
                for (k2, column) in row.columns.iter() {
                    let key = Key::new(k1.clone(), k2.clone());
                    if pattern.matches(&key) {
                        if let Some(ldo) = &column.ldo {
                            out.push((key, ldo.clone()));
                        }
                    }
                }
            }
            out
        };
        if mapping.is_empty() {
            return DataObject::allocate(self.allocator.clone(), 0, 0, 0);
        }
        // Approximate "order of appearance" with alphabetical k2 order, since
        // the row map doesn't separately track publish sequence.
        mapping.sort_by(|a, b| a.0.k2().cmp(b.0.k2()));
        f(pattern, arg, &mapping, &self.allocator)
    }
}

fn row_matches(pattern: &Key, k1: &str) -> bool {
    match pattern.k1().strip_suffix('*') {
        Some(prefix) => k1.starts_with(prefix),
        None => pattern.k1() == k1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kelpie_lunasa::MallocAllocator;
    use std::sync::Arc as StdArc;

    fn ldo(bytes: &[u8]) -> DataObject {
        let allocator: StdArc<dyn kelpie_lunasa::Allocator> = StdArc::new(MallocAllocator::new());
        let o = DataObject::allocate(allocator, 0, bytes.len() as u32, 0).unwrap();
        o.write_data(bytes).unwrap();
        o
    }

    fn test_lkv() -> Arc<Lkv> {
        let allocator: StdArc<dyn kelpie_lunasa::Allocator> = StdArc::new(MallocAllocator::new());
        Lkv::new(allocator)
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let lkv = test_lkv();
        let key = Key::new("howdy", "bob");
        lkv.put(Bucket::UNSPECIFIED, &key, ldo(b"hello")).await.unwrap();
        let (got, info) = lkv.get(Bucket::UNSPECIFIED, &key).await.unwrap();
        assert_eq!(got.data(), b"hello");
        assert_eq!(info.user_bytes, got.user_capacity());
    }

    #[tokio::test]
    async fn get_missing_key_is_not_found() {
        let lkv = test_lkv();
        let err = lkv.get(Bucket::UNSPECIFIED, &Key::new("nope", "x")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound));
    }

    #[tokio::test]
    async fn want_then_publish_fires_waiter_exactly_once() {
        let lkv = test_lkv();
        let key = Key::new("k", "c");
        let (tx, rx) = tokio::sync::oneshot::channel();
        let err = lkv
            .want_local(Bucket::UNSPECIFIED, &key, Box::new(move |result| {
                let _ = tx.send(result.is_ok());
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Waiting));
        lkv.put(Bucket::UNSPECIFIED, &key, ldo(b"v")).await.unwrap();
        assert!(rx.await.unwrap());
    }

    #[tokio::test]
    async fn want_then_drop_fires_waiter_with_failure() {
        let lkv = test_lkv();
        let key = Key::new("k", "c");
        let (tx, rx) = tokio::sync::oneshot::channel();
        lkv.want_local(Bucket::UNSPECIFIED, &key, Box::new(move |result| {
            let _ = tx.send(result.is_ok());
        }))
        .await
        .unwrap_err();
        lkv.drop_matching(Bucket::UNSPECIFIED, &key).await.unwrap();
        assert!(!rx.await.unwrap());
    }

    #[tokio::test]
    async fn put_rejects_wildcard_keys() {
        let lkv = test_lkv();
        let err = lkv
            .put(Bucket::UNSPECIFIED, &Key::new("foo*", "x"), ldo(b"v"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn list_matching_respects_k1_and_k2_wildcards() {
        let lkv = test_lkv();
        lkv.put(Bucket::UNSPECIFIED, &Key::new("myrow", "a"), ldo(b"x")).await.unwrap();
        lkv.put(Bucket::UNSPECIFIED, &Key::new("myrow", "b"), ldo(b"yy")).await.unwrap();
        lkv.put(Bucket::UNSPECIFIED, &Key::new("other", "a"), ldo(b"z")).await.unwrap();
        let found = lkv.list_matching(Bucket::UNSPECIFIED, &Key::new("myrow", "*")).await;
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn compute_over_empty_match_returns_empty_ldo_not_an_error() {
        let lkv = test_lkv();
        let out = lkv
            .do_compute(Bucket::UNSPECIFIED, &Key::new("nothing*", "*"), "pick", "first")
            .await
            .unwrap();
        assert_eq!(out.data_bytes(), 0);
    }

    #[tokio::test]
    async fn unregistered_compute_function_is_invalid_input() {
        let lkv = test_lkv();
        lkv.put(Bucket::UNSPECIFIED, &Key::new("myrow", "a"), ldo(b"x")).await.unwrap();
        let err = lkv
            .do_compute(Bucket::UNSPECIFIED, &Key::new("myrow", "*"), "nope", "")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn registering_duplicate_compute_name_fails() {
        let lkv = test_lkv();
        let err = lkv
            .register_compute("pick", Arc::new(crate::compute::pick))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }
}
