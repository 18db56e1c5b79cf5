//! Record store over a `KvStore`

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use super::keys;
use super::{Dataset, DatasetPatch, NewDataset, NewRecord, Record, RecordStore};
use crate::error::{GridError, Result};
use crate::kv::{prefix_end, KvStore, MemoryKv, WriteBatch};

/// Keys fetched per scan round trip when walking a prefix
const SCAN_PAGE: usize = 4096;

/// `RecordStore` implementation over any ordered key-value store
///
/// Writers are serialized by `write_lock` so id and sequence counters are
/// read and bumped without races. Readers go straight to the store.
pub struct KvRecordStore {
    kv: Arc<dyn KvStore>,
    write_lock: Mutex<()>,
}

impl KvRecordStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    /// Store backed by a fresh [`MemoryKv`]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKv::new()))
    }

    // =========================================================================
    // Store Access (all failures become persistence errors)
    // =========================================================================

    fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.kv.get(key).map_err(GridError::into_persistence)
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        self.kv.write_batch(batch).map_err(GridError::into_persistence)
    }

    fn load<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>> {
        self.read(key)?.map(|bytes| decode(&bytes)).transpose()
    }

    fn counter(&self, key: &[u8]) -> Result<u64> {
        match self.read(key)? {
            Some(bytes) => keys::decode_u64(&bytes).ok_or_else(|| {
                GridError::Persistence(format!("corrupt counter under {:?}", key))
            }),
            None => Ok(0),
        }
    }

    /// Walk every entry under `prefix` in key order, one page at a time
    fn walk_prefix(
        &self,
        prefix: &[u8],
        mut visit: impl FnMut(&[u8], &[u8]) -> Result<()>,
    ) -> Result<()> {
        let end = prefix_end(prefix);
        let mut start = prefix.to_vec();
        loop {
            let page = self
                .kv
                .scan(&start, end.as_deref(), SCAN_PAGE)
                .map_err(GridError::into_persistence)?;
            for (key, value) in &page {
                visit(key, value)?;
            }
            match page.last() {
                Some((last, _)) if page.len() == SCAN_PAGE => {
                    // Smallest key after `last`
                    start = last.clone();
                    start.push(0);
                }
                _ => return Ok(()),
            }
        }
    }

    /// Every key of a dataset's records and index entries
    fn dataset_keys(&self, dataset_id: u64) -> Result<Vec<Vec<u8>>> {
        let mut found = Vec::new();
        for prefix in [keys::record_prefix(dataset_id), keys::business_prefix(dataset_id)] {
            self.walk_prefix(&prefix, |key, _| {
                found.push(key.to_vec());
                Ok(())
            })?;
        }
        Ok(found)
    }

    fn delete_keys(&self, dataset_id: u64, with_dataset: bool) -> Result<usize> {
        let mut batch = WriteBatch::new();
        let doomed = self.dataset_keys(dataset_id)?;
        let records = doomed.len() / 2;
        for key in doomed {
            batch.delete(key);
        }
        batch.delete(keys::sequence(dataset_id));
        if with_dataset {
            batch.delete(keys::dataset(dataset_id));
        }
        self.commit(batch)?;
        Ok(records)
    }
}

impl RecordStore for KvRecordStore {
    fn create_dataset(&self, meta: NewDataset) -> Result<Dataset> {
        let _guard = self.write_lock.lock();

        let counter_key = keys::meta(keys::NEXT_DATASET);
        let id = self.counter(&counter_key)?.max(1);
        let dataset = Dataset {
            id,
            name: meta.name,
            byte_size: meta.byte_size,
            imported_at: Utc::now(),
            total_rows: 0,
        };

        let mut batch = WriteBatch::new();
        batch.put(keys::dataset(id), encode(&dataset)?);
        batch.put(counter_key, keys::encode_u64(id + 1));
        self.commit(batch)?;

        debug!(dataset_id = id, name = %dataset.name, "dataset created");
        Ok(dataset)
    }

    fn update_dataset(&self, id: u64, patch: DatasetPatch) -> Result<Dataset> {
        let _guard = self.write_lock.lock();

        let mut dataset: Dataset = self
            .load(&keys::dataset(id))?
            .ok_or_else(|| GridError::Persistence(format!("dataset {} does not exist", id)))?;
        if let Some(name) = patch.name {
            dataset.name = name;
        }
        if let Some(total_rows) = patch.total_rows {
            dataset.total_rows = total_rows;
        }

        let mut batch = WriteBatch::new();
        batch.put(keys::dataset(id), encode(&dataset)?);
        self.commit(batch)?;
        Ok(dataset)
    }

    fn get_dataset(&self, id: u64) -> Result<Option<Dataset>> {
        self.load(&keys::dataset(id))
    }

    fn list_datasets(&self) -> Result<Vec<Dataset>> {
        let mut datasets = Vec::new();
        self.walk_prefix(&keys::dataset_prefix(), |_, value| {
            datasets.push(decode(value)?);
            Ok(())
        })?;
        Ok(datasets)
    }

    fn delete_dataset_cascade(&self, id: u64) -> Result<()> {
        let _guard = self.write_lock.lock();
        let records = self.delete_keys(id, true)?;
        info!(dataset_id = id, records, "dataset deleted");
        Ok(())
    }

    fn bulk_insert_records(&self, records: Vec<NewRecord>) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let _guard = self.write_lock.lock();

        // Next sequence per target dataset; a missing dataset rejects the whole call
        let mut sequences: HashMap<u64, u64> = HashMap::new();
        for record in &records {
            if sequences.contains_key(&record.dataset_id) {
                continue;
            }
            if self.read(&keys::dataset(record.dataset_id))?.is_none() {
                return Err(GridError::Persistence(format!(
                    "dataset {} does not exist",
                    record.dataset_id
                )));
            }
            let next = self.counter(&keys::sequence(record.dataset_id))?;
            sequences.insert(record.dataset_id, next);
        }

        let record_counter = keys::meta(keys::NEXT_RECORD);
        let mut next_id = self.counter(&record_counter)?.max(1);
        let count = records.len();

        let mut batch = WriteBatch::new();
        for new in records {
            let seq = sequences.entry(new.dataset_id).or_default();
            let record = Record {
                id: next_id,
                dataset_id: new.dataset_id,
                business_id: new.business_id,
                title: new.title,
                source_ref: new.source_ref,
                images: new.images,
            };
            batch.put(keys::record(record.dataset_id, *seq), encode(&record)?);
            batch.put(
                keys::business(record.dataset_id, record.business_id, *seq),
                Vec::<u8>::new(),
            );
            *seq += 1;
            next_id += 1;
        }
        for (dataset_id, next_seq) in sequences {
            batch.put(keys::sequence(dataset_id), keys::encode_u64(next_seq));
        }
        batch.put(record_counter, keys::encode_u64(next_id));
        self.commit(batch)?;

        Ok(count)
    }

    fn query_records_by_dataset(
        &self,
        dataset_id: u64,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Record>> {
        // Sequences are dense from 0, so the offset is a seek
        let start = keys::record(dataset_id, offset as u64);
        let end = prefix_end(&keys::record_prefix(dataset_id));
        self.kv
            .scan(&start, end.as_deref(), limit)
            .map_err(GridError::into_persistence)?
            .iter()
            .map(|(_, value)| decode(value))
            .collect()
    }

    fn query_records_by_business_ids(&self, dataset_id: u64, ids: &[i64]) -> Result<Vec<Record>> {
        let wanted: BTreeSet<i64> = ids.iter().copied().collect();

        let mut sequences = Vec::new();
        for &business_id in &wanted {
            self.walk_prefix(&keys::business_id_prefix(dataset_id, business_id), |key, _| {
                if let Some((_, seq)) = keys::parse_business(key) {
                    sequences.push(seq);
                }
                Ok(())
            })?;
        }
        sequences.sort_unstable();

        let mut records = Vec::with_capacity(sequences.len());
        for seq in sequences {
            // Index entries are written with their record, a miss means a concurrent delete
            if let Some(record) = self.load(&keys::record(dataset_id, seq))? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn count_records_by_dataset(&self, dataset_id: u64) -> Result<u64> {
        let mut count = 0u64;
        self.walk_prefix(&keys::business_prefix(dataset_id), |_, _| {
            count += 1;
            Ok(())
        })?;
        Ok(count)
    }

    fn delete_records_by_dataset(&self, dataset_id: u64) -> Result<()> {
        let _guard = self.write_lock.lock();
        let records = self.delete_keys(dataset_id, false)?;
        debug!(dataset_id, records, "records deleted");
        Ok(())
    }

    fn all_business_ids(&self, dataset_id: u64) -> Result<Vec<i64>> {
        let mut ids: Vec<i64> = Vec::new();
        self.walk_prefix(&keys::business_prefix(dataset_id), |key, _| {
            if let Some((business_id, _)) = keys::parse_business(key) {
                if ids.last() != Some(&business_id) {
                    ids.push(business_id);
                }
            }
            Ok(())
        })?;
        Ok(ids)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| GridError::Persistence(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| GridError::Persistence(e.to_string()))
}
