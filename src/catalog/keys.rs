//! Catalog key encoding

const DATASET: u8 = b'd';
const RECORD: u8 = b'r';
const BUSINESS: u8 = b'b';
const SEQUENCE: u8 = b's';
const META: u8 = b'm';

pub(crate) const NEXT_DATASET: &str = "next_dataset";
pub(crate) const NEXT_RECORD: &str = "next_record";

fn tagged(tag: u8, parts: &[u64]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + parts.len() * 8);
    key.push(tag);
    for part in parts {
        key.extend_from_slice(&part.to_be_bytes());
    }
    key
}

/// Order-preserving map of i64 onto u64
fn flip(business_id: i64) -> u64 {
    (business_id as u64) ^ (1 << 63)
}

fn unflip(raw: u64) -> i64 {
    (raw ^ (1 << 63)) as i64
}

fn be_u64(bytes: &[u8], pos: usize) -> Option<u64> {
    let slice = bytes.get(pos..pos + 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(slice);
    Some(u64::from_be_bytes(buf))
}

pub(crate) fn dataset(id: u64) -> Vec<u8> {
    tagged(DATASET, &[id])
}

pub(crate) fn dataset_prefix() -> Vec<u8> {
    vec![DATASET]
}

pub(crate) fn record(dataset_id: u64, seq: u64) -> Vec<u8> {
    tagged(RECORD, &[dataset_id, seq])
}

pub(crate) fn record_prefix(dataset_id: u64) -> Vec<u8> {
    tagged(RECORD, &[dataset_id])
}

pub(crate) fn business(dataset_id: u64, business_id: i64, seq: u64) -> Vec<u8> {
    tagged(BUSINESS, &[dataset_id, flip(business_id), seq])
}

pub(crate) fn business_prefix(dataset_id: u64) -> Vec<u8> {
    tagged(BUSINESS, &[dataset_id])
}

pub(crate) fn business_id_prefix(dataset_id: u64, business_id: i64) -> Vec<u8> {
    tagged(BUSINESS, &[dataset_id, flip(business_id)])
}

pub(crate) fn sequence(dataset_id: u64) -> Vec<u8> {
    tagged(SEQUENCE, &[dataset_id])
}

pub(crate) fn meta(name: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + name.len());
    key.push(META);
    key.extend_from_slice(name.as_bytes());
    key
}

/// (business id, seq) out of a business index key
pub(crate) fn parse_business(key: &[u8]) -> Option<(i64, u64)> {
    Some((unflip(be_u64(key, 9)?), be_u64(key, 17)?))
}

pub(crate) fn encode_u64(value: u64) -> [u8; 8] {
    value.to_be_bytes()
}

pub(crate) fn decode_u64(bytes: &[u8]) -> Option<u64> {
    if bytes.len() != 8 {
        return None;
    }
    be_u64(bytes, 0)
}
