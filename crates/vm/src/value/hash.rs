use std::hash::Hasher;

use fnv::FnvHasher;
use masp_gc::TrieKey;
use slotmap::Key;

use super::Value;

const VECTOR_SEED: u32 = 0x9e37_79b9;
const LIST_SEED: u32 = 0x85eb_ca6b;
const MAP_SEED: u32 = 0xc2b2_ae35;
const ARRAY_SEED: u32 = 0x27d4_eb2f;

fn fold(hash: u64) -> u32 {
    (hash ^ (hash >> 32)) as u32
}

fn hash_bytes(tag: u8, bytes: &[u8]) -> u32 {
    let mut hasher = FnvHasher::default();
    hasher.write_u8(tag);
    hasher.write(bytes);
    fold(hasher.finish())
}

/// Numbers hash by their float value, so `1` and `1.0` land on the same key.
fn hash_float(v: f64) -> u32 {
    // -0.0 == 0.0
    let v = if v == 0.0 { 0.0 } else { v };
    hash_bytes(2, &v.to_bits().to_le_bytes())
}

/// Collections hash to the product of their elements' hashes. This ignores
/// order, so `[2 3]` and `[3 2]` collide.
fn product(seed: u32, hashes: impl Iterator<Item = u32>) -> u32 {
    hashes.fold(seed, u32::wrapping_mul)
}

impl Value {
    pub fn hash_value(&self) -> u32 {
        match self {
            Value::Nil => hash_bytes(0, &[]),
            Value::Boolean(b) => hash_bytes(1, &[*b as u8]),
            Value::Number(n) => hash_float(n.to_float()),
            Value::NumberArray(items) => product(ARRAY_SEED, items.iter().map(|v| hash_float(*v))),
            Value::String(s) => hash_bytes(3, s.as_bytes()),
            Value::Symbol(s) => hash_bytes(4, s.as_bytes()),
            Value::Vector(items) => product(VECTOR_SEED, items.iter().map(Value::hash_value)),
            Value::List(list) => product(LIST_SEED, list.iter().map(|v| v.hash_value())),
            Value::Map(map) => product(
                MAP_SEED,
                map.iter()
                    .map(|(k, v)| k.hash_value().wrapping_mul(31).wrapping_add(v.hash_value())),
            ),
            Value::Object(key) => hash_bytes(5, &key.data().as_ffi().to_le_bytes()),
            Value::Function(func) => hash_bytes(6, func.name().as_bytes()),
        }
    }
}

impl TrieKey for Value {
    fn trie_hash(&self) -> u32 {
        self.hash_value()
    }
}

