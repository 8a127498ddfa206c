use masp_gc::{ListPool, MapPool};
use tracing::debug;

use crate::value::{List, Map, Value};

/// The list and map pools every value of one engine is allocated from.
#[derive(Clone, Default)]
pub struct Pools {
    lists: ListPool<Value>,
    maps: MapPool<Value, Value>,
}

impl Pools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lists(&self) -> &ListPool<Value> {
        &self.lists
    }

    pub fn maps(&self) -> &MapPool<Value, Value> {
        &self.maps
    }

    pub fn new_list(&self) -> List {
        self.lists.new_list()
    }

    pub fn list_from<I: IntoIterator<Item = Value>>(&self, items: I) -> List {
        self.lists.list_from(items)
    }

    pub fn new_map(&self) -> Map {
        self.maps.new_map()
    }

    pub fn map_from<I: IntoIterator<Item = (Value, Value)>>(&self, pairs: I) -> Map {
        self.maps.map_from(pairs)
    }

    /// Collect both pools until nothing more can be reclaimed.
    ///
    /// Sweeping a map may release the last root of a list stored in it and the
    /// other way round, so one round is not always enough.
    pub fn gc(&self) -> usize {
        let mut total = 0;
        let mut rounds = 0;
        loop {
            let reclaimed = self.maps.gc() + self.lists.gc();
            rounds += 1;
            if reclaimed == 0 {
                break;
            }
            total += reclaimed;
        }
        debug!(total, rounds, live = self.live_size_bytes(), "gc finished");
        total
    }

    pub fn reserved_size_bytes(&self) -> usize {
        self.lists.reserved_size_bytes() + self.maps.reserved_size_bytes()
    }

    pub fn live_size_bytes(&self) -> usize {
        self.lists.live_size_bytes() + self.maps.live_size_bytes()
    }

    /// Drop everything stored in the pools. Values living in the pools keep
    /// the pools alive, so owners call this before going away.
    pub fn clear(&self) {
        self.maps.clear();
        self.lists.clear();
    }
}
