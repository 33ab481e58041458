//! Counters and phase timings for a sync run, reported at the end through
//! the log.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct KindCounts {
    pub created: u64,
    pub modified: u64,
    pub modified_structure_changed: u64,
    pub deleted: u64,
}

#[derive(Debug, Default)]
pub struct RunStats {
    queries: AtomicU64,
    updates: AtomicU64,
    triples_inserted: AtomicU64,
    dummy_nodes: AtomicU64,
    dummy_ways: AtomicU64,
    dummy_relations: AtomicU64,
    change_files: AtomicU64,
    kinds: Mutex<[KindCounts; 3]>,
    phases: Mutex<Vec<(String, Duration)>>,
}

impl RunStats {
    pub fn count_query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_update(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_inserted_triples(&self, n: u64) {
        self.triples_inserted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn set_change_files(&self, n: u64) {
        self.change_files.store(n, Ordering::Relaxed);
    }

    pub fn set_dummy_counts(&self, nodes: u64, ways: u64, relations: u64) {
        self.dummy_nodes.store(nodes, Ordering::Relaxed);
        self.dummy_ways.store(ways, Ordering::Relaxed);
        self.dummy_relations.store(relations, Ordering::Relaxed);
    }

    /// Index 0 = nodes, 1 = ways, 2 = relations.
    pub fn set_kind_counts(&self, index: usize, counts: KindCounts) {
        self.kinds.lock().unwrap()[index] = counts;
    }

    pub fn record_phase(&self, name: &str, elapsed: Duration) {
        self.phases.lock().unwrap().push((name.to_string(), elapsed));
    }

    /// Time a phase and record it under `name`.
    pub fn phase(&self, name: &str) -> PhaseTimer<'_> {
        PhaseTimer {
            stats: self,
            name: name.to_string(),
            start: Instant::now(),
        }
    }

    pub fn report(&self, detailed: bool) {
        let kinds = self.kinds.lock().unwrap();
        for (label, counts) in ["nodes", "ways", "relations"].iter().zip(kinds.iter()) {
            tracing::info!(
                "{label}: created {} modified {} (structure changed {}) deleted {}",
                counts.created,
                counts.modified + counts.modified_structure_changed,
                counts.modified_structure_changed,
                counts.deleted
            );
        }
        tracing::info!(
            "synthesized {} dummy nodes, {} dummy ways, {} dummy relations",
            self.dummy_nodes.load(Ordering::Relaxed),
            self.dummy_ways.load(Ordering::Relaxed),
            self.dummy_relations.load(Ordering::Relaxed)
        );
        tracing::info!(
            "{} change files, {} queries, {} updates, {} triples inserted",
            self.change_files.load(Ordering::Relaxed),
            self.queries.load(Ordering::Relaxed),
            self.updates.load(Ordering::Relaxed),
            self.triples_inserted.load(Ordering::Relaxed)
        );
        if detailed {
            for (name, elapsed) in self.phases.lock().unwrap().iter() {
                tracing::info!("{name}: {} ms", elapsed.as_millis());
            }
        }
    }
}

pub struct PhaseTimer<'a> {
    stats: &'a RunStats,
    name: String,
    start: Instant,
}

impl Drop for PhaseTimer<'_> {
    fn drop(&mut self) {
        self.stats.record_phase(&self.name, self.start.elapsed());
    }
}
