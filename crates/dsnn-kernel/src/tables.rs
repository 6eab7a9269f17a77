//! Firing tables and compacted time indices
//!
//! Two append-only tables record which neurons fired each ms of the
//! current second: D1 for neurons with delay-1 synapses and D2 for neurons
//! with longer delays (a neuron can appear in both). The time tables map a
//! ms of the second to the table length at the end of that ms, so delivery
//! can walk a time window of firings without per-entry timestamps.
//!
//! Index convention: `time_dx[ms + max_delay + 1]` holds the count at the
//! end of `ms`. The D2 table keeps its last `max_delay` ms of entries
//! across the second boundary; everything else resets.

use log::warn;

/// D1/D2 firing tables plus per-second and cumulative spike counters
#[derive(Debug)]
pub struct FiringTables {
    /// Neurons that fired, delay-1 class, current second
    d1: Vec<u32>,
    /// Neurons that fired, delay >= 2 class, current second (plus carried tail)
    d2: Vec<u32>,
    /// Compacted time index for D1, length `1000 + max_delay + 1`
    time_d1: Vec<u32>,
    /// Compacted time index for D2, length `1000 + max_delay + 1`
    time_d2: Vec<u32>,
    max_delay: u32,
    max_spikes_d1: usize,
    max_spikes_d2: usize,

    /// D1 entries appended this second
    pub spike_count_d1_sec: u32,
    /// D2 entries appended this second (incl. the carried tail after a shift)
    pub spike_count_d2_sec: u32,
    /// Spikes recorded this second (neurons, not table entries)
    pub spike_count_sec: u32,
    /// Total spikes across all completed seconds
    pub spike_count: u64,
    /// Total D1 entries across all completed seconds
    pub spike_count_d1: u64,
    /// Total D2 entries across all completed seconds
    pub spike_count_d2: u64,
    /// Set when a table filled up this ms; cleared at the next step
    pub buffer_full: bool,
}

impl FiringTables {
    /// Create empty tables for one simulated second
    pub fn new(max_delay: u32, max_spikes_d1: usize, max_spikes_d2: usize) -> Self {
        let len = 1000 + max_delay as usize + 1;
        Self {
            d1: Vec::with_capacity(max_spikes_d1.min(1 << 20)),
            d2: Vec::with_capacity(max_spikes_d2.min(1 << 20)),
            time_d1: vec![0; len],
            time_d2: vec![0; len],
            max_delay,
            max_spikes_d1,
            max_spikes_d2,
            spike_count_d1_sec: 0,
            spike_count_d2_sec: 0,
            spike_count_sec: 0,
            spike_count: 0,
            spike_count_d1: 0,
            spike_count_d2: 0,
            buffer_full: false,
        }
    }

    /// Append a neuron to the D1 table; flags `buffer_full` when the append
    /// fills the table or no room is left
    pub fn push_d1(&mut self, neuron: u32) {
        if self.d1.len() >= self.max_spikes_d1 {
            self.flag_full("D1");
            return;
        }
        self.d1.push(neuron);
        self.spike_count_d1_sec += 1;
        if self.d1.len() >= self.max_spikes_d1 {
            self.flag_full("D1");
        }
    }

    /// Append a neuron to the D2 table; same capacity behavior as D1
    pub fn push_d2(&mut self, neuron: u32) {
        if self.d2.len() >= self.max_spikes_d2 {
            self.flag_full("D2");
            return;
        }
        self.d2.push(neuron);
        self.spike_count_d2_sec += 1;
        if self.d2.len() >= self.max_spikes_d2 {
            self.flag_full("D2");
        }
    }

    fn flag_full(&mut self, which: &str) {
        if !self.buffer_full {
            warn!("{} firing table full; dropping further firings this ms", which);
        }
        self.buffer_full = true;
    }

    /// Record the end-of-ms counts into the time tables
    pub fn snapshot(&mut self, ms: u32) {
        let idx = (ms + self.max_delay + 1) as usize;
        self.time_d1[idx] = self.spike_count_d1_sec;
        self.time_d2[idx] = self.spike_count_d2_sec;
    }

    /// D1 entry range for firings recorded during `ms`
    pub fn d1_window(&self, ms: u32) -> (u32, u32) {
        let start = self.time_d1[(ms + self.max_delay) as usize];
        (start, self.spike_count_d1_sec)
    }

    /// D2 entry range covering firings of the previous `max_delay - 1` ms
    ///
    /// Entries of the current ms are excluded: their delay-1 buckets belong
    /// to the D1 walk, and delay >= 2 buckets are not due yet.
    pub fn d2_window(&self, ms: u32) -> (u32, u32) {
        let start = self.time_d2[(ms + 1) as usize];
        let end = self.time_d2[(ms + self.max_delay) as usize];
        (start, end)
    }

    /// Neuron id of a D1 entry
    pub fn d1_entry(&self, k: u32) -> u32 {
        self.d1[k as usize]
    }

    /// Neuron id of a D2 entry
    pub fn d2_entry(&self, k: u32) -> u32 {
        self.d2[k as usize]
    }

    /// Find the firing ms of D2 entry `k` by walking the time table
    /// backwards from `ms`; the result can be negative for entries carried
    /// across the second boundary
    pub fn d2_firing_time(&self, k: u32, ms: u32) -> i32 {
        let mut t_pos = ms as i32;
        loop {
            let idx = (t_pos + self.max_delay as i32) as usize;
            if self.time_d2[idx] <= k && k < self.time_d2[idx + 1] {
                return t_pos;
            }
            t_pos -= 1;
            debug_assert!(t_pos + self.max_delay as i32 >= 0);
        }
    }

    /// Rotate the tables at the second boundary
    ///
    /// Keeps the last `max_delay` ms of D2 entries at the front, rebases
    /// `time_d2[1..=max_delay]` to the new origin, resets the D1 side, and
    /// folds the per-second counters into the totals.
    pub fn shift(&mut self) {
        let d = self.max_delay as usize;

        // entries recorded after the end of ms `999 - max_delay` survive
        let keep_from = self.time_d2[1000] as usize;
        let keep_to = self.time_d2[1000 + d] as usize;
        self.d2.copy_within(keep_from..keep_to, 0);
        self.d2.truncate(keep_to - keep_from);

        for i in 0..d {
            self.time_d2[i + 1] = self.time_d2[1000 + i + 1] - self.time_d2[1000];
        }
        self.time_d2[0] = 0;
        self.time_d1[d] = 0;

        let carried = self.time_d2[d];
        self.spike_count += u64::from(self.spike_count_sec);
        self.spike_count_d2 += u64::from(self.spike_count_d2_sec - carried);
        self.spike_count_d1 += u64::from(self.spike_count_d1_sec);

        self.spike_count_sec = 0;
        self.spike_count_d1_sec = 0;
        self.spike_count_d2_sec = carried;
        self.d1.clear();
        self.buffer_full = false;
    }
}
