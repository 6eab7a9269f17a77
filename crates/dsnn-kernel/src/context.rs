//! Dense runtime state and setup-time lowering
//!
//! The kernel owns one `RuntimeContext`: flat per-neuron, per-synapse and
//! per-group arrays lowered from a `NetworkDesc`. The synapse store is a
//! CSR-like layout mirrored on both sides: indexed by post-neuron for
//! weight/plasticity state (`cumulative_pre` row pointers), and by
//! pre-neuron for delivery (`cumulative_post` row pointers plus per-delay
//! buckets in `post_delay_info`).
//!
//! Neurons are renumbered at setup so that all regular neurons precede all
//! spike-source neurons; `num_reg..num_total` is the Poisson tail.

use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use dsnn_model::{
    EstdpConfig, GroupType, HomeostasisConfig, IstdpConfig, NetworkDesc, NeuromodConfig, StpConfig,
};

use crate::error::{KernelError, Result};
use crate::MAX_SIMULATION_TIME;

/// Post-synaptic target of a delivery: the post neuron and the slot of this
/// synapse within the post neuron's pre-synapse range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynInfo {
    /// Post-synaptic neuron (kernel numbering)
    pub post: u32,
    /// Slot within `cumulative_pre[post]..cumulative_pre[post + 1]`
    pub pre_slot: u32,
}

/// Contiguous run of a pre-neuron's post-synapses sharing one delay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DelayInfo {
    /// First index within the pre-neuron's post-synapse slice
    pub start: u32,
    /// Number of synapses in the run
    pub len: u32,
}

/// Per-group runtime configuration, resolved to kernel numbering
#[derive(Debug, Clone)]
pub struct GroupRuntime {
    /// Group name for diagnostics
    pub name: String,
    /// Class and receptor-target mask
    pub group_type: GroupType,
    /// First neuron of the group (inclusive, kernel numbering)
    pub start: u32,
    /// One past the last neuron of the group
    pub end: u32,
    /// Short-term plasticity on outgoing synapses
    pub stp: Option<StpConfig>,
    /// STDP on excitatory incoming synapses
    pub estdp: Option<EstdpConfig>,
    /// STDP on inhibitory incoming synapses
    pub istdp: Option<IstdpConfig>,
    /// Homeostatic scaling configuration
    pub homeostasis: Option<HomeostasisConfig>,
    /// Per-ms decay of the running firing-rate average
    pub avg_decay: f32,
    /// Dopamine baseline and decay
    pub neuromod: NeuromodConfig,
    /// Index into the spike-counter buffers, if a counter is attached
    pub spk_cnt_buf_pos: Option<usize>,
    /// Counter recording window (ms); `None` accumulates forever
    pub spk_record_dur: Option<u32>,
    /// Scheduling window for spike sources (ms)
    pub time_slice: u32,
    /// Minimum inter-spike interval for rate sources (ms)
    pub refractory: u32,
    /// Whether any incoming connection is plastic
    pub has_plastic_input: bool,
}

impl GroupRuntime {
    /// Number of neurons in the group
    pub fn size(&self) -> u32 {
        self.end - self.start
    }

    /// Whether the group has any STDP configured
    pub fn with_stdp(&self) -> bool {
        self.estdp.is_some() || self.istdp.is_some()
    }

    /// Whether any configured STDP on this group is dopamine-modulated
    pub fn with_da_mod(&self) -> bool {
        use dsnn_model::StdpType::DaModulated;
        self.estdp.map_or(false, |e| e.stdp_type == DaModulated)
            || self.istdp.map_or(false, |i| i.stdp_type == DaModulated)
    }
}

/// All mutable simulation state, exclusively owned by the kernel
#[derive(Debug)]
pub struct RuntimeContext {
    /// Number of regular (integrated) neurons; they occupy ids `0..num_reg`
    pub num_reg: u32,
    /// Total neuron count including the Poisson tail
    pub num_total: u32,
    /// Largest axonal delay present (ms)
    pub max_delay: u32,

    /// Group configurations; `GroupId` indexes this list
    pub groups: Vec<GroupRuntime>,
    /// Owning group of each neuron
    pub grp_ids: Vec<u16>,

    // Izhikevich state and parameters (regular neurons; Poisson tail zeroed)
    /// Membrane potential (mV)
    pub voltage: Vec<f32>,
    /// Recovery variable
    pub recovery: Vec<f32>,
    /// Recovery time scale
    pub izh_a: Vec<f32>,
    /// Recovery sensitivity
    pub izh_b: Vec<f32>,
    /// Post-spike voltage reset
    pub izh_c: Vec<f32>,
    /// Post-spike recovery increment
    pub izh_d: Vec<f32>,

    /// Summed synaptic current (CUBA) or integrated-current diagnostic (COBA)
    pub current: Vec<f32>,
    /// External current injected by the caller
    pub ext_current: Vec<f32>,
    /// Time of the most recent spike, `MAX_SIMULATION_TIME` if none yet
    pub last_spike_time: Vec<u32>,
    /// Total spikes per neuron since setup
    pub n_spike_cnt: Vec<u32>,
    /// Running firing-rate average for homeostasis (Hz)
    pub avg_firing: Vec<f32>,
    /// Per-neuron homeostatic target rate (Hz)
    pub base_firing: Vec<f32>,

    // Conductance store (empty in current-based mode)
    /// AMPA conductance per regular neuron
    pub g_ampa: Vec<f32>,
    /// GABAa conductance per regular neuron
    pub g_gabaa: Vec<f32>,
    /// NMDA conductance (instantaneous rise)
    pub g_nmda: Vec<f32>,
    /// NMDA rise trace (bi-exponential mode)
    pub g_nmda_r: Vec<f32>,
    /// NMDA decay trace (bi-exponential mode)
    pub g_nmda_d: Vec<f32>,
    /// GABAb conductance (instantaneous rise)
    pub g_gabab: Vec<f32>,
    /// GABAb rise trace (bi-exponential mode)
    pub g_gabab_r: Vec<f32>,
    /// GABAb decay trace (bi-exponential mode)
    pub g_gabab_d: Vec<f32>,

    // STP ring buffers, length `num_total * (max_delay + 1)` when any group
    // has STP enabled
    /// Utilization traces
    pub stpu: Vec<f32>,
    /// Resource traces
    pub stpx: Vec<f32>,

    // Synapse store, pre-side view (indexed by post neuron)
    /// Row pointers: synapses of post neuron `i` occupy
    /// `cumulative_pre[i]..cumulative_pre[i + 1]`
    pub cumulative_pre: Vec<u32>,
    /// Number of plastic synapses at the head of each post neuron's range
    pub npre_plastic: Vec<u32>,
    /// Weights; sign matches `max_syn_wt`
    pub wt: Vec<f32>,
    /// Accumulated weight derivatives
    pub wt_change: Vec<f32>,
    /// Weight bounds; sign encodes excitatory (>= 0) vs. inhibitory (< 0)
    pub max_syn_wt: Vec<f32>,
    /// Last pre-synaptic delivery time per synapse
    pub syn_spike_time: Vec<u32>,
    /// Connection id per synapse (indexes the receptor scale tables)
    pub conn_ids: Vec<u16>,

    // Synapse store, post-side view (indexed by pre neuron)
    /// Row pointers: post-synapses of pre neuron `i` occupy
    /// `cumulative_post[i]..cumulative_post[i + 1]`
    pub cumulative_post: Vec<u32>,
    /// Delivery targets, bucketed by delay within each pre neuron's slice
    pub post_synaptic_ids: Vec<SynInfo>,
    /// Delay buckets: `post_delay_info[pre * (max_delay + 1) + d]` is the
    /// run of post-synapses with delay `d + 1`
    pub post_delay_info: Vec<DelayInfo>,

    /// Whether each neuron has an outgoing delay-1 synapse
    pub in_d1: Vec<bool>,
    /// Whether each neuron has an outgoing synapse with delay >= 2
    pub in_d2: Vec<bool>,

    /// Fast-current scale per connection
    pub mul_fast: Vec<f32>,
    /// Slow-current scale per connection
    pub mul_slow: Vec<f32>,

    /// Dopamine level per group
    pub grp_da: Vec<f32>,
    /// Per-ms dopamine trace per group (length 1000 each)
    pub grp_da_buffer: Vec<Vec<f32>>,

    /// Spike-counter buffers, one per counting group
    pub spk_cnt_buf: Vec<Vec<u32>>,
}

impl RuntimeContext {
    /// Lower a validated network description into dense runtime state
    pub fn build(desc: &NetworkDesc, rng: &mut StdRng) -> Result<Self> {
        desc.validate()?;

        let num_total = desc.num_neurons();
        let max_delay = u32::from(desc.max_delay());

        // Renumber: regular groups keep declaration order at the front,
        // spike-source groups follow.
        let num_groups = desc.groups.len();
        let mut new_start = vec![0u32; num_groups];
        let mut cursor = 0u32;
        for (g, group) in desc.groups.iter().enumerate() {
            if !group.group_type.is_poisson() {
                new_start[g] = cursor;
                cursor += group.size;
            }
        }
        let num_reg = cursor;
        for (g, group) in desc.groups.iter().enumerate() {
            if group.group_type.is_poisson() {
                new_start[g] = cursor;
                cursor += group.size;
            }
        }
        debug_assert_eq!(cursor, num_total);

        // Declaration-order starts, for translating synapse endpoints.
        let mut old_start = vec![0u32; num_groups];
        let mut acc = 0u32;
        for (g, group) in desc.groups.iter().enumerate() {
            old_start[g] = acc;
            acc += group.size;
        }
        let mut old_to_new = vec![0u32; num_total as usize];
        let mut grp_ids = vec![0u16; num_total as usize];
        for (g, group) in desc.groups.iter().enumerate() {
            for k in 0..group.size {
                let old = (old_start[g] + k) as usize;
                let new = new_start[g] + k;
                old_to_new[old] = new;
                grp_ids[new as usize] = g as u16;
            }
        }

        let mut groups = Self::build_groups(desc, &new_start)?;

        // Neuron state, parameters jittered per neuron where requested.
        let n = num_total as usize;
        let mut izh_a = vec![0.0f32; n];
        let mut izh_b = vec![0.0f32; n];
        let mut izh_c = vec![0.0f32; n];
        let mut izh_d = vec![0.0f32; n];
        let mut voltage = vec![0.0f32; n];
        let mut recovery = vec![0.0f32; n];
        let mut base_firing = vec![0.0f32; n];

        for (g, group) in desc.groups.iter().enumerate() {
            let start = new_start[g];
            if !group.group_type.is_poisson() {
                let p = &group.izhikevich;
                for k in 0..group.size {
                    let i = (start + k) as usize;
                    izh_a[i] = jitter(rng, p.a, p.a_sd).max(f32::EPSILON);
                    izh_b[i] = jitter(rng, p.b, p.b_sd);
                    izh_c[i] = jitter(rng, p.c, p.c_sd).min(29.0);
                    izh_d[i] = jitter(rng, p.d, p.d_sd);
                    voltage[i] = izh_c[i];
                    recovery[i] = izh_b[i] * voltage[i];
                }
            }
            if let Some(h) = &group.homeostasis {
                for k in 0..group.size {
                    let i = (start + k) as usize;
                    base_firing[i] = jitter(rng, h.base_firing_hz, h.base_firing_sd_hz).max(0.1);
                }
            }
        }

        // Gather synapses in kernel numbering.
        struct Record {
            pre: u32,
            post: u32,
            weight: f32,
            max_weight: f32,
            delay: u32,
            conn: u16,
            plastic: bool,
        }
        let mut records = Vec::with_capacity(desc.num_synapses());
        for conn in &desc.connections {
            for syn in &conn.synapses {
                records.push(Record {
                    pre: old_to_new[syn.pre.index()],
                    post: old_to_new[syn.post.index()],
                    weight: syn.weight,
                    max_weight: syn.max_weight,
                    delay: u32::from(syn.delay_ms),
                    conn: conn.conn_id.raw(),
                    plastic: conn.plastic,
                });
            }
        }

        // Pre-side CSR: bucket by post neuron, plastic synapses first.
        let mut by_post: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (r, record) in records.iter().enumerate() {
            by_post[record.post as usize].push(r);
        }
        for list in &mut by_post {
            list.sort_by_key(|&r| !records[r].plastic);
        }

        let num_syn = records.len();
        let mut cumulative_pre = vec![0u32; n + 1];
        let mut npre_plastic = vec![0u32; n];
        let mut wt = vec![0.0f32; num_syn];
        let wt_change = vec![0.0f32; num_syn];
        let mut max_syn_wt = vec![0.0f32; num_syn];
        let mut conn_ids = vec![0u16; num_syn];
        let mut slot_of = vec![0u32; num_syn];

        let mut pos = 0u32;
        for i in 0..n {
            cumulative_pre[i] = pos;
            for (slot, &r) in by_post[i].iter().enumerate() {
                let record = &records[r];
                let p = pos as usize + slot;
                wt[p] = record.weight;
                max_syn_wt[p] = record.max_weight;
                conn_ids[p] = record.conn;
                slot_of[r] = slot as u32;
                if record.plastic {
                    npre_plastic[i] += 1;
                }
            }
            pos += by_post[i].len() as u32;
        }
        cumulative_pre[n] = pos;

        // Post-side CSR: bucket by pre neuron, runs sorted by delay.
        let mut by_pre: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (r, record) in records.iter().enumerate() {
            by_pre[record.pre as usize].push(r);
        }
        for list in &mut by_pre {
            list.sort_by_key(|&r| records[r].delay);
        }

        let stride = (max_delay + 1) as usize;
        let mut cumulative_post = vec![0u32; n + 1];
        let mut post_synaptic_ids = Vec::with_capacity(num_syn);
        let mut post_delay_info = vec![DelayInfo::default(); n * stride];
        let mut in_d1 = vec![false; n];
        let mut in_d2 = vec![false; n];

        for i in 0..n {
            cumulative_post[i] = post_synaptic_ids.len() as u32;
            for (idx, &r) in by_pre[i].iter().enumerate() {
                let record = &records[r];
                post_synaptic_ids.push(SynInfo {
                    post: record.post,
                    pre_slot: slot_of[r],
                });
                let bucket = &mut post_delay_info[i * stride + (record.delay - 1) as usize];
                if bucket.len == 0 {
                    bucket.start = idx as u32;
                }
                bucket.len += 1;
                if record.delay == 1 {
                    in_d1[i] = true;
                } else {
                    in_d2[i] = true;
                }
            }
        }
        cumulative_post[n] = post_synaptic_ids.len() as u32;

        // Receptor scales per connection.
        let mul_fast = desc.connections.iter().map(|c| c.mul_fast).collect();
        let mul_slow = desc.connections.iter().map(|c| c.mul_slow).collect();

        // STP rings cover every neuron as soon as one group enables STP.
        let with_stp = groups.iter().any(|g| g.stp.is_some());
        let stp_len = if with_stp { n * stride } else { 0 };

        // Spike-counter buffers.
        let mut spk_cnt_buf = Vec::new();
        for group in &mut groups {
            if group.spk_cnt_buf_pos.is_some() {
                group.spk_cnt_buf_pos = Some(spk_cnt_buf.len());
                spk_cnt_buf.push(vec![0u32; group.size() as usize]);
            }
        }

        let grp_da = groups.iter().map(|g| g.neuromod.base_dp).collect();
        let grp_da_buffer = vec![vec![0.0f32; 1000]; num_groups];

        Ok(Self {
            num_reg,
            num_total,
            max_delay,
            groups,
            grp_ids,
            voltage,
            recovery,
            izh_a,
            izh_b,
            izh_c,
            izh_d,
            current: vec![0.0; num_reg as usize],
            ext_current: vec![0.0; num_reg as usize],
            last_spike_time: vec![MAX_SIMULATION_TIME; n],
            n_spike_cnt: vec![0; n],
            avg_firing: vec![0.0; n],
            base_firing,
            g_ampa: Vec::new(),
            g_gabaa: Vec::new(),
            g_nmda: Vec::new(),
            g_nmda_r: Vec::new(),
            g_nmda_d: Vec::new(),
            g_gabab: Vec::new(),
            g_gabab_r: Vec::new(),
            g_gabab_d: Vec::new(),
            stpu: vec![0.0; stp_len],
            stpx: vec![1.0; stp_len],
            cumulative_pre,
            npre_plastic,
            wt,
            wt_change,
            max_syn_wt,
            syn_spike_time: vec![MAX_SIMULATION_TIME; num_syn],
            conn_ids,
            cumulative_post,
            post_synaptic_ids,
            post_delay_info,
            in_d1,
            in_d2,
            mul_fast,
            mul_slow,
            grp_da,
            grp_da_buffer,
            spk_cnt_buf,
        })
    }

    fn build_groups(desc: &NetworkDesc, new_start: &[u32]) -> Result<Vec<GroupRuntime>> {
        let mut plastic_into: Vec<bool> = vec![false; desc.groups.len()];
        for conn in &desc.connections {
            if conn.plastic {
                plastic_into[conn.post_group.index()] = true;
            }
        }

        desc.groups
            .iter()
            .enumerate()
            .map(|(g, group)| {
                if plastic_into[g] && !group.with_stdp() {
                    return Err(KernelError::invalid_config(format!(
                        "group '{}' receives plastic synapses but has no STDP configured",
                        group.name
                    )));
                }
                Ok(GroupRuntime {
                    name: group.name.clone(),
                    group_type: group.group_type,
                    start: new_start[g],
                    end: new_start[g] + group.size,
                    stp: group.stp,
                    estdp: group.estdp,
                    istdp: group.istdp,
                    homeostasis: group.homeostasis,
                    avg_decay: group.homeostasis.map_or(1.0, |h| h.avg_decay()),
                    neuromod: group.neuromod,
                    spk_cnt_buf_pos: group.spike_counter.map(|_| 0),
                    spk_record_dur: group.spike_counter.and_then(|c| c.record_dur_ms),
                    time_slice: group.time_slice_ms,
                    refractory: group.refractory_ms,
                    has_plastic_input: plastic_into[g],
                })
            })
            .collect()
    }

    /// Number of synapses of a post neuron
    pub fn npre(&self, neuron: u32) -> u32 {
        self.cumulative_pre[neuron as usize + 1] - self.cumulative_pre[neuron as usize]
    }

    /// Number of post-synapses of a pre neuron
    pub fn npost(&self, neuron: u32) -> u32 {
        self.cumulative_post[neuron as usize + 1] - self.cumulative_post[neuron as usize]
    }

    /// Group configuration owning a neuron
    pub fn group_of(&self, neuron: u32) -> &GroupRuntime {
        &self.groups[self.grp_ids[neuron as usize] as usize]
    }

    /// Index into the flat synapse arrays for the synapse `pre -> post`,
    /// scanning the pre neuron's delivery list
    pub fn find_synapse(&self, pre: u32, post: u32) -> Option<usize> {
        let lo = self.cumulative_post[pre as usize] as usize;
        let hi = self.cumulative_post[pre as usize + 1] as usize;
        self.post_synaptic_ids[lo..hi]
            .iter()
            .find(|info| info.post == post)
            .map(|info| (self.cumulative_pre[info.post as usize] + info.pre_slot) as usize)
    }

    /// Size the conductance store for conductance-based mode
    ///
    /// Only regular neurons carry channels; spike sources cannot receive
    /// synapses.
    pub fn allocate_conductances(&mut self, nmda_rise: bool, gabab_rise: bool) {
        let n = self.num_reg as usize;
        self.g_ampa = vec![0.0; n];
        self.g_gabaa = vec![0.0; n];
        if nmda_rise {
            self.g_nmda_r = vec![0.0; n];
            self.g_nmda_d = vec![0.0; n];
        } else {
            self.g_nmda = vec![0.0; n];
        }
        if gabab_rise {
            self.g_gabab_r = vec![0.0; n];
            self.g_gabab_d = vec![0.0; n];
        } else {
            self.g_gabab = vec![0.0; n];
        }
    }

    /// Ring-buffer index for a neuron's STP slot at time `t` (ms)
    pub fn stp_pos(&self, neuron: u32, t: i64) -> usize {
        let period = i64::from(self.max_delay) + 1;
        (neuron as usize) * (period as usize) + t.rem_euclid(period) as usize
    }
}

fn jitter(rng: &mut StdRng, mean: f32, sd: f32) -> f32 {
    if sd > 0.0 {
        match Normal::new(mean, sd) {
            Ok(normal) => normal.sample(rng),
            Err(_) => mean,
        }
    } else {
        mean
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsnn_model::{GroupDesc, GroupType, NetworkBuilder, NeuronId, SynapseDesc};
    use rand::SeedableRng;

    fn build(desc: &NetworkDesc) -> RuntimeContext {
        let mut rng = StdRng::seed_from_u64(7);
        RuntimeContext::build(desc, &mut rng).unwrap()
    }

    fn mixed_network() -> NetworkDesc {
        let mut builder = NetworkBuilder::new();
        let (input, _) = builder
            .add_group(GroupDesc::new("input", 2, GroupType::poisson_excitatory()))
            .unwrap();
        let (exc, _) = builder
            .add_group(GroupDesc::new("exc", 3, GroupType::excitatory()))
            .unwrap();
        // declaration numbering: input = 0..2, exc = 2..5
        builder
            .connect(
                input,
                exc,
                1.0,
                1.0,
                false,
                vec![
                    SynapseDesc::new(NeuronId::new(0), NeuronId::new(2), 0.5, 1.0, 1),
                    SynapseDesc::new(NeuronId::new(0), NeuronId::new(3), 0.5, 1.0, 4),
                    SynapseDesc::new(NeuronId::new(1), NeuronId::new(4), 0.5, 1.0, 2),
                ],
            )
            .unwrap();
        builder
            .connect(
                exc,
                exc,
                1.0,
                1.0,
                false,
                vec![SynapseDesc::new(NeuronId::new(2), NeuronId::new(3), 0.25, 1.0, 1)],
            )
            .unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_poisson_tail_renumbering() {
        let ctx = build(&mixed_network());
        assert_eq!(ctx.num_reg, 3);
        assert_eq!(ctx.num_total, 5);
        // exc group moved to the front
        assert_eq!(ctx.groups[1].start, 0);
        assert_eq!(ctx.groups[1].end, 3);
        // input group became the tail
        assert_eq!(ctx.groups[0].start, 3);
        assert_eq!(ctx.groups[0].end, 5);
        assert_eq!(ctx.grp_ids[0], 1);
        assert_eq!(ctx.grp_ids[4], 0);
    }

    #[test]
    fn test_csr_mirrors_agree() {
        let ctx = build(&mixed_network());
        assert_eq!(ctx.cumulative_pre[ctx.num_total as usize], 4);
        assert_eq!(ctx.cumulative_post[ctx.num_total as usize], 4);

        // every post-side entry points back at a valid pre-side slot
        for pre in 0..ctx.num_total {
            let lo = ctx.cumulative_post[pre as usize];
            let hi = ctx.cumulative_post[pre as usize + 1];
            for info in &ctx.post_synaptic_ids[lo as usize..hi as usize] {
                assert!(info.pre_slot < ctx.npre(info.post));
            }
        }

        // old input neuron 0 is new neuron 3 with two outgoing synapses
        assert_eq!(ctx.npost(3), 2);
        // old exc neuron 3 is new neuron 1 with two incoming synapses
        assert_eq!(ctx.npre(1), 2);
    }

    #[test]
    fn test_delay_buckets_cover_all_synapses() {
        let ctx = build(&mixed_network());
        let stride = (ctx.max_delay + 1) as usize;
        for pre in 0..ctx.num_total as usize {
            let total: u32 = (0..stride)
                .map(|d| ctx.post_delay_info[pre * stride + d].len)
                .sum();
            assert_eq!(total, ctx.npost(pre as u32), "pre neuron {}", pre);
        }
        // delay buckets are contiguous and delay-sorted
        let pre = 3; // two synapses, delays 1 and 4
        let d1 = ctx.post_delay_info[pre * stride];
        let d4 = ctx.post_delay_info[pre * stride + 3];
        assert_eq!((d1.start, d1.len), (0, 1));
        assert_eq!((d4.start, d4.len), (1, 1));
        assert!(ctx.in_d1[pre] && ctx.in_d2[pre]);
    }

    #[test]
    fn test_plastic_synapses_first() {
        let mut builder = NetworkBuilder::new();
        let (a, _) = builder
            .add_group(GroupDesc::new("a", 2, GroupType::excitatory()))
            .unwrap();
        let (b, _) = builder
            .add_group(
                GroupDesc::new("b", 1, GroupType::excitatory())
                    .with_estdp(dsnn_model::EstdpConfig::default()),
            )
            .unwrap();
        // fixed connection declared before the plastic one
        builder
            .connect(
                a,
                b,
                1.0,
                1.0,
                false,
                vec![SynapseDesc::new(NeuronId::new(0), NeuronId::new(2), 0.5, 1.0, 1)],
            )
            .unwrap();
        builder
            .connect(
                a,
                b,
                1.0,
                1.0,
                true,
                vec![SynapseDesc::new(NeuronId::new(1), NeuronId::new(2), 0.5, 1.0, 1)],
            )
            .unwrap();
        let ctx = build(&builder.build().unwrap());

        assert_eq!(ctx.npre(2), 2);
        assert_eq!(ctx.npre_plastic[2], 1);
        // the plastic synapse (conn 1) occupies slot 0
        let first = ctx.cumulative_pre[2] as usize;
        assert_eq!(ctx.conn_ids[first], 1);
        assert_eq!(ctx.conn_ids[first + 1], 0);
    }

    #[test]
    fn test_plastic_requires_stdp() {
        let mut builder = NetworkBuilder::new();
        let (a, _) = builder
            .add_group(GroupDesc::new("a", 1, GroupType::excitatory()))
            .unwrap();
        let (b, _) = builder
            .add_group(GroupDesc::new("b", 1, GroupType::excitatory()))
            .unwrap();
        builder
            .connect(
                a,
                b,
                1.0,
                1.0,
                true,
                vec![SynapseDesc::new(NeuronId::new(0), NeuronId::new(1), 0.5, 1.0, 1)],
            )
            .unwrap();
        let desc = builder.build().unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        assert!(RuntimeContext::build(&desc, &mut rng).is_err());
    }

    #[test]
    fn test_find_synapse() {
        let ctx = build(&mixed_network());
        // old (0 -> 3) is new (3 -> 1)
        let pos = ctx.find_synapse(3, 1).unwrap();
        assert_eq!(ctx.wt[pos], 0.5);
        assert!(ctx.find_synapse(3, 2).is_none());
    }

    #[test]
    fn test_stp_ring_indexing() {
        let ctx = build(&mixed_network());
        assert_eq!(ctx.max_delay, 4);
        let period = ctx.max_delay as i64 + 1;
        let slot_now = ctx.stp_pos(1, 10);
        let slot_wrapped = ctx.stp_pos(1, 10 + period);
        assert_eq!(slot_now, slot_wrapped);
        // negative times wrap like the end of the previous period
        assert_eq!(ctx.stp_pos(0, -1), ctx.stp_pos(0, period - 1));
    }

    #[test]
    fn test_initial_state() {
        let ctx = build(&mixed_network());
        for i in 0..ctx.num_reg as usize {
            assert_eq!(ctx.voltage[i], ctx.izh_c[i]);
            assert_eq!(ctx.recovery[i], ctx.izh_b[i] * ctx.voltage[i]);
        }
        assert!(ctx.last_spike_time.iter().all(|&t| t == MAX_SIMULATION_TIME));
        assert!(ctx.syn_spike_time.iter().all(|&t| t == MAX_SIMULATION_TIME));
    }
}
