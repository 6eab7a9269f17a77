//! The per-ms simulation kernel
//!
//! One `Kernel` owns all runtime state and advances it one millisecond per
//! `step()` call. A step runs a fixed phase sequence: counter housekeeping,
//! STP/conductance decay, input-spike scheduling and drain, threshold
//! detection with post-spike LTP, delayed delivery (D2 then D1) with
//! delivery-time LTD, and global-state integration. Conductance decay runs
//! before delivery so arriving spikes add onto already-decayed channels,
//! and both delivery walks complete before integration so voltages see the
//! full post-synaptic input of the ms.
//!
//! Weight derivatives accumulate throughout; weights move only in
//! `update_weights`, which the driver calls on its own cadence. At each
//! second boundary (1000 steps) the driver calls `shift_spike_tables`.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;

use dsnn_model::{
    ConductanceConfig, GroupId, NetworkDesc, StdpType, SynapseModel, MAX_TIME_SLICE_MS,
};

use crate::context::{GroupRuntime, RuntimeContext};
use crate::error::{KernelError, Result};
use crate::generator::{poisson_next, PoissonRateSource, SpikeGenerator};
use crate::plasticity::{estdp_ltd, estdp_ltp, istdp_ltd, istdp_ltp};
use crate::spikebuf::PropagatedSpikeBuffer;
use crate::tables::FiringTables;
use crate::MAX_SIMULATION_TIME;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Dopamine released into the post group per spike from a dopaminergic pre
const DA_PER_SPIKE: f32 = 0.04;

/// Kernel-wide configuration
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Current-based or conductance-based synaptic input
    pub synapse_model: SynapseModel,
    /// Capacity of the D1 firing table; default `num_neurons * 1000`
    pub max_spikes_d1: Option<usize>,
    /// Capacity of the D2 firing table; default `num_neurons * 1000`
    pub max_spikes_d2: Option<usize>,
    /// Scale applied to accumulated derivatives in `update_weights`
    pub stdp_scale_factor: f32,
    /// Multiplicative decay of the derivatives after each weight update
    pub wt_change_decay: f32,
    /// Seed for parameter jitter and Poisson draws
    pub seed: u64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            synapse_model: SynapseModel::CurrentBased,
            max_spikes_d1: None,
            max_spikes_d2: None,
            stdp_scale_factor: 0.5,
            wt_change_decay: 0.9,
            seed: 42,
        }
    }
}

impl KernelConfig {
    /// Select the synaptic input model
    pub fn with_synapse_model(mut self, model: SynapseModel) -> Self {
        self.synapse_model = model;
        self
    }

    /// Override both firing-table capacities
    pub fn with_max_spikes(mut self, d1: usize, d2: usize) -> Self {
        self.max_spikes_d1 = Some(d1);
        self.max_spikes_d2 = Some(d2);
        self
    }

    /// Set the weight-update scale and derivative decay
    pub fn with_weight_update(mut self, stdp_scale_factor: f32, wt_change_decay: f32) -> Self {
        self.stdp_scale_factor = stdp_scale_factor;
        self.wt_change_decay = wt_change_decay;
        self
    }

    /// Set the random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.stdp_scale_factor <= 0.0 {
            return Err(KernelError::invalid_parameter(
                "stdp_scale_factor",
                self.stdp_scale_factor.to_string(),
                "> 0.0",
            ));
        }
        if !(0.0..=1.0).contains(&self.wt_change_decay) {
            return Err(KernelError::invalid_parameter(
                "wt_change_decay",
                self.wt_change_decay.to_string(),
                "in [0.0, 1.0]",
            ));
        }
        if let Some(0) = self.max_spikes_d1 {
            return Err(KernelError::invalid_parameter("max_spikes_d1", "0", "> 0"));
        }
        if let Some(0) = self.max_spikes_d2 {
            return Err(KernelError::invalid_parameter("max_spikes_d2", "0", "> 0"));
        }
        Ok(())
    }
}

enum GeneratorSlot {
    Rate(PoissonRateSource),
    Callback(Box<dyn SpikeGenerator>),
}

/// The simulation kernel: dense state plus the per-ms orchestrator
pub struct Kernel {
    ctx: RuntimeContext,
    cond: Option<ConductanceConfig>,
    tables: FiringTables,
    pbuf: PropagatedSpikeBuffer,
    generators: Vec<Option<GeneratorSlot>>,
    slice_update_time: Vec<u32>,
    stdp_scale_factor: f32,
    wt_change_decay: f32,
    sim_time: u32,
    ms: u32,
    sim_time_sec: u32,
    testing: bool,
    poisson_spike_count: u64,
    rng: StdRng,
}

impl Kernel {
    /// Lower a network description into runtime state, ready to step
    pub fn setup(desc: &NetworkDesc, config: KernelConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut ctx = RuntimeContext::build(desc, &mut rng)?;

        let cond = match config.synapse_model {
            SynapseModel::CurrentBased => None,
            SynapseModel::ConductanceBased(c) => {
                ctx.allocate_conductances(c.nmda_rise, c.gabab_rise);
                Some(c)
            }
        };

        let default_cap = ctx.num_total as usize * 1000;
        let tables = FiringTables::new(
            ctx.max_delay,
            config.max_spikes_d1.unwrap_or(default_cap),
            config.max_spikes_d2.unwrap_or(default_cap),
        );

        let num_groups = ctx.groups.len();
        info!(
            "kernel ready: {} neurons ({} regular), {} synapses, max delay {} ms, {} mode",
            ctx.num_total,
            ctx.num_reg,
            ctx.cumulative_pre[ctx.num_total as usize],
            ctx.max_delay,
            if cond.is_some() { "conductance" } else { "current" },
        );

        Ok(Self {
            ctx,
            cond,
            tables,
            pbuf: PropagatedSpikeBuffer::new(MAX_TIME_SLICE_MS),
            generators: (0..num_groups).map(|_| None).collect(),
            slice_update_time: vec![0; num_groups],
            stdp_scale_factor: config.stdp_scale_factor,
            wt_change_decay: config.wt_change_decay,
            sim_time: 0,
            ms: 0,
            sim_time_sec: 0,
            testing: false,
            poisson_spike_count: 0,
            rng,
        })
    }

    /// Attach a Poisson rate source to a spike-source group
    pub fn set_rate_source(&mut self, group: GroupId, source: PoissonRateSource) -> Result<()> {
        let grp = self.check_source_group(group)?;
        if source.len() != grp.size() as usize {
            return Err(KernelError::RateMismatch {
                group_id: group.raw(),
                rates: source.len(),
                neurons: grp.size() as usize,
            });
        }
        self.generators[group.index()] = Some(GeneratorSlot::Rate(source));
        Ok(())
    }

    /// Attach a callback generator to a spike-source group
    pub fn set_spike_generator(
        &mut self,
        group: GroupId,
        generator: Box<dyn SpikeGenerator>,
    ) -> Result<()> {
        self.check_source_group(group)?;
        self.generators[group.index()] = Some(GeneratorSlot::Callback(generator));
        Ok(())
    }

    fn check_source_group(&self, group: GroupId) -> Result<&GroupRuntime> {
        let grp = self
            .ctx
            .groups
            .get(group.index())
            .ok_or(KernelError::Model {
                source: dsnn_model::ModelError::GroupNotFound {
                    group_id: group.raw(),
                },
            })?;
        if !grp.group_type.is_poisson() {
            return Err(KernelError::invalid_config(format!(
                "group '{}' is not a spike source",
                grp.name
            )));
        }
        Ok(grp)
    }

    /// Enable or disable testing mode (plasticity frozen)
    pub fn set_testing(&mut self, testing: bool) {
        self.testing = testing;
    }

    /// Inject a constant external current into a regular neuron
    pub fn set_external_current(&mut self, neuron: u32, current: f32) -> Result<()> {
        if neuron >= self.ctx.num_reg {
            return Err(KernelError::invalid_parameter(
                "neuron",
                neuron.to_string(),
                format!("< {} (regular neurons)", self.ctx.num_reg),
            ));
        }
        self.ctx.ext_current[neuron as usize] = current;
        Ok(())
    }

    /// Force a neuron's membrane potential (testing / stimulation surface)
    pub fn set_voltage(&mut self, neuron: u32, voltage: f32) -> Result<()> {
        if neuron >= self.ctx.num_reg {
            return Err(KernelError::invalid_parameter(
                "neuron",
                neuron.to_string(),
                format!("< {} (regular neurons)", self.ctx.num_reg),
            ));
        }
        self.ctx.voltage[neuron as usize] = voltage;
        Ok(())
    }

    /// Advance the simulation by one millisecond
    pub fn step(&mut self) -> Result<()> {
        if self.ms >= 1000 {
            return Err(KernelError::invalid_state(
                "second boundary reached; call shift_spike_tables first",
            ));
        }

        self.tables.buffer_full = false;
        self.reset_due_spike_counters();
        self.stp_and_conductance_decay();
        self.update_spike_generators()?;
        self.generate_input_spikes();
        self.find_firing();
        self.tables.snapshot(self.ms);
        self.deliver_d2();
        self.deliver_d1();
        self.integrate_global_state()?;

        self.sim_time += 1;
        self.ms += 1;
        Ok(())
    }

    /// Rotate the firing tables at the second boundary
    pub fn shift_spike_tables(&mut self) -> Result<()> {
        if self.ms != 1000 {
            return Err(KernelError::invalid_state(format!(
                "shift_spike_tables called at ms {} of the second",
                self.ms
            )));
        }
        self.tables.shift();
        self.ms = 0;
        self.sim_time_sec += 1;
        debug!(
            "second {} done: {} spikes total",
            self.sim_time_sec,
            self.tables.spike_count
        );
        Ok(())
    }

    // ---- per-ms phases -------------------------------------------------

    fn reset_due_spike_counters(&mut self) {
        for g in 0..self.ctx.groups.len() {
            let (pos, dur) = {
                let grp = &self.ctx.groups[g];
                (grp.spk_cnt_buf_pos, grp.spk_record_dur)
            };
            if let (Some(pos), Some(dur)) = (pos, dur) {
                if self.sim_time % dur == 0 {
                    self.ctx.spk_cnt_buf[pos].fill(0);
                }
            }
        }
    }

    fn stp_and_conductance_decay(&mut self) {
        let t = i64::from(self.sim_time);
        for g in 0..self.ctx.groups.len() {
            let (start, end, stp, is_poisson) = {
                let grp = &self.ctx.groups[g];
                (
                    grp.start as usize,
                    grp.end as usize,
                    grp.stp,
                    grp.group_type.is_poisson(),
                )
            };

            if let Some(stp) = stp {
                for i in start..end {
                    let tp = self.ctx.stp_pos(i as u32, t);
                    let tm = self.ctx.stp_pos(i as u32, t - 1);
                    self.ctx.stpu[tp] = self.ctx.stpu[tm] * (1.0 - stp.tau_u_inv);
                    self.ctx.stpx[tp] =
                        self.ctx.stpx[tm] + (1.0 - self.ctx.stpx[tm]) * stp.tau_x_inv;
                }
            }

            if is_poisson {
                continue;
            }

            match self.cond {
                Some(c) => {
                    decay_channel(&mut self.ctx.g_ampa[start..end], c.d_ampa);
                    decay_channel(&mut self.ctx.g_gabaa[start..end], c.d_gabaa);
                    if c.nmda_rise {
                        decay_channel(&mut self.ctx.g_nmda_r[start..end], c.r_nmda);
                        decay_channel(&mut self.ctx.g_nmda_d[start..end], c.d_nmda);
                    } else {
                        decay_channel(&mut self.ctx.g_nmda[start..end], c.d_nmda);
                    }
                    if c.gabab_rise {
                        decay_channel(&mut self.ctx.g_gabab_r[start..end], c.r_gabab);
                        decay_channel(&mut self.ctx.g_gabab_d[start..end], c.d_gabab);
                    } else {
                        decay_channel(&mut self.ctx.g_gabab[start..end], c.d_gabab);
                    }
                }
                None => {
                    self.ctx.current[start..end].fill(0.0);
                }
            }
        }
    }

    fn update_spike_generators(&mut self) -> Result<()> {
        for g in 0..self.ctx.groups.len() {
            if self.generators[g].is_none() {
                continue;
            }
            let time_slice = self.ctx.groups[g].time_slice;
            let due =
                self.sim_time == 0 || self.sim_time - self.slice_update_time[g] >= time_slice;
            if !due {
                continue;
            }
            self.slice_update_time[g] = self.sim_time;

            let mut slot = self.generators[g].take();
            let result = match slot.as_mut() {
                Some(GeneratorSlot::Rate(source)) => self.schedule_from_rate(g, source),
                Some(GeneratorSlot::Callback(generator)) => {
                    self.schedule_from_callback(g, generator.as_mut())
                }
                None => Ok(()),
            };
            self.generators[g] = slot;
            result?;
        }
        Ok(())
    }

    fn schedule_from_rate(&mut self, g: usize, source: &PoissonRateSource) -> Result<()> {
        let (start, size, refractory, time_slice, spk_pos) = {
            let grp = &self.ctx.groups[g];
            (
                grp.start,
                grp.size(),
                grp.refractory,
                grp.time_slice,
                grp.spk_cnt_buf_pos,
            )
        };
        let cur = self.sim_time;

        for local in 0..size {
            let rate = source.rate(local as usize);
            if rate <= 0.0 {
                continue;
            }
            let neuron = start + local;
            let mut next = self.ctx.last_spike_time[neuron as usize];
            if next == MAX_SIMULATION_TIME {
                next = 0;
            }
            loop {
                next = poisson_next(next, rate / 1000.0, refractory, &mut self.rng);
                if next >= cur + time_slice {
                    break;
                }
                if next >= cur {
                    self.pbuf.schedule(neuron, next - cur)?;
                    if let Some(pos) = spk_pos {
                        self.ctx.spk_cnt_buf[pos][local as usize] += 1;
                    }
                }
            }
        }
        Ok(())
    }

    fn schedule_from_callback(
        &mut self,
        g: usize,
        generator: &mut dyn SpikeGenerator,
    ) -> Result<()> {
        let (start, size, time_slice, spk_pos) = {
            let grp = &self.ctx.groups[g];
            (grp.start, grp.size(), grp.time_slice, grp.spk_cnt_buf_pos)
        };
        let cur = self.sim_time;
        let end_window = cur + time_slice;

        for local in 0..size {
            let neuron = start + local;
            let mut last = self.ctx.last_spike_time[neuron as usize];
            if last == MAX_SIMULATION_TIME {
                last = 0;
            }
            loop {
                let t = generator.next_spike_time(g as u16, local, cur, last, end_window);
                let accepted = (t == 0 || t > last) && t >= cur && t < end_window;
                if !accepted {
                    break;
                }
                last = t;
                self.pbuf.schedule(neuron, t - cur)?;
                if let Some(pos) = spk_pos {
                    self.ctx.spk_cnt_buf[pos][local as usize] += 1;
                }
            }
        }
        Ok(())
    }

    fn generate_input_spikes(&mut self) {
        let drained = self.pbuf.drain_current();
        for neuron in drained {
            let g = self.ctx.grp_ids[neuron as usize] as usize;
            self.add_spike_to_table(neuron, g);
            self.tables.spike_count_sec += 1;
            self.poisson_spike_count += 1;
        }
        self.pbuf.advance();
    }

    fn find_firing(&mut self) {
        'groups: for g in 0..self.ctx.groups.len() {
            let (start, end, is_poisson, estdp, istdp, spk_pos) = {
                let grp = &self.ctx.groups[g];
                (
                    grp.start,
                    grp.end,
                    grp.group_type.is_poisson(),
                    grp.estdp,
                    grp.istdp,
                    grp.spk_cnt_buf_pos,
                )
            };
            if is_poisson {
                continue;
            }
            let with_stdp = estdp.is_some() || istdp.is_some();

            for i in start..end {
                let iu = i as usize;
                debug_assert!(i < self.ctx.num_reg);
                if self.ctx.voltage[iu] < 30.0 {
                    continue;
                }
                self.ctx.voltage[iu] = self.ctx.izh_c[iu];
                self.ctx.recovery[iu] += self.ctx.izh_d[iu];

                if let Some(pos) = spk_pos {
                    self.ctx.spk_cnt_buf[pos][(i - start) as usize] += 1;
                }

                self.add_spike_to_table(i, g);
                if self.tables.buffer_full {
                    // the rest of this ms is dropped; un-reset neurons are
                    // re-detected next ms
                    break 'groups;
                }

                if !self.testing && with_stdp {
                    self.accumulate_post_ltp(i, estdp, istdp);
                }
                self.tables.spike_count_sec += 1;
            }
        }
    }

    /// Record a spike shared bookkeeping: timestamps, homeostasis, the STP
    /// spike update, and the firing-table appends
    fn add_spike_to_table(&mut self, neuron: u32, g: usize) {
        let iu = neuron as usize;
        self.ctx.last_spike_time[iu] = self.sim_time;
        self.ctx.n_spike_cnt[iu] += 1;

        let (homeostasis, stp) = {
            let grp = &self.ctx.groups[g];
            (grp.homeostasis, grp.stp)
        };
        if let Some(h) = homeostasis {
            self.ctx.avg_firing[iu] += 1.0 / h.avg_time_scale_s;
        }
        if let Some(stp) = stp {
            // u rises before x is consumed (Tsodyks & Markram)
            let t = i64::from(self.sim_time);
            let plus = self.ctx.stp_pos(neuron, t);
            let minus = self.ctx.stp_pos(neuron, t - 1);
            self.ctx.stpu[plus] += stp.u0 * (1.0 - self.ctx.stpu[minus]);
            self.ctx.stpx[plus] -= self.ctx.stpu[plus] * self.ctx.stpx[minus];
        }

        if self.ctx.in_d1[iu] {
            self.tables.push_d1(neuron);
        }
        if self.ctx.in_d2[iu] {
            self.tables.push_d2(neuron);
        }
    }

    fn accumulate_post_ltp(
        &mut self,
        neuron: u32,
        estdp: Option<dsnn_model::EstdpConfig>,
        istdp: Option<dsnn_model::IstdpConfig>,
    ) {
        let iu = neuron as usize;
        let offset = self.ctx.cumulative_pre[iu];
        for j in 0..self.ctx.npre_plastic[iu] {
            let pos = (offset + j) as usize;
            let spike_time = self.ctx.syn_spike_time[pos];
            let dt = i64::from(self.sim_time) - i64::from(spike_time);
            debug_assert!(dt >= 0 || spike_time == MAX_SIMULATION_TIME);
            if dt <= 0 {
                continue;
            }
            let dt = dt as f32;
            if self.ctx.max_syn_wt[pos] >= 0.0 {
                if let Some(e) = estdp {
                    self.ctx.wt_change[pos] += estdp_ltp(e.curve, dt);
                }
            } else if let Some(i) = istdp {
                self.ctx.wt_change[pos] += istdp_ltp(i.curve, dt);
            }
        }
    }

    fn deliver_d1(&mut self) {
        let (k_end, k_top) = self.tables.d1_window(self.ms);
        let mut k = k_top;
        while k > k_end {
            k -= 1;
            let neuron = self.tables.d1_entry(k);
            debug_assert!(neuron < self.ctx.num_total);
            let stride = (self.ctx.max_delay + 1) as usize;
            let bucket = self.ctx.post_delay_info[neuron as usize * stride];
            let base = self.ctx.cumulative_post[neuron as usize];
            for idx in bucket.start..bucket.start + bucket.len {
                self.generate_post_spike(neuron, base + idx, 0);
            }
        }
    }

    fn deliver_d2(&mut self) {
        let (k_end, k_top) = self.tables.d2_window(self.ms);
        let mut k = k_top;
        while k > k_end {
            k -= 1;
            let neuron = self.tables.d2_entry(k);
            debug_assert!(neuron < self.ctx.num_total);

            let t_fire = self.tables.d2_firing_time(k, self.ms);
            let delay_offset = self.ms as i32 - t_fire;
            debug_assert!(delay_offset >= 1 && (delay_offset as u32) < self.ctx.max_delay);

            let stride = (self.ctx.max_delay + 1) as usize;
            let bucket =
                self.ctx.post_delay_info[neuron as usize * stride + delay_offset as usize];
            let base = self.ctx.cumulative_post[neuron as usize];
            for idx in bucket.start..bucket.start + bucket.len {
                self.generate_post_spike(neuron, base + idx, delay_offset as u32);
            }
        }
    }

    /// Deliver one synapse of `pre` that fired `delay_offset` ms ago
    fn generate_post_spike(&mut self, pre: u32, post_idx: u32, delay_offset: u32) {
        let info = self.ctx.post_synaptic_ids[post_idx as usize];
        let post = info.post as usize;
        debug_assert!(info.post < self.ctx.num_reg);

        let pos = (self.ctx.cumulative_pre[post] + info.pre_slot) as usize;
        let post_g = self.ctx.grp_ids[post] as usize;
        let pre_g = self.ctx.grp_ids[pre as usize] as usize;
        let pre_type = self.ctx.groups[pre_g].group_type;
        let mul_idx = self.ctx.conn_ids[pos] as usize;

        let mut change = self.ctx.wt[pos];

        if let Some(stp) = self.ctx.groups[pre_g].stp {
            // u is read after its spike update, x before: the slot at the
            // firing time holds u+, the slot one ms earlier holds x-
            let t = i64::from(self.sim_time) - i64::from(delay_offset);
            let plus = self.ctx.stp_pos(pre, t);
            let minus = self.ctx.stp_pos(pre, t - 1);
            change *= stp.a * self.ctx.stpu[plus] * self.ctx.stpx[minus];
        }

        match &self.cond {
            Some(c) => {
                let fast = change * self.ctx.mul_fast[mul_idx];
                let slow = change * self.ctx.mul_slow[mul_idx];
                if pre_type.targets_ampa() {
                    self.ctx.g_ampa[post] += fast;
                }
                if pre_type.targets_nmda() {
                    if c.nmda_rise {
                        self.ctx.g_nmda_r[post] += slow * c.s_nmda;
                        self.ctx.g_nmda_d[post] += slow * c.s_nmda;
                    } else {
                        self.ctx.g_nmda[post] += slow;
                    }
                }
                // inhibitory weights are stored negative
                if pre_type.targets_gabaa() {
                    self.ctx.g_gabaa[post] -= fast;
                }
                if pre_type.targets_gabab() {
                    if c.gabab_rise {
                        self.ctx.g_gabab_r[post] -= slow * c.s_gabab;
                        self.ctx.g_gabab_d[post] -= slow * c.s_gabab;
                    } else {
                        self.ctx.g_gabab[post] -= slow;
                    }
                }
            }
            None => {
                self.ctx.current[post] += change;
            }
        }

        self.ctx.syn_spike_time[pos] = self.sim_time;

        if pre_type.is_dopaminergic() {
            self.ctx.grp_da[post_g] += DA_PER_SPIKE;
        }

        // LTD: the post neuron fired before this delivery
        let (post_estdp, post_istdp) = {
            let grp = &self.ctx.groups[post_g];
            (grp.estdp, grp.istdp)
        };
        if !self.testing && (post_estdp.is_some() || post_istdp.is_some()) {
            let last_post = self.ctx.last_spike_time[post];
            let dt = i64::from(self.sim_time) - i64::from(last_post);
            debug_assert!(dt >= 0 || last_post == MAX_SIMULATION_TIME);
            if dt >= 0 {
                let dt = dt as f32;
                if let (Some(i), true) = (
                    post_istdp,
                    pre_type.targets_gabaa() || pre_type.targets_gabab(),
                ) {
                    self.ctx.wt_change[pos] += istdp_ltd(i.curve, dt);
                } else if let (Some(e), true) = (
                    post_estdp,
                    pre_type.targets_ampa() || pre_type.targets_nmda(),
                ) {
                    self.ctx.wt_change[pos] += estdp_ltd(e.curve, dt);
                }
            }
        }
    }

    fn integrate_global_state(&mut self) -> Result<()> {
        let ms = self.ms as usize;
        for g in 0..self.ctx.groups.len() {
            let (start, end, is_poisson, homeostasis, avg_decay, da_mod, base_dp, decay_dp) = {
                let grp = &self.ctx.groups[g];
                (
                    grp.start,
                    grp.end,
                    grp.group_type.is_poisson(),
                    grp.homeostasis,
                    grp.avg_decay,
                    grp.with_da_mod(),
                    grp.neuromod.base_dp,
                    grp.neuromod.decay_dp,
                )
            };

            if is_poisson {
                if homeostasis.is_some() {
                    for i in start..end {
                        self.ctx.avg_firing[i as usize] *= avg_decay;
                    }
                }
                continue;
            }

            if da_mod && self.ctx.grp_da[g] > base_dp {
                self.ctx.grp_da[g] *= decay_dp;
            }
            self.ctx.grp_da_buffer[g][ms] = self.ctx.grp_da[g];

            let homeo_decay = homeostasis.map(|_| avg_decay);
            match self.cond {
                Some(c) => self.integrate_range_coba(start, end, homeo_decay, c)?,
                None => self.integrate_range_cuba(start, end, homeo_decay)?,
            }
        }
        Ok(())
    }

    fn integrate_range_coba(
        &mut self,
        start: u32,
        end: u32,
        homeo_decay: Option<f32>,
        c: ConductanceConfig,
    ) -> Result<()> {
        let substeps = c.integration_substeps;
        let scale = f64::from(substeps);
        for i in start..end {
            let iu = i as usize;
            debug_assert!(i < self.ctx.num_reg);
            if let Some(decay) = homeo_decay {
                self.ctx.avg_firing[iu] *= decay;
            }

            self.ctx.current[iu] = 0.0;
            for _ in 0..substeps {
                let v = f64::from(self.ctx.voltage[iu]);
                let i_nmda = (v + 80.0) * (v + 80.0) / 60.0 / 60.0;
                let g_nmda = if c.nmda_rise {
                    f64::from(self.ctx.g_nmda_d[iu]) - f64::from(self.ctx.g_nmda_r[iu])
                } else {
                    f64::from(self.ctx.g_nmda[iu])
                };
                let g_gabab = if c.gabab_rise {
                    f64::from(self.ctx.g_gabab_d[iu]) - f64::from(self.ctx.g_gabab_r[iu])
                } else {
                    f64::from(self.ctx.g_gabab[iu])
                };

                let i_total = -(f64::from(self.ctx.g_ampa[iu]) * v
                    + g_nmda * i_nmda / (1.0 + i_nmda) * v
                    + f64::from(self.ctx.g_gabaa[iu]) * (v + 70.0)
                    + g_gabab * (v + 90.0));

                let dv = (0.04 * v + 5.0) * v + 140.0 - f64::from(self.ctx.recovery[iu])
                    + i_total
                    + f64::from(self.ctx.ext_current[iu]);
                self.ctx.voltage[iu] += (dv / scale) as f32;

                if !self.ctx.voltage[iu].is_finite() {
                    return Err(KernelError::numerical(i, self.sim_time));
                }
                self.ctx.current[iu] += i_total as f32;

                let mut cutoff = false;
                if self.ctx.voltage[iu] > 30.0 {
                    self.ctx.voltage[iu] = 30.0;
                    cutoff = true;
                }
                if self.ctx.voltage[iu] < -90.0 {
                    self.ctx.voltage[iu] = -90.0;
                }
                self.ctx.recovery[iu] += self.ctx.izh_a[iu]
                    * (self.ctx.izh_b[iu] * self.ctx.voltage[iu] - self.ctx.recovery[iu])
                    / substeps as f32;
                if cutoff {
                    break;
                }
            }
        }
        Ok(())
    }

    fn integrate_range_cuba(
        &mut self,
        start: u32,
        end: u32,
        homeo_decay: Option<f32>,
    ) -> Result<()> {
        for i in start..end {
            let iu = i as usize;
            debug_assert!(i < self.ctx.num_reg);
            if let Some(decay) = homeo_decay {
                self.ctx.avg_firing[iu] *= decay;
            }

            let input = f64::from(self.ctx.current[iu]) + f64::from(self.ctx.ext_current[iu]);
            // two Euler half-steps for numerical stability
            for _ in 0..2 {
                let v = f64::from(self.ctx.voltage[iu]);
                let dv =
                    (0.04 * v + 5.0) * v + 140.0 - f64::from(self.ctx.recovery[iu]) + input;
                self.ctx.voltage[iu] += (0.5 * dv) as f32;
            }
            if !self.ctx.voltage[iu].is_finite() {
                return Err(KernelError::numerical(i, self.sim_time));
            }
            if self.ctx.voltage[iu] > 30.0 {
                self.ctx.voltage[iu] = 30.0;
            }
            if self.ctx.voltage[iu] < -90.0 {
                self.ctx.voltage[iu] = -90.0;
            }
            self.ctx.recovery[iu] +=
                self.ctx.izh_a[iu] * (self.ctx.izh_b[iu] * self.ctx.voltage[iu] - self.ctx.recovery[iu]);
        }
        Ok(())
    }

    /// Apply accumulated weight derivatives, bounded by each synapse's limit
    pub fn update_weights(&mut self) -> Result<()> {
        if self.testing {
            return Err(KernelError::invalid_state(
                "update_weights called in testing mode",
            ));
        }

        for g in 0..self.ctx.groups.len() {
            let (start, end, estdp, istdp, homeostasis, has_plastic) = {
                let grp = &self.ctx.groups[g];
                (
                    grp.start,
                    grp.end,
                    grp.estdp,
                    grp.istdp,
                    grp.homeostasis,
                    grp.has_plastic_input,
                )
            };
            if !has_plastic || (estdp.is_none() && istdp.is_none()) {
                continue;
            }

            for i in start..end {
                let iu = i as usize;
                let offset = self.ctx.cumulative_pre[iu];

                let (diff_firing, homeo_scale, avg_time_scale) = match homeostasis {
                    Some(h) => {
                        debug_assert!(self.ctx.base_firing[iu] > 0.0);
                        (
                            1.0 - self.ctx.avg_firing[iu] / self.ctx.base_firing[iu],
                            h.scale,
                            h.avg_time_scale_s,
                        )
                    }
                    None => (0.0, 1.0, 1.0),
                };
                if i == start {
                    debug!(
                        "weight update: group {} diff_firing {:.4}",
                        g, diff_firing
                    );
                }

                for j in 0..self.ctx.npre_plastic[iu] {
                    let pos = (offset + j) as usize;
                    let mut effective = self.stdp_scale_factor * self.ctx.wt_change[pos];

                    if let Some(e) = estdp {
                        self.apply_weight_delta(
                            pos,
                            iu,
                            e.stdp_type,
                            homeostasis.is_some(),
                            &mut effective,
                            diff_firing,
                            homeo_scale,
                            avg_time_scale,
                            self.ctx.grp_da[g],
                        );
                    }
                    if let Some(ic) = istdp {
                        self.apply_weight_delta(
                            pos,
                            iu,
                            ic.stdp_type,
                            homeostasis.is_some(),
                            &mut effective,
                            diff_firing,
                            homeo_scale,
                            avg_time_scale,
                            self.ctx.grp_da[g],
                        );
                    }

                    self.ctx.wt_change[pos] *= self.wt_change_decay;

                    // clamp to the synapse's signed bound
                    let max = self.ctx.max_syn_wt[pos];
                    let w = &mut self.ctx.wt[pos];
                    if max >= 0.0 {
                        *w = w.clamp(0.0, max);
                    } else {
                        *w = w.clamp(max, 0.0);
                    }
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_weight_delta(
        &mut self,
        pos: usize,
        neuron: usize,
        stdp_type: StdpType,
        with_homeostasis: bool,
        effective: &mut f32,
        diff_firing: f32,
        homeo_scale: f32,
        avg_time_scale: f32,
        da: f32,
    ) {
        match stdp_type {
            StdpType::Standard => {
                if with_homeostasis {
                    self.ctx.wt[pos] += (diff_firing * self.ctx.wt[pos] * homeo_scale
                        + self.ctx.wt_change[pos])
                        * self.ctx.base_firing[neuron]
                        / avg_time_scale
                        / (1.0 + diff_firing.abs() * 50.0);
                } else {
                    self.ctx.wt[pos] += *effective;
                }
            }
            StdpType::DaModulated => {
                if with_homeostasis {
                    *effective *= da;
                    self.ctx.wt[pos] += (diff_firing * self.ctx.wt[pos] * homeo_scale
                        + *effective)
                        * self.ctx.base_firing[neuron]
                        / avg_time_scale
                        / (1.0 + diff_firing.abs() * 50.0);
                } else {
                    self.ctx.wt[pos] += da * *effective;
                }
            }
        }
    }

    // ---- observation surface -------------------------------------------

    /// Current simulation time in ms since setup
    pub fn sim_time_ms(&self) -> u32 {
        self.sim_time
    }

    /// Millisecond within the current second (0..=1000)
    pub fn ms_in_second(&self) -> u32 {
        self.ms
    }

    /// Completed seconds
    pub fn sim_time_sec(&self) -> u32 {
        self.sim_time_sec
    }

    /// Number of regular neurons
    pub fn num_reg(&self) -> u32 {
        self.ctx.num_reg
    }

    /// Total neuron count
    pub fn num_neurons(&self) -> u32 {
        self.ctx.num_total
    }

    /// Group configuration by id
    pub fn group(&self, group: GroupId) -> &GroupRuntime {
        &self.ctx.groups[group.index()]
    }

    /// Membrane potential of a neuron
    pub fn voltage(&self, neuron: u32) -> f32 {
        self.ctx.voltage[neuron as usize]
    }

    /// Recovery variable of a neuron
    pub fn recovery(&self, neuron: u32) -> f32 {
        self.ctx.recovery[neuron as usize]
    }

    /// Synaptic current of a regular neuron (diagnostic sum in COBA mode)
    pub fn current(&self, neuron: u32) -> f32 {
        self.ctx.current.get(neuron as usize).copied().unwrap_or(0.0)
    }

    /// AMPA conductance (0 in current-based mode)
    pub fn g_ampa(&self, neuron: u32) -> f32 {
        self.ctx.g_ampa.get(neuron as usize).copied().unwrap_or(0.0)
    }

    /// GABAa conductance (0 in current-based mode)
    pub fn g_gabaa(&self, neuron: u32) -> f32 {
        self.ctx.g_gabaa.get(neuron as usize).copied().unwrap_or(0.0)
    }

    /// Effective NMDA conductance (decay minus rise when a rise is enabled)
    pub fn g_nmda(&self, neuron: u32) -> f32 {
        let iu = neuron as usize;
        match &self.cond {
            Some(c) if c.nmda_rise => {
                self.ctx.g_nmda_d.get(iu).copied().unwrap_or(0.0)
                    - self.ctx.g_nmda_r.get(iu).copied().unwrap_or(0.0)
            }
            _ => self.ctx.g_nmda.get(iu).copied().unwrap_or(0.0),
        }
    }

    /// Effective GABAb conductance (decay minus rise when a rise is enabled)
    pub fn g_gabab(&self, neuron: u32) -> f32 {
        let iu = neuron as usize;
        match &self.cond {
            Some(c) if c.gabab_rise => {
                self.ctx.g_gabab_d.get(iu).copied().unwrap_or(0.0)
                    - self.ctx.g_gabab_r.get(iu).copied().unwrap_or(0.0)
            }
            _ => self.ctx.g_gabab.get(iu).copied().unwrap_or(0.0),
        }
    }

    /// Weight of the synapse `pre -> post`, if it exists
    pub fn weight(&self, pre: u32, post: u32) -> Option<f32> {
        self.ctx.find_synapse(pre, post).map(|pos| self.ctx.wt[pos])
    }

    /// Accumulated weight derivative of the synapse `pre -> post`
    pub fn weight_change(&self, pre: u32, post: u32) -> Option<f32> {
        self.ctx
            .find_synapse(pre, post)
            .map(|pos| self.ctx.wt_change[pos])
    }

    /// Last delivery time of the synapse `pre -> post`
    pub fn syn_spike_time(&self, pre: u32, post: u32) -> Option<u32> {
        self.ctx
            .find_synapse(pre, post)
            .map(|pos| self.ctx.syn_spike_time[pos])
    }

    /// Last spike time of a neuron, `MAX_SIMULATION_TIME` if it never fired
    pub fn last_spike_time(&self, neuron: u32) -> u32 {
        self.ctx.last_spike_time[neuron as usize]
    }

    /// Total spikes of a neuron since setup
    pub fn spike_count_of(&self, neuron: u32) -> u32 {
        self.ctx.n_spike_cnt[neuron as usize]
    }

    /// Running firing-rate average of a neuron (Hz)
    pub fn avg_firing(&self, neuron: u32) -> f32 {
        self.ctx.avg_firing[neuron as usize]
    }

    /// Dopamine level of a group
    pub fn dopamine(&self, group: GroupId) -> f32 {
        self.ctx.grp_da[group.index()]
    }

    /// Per-ms dopamine trace of a group for the current second
    pub fn dopamine_trace(&self, group: GroupId) -> &[f32] {
        &self.ctx.grp_da_buffer[group.index()]
    }

    /// Spike-counter value for a neuron of a counting group
    pub fn spike_counter(&self, group: GroupId, local_id: u32) -> Option<u32> {
        let pos = self.ctx.groups[group.index()].spk_cnt_buf_pos?;
        self.ctx.spk_cnt_buf[pos].get(local_id as usize).copied()
    }

    /// Whether a firing table filled up during the last step
    pub fn spike_buffer_full(&self) -> bool {
        self.tables.buffer_full
    }

    /// Spikes recorded this second
    pub fn spike_count_sec(&self) -> u32 {
        self.tables.spike_count_sec
    }

    /// D1 entries this second
    pub fn spike_count_d1_sec(&self) -> u32 {
        self.tables.spike_count_d1_sec
    }

    /// D2 entries this second (including the carried tail)
    pub fn spike_count_d2_sec(&self) -> u32 {
        self.tables.spike_count_d2_sec
    }

    /// Total spikes across completed seconds
    pub fn spike_count_total(&self) -> u64 {
        self.tables.spike_count
    }

    /// Input spikes drained from the propagated buffer since setup
    pub fn poisson_spike_count(&self) -> u64 {
        self.poisson_spike_count
    }
}

fn decay_channel(slice: &mut [f32], factor: f32) {
    #[cfg(feature = "parallel")]
    slice.par_iter_mut().for_each(|g| *g *= factor);
    #[cfg(not(feature = "parallel"))]
    for g in slice {
        *g *= factor;
    }
}
