//! Poisson-rate and callback spike sources driving the kernel

use dsnn_kernel::model::{
    GroupDesc, GroupId, GroupType, NetworkBuilder, NetworkDesc, NeuronId, SpikeCounterConfig,
    SynapseDesc,
};
use dsnn_kernel::{Kernel, KernelConfig, PoissonRateSource, ReplaySource};

/// A spike-source group feeding one regular neuron
fn input_network(sources: u32, time_slice_ms: u32, refractory_ms: u32) -> NetworkDesc {
    let mut builder = NetworkBuilder::new();
    let (input, _) = builder
        .add_group(
            GroupDesc::new("input", sources, GroupType::poisson_excitatory())
                .with_time_slice(time_slice_ms)
                .with_refractory(refractory_ms)
                .with_spike_counter(SpikeCounterConfig::unbounded()),
        )
        .unwrap();
    let (exc, _) = builder
        .add_group(GroupDesc::new("exc", 1, GroupType::excitatory()))
        .unwrap();
    let synapses = (0..sources)
        .map(|i| SynapseDesc::new(NeuronId::new(i), NeuronId::new(sources), 0.2, 1.0, 1))
        .collect();
    builder.connect(input, exc, 1.0, 1.0, false, synapses).unwrap();
    builder.build().unwrap()
}

const INPUT: GroupId = GroupId(0);

fn run_one_second(kernel: &mut Kernel) {
    for _ in 0..1000 {
        kernel.step().unwrap();
    }
    kernel.shift_spike_tables().unwrap();
}

#[test]
fn poisson_rate_drives_the_network() {
    let desc = input_network(5, 1000, 1);
    let mut kernel = Kernel::setup(&desc, KernelConfig::default()).unwrap();
    kernel
        .set_rate_source(INPUT, PoissonRateSource::uniform(100.0, 5).unwrap())
        .unwrap();

    run_one_second(&mut kernel);

    // 5 neurons at 100 Hz: ~500 spikes, give or take Poisson noise
    let drained = kernel.poisson_spike_count();
    assert!((250..=800).contains(&drained), "drained {}", drained);

    // every drained spike was delivered into the regular neuron
    let post = kernel.num_reg() - 1;
    assert!(kernel.spike_count_of(post) > 0 || kernel.voltage(post) != -65.0);

    // the group spike counter saw the scheduled spikes
    let counted: u32 = (0..5).map(|i| kernel.spike_counter(INPUT, i).unwrap()).sum();
    assert_eq!(u64::from(counted), drained);
}

#[test]
fn zero_rate_neurons_stay_silent() {
    let desc = input_network(2, 1000, 1);
    let mut kernel = Kernel::setup(&desc, KernelConfig::default()).unwrap();
    kernel
        .set_rate_source(INPUT, PoissonRateSource::new(vec![0.0, 80.0]).unwrap())
        .unwrap();

    run_one_second(&mut kernel);

    let first = kernel.num_reg();
    assert_eq!(kernel.spike_count_of(first), 0);
    assert!(kernel.spike_count_of(first + 1) > 0);
}

#[test]
fn refractory_period_caps_the_rate() {
    // 1 kHz nominal rate against a 5 ms refractory floor: at most one
    // spike per 5 ms
    let desc = input_network(1, 1000, 5);
    let mut kernel = Kernel::setup(&desc, KernelConfig::default()).unwrap();
    kernel
        .set_rate_source(INPUT, PoissonRateSource::uniform(1000.0, 1).unwrap())
        .unwrap();

    run_one_second(&mut kernel);

    let n = kernel.num_reg();
    let spikes = kernel.spike_count_of(n);
    assert!(spikes > 50, "spikes {}", spikes);
    assert!(spikes <= 201, "spikes {}", spikes);
}

#[test]
fn identical_seeds_reproduce_spike_trains() {
    let desc = input_network(3, 1000, 1);
    let cfg = KernelConfig::default().with_seed(1234);

    let mut a = Kernel::setup(&desc, cfg.clone()).unwrap();
    let mut b = Kernel::setup(&desc, cfg).unwrap();
    for kernel in [&mut a, &mut b] {
        kernel
            .set_rate_source(INPUT, PoissonRateSource::uniform(40.0, 3).unwrap())
            .unwrap();
        run_one_second(kernel);
    }

    assert_eq!(a.poisson_spike_count(), b.poisson_spike_count());
    for n in 0..a.num_neurons() {
        assert_eq!(a.spike_count_of(n), b.spike_count_of(n));
    }
}

#[test]
fn replay_source_fires_at_exact_times() {
    // a short time slice exercises the slice-boundary rescheduling
    let desc = input_network(1, 100, 1);
    let mut kernel = Kernel::setup(&desc, KernelConfig::default()).unwrap();
    let replay = ReplaySource::new(vec![vec![10, 20, 250]]).unwrap();
    kernel.set_spike_generator(INPUT, Box::new(replay)).unwrap();

    let source = kernel.num_reg();
    let mut fired_at = Vec::new();
    let mut last_count = 0;
    for _ in 0..400 {
        kernel.step().unwrap();
        let count = kernel.spike_count_of(source);
        if count > last_count {
            last_count = count;
            fired_at.push(kernel.sim_time_ms() - 1);
        }
    }
    assert_eq!(fired_at, vec![10, 20, 250]);
    assert_eq!(kernel.poisson_spike_count(), 3);
    assert_eq!(kernel.last_spike_time(source), 250);
}

#[test]
fn replayed_spikes_deliver_to_the_target() {
    let desc = input_network(1, 1000, 1);
    let mut kernel = Kernel::setup(&desc, KernelConfig::default()).unwrap();
    let replay = ReplaySource::new(vec![vec![7]]).unwrap();
    kernel.set_spike_generator(INPUT, Box::new(replay)).unwrap();

    let post = 0; // the single regular neuron leads the numbering
    for _ in 0..8 {
        kernel.step().unwrap();
    }
    // drained at ms 7, delay-1 delivery in the same step
    assert!((kernel.current(post) - 0.2).abs() < 1e-6);
}
