use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use dsnn_kernel::{Kernel, KernelConfig, PoissonRateSource};
use dsnn_model::{
    EstdpConfig, EstdpCurve, GroupDesc, GroupId, GroupType, NetworkBuilder, NeuronId, StdpType,
    SynapseDesc, SynapseModel,
};

const N: u32 = 1000;
const SECONDS: u32 = 2;
const SEED: u64 = 42;

/// Random synapses between two neuron ranges with the given probability
#[allow(clippy::too_many_arguments)]
fn random_synapses(
    rng: &mut StdRng,
    pre: std::ops::Range<u32>,
    post: std::ops::Range<u32>,
    prob: f64,
    weight: f32,
    max_weight: f32,
    max_delay: u8,
) -> Vec<SynapseDesc> {
    let mut synapses = Vec::new();
    for i in pre {
        for j in post.clone() {
            if i == j || rng.gen::<f64>() >= prob {
                continue;
            }
            let delay = rng.gen_range(1..=max_delay);
            synapses.push(SynapseDesc::new(
                NeuronId::new(i),
                NeuronId::new(j),
                weight,
                max_weight,
                delay,
            ));
        }
    }
    synapses
}

fn main() -> Result<()> {
    env_logger::init();

    let n_exc = N * 8 / 10;
    let n_inh = N * 2 / 10;
    let n_in = N / 10;

    // the classic STDP parameters: 20 ms windows, LTD slightly stronger
    let estdp = EstdpConfig::new(
        EstdpCurve::Exponential {
            alpha_plus: 0.10 / 100.0,
            tau_plus_inv: 1.0 / 20.0,
            alpha_minus: 0.12 / 100.0,
            tau_minus_inv: 1.0 / 20.0,
        },
        StdpType::Standard,
    )?;

    let mut builder = NetworkBuilder::new();
    let (excit, exc_start) = builder.add_group(
        GroupDesc::new("excit", n_exc, GroupType::excitatory()).with_estdp(estdp),
    )?;
    let (inhib, inh_start) = builder.add_group(
        GroupDesc::new("inhib", n_inh, GroupType::inhibitory())
            .with_izhikevich(dsnn_model::IzhikevichParams::fast_spiking())
            .with_estdp(estdp),
    )?;
    let (input, in_start) = builder.add_group(GroupDesc::new(
        "input",
        n_in,
        GroupType::poisson_excitatory(),
    ))?;

    let exc = exc_start.raw()..exc_start.raw() + n_exc;
    let inh = inh_start.raw()..inh_start.raw() + n_inh;
    let inp = in_start.raw()..in_start.raw() + n_in;

    // random connectivity at ~100 inputs per neuron, like the classic
    // 80/20 cortical toy model
    let prob = f64::from(100.0f32 / N as f32);
    let mut rng = StdRng::seed_from_u64(SEED);

    builder.connect(
        inhib,
        excit,
        1.0,
        1.0,
        false,
        random_synapses(&mut rng, inh.clone(), exc.clone(), prob, -0.01, -0.01, 1),
    )?;
    builder.connect(
        excit,
        inhib,
        1.0,
        1.0,
        true,
        random_synapses(&mut rng, exc.clone(), inh.clone(), prob, 0.0025, 0.005, 20),
    )?;
    builder.connect(
        excit,
        excit,
        1.0,
        1.0,
        true,
        random_synapses(&mut rng, exc.clone(), exc.clone(), prob, 0.06, 0.1, 20),
    )?;
    builder.connect(
        input,
        excit,
        1.0,
        1.0,
        false,
        random_synapses(&mut rng, inp, exc, prob / 10.0, 1.0, 1.0, 20),
    )?;

    let desc = builder.build()?;
    log::info!(
        "random network: {} neurons, {} synapses",
        desc.num_neurons(),
        desc.num_synapses()
    );

    let config = KernelConfig::default()
        .with_synapse_model(SynapseModel::conductance_defaults())
        .with_seed(SEED);
    let mut kernel = Kernel::setup(&desc, config)?;
    kernel.set_rate_source(input, PoissonRateSource::uniform(1.0, n_in as usize)?)?;

    for second in 0..SECONDS {
        for _ in 0..1000 {
            kernel.step()?;
        }
        kernel.shift_spike_tables()?;
        kernel.update_weights()?;
        println!(
            "second {}: {} spikes ({} from input sources)",
            second + 1,
            kernel.spike_count_total(),
            kernel.poisson_spike_count()
        );
    }

    let rate = |group: GroupId| -> f32 {
        let grp = kernel.group(group);
        let total: u64 = (grp.start..grp.end)
            .map(|n| u64::from(kernel.spike_count_of(n)))
            .sum();
        total as f32 / grp.size() as f32 / SECONDS as f32
    };
    println!("mean rates: excit {:.2} Hz, inhib {:.2} Hz", rate(excit), rate(inhib));

    Ok(())
}
