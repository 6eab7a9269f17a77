//! Network description and builder
//!
//! A `NetworkDesc` is the declarative input the kernel lowers into its
//! dense runtime arrays: a list of groups and, per connection, the
//! synapse-level endpoint/weight/delay records. Neuron ids are global
//! across groups, assigned contiguously in declaration order.

use crate::error::{ModelError, Result};
use crate::group::GroupDesc;
use crate::ids::{ConnId, GroupId, NeuronId};
use crate::MAX_DELAY_MS;

/// One synapse: endpoints, initial and maximum weight, axonal delay
///
/// The sign of `max_weight` encodes the synapse class: non-negative for
/// excitatory synapses, negative for inhibitory ones. `weight` must lie
/// between 0 and `max_weight` (in the signed sense).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SynapseDesc {
    /// Pre-synaptic neuron (global id)
    pub pre: NeuronId,
    /// Post-synaptic neuron (global id)
    pub post: NeuronId,
    /// Initial weight
    pub weight: f32,
    /// Weight bound; sign encodes excitatory (>= 0) vs. inhibitory (< 0)
    pub max_weight: f32,
    /// Axonal delay in ms, `1..=MAX_DELAY_MS`
    pub delay_ms: u8,
}

impl SynapseDesc {
    /// Create a new synapse record
    pub fn new(pre: NeuronId, post: NeuronId, weight: f32, max_weight: f32, delay_ms: u8) -> Self {
        Self {
            pre,
            post,
            weight,
            max_weight,
            delay_ms,
        }
    }
}

/// One `connect` call between two groups
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConnectionDesc {
    /// Connection id, assigned by the builder
    pub conn_id: ConnId,
    /// Pre-synaptic group
    pub pre_group: GroupId,
    /// Post-synaptic group
    pub post_group: GroupId,
    /// Scale applied to fast currents (AMPA / GABAa) of this connection
    pub mul_fast: f32,
    /// Scale applied to slow currents (NMDA / GABAb) of this connection
    pub mul_slow: f32,
    /// Whether this connection's weights are subject to STDP
    pub plastic: bool,
    /// Synapse records
    pub synapses: Vec<SynapseDesc>,
}

/// Complete declarative network description
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NetworkDesc {
    /// Groups in declaration order; `GroupId` indexes this list
    pub groups: Vec<GroupDesc>,
    /// Connections in declaration order; `ConnId` indexes this list
    pub connections: Vec<ConnectionDesc>,
}

impl NetworkDesc {
    /// Total neuron count across all groups
    pub fn num_neurons(&self) -> u32 {
        self.groups.iter().map(|g| g.size).sum()
    }

    /// Total synapse count across all connections
    pub fn num_synapses(&self) -> usize {
        self.connections.iter().map(|c| c.synapses.len()).sum()
    }

    /// First global neuron id of a group under declaration-order numbering
    pub fn group_start(&self, group: GroupId) -> Result<NeuronId> {
        if group.index() >= self.groups.len() {
            return Err(ModelError::GroupNotFound {
                group_id: group.raw(),
            });
        }
        let start: u32 = self.groups[..group.index()].iter().map(|g| g.size).sum();
        Ok(NeuronId::new(start))
    }

    /// Group owning a global neuron id under declaration-order numbering
    pub fn group_of(&self, neuron: NeuronId) -> Option<GroupId> {
        let mut start = 0u32;
        for (g, desc) in self.groups.iter().enumerate() {
            if neuron.raw() < start + desc.size {
                return Some(GroupId::new(g as u16));
            }
            start += desc.size;
        }
        None
    }

    /// Largest delay present in the description (min 1)
    pub fn max_delay(&self) -> u8 {
        self.connections
            .iter()
            .flat_map(|c| c.synapses.iter())
            .map(|s| s.delay_ms)
            .max()
            .unwrap_or(1)
            .max(1)
    }

    /// Validate the full description
    pub fn validate(&self) -> Result<()> {
        if self.groups.is_empty() {
            return Err(ModelError::invalid_group("<network>", "no groups declared"));
        }
        for group in &self.groups {
            group.validate()?;
        }

        for conn in &self.connections {
            let pre_group = self
                .groups
                .get(conn.pre_group.index())
                .ok_or(ModelError::GroupNotFound {
                    group_id: conn.pre_group.raw(),
                })?;
            let post_group = self
                .groups
                .get(conn.post_group.index())
                .ok_or(ModelError::GroupNotFound {
                    group_id: conn.post_group.raw(),
                })?;

            if post_group.group_type.is_poisson() {
                return Err(ModelError::invalid_connection(
                    conn.pre_group.raw(),
                    conn.post_group.raw(),
                    "spike-source groups cannot receive synapses",
                ));
            }

            let inhibitory = pre_group.group_type.targets_inhibitory();
            let pre_start = self.group_start(conn.pre_group)?.raw();
            let pre_end = pre_start + pre_group.size;
            let post_start = self.group_start(conn.post_group)?.raw();
            let post_end = post_start + post_group.size;

            for syn in &conn.synapses {
                if syn.pre.raw() < pre_start || syn.pre.raw() >= pre_end {
                    return Err(ModelError::invalid_connection(
                        conn.pre_group.raw(),
                        conn.post_group.raw(),
                        format!("pre neuron {} outside its group", syn.pre),
                    ));
                }
                if syn.post.raw() < post_start || syn.post.raw() >= post_end {
                    return Err(ModelError::invalid_connection(
                        conn.pre_group.raw(),
                        conn.post_group.raw(),
                        format!("post neuron {} outside its group", syn.post),
                    ));
                }
                if syn.delay_ms == 0 || syn.delay_ms > MAX_DELAY_MS {
                    return Err(ModelError::invalid_connection(
                        conn.pre_group.raw(),
                        conn.post_group.raw(),
                        format!("delay {} ms outside 1..={}", syn.delay_ms, MAX_DELAY_MS),
                    ));
                }
                if inhibitory && syn.max_weight > 0.0 {
                    return Err(ModelError::invalid_connection(
                        conn.pre_group.raw(),
                        conn.post_group.raw(),
                        "inhibitory synapses store non-positive weights",
                    ));
                }
                if !inhibitory && syn.max_weight < 0.0 {
                    return Err(ModelError::invalid_connection(
                        conn.pre_group.raw(),
                        conn.post_group.raw(),
                        "excitatory synapses store non-negative weights",
                    ));
                }
                let (lo, hi) = if syn.max_weight >= 0.0 {
                    (0.0, syn.max_weight)
                } else {
                    (syn.max_weight, 0.0)
                };
                if syn.weight < lo || syn.weight > hi {
                    return Err(ModelError::invalid_connection(
                        conn.pre_group.raw(),
                        conn.post_group.raw(),
                        format!(
                            "weight {} outside [{}, {}]",
                            syn.weight, lo, hi
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Builder for `NetworkDesc`
#[derive(Debug, Default)]
pub struct NetworkBuilder {
    groups: Vec<GroupDesc>,
    connections: Vec<ConnectionDesc>,
}

impl NetworkBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group, returning its id and first global neuron id
    pub fn add_group(&mut self, desc: GroupDesc) -> Result<(GroupId, NeuronId)> {
        desc.validate()?;
        let start: u32 = self.groups.iter().map(|g| g.size).sum();
        let id = GroupId::new(self.groups.len() as u16);
        self.groups.push(desc);
        Ok((id, NeuronId::new(start)))
    }

    /// Add a connection from explicit synapse records
    pub fn connect(
        &mut self,
        pre_group: GroupId,
        post_group: GroupId,
        mul_fast: f32,
        mul_slow: f32,
        plastic: bool,
        synapses: Vec<SynapseDesc>,
    ) -> Result<ConnId> {
        if pre_group.index() >= self.groups.len() {
            return Err(ModelError::GroupNotFound {
                group_id: pre_group.raw(),
            });
        }
        if post_group.index() >= self.groups.len() {
            return Err(ModelError::GroupNotFound {
                group_id: post_group.raw(),
            });
        }
        if mul_fast < 0.0 || mul_slow < 0.0 {
            return Err(ModelError::invalid_connection(
                pre_group.raw(),
                post_group.raw(),
                "receptor scales must be non-negative",
            ));
        }
        let conn_id = ConnId::new(self.connections.len() as u16);
        self.connections.push(ConnectionDesc {
            conn_id,
            pre_group,
            post_group,
            mul_fast,
            mul_slow,
            plastic,
            synapses,
        });
        Ok(conn_id)
    }

    /// Validate everything and produce the description
    pub fn build(self) -> Result<NetworkDesc> {
        let desc = NetworkDesc {
            groups: self.groups,
            connections: self.connections,
        };
        desc.validate()?;
        Ok(desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::GroupType;

    fn two_group_builder() -> (NetworkBuilder, GroupId, GroupId) {
        let mut builder = NetworkBuilder::new();
        let (pre, _) = builder
            .add_group(GroupDesc::new("pre", 2, GroupType::excitatory()))
            .unwrap();
        let (post, _) = builder
            .add_group(GroupDesc::new("post", 3, GroupType::excitatory()))
            .unwrap();
        (builder, pre, post)
    }

    #[test]
    fn test_group_numbering() {
        let (builder, pre, post) = two_group_builder();
        let desc = builder.build().unwrap();
        assert_eq!(desc.num_neurons(), 5);
        assert_eq!(desc.group_start(pre).unwrap(), NeuronId::new(0));
        assert_eq!(desc.group_start(post).unwrap(), NeuronId::new(2));
        assert_eq!(desc.group_of(NeuronId::new(4)), Some(post));
        assert_eq!(desc.group_of(NeuronId::new(5)), None);
    }

    #[test]
    fn test_connect_and_max_delay() {
        let (mut builder, pre, post) = two_group_builder();
        builder
            .connect(
                pre,
                post,
                1.0,
                1.0,
                false,
                vec![
                    SynapseDesc::new(NeuronId::new(0), NeuronId::new(2), 0.5, 1.0, 1),
                    SynapseDesc::new(NeuronId::new(1), NeuronId::new(3), 0.5, 1.0, 7),
                ],
            )
            .unwrap();
        let desc = builder.build().unwrap();
        assert_eq!(desc.num_synapses(), 2);
        assert_eq!(desc.max_delay(), 7);
    }

    #[test]
    fn test_delay_out_of_range() {
        let (mut builder, pre, post) = two_group_builder();
        builder
            .connect(
                pre,
                post,
                1.0,
                1.0,
                false,
                vec![SynapseDesc::new(NeuronId::new(0), NeuronId::new(2), 0.5, 1.0, 0)],
            )
            .unwrap();
        assert!(builder.build().is_err());

        let (mut builder, pre, post) = two_group_builder();
        builder
            .connect(
                pre,
                post,
                1.0,
                1.0,
                false,
                vec![SynapseDesc::new(NeuronId::new(0), NeuronId::new(2), 0.5, 1.0, 21)],
            )
            .unwrap();
        assert!(builder.build().is_err());
    }

    #[test]
    fn test_sign_rules() {
        // excitatory pre with negative bound
        let (mut builder, pre, post) = two_group_builder();
        builder
            .connect(
                pre,
                post,
                1.0,
                1.0,
                false,
                vec![SynapseDesc::new(NeuronId::new(0), NeuronId::new(2), -0.5, -1.0, 1)],
            )
            .unwrap();
        assert!(builder.build().is_err());

        // inhibitory pre stores negative weights
        let mut builder = NetworkBuilder::new();
        let (inh, _) = builder
            .add_group(GroupDesc::new("inh", 1, GroupType::inhibitory()))
            .unwrap();
        let (post, _) = builder
            .add_group(GroupDesc::new("post", 1, GroupType::excitatory()))
            .unwrap();
        builder
            .connect(
                inh,
                post,
                1.0,
                1.0,
                false,
                vec![SynapseDesc::new(NeuronId::new(0), NeuronId::new(1), -0.5, -1.0, 1)],
            )
            .unwrap();
        assert!(builder.build().is_ok());
    }

    #[test]
    fn test_poisson_post_rejected() {
        let mut builder = NetworkBuilder::new();
        let (exc, _) = builder
            .add_group(GroupDesc::new("exc", 1, GroupType::excitatory()))
            .unwrap();
        let (input, _) = builder
            .add_group(GroupDesc::new("input", 1, GroupType::poisson_excitatory()))
            .unwrap();
        builder
            .connect(
                exc,
                input,
                1.0,
                1.0,
                false,
                vec![SynapseDesc::new(NeuronId::new(0), NeuronId::new(1), 0.5, 1.0, 1)],
            )
            .unwrap();
        assert!(builder.build().is_err());
    }

    #[test]
    fn test_endpoint_membership() {
        let (mut builder, pre, post) = two_group_builder();
        // pre neuron 3 belongs to the post group
        builder
            .connect(
                pre,
                post,
                1.0,
                1.0,
                false,
                vec![SynapseDesc::new(NeuronId::new(3), NeuronId::new(2), 0.5, 1.0, 1)],
            )
            .unwrap();
        assert!(builder.build().is_err());
    }
}
