use nalgebra::Vector3;
use tracing::warn;

use crate::dispatch::{core_parameters, proceed};
use crate::node::NodeId;
use crate::params::{keys, ParameterBundle};
use crate::traits::{Continuation, Handler};
use crate::world::World;

/// Moves its own node along `Heading` by a random distance. The node stays
/// in the scene so that whatever follows hangs off the new position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Translate {
    pub distance_min: f64,
    pub distance_max: f64,
}

impl Translate {
    pub fn new(distance_min: f64, distance_max: f64) -> Self {
        Self {
            distance_min,
            distance_max,
        }
    }

    fn run(&self, world: &mut World, node: NodeId, bundle: ParameterBundle) {
        let core = core_parameters(&bundle);

        match bundle.get::<Vector3<f64>>(keys::HEADING) {
            Some(heading) => {
                let offset = heading * world.random_range(self.distance_min, self.distance_max);
                if let Some(state) = world.nodes.get_mut(node) {
                    state.transform.translate(&offset);
                }
            }
            None => warn!(
                node = node.index(),
                "parameter {:?} missing, skipping translation",
                keys::HEADING
            ),
        }

        match core {
            Ok(core) => proceed(world, node, core, bundle),
            Err(err) => warn!(handler = "translate", node = node.index(), "{err}; aborting node"),
        }
    }
}

impl Handler for Translate {
    fn execute(
        &mut self,
        world: &mut World,
        node: NodeId,
        bundle: ParameterBundle,
    ) -> Option<Box<dyn Continuation>> {
        self.run(world, node, bundle);
        None
    }

    fn bake(&mut self, world: &mut World, node: NodeId, bundle: ParameterBundle) {
        self.run(world, node, bundle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{chain_bundle, Tally};
    use crate::node::NodeSpec;
    use crate::world::{GrowthSettings, Simulation};

    #[test]
    fn followers_spawn_at_the_translated_position() {
        let mut sim = Simulation::new(GrowthSettings::default());
        let tally = Tally::default();
        let mut bundle = chain_bundle("F", tally.registry('F'));
        bundle.put(keys::HEADING, Vector3::new(1.0, 0.0, 0.0));

        let mover = sim.plant(
            NodeSpec {
                symbol: 'T',
                ..NodeSpec::default()
            },
            Box::new(Translate::new(2.0, 2.0)),
            bundle,
        );
        assert_eq!(tally.count(), 0, "live translate continues through the scheduler");
        sim.run_until_idle(4);

        let follower = tally.nodes()[0];
        let nodes = &sim.world.nodes;
        assert_eq!(nodes.get(follower).and_then(|n| n.previous()), Some(mover));
        assert_eq!(
            nodes.get(follower).expect("follower").transform.position,
            Vector3::new(2.0, 0.0, 0.0)
        );
        assert!(!nodes.get(mover).expect("mover").destroyed);
    }
}
