use nalgebra::{UnitQuaternion, Vector3};
use tracing::warn;

use crate::dispatch::{core_parameters, proceed};
use crate::node::NodeId;
use crate::params::{keys, ParameterBundle};
use crate::traits::{Continuation, Handler};
use crate::world::World;

/// Ethereal handler that applies a random pitch/yaw/roll to the bundle's
/// `Rotation`. Angles are in degrees; equal bounds remove the variance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotate {
    pub euler_min: Vector3<f64>,
    pub euler_max: Vector3<f64>,
}

impl Rotate {
    pub fn new(euler_min: Vector3<f64>, euler_max: Vector3<f64>) -> Self {
        Self {
            euler_min,
            euler_max,
        }
    }

    fn run(&self, world: &mut World, node: NodeId, mut bundle: ParameterBundle) {
        let core = core_parameters(&bundle);

        match bundle.get::<UnitQuaternion<f64>>(keys::ROTATION) {
            Some(rotation) => {
                let turn = world.random_euler(&self.euler_min, &self.euler_max);
                bundle.set(keys::ROTATION, rotation * turn);
            }
            None => warn!(
                node = node.index(),
                "parameter {:?} missing, skipping rotation",
                keys::ROTATION
            ),
        }

        match core {
            Ok(core) => proceed(world, node, core, bundle),
            Err(err) => warn!(handler = "rotate", node = node.index(), "{err}; aborting node"),
        }
        world.nodes.destroy(node);
    }
}

impl Handler for Rotate {
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

    fn ethereal(baked: bool) -> NodeSpec {
        NodeSpec {
            symbol: '+',
            ethereal: true,
            baked,
            ..NodeSpec::default()
        }
    }

    #[test]
    fn composes_fixed_rotation_onto_bundle() {
        let mut sim = Simulation::new(GrowthSettings::default());
        let tally = Tally::default();
        let mut bundle = chain_bundle("F", tally.registry('F'));
        bundle.put(keys::ROTATION, UnitQuaternion::<f64>::identity());

        let yaw = Vector3::new(0.0, 90.0, 0.0);
        let node = sim.plant(ethereal(true), Box::new(Rotate::new(yaw, yaw)), bundle);

        let seen = tally.bundles();
        assert_eq!(seen.len(), 1);
        let rotation = seen[0]
            .get::<UnitQuaternion<f64>>(keys::ROTATION)
            .expect("rotation carried forward");
        let expected = UnitQuaternion::from_euler_angles(0.0, 90_f64.to_radians(), 0.0);
        assert!(rotation.angle_to(&expected) < 1e-9);
        assert!(sim.world.nodes.get(node).expect("node").destroyed);
    }

    #[test]
    fn missing_rotation_still_continues() {
        let mut sim = Simulation::new(GrowthSettings::default());
        let tally = Tally::default();
        let bundle = chain_bundle("F", tally.registry('F'));
        sim.plant(
            ethereal(false),
            Box::new(Rotate::new(Vector3::zeros(), Vector3::zeros())),
            bundle,
        );
        sim.run_until_idle(4);
        assert_eq!(tally.count(), 1);
        assert!(tally.bundles()[0].get::<UnitQuaternion<f64>>(keys::ROTATION).is_none());
    }
}
