use nalgebra::{Unit, UnitQuaternion, Vector3};
use tracing::warn;

use crate::dispatch::{core_parameters, proceed};
use crate::node::NodeId;
use crate::params::{keys, ParameterBundle};
use crate::traits::{Continuation, Handler};
use crate::world::World;

/// Ethereal handler that turns the bundle's `Heading` about a fixed axis by
/// a random angle in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisAngleRotate {
    pub axis: Vector3<f64>,
    pub angle_min: f64,
    pub angle_max: f64,
}

impl AxisAngleRotate {
    pub fn new(axis: Vector3<f64>, angle_min: f64, angle_max: f64) -> Self {
        Self {
            axis,
            angle_min,
            angle_max,
        }
    }

    fn run(&self, world: &mut World, node: NodeId, mut bundle: ParameterBundle) {
        let core = core_parameters(&bundle);

        match bundle.get::<Vector3<f64>>(keys::HEADING) {
            Some(heading) => {
                let angle = world.random_range(self.angle_min, self.angle_max).to_radians();
                // A zero axis leaves the heading alone.
                if let Some(axis) = Unit::try_new(self.axis, f64::EPSILON) {
                    let turned = UnitQuaternion::from_axis_angle(&axis, angle) * heading;
                    bundle.set(keys::HEADING, turned);
                }
            }
            None => warn!(
                node = node.index(),
                "parameter {:?} missing, skipping rotation",
                keys::HEADING
            ),
        }

        match core {
            Ok(core) => proceed(world, node, core, bundle),
            Err(err) => warn!(
                handler = "axis_angle_rotate",
                node = node.index(),
                "{err}; aborting node"
            ),
        }
        world.nodes.destroy(node);
    }
}

impl Handler for AxisAngleRotate {
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
    fn quarter_turn_about_z_tips_heading_over() {
        let mut sim = Simulation::new(GrowthSettings::default());
        let tally = Tally::default();
        let mut bundle = chain_bundle("F", tally.registry('F'));
        bundle.put(keys::HEADING, Vector3::new(0.0, 1.0, 0.0));

        sim.plant(
            NodeSpec {
                symbol: '&',
                ethereal: true,
                baked: true,
                ..NodeSpec::default()
            },
            Box::new(AxisAngleRotate::new(Vector3::z(), 90.0, 90.0)),
            bundle,
        );

        let heading = tally.bundles()[0]
            .get::<Vector3<f64>>(keys::HEADING)
            .expect("heading carried forward");
        assert!((heading - Vector3::new(-1.0, 0.0, 0.0)).norm() < 1e-9);
    }
}
