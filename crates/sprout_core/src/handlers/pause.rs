use tracing::debug;

use crate::dispatch::{advance_and_dispatch, core_parameters_or_warn, proceed, CoreParams};
use crate::node::NodeId;
use crate::params::ParameterBundle;
use crate::traits::{Continuation, Handler, Step};
use crate::world::World;

/// Ethereal handler that holds the chain for a random stretch of world time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pause {
    pub min_seconds: f64,
    pub max_seconds: f64,
}

impl Pause {
    pub fn new(min_seconds: f64, max_seconds: f64) -> Self {
        Self {
            min_seconds,
            max_seconds,
        }
    }
}

impl Handler for Pause {
    fn execute(
        &mut self,
        world: &mut World,
        node: NodeId,
        bundle: ParameterBundle,
    ) -> Option<Box<dyn Continuation>> {
        let Some(core) = core_parameters_or_warn(&bundle, "pause", node) else {
            world.nodes.destroy(node);
            return None;
        };
        let duration = world.random_range(self.min_seconds, self.max_seconds);
        let until = world.time() + duration;
        debug!(node = node.index(), duration, "pausing");
        Some(Box::new(Wait {
            node,
            until,
            work: Some((core, bundle)),
        }))
    }

    /// Baked chains do not wait.
    fn bake(&mut self, world: &mut World, node: NodeId, bundle: ParameterBundle) {
        if let Some(core) = core_parameters_or_warn(&bundle, "pause", node) {
            proceed(world, node, core, bundle);
        }
        world.nodes.destroy(node);
    }
}

/// Yields until the world clock reaches `until`, then continues the chain.
pub struct Wait {
    node: NodeId,
    until: f64,
    work: Option<(CoreParams, ParameterBundle)>,
}

impl Continuation for Wait {
    fn resume(&mut self, world: &mut World) -> Step {
        if world.time() < self.until {
            return Step::Pending;
        }
        if let Some((core, bundle)) = self.work.take() {
            advance_and_dispatch(
                world,
                self.node,
                core.sentence,
                &core.registry,
                &core.rules,
                bundle,
                false,
            );
        }
        world.nodes.destroy(self.node);
        Step::Complete
    }

    fn label(&self) -> &str {
        "pause"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{chain_bundle, Tally};
    use crate::node::NodeSpec;
    use crate::world::{GrowthSettings, Simulation};

    #[test]
    fn continues_only_after_the_wait() {
        let settings = GrowthSettings {
            tick_seconds: 0.25,
            ..GrowthSettings::default()
        };
        let mut sim = Simulation::new(settings);
        let tally = Tally::default();
        let bundle = chain_bundle("F", tally.registry('F'));
        let pause = sim.plant(
            NodeSpec {
                symbol: 'P',
                ethereal: true,
                ..NodeSpec::default()
            },
            Box::new(Pause::new(1.0, 1.0)),
            bundle,
        );

        for _ in 0..3 {
            sim.tick();
        }
        assert_eq!(tally.count(), 0, "still waiting at t=0.75");

        sim.tick();
        assert_eq!(tally.count(), 1);
        assert!(sim.world.nodes.get(pause).expect("pause node").destroyed);
    }

    #[test]
    fn bake_skips_the_wait() {
        let mut sim = Simulation::new(GrowthSettings::default());
        let tally = Tally::default();
        let bundle = chain_bundle("F", tally.registry('F'));
        sim.plant(
            NodeSpec {
                symbol: 'P',
                ethereal: true,
                baked: true,
                ..NodeSpec::default()
            },
            Box::new(Pause::new(5.0, 9.0)),
            bundle,
        );
        assert_eq!(tally.count(), 1);
    }
}
