//! Unfolding leaves.
//!
//! A leaf sits on its anchor, faces along `Heading` and unfolds over
//! `LeafGrowTime` seconds, recording a [`Blade`] outline every tick. Sizes
//! and grow time are handed on scaled by the change coefficients. Baked
//! leaves with a prefab identifier share one outline.

use std::rc::Rc;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dispatch::{core_parameters_or_warn, proceed, CoreParams};
use crate::node::{Blade, NodeId};
use crate::params::{keys, Color, Curve, ParameterBundle};
use crate::traits::{Continuation, Handler, Step};
use crate::world::World;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeafShape {
    pub lateral_segments: usize,
    pub medial_segments: usize,
    pub start_medial_size: f64,
    pub start_lateral_size: f64,
    pub start_grow_time: f64,
    /// Width along the midrib, sampled over `[0, 1]` from base to tip.
    pub contour: Curve,
    /// Fold along the midrib as a fraction of a quarter turn.
    pub medial_rotation: Curve,
    /// Curl away from the midrib as a fraction of a quarter turn.
    pub lateral_rotation: Curve,
    pub medial_size_change_coefficient: f64,
    pub lateral_size_change_coefficient: f64,
    pub grow_time_change_coefficient: f64,
    /// Unfold over time; otherwise the leaf appears at full size at once.
    pub animate: bool,
    pub color: Color,
}

impl Default for LeafShape {
    fn default() -> Self {
        Self {
            lateral_segments: 1,
            medial_segments: 2,
            start_medial_size: 1.0,
            start_lateral_size: 1.0,
            start_grow_time: 1.0,
            contour: Curve::constant(1.0),
            medial_rotation: Curve::constant(0.0),
            lateral_rotation: Curve::constant(0.0),
            medial_size_change_coefficient: 1.0,
            lateral_size_change_coefficient: 1.0,
            grow_time_change_coefficient: 1.0,
            animate: true,
            color: Color::WHITE,
        }
    }
}

impl LeafShape {
    /// Outline at `progress` for the given full sizes. `None` when the shape
    /// has no segments to lay out.
    pub fn outline(&self, medial_size: f64, lateral_size: f64, progress: f64) -> Option<Blade> {
        if self.medial_segments < 1 || self.lateral_segments < 1 {
            return None;
        }
        let progress = progress.clamp(0.0, 1.0);
        let medial = self.medial_segments as f64;
        let lateral = self.lateral_segments as f64;

        let rows = (0..=self.medial_segments).map(|i| i as f64 / medial);
        let widths = rows
            .clone()
            .map(|t| lateral_size * progress / 2.0 * self.contour.evaluate(t))
            .collect();
        let medial_bend = rows
            .map(|t| 90.0 * self.medial_rotation.evaluate(progress * t))
            .collect();
        let lateral_curl = (1..=self.lateral_segments)
            .map(|j| 90.0 * self.lateral_rotation.evaluate(progress * j as f64 / lateral))
            .collect();

        Some(Blade {
            medial_size: medial_size * progress,
            lateral_size: lateral_size * progress,
            medial_segments: self.medial_segments,
            lateral_segments: self.lateral_segments,
            progress,
            widths,
            medial_bend,
            lateral_curl,
            color: self.color,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Leaf {
    pub shape: LeafShape,
}

impl Leaf {
    pub fn new(shape: LeafShape) -> Self {
        Self { shape }
    }

    fn prepare(&self, world: &mut World, node: NodeId, bundle: ParameterBundle) -> Option<Unfold> {
        let core = core_parameters_or_warn(&bundle, "leaf", node)?;
        let Some(heading) = bundle.get::<Vector3<f64>>(keys::HEADING) else {
            warn!(
                node = node.index(),
                "parameter {:?} missing, not growing",
                keys::HEADING
            );
            return None;
        };
        if self.shape.medial_segments < 1 || self.shape.lateral_segments < 1 {
            warn!(
                node = node.index(),
                medial = self.shape.medial_segments,
                lateral = self.shape.lateral_segments,
                "leaf needs at least one segment each way, no outline recorded"
            );
        }

        let pick = |key: &str, fallback: f64| bundle.get::<f64>(key).unwrap_or(fallback);
        let medial_size = pick(keys::LEAF_MEDIAL_SIZE, self.shape.start_medial_size);
        let lateral_size = pick(keys::LEAF_LATERAL_SIZE, self.shape.start_lateral_size);
        let grow_time = pick(keys::LEAF_GROW_TIME, self.shape.start_grow_time);

        let state = world.nodes.get_mut(node)?;
        state.transform.set_up(&heading);

        Some(Unfold {
            node,
            shape: self.shape.clone(),
            medial_size,
            lateral_size,
            grow_time,
            elapsed: 0.0,
            work: Some((core, bundle)),
        })
    }
}

impl Handler for Leaf {
    fn execute(
        &mut self,
        world: &mut World,
        node: NodeId,
        bundle: ParameterBundle,
    ) -> Option<Box<dyn Continuation>> {
        let mut unfold = self.prepare(world, node, bundle)?;
        if !self.shape.animate {
            let blade = unfold.outline(1.0);
            unfold.finish(world, blade);
            return None;
        }
        Some(Box::new(unfold))
    }

    fn bake(&mut self, world: &mut World, node: NodeId, bundle: ParameterBundle) {
        let Some(mut unfold) = self.prepare(world, node, bundle) else {
            return;
        };
        let identifier = world.nodes.get(node).and_then(|n| n.prefab_identifier.clone());
        let blade = match identifier {
            Some(identifier) => match world.shared_blades.get(&identifier) {
                Some(shared) => Some(shared.clone()),
                None => {
                    let blade = unfold.outline(1.0);
                    if let Some(blade) = &blade {
                        debug!(identifier = %identifier, "sharing baked leaf outline");
                        world.shared_blades.insert(identifier, blade.clone());
                    }
                    blade
                }
            },
            None => unfold.outline(1.0),
        };
        unfold.finish(world, blade);
    }
}

/// One leaf unfolding, resumed once per tick.
pub struct Unfold {
    node: NodeId,
    shape: LeafShape,
    medial_size: f64,
    lateral_size: f64,
    grow_time: f64,
    elapsed: f64,
    work: Option<(CoreParams, ParameterBundle)>,
}

impl Unfold {
    fn outline(&self, progress: f64) -> Option<Rc<Blade>> {
        self.shape
            .outline(self.medial_size, self.lateral_size, progress)
            .map(Rc::new)
    }

    fn record(&self, world: &mut World, blade: Option<Rc<Blade>>) {
        if let Some(state) = world.nodes.get_mut(self.node) {
            state.blade = blade;
        }
    }

    fn finish(&mut self, world: &mut World, blade: Option<Rc<Blade>>) {
        self.record(world, blade);
        let Some((core, mut bundle)) = self.work.take() else {
            return;
        };
        let shape = &self.shape;
        bundle.set_or_put(
            keys::LEAF_MEDIAL_SIZE,
            self.medial_size * shape.medial_size_change_coefficient,
        );
        bundle.set_or_put(
            keys::LEAF_LATERAL_SIZE,
            self.lateral_size * shape.lateral_size_change_coefficient,
        );
        bundle.set_or_put(
            keys::LEAF_GROW_TIME,
            self.grow_time * shape.grow_time_change_coefficient,
        );
        debug!(node = self.node.index(), "leaf unfolded");
        proceed(world, self.node, core, bundle);
    }
}

impl Continuation for Unfold {
    fn resume(&mut self, world: &mut World) -> Step {
        if world.nodes.get(self.node).map_or(true, |n| n.destroyed) {
            return Step::Complete;
        }
        if self.elapsed < self.grow_time {
            self.elapsed += world.delta_time();
            let blade = self.outline(self.elapsed / self.grow_time);
            self.record(world, blade);
            return Step::Pending;
        }
        let blade = self.outline(1.0);
        self.finish(world, blade);
        Step::Complete
    }

    fn label(&self) -> &str {
        "leaf"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{chain_bundle, Tally};
    use crate::node::NodeSpec;
    use crate::world::{GrowthSettings, Simulation};

    fn leaf_bundle(tally: &Tally) -> ParameterBundle {
        let mut bundle = chain_bundle("L", tally.registry('L'));
        bundle.put(keys::HEADING, Vector3::new(0.0, 1.0, 0.0));
        bundle
    }

    fn leaf_spec(baked: bool, prefab: Option<&str>) -> NodeSpec {
        NodeSpec {
            symbol: 'Q',
            baked,
            prefab_identifier: prefab.map(str::to_string),
            ..NodeSpec::default()
        }
    }

    #[test]
    fn unfolds_one_step_per_tick_then_continues() {
        let settings = GrowthSettings {
            tick_seconds: 0.25,
            ..GrowthSettings::default()
        };
        let mut sim = Simulation::new(settings);
        let tally = Tally::default();
        let node = sim.plant(leaf_spec(false, None), Box::new(Leaf::default()), leaf_bundle(&tally));

        sim.tick();
        let blade = sim.world.nodes.get(node).and_then(|n| n.blade.clone()).expect("blade");
        assert!((blade.progress - 0.25).abs() < 1e-9);
        assert!((blade.medial_size - 0.25).abs() < 1e-9);
        assert_eq!(tally.count(), 0);

        sim.run_until_idle(32);
        let blade = sim.world.nodes.get(node).and_then(|n| n.blade.clone()).expect("blade");
        assert_eq!(blade.progress, 1.0);
        assert_eq!(blade.widths, vec![0.5, 0.5, 0.5]);
        assert_eq!(tally.count(), 1);
    }

    #[test]
    fn successor_inherits_scaled_sizes() {
        let mut sim = Simulation::new(GrowthSettings::default());
        let tally = Tally::default();
        let shape = LeafShape {
            medial_size_change_coefficient: 0.5,
            lateral_size_change_coefficient: 0.25,
            grow_time_change_coefficient: 2.0,
            ..LeafShape::default()
        };
        let mut bundle = leaf_bundle(&tally);
        bundle.put(keys::LEAF_MEDIAL_SIZE, 4.0);
        sim.plant(leaf_spec(true, None), Box::new(Leaf::new(shape)), bundle);

        let seen = tally.bundles();
        let next = &seen[0];
        assert_eq!(next.get::<f64>(keys::LEAF_MEDIAL_SIZE), Some(2.0));
        assert_eq!(next.get::<f64>(keys::LEAF_LATERAL_SIZE), Some(0.25));
        assert_eq!(next.get::<f64>(keys::LEAF_GROW_TIME), Some(2.0));
    }

    #[test]
    fn still_leaf_appears_at_full_size() {
        let mut sim = Simulation::new(GrowthSettings::default());
        let tally = Tally::default();
        let shape = LeafShape {
            animate: false,
            ..LeafShape::default()
        };
        let node = sim.plant(leaf_spec(false, None), Box::new(Leaf::new(shape)), leaf_bundle(&tally));

        let blade = sim.world.nodes.get(node).and_then(|n| n.blade.clone()).expect("blade");
        assert_eq!(blade.progress, 1.0);
        sim.tick();
        assert_eq!(tally.count(), 1);
    }

    #[test]
    fn baked_leaves_share_one_outline_per_identifier() {
        let mut sim = Simulation::new(GrowthSettings::default());
        let tally = Tally::default();
        let first = sim.plant(
            leaf_spec(true, Some("ivy")),
            Box::new(Leaf::default()),
            leaf_bundle(&tally),
        );
        let mut bigger = leaf_bundle(&tally);
        bigger.put(keys::LEAF_MEDIAL_SIZE, 3.0);
        let second = sim.plant(leaf_spec(true, Some("ivy")), Box::new(Leaf::default()), bigger);

        let blade = |id| sim.world.nodes.get(id).and_then(|n| n.blade.clone()).expect("blade");
        assert!(Rc::ptr_eq(&blade(first), &blade(second)));
        assert_eq!(blade(second).medial_size, 1.0);
        assert_eq!(sim.world.shared_blades.len(), 1);
        assert_eq!(tally.count(), 2);
    }

    #[test]
    fn outline_follows_the_curves() {
        let shape = LeafShape {
            medial_segments: 2,
            lateral_segments: 2,
            contour: Curve::new(vec![(0.0, 0.0), (0.5, 1.0), (1.0, 0.0)]),
            medial_rotation: Curve::new(vec![(0.0, 0.0), (1.0, 1.0)]),
            ..LeafShape::default()
        };
        let blade = shape.outline(2.0, 2.0, 1.0).expect("segments present");
        assert_eq!(blade.widths, vec![0.0, 1.0, 0.0]);
        assert_eq!(blade.medial_bend, vec![0.0, 45.0, 90.0]);
        assert_eq!(blade.lateral_curl, vec![0.0, 0.0]);

        let flat = LeafShape {
            medial_segments: 0,
            ..LeafShape::default()
        };
        assert!(flat.outline(1.0, 1.0, 1.0).is_none());
    }
}
