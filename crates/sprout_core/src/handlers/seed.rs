//! Plant initializer.
//!
//! A [`Seed`] owns an axiom, a rule table and a handler registry. It writes
//! them into the bundle and starts the dispatch chain, either live or baked.
//! Baked seeds with a prefab identifier generate once and are cloned from
//! the bake cache afterwards.

use std::rc::Rc;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bake::{instantiate_prototype, reset_to_origin, seal_prototype, BakeLookup};
use crate::dispatch::{proceed, CoreParams};
use crate::node::{align_up, NodeId, Transform};
use crate::params::{keys, ParameterBundle};
use crate::registry::HandlerRegistry;
use crate::rules::RuleSet;
use crate::sentence::Sentence;
use crate::traits::{Continuation, Handler, Step};
use crate::world::World;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenMode {
    /// Rewrite the axiom `iterations` times up front and walk the result as
    /// one sentence. Branches never rewrite again.
    #[default]
    PreEdgeRewrite,
    /// Walk the axiom and let every branch rewrite its own remainder, up to
    /// `iterations` generations.
    IterativeNodeRewrite,
}

/// Randomization applied to each baked instance, and its grow-in animation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BakeSettings {
    /// Euler angles in degrees.
    pub rotation_min: Vector3<f64>,
    pub rotation_max: Vector3<f64>,
    pub scale_min: f64,
    pub scale_max: f64,
    pub scale_on_spawn: bool,
    pub scale_time: f64,
}

impl Default for BakeSettings {
    fn default() -> Self {
        Self {
            rotation_min: Vector3::zeros(),
            rotation_max: Vector3::zeros(),
            scale_min: 1.0,
            scale_max: 1.0,
            scale_on_spawn: true,
            scale_time: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Seed {
    pub axiom: String,
    pub generate_mode: GenMode,
    pub iterations: i64,
    /// Keep a `Heading` already present in the bundle.
    pub inherit_heading: bool,
    pub heading: Vector3<f64>,
    pub rules: RuleSet,
    pub registry: Rc<HandlerRegistry>,
    pub bake_settings: BakeSettings,
    executed: bool,
}

impl Seed {
    pub fn new(axiom: &str, rules: RuleSet, registry: Rc<HandlerRegistry>) -> Self {
        Self {
            axiom: axiom.to_string(),
            generate_mode: GenMode::default(),
            iterations: 0,
            inherit_heading: false,
            heading: Vector3::y(),
            rules,
            registry,
            bake_settings: BakeSettings::default(),
            executed: false,
        }
    }

    pub fn with_mode(mut self, mode: GenMode, iterations: i64) -> Self {
        self.generate_mode = mode;
        self.iterations = iterations;
        self
    }

    pub fn inheriting_heading(mut self) -> Self {
        self.inherit_heading = true;
        self
    }

    pub fn with_bake_settings(mut self, settings: BakeSettings) -> Self {
        self.bake_settings = settings;
        self
    }

    /// Seeds `bundle` and starts the chain. Runs the chain at most once per
    /// instance.
    fn generate(&mut self, world: &mut World, node: NodeId, mut bundle: ParameterBundle) {
        let mut sentence = Sentence::new(&self.axiom);
        let mut rules = self.rules.clone();
        match self.generate_mode {
            GenMode::PreEdgeRewrite => {
                for _ in 0..self.iterations {
                    sentence = rules.next_generation(&sentence);
                }
                rules.fertile = false;
                bundle.set_or_put(keys::ITERATIONS, 0_i64);
            }
            GenMode::IterativeNodeRewrite => {
                rules.fertile = true;
                bundle.set_or_put(keys::ITERATIONS, self.iterations);
            }
        }
        let rules = Rc::new(rules);

        bundle.set_or_put(keys::GENERATION, 0_i64);
        bundle.set_or_put(keys::SENTENCE, sentence.clone());
        bundle.set_or_put(keys::IMPLEMENTATIONS, self.registry.clone());
        bundle.set_or_put(keys::RULE_SET, rules.clone());

        let position = world
            .nodes
            .get(node)
            .map_or_else(Vector3::zeros, |n| n.transform.position);
        if !bundle.exists(keys::POSITION) {
            bundle.put(keys::POSITION, position);
        }
        if !self.inherit_heading {
            bundle.set_or_put(keys::HEADING, self.heading);
        } else if !bundle.exists(keys::HEADING) {
            bundle.put(keys::HEADING, self.heading);
        }

        if self.executed {
            return;
        }
        self.executed = true;
        debug!(node = node.index(), axiom = %self.axiom, mode = ?self.generate_mode, "seeding");
        let core = CoreParams {
            sentence,
            registry: self.registry.clone(),
            rules,
        };
        proceed(world, node, core, bundle);
    }

    fn placement(&self, world: &mut World, position: Vector3<f64>, heading: &Vector3<f64>) -> Transform {
        let settings = self.bake_settings;
        let spin = world.random_euler(&settings.rotation_min, &settings.rotation_max);
        Transform {
            position,
            rotation: align_up(heading) * spin,
            scale: world.random_range(settings.scale_min, settings.scale_max),
        }
    }

    /// Animates `instance` from zero scale. Instances placed inside a
    /// prototype that is still generating keep their final scale, so every
    /// later clone of that prototype copies them at full size.
    fn grow_in(&self, world: &mut World, instance: NodeId) {
        if !self.bake_settings.scale_on_spawn || world.bake_cache.is_generating() {
            return;
        }
        if let Some(state) = world.nodes.get_mut(instance) {
            let end_scale = state.transform.scale;
            state.transform.scale = 0.0;
            world.enqueue(Box::new(ScaleIn {
                node: instance,
                end_scale,
                elapsed: 0.0,
                duration: self.bake_settings.scale_time,
            }));
        }
    }
}

impl Handler for Seed {
    fn execute(
        &mut self,
        world: &mut World,
        node: NodeId,
        bundle: ParameterBundle,
    ) -> Option<Box<dyn Continuation>> {
        if !world.nodes.is_dead(node) {
            self.generate(world, node, bundle);
        }
        None
    }

    fn bake(&mut self, world: &mut World, node: NodeId, bundle: ParameterBundle) {
        if world.nodes.is_dead(node) {
            return;
        }
        let Some(state) = world.nodes.get(node) else {
            return;
        };
        let Some(identifier) = state.prefab_identifier.clone() else {
            debug!(node = node.index(), "baking without a prefab identifier, nothing cached");
            self.generate(world, node, bundle);
            return;
        };

        let anchor = state.previous();
        let position = anchor
            .and_then(|a| world.nodes.get(a))
            .map_or(state.transform.position, |a| a.transform.position);
        let heading = bundle
            .get::<Vector3<f64>>(keys::HEADING)
            .unwrap_or_else(Vector3::y);
        let placement = self.placement(world, position, &heading);

        match world.bake_cache.lookup(&identifier) {
            BakeLookup::Hit(prototype) => {
                debug!(identifier = %identifier, node = node.index(), "bake cache hit");
                let parent = anchor.or(Some(node));
                if let Some(instance) =
                    instantiate_prototype(&mut world.nodes, prototype, parent, &placement)
                {
                    if let Some(state) = world.nodes.get_mut(instance) {
                        state.name = format!("Instance_{identifier}");
                    }
                    self.grow_in(world, instance);
                }
            }
            BakeLookup::InProgress => {
                debug!(
                    identifier = %identifier,
                    node = node.index(),
                    "prototype is still generating, skipping nested bake"
                );
            }
            BakeLookup::Miss => {
                debug!(identifier = %identifier, node = node.index(), "bake cache miss, generating");
                world.bake_cache.claim(&identifier);
                self.generate(world, node, bundle);

                reset_to_origin(&mut world.nodes, node);
                let instance = world.nodes.clone_subtree(node, anchor, &placement);
                seal_prototype(&mut world.nodes, node);
                if let Some(state) = world.nodes.get_mut(node) {
                    state.name = format!("Prototype_{identifier}");
                }
                if let Err(err) = world.bake_cache.register(&identifier, node) {
                    warn!(node = node.index(), "{err}");
                }

                if let Some(instance) = instance {
                    // Already generated; the copy must not grow again.
                    for id in world.nodes.subtree(instance) {
                        world.nodes.kill(id);
                    }
                    if let Some(state) = world.nodes.get_mut(instance) {
                        state.name = format!("InitialInstance_{identifier}");
                    }
                    self.grow_in(world, instance);
                }
            }
        }
    }
}

/// Scales a baked instance from zero up to its final size over `duration`
/// seconds of world time.
pub struct ScaleIn {
    node: NodeId,
    end_scale: f64,
    elapsed: f64,
    duration: f64,
}

impl Continuation for ScaleIn {
    fn resume(&mut self, world: &mut World) -> Step {
        self.elapsed += world.delta_time();
        let done = self.elapsed >= self.duration;
        let scale = if done {
            self.end_scale
        } else {
            self.end_scale * self.elapsed / self.duration
        };
        match world.nodes.get_mut(self.node) {
            Some(state) => state.transform.scale = scale,
            None => return Step::Complete,
        }
        if done {
            Step::Complete
        } else {
            Step::Pending
        }
    }

    fn label(&self) -> &str {
        "scale_in"
    }
}
