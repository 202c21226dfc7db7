//! Growing branch segments.
//!
//! A branch extends its node along `Heading` a little every tick until it
//! reaches its length, recording the resulting [`Segment`] for the host to
//! mesh. Dimensions shrink from one branch to the next through the change
//! coefficients, and every branch hands its successor a callback so the
//! successor's base radius can become this branch's top radius.

use std::rc::Rc;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dispatch::{attach_end_handler, core_parameters_or_warn, proceed, CoreParams};
use crate::node::{NodeId, Segment};
use crate::params::{keys, GrowCallback, ParameterBundle};
use crate::traits::{Continuation, Handler, Step};
use crate::world::World;

/// Start values, per-branch change coefficients and cutoffs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BranchShape {
    pub length_cutoff: f64,
    pub radius_cutoff: f64,
    pub start_length: f64,
    pub length_change_coefficient: f64,
    pub start_radius: f64,
    pub radius_change_coefficient: f64,
    pub top_radius_multiplier: f64,
    pub bottom_radius_multiplier: f64,
    pub start_grow_speed: f64,
    pub grow_speed_change_coefficient: f64,
    pub start_face_num: f64,
    pub face_num_change_coefficient: f64,
    /// Handler placed at the growing tip. It runs once on a dead node, so it
    /// never continues the chain.
    pub end_symbol: Option<char>,
}

impl Default for BranchShape {
    fn default() -> Self {
        Self {
            length_cutoff: 0.001,
            radius_cutoff: 0.001,
            start_length: 1.0,
            length_change_coefficient: 1.0,
            start_radius: 1.0,
            radius_change_coefficient: 1.0,
            top_radius_multiplier: 1.0,
            bottom_radius_multiplier: 1.0,
            start_grow_speed: 4.0,
            grow_speed_change_coefficient: 1.0,
            start_face_num: 6.0,
            face_num_change_coefficient: 0.8,
            end_symbol: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Branch {
    pub shape: BranchShape,
}

impl Branch {
    pub fn new(shape: BranchShape) -> Self {
        Self { shape }
    }

    /// Reads everything growth needs. `None` ends the chain at this node.
    fn prepare(
        &self,
        world: &mut World,
        node: NodeId,
        bundle: ParameterBundle,
        baked: bool,
    ) -> Option<Growth> {
        let core = core_parameters_or_warn(&bundle, "branch", node)?;
        let Some(heading) = bundle.get::<Vector3<f64>>(keys::HEADING) else {
            warn!(
                node = node.index(),
                "parameter {:?} missing, not growing",
                keys::HEADING
            );
            return None;
        };

        let pick = |key: &str, fallback: f64| bundle.get::<f64>(key).unwrap_or(fallback);
        let length = pick(keys::BRANCH_LENGTH, self.shape.start_length);
        let radius = pick(keys::BRANCH_RADIUS, self.shape.start_radius);
        let grow_speed = pick(keys::BRANCH_GROW_SPEED, self.shape.start_grow_speed);
        let faces = pick(keys::BRANCH_FACE_NUM, self.shape.start_face_num);

        if length < self.shape.length_cutoff || radius < self.shape.radius_cutoff {
            debug!(node = node.index(), length, radius, "below cutoff, branch ends");
            return None;
        }

        let state = world.nodes.get_mut(node)?;
        state.transform.set_up(&heading);
        let origin = state.transform.position;
        let callback = bundle.get::<GrowCallback>(keys::GROW_LOOP_CALLBACK);
        let end = self.shape.end_symbol.and_then(|symbol| {
            attach_end_handler(world, node, &core.registry, symbol, bundle.clone(), baked)
        });

        let growth = Growth {
            node,
            end,
            shape: self.shape,
            origin,
            heading,
            length,
            radius,
            grow_speed,
            faces,
            bottom_radius: 0.0,
            callback,
            work: Some((core, bundle)),
        };
        growth.follow_tip(world);
        Some(growth)
    }
}

impl Handler for Branch {
    fn execute(
        &mut self,
        world: &mut World,
        node: NodeId,
        bundle: ParameterBundle,
    ) -> Option<Box<dyn Continuation>> {
        self.prepare(world, node, bundle, false)
            .map(|growth| Box::new(growth) as Box<dyn Continuation>)
    }

    fn bake(&mut self, world: &mut World, node: NodeId, bundle: ParameterBundle) {
        if let Some(mut growth) = self.prepare(world, node, bundle, true) {
            let tip = growth.origin + growth.direction() * growth.length;
            if let Some(state) = world.nodes.get_mut(node) {
                state.transform.position = tip;
            }
            growth.finish(world);
        }
    }
}

/// One branch's growth loop, resumed once per tick.
pub struct Growth {
    node: NodeId,
    end: Option<NodeId>,
    shape: BranchShape,
    origin: Vector3<f64>,
    heading: Vector3<f64>,
    length: f64,
    radius: f64,
    grow_speed: f64,
    faces: f64,
    bottom_radius: f64,
    callback: Option<GrowCallback>,
    work: Option<(CoreParams, ParameterBundle)>,
}

impl Growth {
    fn direction(&self) -> Vector3<f64> {
        self.heading.try_normalize(f64::EPSILON).unwrap_or_else(Vector3::y)
    }

    fn distance(&self, world: &World) -> f64 {
        world
            .nodes
            .get(self.node)
            .map_or(0.0, |n| (n.transform.position - self.origin).norm())
    }

    /// Keeps the end handler's node on the tip, facing along the heading.
    fn follow_tip(&self, world: &mut World) {
        let Some(end) = self.end else {
            return;
        };
        let Some(tip) = world.nodes.get(self.node).map(|n| n.transform.position) else {
            return;
        };
        if let Some(state) = world.nodes.get_mut(end) {
            state.transform.position = tip;
            state.transform.set_up(&self.heading);
        }
    }

    fn record_segment(&self, world: &mut World, distance: f64) {
        let shape = self.shape;
        let faces = (self.faces as usize).max(2);
        let bottom = self.bottom_radius * shape.bottom_radius_multiplier;
        if let Some(state) = world.nodes.get_mut(self.node) {
            let top = state.segment.map_or(0.0, |s| s.top_radius);
            state.segment = Some(Segment {
                length: distance,
                bottom_radius: bottom,
                top_radius: top,
                faces,
            });
        }
    }

    fn finish(&mut self, world: &mut World) {
        self.follow_tip(world);
        self.bottom_radius = self.radius;
        let distance = self.distance(world);
        self.record_segment(world, distance);
        if let Some(callback) = self.callback.clone() {
            callback(world, self.bottom_radius);
        }

        let Some((core, mut bundle)) = self.work.take() else {
            return;
        };
        let shape = self.shape;
        bundle.set_or_put(keys::BRANCH_LENGTH, self.length * shape.length_change_coefficient);
        bundle.set_or_put(keys::BRANCH_RADIUS, self.radius * shape.radius_change_coefficient);
        bundle.set_or_put(
            keys::BRANCH_GROW_SPEED,
            self.grow_speed * shape.grow_speed_change_coefficient,
        );
        bundle.set_or_put(keys::BRANCH_FACE_NUM, self.faces * shape.face_num_change_coefficient);
        bundle.set_or_put(keys::GROW_LOOP_CALLBACK, top_radius_callback(self.node, shape));

        debug!(node = self.node.index(), length = distance, "branch grown");
        proceed(world, self.node, core, bundle);
    }
}

/// Lets the next branch set this branch's top radius from its own base.
fn top_radius_callback(node: NodeId, shape: BranchShape) -> GrowCallback {
    Rc::new(move |world: &mut World, radius: f64| {
        if let Some(segment) = world.nodes.get_mut(node).and_then(|n| n.segment.as_mut()) {
            segment.top_radius = radius * shape.top_radius_multiplier;
        }
    })
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t.clamp(0.0, 1.0)
}

impl Continuation for Growth {
    fn resume(&mut self, world: &mut World) -> Step {
        if world.nodes.get(self.node).map_or(true, |n| n.destroyed) {
            return Step::Complete;
        }

        let distance = self.distance(world);
        if distance >= self.length {
            self.finish(world);
            return Step::Complete;
        }

        let ratio = distance / self.length;
        let speed = lerp(
            self.grow_speed,
            self.grow_speed * self.shape.grow_speed_change_coefficient,
            ratio,
        );
        let step = (self.heading.norm() * world.delta_time() * speed).min(self.length - distance);
        let offset = self.direction() * step;
        if let Some(state) = world.nodes.get_mut(self.node) {
            state.transform.translate(&offset);
        }
        self.follow_tip(world);

        self.bottom_radius = lerp(0.0, self.radius, ratio);
        let distance = self.distance(world);
        self.record_segment(world, distance);
        if let Some(callback) = self.callback.clone() {
            callback(world, self.bottom_radius);
        }
        Step::Pending
    }

    fn label(&self) -> &str {
        "branch"
    }
}
