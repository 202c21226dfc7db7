//! The owned simulation context threaded through every dispatch call.

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use nalgebra::{UnitQuaternion, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::bake::BakeCache;
use crate::node::{Blade, NodeArena, NodeId, NodeSpec};
use crate::params::ParameterBundle;
use crate::scheduler::{Scheduler, TickReport};
use crate::traits::{Continuation, Handler};

/// Host-facing knobs for a simulation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GrowthSettings {
    /// Scheduler budget per tick.
    pub max_new_handlers_per_tick: usize,
    /// World time advanced by each [`Simulation::tick`].
    pub tick_seconds: f64,
    /// Generation ceiling for chains that carry no `Iterations` entry.
    pub max_generations: u32,
    pub rng_seed: u64,
}

impl Default for GrowthSettings {
    fn default() -> Self {
        Self {
            max_new_handlers_per_tick: 100,
            tick_seconds: 1.0 / 60.0,
            max_generations: 64,
            rng_seed: 0,
        }
    }
}

/// Everything handlers may touch: nodes, the bake cache, randomness and
/// the clock. Continuations created while handling are parked here until
/// the scheduler absorbs them.
pub struct World {
    pub nodes: NodeArena,
    pub bake_cache: BakeCache,
    /// Leaf outlines baked once per prefab identifier.
    pub shared_blades: HashMap<String, Rc<Blade>>,
    settings: GrowthSettings,
    rng: StdRng,
    time: f64,
    delta_time: f64,
    pending: VecDeque<Box<dyn Continuation>>,
    dispatched: usize,
}

impl World {
    pub fn new(settings: GrowthSettings) -> Self {
        Self {
            nodes: NodeArena::new(),
            bake_cache: BakeCache::new(),
            shared_blades: HashMap::new(),
            rng: StdRng::seed_from_u64(settings.rng_seed),
            time: 0.0,
            delta_time: settings.tick_seconds,
            settings,
            pending: VecDeque::new(),
            dispatched: 0,
        }
    }

    pub fn settings(&self) -> &GrowthSettings {
        &self.settings
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn delta_time(&self) -> f64 {
        self.delta_time
    }

    pub fn advance_clock(&mut self, dt: f64) {
        self.delta_time = dt;
        self.time += dt;
    }

    /// Number of handlers dispatched so far.
    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    pub(crate) fn record_dispatch(&mut self) {
        self.dispatched += 1;
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Uniform sample in `[min, max]`; bounds may come in either order.
    pub fn random_range(&mut self, min: f64, max: f64) -> f64 {
        if min == max || !min.is_finite() || !max.is_finite() {
            return min;
        }
        let (lo, hi) = if min < max { (min, max) } else { (max, min) };
        self.rng.gen_range(lo..=hi)
    }

    /// Rotation from per-axis Euler angles in degrees, each sampled in range.
    pub fn random_euler(&mut self, min: &Vector3<f64>, max: &Vector3<f64>) -> UnitQuaternion<f64> {
        let x = self.random_range(min.x, max.x).to_radians();
        let y = self.random_range(min.y, max.y).to_radians();
        let z = self.random_range(min.z, max.z).to_radians();
        UnitQuaternion::from_euler_angles(x, y, z)
    }

    pub fn enqueue(&mut self, continuation: Box<dyn Continuation>) {
        self.pending.push_back(continuation);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn take_pending(&mut self) -> VecDeque<Box<dyn Continuation>> {
        std::mem::take(&mut self.pending)
    }
}

/// A world plus the scheduler that drives it.
pub struct Simulation {
    pub world: World,
    pub scheduler: Scheduler,
}

impl Simulation {
    pub fn new(settings: GrowthSettings) -> Self {
        Self {
            scheduler: Scheduler::new(settings.max_new_handlers_per_tick),
            world: World::new(settings),
        }
    }

    /// Spawns a root node for `handler` and runs its entry point.
    pub fn plant(
        &mut self,
        spec: NodeSpec,
        mut handler: Box<dyn Handler>,
        bundle: ParameterBundle,
    ) -> NodeId {
        let baked = spec.baked;
        let node = self.world.nodes.spawn(spec);
        if baked {
            handler.bake(&mut self.world, node, bundle);
        } else if let Some(continuation) = handler.execute(&mut self.world, node, bundle) {
            self.world.enqueue(continuation);
        }
        node
    }

    /// Advances the clock by one tick and runs the scheduler once.
    pub fn tick(&mut self) -> TickReport {
        let dt = self.world.settings().tick_seconds;
        self.world.advance_clock(dt);
        self.scheduler.tick(&mut self.world)
    }

    pub fn is_idle(&self) -> bool {
        self.scheduler.is_empty() && self.world.pending_len() == 0
    }

    /// Ticks until nothing is queued or `max_ticks` is reached.
    /// Returns the number of ticks run.
    pub fn run_until_idle(&mut self, max_ticks: usize) -> usize {
        let mut ticks = 0;
        while ticks < max_ticks && !self.is_idle() {
            self.tick();
            ticks += 1;
        }
        ticks
    }
}
