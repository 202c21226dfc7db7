//! Advancing a sentence and handing control to the next handler.
//!
//! Dispatch is a trampoline: each call spawns at most one handler, and that
//! handler re-enters dispatch itself (through the scheduler when live, or
//! directly when baking) to keep the chain going.

use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::node::{NodeId, NodeSpec};
use crate::params::{keys, ParameterBundle};
use crate::registry::HandlerRegistry;
use crate::rules::RuleSet;
use crate::sentence::{Sentence, SENTINEL};
use crate::traits::{Continuation, Step};
use crate::world::World;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing required parameter {0:?}")]
pub struct MissingParameter(pub &'static str);

/// The three entries every handler needs to continue the chain.
#[derive(Debug, Clone)]
pub struct CoreParams {
    pub sentence: Sentence,
    pub registry: Rc<HandlerRegistry>,
    pub rules: Rc<RuleSet>,
}

pub fn core_parameters(bundle: &ParameterBundle) -> Result<CoreParams, MissingParameter> {
    let sentence = bundle
        .get::<Sentence>(keys::SENTENCE)
        .ok_or(MissingParameter(keys::SENTENCE))?;
    let registry = bundle
        .get::<Rc<HandlerRegistry>>(keys::IMPLEMENTATIONS)
        .ok_or(MissingParameter(keys::IMPLEMENTATIONS))?;
    let rules = bundle
        .get::<Rc<RuleSet>>(keys::RULE_SET)
        .ok_or(MissingParameter(keys::RULE_SET))?;
    Ok(CoreParams {
        sentence,
        registry,
        rules,
    })
}

/// [`core_parameters`] that logs the failure against `node`.
pub fn core_parameters_or_warn(
    bundle: &ParameterBundle,
    handler: &str,
    node: NodeId,
) -> Option<CoreParams> {
    match core_parameters(bundle) {
        Ok(core) => Some(core),
        Err(err) => {
            warn!(handler, node = node.index(), "{err}; aborting node");
            None
        }
    }
}

/// Advances `sentence` to the next registered symbol and dispatches one
/// handler for it.
///
/// An exhausted sentence is rewritten with `rules` and the `Generation`
/// counter in `bundle` is bumped. Growth stops once it passes `Iterations`
/// (or the world's `max_generations` when the bundle has no ceiling).
/// A prototype marked as baked switches the chain to the bake path from its
/// node onward. Returns `true` iff a handler was dispatched.
pub fn advance_and_dispatch(
    world: &mut World,
    predecessor: NodeId,
    mut sentence: Sentence,
    registry: &Rc<HandlerRegistry>,
    rules: &Rc<RuleSet>,
    mut bundle: ParameterBundle,
    baked: bool,
) -> bool {
    if world.nodes.is_dead(predecessor) {
        debug!(node = predecessor.index(), "predecessor is dead, not dispatching");
        return false;
    }

    let (symbol, prototype) = loop {
        if !sentence.has_next() {
            sentence = rules.next_generation(&sentence);
            bundle.set_or_put(keys::SENTENCE, sentence.clone());

            let generation = bundle.get::<i64>(keys::GENERATION).unwrap_or(0) + 1;
            bundle.set_or_put(keys::GENERATION, generation);
            let ceiling = bundle
                .get::<i64>(keys::ITERATIONS)
                .unwrap_or(i64::from(world.settings().max_generations));
            debug!(generation, ceiling, len = sentence.len(), "rewrote sentence");
            if generation > ceiling {
                return false;
            }
        }

        let symbol = sentence.next();
        if symbol == SENTINEL {
            return false;
        }
        if let Some(prototype) = registry.resolve(symbol) {
            break (symbol, prototype.clone());
        }
    };

    if !bundle.set_or_put(keys::SENTENCE, sentence) {
        warn!(
            node = predecessor.index(),
            "bundle entry {:?} has the wrong type, not dispatching",
            keys::SENTENCE
        );
        return false;
    }

    let baked = baked || prototype.baked;
    let previous = world.nodes.anchor_of(predecessor);
    let node = world.nodes.spawn(NodeSpec {
        symbol,
        name: prototype.name.clone(),
        previous,
        ethereal: prototype.ethereal,
        baked,
        prefab_identifier: prototype.prefab_identifier.clone(),
    });
    world.record_dispatch();
    debug!(%symbol, handler = %prototype.name, node = node.index(), baked, "dispatching");

    let mut handler = prototype.instantiate();
    if baked {
        handler.bake(world, node, bundle);
    } else if let Some(continuation) = handler.execute(world, node, bundle) {
        world.enqueue(continuation);
    }
    true
}

/// Spawns the handler bound to `symbol` as a dead child of `owner` and runs
/// it once with `bundle`. Being dead, it can act on its own node but never
/// continues the chain. Returns the new node, or `None` if `symbol` is not
/// registered.
pub fn attach_end_handler(
    world: &mut World,
    owner: NodeId,
    registry: &HandlerRegistry,
    symbol: char,
    bundle: ParameterBundle,
    baked: bool,
) -> Option<NodeId> {
    let Some(prototype) = registry.resolve(symbol) else {
        warn!(%symbol, node = owner.index(), "end handler is not registered");
        return None;
    };
    let node = world.nodes.spawn(NodeSpec {
        symbol,
        name: prototype.name.clone(),
        previous: Some(owner),
        ethereal: prototype.ethereal,
        baked,
        prefab_identifier: prototype.prefab_identifier.clone(),
    });
    world.nodes.kill(node);
    world.record_dispatch();
    debug!(%symbol, handler = %prototype.name, node = node.index(), "attaching end handler");

    let mut handler = prototype.instantiate();
    if baked {
        handler.bake(world, node, bundle);
    } else if let Some(continuation) = handler.execute(world, node, bundle) {
        world.enqueue(continuation);
    }
    Some(node)
}

/// Continues the chain after `node`: synchronously when the node is baked,
/// through the scheduler otherwise.
pub fn proceed(world: &mut World, node: NodeId, core: CoreParams, bundle: ParameterBundle) {
    let baked = world.nodes.get(node).map_or(false, |n| n.baked);
    if baked {
        advance_and_dispatch(
            world,
            node,
            core.sentence,
            &core.registry,
            &core.rules,
            bundle,
            true,
        );
    } else {
        enqueue_next(world, node, core, bundle);
    }
}

/// Queues a live dispatch step for `predecessor`.
pub fn enqueue_next(
    world: &mut World,
    predecessor: NodeId,
    core: CoreParams,
    bundle: ParameterBundle,
) {
    world.enqueue(Box::new(DispatchNext::new(predecessor, core, bundle)));
}

/// Continuation that resumes dispatch for one node.
pub struct DispatchNext {
    predecessor: NodeId,
    work: Option<(CoreParams, ParameterBundle)>,
}

impl DispatchNext {
    pub fn new(predecessor: NodeId, core: CoreParams, bundle: ParameterBundle) -> Self {
        Self {
            predecessor,
            work: Some((core, bundle)),
        }
    }
}

impl Continuation for DispatchNext {
    fn resume(&mut self, world: &mut World) -> Step {
        if let Some((core, bundle)) = self.work.take() {
            advance_and_dispatch(
                world,
                self.predecessor,
                core.sentence,
                &core.registry,
                &core.rules,
                bundle,
                false,
            );
        }
        Step::Complete
    }

    fn label(&self) -> &str {
        "dispatch"
    }
}
