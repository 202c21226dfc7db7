use crate::node::NodeId;
use crate::params::ParameterBundle;
use crate::world::World;

/// Outcome of resuming a [`Continuation`] for one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Needs another tick; re-queued at the tail.
    Pending,
    /// Finished; dropped.
    Complete,
    /// Yielded something the scheduler cannot wait on. Reported and dropped.
    Unsupported(String),
}

/// A suspendable unit of work driven by the scheduler.
pub trait Continuation {
    /// Advances the continuation by one step.
    fn resume(&mut self, world: &mut World) -> Step;

    /// Short label used in logs.
    fn label(&self) -> &str {
        "continuation"
    }
}

/// Behaviour bound to a grammar symbol.
///
/// Both entry points must, when done, either hand the chain back to
/// dispatch or let it end.
pub trait Handler {
    /// Live entry point. Work that spans several ticks is returned as a
    /// continuation and handed to the scheduler.
    fn execute(
        &mut self,
        world: &mut World,
        node: NodeId,
        bundle: ParameterBundle,
    ) -> Option<Box<dyn Continuation>>;

    /// Synchronous entry point used when pre-generating.
    fn bake(&mut self, world: &mut World, node: NodeId, bundle: ParameterBundle);
}
