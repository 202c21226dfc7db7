pub mod bake;
pub mod config;
pub mod dispatch;
pub mod handlers;
pub mod node;
pub mod params;
pub mod registry;
pub mod rules;
pub mod scheduler;
pub mod sentence;
/// The `sprout_core` crate grows branching structures from L-system grammars.
/// A seed symbol is rewritten into a sentence, and every symbol of that sentence
/// is handed to the handler registered for it, one at a time.
///
/// Key components:
/// - **Sentence / RuleSet**: cursor-based symbol sequences and single-symbol production rules.
/// - **Dispatch**: advances a sentence and spawns the next handler node, anchored past ethereal nodes.
/// - **Scheduler**: budgeted FIFO of continuations, resumed once per tick.
/// - **Bake**: generate a plant once per prefab identifier and clone it afterwards.
/// - **Handlers**: seed, split, pause, rotations, translate, growing branches and leaves.
pub mod traits;
pub mod world;

pub use config::{HandlerSpec, PlantConfig};
pub use dispatch::{advance_and_dispatch, core_parameters, CoreParams, MissingParameter};
pub use node::{Blade, NodeArena, NodeId, NodeSpec, NodeState, Transform};
pub use params::{keys, Param, ParameterBundle};
pub use registry::{HandlerPrototype, HandlerRegistry};
pub use rules::{RuleSet, UnmappedPolicy};
pub use scheduler::{Scheduler, TickReport};
pub use sentence::Sentence;
pub use traits::{Continuation, Handler, Step};
pub use world::{GrowthSettings, Simulation, World};
