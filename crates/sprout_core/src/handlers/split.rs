//! Forks a bracketed sub-sentence into its own branch.

use thiserror::Error;
use tracing::{debug, error};

use crate::dispatch::{core_parameters_or_warn, proceed, CoreParams};
use crate::node::NodeId;
use crate::params::ParameterBundle;
use crate::sentence::{Sentence, SentenceError};
use crate::traits::{Continuation, Handler};
use crate::world::World;

pub const DEFAULT_CLOSE: char = ']';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error("no {close:?} closes the {open:?} at position {start}")]
    Unbalanced { open: char, close: char, start: isize },
    #[error(transparent)]
    Sentence(#[from] SentenceError),
}

/// Cuts the branch opened at the cursor out of `sentence`.
///
/// The cursor must sit on the opening symbol. On success the bracketed span
/// is removed from `sentence` (cursor left just before the gap) and its
/// interior returned. On failure `sentence` is left as it was.
pub fn cut_branch(sentence: &mut Sentence, open: char, close: char) -> Result<Sentence, SplitError> {
    let start = sentence.position();
    sentence.push_position();
    let mut depth = 1_usize;
    while sentence.has_next() {
        let symbol = sentence.next();
        if symbol == close {
            depth -= 1;
        } else if symbol == open {
            depth += 1;
        }
        if depth == 0 {
            return Ok(sentence.pop_and_cut()?);
        }
    }
    sentence.pop_position()?;
    Err(SplitError::Unbalanced { open, close, start })
}

/// Ethereal handler bound to an opening bracket. The residual sentence and
/// the bracket interior continue as two independent branches from the same
/// anchor.
#[derive(Debug, Clone)]
pub struct Split {
    close: char,
}

impl Default for Split {
    fn default() -> Self {
        Self::new(DEFAULT_CLOSE)
    }
}

impl Split {
    pub fn new(close: char) -> Self {
        Self { close }
    }

    fn run(&self, world: &mut World, node: NodeId, bundle: ParameterBundle) {
        if let Some(core) = core_parameters_or_warn(&bundle, "split", node) {
            let open = world.nodes.get(node).map_or('[', |n| n.symbol);
            let CoreParams {
                mut sentence,
                registry,
                rules,
            } = core;
            match cut_branch(&mut sentence, open, self.close) {
                Ok(interior) => {
                    debug!(
                        node = node.index(),
                        residual = %sentence,
                        interior = %interior,
                        "forking branch"
                    );
                    let residual = CoreParams {
                        sentence,
                        registry: registry.clone(),
                        rules: rules.clone(),
                    };
                    let fork = CoreParams {
                        sentence: interior,
                        registry,
                        rules,
                    };
                    proceed(world, node, residual, bundle.clone());
                    proceed(world, node, fork, bundle);
                }
                Err(err) => error!(node = node.index(), "split failed: {err}"),
            }
        }
        world.nodes.destroy(node);
    }
}

impl Handler for Split {
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
