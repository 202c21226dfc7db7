//! Symbol → handler prototype table.
//!
//! Registration is explicit: every handler type a grammar can reach is added
//! with a factory closure, and the table is enumerable.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::traits::Handler;

pub type HandlerFactory = Rc<dyn Fn() -> Box<dyn Handler>>;

#[derive(Clone)]
pub struct HandlerPrototype {
    pub name: String,
    /// Instances never anchor their children.
    pub ethereal: bool,
    /// Instances always take the synchronous bake path.
    pub baked: bool,
    /// Shared identifier used by the bake cache.
    pub prefab_identifier: Option<String>,
    factory: HandlerFactory,
}

impl HandlerPrototype {
    pub fn new<F>(name: &str, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Handler> + 'static,
    {
        Self {
            name: name.to_string(),
            ethereal: false,
            baked: false,
            prefab_identifier: None,
            factory: Rc::new(factory),
        }
    }

    pub fn ethereal(mut self) -> Self {
        self.ethereal = true;
        self
    }

    pub fn baked(mut self) -> Self {
        self.baked = true;
        self
    }

    pub fn with_prefab(mut self, identifier: &str) -> Self {
        self.prefab_identifier = Some(identifier.to_string());
        self
    }

    pub fn instantiate(&self) -> Box<dyn Handler> {
        (self.factory)()
    }
}

impl fmt::Debug for HandlerPrototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerPrototype")
            .field("name", &self.name)
            .field("ethereal", &self.ethereal)
            .field("baked", &self.baked)
            .field("prefab_identifier", &self.prefab_identifier)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    entries: BTreeMap<char, HandlerPrototype>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, symbol: char, prototype: HandlerPrototype) -> Option<HandlerPrototype> {
        self.entries.insert(symbol, prototype)
    }

    pub fn with(mut self, symbol: char, prototype: HandlerPrototype) -> Self {
        self.register(symbol, prototype);
        self
    }

    pub fn resolve(&self, symbol: char) -> Option<&HandlerPrototype> {
        self.entries.get(&symbol)
    }

    pub fn contains(&self, symbol: char) -> bool {
        self.entries.contains_key(&symbol)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn symbols(&self) -> impl Iterator<Item = char> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (char, &HandlerPrototype)> {
        self.entries.iter().map(|(symbol, proto)| (*symbol, proto))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::Tally;
    use crate::node::NodeSpec;
    use crate::params::ParameterBundle;
    use crate::world::{GrowthSettings, World};

    #[test]
    fn register_replaces_and_returns_the_previous_prototype() {
        let tally = Tally::default();
        let mut registry = HandlerRegistry::new();
        assert!(registry.register('F', tally.prototype()).is_none());

        let replaced = registry
            .register(
                'F',
                HandlerPrototype::new("other", || Tally::default().prototype().instantiate()),
            )
            .expect("previous prototype returned");
        assert_eq!(replaced.name, "tally");
        assert_eq!(registry.resolve('F').map(|p| p.name.as_str()), Some("other"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn symbols_are_ordered_and_lookups_are_exact() {
        let tally = Tally::default();
        let registry = HandlerRegistry::new()
            .with('[', tally.prototype())
            .with('F', tally.prototype())
            .with('+', tally.prototype());

        assert_eq!(registry.symbols().collect::<String>(), "+F[");
        assert!(registry.contains('F'));
        assert!(!registry.contains('f'));
        assert!(registry.resolve('X').is_none());
        assert_eq!(registry.iter().count(), 3);
        assert!(!registry.is_empty());
        assert!(HandlerRegistry::new().is_empty());
    }

    #[test]
    fn builders_set_flags_and_instances_are_fresh() {
        let tally = Tally::default();
        let plain = tally.prototype();
        assert!(!plain.ethereal && !plain.baked && plain.prefab_identifier.is_none());

        let flagged = tally.prototype().ethereal().baked().with_prefab("oak");
        assert!(flagged.ethereal);
        assert!(flagged.baked);
        assert_eq!(flagged.prefab_identifier.as_deref(), Some("oak"));
        assert!(format!("{flagged:?}").contains("oak"));

        let mut world = World::new(GrowthSettings::default());
        let node = world.nodes.spawn(NodeSpec::default());
        for _ in 0..2 {
            let mut handler = flagged.instantiate();
            handler.bake(&mut world, node, ParameterBundle::new());
        }
        assert_eq!(tally.count(), 2);
    }
}
