//! Serializable plant descriptions.
//!
//! A [`PlantConfig`] is everything needed to build a root [`Seed`]: the
//! grammar, how it is rewritten, and which handler each symbol binds to.

use std::collections::BTreeMap;
use std::rc::Rc;

use anyhow::{Context, Result};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::handlers::{
    AxisAngleRotate, BakeSettings, Branch, BranchShape, GenMode, Leaf, LeafShape, Pause, Rotate,
    Seed, Split, Translate,
};
use crate::node::{NodeId, NodeSpec};
use crate::params::ParameterBundle;
use crate::registry::{HandlerPrototype, HandlerRegistry};
use crate::rules::{RuleParseError, RuleSet, UnmappedPolicy};
use crate::sentence::SENTINEL;
use crate::world::Simulation;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("axiom is empty")]
    EmptyAxiom,
    #[error("iterations must be non-negative, got {0}")]
    NegativeIterations(i64),
    #[error("{handler} for {symbol:?} has an invalid range {min}..{max}")]
    InvalidRange {
        handler: &'static str,
        symbol: char,
        min: f64,
        max: f64,
    },
    #[error(transparent)]
    Rules(#[from] RuleParseError),
}

/// Rules either as `F -> FF; X -> F[+X]` text or as a symbol map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RulesConfig {
    Text(String),
    Map(BTreeMap<char, String>),
}

impl Default for RulesConfig {
    fn default() -> Self {
        RulesConfig::Map(BTreeMap::new())
    }
}

fn default_close() -> char {
    ']'
}

/// Handler bound to one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum HandlerSpec {
    Split {
        #[serde(default = "default_close")]
        close: char,
    },
    Pause {
        min_seconds: f64,
        max_seconds: f64,
    },
    Rotate {
        euler_min: Vector3<f64>,
        euler_max: Vector3<f64>,
    },
    AxisAngleRotate {
        axis: Vector3<f64>,
        angle_min: f64,
        angle_max: f64,
    },
    Translate {
        distance_min: f64,
        distance_max: f64,
    },
    Branch(BranchShape),
    Leaf {
        /// Baked leaves sharing this identifier share one outline.
        #[serde(default)]
        prefab_identifier: Option<String>,
        #[serde(flatten)]
        shape: LeafShape,
    },
    /// A nested plant grown from this symbol.
    Seed(Box<PlantConfig>),
}

impl HandlerSpec {
    fn check_range(
        handler: &'static str,
        symbol: char,
        min: f64,
        max: f64,
    ) -> Result<(), ConfigError> {
        if min.is_finite() && max.is_finite() && min <= max {
            Ok(())
        } else {
            Err(ConfigError::InvalidRange {
                handler,
                symbol,
                min,
                max,
            })
        }
    }

    pub fn prototype(&self, symbol: char) -> Result<HandlerPrototype, ConfigError> {
        let prototype = match self.clone() {
            HandlerSpec::Split { close } => {
                HandlerPrototype::new("split", move || Box::new(Split::new(close))).ethereal()
            }
            HandlerSpec::Pause {
                min_seconds,
                max_seconds,
            } => {
                Self::check_range("pause", symbol, min_seconds, max_seconds)?;
                HandlerPrototype::new("pause", move || {
                    Box::new(Pause::new(min_seconds, max_seconds))
                })
                .ethereal()
            }
            HandlerSpec::Rotate {
                euler_min,
                euler_max,
            } => HandlerPrototype::new("rotate", move || Box::new(Rotate::new(euler_min, euler_max)))
                .ethereal(),
            HandlerSpec::AxisAngleRotate {
                axis,
                angle_min,
                angle_max,
            } => {
                Self::check_range("axis_angle_rotate", symbol, angle_min, angle_max)?;
                HandlerPrototype::new("axis_angle_rotate", move || {
                    Box::new(AxisAngleRotate::new(axis, angle_min, angle_max))
                })
                .ethereal()
            }
            HandlerSpec::Translate {
                distance_min,
                distance_max,
            } => {
                Self::check_range("translate", symbol, distance_min, distance_max)?;
                HandlerPrototype::new("translate", move || {
                    Box::new(Translate::new(distance_min, distance_max))
                })
            }
            HandlerSpec::Branch(shape) => {
                HandlerPrototype::new("branch", move || Box::new(Branch::new(shape)))
            }
            HandlerSpec::Leaf {
                prefab_identifier,
                shape,
            } => {
                let prototype =
                    HandlerPrototype::new("leaf", move || Box::new(Leaf::new(shape.clone())));
                match &prefab_identifier {
                    Some(identifier) => prototype.with_prefab(identifier),
                    None => prototype,
                }
            }
            HandlerSpec::Seed(plant) => {
                let template = plant.seed()?;
                let mut prototype =
                    HandlerPrototype::new("seed", move || Box::new(template.clone()));
                if plant.baked {
                    prototype = prototype.baked();
                }
                match &plant.prefab_identifier {
                    Some(identifier) => prototype.with_prefab(identifier),
                    None => prototype,
                }
            }
        };
        Ok(prototype)
    }
}

fn default_heading() -> Vector3<f64> {
    Vector3::y()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantConfig {
    pub axiom: String,
    #[serde(default)]
    pub iterations: i64,
    #[serde(default)]
    pub generate_mode: GenMode,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub unmapped: UnmappedPolicy,
    #[serde(default)]
    pub inherit_heading: bool,
    #[serde(default = "default_heading")]
    pub heading: Vector3<f64>,
    #[serde(default)]
    pub baked: bool,
    #[serde(default)]
    pub prefab_identifier: Option<String>,
    #[serde(default)]
    pub bake: BakeSettings,
    #[serde(default)]
    pub handlers: BTreeMap<char, HandlerSpec>,
}

impl PlantConfig {
    /// Plant with no rules, no handlers and default settings.
    pub fn new(axiom: &str) -> Self {
        Self {
            axiom: axiom.to_string(),
            iterations: 0,
            generate_mode: GenMode::default(),
            rules: RulesConfig::default(),
            unmapped: UnmappedPolicy::default(),
            inherit_heading: false,
            heading: default_heading(),
            baked: false,
            prefab_identifier: None,
            bake: BakeSettings::default(),
            handlers: BTreeMap::new(),
        }
    }

    pub fn with_handler(mut self, symbol: char, spec: HandlerSpec) -> Self {
        self.handlers.insert(symbol, spec);
        self
    }

    pub fn rule_set(&self) -> Result<RuleSet, ConfigError> {
        let mut rules = match &self.rules {
            RulesConfig::Text(text) => RuleSet::parse(text)?,
            RulesConfig::Map(map) => {
                let mut rules = RuleSet::new();
                for (symbol, replacement) in map {
                    rules.insert(*symbol, replacement);
                }
                rules
            }
        };
        rules.unmapped = self.unmapped;
        Ok(rules)
    }

    pub fn registry(&self) -> Result<HandlerRegistry, ConfigError> {
        let mut registry = HandlerRegistry::new();
        for (symbol, spec) in &self.handlers {
            registry.register(*symbol, spec.prototype(*symbol)?);
        }
        Ok(registry)
    }

    pub fn seed(&self) -> Result<Seed, ConfigError> {
        if self.axiom.is_empty() {
            return Err(ConfigError::EmptyAxiom);
        }
        if self.iterations < 0 {
            return Err(ConfigError::NegativeIterations(self.iterations));
        }

        let mut seed = Seed::new(&self.axiom, self.rule_set()?, Rc::new(self.registry()?))
            .with_mode(self.generate_mode, self.iterations)
            .with_bake_settings(self.bake);
        seed.heading = self.heading;
        if self.inherit_heading {
            seed = seed.inheriting_heading();
        }
        Ok(seed)
    }

    /// Root node description for this plant. The root is bound to no symbol.
    pub fn root_spec(&self) -> NodeSpec {
        NodeSpec {
            symbol: SENTINEL,
            name: "seed".to_string(),
            previous: None,
            ethereal: false,
            baked: self.baked,
            prefab_identifier: self.prefab_identifier.clone(),
        }
    }
}

impl Simulation {
    /// Builds the root seed described by `config` and plants it.
    pub fn plant_config(&mut self, config: &PlantConfig) -> Result<NodeId> {
        let seed = config
            .seed()
            .with_context(|| format!("invalid plant config for axiom {:?}", config.axiom))?;
        Ok(self.plant(config.root_spec(), Box::new(seed), ParameterBundle::new()))
    }
}
