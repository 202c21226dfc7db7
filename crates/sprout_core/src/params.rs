//! Typed key/value bundle threaded between handler invocations.
//!
//! Handlers exchange information through a [`ParameterBundle`] without
//! knowing about each other. Every hand-off clones the bundle, so forked
//! branches never observe each other's writes. Shared payloads (rules,
//! registry, callbacks) are immutable behind `Rc`.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use nalgebra::{UnitQuaternion, Vector2, Vector3, Vector4};
use serde::{Deserialize, Serialize};

use crate::registry::HandlerRegistry;
use crate::rules::RuleSet;
use crate::sentence::Sentence;
use crate::world::World;

/// Well-known bundle keys shared by the built-in handlers.
pub mod keys {
    pub const SENTENCE: &str = "Sentence";
    pub const IMPLEMENTATIONS: &str = "Implementations";
    pub const RULE_SET: &str = "RuleSet";
    pub const GENERATION: &str = "Generation";
    pub const ITERATIONS: &str = "Iterations";
    pub const POSITION: &str = "Position";
    pub const HEADING: &str = "Heading";
    pub const ROTATION: &str = "Rotation";
    pub const BRANCH_LENGTH: &str = "BranchLength";
    pub const BRANCH_RADIUS: &str = "BranchRadius";
    pub const BRANCH_GROW_SPEED: &str = "BranchGrowSpeed";
    pub const BRANCH_FACE_NUM: &str = "BranchFaceNum";
    pub const GROW_LOOP_CALLBACK: &str = "GrowLoopCallback";
    pub const LEAF_MEDIAL_SIZE: &str = "LeafMedialSize";
    pub const LEAF_LATERAL_SIZE: &str = "LeafLateralSize";
    pub const LEAF_GROW_TIME: &str = "LeafGrowTime";
}

/// Called by a growing branch with its current bottom radius so the branch
/// before it can match its top radius.
pub type GrowCallback = Rc<dyn Fn(&mut World, f64)>;

/// Piecewise-linear curve over `(time, value)` keyframes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    keys: Vec<(f64, f64)>,
}

impl Curve {
    pub fn new(mut keys: Vec<(f64, f64)>) -> Self {
        keys.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { keys }
    }

    pub fn constant(value: f64) -> Self {
        Self::new(vec![(0.0, value), (1.0, value)])
    }

    pub fn evaluate(&self, t: f64) -> f64 {
        let (first, last) = match (self.keys.first(), self.keys.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return 0.0,
        };
        if t <= first.0 {
            return first.1;
        }
        if t >= last.0 {
            return last.1;
        }
        for pair in self.keys.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if t <= b.0 {
                let span = b.0 - a.0;
                if span <= 0.0 {
                    return b.1;
                }
                return a.1 + (b.1 - a.1) * (t - a.0) / span;
            }
        }
        last.1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    #[serde(default = "opaque")]
    pub a: f32,
}

fn opaque() -> f32 {
    1.0
}

impl Color {
    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
        a: 1.0,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    Float,
    Bool,
    Vec2,
    Vec3,
    Vec4,
    Rotation,
    Curve,
    Color,
    Sentence,
    Rules,
    Registry,
    Callback,
}

#[derive(Clone)]
pub enum Param {
    Int(i64),
    Float(f64),
    Bool(bool),
    Vec2(Vector2<f64>),
    Vec3(Vector3<f64>),
    Vec4(Vector4<f64>),
    Rotation(UnitQuaternion<f64>),
    Curve(Curve),
    Color(Color),
    Sentence(Sentence),
    Rules(Rc<RuleSet>),
    Registry(Rc<HandlerRegistry>),
    Callback(GrowCallback),
}

impl Param {
    pub fn kind(&self) -> ParamKind {
        match self {
            Param::Int(_) => ParamKind::Int,
            Param::Float(_) => ParamKind::Float,
            Param::Bool(_) => ParamKind::Bool,
            Param::Vec2(_) => ParamKind::Vec2,
            Param::Vec3(_) => ParamKind::Vec3,
            Param::Vec4(_) => ParamKind::Vec4,
            Param::Rotation(_) => ParamKind::Rotation,
            Param::Curve(_) => ParamKind::Curve,
            Param::Color(_) => ParamKind::Color,
            Param::Sentence(_) => ParamKind::Sentence,
            Param::Rules(_) => ParamKind::Rules,
            Param::Registry(_) => ParamKind::Registry,
            Param::Callback(_) => ParamKind::Callback,
        }
    }
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Int(v) => write!(f, "Int({v})"),
            Param::Float(v) => write!(f, "Float({v})"),
            Param::Bool(v) => write!(f, "Bool({v})"),
            Param::Vec2(v) => write!(f, "Vec2({}, {})", v.x, v.y),
            Param::Vec3(v) => write!(f, "Vec3({}, {}, {})", v.x, v.y, v.z),
            Param::Vec4(v) => write!(f, "Vec4({}, {}, {}, {})", v.x, v.y, v.z, v.w),
            Param::Rotation(q) => write!(f, "Rotation({q:?})"),
            Param::Curve(c) => write!(f, "{c:?}"),
            Param::Color(c) => write!(f, "{c:?}"),
            Param::Sentence(s) => write!(f, "Sentence({:?})", s.to_string()),
            Param::Rules(r) => write!(f, "Rules({} rules)", r.rules.len()),
            Param::Registry(r) => write!(f, "Registry({} handlers)", r.len()),
            Param::Callback(_) => write!(f, "Callback(..)"),
        }
    }
}

/// Conversion between Rust values and bundle entries.
pub trait ParamValue: Sized {
    fn from_param(param: &Param) -> Option<Self>;
    fn into_param(self) -> Param;
}

macro_rules! param_value {
    ($ty:ty, $variant:ident) => {
        impl ParamValue for $ty {
            fn from_param(param: &Param) -> Option<Self> {
                match param {
                    Param::$variant(value) => Some(value.clone()),
                    _ => None,
                }
            }

            fn into_param(self) -> Param {
                Param::$variant(self)
            }
        }
    };
}

param_value!(i64, Int);
param_value!(f64, Float);
param_value!(bool, Bool);
param_value!(Vector2<f64>, Vec2);
param_value!(Vector3<f64>, Vec3);
param_value!(Vector4<f64>, Vec4);
param_value!(UnitQuaternion<f64>, Rotation);
param_value!(Curve, Curve);
param_value!(Color, Color);
param_value!(Sentence, Sentence);
param_value!(Rc<RuleSet>, Rules);
param_value!(Rc<HandlerRegistry>, Registry);
param_value!(GrowCallback, Callback);

#[derive(Debug, Clone, Default)]
pub struct ParameterBundle {
    params: HashMap<String, Param>,
}

impl ParameterBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn exists(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    /// Typed read. `None` when the key is absent or holds another type.
    pub fn get<T: ParamValue>(&self, key: &str) -> Option<T> {
        self.params.get(key).and_then(T::from_param)
    }

    /// Insert-only write. Fails if the key already exists.
    pub fn put<T: ParamValue>(&mut self, key: &str, value: T) -> bool {
        self.put_param(key, value.into_param())
    }

    /// Overwrite-only write. Fails if the key is absent or holds another type.
    pub fn set<T: ParamValue>(&mut self, key: &str, value: T) -> bool {
        self.set_param(key, value.into_param())
    }

    /// Overwrites the key if it holds the same type, inserts it if absent.
    /// Fails only on a type mismatch with an existing entry.
    pub fn set_or_put<T: ParamValue>(&mut self, key: &str, value: T) -> bool {
        let param = value.into_param();
        if self.exists(key) {
            self.set_param(key, param)
        } else {
            self.put_param(key, param)
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Param> {
        self.params.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    fn put_param(&mut self, key: &str, param: Param) -> bool {
        if self.params.contains_key(key) {
            return false;
        }
        self.params.insert(key.to_string(), param);
        true
    }

    fn set_param(&mut self, key: &str, param: Param) -> bool {
        match self.params.get_mut(key) {
            Some(existing) if existing.kind() == param.kind() => {
                *existing = param;
                true
            }
            _ => false,
        }
    }

    /// Consolidates several bundles. Later bundles overwrite earlier values of
    /// the same type; an entry whose type disagrees with the first writer is
    /// ignored.
    pub fn merge<'a>(bundles: impl IntoIterator<Item = &'a ParameterBundle>) -> ParameterBundle {
        let mut merged = ParameterBundle::new();
        for bundle in bundles {
            for (key, param) in &bundle.params {
                if !merged.set_param(key, param.clone()) {
                    merged.put_param(key, param.clone());
                }
            }
        }
        merged
    }
}
