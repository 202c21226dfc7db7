pub mod axis_rotate;
pub mod branch;
pub mod leaf;
pub mod pause;
pub mod rotate;
pub mod seed;
pub mod split;
pub mod translate;

pub use axis_rotate::AxisAngleRotate;
pub use branch::{Branch, BranchShape};
pub use leaf::{Leaf, LeafShape};
pub use pause::Pause;
pub use rotate::Rotate;
pub use seed::{BakeSettings, GenMode, Seed};
pub use split::{cut_branch, Split, SplitError};
pub use translate::Translate;
