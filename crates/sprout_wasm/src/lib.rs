mod garden;

pub use garden::{BatchReport, NodeSnapshot, WasmGarden};
