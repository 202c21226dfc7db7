//! Stepped growth runner exposed to JavaScript.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use sprout_core::node::{Blade, Segment};
use sprout_core::{GrowthSettings, NodeId, NodeState, PlantConfig, Simulation, TickReport};
use wasm_bindgen::prelude::*;

/// Flattened view of one node for the host to render.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub id: usize,
    pub symbol: String,
    pub name: String,
    pub previous: Option<usize>,
    pub parent: Option<usize>,
    pub position: [f64; 3],
    /// Quaternion as `[x, y, z, w]`.
    pub rotation: [f64; 4],
    pub scale: f64,
    pub dead: bool,
    pub hidden: bool,
    pub segment: Option<Segment>,
    pub blade: Option<Blade>,
}

impl NodeSnapshot {
    fn capture(id: NodeId, node: &NodeState) -> Self {
        let t = &node.transform;
        let q = t.rotation.quaternion();
        Self {
            id: id.index(),
            symbol: node.symbol.to_string(),
            name: node.name.clone(),
            previous: node.previous().map(NodeId::index),
            parent: node.parent().map(NodeId::index),
            position: [t.position.x, t.position.y, t.position.z],
            rotation: [q.i, q.j, q.k, q.w],
            scale: t.scale,
            dead: node.dead,
            hidden: node.hidden,
            segment: node.segment,
            blade: node.blade.as_deref().cloned(),
        }
    }
}

/// Accumulated counts over a batch of ticks.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BatchReport {
    pub ticks: usize,
    pub resumed: usize,
    pub dropped: usize,
    pub queued: usize,
    pub idle: bool,
}

impl BatchReport {
    fn add(&mut self, tick: &TickReport) {
        self.ticks += 1;
        self.resumed += tick.resumed;
        self.dropped += tick.dropped;
        self.queued = tick.queued;
    }
}

pub(crate) fn build_simulation(config: &PlantConfig, settings: GrowthSettings) -> Result<Simulation> {
    let mut sim = Simulation::new(settings);
    sim.plant_config(config).context("failed to plant seed")?;
    Ok(sim)
}

/// WASM-exported runner that grows one plant a batch of ticks at a time.
#[wasm_bindgen]
pub struct WasmGarden {
    sim: Simulation,
}

#[wasm_bindgen]
impl WasmGarden {
    /// Plant the seed described by `config_val`. `settings_val` may be
    /// `undefined` to use the default settings.
    #[wasm_bindgen(constructor)]
    pub fn new(config_val: JsValue, settings_val: JsValue) -> Result<WasmGarden, JsValue> {
        console_error_panic_hook::set_once();

        let config: PlantConfig = from_value(config_val)
            .map_err(|e| JsValue::from_str(&format!("Invalid plant config: {}", e)))?;
        let settings: GrowthSettings = if settings_val.is_undefined() || settings_val.is_null() {
            GrowthSettings::default()
        } else {
            from_value(settings_val)
                .map_err(|e| JsValue::from_str(&format!("Invalid growth settings: {}", e)))?
        };

        let sim = build_simulation(&config, settings)
            .map_err(|e| JsValue::from_str(&format!("{:#}", e)))?;
        Ok(WasmGarden { sim })
    }

    pub fn is_idle(&self) -> bool {
        self.sim.is_idle()
    }

    pub fn time(&self) -> f64 {
        self.sim.world.time()
    }

    pub fn node_count(&self) -> usize {
        self.sim.world.nodes.live_count()
    }

    pub fn dispatched(&self) -> usize {
        self.sim.world.dispatched()
    }

    /// Run one tick and return its report.
    pub fn tick(&mut self) -> Result<JsValue, JsValue> {
        let report = self.sim.tick();
        to_value(&report).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// Run up to `batch_size` ticks, stopping early once nothing is queued.
    pub fn run_ticks(&mut self, batch_size: u32) -> Result<JsValue, JsValue> {
        let batch = self.run_batch(batch_size as usize);
        to_value(&batch).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// Visible, non-destroyed nodes.
    pub fn nodes(&self) -> Result<JsValue, JsValue> {
        to_value(&self.snapshot())
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }
}

impl WasmGarden {
    pub(crate) fn run_batch(&mut self, batch_size: usize) -> BatchReport {
        let mut batch = BatchReport::default();
        while batch.ticks < batch_size && !self.sim.is_idle() {
            let report = self.sim.tick();
            batch.add(&report);
        }
        batch.idle = self.sim.is_idle();
        batch
    }

    pub(crate) fn snapshot(&self) -> Vec<NodeSnapshot> {
        self.sim
            .world
            .nodes
            .iter()
            .filter(|(_, node)| !node.destroyed && !node.hidden)
            .map(|(id, node)| NodeSnapshot::capture(id, node))
            .collect()
    }
}

#[cfg(test)]
mod native_tests {
    use super::*;
    use sprout_core::handlers::{BranchShape, LeafShape};
    use sprout_core::HandlerSpec;

    #[test]
    fn batches_run_until_the_plant_is_idle() {
        let config = PlantConfig::new("FQ")
            .with_handler('F', HandlerSpec::Branch(BranchShape::default()))
            .with_handler(
                'Q',
                HandlerSpec::Leaf {
                    prefab_identifier: None,
                    shape: LeafShape::default(),
                },
            );
        let sim = build_simulation(&config, GrowthSettings::default()).expect("valid config");
        let mut garden = WasmGarden { sim };

        let first = garden.run_batch(5);
        assert_eq!(first.ticks, 5);
        assert!(!first.idle);

        let rest = garden.run_batch(1000);
        assert!(rest.idle);
        assert!(rest.ticks < 1000);
        assert_eq!(garden.dispatched(), 2);

        let nodes = garden.snapshot();
        let branch = nodes.iter().find(|n| n.symbol == "F").expect("branch snapshot");
        assert!(branch.segment.is_some());
        let leaf = nodes.iter().find(|n| n.symbol == "Q").expect("leaf snapshot");
        assert_eq!(leaf.blade.as_ref().map(|b| b.progress), Some(1.0));
        assert_eq!(leaf.previous, Some(branch.id));
    }

    #[test]
    fn invalid_config_reports_context() {
        let err = build_simulation(&PlantConfig::new(""), GrowthSettings::default())
            .err()
            .expect("empty axiom rejected");
        let message = format!("{:#}", err);
        assert!(message.contains("failed to plant seed"));
        assert!(message.contains("axiom is empty"));
    }
}
