// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node types shared by the unit tests.

use crate::error::{NodeError, Result};
use crate::factory::{FactorySet, NodeFactory};
use crate::node::{Node, NodeConstructor, NodeCore};
use crate::port::Port;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Publishes 0, 1, 2, ... on `count`
pub(crate) struct Counter {
    core: NodeCore,
    next: i32,
}

impl NodeConstructor for Counter {
    fn construct(instance_name: &str) -> Result<Self> {
        let mut core = NodeCore::new(instance_name, "Counter");
        core.add_output(Port::output_of::<i32>("count"))?;
        Ok(Self { core, next: 0 })
    }
}

impl Node for Counter {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn init(&mut self) -> Result<(), NodeError> {
        self.next = 0;
        Ok(())
    }

    fn execute(&mut self) -> Result<(), NodeError> {
        self.core.set_output("count", self.next)?;
        self.next += 1;
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct ScaleConfig {
    factor: f32,
}

/// Multiplies `in` by a persisted factor
pub(crate) struct Scale {
    core: NodeCore,
    factor: f32,
}

impl Scale {
    pub(crate) fn new(instance_name: &str, factor: f32) -> Result<Self> {
        let mut node = Self::construct(instance_name)?;
        node.factor = factor;
        Ok(node)
    }
}

impl NodeConstructor for Scale {
    fn construct(instance_name: &str) -> Result<Self> {
        let mut core = NodeCore::new(instance_name, "Scale");
        core.add_input(Port::input_of::<f32>("in").required())?;
        core.add_output(Port::output_of::<f32>("out"))?;
        Ok(Self { core, factor: 1.0 })
    }
}

impl Node for Scale {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn execute(&mut self) -> Result<(), NodeError> {
        let value = *self.core.input::<f32>("in")?;
        self.core.set_output("out", value * self.factor)?;
        Ok(())
    }

    fn to_persisted(&self) -> Result<Option<serde_json::Value>, NodeError> {
        let config = ScaleConfig {
            factor: self.factor,
        };
        Ok(Some(serde_json::to_value(config)?))
    }

    fn from_persisted(&mut self, config: &serde_json::Value) -> Result<(), NodeError> {
        let config: ScaleConfig = serde_json::from_value(config.clone())?;
        self.factor = config.factor;
        Ok(())
    }
}

pub(crate) type Events = Arc<Mutex<Vec<String>>>;

pub(crate) fn events() -> Events {
    Arc::new(Mutex::new(Vec::new()))
}

/// Drain the recorded events
pub(crate) fn take(events: &Events) -> Vec<String> {
    std::mem::take(&mut *events.lock().unwrap())
}

/// Pass-through node recording its lifecycle, with switchable failures
pub(crate) struct Probe {
    core: NodeCore,
    events: Events,
    pub(crate) fail_init: bool,
    pub(crate) fail_execute: bool,
    /// Never publish an output
    pub(crate) silent: bool,
}

impl Probe {
    pub(crate) fn new(instance_name: &str, events: Events) -> Result<Self> {
        let mut core = NodeCore::new(instance_name, "Probe");
        core.add_input(Port::input_of::<f32>("in").with_default(0.0f32))?;
        core.add_output(Port::output_of::<f32>("out"))?;
        Ok(Self {
            core,
            events,
            fail_init: false,
            fail_execute: false,
            silent: false,
        })
    }

    fn record(&self, event: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("{event}:{}", self.core.instance_name()));
    }
}

impl Node for Probe {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn init(&mut self) -> Result<(), NodeError> {
        if self.fail_init {
            return Err(NodeError::failed("probe refused to initialize"));
        }
        self.record("init");
        Ok(())
    }

    fn execute(&mut self) -> Result<(), NodeError> {
        if self.fail_execute {
            return Err(NodeError::failed("probe failure"));
        }
        if !self.silent {
            let value = self.core.input_value("in")?.clone();
            self.core.set_output_value("out", value)?;
        }
        Ok(())
    }

    fn destroy(&mut self) {
        self.record("destroy");
    }
}

/// Factory holding the persistable test nodes
pub(crate) fn factory() -> Arc<NodeFactory> {
    let mut factory = NodeFactory::new("nodeflow.testing");
    factory
        .register_node_creator::<Counter>("Counter", "Sources")
        .unwrap();
    factory.register_node_creator::<Scale>("Scale", "Math").unwrap();
    Arc::new(factory)
}

/// Built-in factory followed by the test factory
pub(crate) fn factories() -> FactorySet {
    let mut factories = FactorySet::with_builtins().unwrap();
    factories.add_factory(factory()).unwrap();
    factories
}
