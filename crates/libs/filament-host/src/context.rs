use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use filament_proto::{NodeContext, SenderClass};

use crate::config::HostConfig;

/// Process-wide context constructed once at startup and passed by reference
/// to everything that needs local identity, trust classification, or the
/// startup state. Replaces reach-from-anywhere host singletons.
#[derive(Debug)]
pub struct HostContext {
    node_id: String,
    isolated: bool,
    started: AtomicBool,
    classes: HashMap<String, SenderClass>,
}

impl HostContext {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            isolated: false,
            started: AtomicBool::new(false),
            classes: HashMap::new(),
        }
    }

    pub fn from_config(config: &HostConfig) -> Self {
        let classes = config
            .trust
            .iter()
            .map(|entry| (entry.id.clone(), sender_class_from_name(&entry.class)))
            .collect();
        Self {
            node_id: config.node.id.clone(),
            isolated: config.node.isolated,
            started: AtomicBool::new(false),
            classes,
        }
    }

    /// Flip once bootstrap is done; envelopes constructed before this carry
    /// the not-running sentinel origin.
    pub fn mark_started(&self) {
        self.started.store(true, Ordering::Release);
    }
}

impl NodeContext for HostContext {
    fn local_node_id(&self) -> &str {
        &self.node_id
    }

    fn started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    fn isolated(&self) -> bool {
        self.isolated
    }

    fn classify(&self, node_id: &str) -> SenderClass {
        self.classes.get(node_id).copied().unwrap_or_default()
    }
}

fn sender_class_from_name(name: &str) -> SenderClass {
    match name.to_ascii_lowercase().as_str() {
        "browser" => SenderClass::Browser,
        "service" => SenderClass::Service,
        "node" => SenderClass::Node,
        "device" => SenderClass::Device,
        other => {
            log::warn!("context: unknown sender class '{other}', treating as unknown");
            SenderClass::Unknown
        }
    }
}
