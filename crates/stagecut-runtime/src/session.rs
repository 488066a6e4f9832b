//! Session abstraction and the reference CPU interpreter.
//!
//! A session runs one (sub-)graph per call. Wait/record nodes are executed
//! against a shared [`EventRegistry`]:
//!
//! 1. Read the event id from the node's first input.
//! 2. Wait: block until the id is recorded, then forward the remaining
//!    inputs to the outputs unchanged.
//! 3. Record: forward the remaining inputs to the outputs, mirror them into
//!    any fetch buffers, then signal the id.
//!
//! Feeds are resolved the first time a node consumes them, so a buffer fed
//! behind a wait is read only after that wait has returned.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use stagecut_types::config::SyncConfig;
use stagecut_types::event::{EventNamespace, NAMESPACE_ATTR};
use stagecut_types::graph::{Graph, Node};
use stagecut_types::tensor::Tensor;

use crate::buffer::{Binding, Fetch, SharedBuffer};
use crate::error::{Result, RuntimeError};
use crate::events::EventRegistry;
use crate::kernels;

/// Executes a graph for one set of feeds. Calls may run concurrently.
pub trait Session: Send + Sync {
    /// Run to completion and return the fetched tensors in `fetches` order.
    fn run(&self, feeds: &HashMap<String, Binding>, fetches: &[Fetch]) -> Result<Vec<Tensor>>;
}

// ── Reference session ────────────────────────────────────────────────────────

pub struct ReferenceSession {
    graph: Graph,
    registry: Arc<EventRegistry>,
    sync: SyncConfig,
    wait_timeout: Option<Duration>,
}

impl ReferenceSession {
    pub fn new(
        graph: Graph,
        registry: Arc<EventRegistry>,
        sync: SyncConfig,
        wait_timeout: Option<Duration>,
    ) -> Self {
        Self {
            graph,
            registry,
            sync,
            wait_timeout,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    fn run_sync(&self, node: &Node, frame: &mut Frame<'_>) -> Result<()> {
        let malformed = |reason: &str| RuntimeError::Kernel {
            node: node.name.clone(),
            reason: reason.to_string(),
        };

        let slot = node.inputs.first().ok_or_else(|| malformed("missing event-id input"))?;
        let id = frame
            .resolve(slot)?
            .as_scalar_i64()
            .ok_or_else(|| malformed("event id is not an i64 scalar"))?;
        let namespace = node
            .attribute_str(NAMESPACE_ATTR)
            .and_then(EventNamespace::parse)
            .ok_or_else(|| malformed("missing or unknown event namespace"))?;
        let data = &node.inputs[1..];
        if node.outputs.len() > data.len() {
            return Err(malformed("more outputs than forwarded inputs"));
        }

        let is_wait = node.op_type == self.sync.wait_op;
        if is_wait {
            trace!(node = %node.name, %namespace, id, "waiting");
            self.registry.wait(namespace, id, self.wait_timeout)?;
        }

        let mut forwarded = Vec::with_capacity(data.len());
        for name in data {
            forwarded.push(frame.resolve(name)?);
        }
        for (output, tensor) in node.outputs.iter().zip(forwarded) {
            frame.publish(output, tensor);
        }

        if !is_wait {
            trace!(node = %node.name, %namespace, id, "recording");
            self.registry.record(namespace, id);
        }
        Ok(())
    }

    fn run_kernel(&self, node: &Node, frame: &mut Frame<'_>) -> Result<()> {
        let inputs = node
            .inputs
            .iter()
            .filter(|i| !i.is_empty())
            .map(|i| frame.resolve(i))
            .collect::<Result<Vec<_>>>()?;
        let outputs = kernels::eval(node, &inputs)?;
        for (name, tensor) in node.outputs.iter().zip(outputs) {
            frame.publish(name, tensor);
        }
        Ok(())
    }
}

impl Session for ReferenceSession {
    fn run(&self, feeds: &HashMap<String, Binding>, fetches: &[Fetch]) -> Result<Vec<Tensor>> {
        debug!(graph = %self.graph.name, nodes = self.graph.nodes.len(), "session run");

        let mut frame = Frame {
            graph: &self.graph,
            feeds,
            env: HashMap::new(),
            mirrors: fetches
                .iter()
                .filter_map(|f| f.buffer.as_ref().map(|b| (f.name.as_str(), b)))
                .collect(),
        };

        for node in &self.graph.nodes {
            if self.sync.is_sync_op(&node.domain, &node.op_type) {
                self.run_sync(node, &mut frame)?;
            } else if node.domain.is_empty() && kernels::supports(&node.op_type) {
                self.run_kernel(node, &mut frame)?;
            } else {
                return Err(RuntimeError::UnsupportedOp {
                    domain: node.domain.clone(),
                    op_type: node.op_type.clone(),
                });
            }
        }

        fetches
            .iter()
            .map(|f| {
                frame
                    .env
                    .get(&f.name)
                    .cloned()
                    .ok_or_else(|| RuntimeError::MissingOutput(f.name.clone()))
            })
            .collect()
    }
}

// ── Frame ────────────────────────────────────────────────────────────────────

/// Per-call value environment.
struct Frame<'a> {
    graph: &'a Graph,
    feeds: &'a HashMap<String, Binding>,
    env: HashMap<String, Tensor>,
    mirrors: HashMap<&'a str, &'a SharedBuffer>,
}

impl Frame<'_> {
    /// Produced values first, then feeds, then constants.
    fn resolve(&mut self, name: &str) -> Result<Tensor> {
        if let Some(t) = self.env.get(name) {
            return Ok(t.clone());
        }
        let tensor = match self.feeds.get(name) {
            Some(Binding::Value(t)) => t.clone(),
            Some(Binding::Buffer(b)) => b
                .read()
                .ok_or_else(|| RuntimeError::EmptyBuffer(name.to_string()))?,
            None => self
                .graph
                .initializer(name)
                .map(|i| i.tensor.clone())
                .ok_or_else(|| RuntimeError::Unresolved(name.to_string()))?,
        };
        self.env.insert(name.to_string(), tensor.clone());
        Ok(tensor)
    }

    fn publish(&mut self, name: &str, tensor: Tensor) {
        if let Some(buffer) = self.mirrors.get(name) {
            buffer.write(tensor.clone());
        }
        self.env.insert(name.to_string(), tensor);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use stagecut_split::testing::{toy_graph, toy_inputs};
    use stagecut_types::graph::AttributeValue;

    fn values(inputs: Vec<(String, Tensor)>) -> HashMap<String, Binding> {
        inputs
            .into_iter()
            .map(|(k, v)| (k, Binding::Value(v)))
            .collect()
    }

    fn session(graph: Graph, registry: Arc<EventRegistry>) -> ReferenceSession {
        ReferenceSession::new(graph, registry, SyncConfig::default(), Some(Duration::from_secs(2)))
    }

    fn sync_node(op: &str, namespace: &str, inputs: &[&str], outputs: &[&str]) -> Node {
        let mut node = Node::new(op, inputs.iter().copied(), outputs.iter().copied());
        node.name = inputs[0].to_string();
        node.domain = "com.microsoft".into();
        node.attributes
            .insert(NAMESPACE_ATTR.into(), AttributeValue::String(namespace.into()));
        node
    }

    #[test]
    fn unsplit_graph_computes_gradients() {
        let s = session(toy_graph(), Arc::new(EventRegistry::new()));
        let out = s
            .run(&values(toy_inputs(0)), &[Fetch::value("T6_grad"), Fetch::value("W1_grad")])
            .unwrap();
        // X = [1,2,3,4], W1 = [0.5,-0.25,1,2] → T3 = [0.5,-0.5,3,8]
        // T6 = T3*W2 + B2 = [0.85,-0.05,-2.7,2.4]; diff = T6 - labels
        let t6_grad = out[0].as_f32().unwrap();
        let expected = [0.7f32, 1.9, -9.4, 4.8];
        for (got, want) in t6_grad.iter().zip(expected) {
            assert!((got - want).abs() < 1e-5, "{got} vs {want}");
        }
        assert_eq!(out[1].dims, vec![4]);
    }

    #[test]
    fn wait_blocks_until_record_from_another_session() {
        let registry = Arc::new(EventRegistry::new());
        let producer = session(
            Graph {
                nodes: vec![sync_node("RecordEvent", "data", &["rec", "Y"], &["Y_sync"])],
                ..Default::default()
            },
            registry.clone(),
        );
        let consumer = session(
            Graph {
                nodes: vec![
                    sync_node("WaitEvent", "data", &["wait", "Y_sync"], &["Y"]),
                    Node::new("Neg", ["Y"], ["Z"]),
                ],
                ..Default::default()
            },
            registry,
        );

        let buffer = SharedBuffer::new();
        let consumer_feeds = HashMap::from([
            ("wait".to_string(), Binding::Value(Tensor::scalar_i64(9))),
            ("Y_sync".to_string(), Binding::Buffer(buffer.clone())),
        ]);
        let handle = std::thread::spawn(move || consumer.run(&consumer_feeds, &[Fetch::value("Z")]));

        std::thread::sleep(Duration::from_millis(20));
        let y = Tensor::from_f32(vec![2], vec![1.0, -2.0]).unwrap();
        let producer_feeds = HashMap::from([
            ("rec".to_string(), Binding::Value(Tensor::scalar_i64(9))),
            ("Y".to_string(), Binding::Value(y)),
        ]);
        producer
            .run(&producer_feeds, &[Fetch::into_buffer("Y_sync", buffer)])
            .unwrap();

        let z = handle.join().unwrap().unwrap();
        assert_eq!(z[0].as_f32(), Some(&[-1.0, 2.0][..]));
    }

    #[test]
    fn negative_wait_id_passes_through() {
        let s = session(
            Graph {
                nodes: vec![sync_node("WaitEvent", "pipeline", &["w", "X_sync"], &["X"])],
                ..Default::default()
            },
            Arc::new(EventRegistry::new()),
        );
        let feeds = HashMap::from([
            ("w".to_string(), Binding::Value(Tensor::scalar_i64(-1))),
            ("X_sync".to_string(), Binding::Value(Tensor::scalar_i64(3))),
        ]);
        let out = s.run(&feeds, &[Fetch::value("X")]).unwrap();
        assert_eq!(out[0].as_scalar_i64(), Some(3));
    }

    #[test]
    fn empty_buffer_read_is_an_error() {
        let s = session(
            Graph {
                nodes: vec![Node::new("Identity", ["A"], ["B"])],
                ..Default::default()
            },
            Arc::new(EventRegistry::new()),
        );
        let feeds = HashMap::from([("A".to_string(), Binding::Buffer(SharedBuffer::new()))]);
        assert!(matches!(
            s.run(&feeds, &[Fetch::value("B")]),
            Err(RuntimeError::EmptyBuffer(ref n)) if n == "A"
        ));
    }

    #[test]
    fn unknown_fetch_is_reported() {
        let s = session(toy_graph(), Arc::new(EventRegistry::new()));
        assert!(matches!(
            s.run(&values(toy_inputs(0)), &[Fetch::value("nope")]),
            Err(RuntimeError::MissingOutput(_))
        ));
    }
}
