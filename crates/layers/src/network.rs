//! # DAG Networks
//!
//! A composite layer wiring child layers into a directed acyclic graph.
//!
//! ## Key Concepts
//!
//! - **Input nodes**: boundary slots bound to the network's own inputs
//! - **Layer nodes**: a child layer whose inputs are earlier nodes, one edge per port
//! - **Topological order**: nodes are evaluated so dependencies come first
//!
//! ## Backward
//!
//! Children never see each other's evaluations directly. Each live node is
//! handed to its consumers as a proxy whose accumulator only adds into a
//! per-node gradient buffer. The network's own accumulator then walks the
//! nodes in reverse topological order and runs every node's real
//! accumulator once with its summed gradient, so a node consumed by many
//! children costs one backward call, not one per path.
//!
//! ## Example
//!
//! ```rust
//! use converge_core::{Evaluation, Layer, Tensor, TensorList};
//! use converge_layers::{Bias, DagNetwork, Dense, Sigmoid};
//!
//! // y = sigmoid(W·x + b)
//! let mut net = DagNetwork::new("mlp", 1);
//! let x = net.input(0).unwrap();
//! let h = net.add(Dense::random(3, 2, 0.5, 1), &[x]).unwrap();
//! let h = net.add(Bias::new(vec![2]), &[h]).unwrap();
//! let y = net.add(Sigmoid::new(), &[h]).unwrap();
//! net.set_output(y).unwrap();
//!
//! let input = Evaluation::constant(TensorList::single(Tensor::vector(vec![1.0, 0.0, -1.0])));
//! let out = net.eval(&[input]).unwrap();
//! assert_eq!(out.data().dims(), &[2]);
//! ```

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use converge_core::{expect_inputs, CoreError, Evaluation, Layer, LayerHeader, Param, TensorList};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use tracing::debug;

/// Gradients received by each node during one backward pass.
type GradientBuffer = Rc<RefCell<HashMap<NodeIndex, TensorList>>>;

/// Stand-in for `value` handed to consuming children. Its accumulator only
/// sums into the buffer; the real accumulator runs later, once.
fn proxy(node: NodeIndex, value: &Evaluation, pending: &GradientBuffer) -> Evaluation {
    if !value.is_alive() {
        return value.clone();
    }
    let pending = Rc::clone(pending);
    Evaluation::new(value.data().clone(), move |_, gradient| {
        let mut pending = pending.borrow_mut();
        let summed = match pending.remove(&node) {
            Some(existing) => existing.add(gradient)?,
            None => gradient.clone(),
        };
        pending.insert(node, summed);
        Ok(())
    })
}

/// A node in the network graph.
#[derive(Debug, Clone)]
pub enum NetworkNode {
    /// Bound to the network's input at this index
    Input(usize),
    /// A child layer
    Layer(Box<dyn Layer>),
}

/// A composite layer over a petgraph `DiGraph`. Edge weights are the
/// consuming layer's input port.
#[derive(Debug, Clone)]
pub struct DagNetwork {
    header: LayerHeader,
    graph: DiGraph<NetworkNode, usize>,
    inputs: Vec<NodeIndex>,
    output: Option<NodeIndex>,
}

impl DagNetwork {
    /// A network with `num_inputs` boundary inputs and no layers.
    pub fn new(name: impl Into<String>, num_inputs: usize) -> Self {
        let mut graph = DiGraph::new();
        let inputs = (0..num_inputs)
            .map(|i| graph.add_node(NetworkNode::Input(i)))
            .collect();
        Self {
            header: LayerHeader::new(name),
            graph,
            inputs,
            output: None,
        }
    }

    /// Node bound to boundary input `index`.
    pub fn input(&self, index: usize) -> Result<NodeIndex, CoreError> {
        self.inputs
            .get(index)
            .copied()
            .ok_or_else(|| CoreError::ValidationError {
                reason: format!("network '{}' has no input {index}", self.name()),
            })
    }

    /// Add `layer`, wiring `sources[port]` into each of its input ports.
    ///
    /// Sources must already exist, so the graph stays acyclic.
    pub fn add(
        &mut self,
        layer: impl Layer + 'static,
        sources: &[NodeIndex],
    ) -> Result<NodeIndex, CoreError> {
        self.add_boxed(Box::new(layer), sources)
    }

    pub fn add_boxed(
        &mut self,
        layer: Box<dyn Layer>,
        sources: &[NodeIndex],
    ) -> Result<NodeIndex, CoreError> {
        for &source in sources {
            if self.graph.node_weight(source).is_none() {
                return Err(CoreError::ValidationError {
                    reason: format!("unknown source node {}", source.index()),
                });
            }
        }
        let node = self.graph.add_node(NetworkNode::Layer(layer));
        for (port, &source) in sources.iter().enumerate() {
            self.graph.add_edge(source, node, port);
        }
        Ok(node)
    }

    /// Choose which node's evaluation the network returns.
    pub fn set_output(&mut self, node: NodeIndex) -> Result<(), CoreError> {
        if self.graph.node_weight(node).is_none() {
            return Err(CoreError::ValidationError {
                reason: format!("unknown output node {}", node.index()),
            });
        }
        self.output = Some(node);
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Child layers in insertion order.
    pub fn layers(&self) -> impl Iterator<Item = &dyn Layer> {
        self.graph.node_weights().filter_map(|n| match n {
            NetworkNode::Layer(layer) => Some(layer.as_ref()),
            NetworkNode::Input(_) => None,
        })
    }

    fn layers_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Layer>> {
        self.graph.node_weights_mut().filter_map(|n| match n {
            NetworkNode::Layer(layer) => Some(layer),
            NetworkNode::Input(_) => None,
        })
    }

    /// Kahn's algorithm over the node graph.
    pub fn topological_order(&self) -> Vec<NodeIndex> {
        let mut in_degree: HashMap<NodeIndex, usize> = HashMap::new();
        let mut queue: VecDeque<NodeIndex> = VecDeque::new();
        let mut result = Vec::with_capacity(self.graph.node_count());

        for node in self.graph.node_indices() {
            let degree = self
                .graph
                .neighbors_directed(node, Direction::Incoming)
                .count();
            in_degree.insert(node, degree);
            if degree == 0 {
                queue.push_back(node);
            }
        }

        while let Some(node) = queue.pop_front() {
            result.push(node);
            for successor in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if let Some(deg) = in_degree.get_mut(&successor) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(successor);
                    }
                }
            }
        }

        result
    }

    fn gather(
        &self,
        node: NodeIndex,
        values: &HashMap<NodeIndex, Evaluation>,
    ) -> Result<Vec<Evaluation>, CoreError> {
        let mut ports: Vec<Option<Evaluation>> =
            vec![None; self.graph.edges_directed(node, Direction::Incoming).count()];
        for edge in self.graph.edges_directed(node, Direction::Incoming) {
            let value = values.get(&edge.source()).cloned();
            if let Some(slot) = ports.get_mut(*edge.weight()) {
                *slot = value;
            }
        }
        ports
            .into_iter()
            .enumerate()
            .map(|(port, v)| {
                v.ok_or_else(|| CoreError::ValidationError {
                    reason: format!("node {} is missing input port {port}", node.index()),
                })
            })
            .collect()
    }
}

impl Layer for DagNetwork {
    fn header(&self) -> &LayerHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut LayerHeader {
        &mut self.header
    }

    /// Union of the children's parameters, in node order.
    fn state(&self) -> Vec<&Param> {
        self.graph
            .node_weights()
            .flat_map(|n| match n {
                NetworkNode::Layer(layer) => layer.state(),
                NetworkNode::Input(_) => Vec::new(),
            })
            .collect()
    }

    fn state_mut(&mut self) -> Vec<&mut Param> {
        self.graph
            .node_weights_mut()
            .flat_map(|n| match n {
                NetworkNode::Layer(layer) => layer.state_mut(),
                NetworkNode::Input(_) => Vec::new(),
            })
            .collect()
    }

    fn eval(&self, inputs: &[Evaluation]) -> Result<Evaluation, CoreError> {
        self.assert_alive()?;
        expect_inputs(inputs, self.inputs.len())?;
        let output = self.output.ok_or_else(|| CoreError::ValidationError {
            reason: format!("network '{}' has no output node", self.name()),
        })?;

        let order = self.topological_order();
        debug!(network = %self.name(), nodes = order.len(), "Evaluating network");

        let pending: GradientBuffer = Rc::new(RefCell::new(HashMap::new()));
        let mut proxies: HashMap<NodeIndex, Evaluation> = HashMap::new();
        let mut backward: Vec<(NodeIndex, Evaluation)> = Vec::new();
        for node in order {
            let value = match &self.graph[node] {
                NetworkNode::Input(index) => inputs[*index].clone(),
                NetworkNode::Layer(layer) => layer.eval(&self.gather(node, &proxies)?)?,
            };
            proxies.insert(node, proxy(node, &value, &pending));
            if value.is_alive() {
                backward.push((node, value));
            }
        }

        let data = proxies
            .get(&output)
            .map(|value| value.data().clone())
            .ok_or_else(|| CoreError::ValidationError {
                reason: format!("output node {} was never evaluated", output.index()),
            })?;
        if !backward.iter().any(|(node, _)| *node == output) {
            return Ok(Evaluation::constant(data));
        }

        backward.reverse();
        Ok(Evaluation::new(data, move |deltas, gradient| {
            pending.borrow_mut().clear();
            pending.borrow_mut().insert(output, gradient.clone());
            for (node, value) in &backward {
                let received = pending.borrow_mut().remove(node);
                if let Some(received) = received {
                    value.accumulate(deltas, &received)?;
                }
            }
            Ok(())
        }))
    }

    fn boxed_clone(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }

    fn set_frozen(&mut self, frozen: bool) {
        self.header.frozen = frozen;
        for layer in self.layers_mut() {
            layer.set_frozen(frozen);
        }
    }

    fn dispose(&mut self) {
        self.header.disposed = true;
        for layer in self.layers_mut() {
            layer.dispose();
        }
    }

    fn reseed(&mut self, seed: u64) -> bool {
        let mut changed = false;
        for (i, layer) in self.layers_mut().enumerate() {
            changed |= layer.reseed(seed.wrapping_add(i as u64));
        }
        changed
    }

    fn clear_noise(&mut self) {
        for layer in self.layers_mut() {
            layer.clear_noise();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bias, Dense, MeanSqLoss, NoiseLayer, Square};
    use converge_core::{DeltaSet, SlotId, Tensor, TensorList};

    fn regression_net() -> DagNetwork {
        let mut net = DagNetwork::new("regression", 2);
        let x = net.input(0).unwrap();
        let t = net.input(1).unwrap();
        let y = net.add(Dense::random(2, 1, 0.5, 3), &[x]).unwrap();
        let y = net.add(Bias::new(vec![1]), &[y]).unwrap();
        let loss = net.add(MeanSqLoss::new(), &[y, t]).unwrap();
        net.set_output(loss).unwrap();
        net
    }

    #[test]
    fn test_state_is_union_of_children() {
        let net = regression_net();
        assert_eq!(net.state().len(), 2);
        assert_eq!(net.num_parameters(), 3);
        assert_eq!(net.layers().count(), 3);
    }

    #[test]
    fn test_freeze_propagates() {
        let mut net = regression_net();
        net.freeze();
        assert!(net.layers().all(|l| l.is_frozen()));

        let x = Evaluation::constant(TensorList::single(Tensor::vector(vec![1.0, 2.0])));
        let t = Evaluation::constant(TensorList::single(Tensor::vector(vec![0.0])));
        let out = net.eval(&[x, t]).unwrap();
        let mut deltas = DeltaSet::new();
        out.accumulate(&mut deltas, &out.data().ones_like()).unwrap();
        assert!(deltas.is_empty());
    }

    #[test]
    fn test_fan_out_sums_gradients() {
        // y = x² + x², dy/dx = 4x
        let mut net = DagNetwork::new("fan_out", 1);
        let x = net.input(0).unwrap();
        let a = net.add(Square::new(), &[x]).unwrap();
        let b = net.add(Square::new(), &[x]).unwrap();
        let sum = net.add(Pair::new(), &[a, b]).unwrap();
        net.set_output(sum).unwrap();

        let slot = SlotId::fresh();
        let input = Evaluation::slot(TensorList::single(Tensor::vector(vec![3.0])), slot);
        let out = net.eval(&[input]).unwrap();
        assert_eq!(out.data()[0].get(0), 18.0);

        let mut deltas = DeltaSet::new();
        out.accumulate(&mut deltas, &out.data().ones_like()).unwrap();
        assert_eq!(deltas.get(slot).unwrap().values(), &[12.0]);
    }

    #[test]
    fn test_shared_node_backward_runs_once() {
        // 16 levels of y = x + x; the input's accumulator must run once.
        let mut net = DagNetwork::new("ladder", 1);
        let mut node = net.input(0).unwrap();
        for _ in 0..16 {
            node = net.add(Pair::new(), &[node, node]).unwrap();
        }
        net.set_output(node).unwrap();

        let calls = Rc::new(std::cell::Cell::new(0));
        let counter = Rc::clone(&calls);
        let slot = SlotId::fresh();
        let input = Evaluation::new(
            TensorList::single(Tensor::vector(vec![1.0])),
            move |deltas, grad| {
                counter.set(counter.get() + 1);
                deltas.accumulate(slot, grad[0].data())
            },
        );
        let out = net.eval(&[input]).unwrap();
        assert_eq!(out.data()[0].get(0), 65536.0);

        let mut deltas = DeltaSet::new();
        out.accumulate(&mut deltas, &out.data().ones_like()).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(deltas.get(slot).unwrap().values(), &[65536.0]);

        // A second backward pass starts from an empty buffer.
        out.accumulate(&mut deltas, &out.data().ones_like()).unwrap();
        assert_eq!(calls.get(), 2);
        assert_eq!(deltas.get(slot).unwrap().values(), &[131072.0]);
    }

    #[test]
    fn test_constant_inputs_give_constant_output() {
        let mut net = DagNetwork::new("square", 1);
        let x = net.input(0).unwrap();
        let y = net.add(Square::new(), &[x]).unwrap();
        net.set_output(y).unwrap();
        let out = net
            .eval(&[Evaluation::constant(TensorList::single(Tensor::vector(vec![2.0])))])
            .unwrap();
        assert_eq!(out.data()[0].get(0), 4.0);
    }

    #[test]
    fn test_missing_output() {
        let net = DagNetwork::new("empty", 1);
        let x = Evaluation::constant(TensorList::single(Tensor::vector(vec![1.0])));
        assert!(net.eval(&[x]).is_err());
    }

    #[test]
    fn test_reseed_reaches_children() {
        let mut net = DagNetwork::new("noisy", 1);
        let x = net.input(0).unwrap();
        let n = net.add(NoiseLayer::new(4, 0.5), &[x]).unwrap();
        net.set_output(n).unwrap();
        assert!(net.reseed(1));
        assert!(!regression_net().reseed(1));
    }

    /// Sums its two inputs.
    #[derive(Debug, Clone)]
    struct Pair {
        header: LayerHeader,
    }

    impl Pair {
        fn new() -> Self {
            Self {
                header: LayerHeader::new("pair"),
            }
        }
    }

    impl Layer for Pair {
        fn header(&self) -> &LayerHeader {
            &self.header
        }

        fn header_mut(&mut self) -> &mut LayerHeader {
            &mut self.header
        }

        fn state(&self) -> Vec<&Param> {
            Vec::new()
        }

        fn state_mut(&mut self) -> Vec<&mut Param> {
            Vec::new()
        }

        fn eval(&self, inputs: &[Evaluation]) -> Result<Evaluation, CoreError> {
            let (a, b) = (inputs[0].clone(), inputs[1].clone());
            let out = a.data().add(b.data())?;
            Ok(Evaluation::new(out, move |deltas, grad| {
                a.accumulate(deltas, grad)?;
                b.accumulate(deltas, grad)
            }))
        }

        fn boxed_clone(&self) -> Box<dyn Layer> {
            Box::new(self.clone())
        }
    }
}
