//! Programmatic construction of [`GraphProto`]s.
//!
//! Every method appends one node and returns the name(s) of the value(s) it defines, so
//! graphs read top to bottom like the program they encode:
//!
//! ```
//! use replica_executor::computation_graph::builder::GraphBuilder;
//!
//! let mut builder = GraphBuilder::new("sum");
//! let dataset = builder.range_to(10);
//! let zero = builder.constant_i64(0);
//! let add = GraphBuilder::function("add", &["state", "x"], |b, params| {
//!     vec![b.add(&params[0], &params[1])]
//! });
//! let total = builder.reduce(&dataset, &zero, &[], add);
//! let graph = builder.output(&total).build();
//! assert_eq!(graph.output, vec![total]);
//! ```
use crate::computation_graph::ops::OpKind;
use crate::proto::{AttributeProto, GraphProto, NodeProto};

#[derive(Clone, Debug, Default)]
pub struct GraphBuilder {
    name: String,
    nodes: Vec<NodeProto>,
    inputs: Vec<String>,
    outputs: Vec<String>,
    device_scope: Option<String>,
}

impl GraphBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Builds a function body with the given parameter names; `f` returns its results.
    pub fn function<F>(name: &str, params: &[&str], f: F) -> GraphProto
    where
        F: FnOnce(&mut GraphBuilder, &[String]) -> Vec<String>,
    {
        let mut builder = GraphBuilder::new(name);
        let params: Vec<String> = params.iter().map(|x| builder.input(x)).collect();
        for result in f(&mut builder, &params) {
            builder.output(&result);
        }
        builder.build()
    }

    pub fn input(&mut self, name: &str) -> String {
        self.inputs.push(name.to_string());
        name.to_string()
    }

    pub fn output(&mut self, value: &str) -> &mut Self {
        self.outputs.push(value.to_string());
        self
    }

    /// Annotates every node added inside `f` with `device`.
    pub fn with_device<R>(&mut self, device: &str, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = self.device_scope.replace(device.to_string());
        let result = f(self);
        self.device_scope = saved;
        result
    }

    pub fn node(
        &mut self,
        op: OpKind,
        inputs: &[&str],
        num_outputs: usize,
        attribute: Vec<AttributeProto>,
    ) -> Vec<String> {
        let name = format!("{}_{}", op, self.nodes.len());
        let output: Vec<String> = match num_outputs {
            1 => vec![name.clone()],
            n => (0..n).map(|i| format!("{name}:{i}")).collect(),
        };
        self.nodes.push(NodeProto {
            name,
            op_type: op.to_string(),
            input: inputs.iter().map(|x| x.to_string()).collect(),
            output: output.clone(),
            device: self.device_scope.clone().unwrap_or_default(),
            attribute,
        });
        output
    }

    fn single(&mut self, op: OpKind, inputs: &[&str], attribute: Vec<AttributeProto>) -> String {
        let mut outputs = self.node(op, inputs, 1, attribute);
        outputs.remove(0)
    }

    pub fn constant_i64(&mut self, value: i64) -> String {
        self.single(OpKind::Const, &[], vec![AttributeProto::int("value", value)])
    }

    pub fn constant_f64(&mut self, value: f64) -> String {
        self.single(OpKind::Const, &[], vec![AttributeProto::float("value", value)])
    }

    pub fn constant_bool(&mut self, value: bool) -> String {
        self.single(OpKind::Const, &[], vec![AttributeProto::bool("value", value)])
    }

    pub fn identity(&mut self, a: &str) -> String {
        self.single(OpKind::Identity, &[a], vec![])
    }

    pub fn add(&mut self, a: &str, b: &str) -> String {
        self.single(OpKind::Add, &[a, b], vec![])
    }

    pub fn sub(&mut self, a: &str, b: &str) -> String {
        self.single(OpKind::Sub, &[a, b], vec![])
    }

    pub fn mul(&mut self, a: &str, b: &str) -> String {
        self.single(OpKind::Mul, &[a, b], vec![])
    }

    pub fn div(&mut self, a: &str, b: &str) -> String {
        self.single(OpKind::Div, &[a, b], vec![])
    }

    pub fn less(&mut self, a: &str, b: &str) -> String {
        self.single(OpKind::Less, &[a, b], vec![])
    }

    pub fn equal(&mut self, a: &str, b: &str) -> String {
        self.single(OpKind::Equal, &[a, b], vec![])
    }

    pub fn make_tuple(&mut self, values: &[&str]) -> String {
        self.single(OpKind::MakeTuple, values, vec![])
    }

    pub fn tuple_get(&mut self, tuple: &str, index: i64) -> String {
        self.single(OpKind::TupleGet, &[tuple], vec![AttributeProto::int("index", index)])
    }

    pub fn range(&mut self, start: &str, stop: &str, step: &str) -> String {
        self.single(OpKind::RangeDataset, &[start, stop, step], vec![])
    }

    /// `range(stop)`: the integers `0..stop`.
    pub fn range_to(&mut self, stop: i64) -> String {
        let start = self.constant_i64(0);
        let stop = self.constant_i64(stop);
        let step = self.constant_i64(1);
        self.range(&start, &stop, &step)
    }

    pub fn from_values(&mut self, values: &[&str]) -> String {
        self.single(OpKind::DatasetFromValues, values, vec![])
    }

    pub fn map(&mut self, dataset: &str, captures: &[&str], f: GraphProto) -> String {
        let inputs = [vec![dataset], captures.to_vec()].concat();
        self.single(OpKind::MapDataset, &inputs, vec![AttributeProto::graph("f", f)])
    }

    pub fn filter(&mut self, dataset: &str, captures: &[&str], predicate: GraphProto) -> String {
        let inputs = [vec![dataset], captures.to_vec()].concat();
        self.single(
            OpKind::FilterDataset,
            &inputs,
            vec![AttributeProto::graph("predicate", predicate)],
        )
    }

    pub fn reduce(
        &mut self,
        dataset: &str,
        initial_state: &str,
        captures: &[&str],
        f: GraphProto,
    ) -> String {
        let inputs = [vec![dataset, initial_state], captures.to_vec()].concat();
        self.single(OpKind::ReduceDataset, &inputs, vec![AttributeProto::graph("f", f)])
    }

    pub fn cardinality(&mut self, dataset: &str) -> String {
        self.single(OpKind::DatasetCardinality, &[dataset], vec![])
    }

    pub fn element_at(&mut self, dataset: &str, index: &str) -> String {
        self.single(OpKind::DatasetElementAt, &[dataset, index], vec![])
    }

    pub fn if_else(
        &mut self,
        condition: &str,
        args: &[&str],
        then_branch: GraphProto,
        else_branch: GraphProto,
    ) -> Vec<String> {
        let num_outputs = then_branch.output.len();
        let inputs = [vec![condition], args.to_vec()].concat();
        self.node(
            OpKind::If,
            &inputs,
            num_outputs,
            vec![
                AttributeProto::graph("then_branch", then_branch),
                AttributeProto::graph("else_branch", else_branch),
            ],
        )
    }

    pub fn while_loop(
        &mut self,
        loop_vars: &[&str],
        cond: GraphProto,
        body: GraphProto,
        maximum_iterations: Option<i64>,
    ) -> Vec<String> {
        let mut attribute = vec![
            AttributeProto::graph("cond", cond),
            AttributeProto::graph("body", body),
        ];
        if let Some(limit) = maximum_iterations {
            attribute.push(AttributeProto::int("maximum_iterations", limit));
        }
        self.node(OpKind::While, loop_vars, loop_vars.len(), attribute)
    }

    pub fn call(&mut self, args: &[&str], f: GraphProto) -> Vec<String> {
        let num_outputs = f.output.len();
        self.node(OpKind::Call, args, num_outputs, vec![AttributeProto::graph("f", f)])
    }

    pub fn build(&self) -> GraphProto {
        GraphProto {
            name: self.name.clone(),
            node: self.nodes.clone(),
            input: self.inputs.clone(),
            output: self.outputs.clone(),
        }
    }
}
