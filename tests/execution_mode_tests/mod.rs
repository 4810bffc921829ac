use replica_executor::computation_graph::builder::GraphBuilder;
use replica_executor::proto::GraphProto;

pub mod checker;
pub mod wrapper;

pub fn add_function(name: &str) -> GraphProto {
    GraphBuilder::function(name, &["a", "b"], |b, params| {
        vec![b.add(&params[0], &params[1])]
    })
}

/// `range(10).map(x + 1)`
pub fn map_graph(device: Option<&str>) -> GraphProto {
    let mut builder = GraphBuilder::new("map");
    let dataset = builder.range_to(10);
    let plus_one = GraphBuilder::function("plus_one", &["x"], |b, params| {
        let one = b.constant_i64(1);
        vec![b.add(&params[0], &one)]
    });
    let mapped = match device {
        Some(device) => builder.with_device(device, |b| b.map(&dataset, &[], plus_one)),
        None => builder.map(&dataset, &[], plus_one),
    };
    builder.output(&mapped).build()
}

/// `range(10).reduce(0, +)`, optionally with the reduce node annotated.
pub fn reduce_graph(device: Option<&str>) -> GraphProto {
    let mut builder = GraphBuilder::new("sum");
    let dataset = builder.range_to(10);
    let zero = builder.constant_i64(0);
    let total = match device {
        Some(device) => {
            builder.with_device(device, |b| b.reduce(&dataset, &zero, &[], add_function("add")))
        }
        None => builder.reduce(&dataset, &zero, &[], add_function("add")),
    };
    builder.output(&total).build()
}

/// `i = 0; acc = 0; while i < 10 { acc += i; i += 1 }; acc`
pub fn accumulation_loop_graph() -> GraphProto {
    let mut builder = GraphBuilder::new("accumulate");
    let i = builder.constant_i64(0);
    let acc = builder.constant_i64(0);
    let cond = GraphBuilder::function("cond", &["i", "acc"], |b, params| {
        let ten = b.constant_i64(10);
        vec![b.less(&params[0], &ten)]
    });
    let body = GraphBuilder::function("body", &["i", "acc"], |b, params| {
        let one = b.constant_i64(1);
        let next = b.add(&params[0], &one);
        let acc = b.add(&params[1], &params[0]);
        vec![next, acc]
    });
    let outputs = builder.while_loop(&[&i, &acc], cond, body, None);
    builder.output(&outputs[1]).build()
}

fn sum_to_ten_function(name: &str) -> GraphProto {
    GraphBuilder::function(name, &[], |b, _| {
        let dataset = b.range_to(10);
        let zero = b.constant_i64(0);
        vec![b.reduce(&dataset, &zero, &[], add_function("add"))]
    })
}

/// `range(3).map(x -> range(4).reduce(x, +))`, yielding `[6, 7, 8]`.
pub fn reduce_in_map_graph() -> GraphProto {
    let mut builder = GraphBuilder::new("reduce_in_map");
    let dataset = builder.range_to(3);
    let f = GraphBuilder::function("f", &["x"], |b, params| {
        let inner = b.range_to(4);
        vec![b.reduce(&inner, &params[0], &[], add_function("add"))]
    });
    let mapped = builder.map(&dataset, &[], f);
    builder.output(&mapped).build()
}

/// Sums `range(10)` inside the taken branch of an `If`; evaluates to 45.
pub fn reduce_in_if_graph() -> GraphProto {
    let mut builder = GraphBuilder::new("reduce_in_if");
    let condition = builder.constant_bool(true);
    let else_branch = GraphBuilder::function("else", &[], |b, _| vec![b.constant_i64(0)]);
    let outputs = builder.if_else(&condition, &[], sum_to_ten_function("then"), else_branch);
    builder.output(&outputs[0]).build()
}

/// A single loop iteration adding the sum of `range(10)`; evaluates to 45.
pub fn reduce_in_while_graph() -> GraphProto {
    let mut builder = GraphBuilder::new("reduce_in_while");
    let i = builder.constant_i64(0);
    let cond = GraphBuilder::function("cond", &["i"], |b, params| {
        let one = b.constant_i64(1);
        vec![b.less(&params[0], &one)]
    });
    let body = GraphBuilder::function("body", &["i"], |b, params| {
        let dataset = b.range_to(10);
        let zero = b.constant_i64(0);
        let sum = b.reduce(&dataset, &zero, &[], add_function("add"));
        vec![b.add(&params[0], &sum)]
    });
    let outputs = builder.while_loop(&[&i], cond, body, Some(5));
    builder.output(&outputs[0]).build()
}

/// Sums `range(10)` inside a called function; evaluates to 45.
pub fn reduce_in_call_graph() -> GraphProto {
    let mut builder = GraphBuilder::new("reduce_in_call");
    let outputs = builder.call(&[], sum_to_ten_function("sum"));
    builder.output(&outputs[0]).build()
}
