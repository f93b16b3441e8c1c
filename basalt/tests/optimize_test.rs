use std::collections::HashMap;
use std::sync::Arc;

use arrow_schema::DataType;
use basalt::cascades::CascadesOptimizer;
use basalt::catalog::{TableDistribution, TableStats};
use basalt::column::{ColRefMap, ColumnFactory};
use basalt::operator::LogicalOperator::LogicalJoin;
use basalt::operator::Operator::Physical;
use basalt::operator::PhysicalOperator::{
    PhysicalComputeScalar, PhysicalCteConsumer, PhysicalCteProducer, PhysicalHashJoin,
    PhysicalIndexNestedLoopJoin, PhysicalSequence, PhysicalTableScan,
};
use basalt::operator::{Join, JoinType, LogicalOperatorTrait, SetOpKind};
use basalt::error::OptError;
use basalt::optimizer::{Optimizer, OptimizerConfig, OptimizerContext};
use basalt::plan::{explain_to_string, LogicalPlanBuilder, PlanNodeRef};
use basalt::properties::{DistributionSpec, OrderSpec, PhysicalPropertySet};
use basalt::scalar::{binary, col, eq, lit};
use basalt::stat::Histogram;
use basalt::test_utils::{
    catalog_with_tables, scan_columns, table_and_columns, table_with_columns,
};
use datafusion_common::ScalarValue;
use datafusion_expr::Operator as BinaryOp;

fn int(v: i32) -> ScalarValue {
    ScalarValue::Int32(Some(v))
}

fn find(node: &PlanNodeRef, pred: &dyn Fn(&PlanNodeRef) -> bool) -> Option<PlanNodeRef> {
    if pred(node) {
        return Some(node.clone());
    }
    node.inputs().iter().find_map(|input| find(input, pred))
}

#[test]
fn test_difference_all_of_const_tables() {
    let context = OptimizerContext::default();
    let factory = context.column_factory();
    let x = factory.create(DataType::Int32, "x");
    let y = factory.create(DataType::Int32, "y");
    let out = factory.create(DataType::Int32, "out");

    let mut builder = LogicalPlanBuilder::new();
    let right = builder
        .const_table(vec![y.clone()], vec![vec![int(1)]])
        .build()
        .unwrap()
        .root();
    let plan = builder
        .const_table(vec![x.clone()], vec![vec![int(1)], vec![int(1)], vec![int(2)]])
        .set_op(
            SetOpKind::DifferenceAll,
            vec![out.clone()],
            vec![vec![x], vec![y]],
            vec![right],
        )
        .build()
        .unwrap();

    let optimizer = CascadesOptimizer::new(context, plan, PhysicalPropertySet::any()).unwrap();
    let best = optimizer.find_best_plan().unwrap();

    let root = best.root();
    assert!(matches!(root.operator(), Physical(_)));
    let max_card = root.logical_prop().unwrap().max_card().value().unwrap();
    assert!(max_card <= 3);
    assert!(root.stat().unwrap().rows() <= 3.0);
    assert!(root.logical_prop().unwrap().output_cols().contains(&out));
}

#[test]
fn test_join_with_table_statistics() {
    let values: Vec<ScalarValue> = (0..100).map(int).collect();
    let stats = |rows: f64| TableStats {
        rows,
        histograms: HashMap::from([(0, Histogram::from_values(&values))]),
    };
    let t1 = table_with_columns(1, "t1", &[("a", DataType::Int32)]);
    let t2 = table_with_columns(2, "t2", &[("b", DataType::Int32)]);
    let catalog = catalog_with_tables([
        (t1.as_ref().clone(), Some(stats(10000.0))),
        (t2.as_ref().clone(), Some(stats(100.0))),
    ]);

    let factory = ColumnFactory::new();
    let a = scan_columns(&factory, &t1);
    let b = scan_columns(&factory, &t2);
    let context = OptimizerContext::new(Arc::new(catalog)).with_column_factory(factory);

    let mut builder = LogicalPlanBuilder::new();
    let right = builder.get(t2, b.clone()).build().unwrap().root();
    let plan = builder
        .get(t1, a.clone())
        .join(JoinType::Inner, eq(col(&a[0]), col(&b[0])), right)
        .build()
        .unwrap();

    let optimizer = CascadesOptimizer::new(context, plan, PhysicalPropertySet::any()).unwrap();
    let best = optimizer.find_best_plan().unwrap();

    let join = find(&best.root(), &|node| {
        matches!(node.operator(), Physical(PhysicalHashJoin(_)))
    })
    .unwrap();
    let rows = join.stat().unwrap().rows();
    assert!(rows > 0.0);
    assert!(rows <= 10000.0 * 100.0);
    assert!(best.cost().unwrap() >= join.cost().unwrap());

    let explained = explain_to_string(&best).unwrap();
    assert!(explained.contains("PhysicalHashJoin"));
    assert!(explained.contains("t1"));
    assert!(explained.contains("t2"));
}

#[test]
fn test_project_new_boolean_column() {
    let context = OptimizerContext::default();
    let factory = context.column_factory();
    let (t1, a) = table_and_columns(factory, 1, "t1", &[("a", DataType::Int32)]);
    let flag = factory.create(DataType::Boolean, "flag");

    let plan = LogicalPlanBuilder::new()
        .get(t1, a.clone())
        .project(vec![(
            flag.clone(),
            binary(col(&a[0]), BinaryOp::Gt, lit(int(5))),
        )])
        .build()
        .unwrap();

    let optimizer = CascadesOptimizer::new(context, plan, PhysicalPropertySet::any()).unwrap();
    let best = optimizer.find_best_plan().unwrap();

    let project = find(&best.root(), &|node| {
        matches!(node.operator(), Physical(PhysicalComputeScalar(_)))
    })
    .unwrap();
    let stat = project.stat().unwrap();
    let input_rows = project.inputs()[0].stat().unwrap().rows();

    assert_eq!(
        &Histogram::default_bool_histogram(),
        stat.histogram(flag.id()).unwrap()
    );
    assert_eq!(Some(input_rows), stat.upper_bound_ndv(&flag));
}

#[test]
fn test_remap_join_keeps_hash() {
    let factory = ColumnFactory::new();
    let (_, a) = table_and_columns(&factory, 1, "t1", &[("a", DataType::Int32)]);
    let (_, b) = table_and_columns(&factory, 2, "t2", &[("b", DataType::Int32)]);
    let join = LogicalJoin(Join::new(JoinType::Inner, eq(col(&a[0]), col(&b[0]))));

    let mut mapping = ColRefMap::new();
    let copy = join.copy_with_remapped_columns(&mut mapping, false, &factory);

    assert_eq!(join.hash_value(), copy.hash_value());
    assert!(join.matches(&copy));
    assert!(mapping.is_empty());
}

#[test]
fn test_cte_consumer_reads_producer() {
    let context = OptimizerContext::default();
    let factory = context.column_factory();
    let x = factory.create(DataType::Int32, "x");
    let y = factory.create(DataType::Int32, "y");

    let mut builder = LogicalPlanBuilder::new();
    let producer = builder
        .const_table(vec![x.clone()], vec![vec![int(1)], vec![int(2)]])
        .cte_producer(1, vec![x.clone()])
        .build()
        .unwrap()
        .root();
    let plan = builder
        .cte_consumer(1, vec![y.clone()], vec![x])
        .cte_anchor(1, producer)
        .build()
        .unwrap();

    let optimizer = CascadesOptimizer::new(context, plan, PhysicalPropertySet::any()).unwrap();
    let best = optimizer.find_best_plan().unwrap();

    let root = best.root();
    assert!(matches!(root.operator(), Physical(PhysicalSequence(_))));
    assert!(matches!(
        root.inputs()[0].operator(),
        Physical(PhysicalCteProducer(_))
    ));
    assert!(matches!(
        root.inputs()[1].operator(),
        Physical(PhysicalCteConsumer(_))
    ));

    // The consumer is bounded by what the producer computes
    let prop = root.logical_prop().unwrap();
    assert_eq!(Some(2), prop.max_card().value());
    assert!(prop.output_cols().contains(&y));
}

#[test]
fn test_index_apply_over_partitioned_scan() {
    let context = OptimizerContext::default();
    let factory = context.column_factory();
    let t1 = Arc::new(
        table_with_columns(1, "t1", &[("a", DataType::Int32)])
            .as_ref()
            .clone()
            .with_partition_keys(vec![0]),
    );
    let a = scan_columns(factory, &t1);
    let (t2, b) = table_and_columns(factory, 2, "t2", &[("b", DataType::Int32)]);

    let mut builder = LogicalPlanBuilder::new();
    let inner = builder
        .get(t2, b.clone())
        .select(eq(col(&b[0]), col(&a[0])))
        .build()
        .unwrap()
        .root();
    let plan = builder
        .dynamic_get(t1, a.clone(), 7)
        .index_apply(JoinType::Inner, eq(col(&a[0]), col(&b[0])), a.clone(), inner)
        .build()
        .unwrap();

    let optimizer = CascadesOptimizer::new(context, plan, PhysicalPropertySet::any()).unwrap();
    let best = optimizer.find_best_plan().unwrap();

    let apply = find(&best.root(), &|node| {
        matches!(node.operator(), Physical(PhysicalIndexNestedLoopJoin(_)))
    })
    .unwrap();
    let prop = apply.logical_prop().unwrap();
    assert!(prop.part_info().contains_scan(7));
    assert!(prop.outer_refs().is_empty());
    assert!(prop.output_cols().contains(&a[0]));
    assert!(prop.output_cols().contains(&b[0]));
}

#[test]
fn test_hash_distributed_table_needs_no_motion() {
    let config = OptimizerConfig {
        default_rows: 42.0,
        ..OptimizerConfig::default()
    };
    let context = OptimizerContext::default().with_config(config);
    let t1 = Arc::new(
        table_with_columns(1, "t1", &[("a", DataType::Int32), ("b", DataType::Int32)])
            .as_ref()
            .clone()
            .with_keys(vec![vec![0]])
            .with_distribution(TableDistribution::Hashed(vec![0])),
    );
    let cols = scan_columns(context.column_factory(), &t1);
    let plan = LogicalPlanBuilder::new()
        .get(t1, cols.clone())
        .build()
        .unwrap();

    let required = PhysicalPropertySet::new(
        DistributionSpec::hashed(vec![cols[0].clone()]),
        OrderSpec::default(),
    );
    let optimizer = CascadesOptimizer::new(context, plan, required).unwrap();
    let best = optimizer.find_best_plan().unwrap();

    let root = best.root();
    assert!(matches!(root.operator(), Physical(PhysicalTableScan(_))));
    assert!(root.inputs().is_empty());
    assert_eq!(42.0, root.stat().unwrap().rows());

    let keys = root.logical_prop().unwrap().keys();
    assert_eq!(1, keys.keys().len());
    assert!(keys.keys()[0].contains(&cols[0]));
}

#[test]
fn test_cancel_through_context_token() {
    let context = OptimizerContext::default();
    let factory = context.column_factory();
    let (t1, a) = table_and_columns(factory, 1, "t1", &[("a", DataType::Int32)]);
    let plan = LogicalPlanBuilder::new().get(t1, a).build().unwrap();
    let token = context.cancellation_token().clone();

    let optimizer = CascadesOptimizer::new(context, plan, PhysicalPropertySet::any()).unwrap();
    token.cancel();
    let err = optimizer.find_best_plan().unwrap_err();
    assert_eq!(Some(&OptError::Cancelled), err.downcast_ref::<OptError>());
}
