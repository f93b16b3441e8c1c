use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use enumset::{EnumSet, EnumSetType};

use crate::catalog::{InMemoryCatalog, MetadataAccessor};
use crate::column::{ColRef, ColumnFactory};
use crate::error::OptResult;
use crate::operator::{CteId, Operator};
use crate::plan::Plan;
use crate::properties::LogicalProperty;
use crate::stat::{Statistics, DEFAULT_ROWS};

/// Tunables of the optimizer.
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizerConfig {
    /// Number of segments data is distributed over.
    pub segments: u32,
    /// Row count assumed for tables without statistics.
    pub default_rows: f64,
    /// Dampen the combined selectivity of correlated predicates.
    pub join_damping: bool,
    /// Skip histogram recomputation for anti semi joins.
    pub skip_lasj_histograms: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            segments: 3,
            default_rows: DEFAULT_ROWS,
            join_damping: true,
            skip_lasj_histograms: false,
        }
    }
}

/// Diagnostic switches.
#[derive(EnumSetType, Debug)]
pub enum TraceFlag {
    DisableMotions,
    DisableMotionRandom,
    DisableMotionBroadcast,
    PrintMemoAfterOptimization,
    PrintOptimizationStages,
}

/// What consumers of a CTE need to know about its producer.
#[derive(Debug)]
pub struct CteInfo {
    id: CteId,
    producer_cols: Vec<ColRef>,
    logical_prop: LogicalProperty,
    statistics: Statistics,
}

impl CteInfo {
    pub fn new(
        id: CteId,
        producer_cols: Vec<ColRef>,
        logical_prop: LogicalProperty,
        statistics: Statistics,
    ) -> Self {
        Self {
            id,
            producer_cols,
            logical_prop,
            statistics,
        }
    }

    pub fn id(&self) -> CteId {
        self.id
    }

    pub fn producer_cols(&self) -> &[ColRef] {
        &self.producer_cols
    }

    pub fn logical_prop(&self) -> &LogicalProperty {
        &self.logical_prop
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }
}

/// Producers of the CTEs of one optimization request, by id.
///
/// A producer is registered when its memo group is created, which always happens before any
/// consumer of it is derived.
#[derive(Debug, Default)]
pub struct CteRegistry {
    producers: RefCell<HashMap<CteId, Arc<CteInfo>>>,
}

impl CteRegistry {
    /// Registers `info`, keeping the first registration of an id.
    pub fn register(&self, info: CteInfo) {
        self.producers
            .borrow_mut()
            .entry(info.id)
            .or_insert_with(|| Arc::new(info));
    }

    pub fn get(&self, id: CteId) -> Option<Arc<CteInfo>> {
        self.producers.borrow().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.producers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.producers.borrow().is_empty()
    }
}

/// Cooperative cancellation signal shared with the host.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Context for optimization.
///
/// Everything a derivation or enforcement needs beyond its inputs: catalog access, the column
/// factory, the CTE registry, trace flags, cancellation and configuration.
pub struct OptimizerContext {
    md: Arc<dyn MetadataAccessor>,
    column_factory: ColumnFactory,
    cte_registry: CteRegistry,
    trace_flags: EnumSet<TraceFlag>,
    cancel: CancellationToken,
    config: OptimizerConfig,
}

impl Default for OptimizerContext {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryCatalog::new()))
    }
}

impl Debug for OptimizerContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimizerContext")
            .field("md", &self.md)
            .field("cte_registry", &self.cte_registry)
            .field("trace_flags", &self.trace_flags)
            .field("config", &self.config)
            .finish()
    }
}

impl OptimizerContext {
    pub fn new(md: Arc<dyn MetadataAccessor>) -> Self {
        Self {
            md,
            column_factory: ColumnFactory::new(),
            cte_registry: CteRegistry::default(),
            trace_flags: EnumSet::empty(),
            cancel: CancellationToken::default(),
            config: OptimizerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OptimizerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_trace_flags(mut self, trace_flags: EnumSet<TraceFlag>) -> Self {
        self.trace_flags = trace_flags;
        self
    }

    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Uses `factory` so that columns of an already built plan keep unique ids.
    pub fn with_column_factory(mut self, factory: ColumnFactory) -> Self {
        self.column_factory = factory;
        self
    }

    pub fn md(&self) -> &dyn MetadataAccessor {
        self.md.as_ref()
    }

    pub fn column_factory(&self) -> &ColumnFactory {
        &self.column_factory
    }

    pub fn cte_registry(&self) -> &CteRegistry {
        &self.cte_registry
    }

    pub fn trace_flags(&self) -> EnumSet<TraceFlag> {
        self.trace_flags
    }

    pub fn is_traced(&self, flag: TraceFlag) -> bool {
        self.trace_flags.contains(flag)
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Optimizer interface.
///
/// All information required by optimizer, such as rule set, input plan, required property are
/// passed by optimizer in constructor, since different optimizer may require different information.
///
/// The concepts of `group` and `group expression` are borrowed from cascades optimizer. Each
/// `group` consists of several `group expressions`, and all group expressions represents
/// logically same plan, e.g. return same result set.
pub trait Optimizer {
    type GroupHandle: OptGroupHandle<O = Self>;
    type ExprHandle: OptExprHandle<O = Self>;
    type Group: OptGroup;
    type Expr: OptExpr<O = Self, InputHandle = Self::GroupHandle>;

    /// These methods are accessed by rules.
    fn context(&self) -> &OptimizerContext;
    fn group_at(&self, group_handle: Self::GroupHandle) -> &Self::Group;
    fn expr_at(&self, expr_handle: Self::ExprHandle) -> &Self::Expr;
    fn group_of(&self, expr_handle: Self::ExprHandle) -> Self::GroupHandle;

    /// Entry point to drive optimization process.
    fn find_best_plan(self) -> OptResult<Plan>;
}

pub trait OptExpr {
    type O: Optimizer;
    type InputHandle: OptGroupHandle;

    fn operator(&self) -> &Operator;
    fn inputs_len(&self, opt: &Self::O) -> usize;
    fn input_at(&self, idx: usize, opt: &Self::O) -> Self::InputHandle;
}

pub trait OptGroup {
    fn logical_prop(&self) -> &LogicalProperty;
    fn statistics(&self) -> &Statistics;
}

pub trait OptExprHandle: Clone + Debug + PartialEq + Eq {
    type O: Optimizer<ExprHandle = Self>;
}

pub trait OptGroupHandle: Clone + Debug + PartialEq + Eq {
    type O: Optimizer<GroupHandle = Self>;
}

#[cfg(test)]
mod tests {
    use crate::optimizer::{CancellationToken, OptimizerContext};

    #[test]
    fn test_cancellation_is_shared() {
        let token = CancellationToken::default();
        let context = OptimizerContext::default().with_cancellation_token(token.clone());
        assert!(!context.is_cancelled());

        token.cancel();
        assert!(context.is_cancelled());
    }
}
