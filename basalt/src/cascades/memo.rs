use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::ops::{Index, IndexMut};
use std::sync::Arc;

use anyhow::bail;
use enumset::EnumSet;
use log::debug;
use prettytable::{row, Table};

use crate::cascades::CascadesOptimizer;
use crate::cost::Cost;
use crate::error::{OptError, OptResult};
use crate::operator::{
    derive_logical_prop, derive_statistics, DeriveHandle, LogicalOperator, Operator,
};
use crate::optimizer::{
    CteInfo, OptExpr, OptExprHandle, OptGroup, OptGroupHandle, OptimizerContext,
};
use crate::plan::{Plan, PlanNodeBuilder, PlanNodeId, PlanNodeIdGen, PlanNodeRef};
use crate::properties::{LogicalProperty, PhysicalPropertySet};
use crate::rules::OptExprNode::{ExprHandleNode, GroupHandleNode, OperatorNode};
use crate::rules::{OptExpression, Pattern, RuleId};
use crate::stat::Statistics;

/// Dynamic programming table used for storing expression groups.
///
/// Groups never merge: when a rule produces an expression already living in another group, the
/// existing expression is kept where it is.
pub(super) struct Memo {
    /// Used to avoid insert duplicate group expression.
    group_exprs: HashMap<GroupExprKey, GroupExprId>,
    groups: Vec<Group>,
    root_group_id: GroupId,
}

impl Memo {
    /// Loads a logical plan, bottom up.
    ///
    /// Plan nodes shared by several parents end up in one group, and so do structurally equal
    /// sub plans.
    pub(super) fn from_plan(plan: &Plan, ctx: &OptimizerContext) -> OptResult<Self> {
        let mut memo = Self {
            group_exprs: HashMap::new(),
            groups: Vec::new(),
            root_group_id: GroupId(0),
        };

        let mut node_id_to_group_id = HashMap::new();
        memo.root_group_id = memo.insert_plan_node(&plan.root(), &mut node_id_to_group_id, ctx)?;
        Ok(memo)
    }

    fn insert_plan_node(
        &mut self,
        node: &PlanNodeRef,
        node_id_to_group_id: &mut HashMap<PlanNodeId, GroupId>,
        ctx: &OptimizerContext,
    ) -> OptResult<GroupId> {
        if let Some(group_id) = node_id_to_group_id.get(&node.id()) {
            return Ok(*group_id);
        }

        // Inputs first, so a CTE producer is registered before the body consuming it.
        let mut inputs = Vec::with_capacity(node.inputs().len());
        for input in node.inputs() {
            inputs.push(self.insert_plan_node(input, node_id_to_group_id, ctx)?);
        }

        let key = GroupExprKey {
            operator: node.operator().clone(),
            inputs,
        };
        let (group_expr_id, _) = self.insert_group_expression(key, None, ctx)?;
        node_id_to_group_id.insert(node.id(), group_expr_id.group_id);
        Ok(group_expr_id.group_id)
    }

    pub(super) fn root_group_id(&self) -> GroupId {
        self.root_group_id
    }

    pub(super) fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Inserts an expression produced by a rule into `target_group`, or into a new group when
    /// it's `None`.
    ///
    /// Operator nodes among the inputs become new expressions as well. Returns the id of the
    /// root expression and whether it was newly inserted. On error the groups created for the
    /// inputs are removed again.
    pub(super) fn insert_opt_expression(
        &mut self,
        opt_expr: &OptExpression<CascadesOptimizer>,
        target_group: Option<GroupId>,
        ctx: &OptimizerContext,
    ) -> OptResult<(GroupExprId, bool)> {
        let group_count = self.groups.len();
        let ret = self.insert_opt_expression_recursive(opt_expr, target_group, ctx);
        if ret.is_err() {
            self.truncate_groups(group_count);
        }
        ret
    }

    fn insert_opt_expression_recursive(
        &mut self,
        opt_expr: &OptExpression<CascadesOptimizer>,
        target_group: Option<GroupId>,
        ctx: &OptimizerContext,
    ) -> OptResult<(GroupExprId, bool)> {
        match opt_expr.node() {
            ExprHandleNode(group_expr_id) => Ok((*group_expr_id, false)),
            GroupHandleNode(group_id) => {
                bail!("Group handle {} can't be inserted as group expression", group_id)
            }
            OperatorNode(operator) => {
                let mut inputs = Vec::with_capacity(opt_expr.inputs().len());
                for input in opt_expr.inputs() {
                    let group_id = match input.node() {
                        GroupHandleNode(group_id) => *group_id,
                        _ => {
                            self.insert_opt_expression_recursive(input, None, ctx)?
                                .0
                                .group_id
                        }
                    };
                    inputs.push(group_id);
                }

                let key = GroupExprKey {
                    operator: operator.clone(),
                    inputs,
                };
                self.insert_group_expression(key, target_group, ctx)
            }
        }
    }

    pub(super) fn insert_group_expression(
        &mut self,
        key: GroupExprKey,
        target_group: Option<GroupId>,
        ctx: &OptimizerContext,
    ) -> OptResult<(GroupExprId, bool)> {
        if let Some(existing) = self.group_exprs.get(&key) {
            if let Some(target) = target_group {
                if target != existing.group_id {
                    debug!(
                        "Group expression {:?} already in group {}, not adding it to group {}",
                        existing, existing.group_id, target
                    );
                }
            }
            return Ok((*existing, false));
        }

        let group_id = match target_group {
            Some(group_id) => group_id,
            None => self.new_group(&key, ctx)?,
        };

        let group_expr_id = self[group_id].insert_group_expr(GroupExpr::new(key.clone()));
        self.group_exprs.insert(key, group_expr_id);
        Ok((group_expr_id, true))
    }

    /// Drops the groups from `group_count` on, along with their expressions.
    fn truncate_groups(&mut self, group_count: usize) {
        if self.groups.len() > group_count {
            debug!("Dropping groups {}..{}", group_count, self.groups.len());
            self.groups.truncate(group_count);
            self.group_exprs
                .retain(|_, group_expr_id| group_expr_id.group_id.0 < group_count);
        }
    }

    /// Creates a group for `key`, deriving its logical property and statistics once.
    fn new_group(&mut self, key: &GroupExprKey, ctx: &OptimizerContext) -> OptResult<GroupId> {
        let operator = match &key.operator {
            Operator::Logical(op) => op,
            Operator::Physical(op) => bail!("Physical operator {} can't start a group", op),
        };

        let (logical_prop, statistics) = {
            let input_props = key
                .inputs
                .iter()
                .map(|group_id| &self[*group_id].logical_prop)
                .collect();
            let input_stats = key
                .inputs
                .iter()
                .map(|group_id| &self[*group_id].statistics)
                .collect();
            let handle = DeriveHandle::new(ctx, input_props, input_stats);
            let logical_prop = derive_logical_prop(operator, &handle)?;
            let statistics = derive_statistics(operator, &handle, &logical_prop)?;
            (logical_prop, statistics)
        };

        if let LogicalOperator::LogicalCteProducer(producer) = operator {
            ctx.cte_registry().register(CteInfo::new(
                producer.id(),
                producer.cols().to_vec(),
                logical_prop.clone(),
                statistics.clone(),
            ));
        }

        let group_id = GroupId(self.groups.len());
        debug!(
            "Created group {} for {} with {} rows",
            group_id,
            operator,
            statistics.rows()
        );
        self.groups.push(Group::new(group_id, logical_prop, statistics));
        Ok(group_id)
    }

    /// Forgets winners and exploration state, keeping every expression found so far.
    pub(super) fn reset_search_state(&mut self) {
        for group in &mut self.groups {
            group.reset_search_state();
        }
    }

    pub(super) fn winner_cost(&self, required_prop: &PhysicalPropertySet) -> Option<Cost> {
        self[self.root_group_id]
            .winner(required_prop)
            .map(|winner| winner.lowest_cost)
    }

    /// Extracts the lowest cost plan of the root group delivering `required_prop`.
    pub(super) fn best_plan(&self, required_prop: &PhysicalPropertySet) -> OptResult<Plan> {
        let mut id_gen = PlanNodeIdGen::new();
        let mut visiting = HashSet::new();
        let root = self.best_plan_of(
            self.root_group_id,
            required_prop,
            &mut id_gen,
            &mut visiting,
        )?;
        Ok(Plan::new(root))
    }

    fn best_plan_of(
        &self,
        group_id: GroupId,
        prop: &PhysicalPropertySet,
        id_gen: &mut PlanNodeIdGen,
        visiting: &mut HashSet<(GroupId, PhysicalPropertySet)>,
    ) -> OptResult<PlanNodeRef> {
        let group = &self[group_id];
        let winner = group.winner(prop).ok_or_else(|| OptError::NoPlanFound {
            group: group_id.0,
            required: prop.to_string(),
        })?;

        let best_group_expr = &self[winner.group_expr_id];
        let winner_input = match best_group_expr.output_prop_map.get(prop) {
            Some(winner_input) => winner_input,
            None => bail!(
                "Winner {:?} of group {} has no inputs recorded for {}",
                winner.group_expr_id,
                group_id,
                prop
            ),
        };

        if !visiting.insert((group_id, prop.clone())) {
            bail!("Best plan of group {} for {} refers to itself", group_id, prop);
        }

        let plan_node_id = id_gen.gen_next();
        let mut input_plans = Vec::with_capacity(best_group_expr.inputs().len());
        for (input_group_id, input_prop) in best_group_expr
            .inputs()
            .iter()
            .zip(&winner_input.input_props)
        {
            input_plans.push(self.best_plan_of(*input_group_id, input_prop, id_gen, visiting)?);
        }
        visiting.remove(&(group_id, prop.clone()));

        let node = PlanNodeBuilder::new(plan_node_id, best_group_expr.operator())
            .add_inputs(input_plans)
            .with_logical_prop(Some(group.logical_prop.clone()))
            .with_statistics(Some(group.statistics.clone()))
            .with_physical_props(Some(prop.clone()))
            .with_cost(Some(winner.lowest_cost))
            .build();
        Ok(Arc::new(node))
    }
}

impl Index<GroupId> for Memo {
    type Output = Group;

    fn index(&self, index: GroupId) -> &Group {
        &self.groups[index.0]
    }
}

impl IndexMut<GroupId> for Memo {
    fn index_mut(&mut self, index: GroupId) -> &mut Self::Output {
        &mut self.groups[index.0]
    }
}

impl Index<GroupExprId> for Memo {
    type Output = GroupExpr;

    fn index(&self, index: GroupExprId) -> &Self::Output {
        &self[index.group_id][index]
    }
}

impl IndexMut<GroupExprId> for Memo {
    fn index_mut(&mut self, index: GroupExprId) -> &mut Self::Output {
        &mut self[index.group_id][index]
    }
}

impl Debug for Memo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        writeln!(f, "Groups in memo (root {}):", self.root_group_id)?;
        writeln!(f)?;

        for group in &self.groups {
            writeln!(f, "{:?}", group)?;
        }

        Ok(())
    }
}

/// A group id is an index of `groups` in `Memo`.
#[derive(Hash, Eq, PartialEq, Clone, Copy, Ord, PartialOrd)]
pub struct GroupId(pub usize);

impl Debug for GroupId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl Display for GroupId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl OptGroupHandle for GroupId {
    type O = CascadesOptimizer;
}

/// A group expression id is the group plus the position of the expression in it.
#[derive(Hash, Eq, PartialEq, Clone, Copy, Ord, PartialOrd)]
pub struct GroupExprId {
    pub(super) group_id: GroupId,
    pub(super) expr_id: usize,
}

impl Debug for GroupExprId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}.{:?}", self.group_id, self.expr_id)
    }
}

impl Display for GroupExprId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}.{:?}", self.group_id, self.expr_id)
    }
}

impl OptExprHandle for GroupExprId {
    type O = CascadesOptimizer;
}

impl GroupExprId {
    pub fn new(group_id: GroupId, expr_id: usize) -> Self {
        Self { group_id, expr_id }
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }
}

/// A group contains a set of logically equivalent `GroupExpression`s.
///
/// Logical property and statistics are derived from the expression creating the group and
/// shared by every expression added later.
pub struct Group {
    group_id: GroupId,
    logical_prop: LogicalProperty,
    statistics: Statistics,
    group_exprs: Vec<GroupExpr>,

    /// Lowest cost plans for each [`PhysicalPropertySet`].
    best_plans: HashMap<PhysicalPropertySet, OptimizationResult>,

    /// All logical expression has been explored.
    pub(super) explored: bool,
}

impl Debug for Group {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Group {:?} ({:.2} rows, max card {}):",
            &self.group_id.0,
            self.statistics.rows(),
            self.logical_prop.max_card()
        )?;

        let mut table = Table::new();
        table.add_row(row!["Group Expression Id", "Operator", "Inputs"]);
        for (expr_id, group_expr) in self.group_exprs.iter().enumerate() {
            table.add_row(row![
                expr_id,
                format!("{}", group_expr.key.operator),
                format!("{:?}", group_expr.key.inputs)
            ]);
        }
        writeln!(f, "{}", table)?;

        if !self.best_plans.is_empty() {
            let mut winners = Table::new();
            winners.add_row(row!["Physical Property", "Winner", "Cost"]);
            for (prop, result) in &self.best_plans {
                winners.add_row(row![prop, result.group_expr_id, result.lowest_cost]);
            }
            writeln!(f, "{}", winners)?;
        }

        Ok(())
    }
}

impl Index<GroupExprId> for Group {
    type Output = GroupExpr;

    fn index(&self, index: GroupExprId) -> &Self::Output {
        debug_assert_eq!(self.group_id, index.group_id);
        &self.group_exprs[index.expr_id]
    }
}

impl IndexMut<GroupExprId> for Group {
    fn index_mut(&mut self, index: GroupExprId) -> &mut Self::Output {
        debug_assert_eq!(self.group_id, index.group_id);
        &mut self.group_exprs[index.expr_id]
    }
}

impl OptGroup for Group {
    fn logical_prop(&self) -> &LogicalProperty {
        &self.logical_prop
    }

    fn statistics(&self) -> &Statistics {
        &self.statistics
    }
}

impl Group {
    fn new(group_id: GroupId, logical_prop: LogicalProperty, statistics: Statistics) -> Self {
        Self {
            group_id,
            logical_prop,
            statistics,
            group_exprs: Vec::new(),
            best_plans: HashMap::new(),
            explored: false,
        }
    }

    pub(super) fn winner(
        &self,
        physical_prop_set: &PhysicalPropertySet,
    ) -> Option<&OptimizationResult> {
        self.best_plans.get(physical_prop_set)
    }

    fn group_expr_ids<F>(&self, filter: F) -> Vec<GroupExprId>
    where
        F: Fn(&GroupExpr) -> bool,
    {
        self.group_exprs
            .iter()
            .enumerate()
            .filter(|(_, group_expr)| filter(group_expr))
            .map(|(expr_id, _)| GroupExprId::new(self.group_id, expr_id))
            .collect()
    }

    pub(super) fn physical_group_expr_ids(&self) -> Vec<GroupExprId> {
        self.group_expr_ids(GroupExpr::is_physical)
    }

    pub(super) fn logical_group_expr_ids(&self) -> Vec<GroupExprId> {
        self.group_expr_ids(GroupExpr::is_logical)
    }

    /// Records `group_expr_id` delivering `output_prop` at `cost` from inputs delivering
    /// `input_props`, keeping whichever is cheaper for the group and for the expression.
    pub(super) fn update_winner(
        &mut self,
        group_expr_id: GroupExprId,
        output_prop: &PhysicalPropertySet,
        input_props: &[PhysicalPropertySet],
        cost: Cost,
    ) {
        self[group_expr_id].update_winner_input(output_prop, input_props, cost);

        if let Some(winner) = self.winner(output_prop) {
            if winner.lowest_cost <= cost {
                return;
            }
        }

        self.best_plans.insert(
            output_prop.clone(),
            OptimizationResult {
                lowest_cost: cost,
                group_expr_id,
            },
        );
    }

    /// Number of group expressions.
    pub(super) fn expr_count(&self) -> usize {
        self.group_exprs.len()
    }

    fn insert_group_expr(&mut self, group_expr: GroupExpr) -> GroupExprId {
        let group_expr_id = GroupExprId::new(self.group_id, self.group_exprs.len());
        self.group_exprs.push(group_expr);
        group_expr_id
    }

    fn reset_search_state(&mut self) {
        self.best_plans.clear();
        self.explored = false;
        for group_expr in &mut self.group_exprs {
            group_expr.output_prop_map.clear();
        }
    }
}

/// Base group expression information.
///
/// Two keys are equal when their operators match structurally and they have the same inputs.
#[derive(Debug, Clone)]
pub(super) struct GroupExprKey {
    pub(super) operator: Operator,
    pub(super) inputs: Vec<GroupId>,
}

impl Hash for GroupExprKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.operator.hash_value().hash(state);
        self.inputs.hash(state);
    }
}

impl PartialEq for GroupExprKey {
    fn eq(&self, other: &Self) -> bool {
        self.inputs == other.inputs && self.operator.matches(&other.operator)
    }
}

impl Eq for GroupExprKey {}

pub struct GroupExpr {
    /// Can be used to uniquely identify a group expression.
    ///
    /// It should not be changed after creation.
    key: GroupExprKey,

    /// Rules already applied to this group expression.
    applied_rules: EnumSet<RuleId>,

    /// Key is output property, while value is the winner sub plan's required properties and cost.
    output_prop_map: HashMap<PhysicalPropertySet, WinnerInput>,
}

impl OptExpr for GroupExpr {
    type InputHandle = GroupId;
    type O = CascadesOptimizer;

    fn operator(&self) -> &Operator {
        GroupExpr::operator(self)
    }

    fn inputs_len(&self, _opt: &CascadesOptimizer) -> usize {
        self.key.inputs.len()
    }

    fn input_at(&self, idx: usize, _opt: &CascadesOptimizer) -> GroupId {
        self.key.inputs[idx]
    }
}

impl GroupExpr {
    pub(super) fn new(key: GroupExprKey) -> Self {
        Self {
            key,
            applied_rules: EnumSet::new(),
            output_prop_map: HashMap::new(),
        }
    }

    pub(super) fn is_rule_applied(&self, rule_id: RuleId) -> bool {
        self.applied_rules.contains(rule_id)
    }

    pub(super) fn input_group_ids(&self) -> impl Iterator<Item = GroupId> {
        self.key.inputs.clone().into_iter()
    }

    pub(super) fn set_rule_applied(&mut self, rule_id: RuleId) {
        self.applied_rules |= rule_id;
    }

    pub(super) fn matches_without_children(&self, pattern: &Pattern) -> bool {
        (pattern.predict)(self.operator())
            && (pattern
                .children
                .as_ref()
                .map(|c| c.len() == self.key.inputs.len())
                .unwrap_or(true))
    }

    pub fn operator(&self) -> &Operator {
        &self.key.operator
    }

    pub fn is_logical(&self) -> bool {
        matches!(self.operator(), Operator::Logical(_))
    }

    pub fn is_physical(&self) -> bool {
        matches!(self.operator(), Operator::Physical(_))
    }

    pub(super) fn inputs(&self) -> &[GroupId] {
        &self.key.inputs
    }

    fn update_winner_input(
        &mut self,
        output_prop: &PhysicalPropertySet,
        input_props: &[PhysicalPropertySet],
        cost: Cost,
    ) {
        if let Some(winner) = self.output_prop_map.get(output_prop) {
            if winner.lowest_cost <= cost {
                return;
            }
        }

        self.output_prop_map.insert(
            output_prop.clone(),
            WinnerInput {
                input_props: input_props.to_vec(),
                lowest_cost: cost,
            },
        );
    }
}

/// The result of finding the lowest cost physical group expression for [`PhysicalPropertySet`].
#[derive(Debug)]
pub(super) struct OptimizationResult {
    pub(super) lowest_cost: Cost,
    /// Id of lowest cost physical group.
    pub(super) group_expr_id: GroupExprId,
}

pub(super) struct WinnerInput {
    pub(super) lowest_cost: Cost,
    /// Required properties of inputs.
    pub(super) input_props: Vec<PhysicalPropertySet>,
}
