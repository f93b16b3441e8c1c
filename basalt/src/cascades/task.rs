use std::mem::swap;
use std::time::Instant;

use anyhow::bail;
use enum_dispatch::enum_dispatch;
use itertools::Itertools;
use log::{debug, info, trace};

use crate::cascades::binding::Binding;
use crate::cascades::memo::GroupExprKey;
use crate::cascades::task::OptimizeInputsTaskState::{
    AfterOptimizeInput, BeforeOptimizeInput, Init, Invalid, OptimizeSelf,
};
use crate::cascades::task::TaskControl::{Done, Yield};
use crate::cascades::{CascadesOptimizer, GroupExprId, GroupId};
use crate::cost::Cost;
use crate::error::{OptError, OptResult};
use crate::operator::{
    DerivePropContext, DerivePropResult, LogicalOperatorTrait, Operator, PhysicalOperatorTrait,
};
use crate::optimizer::OptGroup;
use crate::properties::PhysicalPropertySet;
use crate::rules::{exploration_rules, Rule, RuleImpl, RuleResult};
use crate::stat::Statistics;

#[enum_dispatch]
pub(super) enum TaskImpl {
    ApplyRuleTask,
    OptimizeExpressionTask,
    OptimizeInputsTask,
    ExploreGroupTask,
    OptimizeGroupTask,
}

enum TaskControl {
    Yield {
        this: TaskImpl,
        dependencies: Vec<TaskImpl>,
    },
    Done {
        dependencies: Vec<TaskImpl>,
    },
}

impl TaskControl {
    fn done() -> Self {
        Done {
            dependencies: vec![],
        }
    }

    fn done_with_deps(deps: Vec<TaskImpl>) -> Self {
        Done { dependencies: deps }
    }
}

#[enum_dispatch(TaskImpl)]
trait Task {
    fn execute(self, ctx: &mut CascadesOptimizer) -> OptResult<TaskControl>;
}

/// Runs tasks until none is left or `deadline` passes.
///
/// Cancellation is checked before every task and aborts the search with
/// [`OptError::Cancelled`]; a passed deadline just stops it, keeping what was found so far.
pub(super) fn schedule(
    context: &mut CascadesOptimizer,
    root: TaskImpl,
    deadline: Option<Instant>,
) -> OptResult<()> {
    let mut tasks = vec![root];
    let mut executed = 0usize;

    while let Some(cur_task) = tasks.pop() {
        if context.context.is_cancelled() {
            info!("Optimization cancelled after {} tasks", executed);
            return Err(OptError::Cancelled.into());
        }
        if deadline.map(|d| Instant::now() >= d).unwrap_or(false) {
            info!(
                "Search stage timed out after {} tasks, {} left",
                executed,
                tasks.len() + 1
            );
            return Ok(());
        }

        executed += 1;
        match cur_task.execute(context)? {
            Yield {
                this,
                mut dependencies,
            } => {
                tasks.push(this);
                tasks.append(&mut dependencies);
            }
            Done { mut dependencies } => {
                tasks.append(&mut dependencies);
            }
        }
    }

    debug!("Search finished after {} tasks", executed);
    Ok(())
}

pub(super) struct ApplyRuleTask {
    rule: RuleImpl,
    /// The logical group expression to apply rule to.
    group_expr_id: GroupExprId,
    required_prop: PhysicalPropertySet,
    upper_bound: Cost,
    exploring: bool,
}

impl Task for ApplyRuleTask {
    fn execute(self, ctx: &mut CascadesOptimizer) -> OptResult<TaskControl> {
        if ctx.memo[self.group_expr_id].is_rule_applied(self.rule.rule_id()) {
            return Ok(TaskControl::done());
        }

        debug!(
            "Beginning to apply rule {:?} to group expression {:?}",
            self.rule, self.group_expr_id
        );

        let opt_exprs = {
            Binding::new(self.group_expr_id, self.rule.pattern(), &ctx.memo)
                .into_iter()
                .collect::<Vec<_>>()
        };
        let mut other_tasks = Vec::new();

        for opt_node in opt_exprs {
            let mut result = RuleResult::new();
            self.rule.apply(opt_node, ctx, &mut result)?;
            for result_node in result.results() {
                trace!(
                    "Result of applying rule {:?} to group expression {:?}: {:?}",
                    self.rule,
                    self.group_expr_id,
                    result_node
                );
                let (group_expr_id, inserted) = ctx.memo.insert_opt_expression(
                    &result_node,
                    Some(self.group_expr_id.group_id),
                    &ctx.context,
                )?;
                if !inserted {
                    continue;
                }

                if ctx.memo[group_expr_id].is_logical() {
                    other_tasks.push(
                        OptimizeExpressionTask {
                            group_expr_id,
                            required_prop: self.required_prop.clone(),
                            upper_bound: self.upper_bound,
                            exploring: self.exploring,
                        }
                        .into(),
                    );
                } else if !self.exploring {
                    other_tasks.push(
                        OptimizeInputsTask {
                            group_expr_id,
                            required_prop: self.required_prop.clone(),
                            upper_bound: self.upper_bound,
                            state: Init,
                        }
                        .into(),
                    );
                }
            }
        }

        ctx.memo[self.group_expr_id].set_rule_applied(self.rule.rule_id());
        Ok(TaskControl::done_with_deps(other_tasks))
    }
}

/// Optimize a logical group expression by applying rules.
///
/// If `exploring` is true, only exploration rules are applied.
/// Otherwise both exploration and implementation rules will be applied.
pub(super) struct OptimizeExpressionTask {
    /// Logical group expression to be optimized.
    group_expr_id: GroupExprId,
    required_prop: PhysicalPropertySet,
    upper_bound: Cost,
    exploring: bool,
}

impl Task for OptimizeExpressionTask {
    fn execute(self, ctx: &mut CascadesOptimizer) -> OptResult<TaskControl> {
        let group_expr = &ctx.memo[self.group_expr_id];
        let candidates = match group_expr.operator() {
            Operator::Logical(op) => op.candidate_xforms() & ctx.xforms,
            Operator::Physical(op) => bail!("Can't apply rules to physical operator {}", op),
        };
        let candidates = if self.exploring {
            candidates & exploration_rules()
        } else {
            candidates
        };

        let apply_rule_tasks = ctx
            .rules
            .iter()
            .filter(|rule| candidates.contains(rule.rule_id()))
            .filter(|rule| !group_expr.is_rule_applied(rule.rule_id()))
            .sorted_by_key(|rule| rule.rule_promise())
            .map(|rule| {
                ApplyRuleTask {
                    rule: rule.clone(),
                    group_expr_id: self.group_expr_id,
                    required_prop: self.required_prop.clone(),
                    upper_bound: self.upper_bound,
                    exploring: self.exploring,
                }
                .into()
            })
            .collect::<Vec<_>>();

        let explore_input_group_tasks = group_expr
            .input_group_ids()
            .map(|group_id| {
                ExploreGroupTask {
                    group_id,
                    required_prop: self.required_prop.clone(),
                    upper_bound: self.upper_bound,
                }
                .into()
            })
            .collect::<Vec<_>>();

        let mut tasks = Vec::<TaskImpl>::with_capacity(
            explore_input_group_tasks.len() + apply_rule_tasks.len(),
        );

        tasks.extend(apply_rule_tasks);
        // Inputs are explored before any rule is applied, most promising rules first.
        tasks.extend(explore_input_group_tasks);

        Ok(TaskControl::done_with_deps(tasks))
    }
}

/// Optimize physical group expression for required property.
#[derive(Debug)]
pub(super) struct OptimizeInputsTask {
    /// Physical group expression id to be optimized.
    group_expr_id: GroupExprId,
    /// Required property
    required_prop: PhysicalPropertySet,
    upper_bound: Cost,
    state: OptimizeInputsTaskState,
}

#[derive(Debug)]
enum OptimizeInputsTaskState {
    Init,
    BeforeOptimizeInput {
        derive_results: Vec<DerivePropResult>,
        derive_idx: usize,
        input_idx: usize,
        accumulated_cost: Cost,
    },
    AfterOptimizeInput {
        derive_results: Vec<DerivePropResult>,
        derive_idx: usize,
        input_idx: usize,
        accumulated_cost: Cost,
    },
    OptimizeSelf {
        derive_results: Vec<DerivePropResult>,
        derive_idx: usize,
        accumulated_cost: Cost,
    },
    Invalid,
}

impl OptimizeInputsTask {
    fn do_init(mut self, ctx: &mut CascadesOptimizer) -> OptResult<TaskControl> {
        trace!("Current state {:?} for OptimizeInputsTask", &self);
        let operator = match ctx.memo[self.group_expr_id].operator() {
            Operator::Physical(op) => op,
            Operator::Logical(op) => bail!("Logical operator {} can't be costed", op),
        };

        // Derive children required properties
        let derive_results = operator.derive_properties(DerivePropContext {
            required_prop: &self.required_prop,
            expr_handle: self.group_expr_id,
            optimizer: ctx,
        })?;
        if derive_results.is_empty() {
            return Ok(TaskControl::done());
        }

        let operator_cost = self.operator_cost(ctx)?;
        self.state = if self.inputs_len(ctx) == 0 {
            // Without children we should go to optimize self directly
            OptimizeSelf {
                derive_results,
                derive_idx: 0,
                accumulated_cost: operator_cost,
            }
        } else {
            BeforeOptimizeInput {
                derive_results,
                derive_idx: 0,
                input_idx: 0,
                accumulated_cost: operator_cost,
            }
        };

        Ok(Yield {
            this: self.into(),
            dependencies: vec![],
        })
    }

    fn do_before_optimize_input(mut self, ctx: &CascadesOptimizer) -> OptResult<TaskControl> {
        trace!("Current state {:?} for OptimizeInputsTask", &self);
        let mut new_state = Invalid;
        swap(&mut new_state, &mut self.state);
        match new_state {
            BeforeOptimizeInput {
                derive_results,
                derive_idx,
                input_idx,
                accumulated_cost,
            } => {
                let task = OptimizeGroupTask::new(
                    ctx.memo[self.group_expr_id].inputs()[input_idx],
                    derive_results[derive_idx].input_required_props[input_idx].clone(),
                    self.upper_bound - accumulated_cost,
                )
                .into();

                self.state = AfterOptimizeInput {
                    derive_results,
                    derive_idx,
                    input_idx,
                    accumulated_cost,
                };

                Ok(Yield {
                    this: self.into(),
                    dependencies: vec![task],
                })
            }
            _ => bail!("Should not happen!"),
        }
    }

    fn do_after_optimize_input(mut self, ctx: &CascadesOptimizer) -> OptResult<TaskControl> {
        trace!("Current state {:?} for OptimizeInputsTask", &self);
        let mut new_state = Invalid;
        swap(&mut new_state, &mut self.state);
        match new_state {
            AfterOptimizeInput {
                derive_results,
                derive_idx,
                input_idx,
                mut accumulated_cost,
            } => {
                let input_group_id = ctx.memo[self.group_expr_id].inputs()[input_idx];
                let input_required_prop =
                    &derive_results[derive_idx].input_required_props[input_idx];

                if let Some(winner) = ctx.memo[input_group_id].winner(input_required_prop) {
                    // Found a good plan for this required property
                    accumulated_cost += winner.lowest_cost;

                    // last input of current derive result
                    if (input_idx + 1) == self.inputs_len(ctx) {
                        // Go to optimize self for current derive result
                        self.state = OptimizeSelf {
                            derive_results,
                            derive_idx,
                            accumulated_cost,
                        };
                    } else {
                        // Go to next input
                        self.state = BeforeOptimizeInput {
                            derive_results,
                            derive_idx,
                            input_idx: input_idx + 1,
                            accumulated_cost,
                        }
                    }
                } else if (derive_idx + 1) < derive_results.len() {
                    // We can't find a good enough plan for this required property, so move to
                    // next derive result
                    self.state = BeforeOptimizeInput {
                        derive_results,
                        derive_idx: derive_idx + 1,
                        input_idx: 0,
                        accumulated_cost: self.operator_cost(ctx)?,
                    }
                }

                if matches!(self.state, Invalid) {
                    Ok(TaskControl::done())
                } else {
                    Ok(Yield {
                        this: self.into(),
                        dependencies: vec![],
                    })
                }
            }
            _ => bail!("Should not compute to this state"),
        }
    }

    fn do_optimize_self(mut self, ctx: &mut CascadesOptimizer) -> OptResult<TaskControl> {
        trace!("Current state {:?} for OptimizeInputsTask", &self);
        let mut new_state = Invalid;
        swap(&mut new_state, &mut self.state);
        match new_state {
            OptimizeSelf {
                derive_results,
                derive_idx,
                accumulated_cost,
            } => {
                if accumulated_cost <= self.upper_bound {
                    let cost =
                        self.record_winner(&derive_results[derive_idx], accumulated_cost, ctx)?;
                    if let Some(cost) = cost {
                        if cost < self.upper_bound {
                            self.upper_bound = cost;
                        }
                    }
                }

                if (derive_idx + 1) == derive_results.len() {
                    Ok(TaskControl::done())
                } else {
                    self.state = if self.inputs_len(ctx) == 0 {
                        OptimizeSelf {
                            derive_results,
                            derive_idx: derive_idx + 1,
                            accumulated_cost: self.operator_cost(ctx)?,
                        }
                    } else {
                        BeforeOptimizeInput {
                            derive_results,
                            derive_idx: derive_idx + 1,
                            input_idx: 0,
                            accumulated_cost: self.operator_cost(ctx)?,
                        }
                    };

                    Ok(Yield {
                        this: self.into(),
                        dependencies: vec![],
                    })
                }
            }
            _ => bail!("Should not compute to this state"),
        }
    }

    /// Records this expression as a candidate for what it delivers, appending enforcers when
    /// that doesn't satisfy the required property.
    ///
    /// Returns the cost of meeting the required property, `None` when it can't be enforced.
    fn record_winner(
        &self,
        derive_result: &DerivePropResult,
        cost: Cost,
        ctx: &mut CascadesOptimizer,
    ) -> OptResult<Option<Cost>> {
        let group_id = self.group_expr_id.group_id;
        let output_prop = &derive_result.output_prop;
        ctx.memo[group_id].update_winner(
            self.group_expr_id,
            output_prop,
            &derive_result.input_required_props,
            cost,
        );

        if output_prop.satisfies(&self.required_prop) {
            ctx.memo[group_id].update_winner(
                self.group_expr_id,
                &self.required_prop,
                &derive_result.input_required_props,
                cost,
            );
            return Ok(Some(cost));
        }

        let enforcers = PhysicalPropertySet::append_enforcers(
            &self.required_prop,
            output_prop,
            ctx.context.trace_flags(),
        );
        if enforcers.is_empty() {
            debug!(
                "Group expression {:?} delivers {}, which can't be enforced to {}",
                self.group_expr_id, output_prop, self.required_prop
            );
            return Ok(None);
        }

        let mut accumulated_cost = cost;
        let mut cur_output_prop = output_prop.clone();
        let mut last_enforcer = None;
        for enforcer in enforcers {
            let group_expr_key = GroupExprKey {
                operator: Operator::Physical(enforcer.operator.clone()),
                inputs: vec![group_id],
            };
            let (enforcer_id, _) =
                ctx.memo
                    .insert_group_expression(group_expr_key, Some(group_id), &ctx.context)?;

            let group_stats = ctx.memo[group_id].statistics();
            accumulated_cost += ctx.cost_model.estimate_cost(
                &enforcer.operator,
                group_stats,
                &[group_stats],
                ctx.context.config(),
            )?;
            ctx.memo[group_id].update_winner(
                enforcer_id,
                &enforcer.output_prop,
                &[cur_output_prop.clone()],
                accumulated_cost,
            );
            last_enforcer = Some((enforcer_id, cur_output_prop));
            cur_output_prop = enforcer.output_prop;
        }

        if let Some((enforcer_id, input_prop)) = last_enforcer {
            ctx.memo[group_id].update_winner(
                enforcer_id,
                &self.required_prop,
                &[input_prop],
                accumulated_cost,
            );
        }

        Ok(Some(accumulated_cost))
    }

    /// Cost of the operator alone, estimated from the statistics of its group and inputs.
    fn operator_cost(&self, ctx: &CascadesOptimizer) -> OptResult<Cost> {
        let group_expr = &ctx.memo[self.group_expr_id];
        let operator = match group_expr.operator() {
            Operator::Physical(op) => op,
            Operator::Logical(op) => bail!("Logical operator {} can't be costed", op),
        };
        let input_stats = group_expr
            .inputs()
            .iter()
            .map(|group_id| ctx.memo[*group_id].statistics())
            .collect::<Vec<&Statistics>>();

        ctx.cost_model.estimate_cost(
            operator,
            ctx.memo[self.group_expr_id.group_id].statistics(),
            &input_stats,
            ctx.context.config(),
        )
    }

    fn inputs_len(&self, ctx: &CascadesOptimizer) -> usize {
        ctx.memo[self.group_expr_id].inputs().len()
    }
}

impl Task for OptimizeInputsTask {
    fn execute(self, ctx: &mut CascadesOptimizer) -> OptResult<TaskControl> {
        match self.state {
            Init => self.do_init(ctx),
            BeforeOptimizeInput { .. } => self.do_before_optimize_input(ctx),
            AfterOptimizeInput { .. } => self.do_after_optimize_input(ctx),
            OptimizeSelf { .. } => self.do_optimize_self(ctx),
            Invalid => bail!("Should not happen!"),
        }
    }
}

/// Optimizes a group for [`PhysicalPropertySet`].
pub(super) struct OptimizeGroupTask {
    group_id: GroupId,
    /// Required property
    required_prop: PhysicalPropertySet,
    upper_bound: Cost,
}

impl OptimizeGroupTask {
    pub(super) fn new(
        group_id: GroupId,
        required_prop: PhysicalPropertySet,
        upper_bound: Cost,
    ) -> Self {
        Self {
            group_id,
            required_prop,
            upper_bound,
        }
    }
}

impl Task for OptimizeGroupTask {
    fn execute(self, ctx: &mut CascadesOptimizer) -> OptResult<TaskControl> {
        debug!(
            "Beginning to optimize group {:?} for physical property: {}",
            self.group_id, self.required_prop
        );

        let group = &ctx.memo[self.group_id];
        if let Some(result) = group.winner(&self.required_prop) {
            debug!(
                "Winner for physical property {} in group {:?} found: {:?}, just return",
                self.required_prop, self.group_id, result
            );
            return Ok(TaskControl::done());
        }

        let mut tasks = Vec::with_capacity(group.expr_count());

        for group_expr_id in group.logical_group_expr_ids() {
            tasks.push(
                OptimizeExpressionTask {
                    group_expr_id,
                    required_prop: self.required_prop.clone(),
                    upper_bound: self.upper_bound,
                    exploring: false,
                }
                .into(),
            );
        }

        // Physical expressions are optimized first so that we can set cost upper bound to do
        // early pruning. Enforcers are only ever added on top of the group's own winners.
        for group_expr_id in group.physical_group_expr_ids() {
            let is_enforcer = match ctx.memo[group_expr_id].operator() {
                Operator::Physical(op) => op.is_enforcer(),
                Operator::Logical(_) => false,
            };
            if is_enforcer {
                continue;
            }

            tasks.push(
                OptimizeInputsTask {
                    group_expr_id,
                    required_prop: self.required_prop.clone(),
                    upper_bound: self.upper_bound,
                    state: Init,
                }
                .into(),
            );
        }

        Ok(TaskControl::done_with_deps(tasks))
    }
}

/// Explores a group by applying exploration rules.
pub(super) struct ExploreGroupTask {
    group_id: GroupId,
    required_prop: PhysicalPropertySet,
    upper_bound: Cost,
}

impl Task for ExploreGroupTask {
    fn execute(self, ctx: &mut CascadesOptimizer) -> OptResult<TaskControl> {
        if ctx.memo[self.group_id].explored {
            return Ok(TaskControl::done());
        }

        let tasks = ctx.memo[self.group_id]
            .logical_group_expr_ids()
            .into_iter()
            .map(|group_expr_id| {
                OptimizeExpressionTask {
                    group_expr_id,
                    required_prop: self.required_prop.clone(),
                    upper_bound: self.upper_bound,
                    exploring: true,
                }
                .into()
            })
            .collect();

        // This is correct since currently we have only single thread scheduler.
        ctx.memo[self.group_id].explored = true;

        Ok(TaskControl::done_with_deps(tasks))
    }
}
