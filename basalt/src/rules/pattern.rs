use crate::operator::Operator;

pub type OperatorMatcher = fn(&Operator) -> bool;

/// A pattern defines how to match a sub tree of a plan.
///
/// If we want to match `Join(Join(_, _), _)` pattern, the pattern tree should be defined like:
/// ```
/// use basalt::operator::LogicalOperator::LogicalJoin;
/// use basalt::operator::Operator::Logical;
/// use basalt::rules::{any, pattern, PatterBuilder};
///
/// pattern(|op| matches!(op, Logical(LogicalJoin(_))))
///   .pattern(|op| matches!(op, Logical(LogicalJoin(_))))
///     .leaf(any)
///   .finish()
///   .group()
/// .finish();
/// ```
///
/// The root node in pattern tree matches the upper `Join`, the first child node matches the
/// lower `Join` whose own inputs are bound as groups, and the last binds the second input group
/// of the upper join without looking at its expressions.
pub struct Pattern {
    /// Matches against an operator.
    pub predict: OperatorMatcher,
    /// `None` for leaf node.
    pub children: Option<Vec<Pattern>>,
    /// Binds the whole input group instead of its expressions.
    pub binds_group: bool,
}

impl Pattern {
    pub fn new_leaf(matcher: OperatorMatcher) -> Pattern {
        Pattern {
            predict: matcher,
            // Inputs of a leaf are bound as groups
            children: None,
            binds_group: false,
        }
    }

    pub fn new_group() -> Pattern {
        Pattern {
            predict: any,
            children: None,
            binds_group: true,
        }
    }

    pub fn new<I: IntoIterator<Item = Pattern>>(matcher: OperatorMatcher, children: I) -> Pattern {
        let children = children.into_iter().collect::<Vec<Pattern>>();
        let children_pattern = if !children.is_empty() {
            Some(children)
        } else {
            None
        };

        Pattern {
            predict: matcher,
            children: children_pattern,
            binds_group: false,
        }
    }
}

pub fn any(_: &Operator) -> bool {
    true
}

pub fn pattern(matcher: OperatorMatcher) -> RootPatternBuilder {
    RootPatternBuilder {
        matcher,
        inputs: vec![],
    }
}

pub trait PatterBuilder {
    type Child;
    type Output;
    fn pattern(self, matcher: OperatorMatcher) -> Self::Child;
    fn leaf(self, matcher: OperatorMatcher) -> Self;
    fn group(self) -> Self;
    fn finish(self) -> Self::Output;
}

pub struct RootPatternBuilder {
    matcher: OperatorMatcher,
    inputs: Vec<Pattern>,
}

pub trait AddChild {
    fn add_child(&mut self, pattern: Pattern);
}

pub struct NonRootPatternBuilder<P> {
    parent_builder: P,
    matcher: OperatorMatcher,
    inputs: Vec<Pattern>,
}

impl<P: PatterBuilder + AddChild> PatterBuilder for NonRootPatternBuilder<P> {
    type Child = NonRootPatternBuilder<Self>;
    type Output = P;

    fn pattern(self, matcher: OperatorMatcher) -> NonRootPatternBuilder<Self> {
        NonRootPatternBuilder {
            parent_builder: self,
            matcher,
            inputs: vec![],
        }
    }

    fn leaf(mut self, matcher: OperatorMatcher) -> Self {
        self.inputs.push(Pattern::new_leaf(matcher));
        self
    }

    fn group(mut self) -> Self {
        self.inputs.push(Pattern::new_group());
        self
    }

    fn finish(mut self) -> Self::Output {
        let pattern = Pattern::new(self.matcher, self.inputs);
        self.parent_builder.add_child(pattern);
        self.parent_builder
    }
}

impl<P> AddChild for NonRootPatternBuilder<P> {
    fn add_child(&mut self, pattern: Pattern) {
        self.inputs.push(pattern)
    }
}

impl PatterBuilder for RootPatternBuilder {
    type Child = NonRootPatternBuilder<Self>;
    type Output = Pattern;

    fn pattern(self, matcher: OperatorMatcher) -> Self::Child {
        NonRootPatternBuilder {
            parent_builder: self,
            matcher,
            inputs: vec![],
        }
    }

    fn leaf(mut self, matcher: OperatorMatcher) -> Self {
        self.inputs.push(Pattern::new_leaf(matcher));
        self
    }

    fn group(mut self) -> Self {
        self.inputs.push(Pattern::new_group());
        self
    }

    fn finish(self) -> Self::Output {
        Pattern::new(self.matcher, self.inputs)
    }
}

impl AddChild for RootPatternBuilder {
    fn add_child(&mut self, pattern: Pattern) {
        self.inputs.push(pattern)
    }
}

#[cfg(test)]
mod tests {
    use crate::operator::LogicalOperator::{LogicalJoin, LogicalLimit};
    use crate::operator::Operator::Logical;
    use crate::rules::{any, pattern, PatterBuilder};

    #[test]
    fn test_build_pattern() {
        let p = pattern(|op| matches!(op, Logical(LogicalJoin(_))))
            .pattern(|op| matches!(op, Logical(LogicalLimit(_))))
            .leaf(any)
            .finish()
            .group()
            .finish();

        let children = p.children.as_ref().unwrap();
        assert_eq!(2, children.len());
        assert_eq!(1, children[0].children.as_ref().unwrap().len());
        assert!(!children[0].binds_group);
        assert!(children[1].binds_group);
        assert!(children[1].children.is_none());
    }
}
