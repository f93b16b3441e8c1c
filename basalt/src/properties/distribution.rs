use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::column::{ColRef, ColRefMap, ColRefSet};
use crate::properties::PhysicalProp;

/// How rows of a relation are spread over segments.
#[derive(Hash, Debug, Clone, Eq, PartialEq, Default)]
pub enum DistributionSpec {
    /// No requirement, only used as a required property.
    #[default]
    Any,
    /// The data set is not partitioned and lives on one segment.
    Singleton,
    /// Every segment holds a full copy of the data set.
    Replicated,
    /// Any partitioned distribution, only used as a required property.
    NonSingleton,
    /// The data set has several partitions, but the partitioning doesn't follow any rule.
    ///
    /// A duplicate sensitive random distribution must not see the same row on two segments, as
    /// happens when a replicated relation is read from every segment.
    Random { duplicate_sensitive: bool },
    /// Random distribution that has to be produced by an explicit redistribution.
    StrictRandom,
    /// The data set is partitioned according to hash values of columns.
    Hashed {
        cols: Vec<ColRef>,
        nulls_colocated: bool,
        duplicate_sensitive: bool,
    },
    /// Hashed distribution matching the table's hash function exactly, for writes.
    StrictHashed {
        cols: Vec<ColRef>,
        nulls_colocated: bool,
    },
}

impl DistributionSpec {
    pub fn random() -> Self {
        DistributionSpec::Random {
            duplicate_sensitive: false,
        }
    }

    pub fn hashed(cols: Vec<ColRef>) -> Self {
        DistributionSpec::Hashed {
            cols,
            nulls_colocated: true,
            duplicate_sensitive: false,
        }
    }

    /// Whether rows are spread over more than one segment without duplicates.
    pub fn is_partitioned(&self) -> bool {
        matches!(
            self,
            DistributionSpec::Random { .. }
                | DistributionSpec::StrictRandom
                | DistributionSpec::Hashed { .. }
                | DistributionSpec::StrictHashed { .. }
        )
    }

    /// Columns the distribution hashes on.
    pub fn used_columns(&self) -> ColRefSet {
        match self {
            DistributionSpec::Hashed { cols, .. } | DistributionSpec::StrictHashed { cols, .. } => {
                cols.iter().collect()
            }
            _ => ColRefSet::new(),
        }
    }

    /// Copy with hash columns substituted through `mapping`, `None` when a column has no
    /// mapping.
    pub fn remapped(&self, mapping: &ColRefMap) -> Option<DistributionSpec> {
        let remap = |cols: &[ColRef]| -> Option<Vec<ColRef>> {
            cols.iter().map(|c| mapping.get(c).cloned()).collect()
        };
        Some(match self {
            DistributionSpec::Hashed {
                cols,
                nulls_colocated,
                duplicate_sensitive,
            } => DistributionSpec::Hashed {
                cols: remap(cols)?,
                nulls_colocated: *nulls_colocated,
                duplicate_sensitive: *duplicate_sensitive,
            },
            DistributionSpec::StrictHashed {
                cols,
                nulls_colocated,
            } => DistributionSpec::StrictHashed {
                cols: remap(cols)?,
                nulls_colocated: *nulls_colocated,
            },
            other => other.clone(),
        })
    }

    fn hashes_on_subset(cols: &[ColRef], required: &[ColRef]) -> bool {
        !cols.is_empty() && cols.iter().all(|c| required.contains(c))
    }
}

impl PhysicalProp for DistributionSpec {
    fn satisfies(&self, required: &Self) -> bool {
        use DistributionSpec::*;

        if self == required {
            return true;
        }

        match (self, required) {
            (_, Any) => true,
            (s, NonSingleton) => s.is_partitioned(),
            (
                Random {
                    duplicate_sensitive,
                },
                Random {
                    duplicate_sensitive: required_sensitive,
                },
            ) => !*duplicate_sensitive || *required_sensitive,
            (StrictRandom, Random { .. }) => true,
            (
                Hashed {
                    cols,
                    nulls_colocated,
                    ..
                }
                | StrictHashed {
                    cols,
                    nulls_colocated,
                },
                Hashed {
                    cols: required_cols,
                    nulls_colocated: required_nulls,
                    ..
                },
            ) => {
                Self::hashes_on_subset(cols, required_cols) && (*nulls_colocated || !*required_nulls)
            }
            _ => false,
        }
    }
}

impl Display for DistributionSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DistributionSpec::Any => write!(f, "Any"),
            DistributionSpec::Singleton => write!(f, "Singleton"),
            DistributionSpec::Replicated => write!(f, "Replicated"),
            DistributionSpec::NonSingleton => write!(f, "NonSingleton"),
            DistributionSpec::Random {
                duplicate_sensitive,
            } => write!(f, "Random(dup_sensitive: {})", duplicate_sensitive),
            DistributionSpec::StrictRandom => write!(f, "StrictRandom"),
            DistributionSpec::Hashed { cols, .. } => {
                write!(f, "Hashed[{}]", cols.iter().join(", "))
            }
            DistributionSpec::StrictHashed { cols, .. } => {
                write!(f, "StrictHashed[{}]", cols.iter().join(", "))
            }
        }
    }
}
