use std::borrow::Cow;
use std::default::Default;
use std::io::{BufWriter, Error, ErrorKind, Write};

use ptree::print_config::UTF_CHARS;
use ptree::{write_tree_with, PrintConfig, Style, TreeItem};

use crate::plan::{Plan, PlanNode};

impl<'a> TreeItem for &'a PlanNode {
    type Child = Self;

    fn write_self<W: Write>(&self, f: &mut W, style: &Style) -> std::io::Result<()> {
        write!(f, "{}", style.paint(&self.operator))?;
        if let Some(cost) = self.cost {
            write!(f, " (cost={})", cost)?;
        }
        Ok(())
    }

    fn children(&self) -> Cow<[Self::Child]> {
        Cow::from(
            self.inputs
                .iter()
                .map(|c| &**c)
                .collect::<Vec<&'a PlanNode>>(),
        )
    }
}

pub fn explain<W: Write>(plan: &Plan, output: &mut W) -> std::io::Result<()> {
    let config = PrintConfig {
        indent: 3,
        characters: UTF_CHARS.into(),
        ..Default::default()
    };
    write_tree_with(&&*plan.root, output, &config)
}

pub fn explain_to_string(plan: &Plan) -> std::io::Result<String> {
    let mut buf = BufWriter::new(Vec::new());

    explain(plan, &mut buf)?;

    let bytes = buf.into_inner()?;
    String::from_utf8(bytes).map_err(|e| Error::new(ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use arrow_schema::DataType;
    use datafusion_common::ScalarValue;

    use crate::column::ColumnFactory;
    use crate::plan::explain::explain_to_string;
    use crate::plan::LogicalPlanBuilder;
    use crate::scalar::{col, eq, lit};
    use crate::test_utils::table_with_columns;

    #[test]
    fn test_explain_logical_plan() {
        let factory = ColumnFactory::new();
        let t1 = table_with_columns(1, "t1", &[("a", DataType::Int32)]);
        let a = factory.create_table_column(DataType::Int32, "a", 0, 0, true);

        let plan = LogicalPlanBuilder::new()
            .get(t1, vec![a.clone()])
            .select(eq(col(&a), lit(ScalarValue::Int32(Some(1)))))
            .build()
            .unwrap();

        let expected_result = "\
LogicalSelect { predicate: \"a#0 = 1\" }
└─ LogicalGet { table: \"t1\", cols: [a#0] }
";

        let result = explain_to_string(&plan).unwrap();

        assert_eq!(expected_result, result);
    }
}
