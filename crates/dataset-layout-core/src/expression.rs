//! Partition expressions: a small textual language for partition strategies.
//!
//! An expression is either a single partitioner call or a bracketed list of
//! calls, for example:
//!
//! ```text
//! hash("username", "username_part", 2)
//! [year("ts", "year"), month("ts", "month"), hash("id", "bucket", 16)]
//! ```
//!
//! Recognized functions:
//!
//! | call                                       | partitioner                  |
//! |--------------------------------------------|------------------------------|
//! | `hash(name, buckets)`                      | hash over `name`             |
//! | `hash(source, name, buckets)`              | hash over `source`           |
//! | `identity(name, cardinality)`              | identity over a string field |
//! | `identity(name, type, cardinality)`        | identity over a `type` field |
//! | `range(name, 10, 20, ...)`                 | integer range                |
//! | `range(name, "g", "n", ...)`               | string range                 |
//! | `year/month/day/hour/minute(source, name)` | calendar component           |
//!
//! [`to_expression`] is the exact inverse: parsing its output yields a
//! strategy equal to the input. This is how strategies are persisted in
//! dataset descriptors.

mod engine;
mod parser;

pub use engine::{
    DEFAULT_CACHE_CAPACITY, ExpressionEngine, SHARED_CACHE_CAPACITY, evaluate_shared,
};

use std::fmt::Write as _;

use snafu::prelude::*;

use crate::partition::{FieldPartitioner, PartitionError, PartitionStrategy};
use crate::schema::FieldType;
use parser::Node;

/// Result alias for expression parsing and evaluation.
pub type ExpressionResult<T> = Result<T, ExpressionError>;

/// Errors raised while parsing or evaluating a partition expression.
#[derive(Debug, Snafu, Clone, PartialEq)]
#[snafu(visibility(pub(crate)))]
pub enum ExpressionError {
    /// The text is not a well-formed expression.
    #[snafu(display("syntax error at offset {position}: {message}"))]
    Syntax {
        /// Byte offset into the expression text.
        position: usize,
        /// Description of the problem.
        message: String,
    },

    /// The expression calls a function that is not a partitioner.
    #[snafu(display("unknown partition function '{name}'"))]
    UnknownFunction {
        /// The unrecognized function name.
        name: String,
    },

    /// A known function was called with an unsupported number of arguments.
    #[snafu(display("{function}() takes {expected} arguments but {actual} were given"))]
    Arity {
        /// Function name.
        function: String,
        /// Human-readable accepted arities.
        expected: &'static str,
        /// Number of arguments supplied.
        actual: usize,
    },

    /// An argument has the wrong literal type or is out of range.
    #[snafu(display("argument {index} of {function}() must be {expected}, found {found}"))]
    ArgumentType {
        /// Function name.
        function: String,
        /// Zero-based argument position.
        index: usize,
        /// What the argument should have been.
        expected: &'static str,
        /// Description of what was found.
        found: String,
    },

    /// The expression evaluated to something other than a partitioner or a list of them.
    #[snafu(display(
        "partition expression did not produce a field partitioner or a list of them: {found}"
    ))]
    InvalidResult {
        /// Description of the produced value.
        found: String,
    },

    /// The partitioner arguments were rejected.
    #[snafu(display("invalid partitioner in expression: {source}"))]
    Partitioner {
        /// Underlying construction error.
        source: PartitionError,
    },
}

/// A parsed partition expression.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionExpression {
    text: String,
    root: Node,
}

impl PartitionExpression {
    /// Parse `text` into an expression tree.
    pub fn parse(text: &str) -> ExpressionResult<Self> {
        let root = parser::parse(text)?;
        Ok(Self {
            text: text.to_string(),
            root,
        })
    }

    /// The original expression text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Evaluate into a strategy.
    ///
    /// A single call yields a one-level strategy, a list of calls a
    /// multi-level strategy in list order. Anything else (a bare literal, an
    /// empty list, a list containing literals or nested lists) is rejected.
    pub fn evaluate(&self) -> ExpressionResult<PartitionStrategy> {
        let partitioners = match &self.root {
            call @ Node::Call { .. } => vec![partitioner(call)?],
            Node::List(items) if !items.is_empty() => {
                items.iter().map(partitioner).collect::<ExpressionResult<_>>()?
            }
            other => {
                return InvalidResultSnafu {
                    found: other.describe(),
                }
                .fail();
            }
        };
        PartitionStrategy::new(partitioners).context(PartitionerSnafu)
    }
}

fn partitioner(node: &Node) -> ExpressionResult<FieldPartitioner> {
    let Node::Call { name, args } = node else {
        return InvalidResultSnafu {
            found: node.describe(),
        }
        .fail();
    };
    let call = Call { name, args };

    let fp = match name.as_str() {
        "hash" => match args.len() {
            2 => FieldPartitioner::hash(call.string(0)?, call.count(1)?),
            3 => FieldPartitioner::hash_from(call.string(0)?, call.string(1)?, call.count(2)?),
            n => return call.arity("2 or 3", n),
        },
        "identity" => match args.len() {
            2 => Ok(FieldPartitioner::identity(call.string(0)?, call.count(1)?)),
            3 => Ok(FieldPartitioner::identity_typed(
                call.string(0)?,
                call.field_type(1)?,
                call.count(2)?,
            )),
            n => return call.arity("2 or 3", n),
        },
        "range" => {
            if args.len() < 2 {
                return call.arity("at least 2", args.len());
            }
            let field = call.string(0)?;
            match &args[1] {
                Node::Int(_) => {
                    let bounds = (1..args.len())
                        .map(|i| call.int(i))
                        .collect::<ExpressionResult<Vec<_>>>()?;
                    FieldPartitioner::int_range(field, bounds)
                }
                _ => {
                    let bounds = (1..args.len())
                        .map(|i| call.string(i).map(str::to_string))
                        .collect::<ExpressionResult<Vec<_>>>()?;
                    FieldPartitioner::range(field, bounds)
                }
            }
        }
        "year" | "month" | "day" | "hour" | "minute" => {
            if args.len() != 2 {
                return call.arity("2", args.len());
            }
            let (source, field) = (call.string(0)?, call.string(1)?);
            Ok(match name.as_str() {
                "year" => FieldPartitioner::year(source, field),
                "month" => FieldPartitioner::month(source, field),
                "day" => FieldPartitioner::day(source, field),
                "hour" => FieldPartitioner::hour(source, field),
                _ => FieldPartitioner::minute(source, field),
            })
        }
        _ => return UnknownFunctionSnafu { name: name.clone() }.fail(),
    };

    fp.context(PartitionerSnafu)
}

/// Argument accessors for a single call node.
struct Call<'a> {
    name: &'a str,
    args: &'a [Node],
}

impl<'a> Call<'a> {
    fn arity<T>(&self, expected: &'static str, actual: usize) -> ExpressionResult<T> {
        AritySnafu {
            function: self.name,
            expected,
            actual,
        }
        .fail()
    }

    fn mismatch<T>(&self, index: usize, expected: &'static str) -> ExpressionResult<T> {
        ArgumentTypeSnafu {
            function: self.name,
            index,
            expected,
            found: self.args[index].describe(),
        }
        .fail()
    }

    fn string(&self, index: usize) -> ExpressionResult<&'a str> {
        match &self.args[index] {
            Node::Str(s) => Ok(s.as_str()),
            _ => self.mismatch(index, "a string literal"),
        }
    }

    fn int(&self, index: usize) -> ExpressionResult<i64> {
        match &self.args[index] {
            Node::Int(i) => Ok(*i),
            _ => self.mismatch(index, "an integer literal"),
        }
    }

    fn field_type(&self, index: usize) -> ExpressionResult<FieldType> {
        match FieldType::from_name(self.string(index)?) {
            Some(t) => Ok(t),
            None => self.mismatch(index, "a field type name"),
        }
    }

    fn count(&self, index: usize) -> ExpressionResult<u32> {
        let value = self.int(index)?;
        match u32::try_from(value) {
            Ok(n) => Ok(n),
            Err(_) => self.mismatch(index, "a non-negative 32-bit integer"),
        }
    }
}

/// Serialize a strategy into its canonical expression.
///
/// One-level strategies are emitted as a bare call; deeper strategies as a
/// bracketed, `", "`-separated list in strategy order.
pub fn to_expression(strategy: &PartitionStrategy) -> String {
    match strategy.field_partitioners() {
        [single] => partitioner_expression(single),
        many => {
            let parts: Vec<String> = many.iter().map(partitioner_expression).collect();
            format!("[{}]", parts.join(", "))
        }
    }
}

fn partitioner_expression(fp: &FieldPartitioner) -> String {
    match fp {
        FieldPartitioner::Hash {
            source,
            name,
            buckets,
        } => format!("hash({}, {}, {buckets})", quote(source), quote(name)),
        FieldPartitioner::Identity {
            name,
            value_type: FieldType::String,
            cardinality,
        } => format!("identity({}, {cardinality})", quote(name)),
        FieldPartitioner::Identity {
            name,
            value_type,
            cardinality,
        } => format!("identity({}, \"{value_type}\", {cardinality})", quote(name)),
        FieldPartitioner::IntRange { name, upper_bounds } => {
            let mut out = format!("range({}", quote(name));
            for bound in upper_bounds {
                let _ = write!(out, ", {bound}");
            }
            out.push(')');
            out
        }
        FieldPartitioner::Range { name, upper_bounds } => {
            let mut out = format!("range({}", quote(name));
            for bound in upper_bounds {
                let _ = write!(out, ", {}", quote(bound));
            }
            out.push(')');
            out
        }
        FieldPartitioner::Year { source, name }
        | FieldPartitioner::Month { source, name }
        | FieldPartitioner::Day { source, name }
        | FieldPartitioner::Hour { source, name }
        | FieldPartitioner::Minute { source, name } => {
            format!("{}({}, {})", fp.kind(), quote(source), quote(name))
        }
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::UNBOUNDED;

    #[test]
    fn single_hash_partitioner() {
        let expr = r#"hash("username", "username_part", 2)"#;
        let strategy = PartitionExpression::parse(expr).unwrap().evaluate().unwrap();

        let fps = strategy.field_partitioners();
        assert_eq!(fps.len(), 1);
        assert_eq!(fps[0].kind(), "hash");
        assert_eq!(fps[0].source_name(), "username");
        assert_eq!(fps[0].name(), "username_part");
        assert_eq!(fps[0].cardinality(), 2);

        assert_eq!(to_expression(&strategy), expr);
    }

    #[test]
    fn sub_partitioned_hash_strategy() {
        let expr = r#"[hash("username", "username_part", 2), hash("username2", "username2_part", 3)]"#;
        let strategy = PartitionExpression::parse(expr).unwrap().evaluate().unwrap();

        let fps = strategy.field_partitioners();
        assert_eq!(fps.len(), 2);
        assert_eq!(fps[0].name(), "username_part");
        assert_eq!(fps[0].cardinality(), 2);
        assert_eq!(fps[1].name(), "username2_part");
        assert_eq!(fps[1].cardinality(), 3);

        assert_eq!(to_expression(&strategy), expr);
    }

    #[test]
    fn mixed_calendar_strategy() {
        let expr = r#"[year("timestamp", "year"), minute("timestamp", "minute")]"#;
        let strategy = PartitionExpression::parse(expr).unwrap().evaluate().unwrap();

        let fps = strategy.field_partitioners();
        assert_eq!(fps[0], FieldPartitioner::year("timestamp", "year"));
        assert_eq!(fps[1], FieldPartitioner::minute("timestamp", "minute"));
        assert_eq!(fps[1].cardinality(), UNBOUNDED);

        assert_eq!(to_expression(&strategy), expr);
    }

    #[test]
    fn two_argument_hash_reads_its_own_field() {
        let strategy = PartitionExpression::parse(r#"hash("email", 3)"#)
            .unwrap()
            .evaluate()
            .unwrap();
        assert_eq!(
            strategy.field_partitioners()[0],
            FieldPartitioner::hash("email", 3).unwrap()
        );
        assert_eq!(to_expression(&strategy), r#"hash("email", "email", 3)"#);
    }

    #[test]
    fn range_variants_serialize_with_closing_paren() {
        let ints = PartitionStrategy::builder().range("age", &[18, 65, 120]).build().unwrap();
        assert_eq!(to_expression(&ints), r#"range("age", 18, 65, 120)"#);

        let strs = PartitionStrategy::builder()
            .range_str("last", &["g", "n", "z"])
            .identity("region", 0)
            .build()
            .unwrap();
        let text = to_expression(&strs);
        assert_eq!(text, r#"[range("last", "g", "n", "z"), identity("region", 0)]"#);
        assert_eq!(text.parse::<PartitionStrategy>().unwrap(), strs);
    }

    #[test]
    fn typed_identity_round_trips() {
        let expr = r#"[identity("id", "long", 0), identity("region", 4)]"#;
        let strategy: PartitionStrategy = expr.parse().unwrap();
        assert_eq!(
            strategy.field_partitioners()[0],
            FieldPartitioner::identity_typed("id", FieldType::Long, 0)
        );
        assert_eq!(strategy.field_partitioners()[1], FieldPartitioner::identity("region", 4));
        assert_eq!(to_expression(&strategy), expr);
        assert_eq!(
            r#"identity("id", "string", 0)"#.parse::<PartitionStrategy>().unwrap().to_expression(),
            r#"identity("id", 0)"#
        );

        let err = PartitionExpression::parse(r#"identity("id", "uuid", 0)"#)
            .unwrap()
            .evaluate()
            .unwrap_err();
        assert!(matches!(err, ExpressionError::ArgumentType { index: 1, .. }));
    }

    #[test]
    fn quotes_are_escaped() {
        let strategy = PartitionStrategy::builder()
            .identity(r#"we"ird\name"#, 0)
            .build()
            .unwrap();
        let text = to_expression(&strategy);
        assert_eq!(text, r#"identity("we\"ird\\name", 0)"#);
        assert_eq!(text.parse::<PartitionStrategy>().unwrap(), strategy);
    }

    #[test]
    fn unknown_function_is_rejected() {
        let err = PartitionExpression::parse(r#"bucket("a", 2)"#)
            .unwrap()
            .evaluate()
            .unwrap_err();
        assert_eq!(err, ExpressionError::UnknownFunction { name: "bucket".into() });
    }

    #[test]
    fn wrong_arity_is_rejected() {
        for expr in [
            r#"hash("a")"#,
            r#"hash("a", "b", "c", 2)"#,
            r#"year("ts")"#,
            r#"identity("a")"#,
            r#"identity("a", "long", 1, 2)"#,
            r#"range("a")"#,
        ] {
            let err = PartitionExpression::parse(expr).unwrap().evaluate().unwrap_err();
            assert!(matches!(err, ExpressionError::Arity { .. }), "{expr}: {err:?}");
        }
    }

    #[test]
    fn argument_types_are_not_coerced() {
        for expr in [
            r#"hash("a", "2")"#,
            r#"hash(1, 2)"#,
            r#"hash("a", -2)"#,
            r#"range("a", 1, "b")"#,
            r#"range("a", "b", 1)"#,
            r#"year("ts", hash("a", 1))"#,
        ] {
            let err = PartitionExpression::parse(expr).unwrap().evaluate().unwrap_err();
            assert!(matches!(err, ExpressionError::ArgumentType { .. }), "{expr}: {err:?}");
        }
    }

    #[test]
    fn wrong_result_shape_is_rejected() {
        for expr in [r#""hash""#, "42", "[]", r#"[hash("a", 2), 3]"#, r#"[[hash("a", 2)]]"#] {
            let err = PartitionExpression::parse(expr).unwrap().evaluate().unwrap_err();
            assert!(matches!(err, ExpressionError::InvalidResult { .. }), "{expr}: {err:?}");
        }
    }

    #[test]
    fn invalid_partitioner_arguments_surface_partition_errors() {
        let err = PartitionExpression::parse(r#"range("a", 10, 5)"#)
            .unwrap()
            .evaluate()
            .unwrap_err();
        assert!(matches!(err, ExpressionError::Partitioner { .. }));

        let err = PartitionExpression::parse(r#"hash("a", 0)"#)
            .unwrap()
            .evaluate()
            .unwrap_err();
        assert!(matches!(err, ExpressionError::Partitioner { .. }));
    }
}
