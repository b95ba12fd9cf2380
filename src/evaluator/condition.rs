use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::RunContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    Is,
    IsNot,
    Contains,
    NotContains,
    Empty,
    NotEmpty,
    Equal,
    NotEqual,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

/// A single comparison against a context selector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub selector: String,
    pub operator: ComparisonOperator,
    #[serde(default)]
    pub value: Value,
}

/// A boolean predicate over the run context: a list of conditions combined
/// with and/or logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Predicate {
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub logic: LogicalOperator,
}

/// Evaluate a predicate against the context. A missing selector resolves
/// to null rather than erroring, matching the emptiness operators.
pub fn evaluate_predicate(predicate: &Predicate, ctx: &RunContext) -> bool {
    match predicate.logic {
        LogicalOperator::And => predicate
            .conditions
            .iter()
            .all(|cond| evaluate_condition(cond, ctx)),
        LogicalOperator::Or => predicate
            .conditions
            .iter()
            .any(|cond| evaluate_condition(cond, ctx)),
    }
}

fn evaluate_condition(cond: &Condition, ctx: &RunContext) -> bool {
    let actual = ctx.get(&cond.selector).cloned().unwrap_or(Value::Null);
    let expected = &cond.value;

    match cond.operator {
        ComparisonOperator::Is => value_to_string(&actual) == value_to_string(expected),
        ComparisonOperator::IsNot => value_to_string(&actual) != value_to_string(expected),
        ComparisonOperator::Contains => eval_contains(&actual, expected),
        ComparisonOperator::NotContains => !eval_contains(&actual, expected),
        ComparisonOperator::Empty => is_empty(&actual),
        ComparisonOperator::NotEmpty => !is_empty(&actual),
        ComparisonOperator::Equal => match (value_to_f64(&actual), value_to_f64(expected)) {
            (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
            _ => false,
        },
        ComparisonOperator::NotEqual => match (value_to_f64(&actual), value_to_f64(expected)) {
            (Some(a), Some(b)) => (a - b).abs() >= f64::EPSILON,
            _ => true,
        },
        ComparisonOperator::GreaterThan => compare(&actual, expected, |a, b| a > b),
        ComparisonOperator::LessThan => compare(&actual, expected, |a, b| a < b),
        ComparisonOperator::GreaterOrEqual => compare(&actual, expected, |a, b| a >= b),
        ComparisonOperator::LessOrEqual => compare(&actual, expected, |a, b| a <= b),
    }
}

fn compare(actual: &Value, expected: &Value, op: impl Fn(f64, f64) -> bool) -> bool {
    match (value_to_f64(actual), value_to_f64(expected)) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn value_to_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn is_empty(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn eval_contains(actual: &Value, expected: &Value) -> bool {
    let needle = value_to_string(expected);
    match actual {
        Value::String(s) => s.contains(&needle),
        Value::Array(items) => items.iter().any(|item| value_to_string(item) == needle),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx_with(key: &str, value: Value) -> RunContext {
        let mut ctx = RunContext::new();
        ctx.set(key, value);
        ctx
    }

    fn cond(selector: &str, operator: ComparisonOperator, value: Value) -> Condition {
        Condition {
            selector: selector.into(),
            operator,
            value,
        }
    }

    fn single(condition: Condition) -> Predicate {
        Predicate {
            conditions: vec![condition],
            logic: LogicalOperator::And,
        }
    }

    #[test]
    fn test_is() {
        let ctx = ctx_with("n", json!({"x": "hello"}));
        assert!(evaluate_predicate(
            &single(cond("n.x", ComparisonOperator::Is, json!("hello"))),
            &ctx
        ));
    }

    #[test]
    fn test_is_not() {
        let ctx = ctx_with("n", json!({"x": "hello"}));
        assert!(evaluate_predicate(
            &single(cond("n.x", ComparisonOperator::IsNot, json!("world"))),
            &ctx
        ));
    }

    #[test]
    fn test_contains_string_and_array() {
        let ctx = ctx_with("n", json!({"text": "hello world", "tags": ["a", "b"]}));
        assert!(evaluate_predicate(
            &single(cond("n.text", ComparisonOperator::Contains, json!("world"))),
            &ctx
        ));
        assert!(evaluate_predicate(
            &single(cond("n.tags", ComparisonOperator::Contains, json!("b"))),
            &ctx
        ));
        assert!(evaluate_predicate(
            &single(cond("n.tags", ComparisonOperator::NotContains, json!("c"))),
            &ctx
        ));
    }

    #[test]
    fn test_empty_on_missing_selector() {
        let ctx = RunContext::new();
        assert!(evaluate_predicate(
            &single(cond("nope.x", ComparisonOperator::Empty, Value::Null)),
            &ctx
        ));
        assert!(!evaluate_predicate(
            &single(cond("nope.x", ComparisonOperator::NotEmpty, Value::Null)),
            &ctx
        ));
    }

    #[test]
    fn test_numeric_comparisons() {
        let ctx = ctx_with("n", json!({"score": 75}));
        assert!(evaluate_predicate(
            &single(cond("n.score", ComparisonOperator::GreaterThan, json!(60))),
            &ctx
        ));
        assert!(!evaluate_predicate(
            &single(cond("n.score", ComparisonOperator::LessThan, json!(60))),
            &ctx
        ));
        assert!(evaluate_predicate(
            &single(cond("n.score", ComparisonOperator::GreaterOrEqual, json!(75))),
            &ctx
        ));
        assert!(evaluate_predicate(
            &single(cond("n.score", ComparisonOperator::LessOrEqual, json!(75))),
            &ctx
        ));
        assert!(evaluate_predicate(
            &single(cond("n.score", ComparisonOperator::Equal, json!(75))),
            &ctx
        ));
        assert!(evaluate_predicate(
            &single(cond("n.score", ComparisonOperator::NotEqual, json!(76))),
            &ctx
        ));
    }

    #[test]
    fn test_string_numeric_coercion() {
        let ctx = ctx_with("n", json!({"count": "42"}));
        assert!(evaluate_predicate(
            &single(cond("n.count", ComparisonOperator::GreaterThan, json!("10"))),
            &ctx
        ));
    }

    #[test]
    fn test_and_logic() {
        let ctx = ctx_with("n", json!({"x": 10}));
        let predicate = Predicate {
            conditions: vec![
                cond("n.x", ComparisonOperator::GreaterThan, json!(5)),
                cond("n.x", ComparisonOperator::LessThan, json!(20)),
            ],
            logic: LogicalOperator::And,
        };
        assert!(evaluate_predicate(&predicate, &ctx));
    }

    #[test]
    fn test_or_logic() {
        let ctx = ctx_with("n", json!({"x": 3}));
        let predicate = Predicate {
            conditions: vec![
                cond("n.x", ComparisonOperator::GreaterThan, json!(5)),
                cond("n.x", ComparisonOperator::LessThan, json!(5)),
            ],
            logic: LogicalOperator::Or,
        };
        assert!(evaluate_predicate(&predicate, &ctx));
    }

    #[test]
    fn test_and_fails_on_one_false() {
        let ctx = ctx_with("n", json!({"x": 3}));
        let predicate = Predicate {
            conditions: vec![
                cond("n.x", ComparisonOperator::GreaterThan, json!(5)),
                cond("n.x", ComparisonOperator::LessThan, json!(20)),
            ],
            logic: LogicalOperator::And,
        };
        assert!(!evaluate_predicate(&predicate, &ctx));
    }
}
