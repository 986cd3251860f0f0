/// Condition branch evaluation
///
/// Decides whether a branch's comparison rules hold against resolved
/// runtime values. Comparison is typed per operator category (string,
/// number, boolean) with explicit coercion; anything that fails to
/// coerce makes the rule evaluate to false. Rule evaluation can never
/// abort a run.

use crate::workflow::types::{
    BranchType, ConditionBranch, ConditionOperator, ConditionRule, LogicalOperator, SourceKey,
};
use serde_json::Value;

/// Evaluate a whole branch against a source resolver
///
/// Rules are combined with `all` (AND) or `any` (OR). An empty rule list
/// never matches for if/elseIf branches; an else branch always matches
/// when reached.
pub fn check_branch<F>(branch: &ConditionBranch, resolve: F) -> bool
where
    F: Fn(&SourceKey) -> Option<Value>,
{
    if branch.branch_type == BranchType::Else {
        return true;
    }
    if branch.conditions.is_empty() {
        return false;
    }
    match branch.logical_operator {
        LogicalOperator::And => branch.conditions.iter().all(|rule| {
            check_rule(rule, resolve(&rule.source).as_ref())
        }),
        LogicalOperator::Or => branch.conditions.iter().any(|rule| {
            check_rule(rule, resolve(&rule.source).as_ref())
        }),
    }
}

/// Evaluate a single rule against its resolved source value
///
/// Missing sources flow through the same coercions as `null`: they are
/// the empty string for string operators, non-numeric for numeric
/// operators, and falsy for boolean operators.
pub fn check_rule(rule: &ConditionRule, source: Option<&Value>) -> bool {
    let target = rule.value.as_ref();
    match rule.operator {
        ConditionOperator::Equals => loose_equals(source, target),
        ConditionOperator::NotEquals => !loose_equals(source, target),
        ConditionOperator::Contains => as_text(source).contains(&as_text(target)),
        ConditionOperator::NotContains => !as_text(source).contains(&as_text(target)),
        ConditionOperator::StartsWith => as_text(source).starts_with(&as_text(target)),
        ConditionOperator::EndsWith => as_text(source).ends_with(&as_text(target)),
        ConditionOperator::IsEmpty => as_text(source).is_empty(),
        ConditionOperator::IsNotEmpty => !as_text(source).is_empty(),
        ConditionOperator::GreaterThan => compare_numbers(source, target, |a, b| a > b),
        ConditionOperator::LessThan => compare_numbers(source, target, |a, b| a < b),
        ConditionOperator::GreaterThanOrEqual => compare_numbers(source, target, |a, b| a >= b),
        ConditionOperator::LessThanOrEqual => compare_numbers(source, target, |a, b| a <= b),
        ConditionOperator::IsTrue => is_truthy(source),
        ConditionOperator::IsFalse => !is_truthy(source),
    }
}

/// Numeric when both sides coerce to numbers, string otherwise
fn loose_equals(source: Option<&Value>, target: Option<&Value>) -> bool {
    if let (Some(a), Some(b)) = (as_number(source), as_number(target)) {
        return a == b;
    }
    as_text(source) == as_text(target)
}

/// Either side failing numeric coercion makes the comparison false
fn compare_numbers<F>(source: Option<&Value>, target: Option<&Value>, cmp: F) -> bool
where
    F: Fn(f64, f64) -> bool,
{
    match (as_number(source), as_number(target)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

/// String coercion: missing/null -> "", strings verbatim, everything
/// else via compact JSON serialization
fn as_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Numeric coercion: numbers directly, numeric strings parsed,
/// booleans as 0/1; anything else has no numeric value
fn as_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Truthiness: null, false, 0, "", empty arrays and empty objects are
/// falsy; everything else is truthy
fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(fields)) => !fields.is_empty(),
    }
}
