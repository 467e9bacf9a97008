//! Compiling JSON rule documents into sub-rules.
//!
//! ```text
//! {"detail": {"state": ["running", {"prefix": "stop"}]}, "size": [{"numeric": [">", 10]}]}
//! ```
//!
//! compiles into one [`SubRule`] with the fields `detail.state` (exact
//! `"running"` or prefix `"stop`) and `size` (greater than 10). A `$or` key
//! holds alternative objects and multiplies the sub-rules out:
//!
//! ```text
//! {"a": ["x"], "$or": [{"b": ["y"]}, {"c": ["z"]}]}  ->  {a, b} and {a, c}
//! ```

use serde_json::{Map, Number, Value};

use crate::error::{Result, RulerError};
use crate::event::encode_leaf;
use crate::pattern::{Pattern, Range};
use crate::sub_rule::SubRule;

const OR_KEY: &str = "$or";

fn invalid(message: impl Into<String>) -> RulerError {
    RulerError::InvalidRule(message.into())
}

/// Compile a rule document into its alternative sub-rules.
pub fn compile(json: &str) -> Result<Vec<SubRule>> {
    let value: Value = serde_json::from_str(json)?;
    let Value::Object(map) = value else {
        return Err(invalid("rule must be a JSON object"));
    };
    if map.is_empty() {
        return Err(invalid("rule must name at least one field"));
    }
    compile_object(&map, "")
}

fn compile_object(map: &Map<String, Value>, prefix: &str) -> Result<Vec<SubRule>> {
    let mut alternatives = vec![SubRule::new()];
    for (key, value) in map {
        let expanded = if key == OR_KEY {
            compile_or(value, prefix)?
        } else {
            let name = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", prefix, key)
            };
            match value {
                Value::Object(inner) => compile_object(inner, &name)?,
                Value::Array(items) => {
                    let mut sub_rule = SubRule::new();
                    sub_rule.insert(name, compile_patterns(items)?);
                    vec![sub_rule]
                }
                _ => {
                    return Err(invalid(format!(
                        "value of {} must be an object or an array",
                        name
                    )))
                }
            }
        };
        alternatives = product(&alternatives, &expanded)?;
    }
    Ok(alternatives)
}

fn compile_or(value: &Value, prefix: &str) -> Result<Vec<SubRule>> {
    let Value::Array(options) = value else {
        return Err(invalid("$or must be an array of objects"));
    };
    if options.is_empty() {
        return Err(invalid("$or must not be empty"));
    }
    let mut all = Vec::new();
    for option in options {
        let Value::Object(inner) = option else {
            return Err(invalid("$or must be an array of objects"));
        };
        for sub_rule in compile_object(inner, prefix)? {
            if !all.contains(&sub_rule) {
                all.push(sub_rule);
            }
        }
    }
    Ok(all)
}

/// Every pairing of one sub-rule from each side.
fn product(left: &[SubRule], right: &[SubRule]) -> Result<Vec<SubRule>> {
    let mut out = Vec::with_capacity(left.len() * right.len());
    for l in left {
        for r in right {
            let mut merged = l.clone();
            for (field, patterns) in r {
                if merged.insert(field.clone(), patterns.clone()).is_some() {
                    return Err(invalid(format!("field {} appears more than once", field)));
                }
            }
            if !out.contains(&merged) {
                out.push(merged);
            }
        }
    }
    Ok(out)
}

fn compile_patterns(items: &[Value]) -> Result<Vec<Pattern>> {
    if items.is_empty() {
        return Err(invalid("pattern list must not be empty"));
    }
    let mut patterns: Vec<Pattern> = Vec::with_capacity(items.len());
    for item in items {
        let pattern = match item {
            Value::Object(matcher) => compile_matcher(matcher)?,
            Value::Array(_) => return Err(invalid("pattern lists cannot be nested")),
            Value::Number(n) => number_pattern(n)?,
            leaf => Pattern::exact(encode_leaf(leaf)),
        };
        if !patterns.contains(&pattern) {
            patterns.push(pattern);
        }
    }
    Ok(patterns)
}

fn number_pattern(n: &Number) -> Result<Pattern> {
    match n.as_f64() {
        Some(f) if f.is_finite() => Pattern::numeric_eq(f),
        _ => Ok(Pattern::exact(n.to_string())),
    }
}

fn quoted(s: &str) -> String {
    format!("\"{}\"", s)
}

fn string_operand<'v>(key: &str, value: &'v Value) -> Result<&'v str> {
    value
        .as_str()
        .ok_or_else(|| invalid(format!("{} takes a string", key)))
}

fn compile_matcher(matcher: &Map<String, Value>) -> Result<Pattern> {
    let mut entries = matcher.iter();
    let (Some((key, operand)), None) = (entries.next(), entries.next()) else {
        return Err(invalid("a matcher object must have exactly one key"));
    };
    match key.as_str() {
        "exactly" => match operand {
            Value::Object(_) | Value::Array(_) => Err(invalid("exactly takes a scalar")),
            leaf => Ok(Pattern::exact(encode_leaf(leaf))),
        },
        "prefix" => match operand {
            Value::String(s) => Ok(Pattern::prefix(format!("\"{}", s))),
            Value::Object(inner) => {
                let s = ignore_case_operand("prefix", inner)?;
                Ok(Pattern::prefix_equals_ignore_case(format!("\"{}", s)))
            }
            _ => Err(invalid("prefix takes a string or {\"equals-ignore-case\": ...}")),
        },
        "suffix" => match operand {
            Value::String(s) => Ok(Pattern::suffix(format!("{}\"", s))),
            Value::Object(inner) => {
                let s = ignore_case_operand("suffix", inner)?;
                Ok(Pattern::suffix_equals_ignore_case(format!("{}\"", s)))
            }
            _ => Err(invalid("suffix takes a string or {\"equals-ignore-case\": ...}")),
        },
        "equals-ignore-case" => Ok(Pattern::equals_ignore_case(quoted(string_operand(
            key, operand,
        )?))),
        "wildcard" => Pattern::wildcard(quoted(string_operand(key, operand)?)),
        "numeric" => compile_numeric(operand),
        "cidr" => Ok(Pattern::range(Range::cidr(string_operand(key, operand)?)?)),
        "anything-but" => compile_anything_but(operand),
        "exists" => match operand {
            Value::Bool(true) => Ok(Pattern::exists()),
            Value::Bool(false) => Ok(Pattern::absent()),
            _ => Err(invalid("exists takes true or false")),
        },
        other => Err(invalid(format!("unknown matcher {}", other))),
    }
}

fn ignore_case_operand<'v>(key: &str, inner: &'v Map<String, Value>) -> Result<&'v str> {
    match (inner.len(), inner.get("equals-ignore-case")) {
        (1, Some(Value::String(s))) => Ok(s),
        _ => Err(invalid(format!(
            "{} only accepts {{\"equals-ignore-case\": <string>}}",
            key
        ))),
    }
}

fn compile_numeric(operand: &Value) -> Result<Pattern> {
    let Value::Array(ops) = operand else {
        return Err(invalid("numeric takes an operator list"));
    };
    if ops.is_empty() || ops.len() % 2 != 0 {
        return Err(invalid("numeric takes operator and number pairs"));
    }

    let mut equal = None;
    let mut lower: Option<(f64, bool)> = None;
    let mut upper: Option<(f64, bool)> = None;
    for pair in ops.chunks(2) {
        let op = pair[0]
            .as_str()
            .ok_or_else(|| invalid("numeric operators must be strings"))?;
        let value = pair[1]
            .as_f64()
            .filter(|f| f.is_finite())
            .ok_or_else(|| invalid(format!("numeric operand of {} must be a number", op)))?;
        let slot = match op {
            "=" => {
                equal = Some(value);
                continue;
            }
            ">" | ">=" => &mut lower,
            "<" | "<=" => &mut upper,
            _ => return Err(invalid(format!("unknown numeric operator {}", op))),
        };
        if slot.is_some() {
            return Err(invalid(format!("more than one {} bound", op)));
        }
        *slot = Some((value, op.len() == 1));
    }

    match (equal, lower, upper) {
        (Some(value), None, None) if ops.len() == 2 => Pattern::numeric_eq(value),
        (Some(_), _, _) => Err(invalid("= cannot be combined with other operators")),
        (None, lower, upper) => {
            let (bottom, open_bottom) = lower.unwrap_or((-f64::MAX, false));
            let (top, open_top) = upper.unwrap_or((f64::MAX, false));
            Ok(Pattern::range(Range::between(bottom, open_bottom, top, open_top)?))
        }
    }
}

fn compile_anything_but(operand: &Value) -> Result<Pattern> {
    match operand {
        Value::String(s) => Ok(Pattern::anything_but([quoted(s)])),
        Value::Number(n) => Pattern::anything_but_numbers([n
            .as_f64()
            .ok_or_else(|| invalid("anything-but number out of range"))?]),
        Value::Array(items) if items.is_empty() => Err(invalid("anything-but list must not be empty")),
        Value::Array(items) if items.iter().all(Value::is_string) => Ok(Pattern::anything_but(
            items.iter().filter_map(Value::as_str).map(quoted),
        )),
        Value::Array(items) if items.iter().all(Value::is_number) => {
            Pattern::anything_but_numbers(items.iter().filter_map(Value::as_f64))
        }
        Value::Object(inner) => {
            let mut entries = inner.iter();
            let (Some((key, value)), None) = (entries.next(), entries.next()) else {
                return Err(invalid("anything-but object must have exactly one key"));
            };
            let values = string_list(key, value)?;
            match key.as_str() {
                "prefix" => Ok(Pattern::anything_but_prefix(
                    values.iter().map(|s| format!("\"{}", s)),
                )),
                "suffix" => Ok(Pattern::anything_but_suffix(
                    values.iter().map(|s| format!("{}\"", s)),
                )),
                "equals-ignore-case" => Ok(Pattern::anything_but_ignore_case(
                    values.iter().map(|s| quoted(s)),
                )),
                "wildcard" => Pattern::anything_but_wildcard(values.iter().map(|s| quoted(s))),
                other => Err(invalid(format!("unknown anything-but matcher {}", other))),
            }
        }
        _ => Err(invalid(
            "anything-but takes a string, a number, a list of either, or a matcher object",
        )),
    }
}

fn string_list<'v>(key: &str, value: &'v Value) -> Result<Vec<&'v str>> {
    let values: Vec<&str> = match value {
        Value::String(s) => vec![s.as_str()],
        Value::Array(items) => items
            .iter()
            .map(|item| string_operand(key, item))
            .collect::<Result<_>>()?,
        _ => return Err(invalid(format!("{} takes a string or a list of strings", key))),
    };
    if values.is_empty() {
        return Err(invalid(format!("{} list must not be empty", key)));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(json: &str) -> SubRule {
        let mut rules = compile(json).unwrap();
        assert_eq!(rules.len(), 1);
        rules.remove(0)
    }

    #[test]
    fn test_literals() {
        let rule = single(r#"{"a": ["x", true, null, 5]}"#);
        assert_eq!(
            rule["a"],
            vec![
                Pattern::exact("\"x\""),
                Pattern::exact("true"),
                Pattern::exact("null"),
                Pattern::numeric_eq(5.0).unwrap(),
            ]
        );
    }

    #[test]
    fn test_nested_names_and_matchers() {
        let rule = single(
            r#"{"detail": {"state": [{"prefix": "sto"}, {"suffix": {"equals-ignore-case": "ED"}}]},
                "ip": [{"cidr": "10.0.0.0/8"}],
                "gone": [{"exists": false}]}"#,
        );
        assert_eq!(
            rule["detail.state"],
            vec![
                Pattern::prefix("\"sto"),
                Pattern::suffix_equals_ignore_case("ED\""),
            ]
        );
        assert_eq!(rule["ip"], vec![Pattern::range(Range::cidr("10.0.0.0/8").unwrap())]);
        assert_eq!(rule["gone"], vec![Pattern::absent()]);
        let names: Vec<&String> = rule.keys().collect();
        assert_eq!(names, vec!["detail.state", "gone", "ip"]);
    }

    #[test]
    fn test_numeric() {
        let rule = single(r#"{"n": [{"numeric": [">", 10, "<=", 20]}, {"numeric": ["=", 3]}]}"#);
        assert_eq!(
            rule["n"],
            vec![
                Pattern::range(Range::between(10.0, true, 20.0, false).unwrap()),
                Pattern::numeric_eq(3.0).unwrap(),
            ]
        );
        let rule = single(r#"{"n": [{"numeric": ["<", 0]}]}"#);
        assert_eq!(rule["n"], vec![Pattern::range(Range::less_than(0.0).unwrap())]);

        for bad in [
            r#"{"n": [{"numeric": [">", 1, ">", 2]}]}"#,
            r#"{"n": [{"numeric": ["=", 1, "<", 2]}]}"#,
            r#"{"n": [{"numeric": ["~", 1]}]}"#,
            r#"{"n": [{"numeric": [">"]}]}"#,
        ] {
            assert!(compile(bad).is_err(), "{}", bad);
        }
        assert!(matches!(
            compile(r#"{"n": [{"numeric": [">", 5, "<", 1]}]}"#),
            Err(RulerError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_anything_but_forms() {
        let rule = single(
            r#"{"a": [{"anything-but": ["x", "y"]}],
                "b": [{"anything-but": 5}],
                "c": [{"anything-but": {"prefix": "in"}}],
                "d": [{"anything-but": {"wildcard": ["a*", "b*"]}}]}"#,
        );
        assert_eq!(rule["a"], vec![Pattern::anything_but(["\"x\"", "\"y\""])]);
        assert_eq!(rule["b"], vec![Pattern::anything_but_numbers([5.0]).unwrap()]);
        assert_eq!(rule["c"], vec![Pattern::anything_but_prefix(["\"in"])]);
        assert_eq!(
            rule["d"],
            vec![Pattern::anything_but_wildcard(["\"a*\"", "\"b*\""]).unwrap()]
        );
        assert!(compile(r#"{"a": [{"anything-but": ["x", 1]}]}"#).is_err());
        assert!(compile(r#"{"a": [{"anything-but": []}]}"#).is_err());
    }

    #[test]
    fn test_or_expands() {
        let rules = compile(r#"{"a": ["x"], "$or": [{"b": ["y"]}, {"c": ["z"]}]}"#).unwrap();
        assert_eq!(rules.len(), 2);
        assert!(rules.iter().all(|r| r.contains_key("a")));
        assert!(rules[0].contains_key("b") && !rules[0].contains_key("c"));
        assert!(rules[1].contains_key("c"));

        let nested = compile(
            r#"{"$or": [{"a": ["1"]}, {"$or": [{"b": ["2"]}, {"c": ["3"]}]}], "d": ["4"]}"#,
        )
        .unwrap();
        assert_eq!(nested.len(), 3);
    }

    #[test]
    fn test_invalid_rules() {
        for bad in [
            r#"[]"#,
            r#"{}"#,
            r#"{"a": "x"}"#,
            r#"{"a": []}"#,
            r#"{"a": [["x"]]}"#,
            r#"{"a": [{"bogus": 1}]}"#,
            r#"{"a": [{"prefix": 1}]}"#,
            r#"{"a": [{"exists": "yes"}]}"#,
            r#"{"a": [{"prefix": "x", "suffix": "y"}]}"#,
            r#"{"$or": []}"#,
            r#"{"a": ["x"], "$or": [{"a": ["y"]}, {"b": ["z"]}]}"#,
        ] {
            assert!(compile(bad).is_err(), "{}", bad);
        }
    }
}
