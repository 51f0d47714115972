//! Condition compiler: translates the structural [`Query`] into a predicate
//! specification the statement builder can merge into SQL.
//!
//! Column names are converted from API camelCase to storage snake_case here,
//! so everything downstream speaks storage naming.

use serde_json::Value;

use crate::case::to_snake_case;
use crate::error::AppError;
use crate::query::{Condition, Connect, Operator, Query, Sort};

/// One bound parameter with the column it belongs to, so the builder can apply
/// the column's semantic-type cast when numbering placeholders.
#[derive(Clone, Debug)]
pub struct BoundParam {
    pub column: String,
    pub value: Value,
}

/// Compiled predicate/sort specification. `where_sql` uses `?` markers, one per
/// entry of `params`, replaced with `$n` placeholders by the builder.
#[derive(Clone, Debug, Default)]
pub struct CompiledQuery {
    pub columns: Vec<String>,
    pub where_sql: String,
    pub params: Vec<BoundParam>,
    pub order_by: Vec<(String, Sort)>,
}

/// Compile a query: convert requested columns and sort keys to storage naming,
/// then walk the condition list in order. The first condition is always a
/// top-level AND term; for i > 0 the current condition's connector decides
/// whether the predicate joins as `OR (...)` or `AND (...)`.
pub fn compile(query: &Query) -> Result<CompiledQuery, AppError> {
    query.validate()?;

    let mut compiled = CompiledQuery {
        columns: query.columns.iter().map(|c| to_snake_case(c)).collect(),
        order_by: query
            .order_by
            .iter()
            .map(|(c, s)| (to_snake_case(c), *s))
            .collect(),
        ..Default::default()
    };

    for (i, condition) in query.conditions.iter().enumerate() {
        let predicate = compile_condition(condition, &mut compiled.params)?;
        if i == 0 {
            compiled.where_sql = format!("({})", predicate);
        } else if condition.connect == Connect::Or {
            compiled.where_sql.push_str(&format!(" OR ({})", predicate));
        } else {
            compiled.where_sql.push_str(&format!(" AND ({})", predicate));
        }
    }
    Ok(compiled)
}

fn compile_condition(
    condition: &Condition,
    params: &mut Vec<BoundParam>,
) -> Result<String, AppError> {
    let column = to_snake_case(&condition.column);
    check_params(condition)?;
    let quoted = quote_ident(&column);
    let mut push = |value: Value| {
        params.push(BoundParam {
            column: column.clone(),
            value,
        })
    };

    Ok(match condition.operator {
        Operator::Equal => {
            push(condition.params[0].clone());
            format!("{} = ?", quoted)
        }
        Operator::NotEqual => {
            push(condition.params[0].clone());
            format!("{} <> ?", quoted)
        }
        Operator::Less => {
            push(condition.params[0].clone());
            format!("{} < ?", quoted)
        }
        Operator::LessEqual => {
            push(condition.params[0].clone());
            format!("{} <= ?", quoted)
        }
        Operator::Great => {
            push(condition.params[0].clone());
            format!("{} > ?", quoted)
        }
        Operator::GreatEqual => {
            push(condition.params[0].clone());
            format!("{} >= ?", quoted)
        }
        Operator::Like => {
            push(like_param(&condition.params[0]));
            format!("{} LIKE ?", quoted)
        }
        Operator::NotLike => {
            push(like_param(&condition.params[0]));
            format!("{} NOT LIKE ?", quoted)
        }
        Operator::IsNull => format!("{} IS NULL", quoted),
        Operator::IsNotNull => format!("{} IS NOT NULL", quoted),
        Operator::In | Operator::NotIn => {
            let markers = vec!["?"; condition.params.len()].join(", ");
            for value in &condition.params {
                push(value.clone());
            }
            let keyword = if condition.operator == Operator::In {
                "IN"
            } else {
                "NOT IN"
            };
            format!("{} {} ({})", quoted, keyword, markers)
        }
        Operator::Between | Operator::NotBetween => {
            push(condition.params[0].clone());
            push(condition.params[1].clone());
            let keyword = if condition.operator == Operator::Between {
                "BETWEEN"
            } else {
                "NOT BETWEEN"
            };
            format!("{} {} ? AND ?", quoted, keyword)
        }
    })
}

/// Parameter-count mismatches are a caller error; they are reported before any
/// storage call instead of panicking on a missing index.
fn check_params(condition: &Condition) -> Result<(), AppError> {
    let got = condition.params.len();
    let ok = match condition.operator.required_params() {
        Some(required) => got >= required,
        None => got >= 1,
    };
    if ok {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "operator {:?} on column '{}' requires {} parameter(s), got {}",
            condition.operator,
            condition.column,
            condition
                .operator
                .required_params()
                .map(|n| n.to_string())
                .unwrap_or_else(|| "at least 1".into()),
            got
        )))
    }
}

/// LIKE parameters are wrapped in `%...%`.
fn like_param(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(format!("%{}%", s)),
        other => Value::String(format!("%{}%", other)),
    }
}

/// Quote identifier for PostgreSQL (safe: names are regex-validated upstream).
pub fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_condition_is_top_level_and() {
        let query = Query::new().eq("userName", "a");
        let compiled = compile(&query).unwrap();
        assert_eq!(compiled.where_sql, "(\"user_name\" = ?)");
        assert_eq!(compiled.params[0].column, "user_name");
    }

    #[test]
    fn connector_grouping() {
        let query = Query::new()
            .eq("a", 1)
            .condition(Condition::new("b").connect(Connect::Or).param(2))
            .eq("c", 3);
        let compiled = compile(&query).unwrap();
        assert_eq!(
            compiled.where_sql,
            "(\"a\" = ?) OR (\"b\" = ?) AND (\"c\" = ?)"
        );
    }

    #[test]
    fn between_compiles_to_range_predicate() {
        let query = Query::new().condition(
            Condition::new("age")
                .operator(Operator::Between)
                .params(vec![json!(18), json!(30)]),
        );
        let compiled = compile(&query).unwrap();
        assert_eq!(compiled.where_sql, "(\"age\" BETWEEN ? AND ?)");
        assert_eq!(compiled.params.len(), 2);
        assert_eq!(compiled.params[0].value, json!(18));
        assert_eq!(compiled.params[1].value, json!(30));
    }

    #[test]
    fn in_list_expands_markers() {
        let query = Query::new().condition(
            Condition::new("id")
                .operator(Operator::In)
                .params(vec![json!(1), json!(2), json!(3)]),
        );
        let compiled = compile(&query).unwrap();
        assert_eq!(compiled.where_sql, "(\"id\" IN (?, ?, ?))");
        assert_eq!(compiled.params.len(), 3);
    }

    #[test]
    fn like_wraps_parameter() {
        let query = Query::new()
            .condition(Condition::new("name").operator(Operator::Like).param("ab"));
        let compiled = compile(&query).unwrap();
        assert_eq!(compiled.where_sql, "(\"name\" LIKE ?)");
        assert_eq!(compiled.params[0].value, json!("%ab%"));
    }

    #[test]
    fn null_checks_take_no_params() {
        let query = Query::new()
            .condition(Condition::new("extra").operator(Operator::IsNull));
        let compiled = compile(&query).unwrap();
        assert_eq!(compiled.where_sql, "(\"extra\" IS NULL)");
        assert!(compiled.params.is_empty());
    }

    #[test]
    fn missing_params_are_a_validation_error() {
        let query = Query::new()
            .condition(Condition::new("age").operator(Operator::Between).param(18));
        let err = compile(&query).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn sort_keys_converted_to_storage_naming() {
        let query = Query::new()
            .order("updateTime", Sort::Desc)
            .order("id", Sort::Asc);
        let compiled = compile(&query).unwrap();
        assert_eq!(compiled.order_by[0].0, "update_time");
        assert_eq!(compiled.order_by[1].0, "id");
    }
}
