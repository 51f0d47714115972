//! Backend-neutral query structure: requested columns, an ordered condition
//! list and an ordered sort specification. Compiled into SQL by [`crate::sql`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

use crate::error::AppError;

pub const MAX_COLUMNS: usize = 100;
pub const MAX_CONDITIONS: usize = 50;
pub const MAX_ORDER_BY: usize = 10;

/// How a condition joins with the previous one in the list. Ignored for the
/// first condition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Connect {
    #[default]
    And,
    Or,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sort {
    #[default]
    Asc,
    Desc,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    #[default]
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Great,
    GreatEqual,
    Like,
    NotLike,
    IsNull,
    IsNotNull,
    In,
    NotIn,
    Between,
    NotBetween,
}

impl Operator {
    /// Required parameter cardinality: None means "one or more" (IN lists).
    pub fn required_params(&self) -> Option<usize> {
        match self {
            Operator::IsNull | Operator::IsNotNull => Some(0),
            Operator::Between | Operator::NotBetween => Some(2),
            Operator::In | Operator::NotIn => None,
            _ => Some(1),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub connect: Connect,
    pub column: String,
    #[serde(default)]
    pub operator: Operator,
    #[serde(default, rename = "paramList")]
    pub params: Vec<Value>,
}

impl Condition {
    pub fn new(column: impl Into<String>) -> Self {
        Condition {
            column: column.into(),
            ..Default::default()
        }
    }

    pub fn operator(mut self, operator: Operator) -> Self {
        self.operator = operator;
        self
    }

    pub fn connect(mut self, connect: Connect) -> Self {
        self.connect = connect;
        self
    }

    pub fn param(mut self, param: impl Into<Value>) -> Self {
        self.params.push(param.into());
        self
    }

    pub fn params(mut self, params: Vec<Value>) -> Self {
        self.params.extend(params);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Requested output columns; empty means all.
    #[serde(default, rename = "columnList")]
    pub columns: Vec<String>,
    #[serde(default, rename = "conditionList")]
    pub conditions: Vec<Condition>,
    /// Order-preserving (column, direction) pairs.
    #[serde(default, rename = "orderMap", with = "order_map")]
    pub order_by: Vec<(String, Sort)>,
}

impl Query {
    pub fn new() -> Self {
        Query::default()
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.columns.push(column.into());
        self
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Shorthand for an AND-equality condition.
    pub fn eq(self, column: impl Into<String>, param: impl Into<Value>) -> Self {
        self.condition(Condition::new(column).param(param))
    }

    pub fn order(mut self, column: impl Into<String>, sort: Sort) -> Self {
        self.order_by.push((column.into(), sort));
        self
    }

    /// Check size limits and column-name shape for every referenced column.
    /// All violations are aggregated into a single message joined by "; ".
    pub fn validate(&self) -> Result<(), AppError> {
        let mut messages = Vec::new();
        if self.columns.len() > MAX_COLUMNS {
            messages.push(format!("at most {} columns may be selected", MAX_COLUMNS));
        }
        if self.conditions.len() > MAX_CONDITIONS {
            messages.push(format!("at most {} conditions are allowed", MAX_CONDITIONS));
        }
        if self.order_by.len() > MAX_ORDER_BY {
            messages.push(format!("at most {} sort keys are allowed", MAX_ORDER_BY));
        }
        for condition in &self.conditions {
            if !valid_column_name(&condition.column) {
                messages.push(format!("invalid column name '{}'", condition.column));
            }
        }
        for column in &self.columns {
            if !valid_column_name(column) {
                messages.push(format!("invalid column name '{}'", column));
            }
        }
        for (column, _) in &self.order_by {
            if !valid_column_name(column) {
                messages.push(format!("invalid column name '{}'", column));
            }
        }
        if messages.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(messages.join("; ")))
        }
    }
}

pub fn valid_column_name(name: &str) -> bool {
    static COLUMN_RE: OnceLock<Regex> = OnceLock::new();
    let re = COLUMN_RE.get_or_init(|| Regex::new("^[A-Za-z_][A-Za-z0-9_]*$").unwrap());
    re.is_match(name)
}

/// `orderMap` travels as a JSON object; object key order is preserved by
/// serde_json's map, so the pairs keep their request order.
mod order_map {
    use super::Sort;
    use serde::de::Deserializer;
    use serde::ser::{SerializeMap, Serializer};
    use serde::Deserialize;
    use serde_json::{Map, Value};

    pub fn serialize<S: Serializer>(
        pairs: &[(String, Sort)],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(pairs.len()))?;
        for (column, sort) in pairs {
            map.serialize_entry(column, sort)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<(String, Sort)>, D::Error> {
        let raw = Map::<String, Value>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(column, v)| {
                let sort: Sort =
                    serde_json::from_value(v).map_err(serde::de::Error::custom)?;
                Ok((column, sort))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validate_aggregates_messages() {
        let query = Query::new()
            .condition(Condition::new("user-name"))
            .condition(Condition::new("1bad"));
        let message = query.validate().unwrap_err().to_string();
        assert!(message.contains("'user-name'"));
        assert!(message.contains("'1bad'"));
        assert!(message.contains("; "));
    }

    #[test]
    fn validate_limits() {
        let mut query = Query::new();
        for i in 0..(MAX_CONDITIONS + 1) {
            query.conditions.push(Condition::new(format!("c{}", i)));
        }
        assert!(query.validate().is_err());
    }

    #[test]
    fn deserializes_wire_shape() {
        let query: Query = serde_json::from_value(json!({
            "columnList": ["userName"],
            "orderMap": {"updateTime": "DESC", "id": "ASC"},
            "conditionList": [
                {"column": "age", "operator": "BETWEEN", "paramList": [18, 30]},
                {"connect": "OR", "column": "vip", "paramList": [1]}
            ]
        }))
        .unwrap();
        assert_eq!(query.columns, vec!["userName"]);
        assert_eq!(query.order_by[0], ("updateTime".into(), Sort::Desc));
        assert_eq!(query.order_by[1], ("id".into(), Sort::Asc));
        assert_eq!(query.conditions[0].operator, Operator::Between);
        assert_eq!(query.conditions[1].connect, Connect::Or);
        assert!(query.validate().is_ok());
    }

    #[test]
    fn unknown_operator_is_rejected_at_the_boundary() {
        let out: Result<Condition, _> =
            serde_json::from_value(json!({"column": "a", "operator": "REGEXP"}));
        assert!(out.is_err());
    }

    #[test]
    fn operator_cardinality() {
        assert_eq!(Operator::IsNull.required_params(), Some(0));
        assert_eq!(Operator::Equal.required_params(), Some(1));
        assert_eq!(Operator::Between.required_params(), Some(2));
        assert_eq!(Operator::In.required_params(), None);
    }
}
