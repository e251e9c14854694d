//! Filter expressions shared by the remote and local read paths.
//!
//! A [`Filter`] is plain data. The remote client compiles it to
//! PostgREST-style query parameters with [`Filter::to_query_pairs`]; the
//! local fallback evaluates it over rows with [`Filter::apply`]. Both
//! interpretations follow the same rules so a caller gets the same answer
//! from either backend.

use std::cmp::Ordering;

use serde_json::Value;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Op {
    fn as_str(self) -> &'static str {
        match self {
            Op::Eq => "eq",
            Op::Neq => "neq",
            Op::Gt => "gt",
            Op::Gte => "gte",
            Op::Lt => "lt",
            Op::Lte => "lte",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "eq" => Some(Op::Eq),
            "neq" => Some(Op::Neq),
            "gt" => Some(Op::Gt),
            "gte" => Some(Op::Gte),
            "lt" => Some(Op::Lt),
            "lte" => Some(Op::Lte),
            _ => None,
        }
    }

    fn accepts(self, ord: Ordering) -> bool {
        match self {
            Op::Eq => ord == Ordering::Equal,
            Op::Neq => ord != Ordering::Equal,
            Op::Gt => ord == Ordering::Greater,
            Op::Gte => ord != Ordering::Less,
            Op::Lt => ord == Ordering::Less,
            Op::Lte => ord != Ordering::Greater,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: Op,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub field: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub conditions: Vec<Condition>,
    pub order: Vec<Order>,
    pub limit: Option<usize>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, op: Op, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Op::Eq, value)
    }

    pub fn neq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Op::Neq, value)
    }

    pub fn gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Op::Gt, value)
    }

    pub fn gte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Op::Gte, value)
    }

    pub fn lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Op::Lt, value)
    }

    pub fn lte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Op::Lte, value)
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order.push(Order {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Compiles to remote query parameters, e.g. `status=eq.present`,
    /// `order=date.desc`, `limit=20`.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .conditions
            .iter()
            .map(|c| {
                let rendered = match (c.op, &c.value) {
                    (Op::Eq, Value::Null) => "is.null".to_string(),
                    (Op::Neq, Value::Null) => "not.is.null".to_string(),
                    (op, value) => format!("{}.{}", op.as_str(), render_value(value)),
                };
                (c.field.clone(), rendered)
            })
            .collect();

        if !self.order.is_empty() {
            let order = self
                .order
                .iter()
                .map(|o| match o.direction {
                    Direction::Asc => format!("{}.asc", o.field),
                    Direction::Desc => format!("{}.desc", o.field),
                })
                .collect::<Vec<_>>()
                .join(",");
            pairs.push(("order".to_string(), order));
        }

        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }

        pairs
    }

    /// Parses the syntax produced by [`Filter::to_query_pairs`]. Operand
    /// values stay strings; the evaluator coerces them against the field.
    pub fn from_query_pairs<I, K, V>(pairs: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut filter = Filter::new();

        for (key, raw) in pairs {
            let (key, raw) = (key.as_ref(), raw.as_ref());
            match key {
                "order" => {
                    for part in raw.split(',').filter(|p| !p.is_empty()) {
                        let (field, direction) = match part.rsplit_once('.') {
                            Some((field, "asc")) => (field, Direction::Asc),
                            Some((field, "desc")) => (field, Direction::Desc),
                            _ => (part, Direction::Asc),
                        };
                        filter = filter.order_by(field, direction);
                    }
                }
                "limit" => {
                    let limit = raw
                        .parse::<usize>()
                        .map_err(|_| AppError::BadRequest(format!("invalid limit: {}", raw)))?;
                    filter = filter.limit(limit);
                }
                field => {
                    filter = match raw {
                        "is.null" => filter.eq(field, Value::Null),
                        "not.is.null" => filter.neq(field, Value::Null),
                        _ => {
                            let (op, operand) = raw
                                .split_once('.')
                                .and_then(|(op, operand)| Op::parse(op).map(|op| (op, operand)))
                                .ok_or_else(|| {
                                    AppError::BadRequest(format!("invalid filter {}={}", field, raw))
                                })?;
                            filter.with(field, op, operand)
                        }
                    };
                }
            }
        }

        Ok(filter)
    }

    pub fn matches(&self, row: &Value) -> bool {
        self.conditions.iter().all(|c| {
            let field = row.get(&c.field).unwrap_or(&Value::Null);
            match (&c.value, c.op) {
                // `is.null` / `not.is.null`
                (Value::Null, Op::Eq) => field.is_null(),
                (Value::Null, Op::Neq) => !field.is_null(),
                (Value::Null, _) => false,
                _ => compare(field, &c.value).is_some_and(|ord| c.op.accepts(ord)),
            }
        })
    }

    /// Evaluates the filter over in-memory rows.
    pub fn apply(&self, rows: Vec<Value>) -> Vec<Value> {
        let mut rows: Vec<Value> = rows.into_iter().filter(|row| self.matches(row)).collect();

        if !self.order.is_empty() {
            rows.sort_by(|a, b| {
                for o in &self.order {
                    let ord = sort_cmp(
                        a.get(&o.field).unwrap_or(&Value::Null),
                        b.get(&o.field).unwrap_or(&Value::Null),
                    );
                    let ord = match o.direction {
                        Direction::Asc => ord,
                        Direction::Desc => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }

        rows
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Orders `field` against `target`. Strings are coerced when the other
/// side is a number or bool, in either position. `None` means the two are
/// not comparable and the condition fails.
fn compare(field: &Value, target: &Value) -> Option<Ordering> {
    match (field, target) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::String(b)) => a.as_f64()?.partial_cmp(&b.parse::<f64>().ok()?),
        (Value::String(a), Value::Number(b)) => a.parse::<f64>().ok()?.partial_cmp(&b.as_f64()?),
        (Value::Bool(a), Value::String(b)) => Some(a.cmp(&b.parse::<bool>().ok()?)),
        (Value::String(a), Value::Bool(b)) => Some(a.parse::<bool>().ok()?.cmp(b)),
        _ => None,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::String(_) => 0,
        Value::Number(_) => 1,
        Value::Bool(_) => 2,
        Value::Array(_) | Value::Object(_) => 3,
        Value::Null => 4,
    }
}

/// Total order for sorting. Values of different types order by type, so
/// nulls sort after every value as they do remotely for ascending order.
fn sort_cmp(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(f64::NAN), y.as_f64().unwrap_or(f64::NAN));
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Null, Value::Null) => Ordering::Equal,
        _ if type_rank(a) == type_rank(b) => a.to_string().cmp(&b.to_string()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows() -> Vec<Value> {
        vec![
            json!({ "student_id": "s-1", "score": 82, "term": "autumn" }),
            json!({ "student_id": "s-2", "score": 67, "term": "autumn" }),
            json!({ "student_id": "s-3", "score": 91, "term": "spring" }),
            json!({ "student_id": "s-4", "term": "autumn" }),
        ]
    }

    fn ids(rows: &[Value]) -> Vec<&str> {
        rows.iter().map(|r| r["student_id"].as_str().unwrap()).collect()
    }

    #[test]
    fn test_compile_to_query_pairs() {
        let filter = Filter::new()
            .eq("term", "autumn")
            .gte("score", 70)
            .eq("remarks", Value::Null)
            .order_by("score", Direction::Desc)
            .order_by("student_id", Direction::Asc)
            .limit(5);

        assert_eq!(
            filter.to_query_pairs(),
            vec![
                ("term".to_string(), "eq.autumn".to_string()),
                ("score".to_string(), "gte.70".to_string()),
                ("remarks".to_string(), "is.null".to_string()),
                ("order".to_string(), "score.desc,student_id.asc".to_string()),
                ("limit".to_string(), "5".to_string()),
            ]
        );
    }

    #[test]
    fn test_equality_and_range() {
        let filter = Filter::new().eq("term", "autumn").gt("score", 70);
        assert_eq!(ids(&filter.apply(rows())), vec!["s-1"]);
    }

    #[test]
    fn test_missing_field_never_matches_comparison() {
        let filter = Filter::new().lt("score", 100);
        assert_eq!(ids(&filter.apply(rows())), vec!["s-1", "s-2", "s-3"]);

        let filter = Filter::new().neq("score", 67);
        assert_eq!(ids(&filter.apply(rows())), vec!["s-1", "s-3"]);
    }

    #[test]
    fn test_order_puts_nulls_last_ascending() {
        let filter = Filter::new().order_by("score", Direction::Asc);
        assert_eq!(ids(&filter.apply(rows())), vec!["s-2", "s-1", "s-3", "s-4"]);

        let filter = Filter::new().order_by("score", Direction::Desc).limit(2);
        assert_eq!(ids(&filter.apply(rows())), vec!["s-4", "s-3"]);
    }

    #[test]
    fn test_parsed_filter_evaluates_like_built_filter() {
        let built = Filter::new()
            .eq("term", "autumn")
            .gte("score", 67)
            .order_by("score", Direction::Asc);
        let parsed = Filter::from_query_pairs(built.to_query_pairs()).unwrap();

        assert_eq!(ids(&parsed.apply(rows())), ids(&built.apply(rows())));
        assert_eq!(ids(&parsed.apply(rows())), vec!["s-2", "s-1"]);
    }

    #[test]
    fn test_null_checks_follow_remote_semantics() {
        let rows = vec![
            json!({ "student_id": "s-1", "remarks": "late" }),
            json!({ "student_id": "s-2", "remarks": null }),
            json!({ "student_id": "s-3" }),
        ];

        let not_null = Filter::from_query_pairs([("remarks", "not.is.null")]).unwrap();
        assert_eq!(ids(&not_null.apply(rows.clone())), vec!["s-1"]);

        let is_null = Filter::from_query_pairs([("remarks", "is.null")]).unwrap();
        assert_eq!(ids(&is_null.apply(rows)), vec!["s-2", "s-3"]);
    }

    #[test]
    fn test_string_and_number_compare_in_both_positions() {
        assert_eq!(compare(&json!(5), &json!("3")), Some(Ordering::Greater));
        assert_eq!(compare(&json!("3"), &json!(5)), Some(Ordering::Less));
        assert_eq!(compare(&json!("true"), &json!(true)), Some(Ordering::Equal));

        // local rows carry the remote key as a string
        let rows = vec![
            json!({ "student_id": "s-1", "id": "1042" }),
            json!({ "student_id": "s-2", "id": "77" }),
        ];
        let filter = Filter::new().eq("id", 1042);
        assert_eq!(ids(&filter.apply(rows)), vec!["s-1"]);
    }

    #[test]
    fn test_mixed_type_column_sorts_by_type_then_value() {
        let rows = vec![
            json!({ "student_id": "s-1", "score": 10 }),
            json!({ "student_id": "s-2", "score": "b" }),
            json!({ "student_id": "s-3", "score": null }),
            json!({ "student_id": "s-4", "score": true }),
            json!({ "student_id": "s-5", "score": "a" }),
            json!({ "student_id": "s-6", "score": 2 }),
        ];

        let filter = Filter::new().order_by("score", Direction::Asc);
        assert_eq!(
            ids(&filter.apply(rows)),
            vec!["s-5", "s-2", "s-6", "s-1", "s-4", "s-3"]
        );
    }

    #[test]
    fn test_parse_rejects_unknown_operator() {
        let result = Filter::from_query_pairs([("score", "like.9%")]);
        assert!(matches!(result, Err(AppError::BadRequest(_))));

        let result = Filter::from_query_pairs([("limit", "many")]);
        assert!(result.is_err());
    }
}
