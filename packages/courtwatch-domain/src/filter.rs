use serde_json::{Map, Value};
use time::{Date, macros::format_description};

use crate::{InvalidQueryError, document::IndexedDocument};

pub const ALERT_FILTER_EXPR_SCHEMA_V1: &str = "alert_filter_expr/v1";

const MAX_FILTER_DEPTH: usize = 8;
const MAX_FILTER_NODES: usize = 128;
const MAX_IN_LIST_ITEMS: usize = 128;
const MAX_STRING_BYTES: usize = 512;
const FIELD_ALLOWLIST: &str =
	"case_name, docket_number, court_id, judges, date_filed, date_argued, citations, cites, cited_by";
/// Fields that only exist at query time; a percolated document never carries them.
const COMPUTED_FIELDS: [&str; 5] = ["score", "popularity", "relevance", "citation_count", "random"];

/// A structured filter over the percolating representation of a document.
#[derive(Clone, Debug)]
pub struct AlertFilter {
	expr: FilterExpr,
	json: Value,
}
impl AlertFilter {
	pub fn parse(raw: &Value) -> Result<Self, InvalidQueryError> {
		let path = "$.filter";
		let obj = raw
			.as_object()
			.ok_or_else(|| InvalidQueryError::new(path, "filter must be an object."))?;
		let schema = obj
			.get("schema")
			.and_then(Value::as_str)
			.ok_or_else(|| InvalidQueryError::new(format!("{path}.schema"), "filter.schema is required."))?;

		if schema != ALERT_FILTER_EXPR_SCHEMA_V1 {
			return Err(InvalidQueryError::new(
				format!("{path}.schema"),
				format!("unsupported filter schema '{schema}', expected '{ALERT_FILTER_EXPR_SCHEMA_V1}'."),
			));
		}

		let expr = obj
			.get("expr")
			.ok_or_else(|| InvalidQueryError::new(format!("{path}.expr"), "filter.expr is required."))?;
		let mut state = FilterParseState::default();
		let expr = parse_expr(expr, "$.filter.expr", 1, &mut state)?;
		let json = serde_json::json!({ "schema": ALERT_FILTER_EXPR_SCHEMA_V1, "expr": expr.to_value() });

		Ok(Self { expr, json })
	}

	/// Canonical JSON form; parsing it again yields an equal filter.
	pub fn as_value(&self) -> &Value {
		&self.json
	}

	pub fn matches(&self, document: &IndexedDocument) -> bool {
		self.expr.evaluate(document)
	}
}

#[derive(Default)]
struct FilterParseState {
	nodes: usize,
	max_depth: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FilterField {
	CaseName,
	DocketNumber,
	CourtId,
	Judges,
	DateFiled,
	DateArgued,
	Citations,
	Cites,
	CitedBy,
}
impl FilterField {
	fn as_str(self) -> &'static str {
		match self {
			Self::CaseName => "case_name",
			Self::DocketNumber => "docket_number",
			Self::CourtId => "court_id",
			Self::Judges => "judges",
			Self::DateFiled => "date_filed",
			Self::DateArgued => "date_argued",
			Self::Citations => "citations",
			Self::Cites => "cites",
			Self::CitedBy => "cited_by",
		}
	}

	fn parse(path: &str, raw: &Value) -> Result<Self, InvalidQueryError> {
		let field = raw
			.as_str()
			.ok_or_else(|| InvalidQueryError::new(path, "filter field must be a string."))?
			.to_ascii_lowercase();

		match field.as_str() {
			"case_name" => Ok(Self::CaseName),
			"docket_number" => Ok(Self::DocketNumber),
			"court_id" => Ok(Self::CourtId),
			"judges" => Ok(Self::Judges),
			"date_filed" => Ok(Self::DateFiled),
			"date_argued" => Ok(Self::DateArgued),
			"citations" => Ok(Self::Citations),
			"cites" => Ok(Self::Cites),
			"cited_by" => Ok(Self::CitedBy),
			computed if COMPUTED_FIELDS.contains(&computed) => Err(InvalidQueryError::new(
				path,
				format!(
					"field '{computed}' is computed at query time and cannot be used in an alert."
				),
			)),
			_ => Err(InvalidQueryError::new(
				path,
				format!("field '{field}' is not in allowlist: {FIELD_ALLOWLIST}"),
			)),
		}
	}

	fn kind(self) -> FieldKind {
		match self {
			Self::CaseName | Self::DocketNumber | Self::CourtId => FieldKind::Text,
			Self::Judges | Self::Citations => FieldKind::TextList,
			Self::DateFiled | Self::DateArgued => FieldKind::Date,
			Self::Cites | Self::CitedBy => FieldKind::IdList,
		}
	}

	fn lookup(self, document: &IndexedDocument) -> FieldValue<'_> {
		let fields = &document.fields;

		match self {
			Self::CaseName => FieldValue::Text(fields.case_name.as_deref()),
			Self::DocketNumber => FieldValue::Text(fields.docket_number.as_deref()),
			Self::CourtId => FieldValue::Text(fields.court_id.as_deref()),
			Self::Judges => FieldValue::TextList(&fields.judges),
			Self::Citations => FieldValue::TextList(&fields.citations),
			Self::DateFiled => FieldValue::Date(fields.date_filed),
			Self::DateArgued => FieldValue::Date(fields.date_argued),
			Self::Cites => FieldValue::IdList(&fields.cites),
			Self::CitedBy => FieldValue::IdList(&fields.cited_by),
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FieldKind {
	Text,
	TextList,
	Date,
	IdList,
}

enum FieldValue<'a> {
	Text(Option<&'a str>),
	TextList(&'a [String]),
	Date(Option<Date>),
	IdList(&'a [i64]),
}
impl FieldValue<'_> {
	fn equals(&self, value: &FilterValue) -> bool {
		match (self, value) {
			(Self::Text(Some(text)), FilterValue::String(value)) => text.eq_ignore_ascii_case(value),
			(Self::TextList(items), FilterValue::String(value)) =>
				items.iter().any(|item| item.eq_ignore_ascii_case(value)),
			(Self::Date(Some(date)), FilterValue::Date(value)) => date == value,
			(Self::IdList(ids), FilterValue::Id(value)) => ids.contains(value),
			(Self::Text(None), FilterValue::Null) | (Self::Date(None), FilterValue::Null) => true,
			(Self::TextList(items), FilterValue::Null) => items.is_empty(),
			(Self::IdList(ids), FilterValue::Null) => ids.is_empty(),
			_ => false,
		}
	}

	fn contains(&self, value: &FilterValue) -> bool {
		match (self, value) {
			(Self::Text(Some(text)), FilterValue::String(needle)) =>
				text.to_lowercase().contains(&needle.to_lowercase()),
			(Self::TextList(items), FilterValue::String(needle)) => {
				let needle = needle.to_lowercase();

				items.iter().any(|item| item.to_lowercase().contains(&needle))
			},
			(Self::IdList(ids), FilterValue::Id(value)) => ids.contains(value),
			_ => false,
		}
	}

	fn date(&self) -> Option<Date> {
		match self {
			Self::Date(date) => *date,
			_ => None,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum FilterValue {
	String(String),
	Date(Date),
	Id(i64),
	Null,
}
impl FilterValue {
	fn to_value(&self) -> Value {
		match self {
			Self::String(value) => Value::String(value.clone()),
			Self::Date(value) => Value::String(format_date(*value)),
			Self::Id(value) => serde_json::json!(value),
			Self::Null => Value::Null,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RangeOp {
	Gt,
	Gte,
	Lt,
	Lte,
}
impl RangeOp {
	fn as_str(self) -> &'static str {
		match self {
			Self::Gt => "gt",
			Self::Gte => "gte",
			Self::Lt => "lt",
			Self::Lte => "lte",
		}
	}

	fn holds(self, lhs: Date, rhs: Date) -> bool {
		match self {
			Self::Gt => lhs > rhs,
			Self::Gte => lhs >= rhs,
			Self::Lt => lhs < rhs,
			Self::Lte => lhs <= rhs,
		}
	}
}

#[derive(Clone, Debug)]
enum FilterExpr {
	And(Vec<FilterExpr>),
	Or(Vec<FilterExpr>),
	Not(Box<FilterExpr>),
	Eq { field: FilterField, value: FilterValue },
	Neq { field: FilterField, value: FilterValue },
	In { field: FilterField, values: Vec<FilterValue> },
	Contains { field: FilterField, value: FilterValue },
	Range { op: RangeOp, field: FilterField, value: Date },
}
impl FilterExpr {
	fn to_value(&self) -> Value {
		match self {
			Self::And(exprs) => {
				serde_json::json!({ "op": "and", "args": exprs.iter().map(Self::to_value).collect::<Vec<_>>() })
			},
			Self::Or(exprs) => {
				serde_json::json!({ "op": "or", "args": exprs.iter().map(Self::to_value).collect::<Vec<_>>() })
			},
			Self::Not(expr) => serde_json::json!({ "op": "not", "expr": expr.to_value() }),
			Self::Eq { field, value } => {
				serde_json::json!({ "op": "eq", "field": field.as_str(), "value": value.to_value() })
			},
			Self::Neq { field, value } => {
				serde_json::json!({ "op": "neq", "field": field.as_str(), "value": value.to_value() })
			},
			Self::In { field, values } => serde_json::json!({
				"op": "in",
				"field": field.as_str(),
				"value": values.iter().map(FilterValue::to_value).collect::<Vec<_>>(),
			}),
			Self::Contains { field, value } => {
				serde_json::json!({ "op": "contains", "field": field.as_str(), "value": value.to_value() })
			},
			Self::Range { op, field, value } => serde_json::json!({
				"op": op.as_str(),
				"field": field.as_str(),
				"value": format_date(*value),
			}),
		}
	}

	fn evaluate(&self, document: &IndexedDocument) -> bool {
		match self {
			Self::And(nodes) => nodes.iter().all(|node| node.evaluate(document)),
			Self::Or(nodes) => nodes.iter().any(|node| node.evaluate(document)),
			Self::Not(node) => !node.evaluate(document),
			Self::Eq { field, value } => field.lookup(document).equals(value),
			Self::Neq { field, value } => !field.lookup(document).equals(value),
			Self::In { field, values } => {
				let current = field.lookup(document);

				values.iter().any(|value| current.equals(value))
			},
			Self::Contains { field, value } => field.lookup(document).contains(value),
			Self::Range { op, field, value } =>
				field.lookup(document).date().is_some_and(|date| op.holds(date, *value)),
		}
	}

	fn parse_args(
		value: &Value,
		path: &str,
		depth: usize,
		state: &mut FilterParseState,
	) -> Result<Vec<Self>, InvalidQueryError> {
		let nodes =
			value.as_array().ok_or_else(|| InvalidQueryError::new(path, "op args must be an array."))?;

		if nodes.is_empty() {
			return Err(InvalidQueryError::new(path, "op args must contain at least one node."));
		}

		nodes
			.iter()
			.enumerate()
			.map(|(index, node)| {
				parse_expr(node, &format!("{path}[{index}]"), depth.saturating_add(1), state)
			})
			.collect()
	}

	fn validate_metrics(
		path: &str,
		depth: usize,
		state: &mut FilterParseState,
	) -> Result<(), InvalidQueryError> {
		state.nodes = state.nodes.saturating_add(1);
		state.max_depth = state.max_depth.max(depth);

		if state.nodes > MAX_FILTER_NODES {
			return Err(InvalidQueryError::new(
				path,
				format!("filter exceeds node limit ({}/{MAX_FILTER_NODES})", state.nodes),
			));
		}
		if state.max_depth > MAX_FILTER_DEPTH {
			return Err(InvalidQueryError::new(
				path,
				format!("filter exceeds depth limit ({}/{MAX_FILTER_DEPTH})", state.max_depth),
			));
		}

		Ok(())
	}

	fn parse_leaf(raw: &Map<String, Value>, op: &str, path: &str) -> Result<Self, InvalidQueryError> {
		let field_path = format!("{path}.field");
		let field = FilterField::parse(
			&field_path,
			raw.get("field").ok_or_else(|| {
				InvalidQueryError::new(&field_path, "op node is missing required field 'field'.")
			})?,
		)?;
		let value_path = format!("{path}.value");
		let value_raw = raw.get("value").ok_or_else(|| {
			InvalidQueryError::new(&value_path, "op node is missing required field 'value'.")
		})?;

		match op {
			"eq" => Ok(Self::Eq { field, value: parse_value(field, value_raw, &value_path)? }),
			"neq" => Ok(Self::Neq { field, value: parse_value(field, value_raw, &value_path)? }),
			"contains" => match (field.kind(), parse_value(field, value_raw, &value_path)?) {
				(FieldKind::Date, _) => Err(InvalidQueryError::new(
					&value_path,
					"contains is not supported on date fields.",
				)),
				(_, FilterValue::Null) =>
					Err(InvalidQueryError::new(&value_path, "contains requires a non-null value.")),
				(_, value) => Ok(Self::Contains { field, value }),
			},
			"in" => {
				let values = value_raw.as_array().ok_or_else(|| {
					InvalidQueryError::new(&value_path, "in value must be an array.")
				})?;

				if values.len() > MAX_IN_LIST_ITEMS {
					return Err(InvalidQueryError::new(
						&value_path,
						format!(
							"in list exceeds maximum size ({}/{MAX_IN_LIST_ITEMS})",
							values.len()
						),
					));
				}

				let values = values
					.iter()
					.enumerate()
					.map(|(index, raw)| parse_value(field, raw, &format!("{value_path}[{index}]")))
					.collect::<Result<Vec<_>, _>>()?;

				Ok(Self::In { field, values })
			},
			"gt" | "gte" | "lt" | "lte" => {
				let op = match op {
					"gt" => RangeOp::Gt,
					"gte" => RangeOp::Gte,
					"lt" => RangeOp::Lt,
					_ => RangeOp::Lte,
				};

				if field.kind() != FieldKind::Date {
					return Err(InvalidQueryError::new(
						&field_path,
						format!("{} requires a date field.", op.as_str()),
					));
				}

				match parse_value(field, value_raw, &value_path)? {
					FilterValue::Date(value) => Ok(Self::Range { op, field, value }),
					_ => Err(InvalidQueryError::new(
						&value_path,
						format!("{} requires a date value.", op.as_str()),
					)),
				}
			},
			_ => Err(InvalidQueryError::new(path, format!("unsupported leaf op '{op}'."))),
		}
	}
}

fn parse_expr(
	value: &Value,
	path: &str,
	depth: usize,
	state: &mut FilterParseState,
) -> Result<FilterExpr, InvalidQueryError> {
	FilterExpr::validate_metrics(path, depth, state)?;

	let Some(map) = value.as_object() else {
		return Err(InvalidQueryError::new(path, "filter node must be an object."));
	};
	let op = map
		.get("op")
		.and_then(Value::as_str)
		.ok_or_else(|| InvalidQueryError::new(path, "filter node is missing required string op."))?;

	match op {
		"and" | "or" => {
			let args_path = format!("{path}.args");
			let args = map
				.get("args")
				.ok_or_else(|| InvalidQueryError::new(&args_path, format!("{op} node requires args.")))?;
			let args = FilterExpr::parse_args(args, &args_path, depth, state)?;

			Ok(if op == "and" { FilterExpr::And(args) } else { FilterExpr::Or(args) })
		},
		"not" => {
			let expr_path = format!("{path}.expr");
			let expr = map
				.get("expr")
				.ok_or_else(|| InvalidQueryError::new(&expr_path, "not node requires expr."))?;
			let child = parse_expr(expr, &expr_path, depth.saturating_add(1), state)?;

			Ok(FilterExpr::Not(Box::new(child)))
		},
		"eq" | "neq" | "in" | "contains" | "gt" | "gte" | "lt" | "lte" =>
			FilterExpr::parse_leaf(map, op, path),
		_ => Err(InvalidQueryError::new(path, format!("unsupported filter op '{op}'."))),
	}
}

fn parse_string(path: &str, raw: &Value) -> Result<String, InvalidQueryError> {
	let value = raw.as_str().ok_or_else(|| InvalidQueryError::new(path, "string value expected."))?;

	if value.len() > MAX_STRING_BYTES {
		return Err(InvalidQueryError::new(
			path,
			format!("string value exceeds maximum bytes ({MAX_STRING_BYTES})."),
		));
	}

	Ok(value.to_string())
}

fn parse_value(field: FilterField, raw: &Value, path: &str) -> Result<FilterValue, InvalidQueryError> {
	if raw.is_null() {
		return Ok(FilterValue::Null);
	}

	match field.kind() {
		FieldKind::Text | FieldKind::TextList => parse_string(path, raw).map(FilterValue::String),
		FieldKind::Date => Date::parse(&parse_string(path, raw)?, format_description!("[year]-[month]-[day]"))
			.map(FilterValue::Date)
			.map_err(|_| InvalidQueryError::new(path, "date value must be formatted as YYYY-MM-DD.")),
		FieldKind::IdList => raw
			.as_i64()
			.map(FilterValue::Id)
			.ok_or_else(|| InvalidQueryError::new(path, "integer document id expected.")),
	}
}

fn format_date(date: Date) -> String {
	format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
}
