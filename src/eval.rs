use std::collections::HashMap;

use serde_json::Value as Json;

use crate::ast::{Expr, Node, SubSqlCall};
use crate::error::Result;

/// The runtime value domain of the template language.
///
/// `Null` denotes absence: a missing parameter or a failed member or
/// index lookup. Callers never put `Null` into a parameter bag; absence
/// is expressed by omitting the name.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i32),
    Str(String),
    Json(Json),
}

impl Value {
    /// `Null`, integer zero and the empty string are falsy; everything
    /// else, including any json value, is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Int(n) => *n != 0,
            Value::Str(s) => !s.is_empty(),
            Value::Json(_) => true,
        }
    }

    /// Collapses json integers and strings to the primitive variants;
    /// every other json shape stays opaque.
    pub fn from_json(json: Json) -> Value {
        match json {
            Json::String(s) => Value::Str(s),
            Json::Number(n) => match n.as_i64().and_then(|i| i32::try_from(i).ok()) {
                Some(i) => Value::Int(i),
                None => Value::Json(Json::Number(n)),
            },
            other => Value::Json(other),
        }
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        Value::Json(json)
    }
}

/// The parameter bag supplied to a render call: names mapped to
/// non-null values.
#[derive(Debug, Clone, Default)]
pub struct Params {
    values: HashMap<String, Value>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a parameter, replacing any previous binding of the name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Injects every default whose name the bag does not already bind.
    /// Existing bindings win.
    pub fn merge_defaults(&mut self, defaults: &Params) {
        for (name, value) in &defaults.values {
            if !self.values.contains_key(name) {
                self.values.insert(name.clone(), value.clone());
            }
        }
    }
}

/// Resolves an `@name(...)` invocation to the rendered text of the
/// named sub-template. Implemented by the engine, which scopes sub-SQL
/// names to the registry entry being rendered; any
/// `Fn(&str, Params) -> Result<String>` works for standalone use.
pub trait SubSqlResolver {
    fn resolve(&self, name: &str, params: Params) -> Result<String>;
}

impl<F> SubSqlResolver for F
where
    F: Fn(&str, Params) -> Result<String>,
{
    fn resolve(&self, name: &str, params: Params) -> Result<String> {
        self(name, params)
    }
}

/// Walks a compiled template against a parameter environment and
/// produces the rendered text.
///
/// Data-shape mismatches (missing parameter, failed member or index
/// step, unprintable json) degrade to `Null` or empty output with a
/// warning; only sub-template resolution can fail hard, when the
/// invoked template itself does not compile.
pub struct Evaluator<'a> {
    scopes: Vec<Params>,
    resolver: &'a dyn SubSqlResolver,
}

impl<'a> Evaluator<'a> {
    pub fn new(params: Params, resolver: &'a dyn SubSqlResolver) -> Self {
        Self {
            scopes: vec![params],
            resolver,
        }
    }

    fn lookup(&self, name: &str) -> Value {
        for scope in self.scopes.iter().rev() {
            if let Some(value) = scope.get(name) {
                return value.clone();
            }
        }
        tracing::warn!("parameter \"{name}\" not found");
        Value::Null
    }

    pub fn render(&mut self, template: &[Node]) -> Result<String> {
        let mut out = String::new();
        for node in template {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Print(expr) => {
                    let value = self.eval_expr(expr)?;
                    push_value(&mut out, value);
                }
                Node::SubSql(call) => out.push_str(&self.invoke_sub_sql(call)?),
                Node::If {
                    branches,
                    else_branch,
                } => {
                    let mut taken = false;
                    for (cond, body) in branches {
                        if self.eval_expr(cond)?.is_truthy() {
                            let rendered = self.render(body)?;
                            out.push_str(&rendered);
                            taken = true;
                            break;
                        }
                    }
                    if !taken {
                        if let Some(body) = else_branch {
                            let rendered = self.render(body)?;
                            out.push_str(&rendered);
                        }
                    }
                }
                Node::For {
                    value_name,
                    index_name,
                    collection,
                    separator,
                    body,
                } => {
                    let rendered = self.render_loop(
                        value_name,
                        index_name.as_deref(),
                        collection,
                        separator.as_deref(),
                        body,
                    )?;
                    out.push_str(&rendered);
                }
            }
        }
        Ok(out)
    }

    /// Iterates a json array (integer indices) or object (string keys,
    /// in the json map's deterministic order) and joins the rendered
    /// iterations with the separator. Anything else loops zero times.
    fn render_loop(
        &mut self,
        value_name: &str,
        index_name: Option<&str>,
        collection: &Expr,
        separator: Option<&str>,
        body: &[Node],
    ) -> Result<String> {
        let entries: Vec<(Value, Json)> = match self.eval_expr(collection)? {
            Value::Json(Json::Array(items)) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (Value::Int(i as i32), item))
                .collect(),
            Value::Json(Json::Object(members)) => members
                .into_iter()
                .map(|(key, member)| (Value::Str(key), member))
                .collect(),
            _ => {
                tracing::warn!("for loop over \"{collection}\": not a json array or object");
                return Ok(String::new());
            }
        };

        let mut parts = Vec::with_capacity(entries.len());
        for (index_value, element) in entries {
            let mut scope = Params::new();
            scope.set(value_name, Value::from_json(element));
            if let Some(index_name) = index_name {
                scope.set(index_name, index_value);
            }
            self.scopes.push(scope);
            let rendered = self.render(body);
            self.scopes.pop();
            parts.push(rendered?);
        }
        Ok(parts.join(separator.unwrap_or("")))
    }

    fn invoke_sub_sql(&self, call: &SubSqlCall) -> Result<String> {
        let mut params = Params::new();
        for (name, expr) in &call.args {
            match self.eval_expr(expr)? {
                Value::Null => {
                    tracing::warn!(
                        "argument \"{name}\" of @{} is null and was omitted",
                        call.name
                    );
                }
                value => {
                    params.set(name.clone(), value);
                }
            }
        }
        self.resolver.resolve(&call.name, params)
    }

    fn eval_expr(&self, expr: &Expr) -> Result<Value> {
        Ok(match expr {
            Expr::NullLit => Value::Null,
            Expr::Int(n) => Value::Int(*n),
            Expr::Str(s) => Value::Str(s.clone()),
            Expr::Var(name) => collapse_json(self.lookup(name)),
            Expr::Member(obj, member) => {
                let base = self.eval_expr(obj)?;
                collapse_json(member_of(base, member))
            }
            Expr::Index(coll, index) => {
                let base = self.eval_expr(coll)?;
                let index = self.eval_expr(index)?;
                collapse_json(element_of(base, index))
            }
            Expr::Not(inner) => Value::Int(!self.eval_expr(inner)?.is_truthy() as i32),
            Expr::And(l, r) => {
                let l = self.eval_expr(l)?.is_truthy();
                let r = self.eval_expr(r)?.is_truthy();
                Value::Int((l && r) as i32)
            }
            Expr::Or(l, r) => {
                let l = self.eval_expr(l)?.is_truthy();
                let r = self.eval_expr(r)?.is_truthy();
                Value::Int((l || r) as i32)
            }
            // Value equality is variant-wise: nulls are equal to each
            // other, json compares structurally, differing variants are
            // unequal.
            Expr::Eq(l, r) => Value::Int((self.eval_expr(l)? == self.eval_expr(r)?) as i32),
            Expr::Neq(l, r) => Value::Int((self.eval_expr(l)? != self.eval_expr(r)?) as i32),
            Expr::SubSql(call) => Value::Str(self.invoke_sub_sql(call)?),
        })
    }
}

/// Appends the string projection of a value: strings raw, integers in
/// decimal, null nothing. Structured json is not printable.
fn push_value(out: &mut String, value: Value) {
    match value {
        Value::Null => {}
        Value::Int(n) => out.push_str(&n.to_string()),
        Value::Str(s) => out.push_str(&s),
        Value::Json(_) => {
            tracing::warn!("json values cannot be interpolated directly");
        }
    }
}

fn collapse_json(value: Value) -> Value {
    match value {
        Value::Json(json) => Value::from_json(json),
        other => other,
    }
}

fn member_of(base: Value, member: &str) -> Value {
    match base {
        Value::Json(Json::Object(mut members)) => match members.remove(member) {
            Some(json) => Value::Json(json),
            None => {
                tracing::warn!("member \"{member}\" not found");
                Value::Null
            }
        },
        _ => {
            tracing::warn!("member \"{member}\" requested from a non-object value");
            Value::Null
        }
    }
}

fn element_of(base: Value, index: Value) -> Value {
    match (base, index) {
        (Value::Json(Json::Array(mut items)), Value::Int(i)) => {
            if i < 0 || i as usize >= items.len() {
                tracing::warn!("index {i} out of bounds for array of {}", items.len());
                Value::Null
            } else {
                Value::Json(items.swap_remove(i as usize))
            }
        }
        (Value::Json(Json::Object(mut members)), Value::Str(key)) => {
            match members.remove(&key) {
                Some(json) => Value::Json(json),
                None => {
                    tracing::warn!("member \"{key}\" not found");
                    Value::Null
                }
            }
        }
        _ => {
            tracing::warn!("index applied to a value that is not a json array or object");
            Value::Null
        }
    }
}
