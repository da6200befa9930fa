use crate::ast::*;
use crate::error::{Error, Result};
use crate::runtime::{escape_html, substitute, Translator};
use crate::trans::CallTargets;
use crate::Environment;
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    Array(Vec<Value>),
    Map(HashMap<String, Value>),
    Null,
}

impl Value {
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Map(m) => !m.is_empty(),
            Value::Null => false,
        }
    }

    /// Printable form of a scalar; arrays and maps have none.
    pub fn to_output(&self) -> Result<String> {
        match self {
            Value::String(s) => Ok(s.clone()),
            Value::Int(i) => Ok(i.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Null => Ok(String::new()),
            _ => Err(Error::Render(format!("Cannot render complex type {self:?}"))),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

/// Renders parsed templates. `trans` nodes are rendered by evaluating the
/// same call expression the compiler emits for them.
pub struct Evaluator<'a> {
    env: &'a Environment,
    translator: &'a dyn Translator,
    scopes: Vec<HashMap<String, Value>>,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        env: &'a Environment,
        translator: &'a dyn Translator,
        context: HashMap<String, Value>,
    ) -> Self {
        Self {
            env,
            translator,
            scopes: vec![context],
        }
    }

    fn get_var(&self, name: &str) -> Option<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(val) = scope.get(name) {
                return Some(val.clone());
            }
        }
        None
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn set_local(&mut self, name: String, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, value);
        }
    }

    pub fn render(&mut self, template: &[Node]) -> Result<String> {
        let mut output = String::new();
        for node in template {
            match node {
                Node::Text(s) => output.push_str(s),
                Node::Print(expr) => output.push_str(&self.eval_expr(expr)?.to_output()?),
                Node::For {
                    target,
                    iterable,
                    body,
                } => match self.eval_expr(iterable)? {
                    Value::Array(items) => {
                        let len = items.len();
                        for (i, item) in items.into_iter().enumerate() {
                            self.push_scope();
                            self.set_local(target.clone(), item);

                            let mut loop_map = HashMap::new();
                            loop_map.insert("index0".to_string(), Value::Int(i as i64));
                            loop_map.insert("index".to_string(), Value::Int(i as i64 + 1));
                            loop_map.insert("first".to_string(), Value::Bool(i == 0));
                            loop_map.insert("last".to_string(), Value::Bool(i == len - 1));
                            self.set_local("loop".to_string(), Value::Map(loop_map));

                            let rendered = self.render(body);
                            self.pop_scope();
                            output.push_str(&rendered?);
                        }
                    }
                    Value::Null => {} // Missing iterable = skip loop (Jinja behavior)
                    other => {
                        return Err(Error::Render(format!(
                            "Expected array for loop, got {other:?}"
                        )))
                    }
                },
                Node::If { cases, else_body } => {
                    let mut matched = false;
                    for (cond, body) in cases {
                        if self.eval_expr(cond)?.is_truthy() {
                            output.push_str(&self.render(body)?);
                            matched = true;
                            break;
                        }
                    }
                    if !matched {
                        if let Some(body) = else_body {
                            output.push_str(&self.render(body)?);
                        }
                    }
                }
                Node::Trans(trans) => {
                    let call = trans.to_call(&CallTargets::from_options(self.env.options()))?;
                    output.push_str(&self.eval_expr(&call)?.to_output()?);
                }
            }
        }
        Ok(output)
    }

    pub fn eval_expr(&self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Str(s) => Ok(Value::String(s.clone())),
            Expr::Int(i) => Ok(Value::Int(*i)),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Name(name) => Ok(self.get_var(name).unwrap_or_else(|| {
                tracing::warn!(variable = %name, "undefined variable rendered as null");
                Value::Null
            })),
            Expr::Attribute(obj, attr) => match self.eval_expr(obj)? {
                Value::Map(m) => Ok(m.get(attr).cloned().unwrap_or(Value::Null)),
                other => Err(Error::Render(format!(
                    "Cannot get attribute {attr} of non-map {other:?}"
                ))),
            },
            Expr::Index(obj, idx) => match (self.eval_expr(obj)?, self.eval_expr(idx)?) {
                (Value::Map(m), Value::String(key)) => {
                    Ok(m.get(&key).cloned().unwrap_or(Value::Null))
                }
                (Value::Array(a), Value::Int(i)) => usize::try_from(i)
                    .ok()
                    .and_then(|i| a.get(i).cloned())
                    .ok_or_else(|| Error::Render(format!("Index {i} out of bounds"))),
                _ => Err(Error::Render("Invalid index access".to_string())),
            },
            Expr::BinOp(lhs, op, rhs) => {
                let l = self.eval_expr(lhs)?;
                let r = self.eval_expr(rhs)?;
                binary(l, *op, r)
            }
            Expr::Not(inner) => Ok(Value::Bool(!self.eval_expr(inner)?.is_truthy())),
            Expr::Neg(inner) => match self.eval_expr(inner)? {
                Value::Int(i) => i.checked_neg().map(Value::Int).ok_or_else(|| overflow("-", i)),
                other => Err(Error::Render(format!("Cannot negate {other:?}"))),
            },
            Expr::Filter { node, name, args } => {
                let function = self.env.filter_function(name).unwrap_or(name.as_str());
                let mut values = vec![self.eval_expr(node)?];
                for arg in args {
                    values.push(self.eval_expr(arg)?);
                }
                self.call_function(function, values)
            }
            Expr::ToString(inner) => {
                let value = self.eval_expr(inner)?;
                value.to_output()?;
                Ok(value)
            }
            Expr::Call { name, args } => {
                let values = args
                    .iter()
                    .map(|arg| self.eval_expr(arg))
                    .collect::<Result<Vec<_>>>()?;
                self.call_function(name, values)
            }
            Expr::List(items) => Ok(Value::Array(
                items
                    .iter()
                    .map(|item| self.eval_expr(item))
                    .collect::<Result<Vec<_>>>()?,
            )),
            Expr::Map(entries) => {
                let mut map = HashMap::new();
                for (key, value) in entries {
                    map.insert(self.eval_expr(key)?.to_output()?, self.eval_expr(value)?);
                }
                Ok(Value::Map(map))
            }
        }
    }

    fn call_function(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        let options = self.env.options();
        if name == options.translate_function {
            return self.translate(args);
        }
        if name == options.translate_plural_function {
            return self.translate_plural(args);
        }
        let function = if name == options.escape_function {
            "escape"
        } else {
            name
        };

        let mut args = args.into_iter();
        let first = args.next().unwrap_or(Value::Null);
        match function {
            "escape" | "e" => Ok(Value::String(escape_html(&first.to_output()?))),
            "raw" => Ok(first),
            "to_string" => Ok(Value::String(first.to_output()?)),
            "upper" => Ok(Value::String(first.to_output()?.to_uppercase())),
            "lower" => Ok(Value::String(first.to_output()?.to_lowercase())),
            "length" => match first {
                Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
                Value::Array(a) => Ok(Value::Int(a.len() as i64)),
                Value::Map(m) => Ok(Value::Int(m.len() as i64)),
                other => Err(Error::Render(format!("Cannot take length of {other:?}"))),
            },
            "abs" => {
                let i = as_int(&first)?;
                i.checked_abs().map(Value::Int).ok_or_else(|| overflow("abs", i))
            }
            _ => Err(Error::Render(format!("Unknown function {name}"))),
        }
    }

    /// `translate(message, domain[, map])`
    fn translate(&self, args: Vec<Value>) -> Result<Value> {
        let mut args = args.into_iter();
        let message = args.next().unwrap_or(Value::Null).to_output()?;
        let domain = args.next().unwrap_or(Value::Null).to_output()?;
        let translated = self.translator.translate(&message, &domain);
        Ok(Value::String(substitute(
            &translated,
            &replacements(args.next())?,
        )))
    }

    /// `translate_plural([singular, plural], domain, n[, map])`
    fn translate_plural(&self, args: Vec<Value>) -> Result<Value> {
        let mut args = args.into_iter();
        let (singular, plural) = match args.next() {
            Some(Value::Array(forms)) if forms.len() == 2 => {
                (forms[0].to_output()?, forms[1].to_output()?)
            }
            other => {
                return Err(Error::Render(format!(
                    "Plural translation needs [singular, plural], got {other:?}"
                )))
            }
        };
        let domain = args.next().unwrap_or(Value::Null).to_output()?;
        let n = as_int(&args.next().unwrap_or(Value::Null))?.unsigned_abs();
        let translated = self
            .translator
            .translate_plural(&singular, &plural, &domain, n);
        Ok(Value::String(substitute(
            &translated,
            &replacements(args.next())?,
        )))
    }
}

fn replacements(map: Option<Value>) -> Result<HashMap<String, String>> {
    match map {
        None | Some(Value::Null) => Ok(HashMap::new()),
        Some(Value::Map(map)) => map
            .into_iter()
            .map(|(key, value)| Ok((key, value.to_output()?)))
            .collect(),
        Some(other) => Err(Error::Render(format!(
            "Placeholder replacements must be a map, got {other:?}"
        ))),
    }
}

fn as_int(value: &Value) -> Result<i64> {
    match value {
        Value::Int(i) => Ok(*i),
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::Null => Ok(0),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| Error::Render(format!("Expected a number, got {s:?}"))),
        other => Err(Error::Render(format!("Expected a number, got {other:?}"))),
    }
}

fn overflow(op: &str, operand: i64) -> Error {
    Error::Render(format!("Integer overflow in {op}({operand})"))
}

fn arithmetic(
    l: &Value,
    op: BinOp,
    r: &Value,
    checked: fn(i64, i64) -> Option<i64>,
) -> Result<Value> {
    let (a, b) = (as_int(l)?, as_int(r)?);
    checked(a, b).map(Value::Int).ok_or_else(|| {
        Error::Render(format!("Integer overflow in {a} {} {b}", op.symbol()))
    })
}

fn binary(l: Value, op: BinOp, r: Value) -> Result<Value> {
    match op {
        BinOp::Eq => Ok(Value::Bool(l == r)),
        BinOp::NotEq => Ok(Value::Bool(l != r)),
        BinOp::And => Ok(Value::Bool(l.is_truthy() && r.is_truthy())),
        BinOp::Or => Ok(Value::Bool(l.is_truthy() || r.is_truthy())),
        BinOp::Concat => Ok(Value::String(l.to_output()? + &r.to_output()?)),
        BinOp::Add => match (l, r) {
            (Value::String(s1), Value::String(s2)) => Ok(Value::String(s1 + &s2)),
            (l, r) => arithmetic(&l, op, &r, i64::checked_add),
        },
        BinOp::Sub => arithmetic(&l, op, &r, i64::checked_sub),
        BinOp::Mul => arithmetic(&l, op, &r, i64::checked_mul),
        BinOp::Lt => Ok(Value::Bool(as_int(&l)? < as_int(&r)?)),
        BinOp::Gt => Ok(Value::Bool(as_int(&l)? > as_int(&r)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Passthrough;

    fn render(source: &str, context: &[(&str, Value)]) -> Result<String> {
        let env = Environment::default();
        let template = env.parse(source)?;
        let context = context
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        let mut evaluator = Evaluator::new(&env, &Passthrough, context);
        evaluator.render(&template)
    }

    #[test]
    fn prints_are_autoescaped() {
        let out = render("<b>{{ who }}</b>", &[("who", "<i>".into())]).unwrap();
        assert_eq!(out, "<b>&lt;i&gt;</b>");
    }

    #[test]
    fn raw_filter_skips_escaping() {
        let out = render("{{ who|raw }}", &[("who", "<i>".into())]).unwrap();
        assert_eq!(out, "<i>");
    }

    #[test]
    fn loop_variables() {
        let items = Value::Array(vec!["a".into(), "b".into()]);
        let out = render(
            "{% for x in items %}{{ loop.index }}{{ x }}{% if not loop.last %},{% endif %}{% endfor %}",
            &[("items", items)],
        )
        .unwrap();
        assert_eq!(out, "1a,2b");
    }

    #[test]
    fn arithmetic_and_comparison() {
        let out = render("{% if n * 2 > 5 %}big{% endif %}{{ n - 10 }}", &[("n", Value::Int(3))])
            .unwrap();
        assert_eq!(out, "big-7");
    }

    #[test]
    fn unknown_function_is_a_render_error() {
        let err = render("{{ x|shout }}", &[("x", "a".into())]).unwrap_err();
        assert_eq!(err, Error::Render("Unknown function shout".to_string()));
    }

    #[test]
    fn integer_overflow_is_a_render_error() {
        for source in [
            "{{ 9223372036854775807 + 1 }}",
            "{{ n - 1 }}",
            "{{ n * 2 }}",
            "{{ -n }}",
            "{{ n|abs }}",
        ] {
            let err = render(source, &[("n", Value::Int(i64::MIN))]).unwrap_err();
            assert!(matches!(err, Error::Render(_)), "{source}: {err}");
        }
    }

    #[test]
    fn complex_values_cannot_be_printed() {
        let err = render("{{ items|raw }}", &[("items", Value::Array(vec![]))]).unwrap_err();
        assert!(matches!(err, Error::Render(_)));
    }
}
