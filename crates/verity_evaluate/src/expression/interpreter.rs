use crate::expression::parser::{BinaryOp, CompareOp, Expr, UnaryOp};
use crate::expression::ExpressionError;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use verity_types::value::{contains_value, repr, str_form, values_equal, ValueExt, ValueKind};
use verity_types::EvaluationContext;

pub const BUILTINS: &[&str] = &[
    "len", "all", "any", "abs", "min", "max", "sum", "str", "int", "float", "bool",
];

const CONTEXT_TYPE: &str = "EvaluationContext";
const MAX_SEQUENCE_LEN: usize = 1_000_000;

/// Result of evaluating a sub-expression: either the `ctx` binding itself or a plain value
#[derive(Debug, Clone)]
enum Operand {
    Context,
    Json(Value),
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn of(value: &Value) -> Option<Num> {
        match value {
            Value::Bool(b) => Some(Num::Int(*b as i64)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Num::Int(i)),
                None => n.as_f64().map(Num::Float),
            },
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    // JSON has no inf or NaN, so those are errors rather than silent nulls
    fn into_value(self) -> Result<Value, ExpressionError> {
        match self {
            Num::Int(i) => Ok(Value::from(i)),
            Num::Float(f) if f.is_finite() => Ok(Value::from(f)),
            Num::Float(f) => Err(ExpressionError::InvalidValue(format!(
                "result {f} is not a finite number"
            ))),
        }
    }
}

pub struct Interpreter<'c> {
    ctx: &'c EvaluationContext,
    // comprehension variables, innermost last
    scopes: Vec<(String, Value)>,
}

impl<'c> Interpreter<'c> {
    pub fn new(ctx: &'c EvaluationContext) -> Self {
        Interpreter {
            ctx,
            scopes: Vec::new(),
        }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> Result<Value, ExpressionError> {
        self.eval_value(expr)
    }

    fn eval_value(&mut self, expr: &Expr) -> Result<Value, ExpressionError> {
        match self.eval(expr)? {
            Operand::Json(value) => Ok(value),
            Operand::Context => Err(ExpressionError::Type(format!(
                "'{CONTEXT_TYPE}' object cannot be used as a value"
            ))),
        }
    }

    fn eval(&mut self, expr: &Expr) -> Result<Operand, ExpressionError> {
        let value = match expr {
            Expr::Literal(value) => value.clone(),
            Expr::Name(name) => return self.lookup(name),
            Expr::List(items) => {
                let items = items
                    .iter()
                    .map(|item| self.eval_value(item))
                    .collect::<Result<Vec<_>, _>>()?;
                check_size(total_size(&items), "list")?;
                Value::Array(items)
            }
            Expr::Dict(entries) => {
                let mut map = Map::new();
                for (key, value) in entries {
                    let key = dict_key(&self.eval_value(key)?)?;
                    let value = self.eval_value(value)?;
                    map.insert(key, value);
                }
                Value::Object(map)
            }
            Expr::Attribute(target, name) => {
                let target = self.eval(target)?;
                get_attribute(self.ctx, target, name)?
            }
            Expr::Subscript(target, index) => {
                let target = self.eval(target)?;
                let index = self.eval_value(index)?;
                match target {
                    Operand::Context => {
                        return Err(ExpressionError::Type(format!(
                            "'{CONTEXT_TYPE}' object is not subscriptable"
                        )))
                    }
                    Operand::Json(container) => subscript(container, &index)?,
                }
            }
            Expr::Call(func, args) => self.call(func, args)?,
            Expr::Unary(op, operand) => {
                let operand = self.eval(operand)?;
                unary(*op, operand)?
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval_value(left)?;
                let right = self.eval_value(right)?;
                binary(*op, &left, &right)?
            }
            Expr::And(operands) => {
                let mut last = Operand::Json(Value::Bool(true));
                for operand in operands {
                    last = self.eval(operand)?;
                    if !truthy(&last) {
                        break;
                    }
                }
                return Ok(last);
            }
            Expr::Or(operands) => {
                let mut last = Operand::Json(Value::Bool(false));
                for operand in operands {
                    last = self.eval(operand)?;
                    if truthy(&last) {
                        break;
                    }
                }
                return Ok(last);
            }
            Expr::Compare(left, rest) => {
                let mut left = self.eval_value(left)?;
                for (op, right) in rest {
                    let right = self.eval_value(right)?;
                    if !compare(*op, &left, &right)? {
                        return Ok(Operand::Json(Value::Bool(false)));
                    }
                    left = right;
                }
                Value::Bool(true)
            }
            Expr::Conditional { body, test, orelse } => {
                let test = self.eval(test)?;
                return if truthy(&test) {
                    self.eval(body)
                } else {
                    self.eval(orelse)
                };
            }
            Expr::Comprehension {
                element,
                target,
                iter,
                condition,
            } => {
                let items = iterate(self.eval_value(iter)?)?;
                let mut out = Vec::with_capacity(items.len());
                let mut size = 0usize;
                for item in items {
                    self.scopes.push((target.clone(), item));
                    let step = self.comprehension_step(element, condition.as_deref());
                    self.scopes.pop();
                    if let Some(value) = step? {
                        size = size.saturating_add(footprint(&value));
                        check_size(size, "comprehension result")?;
                        out.push(value);
                    }
                }
                Value::Array(out)
            }
        };
        Ok(Operand::Json(value))
    }

    fn comprehension_step(
        &mut self,
        element: &Expr,
        condition: Option<&Expr>,
    ) -> Result<Option<Value>, ExpressionError> {
        if let Some(condition) = condition {
            if !truthy(&self.eval(condition)?) {
                return Ok(None);
            }
        }
        self.eval_value(element).map(Some)
    }

    fn lookup(&self, name: &str) -> Result<Operand, ExpressionError> {
        if let Some((_, value)) = self.scopes.iter().rev().find(|(n, _)| n == name) {
            return Ok(Operand::Json(value.clone()));
        }
        if name == "ctx" {
            return Ok(Operand::Context);
        }
        if BUILTINS.contains(&name) {
            return Err(ExpressionError::Type(format!(
                "builtin '{name}' can only be called"
            )));
        }
        Err(ExpressionError::Name(name.to_string()))
    }

    fn is_shadowed(&self, name: &str) -> bool {
        name == "ctx" || self.scopes.iter().any(|(n, _)| n == name)
    }

    fn call(&mut self, func: &Expr, args: &[Expr]) -> Result<Value, ExpressionError> {
        let name = match func {
            Expr::Name(name) if !self.is_shadowed(name) => name.as_str(),
            other => {
                let kind = match self.eval(other)? {
                    Operand::Context => CONTEXT_TYPE.to_string(),
                    Operand::Json(value) => value.kind().to_string(),
                };
                return Err(ExpressionError::Type(format!(
                    "'{kind}' object is not callable"
                )));
            }
        };

        if !BUILTINS.contains(&name) {
            return Err(ExpressionError::Name(name.to_string()));
        }

        let args = args
            .iter()
            .map(|arg| self.eval_value(arg))
            .collect::<Result<Vec<_>, _>>()?;

        call_builtin(name, args)
    }
}

fn truthy(operand: &Operand) -> bool {
    match operand {
        Operand::Context => true,
        Operand::Json(value) => value.is_truthy(),
    }
}

fn dict_key(key: &Value) -> Result<String, ExpressionError> {
    match key {
        Value::String(s) => Ok(s.clone()),
        Value::Array(_) | Value::Object(_) => Err(ExpressionError::Type(format!(
            "unhashable type: '{}'",
            key.kind()
        ))),
        other => Ok(str_form(other)),
    }
}

fn get_attribute(
    ctx: &EvaluationContext,
    target: Operand,
    name: &str,
) -> Result<Value, ExpressionError> {
    match target {
        Operand::Context => ctx.field(name).ok_or_else(|| {
            ExpressionError::Attribute(format!(
                "'{CONTEXT_TYPE}' object has no attribute '{name}'"
            ))
        }),
        // structured inputs and outputs are plain mappings, so allow attribute-style reads
        Operand::Json(Value::Object(mut map)) => map.remove(name).ok_or_else(|| {
            ExpressionError::Attribute(format!("'dict' object has no attribute '{name}'"))
        }),
        Operand::Json(other) => Err(ExpressionError::Attribute(format!(
            "'{}' object has no attribute '{name}'",
            other.kind()
        ))),
    }
}

fn sequence_index(index: &Value, len: usize, what: &str) -> Result<usize, ExpressionError> {
    let raw = match index {
        Value::Bool(b) => *b as i64,
        Value::Number(n) if n.is_i64() => n.as_i64().unwrap_or_default(),
        other => {
            return Err(ExpressionError::Type(format!(
                "{what} indices must be integers, not {}",
                other.kind()
            )))
        }
    };
    let resolved = if raw < 0 { raw + len as i64 } else { raw };
    if resolved < 0 || resolved >= len as i64 {
        return Err(ExpressionError::Index(format!("{what} index out of range")));
    }
    Ok(resolved as usize)
}

fn subscript(container: Value, index: &Value) -> Result<Value, ExpressionError> {
    match container {
        Value::Array(mut items) => {
            let idx = sequence_index(index, items.len(), "list")?;
            Ok(items.swap_remove(idx))
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let idx = sequence_index(index, chars.len(), "string")?;
            Ok(Value::String(chars[idx].to_string()))
        }
        Value::Object(mut map) => {
            let key = dict_key(index)?;
            match index {
                Value::String(_) => map.remove(&key).ok_or(ExpressionError::Key(repr(index))),
                _ => Err(ExpressionError::Key(repr(index))),
            }
        }
        other => Err(ExpressionError::Type(format!(
            "'{}' object is not subscriptable",
            other.kind()
        ))),
    }
}

fn unary(op: UnaryOp, operand: Operand) -> Result<Value, ExpressionError> {
    if let UnaryOp::Not = op {
        return Ok(Value::Bool(!truthy(&operand)));
    }
    let value = match operand {
        Operand::Json(value) => value,
        Operand::Context => {
            return Err(ExpressionError::Type(format!(
                "bad operand type for unary operator: '{CONTEXT_TYPE}'"
            )))
        }
    };
    let symbol = if let UnaryOp::Neg = op { "-" } else { "+" };
    let num = Num::of(&value).ok_or_else(|| {
        ExpressionError::Type(format!(
            "bad operand type for unary {symbol}: '{}'",
            value.kind()
        ))
    })?;
    let result = match (op, num) {
        (UnaryOp::Neg, Num::Int(i)) => i
            .checked_neg()
            .map(Num::Int)
            .unwrap_or(Num::Float(-(i as f64))),
        (UnaryOp::Neg, Num::Float(f)) => Num::Float(-f),
        (_, num) => num,
    };
    result.into_value()
}

fn unsupported(op: &str, left: &Value, right: &Value) -> ExpressionError {
    ExpressionError::Type(format!(
        "unsupported operand type(s) for {op}: '{}' and '{}'",
        left.kind(),
        right.kind()
    ))
}

/// Elements a value contributes towards the sequence cap, counting one level of nesting
fn footprint(value: &Value) -> usize {
    1 + match value {
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        Value::String(s) => s.len(),
        _ => 0,
    }
}

fn total_size(items: &[Value]) -> usize {
    items
        .iter()
        .fold(0usize, |acc, item| acc.saturating_add(footprint(item)))
}

fn check_size(size: usize, what: &str) -> Result<(), ExpressionError> {
    if size > MAX_SEQUENCE_LEN {
        return Err(ExpressionError::InvalidValue(format!("{what} is too large")));
    }
    Ok(())
}

/// `items` repeated `times` times, where one copy counts as `unit` towards the cap
fn repeat<T: Clone>(items: &[T], unit: usize, times: i64) -> Result<Vec<T>, ExpressionError> {
    let times = usize::try_from(times).unwrap_or(0);
    if items.is_empty() || times == 0 {
        return Ok(Vec::new());
    }
    check_size(unit.saturating_mul(times), "repeated sequence")?;
    let mut out = Vec::with_capacity(items.len() * times);
    for _ in 0..times {
        out.extend_from_slice(items);
    }
    Ok(out)
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ExpressionError> {
    match (op, left, right) {
        (BinaryOp::Add, Value::String(a), Value::String(b)) => {
            check_size(a.len().saturating_add(b.len()), "concatenated string")?;
            return Ok(Value::String(format!("{a}{b}")));
        }
        (BinaryOp::Add, Value::Array(a), Value::Array(b)) => {
            check_size(total_size(a).saturating_add(total_size(b)), "concatenated list")?;
            return Ok(Value::Array(a.iter().chain(b.iter()).cloned().collect()));
        }
        (BinaryOp::Mul, Value::String(s), n) | (BinaryOp::Mul, n, Value::String(s)) => {
            return match Num::of(n) {
                Some(Num::Int(times)) => {
                    let chars: Vec<char> = s.chars().collect();
                    let repeated = repeat(&chars, s.len(), times)?;
                    Ok(Value::String(repeated.into_iter().collect()))
                }
                _ => Err(unsupported(op.symbol(), left, right)),
            };
        }
        (BinaryOp::Mul, Value::Array(items), n) | (BinaryOp::Mul, n, Value::Array(items)) => {
            return match Num::of(n) {
                Some(Num::Int(times)) => {
                    Ok(Value::Array(repeat(items, total_size(items), times)?))
                }
                _ => Err(unsupported(op.symbol(), left, right)),
            };
        }
        _ => {}
    }

    let (Some(a), Some(b)) = (Num::of(left), Num::of(right)) else {
        return Err(unsupported(op.symbol(), left, right));
    };

    let result = match (a, b) {
        (Num::Int(x), Num::Int(y)) => int_arithmetic(op, x, y)?,
        _ => float_arithmetic(op, a.as_f64(), b.as_f64())?,
    };
    result.into_value()
}

fn int_arithmetic(op: BinaryOp, x: i64, y: i64) -> Result<Num, ExpressionError> {
    let checked = match op {
        BinaryOp::Add => x.checked_add(y),
        BinaryOp::Sub => x.checked_sub(y),
        BinaryOp::Mul => x.checked_mul(y),
        BinaryOp::Div => return float_arithmetic(op, x as f64, y as f64),
        BinaryOp::FloorDiv => {
            if y == 0 {
                return Err(ExpressionError::ZeroDivision);
            }
            x.checked_div(y).map(|q| {
                if (x % y != 0) && ((x < 0) != (y < 0)) {
                    q - 1
                } else {
                    q
                }
            })
        }
        BinaryOp::Mod => {
            if y == 0 {
                return Err(ExpressionError::ZeroDivision);
            }
            x.checked_rem(y)
                .map(|r| if r != 0 && ((r < 0) != (y < 0)) { r + y } else { r })
        }
    };
    match checked {
        Some(value) => Ok(Num::Int(value)),
        // overflow degrades to float arithmetic
        None => float_arithmetic(op, x as f64, y as f64),
    }
}

fn float_arithmetic(op: BinaryOp, x: f64, y: f64) -> Result<Num, ExpressionError> {
    let divides = matches!(op, BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod);
    if divides && y == 0.0 {
        return Err(ExpressionError::ZeroDivision);
    }
    let value = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => x / y,
        BinaryOp::FloorDiv => (x / y).floor(),
        BinaryOp::Mod => x - y * (x / y).floor(),
    };
    Ok(Num::Float(value))
}

/// Ordering between two values; `None` when unordered (NaN)
fn order(op: CompareOp, left: &Value, right: &Value) -> Result<Option<Ordering>, ExpressionError> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Ok(Some(a.cmp(b))),
        (Value::Array(a), Value::Array(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                if values_equal(x, y) {
                    continue;
                }
                return order(op, x, y);
            }
            Ok(Some(a.len().cmp(&b.len())))
        }
        _ => match (Num::of(left), Num::of(right)) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => Ok(Some(a.cmp(&b))),
            (Some(a), Some(b)) => Ok(a.as_f64().partial_cmp(&b.as_f64())),
            _ => Err(ExpressionError::Type(format!(
                "'{}' not supported between instances of '{}' and '{}'",
                op.symbol(),
                left.kind(),
                right.kind()
            ))),
        },
    }
}

fn identical(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Array(_), _) | (Value::Object(_), _) => false,
        _ => ValueKind::of(left) == ValueKind::of(right) && left == right,
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, ExpressionError> {
    let membership = |container: &Value, item: &Value| {
        contains_value(container, item).map_err(|e| ExpressionError::Type(e.to_string()))
    };
    Ok(match op {
        CompareOp::Eq => values_equal(left, right),
        CompareOp::NotEq => !values_equal(left, right),
        CompareOp::In => membership(right, left)?,
        CompareOp::NotIn => !membership(right, left)?,
        CompareOp::Is => identical(left, right),
        CompareOp::IsNot => !identical(left, right),
        CompareOp::Lt => order(op, left, right)? == Some(Ordering::Less),
        CompareOp::LtEq => matches!(
            order(op, left, right)?,
            Some(Ordering::Less | Ordering::Equal)
        ),
        CompareOp::Gt => order(op, left, right)? == Some(Ordering::Greater),
        CompareOp::GtEq => matches!(
            order(op, left, right)?,
            Some(Ordering::Greater | Ordering::Equal)
        ),
    })
}

/// Items produced by iterating a value: list elements, mapping keys or string characters
fn iterate(value: Value) -> Result<Vec<Value>, ExpressionError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(map) => Ok(map.into_iter().map(|(k, _)| Value::String(k)).collect()),
        Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
        other => Err(ExpressionError::Type(format!(
            "'{}' object is not iterable",
            other.kind()
        ))),
    }
}

fn expect_args(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), ExpressionError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("exactly {min}")
        } else {
            format!("{min} to {max}")
        };
        return Err(ExpressionError::Type(format!(
            "{name}() takes {expected} argument(s) ({} given)",
            args.len()
        )));
    }
    Ok(())
}

fn extreme(name: &str, candidates: Vec<Value>, wanted: Ordering) -> Result<Value, ExpressionError> {
    let op = if wanted == Ordering::Less {
        CompareOp::Lt
    } else {
        CompareOp::Gt
    };
    let mut iter = candidates.into_iter();
    let mut best = iter.next().ok_or_else(|| {
        ExpressionError::InvalidValue(format!("{name}() arg is an empty sequence"))
    })?;
    for candidate in iter {
        if order(op, &candidate, &best)? == Some(wanted) {
            best = candidate;
        }
    }
    Ok(best)
}

fn call_builtin(name: &str, mut args: Vec<Value>) -> Result<Value, ExpressionError> {
    match name {
        "len" => {
            expect_args(name, &args, 1, 1)?;
            args[0].to_length().map(Value::from).ok_or_else(|| {
                ExpressionError::Type(format!(
                    "object of type '{}' has no len()",
                    args[0].kind()
                ))
            })
        }
        "all" | "any" => {
            expect_args(name, &args, 1, 1)?;
            let items = iterate(args.remove(0))?;
            let result = if name == "all" {
                items.iter().all(ValueExt::is_truthy)
            } else {
                items.iter().any(ValueExt::is_truthy)
            };
            Ok(Value::Bool(result))
        }
        "abs" => {
            expect_args(name, &args, 1, 1)?;
            match Num::of(&args[0]) {
                Some(Num::Int(i)) => Ok(i
                    .checked_abs()
                    .map(Value::from)
                    .unwrap_or_else(|| Value::from((i as f64).abs()))),
                Some(Num::Float(f)) => Ok(Value::from(f.abs())),
                None => Err(ExpressionError::Type(format!(
                    "bad operand type for abs(): '{}'",
                    args[0].kind()
                ))),
            }
        }
        "min" | "max" => {
            if args.is_empty() {
                return Err(ExpressionError::Type(format!(
                    "{name}() expected at least 1 argument, got 0"
                )));
            }
            let wanted = if name == "min" {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            // a single argument is iterated, several are compared directly
            let candidates = if args.len() == 1 {
                iterate(args.remove(0))?
            } else {
                args
            };
            extreme(name, candidates, wanted)
        }
        "sum" => {
            expect_args(name, &args, 1, 2)?;
            let start = if args.len() == 2 {
                args.remove(1)
            } else {
                Value::from(0)
            };
            if let Value::String(_) = start {
                return Err(ExpressionError::Type(
                    "sum() can't sum strings".to_string(),
                ));
            }
            iterate(args.remove(0))?
                .iter()
                .try_fold(start, |acc, item| binary(BinaryOp::Add, &acc, item))
        }
        "str" => {
            expect_args(name, &args, 0, 1)?;
            Ok(Value::String(args.first().map(str_form).unwrap_or_default()))
        }
        "int" => {
            expect_args(name, &args, 0, 1)?;
            let Some(value) = args.first() else {
                return Ok(Value::from(0));
            };
            match value {
                Value::String(s) => s
                    .trim()
                    .replace('_', "")
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|_| {
                        ExpressionError::InvalidValue(format!(
                            "invalid literal for int() with base 10: {}",
                            repr(value)
                        ))
                    }),
                other => match Num::of(other) {
                    Some(Num::Int(i)) => Ok(Value::from(i)),
                    Some(Num::Float(f)) if f.is_finite() => Ok(Value::from(f.trunc() as i64)),
                    Some(Num::Float(f)) => Err(ExpressionError::InvalidValue(format!(
                        "cannot convert float {f} to integer"
                    ))),
                    None => Err(ExpressionError::Type(format!(
                        "int() argument must be a string or a number, not '{}'",
                        other.kind()
                    ))),
                },
            }
        }
        "float" => {
            expect_args(name, &args, 0, 1)?;
            let Some(value) = args.first() else {
                return Ok(Value::from(0.0));
            };
            match value {
                Value::String(s) => {
                    let parsed = s.trim().parse::<f64>().map_err(|_| {
                        ExpressionError::InvalidValue(format!(
                            "could not convert string to float: {}",
                            repr(value)
                        ))
                    })?;
                    Num::Float(parsed).into_value()
                }
                other => Num::of(other)
                    .map(|n| Value::from(n.as_f64()))
                    .ok_or_else(|| {
                        ExpressionError::Type(format!(
                            "float() argument must be a string or a number, not '{}'",
                            other.kind()
                        ))
                    }),
            }
        }
        "bool" => {
            expect_args(name, &args, 0, 1)?;
            Ok(Value::Bool(args.first().is_some_and(ValueExt::is_truthy)))
        }
        other => Err(ExpressionError::Name(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::CompiledExpression;
    use serde_json::json;

    fn run(source: &str, ctx: &EvaluationContext) -> Result<Value, ExpressionError> {
        CompiledExpression::compile(source)?.evaluate(ctx)
    }

    fn ctx() -> EvaluationContext {
        EvaluationContext::new("case", json!({"x": 42}), json!({"y": 84, "items": [1, 2, 3]}))
    }

    #[test]
    fn test_context_access() {
        let ctx = ctx();
        assert_eq!(run("ctx.output['y'] == 84", &ctx).unwrap(), json!(true));
        assert_eq!(
            run("ctx.inputs['x'] * 2 == ctx.output['y']", &ctx).unwrap(),
            json!(true)
        );
        assert_eq!(run("ctx.output.items[-1]", &ctx).unwrap(), json!(3));
        assert_eq!(run("ctx.expected_output is None", &ctx).unwrap(), json!(true));
        assert_eq!(run("ctx.name", &ctx).unwrap(), json!("case"));
    }

    #[test]
    fn test_arithmetic() {
        let ctx = ctx();
        assert_eq!(run("7 // 2", &ctx).unwrap(), json!(3));
        assert_eq!(run("-7 // 2", &ctx).unwrap(), json!(-4));
        assert_eq!(run("-7 % 3", &ctx).unwrap(), json!(2));
        assert_eq!(run("7 / 2", &ctx).unwrap(), json!(3.5));
        assert_eq!(run("'ab' * 2 + 'c'", &ctx).unwrap(), json!("ababc"));
        assert_eq!(run("[1] + [2]", &ctx).unwrap(), json!([1, 2]));
        assert_eq!(run("1 / 0", &ctx), Err(ExpressionError::ZeroDivision));
    }

    #[test]
    fn test_boolean_operators_return_operands() {
        let ctx = ctx();
        assert_eq!(run("0 or 'fallback'", &ctx).unwrap(), json!("fallback"));
        assert_eq!(run("1 and []", &ctx).unwrap(), json!([]));
        assert_eq!(run("not ctx.output", &ctx).unwrap(), json!(false));
        assert_eq!(run("1 < 2 < 3", &ctx).unwrap(), json!(true));
        assert_eq!(run("1 < 3 < 2", &ctx).unwrap(), json!(false));
    }

    #[test]
    fn test_builtins_and_comprehensions() {
        let ctx = ctx();
        assert_eq!(
            run("all(k in ctx.output for k in ['y'])", &ctx).unwrap(),
            json!(true)
        );
        assert_eq!(
            run("any(i > 2 for i in ctx.output['items'])", &ctx).unwrap(),
            json!(true)
        );
        assert_eq!(
            run("[i * 10 for i in ctx.output['items'] if i != 2]", &ctx).unwrap(),
            json!([10, 30])
        );
        assert_eq!(run("len(ctx.output)", &ctx).unwrap(), json!(2));
        assert_eq!(run("sum(ctx.output['items'])", &ctx).unwrap(), json!(6));
        assert_eq!(run("max(ctx.output['items'])", &ctx).unwrap(), json!(3));
        assert_eq!(run("min(4, 2.5, 9)", &ctx).unwrap(), json!(2.5));
        assert_eq!(run("int('12') + float('0.5')", &ctx).unwrap(), json!(12.5));
        assert_eq!(run("str(ctx.output['items'])", &ctx).unwrap(), json!("[1, 2, 3]"));
        assert_eq!(run("abs(-3)", &ctx).unwrap(), json!(3));
        assert_eq!(run("bool('')", &ctx).unwrap(), json!(false));
    }

    #[test]
    fn test_errors() {
        let ctx = ctx();
        assert_eq!(
            run("undefined_var", &ctx),
            Err(ExpressionError::Name("undefined_var".to_string()))
        );
        assert_eq!(
            run("ctx.output + 1", &ctx),
            Err(ExpressionError::Type(
                "unsupported operand type(s) for +: 'dict' and 'int'".to_string()
            ))
        );
        assert!(matches!(run("ctx.output['z']", &ctx), Err(ExpressionError::Key(_))));
        assert!(matches!(
            run("ctx.output['items'][5]", &ctx),
            Err(ExpressionError::Index(_))
        ));
        assert!(matches!(run("ctx.missing", &ctx), Err(ExpressionError::Attribute(_))));
        assert!(matches!(run("1 in 2", &ctx), Err(ExpressionError::Type(_))));
        assert!(matches!(run("'a' < 1", &ctx), Err(ExpressionError::Type(_))));
        assert!(matches!(run("ctx", &ctx), Err(ExpressionError::Type(_))));
        assert!(matches!(run("open('x')", &ctx), Err(ExpressionError::Name(_))));
        assert!(matches!(run("min([])", &ctx), Err(ExpressionError::InvalidValue(_))));
        assert!(matches!(
            run("'x' * 10000000", &ctx),
            Err(ExpressionError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_sequence_repetition() {
        let ctx = ctx();
        assert_eq!(run("[1, 2] * 2", &ctx).unwrap(), json!([1, 2, 1, 2]));
        assert_eq!(run("2 * ['a']", &ctx).unwrap(), json!(["a", "a"]));
        assert_eq!(run("[1] * -3", &ctx).unwrap(), json!([]));
        assert_eq!(run("[] * 9223372036854775807", &ctx).unwrap(), json!([]));
    }

    #[test]
    fn test_sequence_size_is_capped() {
        let ctx = ctx();
        assert_eq!(run("len([1] * 1000000)", &ctx).unwrap(), json!(1_000_000));
        for source in [
            "len([1] * 1000000 + [1] * 1000000)",
            "len('x' * 1000000 + 'y' * 1000000)",
            "[[1] * 1000 for i in [1] * 3000]",
            "sum([[1] * 600000, [1] * 600000], [])",
            "[[1] * 1000] * 2000",
        ] {
            assert!(
                matches!(run(source, &ctx), Err(ExpressionError::InvalidValue(_))),
                "expected size error for {source:?}"
            );
        }
    }

    #[test]
    fn test_non_finite_results_are_errors() {
        let ctx = ctx();
        for source in ["1e308 * 10", "1e308 * 10 == None", "-1e308 - 1e308", "float('inf')"] {
            assert!(
                matches!(run(source, &ctx), Err(ExpressionError::InvalidValue(_))),
                "expected invalid value for {source:?}"
            );
        }
        assert_eq!(run("1e308 * 1", &ctx).unwrap(), json!(1e308));
    }

    #[test]
    fn test_long_chains_fail_to_compile() {
        let ctx = ctx();
        let source = format!("ctx.output['y']{}", " + 1".repeat(1000));
        assert!(matches!(
            CompiledExpression::compile(&source),
            Err(ExpressionError::Syntax { .. })
        ));

        let source = format!("ctx.output['y']{}", " + 1".repeat(30));
        assert_eq!(run(&source, &ctx).unwrap(), json!(114));
    }

    #[test]
    fn test_comprehension_scope_is_restored() {
        let ctx = ctx();
        assert!(matches!(
            run("[k for k in [1]] + [k]", &ctx),
            Err(ExpressionError::Name(_))
        ));
    }
}
