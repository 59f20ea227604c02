//! Tree-walking evaluator for the scriptlet language: a wall-clock
//! timeout, a step bound standing in for a recursion limit, and a
//! fixed maximum value count standing in for a memory cap.

use super::ast::{BinOp, Expr, Stmt, UnaryOp};
use super::host::Host;
use super::value::Value;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error("{0}")]
    ScriptFailed(String),
    #[error("execution step limit exceeded")]
    StepLimitExceeded,
    #[error("execution deadline exceeded")]
    DeadlineExceeded,
    #[error("recursion depth limit exceeded")]
    RecursionLimitExceeded,
    #[error("undefined name {0:?}")]
    UndefinedName(String),
    #[error("{0} is not callable")]
    NotCallable(String),
    #[error("type error: {0}")]
    TypeError(String),
    #[error("wrong number of arguments calling {name}: expected {expected}, got {got}")]
    ArgCount { name: String, expected: usize, got: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct ExecutionLimits {
    pub timeout: Duration,
    pub max_steps: u64,
    pub max_recursion: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_steps: 200_000,
            max_recursion: 64,
        }
    }
}

#[derive(Debug, Clone)]
struct Function {
    params: Vec<String>,
    body: Vec<Stmt>,
}

enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

pub struct Interpreter<'h> {
    globals: BTreeMap<String, Value>,
    functions: BTreeMap<String, Function>,
    host: &'h mut dyn Host,
    limits: ExecutionLimits,
    deadline: Instant,
    steps: u64,
    depth: usize,
}

impl<'h> Interpreter<'h> {
    pub fn new(host: &'h mut dyn Host, limits: ExecutionLimits) -> Self {
        Self {
            globals: BTreeMap::new(),
            functions: BTreeMap::new(),
            host,
            deadline: Instant::now() + limits.timeout,
            limits,
            steps: 0,
            depth: 0,
        }
    }

    /// Loads top-level function definitions and module-level statements
    /// from `program`, then calls `entry_point(args)`.
    pub fn run(&mut self, program: &[Stmt], entry_point: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let mut scope = BTreeMap::new();
        self.exec_block(program, &mut scope)?;
        let function = self
            .functions
            .get(entry_point)
            .ok_or_else(|| RuntimeError::UndefinedName(entry_point.to_string()))?
            .clone();
        self.call_function(&function, args)
    }

    fn tick(&mut self) -> Result<(), RuntimeError> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(RuntimeError::StepLimitExceeded);
        }
        if Instant::now() > self.deadline {
            return Err(RuntimeError::DeadlineExceeded);
        }
        Ok(())
    }

    fn exec_block(&mut self, stmts: &[Stmt], scope: &mut BTreeMap<String, Value>) -> Result<Flow, RuntimeError> {
        for stmt in stmts {
            self.tick()?;
            match self.exec_stmt(stmt, scope)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, scope: &mut BTreeMap<String, Value>) -> Result<Flow, RuntimeError> {
        match stmt {
            Stmt::FunctionDef { name, params, body } => {
                self.functions.insert(
                    name.clone(),
                    Function {
                        params: params.clone(),
                        body: body.clone(),
                    },
                );
                Ok(Flow::Normal)
            }
            Stmt::If { branches, else_body } => {
                for (cond, body) in branches {
                    if self.eval(cond, scope)?.truthy() {
                        return self.exec_block(body, scope);
                    }
                }
                self.exec_block(else_body, scope)
            }
            Stmt::While { cond, body } => {
                while self.eval(cond, scope)?.truthy() {
                    self.tick()?;
                    match self.exec_block(body, scope)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Continue | Flow::Normal => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For { var, iter, body } => {
                let items = match self.eval(iter, scope)? {
                    Value::List(items) => items,
                    other => return Err(RuntimeError::TypeError(format!("cannot iterate over {}", other.type_name()))),
                };
                for item in items {
                    self.tick()?;
                    scope.insert(var.clone(), item);
                    match self.exec_block(body, scope)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Continue | Flow::Normal => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Assign { target, value } => {
                let evaluated = self.eval(value, scope)?;
                match target {
                    Expr::Ident(name) => {
                        scope.insert(name.clone(), evaluated);
                    }
                    other => return Err(RuntimeError::TypeError(format!("cannot assign to {other:?}"))),
                }
                Ok(Flow::Normal)
            }
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(e) => self.eval(e, scope)?,
                    None => Value::None,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Expr(expr) => {
                self.eval(expr, scope)?;
                Ok(Flow::Normal)
            }
            Stmt::Pass => Ok(Flow::Normal),
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
        }
    }

    fn call_function(&mut self, function: &Function, args: Vec<Value>) -> Result<Value, RuntimeError> {
        if function.params.len() != args.len() {
            return Err(RuntimeError::ArgCount {
                name: "<function>".to_string(),
                expected: function.params.len(),
                got: args.len(),
            });
        }
        self.depth += 1;
        if self.depth > self.limits.max_recursion {
            self.depth -= 1;
            return Err(RuntimeError::RecursionLimitExceeded);
        }
        let mut scope: BTreeMap<String, Value> = function.params.iter().cloned().zip(args).collect();
        let result = self.exec_block(&function.body, &mut scope);
        self.depth -= 1;
        match result? {
            Flow::Return(v) => Ok(v),
            _ => Ok(Value::None),
        }
    }

    fn eval(&mut self, expr: &Expr, scope: &mut BTreeMap<String, Value>) -> Result<Value, RuntimeError> {
        self.tick()?;
        match expr {
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::Float(n) => Ok(Value::Float(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::None => Ok(Value::None),
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item, scope)?);
                }
                Ok(Value::List(values))
            }
            Expr::Ident(name) => scope
                .get(name)
                .or_else(|| self.globals.get(name))
                .cloned()
                .ok_or_else(|| RuntimeError::UndefinedName(name.clone())),
            Expr::Attribute(base, field) => {
                let base = self.eval(base, scope)?;
                match base {
                    Value::Dict(map) => Ok(map.get(field).cloned().unwrap_or(Value::None)),
                    other => Err(RuntimeError::TypeError(format!("{} has no attribute {field:?}", other.type_name()))),
                }
            }
            Expr::Subscript(base, index) => {
                let base = self.eval(base, scope)?;
                let index = self.eval(index, scope)?;
                match (base, index) {
                    (Value::Dict(map), Value::Str(key)) => Ok(map.get(&key).cloned().unwrap_or(Value::None)),
                    (Value::List(items), Value::Int(i)) => {
                        let idx = usize::try_from(i).map_err(|_| RuntimeError::TypeError("negative list index".into()))?;
                        items.get(idx).cloned().ok_or_else(|| RuntimeError::TypeError("list index out of range".into()))
                    }
                    (base, _) => Err(RuntimeError::TypeError(format!("{} is not subscriptable", base.type_name()))),
                }
            }
            Expr::Call(callee, args) => self.eval_call(callee, args, scope),
            Expr::Unary(UnaryOp::Not, inner) => Ok(Value::Bool(!self.eval(inner, scope)?.truthy())),
            Expr::Unary(UnaryOp::Neg, inner) => match self.eval(inner, scope)? {
                Value::Int(n) => Ok(Value::Int(-n)),
                Value::Float(n) => Ok(Value::Float(-n)),
                other => Err(RuntimeError::TypeError(format!("cannot negate {}", other.type_name()))),
            },
            Expr::Binary(left, op, right) => self.eval_binary(left, *op, right, scope),
        }
    }

    fn eval_binary(&mut self, left: &Expr, op: BinOp, right: &Expr, scope: &mut BTreeMap<String, Value>) -> Result<Value, RuntimeError> {
        if matches!(op, BinOp::And) {
            let left = self.eval(left, scope)?;
            return if left.truthy() { self.eval(right, scope) } else { Ok(left) };
        }
        if matches!(op, BinOp::Or) {
            let left = self.eval(left, scope)?;
            return if left.truthy() { Ok(left) } else { self.eval(right, scope) };
        }

        let left = self.eval(left, scope)?;
        let right = self.eval(right, scope)?;
        match op {
            BinOp::Eq => Ok(Value::Bool(values_equal(&left, &right))),
            BinOp::NotEq => Ok(Value::Bool(!values_equal(&left, &right))),
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => arithmetic(op, &left, &right),
            BinOp::Lt | BinOp::Gt | BinOp::LtEq | BinOp::GtEq => compare(op, &left, &right),
            BinOp::And | BinOp::Or => unreachable!("handled above"),
        }
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr], scope: &mut BTreeMap<String, Value>) -> Result<Value, RuntimeError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg, scope)?);
        }

        let Expr::Ident(name) = callee else {
            return Err(RuntimeError::NotCallable(format!("{callee:?}")));
        };

        if let Some(function) = self.functions.get(name).cloned() {
            return self.call_function(&function, values);
        }

        self.call_host_primitive(name, values)
    }

    fn call_host_primitive(&mut self, name: &str, mut args: Vec<Value>) -> Result<Value, RuntimeError> {
        match name {
            "log_info" | "log_warn" | "log_error" => {
                let level = match name {
                    "log_warn" => tracing::Level::WARN,
                    "log_error" => tracing::Level::ERROR,
                    _ => tracing::Level::INFO,
                };
                let message = args.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ");
                self.host.log(level, message);
                Ok(Value::None)
            }
            "set_cluster_member_target" => {
                let name = args.pop().and_then(|v| v.as_str().map(str::to_string)).ok_or_else(|| {
                    RuntimeError::TypeError("set_cluster_member_target expects a member name".into())
                })?;
                self.host.set_cluster_member_target(name);
                Ok(Value::None)
            }
            "get_cluster_member_state" => {
                let member = args.pop().and_then(|v| v.as_str().map(str::to_string)).ok_or_else(|| {
                    RuntimeError::TypeError("get_cluster_member_state expects a member name".into())
                })?;
                Ok(self.host.get_cluster_member_state(&member).unwrap_or(Value::None))
            }
            "get_cluster_member_resources" => {
                let member = args.pop().and_then(|v| v.as_str().map(str::to_string)).ok_or_else(|| {
                    RuntimeError::TypeError("get_cluster_member_resources expects a member name".into())
                })?;
                Ok(self.host.get_cluster_member_resources(&member).unwrap_or(Value::None))
            }
            "get_instance_resources" => Ok(self.host.get_instance_resources()),
            "fail" => {
                let message = args.first().map(ToString::to_string).unwrap_or_default();
                Err(RuntimeError::ScriptFailed(message))
            }
            "len" => match args.first() {
                Some(Value::List(items)) => Ok(Value::Int(items.len() as i64)),
                Some(Value::Str(s)) => Ok(Value::Int(s.len() as i64)),
                _ => Err(RuntimeError::TypeError("len() expects a list or string".into())),
            },
            other => Err(RuntimeError::NotCallable(other.to_string())),
        }
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => a == b,
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::None, Value::None) => true,
        (Value::List(a), Value::List(b)) => a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y)),
        _ => false,
    }
}

fn arithmetic(op: BinOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) if matches!(op, BinOp::Add) => Ok(Value::Str(format!("{a}{b}"))),
        (Value::Int(a), Value::Int(b)) => match op {
            BinOp::Add => Ok(Value::Int(a + b)),
            BinOp::Sub => Ok(Value::Int(a - b)),
            BinOp::Mul => Ok(Value::Int(a * b)),
            BinOp::Div => {
                if *b == 0 {
                    Err(RuntimeError::TypeError("division by zero".into()))
                } else {
                    Ok(Value::Int(a / b))
                }
            }
            BinOp::Mod => {
                if *b == 0 {
                    Err(RuntimeError::TypeError("modulo by zero".into()))
                } else {
                    Ok(Value::Int(a % b))
                }
            }
            _ => unreachable!(),
        },
        (a, b) => {
            let (a, b) = (as_f64(a)?, as_f64(b)?);
            match op {
                BinOp::Add => Ok(Value::Float(a + b)),
                BinOp::Sub => Ok(Value::Float(a - b)),
                BinOp::Mul => Ok(Value::Float(a * b)),
                BinOp::Div => Ok(Value::Float(a / b)),
                BinOp::Mod => Ok(Value::Float(a % b)),
                _ => unreachable!(),
            }
        }
    }
}

fn compare(op: BinOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    let ordering = match (left, right) {
        (Value::Str(a), Value::Str(b)) => a.cmp(b),
        (a, b) => as_f64(a)?.partial_cmp(&as_f64(b)?).ok_or_else(|| RuntimeError::TypeError("cannot compare NaN".into()))?,
    };
    Ok(Value::Bool(match op {
        BinOp::Lt => ordering.is_lt(),
        BinOp::Gt => ordering.is_gt(),
        BinOp::LtEq => ordering.is_le(),
        BinOp::GtEq => ordering.is_ge(),
        _ => unreachable!(),
    }))
}

fn as_f64(value: &Value) -> Result<f64, RuntimeError> {
    match value {
        Value::Int(n) => Ok(*n as f64),
        Value::Float(n) => Ok(*n),
        other => Err(RuntimeError::TypeError(format!("expected a number, found {}", other.type_name()))),
    }
}

#[cfg(test)]
mod tests {
    use super::super::lexer::tokenize;
    use super::super::parser::parse;
    use super::*;

    fn run_script(src: &str, host: &mut dyn Host) -> Result<Value, RuntimeError> {
        let tokens = tokenize(src).unwrap();
        let program = parse(tokens).unwrap();
        let mut interp = Interpreter::new(host, ExecutionLimits::default());
        interp.run(&program, "instance_placement", vec![Value::None, Value::None])
    }

    #[test]
    fn fail_call_aborts_with_the_script_message() {
        let src = "def instance_placement(request, candidates):\n    fail(\"no\")\n";
        let mut host = super::super::host::StaticHost::new(Value::None);
        let err = run_script(src, &mut host).unwrap_err();
        assert_eq!(err, RuntimeError::ScriptFailed("no".into()));
    }

    #[test]
    fn set_cluster_member_target_records_the_chosen_member() {
        let src = "def instance_placement(request, candidates):\n    set_cluster_member_target(\"m2\")\n    return None\n";
        let mut host = super::super::host::StaticHost::new(Value::None);
        run_script(src, &mut host).unwrap();
        assert_eq!(host.target, Some("m2".to_string()));
    }

    #[test]
    fn infinite_loop_hits_the_step_limit() {
        let src = "def instance_placement(request, candidates):\n    while True:\n        x = 1\n    return None\n";
        let mut host = super::super::host::StaticHost::new(Value::None);
        let tokens = tokenize(src).unwrap();
        let program = parse(tokens).unwrap();
        let mut interp = Interpreter::new(
            &mut host,
            ExecutionLimits {
                timeout: Duration::from_secs(5),
                max_steps: 1_000,
                max_recursion: 64,
            },
        );
        let err = interp.run(&program, "instance_placement", vec![Value::None, Value::None]).unwrap_err();
        assert_eq!(err, RuntimeError::StepLimitExceeded);
    }

    #[test]
    fn unbounded_recursion_hits_the_recursion_limit() {
        let src = "def loop(n):\n    return loop(n + 1)\ndef instance_placement(request, candidates):\n    return loop(0)\n";
        let mut host = super::super::host::StaticHost::new(Value::None);
        let tokens = tokenize(src).unwrap();
        let program = parse(tokens).unwrap();
        let mut interp = Interpreter::new(&mut host, ExecutionLimits::default());
        let err = interp.run(&program, "instance_placement", vec![Value::None, Value::None]).unwrap_err();
        assert_eq!(err, RuntimeError::RecursionLimitExceeded);
    }
}
