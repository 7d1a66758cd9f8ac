//! Script interpreter.
//!
//! Single task, statements run in order. Tool calls, `connect` and `wait`
//! are the only suspension points and all of them observe the
//! interpreter's cancellation token.

use super::ast::{BinaryOp, Expr, Procedure, Script, Stmt, UnaryOp};
use super::format::format_expr;
use super::value::Value;
use super::{DslError, DslResult};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_WAIT_INTERVAL: Duration = Duration::from_millis(100);

/// Tool name handled by the interpreter itself instead of being called.
const LIST_TOOLS: &str = "list_tools";

const BUILTINS: [&str; 5] = ["len", "str", "int", "float", "json"];

/// One item of a tool result.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolContent {
    Text(String),
    /// Non-text content (images, resources) in its wire form.
    Other(JsonValue),
}

impl ToolContent {
    /// Text that parses as JSON becomes the parsed value, other text stays a string.
    pub fn into_value(self) -> Value {
        match self {
            ToolContent::Text(text) => match serde_json::from_str::<JsonValue>(&text) {
                Ok(json) => Value::from(json),
                Err(_) => Value::String(text),
            },
            ToolContent::Other(json) => Value::from(json),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    pub content: Vec<ToolContent>,
    pub is_error: bool,
}

/// How to start an MCP server process.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectSpec {
    pub command: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

/// A live session with an MCP server.
#[async_trait]
pub trait ToolClient: Send {
    async fn call_tool(&mut self, name: &str, args: Map<String, JsonValue>) -> DslResult<ToolOutput>;

    async fn list_tools(&mut self) -> DslResult<Vec<String>>;

    async fn close(&mut self) -> DslResult<()>;
}

/// Opens [`ToolClient`] sessions for `connect` statements.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, spec: &ConnectSpec) -> DslResult<Box<dyn ToolClient>>;
}

pub struct Interpreter {
    connector: Arc<dyn Connector>,
    client: Option<Box<dyn ToolClient>>,
    variables: HashMap<String, Value>,
    procedures: HashMap<String, Arc<Procedure>>,
    output: String,
    echo: bool,
    ct: CancellationToken,
}

impl Interpreter {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            client: None,
            variables: HashMap::new(),
            procedures: HashMap::new(),
            output: String::new(),
            echo: true,
            ct: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, ct: CancellationToken) -> Self {
        self.ct = ct;
        self
    }

    /// Whether `print` also writes to stdout. On by default.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Everything printed so far, one line per `print`.
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    pub async fn execute(&mut self, script: &Script) -> DslResult<()> {
        self.exec_block(&script.statements).await
    }

    pub async fn execute_source(&mut self, source: &str) -> DslResult<()> {
        let script = super::parse(source)?;
        self.execute(&script).await
    }

    pub async fn execute_file(&mut self, path: &Path) -> DslResult<()> {
        let source = tokio::fs::read_to_string(path).await?;
        self.execute_source(&source).await
    }

    /// Shut down the current session, if any.
    pub async fn close(&mut self) -> DslResult<()> {
        match self.client.take() {
            Some(mut client) => client.close().await,
            None => Ok(()),
        }
    }

    // ── Statements ──────────────────────────────────────────────────────

    fn exec_block<'a>(&'a mut self, body: &'a [Stmt]) -> BoxFuture<'a, DslResult<()>> {
        async move {
            for stmt in body {
                self.exec(stmt).await?;
            }
            Ok(())
        }
        .boxed()
    }

    async fn exec(&mut self, stmt: &Stmt) -> DslResult<()> {
        if self.ct.is_cancelled() {
            return Err(DslError::Cancelled);
        }

        match stmt {
            Stmt::Connect {
                server,
                args,
                options,
            } => self.connect(server, args, options).await,
            Stmt::Call { tool, args, target } => {
                self.call(tool, args.as_ref(), target.as_deref()).await
            }
            Stmt::Assert { condition, message } => {
                if self.eval(condition)?.is_truthy() {
                    return Ok(());
                }
                let message = message
                    .clone()
                    .unwrap_or_else(|| format!("assertion failed: {}", format_expr(condition)));
                Err(DslError::Assertion(message))
            }
            Stmt::Wait {
                condition,
                timeout,
                interval,
            } => self.wait(condition, timeout.as_ref(), interval.as_ref()).await,
            Stmt::Loop {
                var,
                collection,
                body,
            } => {
                for item in iterate(self.eval(collection)?)? {
                    self.variables.insert(var.clone(), item);
                    self.exec_block(body).await?;
                }
                Ok(())
            }
            Stmt::If {
                condition,
                then_body,
                else_body,
            } => {
                if self.eval(condition)?.is_truthy() {
                    self.exec_block(then_body).await
                } else if let Some(else_body) = else_body {
                    self.exec_block(else_body).await
                } else {
                    Ok(())
                }
            }
            Stmt::Set { var, value } => {
                let value = self.eval(value)?;
                self.variables.insert(var.clone(), value);
                Ok(())
            }
            Stmt::Print(expr) => {
                let text = self.eval(expr)?.display();
                self.output.push_str(&text);
                self.output.push('\n');
                if self.echo {
                    println!("{}", text);
                }
                Ok(())
            }
            Stmt::Define(procedure) => {
                self.procedures
                    .insert(procedure.name.clone(), Arc::new(procedure.clone()));
                Ok(())
            }
            Stmt::Run { name, args } => self.run_procedure(name, args).await,
        }
    }

    async fn connect(&mut self, server: &Expr, args: &[Expr], options: &[(String, Expr)]) -> DslResult<()> {
        let command = match self.eval(server)? {
            Value::String(command) => command,
            other => {
                return Err(DslError::Runtime(format!(
                    "server must be a string, got {}",
                    other.type_name()
                )))
            }
        };

        let args = args
            .iter()
            .map(|arg| self.eval(arg).map(|v| v.display()))
            .collect::<DslResult<Vec<_>>>()?;

        let mut env = Vec::new();
        for (name, expr) in options {
            match (name.as_str(), self.eval(expr)?) {
                ("env", Value::Object(vars)) => {
                    env.extend(vars.into_iter().map(|(k, v)| (k, v.display())));
                }
                ("env", other) => {
                    return Err(DslError::Runtime(format!(
                        "env option must be an object, got {}",
                        other.type_name()
                    )))
                }
                (other, _) => tracing::debug!("Ignoring connect option '{}'", other),
            }
        }

        if let Some(mut previous) = self.client.take() {
            if let Err(e) = previous.close().await {
                tracing::warn!("Failed to close previous MCP session: {}", e);
            }
        }

        let spec = ConnectSpec { command, args, env };
        tracing::info!("Connecting to MCP server: {} {:?}", spec.command, spec.args);
        let client = tokio::select! {
            _ = self.ct.cancelled() => return Err(DslError::Cancelled),
            client = self.connector.connect(&spec) => client?,
        };
        self.client = Some(client);
        Ok(())
    }

    async fn call(&mut self, tool: &str, args: Option<&Expr>, target: Option<&str>) -> DslResult<()> {
        if self.client.is_none() {
            return Err(DslError::Runtime("not connected to any MCP server".to_string()));
        }

        let ct = self.ct.clone();

        if tool == LIST_TOOLS {
            let Some(client) = self.client.as_mut() else {
                return Err(DslError::Runtime("not connected to any MCP server".to_string()));
            };
            let names = tokio::select! {
                _ = ct.cancelled() => return Err(DslError::Cancelled),
                names = client.list_tools() => names?,
            };
            if let Some(target) = target {
                let names = names.into_iter().map(Value::String).collect();
                self.variables.insert(target.to_string(), Value::Array(names));
            }
            return Ok(());
        }

        let args = match args {
            Some(expr) => Some(self.eval(expr)?),
            None => None,
        };
        let arguments = tool_arguments(args)?;

        let Some(client) = self.client.as_mut() else {
            return Err(DslError::Runtime("not connected to any MCP server".to_string()));
        };
        let output = tokio::select! {
            _ = ct.cancelled() => return Err(DslError::Cancelled),
            output = client.call_tool(tool, arguments) => output?,
        };
        if output.is_error {
            tracing::debug!("Tool {} returned an error result", tool);
        }

        if let Some(target) = target {
            let mut values: Vec<Value> = output.content.into_iter().map(ToolContent::into_value).collect();
            let value = if values.len() == 1 {
                values.remove(0)
            } else {
                Value::Array(values)
            };
            self.variables.insert(target.to_string(), value);
        }
        Ok(())
    }

    async fn wait(&mut self, condition: &Expr, timeout: Option<&Expr>, interval: Option<&Expr>) -> DslResult<()> {
        let timeout = match timeout {
            Some(expr) => duration(self.eval(expr)?, "timeout", 1.0)?,
            None => DEFAULT_WAIT_TIMEOUT,
        };
        let interval = match interval {
            Some(expr) => duration(self.eval(expr)?, "interval", 0.001)?,
            None => DEFAULT_WAIT_INTERVAL,
        };

        let deadline = Instant::now() + timeout;
        loop {
            if self.eval(condition)?.is_truthy() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DslError::WaitTimeout(timeout));
            }
            tokio::select! {
                _ = self.ct.cancelled() => return Err(DslError::Cancelled),
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    /// Runs the body in a copy of the caller's scope; writes do not flow back.
    async fn run_procedure(&mut self, name: &str, args: &[Expr]) -> DslResult<()> {
        let procedure = self
            .procedures
            .get(name)
            .cloned()
            .ok_or_else(|| DslError::Runtime(format!("procedure '{}' not defined", name)))?;

        if args.len() != procedure.params.len() {
            return Err(DslError::Runtime(format!(
                "procedure '{}' expects {} arguments, got {}",
                name,
                procedure.params.len(),
                args.len()
            )));
        }

        let values = args
            .iter()
            .map(|arg| self.eval(arg))
            .collect::<DslResult<Vec<_>>>()?;

        let saved = self.variables.clone();
        for (param, value) in procedure.params.iter().zip(values) {
            self.variables.insert(param.clone(), value);
        }
        let result = self.exec_block(&procedure.body).await;
        self.variables = saved;
        result
    }

    // ── Expressions ─────────────────────────────────────────────────────

    fn eval(&self, expr: &Expr) -> DslResult<Value> {
        let value = match expr {
            Expr::Null => Value::Null,
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Number(n) => Value::Number(*n),
            Expr::Str(s) => Value::String(s.clone()),
            Expr::Object(fields) => {
                let mut map = BTreeMap::new();
                for (key, expr) in fields {
                    map.insert(key.clone(), self.eval(expr)?);
                }
                Value::Object(map)
            }
            Expr::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<DslResult<_>>()?,
            ),
            Expr::Var(name) => self
                .variables
                .get(name)
                .cloned()
                .ok_or_else(|| DslError::UndefinedVariable(name.clone()))?,
            Expr::Field(object, field) => field_of(self.eval(object)?, field)?,
            Expr::Index(object, index) => index_of(self.eval(object)?, &self.eval(index)?)?,
            Expr::Unary(op, operand) => unary(*op, self.eval(operand)?)?,
            Expr::Binary(left, op, right) => self.binary(left, *op, right)?,
            Expr::Call(name, args) => self.builtin(name, args)?,
        };
        Ok(value)
    }

    fn binary(&self, left: &Expr, op: BinaryOp, right: &Expr) -> DslResult<Value> {
        let l = self.eval(left)?;
        let r = match op {
            BinaryOp::And if !l.is_truthy() => return Ok(Value::Bool(false)),
            BinaryOp::Or if l.is_truthy() => return Ok(Value::Bool(true)),
            _ => self.eval(right)?,
        };

        match op {
            BinaryOp::And | BinaryOp::Or => Ok(Value::Bool(r.is_truthy())),
            BinaryOp::Eq => Ok(Value::Bool(l == r)),
            BinaryOp::Ne => Ok(Value::Bool(l != r)),
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
                let ordering = l.compare(&r).ok_or_else(|| {
                    DslError::Runtime(format!("cannot compare {} and {}", l.type_name(), r.type_name()))
                })?;
                let result = match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Gt => ordering.is_gt(),
                    BinaryOp::Le => ordering.is_le(),
                    _ => ordering.is_ge(),
                };
                Ok(Value::Bool(result))
            }
            BinaryOp::Add => match (&l, &r) {
                (Value::String(a), _) => Ok(Value::String(format!("{}{}", a, r.display()))),
                (_, Value::String(b)) => Ok(Value::String(format!("{}{}", l.display(), b))),
                _ => arithmetic(op, &l, &r),
            },
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => arithmetic(op, &l, &r),
        }
    }

    fn builtin(&self, name: &str, args: &[Expr]) -> DslResult<Value> {
        if !BUILTINS.contains(&name) {
            return Err(DslError::Runtime(format!("unknown function: {}", name)));
        }
        if args.len() != 1 {
            return Err(DslError::Runtime(format!(
                "{}() expects 1 argument, got {}",
                name,
                args.len()
            )));
        }

        let arg = self.eval(&args[0])?;
        let cannot = |what: &str| DslError::Runtime(format!("cannot convert {} to {}", arg.type_name(), what));
        match name {
            "len" => {
                let len = match &arg {
                    Value::String(s) => s.chars().count(),
                    Value::Array(items) => items.len(),
                    Value::Object(map) => map.len(),
                    other => {
                        return Err(DslError::Runtime(format!(
                            "cannot get length of {}",
                            other.type_name()
                        )))
                    }
                };
                Ok(Value::Number(len as f64))
            }
            "str" => Ok(Value::String(arg.display())),
            "int" => arg
                .as_integer()
                .map(|n| Value::Number(n as f64))
                .ok_or_else(|| cannot("int")),
            "float" => arg.as_number().map(Value::Number).ok_or_else(|| cannot("float")),
            "json" => Ok(Value::String(arg.to_json())),
            _ => Err(DslError::Runtime(format!("unknown function: {}", name))),
        }
    }
}

fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> DslResult<Value> {
    let (Some(a), Some(b)) = (l.as_number(), r.as_number()) else {
        let verb = match op {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "subtract",
            BinaryOp::Mul => "multiply",
            _ => "divide",
        };
        return Err(DslError::Runtime(format!(
            "cannot {} {} and {}",
            verb,
            l.type_name(),
            r.type_name()
        )));
    };

    let n = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        _ if b == 0.0 => return Err(DslError::DivisionByZero),
        _ => a / b,
    };
    Ok(Value::Number(n))
}

fn unary(op: UnaryOp, operand: Value) -> DslResult<Value> {
    match (op, operand) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
        (UnaryOp::Neg, Value::Number(n)) => Ok(Value::Number(-n)),
        (UnaryOp::Neg, other) => Err(DslError::Runtime(format!("cannot negate {}", other.type_name()))),
    }
}

fn field_of(object: Value, field: &str) -> DslResult<Value> {
    match object {
        Value::Object(mut map) => Ok(map.remove(field).unwrap_or_default()),
        other => Err(DslError::Runtime(format!(
            "cannot access field '{}' on {}",
            field,
            other.type_name()
        ))),
    }
}

fn index_of(object: Value, index: &Value) -> DslResult<Value> {
    match object {
        Value::Array(mut items) => {
            let i = integer_index(index, "array")?;
            if i < 0 || i as usize >= items.len() {
                return Err(DslError::OutOfBounds { kind: "array", index: i });
            }
            Ok(items.swap_remove(i as usize))
        }
        Value::Object(mut map) => Ok(map.remove(&index.display()).unwrap_or_default()),
        Value::String(s) => {
            let i = integer_index(index, "string")?;
            usize::try_from(i)
                .ok()
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::String(c.to_string()))
                .ok_or(DslError::OutOfBounds { kind: "string", index: i })
        }
        other => Err(DslError::Runtime(format!("cannot index {}", other.type_name()))),
    }
}

fn integer_index(index: &Value, kind: &str) -> DslResult<i64> {
    index.as_integer().ok_or_else(|| {
        DslError::Runtime(format!("{} index must be an integer, got {}", kind, index.type_name()))
    })
}

/// Arrays yield elements, objects `{key, value}` pairs, strings characters.
fn iterate(collection: Value) -> DslResult<Vec<Value>> {
    match collection {
        Value::Array(items) => Ok(items),
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(key, value)| {
                let mut pair = BTreeMap::new();
                pair.insert("key".to_string(), Value::String(key));
                pair.insert("value".to_string(), value);
                Value::Object(pair)
            })
            .collect()),
        Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
        other => Err(DslError::Runtime(format!(
            "value is not iterable: {}",
            other.type_name()
        ))),
    }
}

/// Coerce evaluated `call` arguments into the MCP argument map.
fn tool_arguments(args: Option<Value>) -> DslResult<Map<String, JsonValue>> {
    match args {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(value @ Value::Object(_)) => match JsonValue::from(&value) {
            JsonValue::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        },
        Some(other) => Err(DslError::Runtime(format!(
            "tool arguments must be an object, got {}",
            other.type_name()
        ))),
    }
}

fn duration(value: Value, what: &str, unit_secs: f64) -> DslResult<Duration> {
    let Value::Number(n) = value else {
        return Err(DslError::Runtime(format!(
            "{} must be a number, got {}",
            what,
            value.type_name()
        )));
    };
    Duration::try_from_secs_f64(n * unit_secs)
        .map_err(|_| DslError::Runtime(format!("{} must be a non-negative number", what)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    type Calls = Arc<Mutex<Vec<(String, Map<String, JsonValue>)>>>;

    struct EchoClient {
        calls: Calls,
    }

    #[async_trait]
    impl ToolClient for EchoClient {
        async fn call_tool(&mut self, name: &str, args: Map<String, JsonValue>) -> DslResult<ToolOutput> {
            self.calls.lock().push((name.to_string(), args.clone()));
            let content = match name {
                "pair" => vec![
                    ToolContent::Text("{\"n\": 1}".into()),
                    ToolContent::Text("plain".into()),
                ],
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    vec![]
                }
                _ => vec![ToolContent::Text(JsonValue::Object(args).to_string())],
            };
            Ok(ToolOutput {
                content,
                is_error: false,
            })
        }

        async fn list_tools(&mut self) -> DslResult<Vec<String>> {
            Ok(vec!["echo".into(), "pair".into()])
        }

        async fn close(&mut self) -> DslResult<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct EchoConnector {
        calls: Calls,
        specs: Arc<Mutex<Vec<ConnectSpec>>>,
    }

    #[async_trait]
    impl Connector for EchoConnector {
        async fn connect(&self, spec: &ConnectSpec) -> DslResult<Box<dyn ToolClient>> {
            self.specs.lock().push(spec.clone());
            Ok(Box::new(EchoClient {
                calls: self.calls.clone(),
            }))
        }
    }

    fn interpreter() -> Interpreter {
        Interpreter::new(Arc::new(EchoConnector::default())).with_echo(false)
    }

    async fn run(source: &str) -> DslResult<Interpreter> {
        let mut interp = interpreter();
        interp.execute_source(source).await?;
        Ok(interp)
    }

    async fn eval(source: &str) -> Value {
        let interp = run(&format!("set result = {}", source)).await.unwrap();
        interp.variable("result").cloned().unwrap()
    }

    async fn eval_err(source: &str) -> DslError {
        run(&format!("set result = {}", source)).await.err().unwrap()
    }

    #[tokio::test]
    async fn set_and_print() {
        let interp = run("set x = 1 + 2\nprint x").await.unwrap();
        assert_eq!(interp.output(), "3\n");
        assert_eq!(interp.variable("x"), Some(&Value::Number(3.0)));
    }

    #[tokio::test]
    async fn loop_sum() {
        run("set s = 0\nloop n in [1,2,3] { set s = s + n }\nassert s == 6").await.unwrap();
    }

    #[tokio::test]
    async fn loop_over_object_and_string() {
        let interp = run(
            "set keys = \"\"\nloop kv in {b: 2, a: 1} { keys = keys + kv.key }\n\
             set chars = 0\nloop c in \"héllo\" { chars = chars + 1 }",
        )
        .await
        .unwrap();
        assert_eq!(interp.variable("keys"), Some(&Value::from("ab")));
        assert_eq!(interp.variable("chars"), Some(&Value::Number(5.0)));
    }

    #[tokio::test]
    async fn string_concatenation() {
        assert_eq!(eval("\"n=\" + 4").await, Value::from("n=4"));
        assert_eq!(eval("[1] + \"!\"").await, Value::from("[\n  1\n]!"));
        assert_eq!(eval("\"a\" + null").await, Value::from("anull"));
    }

    #[tokio::test]
    async fn arithmetic_and_errors() {
        assert_eq!(eval("7 - 2 * 3").await, Value::Number(1.0));
        assert_eq!(eval("\"6\" / 4").await, Value::Number(1.5));
        assert!(matches!(eval_err("1 / 0").await, DslError::DivisionByZero));
        assert_eq!(eval_err("true * 2").await.to_string(), "cannot multiply boolean and number");
        assert_eq!(eval_err("-\"x\"").await.to_string(), "cannot negate string");
    }

    #[tokio::test]
    async fn comparisons() {
        assert_eq!(eval("\"apple\" < \"banana\"").await, Value::Bool(true));
        assert_eq!(eval("\"10\" > 9").await, Value::Bool(true));
        assert_eq!(eval("2 <= 2").await, Value::Bool(true));
        assert!(eval_err("null < 1").await.to_string().contains("cannot compare"));
    }

    #[tokio::test]
    async fn deep_equality() {
        assert_eq!(eval("{a: [1, {b: 2}]} == {a: [1, {b: 2}]}").await, Value::Bool(true));
        assert_eq!(eval("[1, 2] != [2, 1]").await, Value::Bool(true));
        assert_eq!(eval("1 == \"1\"").await, Value::Bool(false));
        assert_eq!(eval("null == null").await, Value::Bool(true));
    }

    #[tokio::test]
    async fn logical_operators_short_circuit() {
        // The right side would fail if evaluated
        assert_eq!(eval("false && missing").await, Value::Bool(false));
        assert_eq!(eval("1 || missing").await, Value::Bool(true));
        assert_eq!(eval("1 && \"\"").await, Value::Bool(false));
    }

    #[tokio::test]
    async fn or_returns_right_truthiness() {
        assert_eq!(eval("false || 0").await, Value::Bool(false));
        assert_eq!(eval("false || \"x\"").await, Value::Bool(true));
        assert_eq!(eval("null || []").await, Value::Bool(false));
    }

    #[tokio::test]
    async fn field_and_index_access() {
        assert_eq!(eval("{a: {b: 5}}.a.b").await, Value::Number(5.0));
        assert_eq!(eval("{a: 1}.missing").await, Value::Null);
        assert_eq!(eval("[10, 20, 30][1.9]").await, Value::Number(20.0));
        assert_eq!(eval("{\"1\": \"one\"}[1]").await, Value::from("one"));
        assert_eq!(eval("\"héllo\"[1]").await, Value::from("é"));
        assert!(matches!(
            eval_err("[1][3]").await,
            DslError::OutOfBounds { kind: "array", index: 3 }
        ));
        assert!(matches!(
            eval_err("\"ab\"[-1]").await,
            DslError::OutOfBounds { kind: "string", index: -1 }
        ));
        assert!(eval_err("5.x").await.to_string().contains("cannot access field 'x' on number"));
    }

    #[tokio::test]
    async fn builtins() {
        assert_eq!(eval("len(\"héllo\")").await, Value::Number(5.0));
        assert_eq!(eval("len({a: 1, b: 2})").await, Value::Number(2.0));
        assert_eq!(eval("str(12)").await, Value::from("12"));
        assert_eq!(eval("int(\"42\")").await, Value::Number(42.0));
        assert_eq!(eval("int(3.7)").await, Value::Number(3.0));
        assert_eq!(eval("float(\"2.5\")").await, Value::Number(2.5));
        assert_eq!(eval("json({b: [1, true], a: null})").await, Value::from(r#"{"a":null,"b":[1,true]}"#));
        assert_eq!(eval_err("len(1, 2)").await.to_string(), "len() expects 1 argument, got 2");
        assert_eq!(eval_err("nope(1)").await.to_string(), "unknown function: nope");
        assert!(eval_err("int(\"abc\")").await.to_string().contains("cannot convert string to int"));
    }

    #[tokio::test]
    async fn undefined_variable() {
        assert!(matches!(eval_err("ghost + 1").await, DslError::UndefinedVariable(name) if name == "ghost"));
    }

    #[tokio::test]
    async fn assertion_messages() {
        let err = run("assert 1 == 2, \"numbers differ\"").await.err().unwrap();
        assert_eq!(err.to_string(), "assertion error: numbers differ");

        let err = run("set x = 1\nassert x > 5").await.err().unwrap();
        assert_eq!(err.to_string(), "assertion error: assertion failed: (x > 5)");
    }

    #[tokio::test]
    async fn procedures_use_scope_snapshot() {
        let interp = run(
            "set x = 1\nset seen = 0\n\
             define bump(delta) {\n  set x = x + delta\n  set seen = x\n  set local = true\n}\n\
             run bump(10)",
        )
        .await
        .unwrap();
        assert_eq!(interp.variable("x"), Some(&Value::Number(1.0)));
        assert_eq!(interp.variable("seen"), Some(&Value::Number(0.0)));
        assert_eq!(interp.variable("local"), None);
        assert_eq!(interp.variable("delta"), None);
    }

    #[tokio::test]
    async fn procedure_scope_restored_on_error() {
        let mut interp = interpreter();
        let err = interp
            .execute_source("set x = 1\ndefine fail() {\n  set x = 2\n  assert false\n}\nrun fail")
            .await
            .unwrap_err();
        assert!(matches!(err, DslError::Assertion(_)));
        assert_eq!(interp.variable("x"), Some(&Value::Number(1.0)));
    }

    #[tokio::test]
    async fn run_checks_definition_and_arity() {
        let err = run("run missing").await.err().unwrap();
        assert_eq!(err.to_string(), "procedure 'missing' not defined");

        let err = run("define two(a, b) { print a }\nrun two(1)").await.err().unwrap();
        assert_eq!(err.to_string(), "procedure 'two' expects 2 arguments, got 1");
    }

    #[tokio::test]
    async fn print_formats() {
        let interp = run("print \"text\"\nprint null\nprint {k: [1, 2.5]}\nprint true").await.unwrap();
        assert_eq!(
            interp.output(),
            "text\nnull\n{\n  \"k\": [\n    1,\n    2.5\n  ]\n}\ntrue\n"
        );
    }

    #[tokio::test]
    async fn call_requires_connection() {
        let err = run("call echo {a: 1}").await.err().unwrap();
        assert_eq!(err.to_string(), "not connected to any MCP server");
    }

    #[tokio::test]
    async fn connect_evaluates_args_and_env() {
        let connector = Arc::new(EchoConnector::default());
        let mut interp = Interpreter::new(connector.clone()).with_echo(false);
        interp
            .execute_source("set port = 9000\nconnect \"./server\" \"--port\" port { env: {LEVEL: \"debug\", N: 2}\n other: 1 }")
            .await
            .unwrap();
        assert!(interp.is_connected());

        let specs = connector.specs.lock();
        assert_eq!(specs[0].command, "./server");
        assert_eq!(specs[0].args, vec!["--port", "9000"]);
        assert_eq!(
            specs[0].env,
            vec![("LEVEL".to_string(), "debug".to_string()), ("N".to_string(), "2".to_string())]
        );
    }

    #[tokio::test]
    async fn connect_rejects_non_string_server() {
        let err = run("connect 42").await.err().unwrap();
        assert_eq!(err.to_string(), "server must be a string, got number");
    }

    #[tokio::test]
    async fn call_binds_decoded_results() {
        let connector = Arc::new(EchoConnector::default());
        let mut interp = Interpreter::new(connector.clone()).with_echo(false);
        interp
            .execute_source(
                "connect \"srv\"\ncall echo {a: 1, nested: {b: \"x\"}} -> r\ncall pair -> both\n\
                 call list_tools -> tools\ncall echo",
            )
            .await
            .unwrap();

        assert_eq!(interp.variable("r").unwrap().to_json(), r#"{"a":1,"nested":{"b":"x"}}"#);
        assert_eq!(interp.variable("both").unwrap().to_json(), r#"[{"n":1},"plain"]"#);
        assert_eq!(interp.variable("tools").unwrap().to_json(), r#"["echo","pair"]"#);

        let calls = connector.calls.lock();
        assert_eq!(calls.len(), 3);
        assert_eq!(JsonValue::Object(calls[0].1.clone()), json!({"a": 1, "nested": {"b": "x"}}));
        assert!(calls[2].1.is_empty());
    }

    #[tokio::test]
    async fn call_rejects_scalar_arguments() {
        let err = run("connect \"srv\"\ncall echo 5").await.err().unwrap();
        assert_eq!(err.to_string(), "tool arguments must be an object, got number");
    }

    #[tokio::test]
    async fn wait_returns_when_truthy() {
        let started = std::time::Instant::now();
        run("wait true, 5, 1000").await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn wait_times_out() {
        let started = std::time::Instant::now();
        let err = run("wait false, 0.2, 50").await.err().unwrap();
        let elapsed = started.elapsed();
        assert!(matches!(err, DslError::WaitTimeout(_)));
        assert!(err.to_string().contains("wait timeout"));
        assert!(elapsed >= Duration::from_millis(200), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(1000), "{:?}", elapsed);
    }

    #[tokio::test]
    async fn wait_rejects_bad_timeout() {
        let err = run("wait false, \"soon\"").await.err().unwrap();
        assert_eq!(err.to_string(), "timeout must be a number, got string");
        let err = run("wait false, -1").await.err().unwrap();
        assert_eq!(err.to_string(), "timeout must be a non-negative number");
    }

    #[tokio::test]
    async fn cancellation_interrupts_wait() {
        let ct = CancellationToken::new();
        let mut interp = interpreter().with_cancellation(ct.clone());
        let cancel = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            ct.cancel();
        });
        let started = std::time::Instant::now();
        let err = interp.execute_source("wait false, 30").await.unwrap_err();
        assert!(matches!(err, DslError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
        cancel.await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_interrupts_tool_call() {
        let ct = CancellationToken::new();
        let mut interp = interpreter().with_cancellation(ct.clone());
        interp.execute_source("connect \"srv\"").await.unwrap();

        let cancel = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            ct.cancel();
        });
        let err = interp.execute_source("call slow").await.unwrap_err();
        assert!(matches!(err, DslError::Cancelled));
        cancel.await.unwrap();
    }

    #[tokio::test]
    async fn reconnect_replaces_client() {
        let connector = Arc::new(EchoConnector::default());
        let mut interp = Interpreter::new(connector.clone()).with_echo(false);
        interp.execute_source("connect \"a\"\nconnect \"b\"").await.unwrap();
        assert_eq!(connector.specs.lock().len(), 2);
        interp.close().await.unwrap();
        assert!(!interp.is_connected());
    }
}
