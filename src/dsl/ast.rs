//! Syntax tree of a test script.

/// A parsed script: top-level statements in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `connect SERVER ARGS... { option: value }`
    Connect {
        server: Expr,
        args: Vec<Expr>,
        options: Vec<(String, Expr)>,
    },
    /// `call TOOL [ARGS] [-> VAR]`
    Call {
        tool: String,
        args: Option<Expr>,
        target: Option<String>,
    },
    Assert {
        condition: Expr,
        message: Option<String>,
    },
    /// `wait COND [, TIMEOUT_SECS [, INTERVAL_MS]]`
    Wait {
        condition: Expr,
        timeout: Option<Expr>,
        interval: Option<Expr>,
    },
    Loop {
        var: String,
        collection: Expr,
        body: Vec<Stmt>,
    },
    If {
        condition: Expr,
        then_body: Vec<Stmt>,
        else_body: Option<Vec<Stmt>>,
    },
    Set {
        var: String,
        value: Expr,
    },
    Print(Expr),
    Define(Procedure),
    Run {
        name: String,
        args: Vec<Expr>,
    },
}

/// A named, parameterised block installed by `define`.
#[derive(Debug, Clone, PartialEq)]
pub struct Procedure {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    /// Object literal; fields keep source order.
    Object(Vec<(String, Expr)>),
    Array(Vec<Expr>),
    Var(String),
    Field(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    /// Built-in function call; only a bare identifier can be called.
    Call(String, Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Neg => "-",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}
