use crate::trans::TransNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    NotEq,
    Lt,
    Gt,
    Add,
    Sub,
    Mul,
    Concat,
    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Eq => "==",
            BinOp::NotEq => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Concat => "~",
            BinOp::And => "and",
            BinOp::Or => "or",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Str(String),
    Int(i64),
    Bool(bool),
    Null,
    Name(String),
    Attribute(Box<Expr>, String), // foo.bar
    Index(Box<Expr>, Box<Expr>),  // foo['bar']
    BinOp(Box<Expr>, BinOp, Box<Expr>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    /// `node|name(args)`
    Filter {
        node: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
    /// String-coercion check added around filter inputs in sandboxed mode.
    ToString(Box<Expr>),
    Call {
        name: String,
        args: Vec<Expr>,
    },
    List(Vec<Expr>),
    Map(Vec<(Expr, Expr)>),
}

impl Expr {
    pub fn name(name: impl Into<String>) -> Self {
        Expr::Name(name.into())
    }

    pub fn str(value: impl Into<String>) -> Self {
        Expr::Str(value.into())
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            name: name.into(),
            args,
        }
    }

    pub fn filter(node: Expr, name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Filter {
            node: Box::new(node),
            name: name.into(),
            args,
        }
    }

    /// Names and constants: expressions that can stand in for a whole
    /// message.
    pub fn is_atomic(&self) -> bool {
        matches!(
            self,
            Expr::Name(_) | Expr::Str(_) | Expr::Int(_) | Expr::Bool(_) | Expr::Null
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Print(Expr),
    For {
        target: String,
        iterable: Expr,
        body: Vec<Node>,
    },
    If {
        cases: Vec<(Expr, Vec<Node>)>, // (condition, body). Includes if and elifs.
        else_body: Option<Vec<Node>>,
    },
    Trans(Box<TransNode>),
}

pub type Template = Vec<Node>;
