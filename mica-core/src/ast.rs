//! Abstract syntax tree produced by the parser.
//!
//! Every node is exclusively owned by its parent; function bodies and block
//! bodies are ordered statement lists. Type annotations stay textual until
//! code generation lowers them.

/// Expression and statement nodes. The surface language treats statements as
/// expressions, so one enum covers both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Number(i64),
    Boolean(bool),
    StringLiteral(String),
    Variable(String),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        callee: String,
        args: Vec<Expr>,
    },
    Return(Box<Expr>),
    VarDecl {
        name: String,
        type_name: String,
        is_const: bool,
        init: Option<Box<Expr>>,
    },
    Assign {
        name: String,
        value: Box<Expr>,
    },
    If {
        cond: Box<Expr>,
        then_body: Vec<Expr>,
        else_body: Vec<Expr>,
    },
    While {
        cond: Box<Expr>,
        body: Vec<Expr>,
    },
    For {
        var: String,
        start: Box<Expr>,
        end: Box<Expr>,
        body: Vec<Expr>,
    },
    Break,
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }
}

/// A top-level function definition.
///
/// `is_extern` implies an empty body; `extern` and `export` are mutually
/// exclusive (the parser accepts at most one prefix keyword). A function
/// named `main` is treated as exported regardless of flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    /// Ordered `(name, type)` pairs; names are unique within a function.
    pub params: Vec<(String, String)>,
    /// `None` means the function returns void.
    pub return_type: Option<String>,
    pub body: Vec<Expr>,
    pub is_extern: bool,
    pub is_export: bool,
}

impl Function {
    /// Exported surface: `main`, `export fn`, and extern declarations all
    /// get external linkage.
    pub fn is_externally_visible(&self) -> bool {
        self.is_extern || self.is_export || self.name == "main"
    }
}
