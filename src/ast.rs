//! The typed AST produced by the (out of scope) parser and semantic
//! analyzer. Modeled as tagged enums so dispatch over `kind` is exhaustive
//! at compile time rather than relying on a runtime tag check.

use crate::types::TypeDescriptor;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    ShiftLeft,
    ShiftRight,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// A (possibly empty) list of indices on an array access.
pub type IndexList = Vec<Expression>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expression {
    NumberLiteral(NumberLiteral),
    StringLiteral(String),
    Variable(String),
    Binary {
        left: Box<Expression>,
        op: BinaryOp,
        right: Box<Expression>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    ArrayAccess {
        array: String,
        indices: IndexList,
    },
    MemberAccess {
        base: Box<Expression>,
        field: String,
    },
    Call {
        name: String,
        args: Vec<Expression>,
    },
    /// Inline-if: `IIF(cond, whenTrue, whenFalse)`.
    Iif {
        condition: Box<Expression>,
        when_true: Box<Expression>,
        when_false: Box<Expression>,
    },
    MethodCall {
        receiver: Box<Expression>,
        method: String,
        args: Vec<Expression>,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum NumberLiteral {
    Int(i64),
    Float(f64),
}

/// The assignable target of a `LET`/`SLICE_ASSIGN`/`READ`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LValue {
    Variable(String),
    ArrayElement { array: String, indices: IndexList },
    Member { base: Box<LValue>, field: String },
    StringSlice { variable: String, from: Box<Expression>, to: Box<Expression> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrintSeparator {
    /// `;` — no separator, items run together.
    None,
    /// `,` — tab to the next print zone.
    Tab,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintItem {
    pub expr: Expression,
    /// Separator that followed this item, if any (absence at the end of
    /// the list means "emit a trailing newline").
    pub trailing_separator: Option<PrintSeparator>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnTarget {
    /// `None` marks a gap in the target list (e.g. `ON X GOTO 100, , 400`).
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Statement {
    Let {
        target: LValue,
        value: Expression,
    },
    Print {
        items: Vec<PrintItem>,
    },
    Input {
        prompt: Option<String>,
        target: LValue,
        value_type: TypeDescriptor,
    },
    Read {
        target: LValue,
    },
    Restore {
        label: Option<String>,
    },
    SliceAssign {
        variable: String,
        from: Expression,
        to: Expression,
        value: Expression,
    },
    If {
        condition: Expression,
    },
    While {
        condition: Expression,
    },
    Do {
        condition: Option<Expression>,
    },
    For {
        variable: String,
        start: Expression,
        limit: Expression,
        step: Option<Expression>,
    },
    End,
    Return {
        value: Option<Expression>,
    },
    Dim {
        array: String,
        dimensions: Vec<Expression>,
    },
    Redim {
        array: String,
        dimensions: Vec<Expression>,
    },
    Erase {
        array: String,
    },
    Local {
        name: String,
        type_descriptor: TypeDescriptor,
    },
    Call {
        name: String,
        args: Vec<Expression>,
    },
    Shared {
        name: String,
    },
    OnGoto {
        selector: Expression,
        targets: Vec<OnTarget>,
    },
    OnGosub {
        selector: Expression,
        targets: Vec<OnTarget>,
    },
    OnCall {
        selector: Expression,
        targets: Vec<String>,
    },
    Case {
        selector: Expression,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iif_nests_its_three_branch_expressions() {
        let expr = Expression::Iif {
            condition: Box::new(Expression::NumberLiteral(NumberLiteral::Int(1))),
            when_true: Box::new(Expression::Variable("X".to_string())),
            when_false: Box::new(Expression::NumberLiteral(NumberLiteral::Int(0))),
        };
        assert!(matches!(expr, Expression::Iif { .. }));
    }

    #[test]
    fn on_target_none_label_marks_a_gap() {
        let target = OnTarget { label: None };
        assert!(target.label.is_none());
    }

    #[test]
    fn debug_format_is_available_for_diagnostics() {
        let stmt = Statement::End;
        assert_eq!(format!("{:?}", stmt), "End");
    }
}
