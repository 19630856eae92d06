//! Shared program model (CFA + expressions)

pub mod cfa;
pub mod expr;
pub mod expr_parser;

pub use cfa::{
    Cfa, CfaBuilder, CfaDescription, CfaEdge, CfaEdgeId, CfaNode, CfaNodeId, EdgeKind, EdgeSpec,
    FunctionInfo,
};
pub use expr::{
    apply_binary, owner_function, return_variable, BinaryOp, Expr, LValue, UnaryOp, VarName,
    RETURN_VARIABLE,
};
pub use expr_parser::{parse_expr, ExprParseError};
