//! Expression AST and reference collection.

use serde_json::Value;

/// A dotted reference prefix, e.g. `["step", "http", "get", "response_body"]`.
///
/// Only the static attribute chain is recorded; a dynamic subscript ends the
/// prefix (`credential.aws[param.x]` yields `["credential", "aws"]` plus
/// whatever the subscript expression references).
pub type RefPath = Vec<String>;

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
}

/// One step applied to a reference root: `.attr` or `[index]`.
#[derive(Debug, Clone, PartialEq)]
pub enum Accessor {
    Attr(String),
    Index(Expr),
}

/// A piece of an interpolated string template.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Lit(String),
    Interp(Expr),
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal value: string, number, bool or null.
    Literal(Value),
    /// A variable reference: root identifier plus attribute/index chain.
    Reference { root: String, path: Vec<Accessor> },
    /// An interpolated string, e.g. `https://host/${param.city}`.
    Template(Vec<TemplatePart>),
    /// List literal `[a, b, c]`.
    List(Vec<Expr>),
    /// Map literal `{ key: value }`. Keys are static.
    Map(Vec<(String, Expr)>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// Builtin function call, e.g. `join(",", param.regions)`.
    Call { name: String, args: Vec<Expr> },
}

impl Expr {
    /// Whether the tree contains any variable reference.
    ///
    /// Reference-free attributes are evaluated at decode time; the rest are
    /// stored deferred.
    pub fn has_references(&self) -> bool {
        !self.references().is_empty()
    }

    /// Collect the static dotted prefix of every reference in the tree.
    ///
    /// A dynamic subscript terminates its reference's prefix; the subscript
    /// expression contributes its own references separately.
    pub fn references(&self) -> Vec<RefPath> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references(&self, out: &mut Vec<RefPath>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Reference { root, path } => {
                let mut prefix = vec![root.clone()];
                for accessor in path {
                    match accessor {
                        Accessor::Attr(name) => prefix.push(name.clone()),
                        Accessor::Index(index) => {
                            index.collect_references(out);
                            break;
                        }
                    }
                }
                out.push(prefix);
            }
            Expr::Template(parts) => {
                for part in parts {
                    if let TemplatePart::Interp(expr) = part {
                        expr.collect_references(out);
                    }
                }
            }
            Expr::List(items) => {
                for item in items {
                    item.collect_references(out);
                }
            }
            Expr::Map(entries) => {
                for (_, value) in entries {
                    value.collect_references(out);
                }
            }
            Expr::Unary { operand, .. } => operand.collect_references(out),
            Expr::Binary { left, right, .. } => {
                left.collect_references(out);
                right.collect_references(out);
            }
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => {
                cond.collect_references(out);
                then.collect_references(out);
                otherwise.collect_references(out);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_references(out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_has_no_references() {
        let expr = Expr::Literal(Value::from(42));
        assert!(!expr.has_references());
    }

    #[test]
    fn test_reference_prefix() {
        let expr = Expr::Reference {
            root: "step".to_string(),
            path: vec![
                Accessor::Attr("http".to_string()),
                Accessor::Attr("get".to_string()),
                Accessor::Attr("response_body".to_string()),
            ],
        };
        assert_eq!(
            expr.references(),
            vec![vec![
                "step".to_string(),
                "http".to_string(),
                "get".to_string(),
                "response_body".to_string()
            ]]
        );
    }

    #[test]
    fn test_dynamic_index_ends_prefix() {
        // credential.aws[param.env]
        let expr = Expr::Reference {
            root: "credential".to_string(),
            path: vec![
                Accessor::Attr("aws".to_string()),
                Accessor::Index(Expr::Reference {
                    root: "param".to_string(),
                    path: vec![Accessor::Attr("env".to_string())],
                }),
            ],
        };
        let refs = expr.references();
        assert_eq!(refs.len(), 2);
        assert!(refs.contains(&vec!["param".to_string(), "env".to_string()]));
        assert!(refs.contains(&vec!["credential".to_string(), "aws".to_string()]));
    }
}
