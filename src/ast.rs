use std::fmt;

/// An expression inside `${...}`, a block header, or an argument list.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    NullLit,
    Int(i32),
    Str(String),
    Var(String),
    /// `object.member`
    Member(Box<Expr>, String),
    /// `collection[index]`
    Index(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Neq(Box<Expr>, Box<Expr>),
    /// A sub-SQL invocation used as an argument value.
    SubSql(SubSqlCall),
}

/// `@name(arg, arg = value, ...)`. Arguments are evaluated in the
/// caller's environment; the invoked template sees only the resulting
/// bindings plus its own defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct SubSqlCall {
    pub name: String,
    pub args: Vec<(String, Expr)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal template text, copied to the output verbatim.
    Text(String),
    /// `${expr}`
    Print(Expr),
    /// `@name(...)` expanded inline.
    SubSql(SubSqlCall),
    /// `@if(...)...@elif(...)...@else...@endif`. Branches keep source
    /// order; the first truthy condition wins.
    If {
        branches: Vec<(Expr, Template)>,
        else_branch: Option<Template>,
    },
    /// `@for(value in coll)...@endfor` or
    /// `@for((value, index) in coll, separator = "...")...@endfor`.
    For {
        value_name: String,
        index_name: Option<String>,
        collection: Expr,
        separator: Option<String>,
        body: Template,
    },
}

/// A compiled template body: the chain of top-level nodes in source
/// order. Never mutated after compilation.
pub type Template = Vec<Node>;

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::NullLit => f.write_str("null"),
            Expr::Int(n) => write!(f, "{n}"),
            Expr::Str(s) => write!(f, "'{s}'"),
            Expr::Var(name) => f.write_str(name),
            Expr::Member(obj, member) => write!(f, "{obj}.{member}"),
            Expr::Index(coll, index) => write!(f, "{coll}[{index}]"),
            Expr::Not(inner) => write!(f, "!{inner}"),
            Expr::And(l, r) => write!(f, "({l} && {r})"),
            Expr::Or(l, r) => write!(f, "({l} || {r})"),
            Expr::Eq(l, r) => write!(f, "({l} == {r})"),
            Expr::Neq(l, r) => write!(f, "({l} != {r})"),
            Expr::SubSql(call) => write!(f, "{call}"),
        }
    }
}

impl fmt::Display for SubSqlCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}(", self.name)?;
        for (i, (name, value)) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        f.write_str(")")
    }
}

/// Renders the tree one node per line, children indented two spaces.
pub fn dump(template: &[Node]) -> String {
    let mut out = String::new();
    dump_nodes(template, 0, &mut out);
    out
}

fn dump_nodes(nodes: &[Node], depth: usize, out: &mut String) {
    for node in nodes {
        dump_node(node, depth, out);
    }
}

fn dump_node(node: &Node, depth: usize, out: &mut String) {
    let pad = "  ".repeat(depth);
    match node {
        Node::Text(text) => out.push_str(&format!("{pad}Text {text:?}\n")),
        Node::Print(expr) => out.push_str(&format!("{pad}Print {expr}\n")),
        Node::SubSql(call) => out.push_str(&format!("{pad}SubSql {call}\n")),
        Node::If {
            branches,
            else_branch,
        } => {
            for (i, (cond, body)) in branches.iter().enumerate() {
                let label = if i == 0 { "If" } else { "ElIf" };
                out.push_str(&format!("{pad}{label} {cond}\n"));
                dump_nodes(body, depth + 1, out);
            }
            if let Some(body) = else_branch {
                out.push_str(&format!("{pad}Else\n"));
                dump_nodes(body, depth + 1, out);
            }
        }
        Node::For {
            value_name,
            index_name,
            collection,
            separator,
            body,
        } => {
            out.push_str(&format!("{pad}For "));
            match index_name {
                Some(index_name) => out.push_str(&format!("({value_name}, {index_name})")),
                None => out.push_str(value_name),
            }
            out.push_str(&format!(" in {collection}"));
            if let Some(sep) = separator {
                out.push_str(&format!(" separator {sep:?}"));
            }
            out.push('\n');
            dump_nodes(body, depth + 1, out);
        }
    }
}
