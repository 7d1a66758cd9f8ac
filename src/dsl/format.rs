//! Pretty-printer producing canonical script text.
//!
//! Output re-parses to the same tree, so formatting is idempotent.
//! Binary operations are always parenthesised; top-level statements are
//! separated by a blank line.

use super::ast::{Expr, Script, Stmt};
use super::lexer::{is_ident_continue, is_ident_start, keyword};
use super::value::format_number;

const INDENT: &str = "  ";

pub fn format_script(script: &Script) -> String {
    let mut out = String::new();
    for (i, stmt) in script.statements.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        write_stmt(&mut out, stmt, 0);
    }
    out
}

pub fn format_expr(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr);
    out
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

fn write_stmt(out: &mut String, stmt: &Stmt, depth: usize) {
    indent(out, depth);
    write_stmt_body(out, stmt, depth);
    out.push('\n');
}

/// One statement without leading indent or trailing newline.
fn write_stmt_body(out: &mut String, stmt: &Stmt, depth: usize) {
    match stmt {
        Stmt::Connect {
            server,
            args,
            options,
        } => {
            out.push_str("connect ");
            write_expr(out, server);
            for arg in args {
                out.push(' ');
                write_expr(out, arg);
            }
            if !options.is_empty() {
                out.push_str(" {\n");
                for (name, value) in options {
                    indent(out, depth + 1);
                    out.push_str(name);
                    out.push_str(": ");
                    write_expr(out, value);
                    out.push('\n');
                }
                indent(out, depth);
                out.push('}');
            }
        }
        Stmt::Call { tool, args, target } => {
            out.push_str("call ");
            write_key(out, tool);
            if let Some(args) = args {
                out.push(' ');
                write_expr(out, args);
            }
            if let Some(target) = target {
                out.push_str(" -> ");
                out.push_str(target);
            }
        }
        Stmt::Assert { condition, message } => {
            out.push_str("assert ");
            write_expr(out, condition);
            if let Some(message) = message {
                out.push_str(", ");
                write_string(out, message);
            }
        }
        Stmt::Wait {
            condition,
            timeout,
            interval,
        } => {
            out.push_str("wait ");
            write_expr(out, condition);
            if let Some(timeout) = timeout {
                out.push_str(", ");
                write_expr(out, timeout);
                if let Some(interval) = interval {
                    out.push_str(", ");
                    write_expr(out, interval);
                }
            }
        }
        Stmt::Loop {
            var,
            collection,
            body,
        } => {
            out.push_str("loop ");
            out.push_str(var);
            out.push_str(" in ");
            write_expr(out, collection);
            write_block(out, body, depth);
        }
        Stmt::If {
            condition,
            then_body,
            else_body,
        } => {
            out.push_str("if ");
            write_expr(out, condition);
            write_block(out, then_body, depth);
            match else_body.as_deref() {
                None => {}
                Some([nested @ Stmt::If { .. }]) => {
                    out.push_str(" else ");
                    write_stmt_body(out, nested, depth);
                }
                Some(body) => {
                    out.push_str(" else");
                    write_block(out, body, depth);
                }
            }
        }
        Stmt::Set { var, value } => {
            out.push_str("set ");
            out.push_str(var);
            out.push_str(" = ");
            write_expr(out, value);
        }
        Stmt::Print(expr) => {
            out.push_str("print ");
            write_expr(out, expr);
        }
        Stmt::Define(proc) => {
            out.push_str("define ");
            out.push_str(&proc.name);
            if !proc.params.is_empty() {
                out.push('(');
                out.push_str(&proc.params.join(", "));
                out.push(')');
            }
            write_block(out, &proc.body, depth);
        }
        Stmt::Run { name, args } => {
            out.push_str("run ");
            out.push_str(name);
            if !args.is_empty() {
                out.push('(');
                write_list(out, args);
                out.push(')');
            }
        }
    }
}

/// ` {` + indented body + `}` at the statement's depth.
fn write_block(out: &mut String, body: &[Stmt], depth: usize) {
    out.push_str(" {\n");
    for stmt in body {
        write_stmt(out, stmt, depth + 1);
    }
    indent(out, depth);
    out.push('}');
}

fn write_list(out: &mut String, items: &[Expr]) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_expr(out, item);
    }
}

fn write_expr(out: &mut String, expr: &Expr) {
    match expr {
        Expr::Null => out.push_str("null"),
        Expr::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Expr::Number(n) => out.push_str(&format_number(*n)),
        Expr::Str(s) => write_string(out, s),
        Expr::Var(name) => out.push_str(name),
        Expr::Object(fields) => {
            out.push('{');
            for (i, (key, value)) in fields.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_key(out, key);
                out.push_str(": ");
                write_expr(out, value);
            }
            out.push('}');
        }
        Expr::Array(items) => {
            out.push('[');
            write_list(out, items);
            out.push(']');
        }
        Expr::Field(object, field) => {
            write_postfix_target(out, object);
            out.push('.');
            out.push_str(field);
        }
        Expr::Index(object, index) => {
            write_postfix_target(out, object);
            out.push('[');
            write_expr(out, index);
            out.push(']');
        }
        Expr::Unary(op, operand) => {
            out.push_str(op.symbol());
            write_expr(out, operand);
        }
        Expr::Binary(left, op, right) => {
            out.push('(');
            write_expr(out, left);
            out.push(' ');
            out.push_str(op.symbol());
            out.push(' ');
            write_expr(out, right);
            out.push(')');
        }
        Expr::Call(name, args) => {
            out.push_str(name);
            out.push('(');
            write_list(out, args);
            out.push(')');
        }
    }
}

/// Unary operands bind looser than postfix, so they need parentheses here.
fn write_postfix_target(out: &mut String, object: &Expr) {
    if matches!(object, Expr::Unary(..)) {
        out.push('(');
        write_expr(out, object);
        out.push(')');
    } else {
        write_expr(out, object);
    }
}

/// Bare identifier when it lexes back as one, quoted string otherwise.
fn write_key(out: &mut String, key: &str) {
    if is_plain_identifier(key) {
        out.push_str(key);
    } else {
        write_string(out, key);
    }
}

fn is_plain_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(is_ident_start) && chars.all(is_ident_continue) && keyword(s).is_none()
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use crate::dsl::format_source;

    fn fmt(source: &str) -> String {
        format_source(source).unwrap()
    }

    #[test]
    fn parenthesises_binary_ops() {
        assert_eq!(fmt("set x = 1 + 2 * 3"), "set x = (1 + (2 * 3))\n");
    }

    #[test]
    fn blocks_indent_two_spaces() {
        let out = fmt("loop n in [1,2] {\nif n > 1 { print n } else { print \"small\" }\n}");
        assert_eq!(
            out,
            "loop n in [1, 2] {\n  if (n > 1) {\n    print n\n  } else {\n    print \"small\"\n  }\n}\n"
        );
    }

    #[test]
    fn else_if_stays_inline() {
        let out = fmt("if a { print 1 } else if b { print 2 }");
        assert_eq!(out, "if a {\n  print 1\n} else if b {\n  print 2\n}\n");
    }

    #[test]
    fn object_keys_in_source_order() {
        let out = fmt("call tool {zeta: 1, \"with space\": 2, alpha: null, \"if\": 3} -> r");
        assert_eq!(out, "call tool {zeta: 1, \"with space\": 2, alpha: null, \"if\": 3} -> r\n");
    }

    #[test]
    fn statements_separated_by_blank_line() {
        assert_eq!(fmt("set x = 1\nprint x"), "set x = 1\n\nprint x\n");
    }

    #[test]
    fn connect_options_block() {
        let out = fmt("connect \"srv\" \"-v\" { env: {A: \"1\"} }");
        assert_eq!(out, "connect \"srv\" \"-v\" {\n  env: {A: \"1\"}\n}\n");
    }

    #[test]
    fn escapes_strings() {
        assert_eq!(fmt("print 'say \"hi\"\\n'"), "print \"say \\\"hi\\\"\\n\"\n");
    }

    #[test]
    fn negated_field_target_keeps_parens() {
        assert_eq!(fmt("print (-a).b"), "print (-a).b\n");
        assert_eq!(fmt("print - -1"), "print --1\n");
    }

    #[test]
    fn idempotent() {
        let source = "# demo\nconnect \"./bridge\" { env: {LOG: \"debug\"} }\n\
                      define check(sel) {\n  call browser_click {selector: sel} -> r\n  assert !r.error, \"click failed\"\n}\n\
                      set items = [1, 2.5, \"x\"]\nloop i in items { run check(i) }\n\
                      wait len(items) >= 3 && true || false, 2, 50\n\
                      if a == b { print json({k: [1]}) } else if c { print -d } else { x = 1 }";
        let once = fmt(source);
        assert_eq!(fmt(&once), once);
    }
}
