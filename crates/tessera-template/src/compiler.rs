/*
 * compiler.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Lowering of parsed templates into executable [`Program`]s.
//!
//! Two composition modes:
//!
//! - A template without `extends` is lowered token by token. Its `block`s
//!   become [`Op::Block`], which renders a registered override when a child
//!   template supplied one and the block's own body otherwise.
//! - An extending template registers one deferred unit per top-level block
//!   ([`Op::DefineBlocks`]) and then renders its parent ([`Op::Extend`]).
//!   Top-level content outside `extends`/`block` is still compiled, so errors
//!   in it are reported, but it produces no output.

use crate::error::{TemplateError, TemplateResult};
use crate::parser::ParsedTemplate;
use crate::program::{BlockUnit, Comparison, Condition, Expr, Literal, Op, Program, ScopedBinding};
use crate::resolver::TemplateResolver;
use crate::token::{Command, Control, ControlMetadata, Token, Variable, is_identifier, parse_path};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Compile a parsed template.
pub fn compile(parsed: &ParsedTemplate) -> TemplateResult<Program> {
    let ops = match parsed.parent_template() {
        None => compile_tokens(parsed.tokens(), true)?,
        Some(parent) => {
            // Unreachable in inheritance mode, but must still be valid.
            compile_tokens(parsed.tokens(), true)?;

            let blocks = parsed
                .blocks()
                .iter()
                .map(|(name, body)| {
                    Ok(BlockUnit {
                        name: name.clone(),
                        body: compile_tokens(body, false)?,
                    })
                })
                .collect::<TemplateResult<Vec<_>>>()?;
            vec![
                Op::DefineBlocks { blocks },
                Op::Extend {
                    parent: parent.to_string(),
                },
            ]
        }
    };

    Ok(Program {
        template_path: parsed.template_path().to_path_buf(),
        compiled_at: now_millis(),
        parent: parsed.parent_template().map(str::to_string),
        dependencies: parsed.dependencies().iter().cloned().collect(),
        ops,
    })
}

/// Parse and compile template source in one step, returning the program text.
pub fn compile_source(
    source: &str,
    template_path: &Path,
    resolver: &dyn TemplateResolver,
) -> TemplateResult<String> {
    let parsed = ParsedTemplate::parse(source, template_path, resolver)?;
    compile(&parsed)?.to_code()
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

fn compile_tokens(tokens: &[Token], top_level: bool) -> TemplateResult<Vec<Op>> {
    let mut ops = Vec::with_capacity(tokens.len());
    for token in tokens {
        if let Some(op) = compile_token(token, top_level)? {
            ops.push(op);
        }
    }
    Ok(ops)
}

fn compile_token(token: &Token, top_level: bool) -> TemplateResult<Option<Op>> {
    match token {
        Token::Text(text) => Ok(Some(Op::Emit {
            text: text.content.clone(),
        })),
        Token::Variable(var) => Ok(Some(Op::Echo {
            expr: variable_expr(var),
        })),
        Token::Control(control) => compile_control(control, top_level),
    }
}

fn compile_control(control: &Control, top_level: bool) -> TemplateResult<Option<Op>> {
    let op = match &control.command {
        Command::If => Op::If {
            cond: compile_condition(&control.expression)?,
            then: compile_tokens(&control.children, false)?,
            otherwise: compile_tokens(&control.else_children, false)?,
        },
        Command::For => {
            let (collection, item) = compile_loop_header(&control.expression)?;
            Op::For {
                collection,
                key: format!("{}_key", item),
                item,
                body: compile_tokens(&control.children, false)?,
                otherwise: compile_tokens(&control.else_children, false)?,
            }
        }
        Command::Block => Op::Block {
            name: control.expression.trim().to_string(),
            body: compile_tokens(&control.children, false)?,
        },
        Command::Include => match &control.metadata {
            ControlMetadata::Include { template, scope } => Op::Include {
                template: template.clone(),
                scope: match scope {
                    None => None,
                    Some(scope) => Some(ScopedBinding {
                        source: path_expr(&scope.source, "include source")?,
                        binding: scope.binding.clone(),
                    }),
                },
            },
            _ => return Err(TemplateError::unknown("include without a template name")),
        },
        // Handled by the inheritance pass in `compile`.
        Command::Extends if top_level => return Ok(None),
        Command::Extends => return Err(TemplateError::unknown("nested `extends`")),
        Command::Else | Command::Endif | Command::Endfor | Command::Endblock => {
            return Err(TemplateError::unknown(format!(
                "dangling `{}` marker",
                control.command
            )));
        }
        Command::Other(word) => {
            return Err(TemplateError::unknown(format!("control command `{}`", word)));
        }
    };
    Ok(Some(op))
}

/// Lookup, accessors, filters in declared order, then escaping unless `raw`.
fn variable_expr(var: &Variable) -> Expr {
    let lookup = Expr::path(&var.name, &var.path);
    let filtered = var.filters.iter().fold(lookup, |value, filter| Expr::Filter {
        name: filter.name.clone(),
        params: filter.parameters.clone(),
        value: Box::new(value),
    });
    if var.escape {
        Expr::Escape {
            value: Box::new(filtered),
        }
    } else {
        filtered
    }
}

fn path_expr(source: &str, what: &str) -> TemplateResult<Expr> {
    let (name, path) = parse_path(source.trim())
        .ok_or_else(|| TemplateError::unknown(format!("{} `{}`", what, source)))?;
    Ok(Expr::path(&name, &path))
}

/// `collection.path as item`
fn compile_loop_header(expression: &str) -> TemplateResult<(Expr, String)> {
    let malformed = || TemplateError::unknown(format!("for expression `{}`", expression));
    let mut words = expression.split_whitespace();
    let (Some(collection), Some("as"), Some(item), None) =
        (words.next(), words.next(), words.next(), words.next())
    else {
        return Err(malformed());
    };
    if !is_identifier(item) {
        return Err(malformed());
    }
    let collection = path_expr(collection, "for collection")?;
    Ok((collection, item.to_string()))
}

/// A bare accessor chain, or `chain <op> literal`.
fn compile_condition(expression: &str) -> TemplateResult<Condition> {
    let expression = expression.trim();
    let unknown = || TemplateError::unknown(format!("condition `{}`", expression));

    match find_operator(expression) {
        None => {
            let value = path_expr(expression, "condition").map_err(|_| unknown())?;
            Ok(Condition::Truthy { value })
        }
        Some((pos, symbol, op)) => {
            let left = path_expr(&expression[..pos], "condition").map_err(|_| unknown())?;
            let right = parse_literal(expression[pos + symbol.len()..].trim()).ok_or_else(unknown)?;
            Ok(Condition::Compare { left, op, right })
        }
    }
}

/// First comparison operator outside quotes.
fn find_operator(expression: &str) -> Option<(usize, &'static str, Comparison)> {
    let mut quote = None;
    for (i, c) in expression.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None => {
                let rest = &expression[i..];
                for (symbol, op) in Comparison::ALL {
                    if rest.starts_with(symbol) {
                        return Some((i, symbol, op));
                    }
                }
            }
        }
    }
    None
}

fn parse_literal(raw: &str) -> Option<Literal> {
    for q in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(q) && raw.ends_with(q) {
            return Some(Literal::String(raw[1..raw.len() - 1].to_string()));
        }
    }
    match raw {
        "true" => Some(Literal::Bool(true)),
        "false" => Some(Literal::Bool(false)),
        "null" => Some(Literal::Null),
        _ => raw
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(Literal::Number),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::parser::tests::StaticResolver;
    use crate::token::Accessor;
    use pretty_assertions::assert_eq;

    fn compile_str(source: &str) -> TemplateResult<Program> {
        let resolver = StaticResolver::with(&["base", "card"]);
        let parsed = ParsedTemplate::parse(source, Path::new("/t/self.html"), &resolver)?;
        compile(&parsed)
    }

    fn ops(source: &str) -> Vec<Op> {
        compile_str(source).expect("template should compile").ops
    }

    fn echo(source: &str) -> Expr {
        match ops(source).remove(0) {
            Op::Echo { expr } => expr,
            other => panic!("expected echo, got {:?}", other),
        }
    }

    // ========================================================================
    // Variables
    // ========================================================================

    #[test]
    fn test_variable_escaped_by_default() {
        assert_eq!(
            echo("{{ a.b }}"),
            Expr::Escape {
                value: Box::new(Expr::path("a", &[Accessor::Key("b".to_string())]))
            }
        );
    }

    #[test]
    fn test_raw_variable_unescaped() {
        assert_eq!(
            echo("{{ a.b|raw }}"),
            Expr::Filter {
                name: "raw".to_string(),
                params: vec![],
                value: Box::new(Expr::path("a", &[Accessor::Key("b".to_string())])),
            }
        );
    }

    #[test]
    fn test_filters_wrap_in_declared_order() {
        let expr = echo("{{ name|trim|truncate:5:~ }}");
        let Expr::Escape { value } = expr else {
            panic!("expected escape");
        };
        let Expr::Filter { name, params, value } = *value else {
            panic!("expected outer filter");
        };
        assert_eq!(name, "truncate");
        assert_eq!(params, vec!["5", "~"]);
        let Expr::Filter { name, .. } = *value else {
            panic!("expected inner filter");
        };
        assert_eq!(name, "trim");
    }

    #[test]
    fn test_text_emitted_verbatim() {
        assert_eq!(
            ops("a \"quoted\" \\ line\n"),
            vec![Op::Emit {
                text: "a \"quoted\" \\ line\n".to_string()
            }]
        );
    }

    // ========================================================================
    // Conditions
    // ========================================================================

    #[test]
    fn test_bare_condition() {
        let Op::If { cond, then, otherwise } = ops("{% if user.active %}y{% else %}n{% endif %}").remove(0)
        else {
            panic!("expected if");
        };
        assert_eq!(
            cond,
            Condition::Truthy {
                value: Expr::path("user", &[Accessor::Key("active".to_string())])
            }
        );
        assert_eq!(then.len(), 1);
        assert_eq!(otherwise.len(), 1);
    }

    #[test]
    fn test_comparison_conditions() {
        let cases = [
            ("n >= 3", Comparison::Ge, Literal::Number(3.0)),
            ("n<3", Comparison::Lt, Literal::Number(3.0)),
            ("role == \"a <= b\"", Comparison::Eq, Literal::String("a <= b".to_string())),
            ("role != 'x'", Comparison::Ne, Literal::String("x".to_string())),
            ("flag == true", Comparison::Eq, Literal::Bool(true)),
            ("value != null", Comparison::Ne, Literal::Null),
        ];
        for (expression, expected_op, expected_right) in cases {
            match compile_condition(expression).unwrap() {
                Condition::Compare { op, right, .. } => {
                    assert_eq!(op, expected_op, "{}", expression);
                    assert_eq!(right, expected_right, "{}", expression);
                }
                other => panic!("expected comparison for {}, got {:?}", expression, other),
            }
        }
    }

    #[test]
    fn test_unknown_conditions() {
        for expression in ["a and b", "a == b", "", "1 == 1", "a == \"open"] {
            let err = compile_condition(expression).unwrap_err();
            assert_eq!(err.category(), ErrorCategory::Compilation, "{}", expression);
            assert!(err.to_string().contains("unknown construct"));
        }
    }

    // ========================================================================
    // Loops, includes, blocks
    // ========================================================================

    #[test]
    fn test_for_loop_bindings() {
        let Op::For { collection, item, key, body, otherwise } =
            ops("{% for user.items as x %}{{ x }}{% else %}none{% endfor %}").remove(0)
        else {
            panic!("expected for");
        };
        assert_eq!(collection, Expr::path("user", &[Accessor::Key("items".to_string())]));
        assert_eq!(item, "x");
        assert_eq!(key, "x_key");
        assert_eq!(body.len(), 1);
        assert_eq!(otherwise.len(), 1);
    }

    #[test]
    fn test_malformed_for_header() {
        for source in [
            "{% for items %}{% endfor %}",
            "{% for items in x %}{% endfor %}",
            "{% for items as 1x %}{% endfor %}",
            "{% for items as x y %}{% endfor %}",
        ] {
            let err = compile_str(source).unwrap_err();
            assert_eq!(err.category(), ErrorCategory::Compilation, "{}", source);
        }
    }

    #[test]
    fn test_scoped_include() {
        assert_eq!(
            ops("{% include \"card\" with user.profile as p %}"),
            vec![Op::Include {
                template: "card".to_string(),
                scope: Some(ScopedBinding {
                    source: Expr::path("user", &[Accessor::Key("profile".to_string())]),
                    binding: "p".to_string(),
                }),
            }]
        );
    }

    #[test]
    fn test_block_in_base_template() {
        assert_eq!(
            ops("{% block title %}Default{% endblock %}"),
            vec![Op::Block {
                name: "title".to_string(),
                body: vec![Op::Emit {
                    text: "Default".to_string()
                }],
            }]
        );
    }

    #[test]
    fn test_extending_template_defines_blocks_then_extends() {
        let program = compile_str(
            "{% extends \"base\" %}ignored {{ x }}{% block title %}Override{% endblock %}",
        )
        .unwrap();
        assert_eq!(program.parent.as_deref(), Some("base"));
        assert_eq!(
            program.ops,
            vec![
                Op::DefineBlocks {
                    blocks: vec![BlockUnit {
                        name: "title".to_string(),
                        body: vec![Op::Emit {
                            text: "Override".to_string()
                        }],
                    }]
                },
                Op::Extend {
                    parent: "base".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_unreachable_content_still_checked() {
        let err = compile_str("{% extends \"base\" %}{% frobnicate %}").unwrap_err();
        assert!(err.to_string().contains("frobnicate"));
    }

    #[test]
    fn test_unknown_command() {
        let err = compile_str("{% macro greet %}").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Compilation);
        assert_eq!(
            err.to_string(),
            "Compilation error: unknown construct: control command `macro`"
        );
    }

    #[test]
    fn test_nested_extends_rejected() {
        let err = compile_str("{% if a %}{% extends \"base\" %}{% endif %}").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Compilation);
    }

    #[test]
    fn test_program_header() {
        let program = compile_str("{% include \"card\" %}").unwrap();
        assert_eq!(program.template_path, Path::new("/t/self.html"));
        assert_eq!(program.dependencies.len(), 2);
        assert!(program.compiled_at > 0);
    }

    #[test]
    fn test_compile_source_produces_code() {
        let resolver = StaticResolver::with(&[]);
        let code = compile_source("Hi {{ n }}", Path::new("/t/self.html"), &resolver).unwrap();
        let program = Program::from_code(&code, Path::new("/c.json")).unwrap();
        assert_eq!(program.ops.len(), 2);
    }
}
