/*
 * structure.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Control-flow structuring.
//!
//! Turns the flat token stream into nested `if`/`for`/`block` constructs.
//! Each opening command has its own routine; all of them collect into a
//! [`Branches`] builder whose active list switches on `else`.

use crate::error::{TemplateError, TemplateResult};
use crate::token::{Command, Control, Token};

type Stream = std::vec::IntoIter<Token>;

/// Nest every control pairing in `tokens`.
///
/// Fails on a construct that reaches end of input unclosed, and on closing
/// or `else` markers that have no construct to attach to.
pub fn structure(tokens: Vec<Token>) -> TemplateResult<Vec<Token>> {
    let mut stream = tokens.into_iter();
    let mut out = Vec::new();
    while let Some(token) = stream.next() {
        out.push(structure_token(token, &mut stream)?);
    }
    Ok(out)
}

/// Resolve a single token, consuming its body from `stream` if it opens one.
fn structure_token(token: Token, stream: &mut Stream) -> TemplateResult<Token> {
    let Token::Control(control) = token else {
        return Ok(token);
    };
    match control.command {
        Command::If => structure_if(control, stream),
        Command::For => structure_for(control, stream),
        Command::Block => structure_block(control, stream),
        Command::Else | Command::Endif | Command::Endfor | Command::Endblock => {
            Err(TemplateError::syntax(format!(
                "unexpected `{}` without a matching opening tag",
                control.command
            )))
        }
        _ => Ok(Token::Control(control)),
    }
}

/// Children collected so far, and which list new tokens go to.
#[derive(Default)]
struct Branches {
    children: Vec<Token>,
    else_children: Vec<Token>,
    in_else: bool,
}

impl Branches {
    fn active(&mut self) -> &mut Vec<Token> {
        if self.in_else {
            &mut self.else_children
        } else {
            &mut self.children
        }
    }

    fn finish(self, mut control: Control) -> Token {
        control.children = self.children;
        control.else_children = self.else_children;
        Token::Control(control)
    }
}

fn structure_if(control: Control, stream: &mut Stream) -> TemplateResult<Token> {
    let branches = collect_branches(&Command::If, stream, true)?;
    Ok(branches.finish(control))
}

fn structure_for(control: Control, stream: &mut Stream) -> TemplateResult<Token> {
    let branches = collect_branches(&Command::For, stream, true)?;
    Ok(branches.finish(control))
}

fn structure_block(control: Control, stream: &mut Stream) -> TemplateResult<Token> {
    let branches = collect_branches(&Command::Block, stream, false)?;
    Ok(branches.finish(control))
}

/// Collect tokens until the closer of `opening`.
fn collect_branches(
    opening: &Command,
    stream: &mut Stream,
    allow_else: bool,
) -> TemplateResult<Branches> {
    let closer = opening.closer();
    let mut branches = Branches::default();

    loop {
        let Some(token) = stream.next() else {
            return Err(TemplateError::UnclosedConstruct {
                construct: opening.to_string(),
            });
        };

        if let Token::Control(control) = &token {
            if Some(&control.command) == closer.as_ref() {
                return Ok(branches);
            }
            if control.command == Command::Else {
                if !allow_else {
                    return Err(TemplateError::syntax(format!(
                        "`else` is not allowed inside `{}`",
                        opening
                    )));
                }
                if branches.in_else {
                    return Err(TemplateError::syntax(format!(
                        "duplicate `else` inside `{}`",
                        opening
                    )));
                }
                branches.in_else = true;
                continue;
            }
        }

        let resolved = structure_token(token, stream)?;
        branches.active().push(resolved);
    }
}

/// Inverse of [`structure`]: re-emit the opening, `else` and closing markers.
pub fn flatten(tokens: &[Token]) -> Vec<Token> {
    let mut out = Vec::new();
    flatten_into(tokens, &mut out);
    out
}

/// Write flattened tokens back in template syntax, one tag per control token.
pub fn flat_source(tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        match token {
            Token::Control(control) => out.push_str(&control.tag_source()),
            other => other.write_source(&mut out),
        }
    }
    out
}

fn flatten_into(tokens: &[Token], out: &mut Vec<Token>) {
    for token in tokens {
        match token {
            Token::Control(control) if control.command.opens_body() => {
                out.push(Token::Control(control.flat()));
                flatten_into(&control.children, out);
                if !control.else_children.is_empty() {
                    out.push(Token::control(Command::Else, ""));
                    flatten_into(&control.else_children, out);
                }
                if let Some(closer) = control.command.closer() {
                    out.push(Token::control(closer, ""));
                }
            }
            other => out.push(other.clone()),
        }
    }
}
