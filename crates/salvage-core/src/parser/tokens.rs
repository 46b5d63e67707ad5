//! Token-level structural scan.
//!
//! Middle stage of the parser chain: recognizes block-introducer keywords
//! (`def`, `class`, `import`, `from`) positionally at statement heads
//! without requiring grammar validity. Strings are blanked before bracket
//! counting so literals cannot confuse the scanner; indentation drives
//! block nesting and element end lines. The only hard failure is an
//! unterminated triple-quoted string, which the chain catches and hands to
//! the pattern stage.

use crate::models::{
    BindingEntry, Diagnostic, DiagnosticKind, Fidelity, FunctionEntry, ImportEntry,
    StructuralModel, TypeEntry,
};

/// Raised when the scanner cannot even tokenize the text.
#[derive(Clone, Debug)]
pub struct TokenScanError {
    pub line: u32,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Line-level string/bracket state
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ScanState {
    /// Quote char of an open triple-quoted string, if any.
    triple: Option<char>,
    /// Line where the open triple-quoted string started (for the error).
    triple_start: u32,
    bracket_depth: i32,
}

/// Blank string contents in one physical line while updating `state`.
/// Returns the line with every in-string character replaced by a space, so
/// bracket counting and keyword matching see only code.
fn blank_strings(line: &str, line_no: u32, state: &mut ScanState, diags: &mut Vec<Diagnostic>) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(chars.len());
    let mut i = 0;
    let mut single: Option<char> = None;

    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = state.triple {
            if c == q && chars.get(i + 1) == Some(&q) && chars.get(i + 2) == Some(&q) {
                state.triple = None;
                out.push_str("   ");
                i += 3;
            } else {
                out.push(' ');
                i += 1;
            }
            continue;
        }
        if let Some(q) = single {
            if c == '\\' {
                out.push_str("  ");
                i += 2;
            } else if c == q {
                single = None;
                out.push(' ');
                i += 1;
            } else {
                out.push(' ');
                i += 1;
            }
            continue;
        }
        match c {
            '#' => break, // comment: rest of line is not code
            '\'' | '"' => {
                if chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c) {
                    state.triple = Some(c);
                    state.triple_start = line_no;
                    out.push_str("   ");
                    i += 3;
                } else {
                    single = Some(c);
                    out.push(' ');
                    i += 1;
                }
            }
            '(' | '[' | '{' => {
                state.bracket_depth += 1;
                out.push(c);
                i += 1;
            }
            ')' | ']' | '}' => {
                state.bracket_depth -= 1;
                if state.bracket_depth < 0 {
                    diags.push(Diagnostic::new(
                        DiagnosticKind::ParseDegradation,
                        Some(line_no),
                        "unmatched closing bracket",
                    ));
                    state.bracket_depth = 0;
                }
                out.push(c);
                i += 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    if single.is_some() {
        diags.push(Diagnostic::new(
            DiagnosticKind::ParseDegradation,
            Some(line_no),
            "unterminated string literal",
        ));
    }
    out
}

// ---------------------------------------------------------------------------
// Block tracking
// ---------------------------------------------------------------------------

enum BlockKind {
    Function(usize),
    Type(usize),
}

struct Block {
    indent: usize,
    kind: BlockKind,
}

fn indent_width(line: &str) -> usize {
    let mut width = 0;
    for c in line.chars() {
        match c {
            ' ' => width += 1,
            '\t' => width += 8,
            _ => break,
        }
    }
    width
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

/// Scan `text` into an approximate structural model.
pub fn scan(text: &str) -> Result<StructuralModel, TokenScanError> {
    let mut model = StructuralModel {
        imports: vec![],
        functions: vec![],
        types: vec![],
        bindings: vec![],
        diagnostics: vec![],
        fidelity: Fidelity::TokenRecovered,
        line_count: text.lines().count() as u32,
    };
    let mut state = ScanState::default();
    let mut blocks: Vec<Block> = Vec::new();
    let mut last_code_line: u32 = 0;

    // One logical statement: head line number, indent, and joined blanked
    // code of all its physical lines.
    let mut pending: Option<(u32, usize, String)> = None;

    let lines: Vec<&str> = text.lines().collect();
    for (idx, raw) in lines.iter().enumerate() {
        let line_no = idx as u32 + 1;
        let in_triple_at_start = state.triple.is_some();
        let depth_at_start = state.bracket_depth;
        let code = blank_strings(raw, line_no, &mut state, &mut model.diagnostics);

        if in_triple_at_start {
            // Entire line is (or starts inside) a string body.
            continue;
        }
        if code.trim().is_empty() {
            continue;
        }
        last_code_line = line_no;

        // A block introducer can never legally start inside brackets, so
        // treat one as evidence of a dangling bracket and resynchronize.
        let trimmed = code.trim_start();
        let looks_like_head = ["def ", "async def ", "class ", "import ", "from "]
            .iter()
            .any(|kw| trimmed.starts_with(kw));
        if depth_at_start > 0 && looks_like_head {
            model.diagnostics.push(Diagnostic::new(
                DiagnosticKind::ParseDegradation,
                Some(line_no),
                "unbalanced brackets before block introducer",
            ));
            state.bracket_depth = (state.bracket_depth - depth_at_start).max(0);
        } else {
            let continuation = depth_at_start > 0
                || pending
                    .as_ref()
                    .is_some_and(|(_, _, joined)| joined.trim_end().ends_with('\\'));
            if continuation {
                if let Some((_, _, joined)) = pending.as_mut() {
                    let head = joined.trim_end_matches('\\').trim_end().to_string();
                    *joined = format!("{head} {}", code.trim());
                }
                continue;
            }
        }

        // A new statement head: flush the previous one.
        if let Some((head_line, head_indent, joined)) = pending.take() {
            close_blocks(&mut blocks, head_indent, head_line, &mut model);
            consume_statement(head_line, head_indent, &joined, &mut blocks, &mut model);
        }
        pending = Some((line_no, indent_width(raw), code));
    }

    if let Some((head_line, head_indent, joined)) = pending.take() {
        close_blocks(&mut blocks, head_indent, head_line, &mut model);
        consume_statement(head_line, head_indent, &joined, &mut blocks, &mut model);
    }

    if let Some(q) = state.triple {
        return Err(TokenScanError {
            line: state.triple_start,
            message: format!("unterminated triple-quoted string ({q}{q}{q})"),
        });
    }

    // Close every still-open block at EOF.
    finish_blocks(&mut blocks, last_code_line.max(1), &mut model);

    if state.bracket_depth > 0 {
        model.diagnostics.push(Diagnostic::new(
            DiagnosticKind::ParseDegradation,
            Some(last_code_line.max(1)),
            "unbalanced brackets at end of file",
        ));
    }
    Ok(model)
}

/// Pop blocks whose bodies end before a statement at `indent`, assigning
/// their end lines.
fn close_blocks(blocks: &mut Vec<Block>, indent: usize, current_line: u32, model: &mut StructuralModel) {
    while blocks.last().is_some_and(|b| indent <= b.indent) {
        let block = blocks.pop().unwrap();
        let end = current_line.saturating_sub(1).max(1);
        match block.kind {
            BlockKind::Function(i) => model.functions[i].end_line = end,
            BlockKind::Type(i) => model.types[i].end_line = end,
        }
    }
}

fn finish_blocks(blocks: &mut Vec<Block>, last_line: u32, model: &mut StructuralModel) {
    while let Some(block) = blocks.pop() {
        match block.kind {
            BlockKind::Function(i) => model.functions[i].end_line = last_line,
            BlockKind::Type(i) => model.types[i].end_line = last_line,
        }
    }
}

/// Recognize one logical statement head.
fn consume_statement(
    line: u32,
    indent: usize,
    joined: &str,
    blocks: &mut Vec<Block>,
    model: &mut StructuralModel,
) {
    let stmt = joined.trim_start();
    let stmt = stmt.strip_prefix("async ").map(str::trim_start).unwrap_or(stmt);

    if let Some(rest) = stmt.strip_prefix("def ") {
        let (name, params) = parse_def_header(rest, line, model);
        let depth = blocks.len() as u32;
        if let Some(Block {
            kind: BlockKind::Type(class_idx),
            ..
        }) = blocks.last()
        {
            model.types[*class_idx].methods.push(name.clone());
        }
        model.functions.push(FunctionEntry {
            name,
            parameters: params,
            start_line: line,
            end_line: line,
            depth,
        });
        if !stmt.trim_end().ends_with(':') {
            model.diagnostics.push(Diagnostic::new(
                DiagnosticKind::ParseDegradation,
                Some(line),
                "block introducer without trailing colon",
            ));
        }
        blocks.push(Block {
            indent,
            kind: BlockKind::Function(model.functions.len() - 1),
        });
        return;
    }

    if let Some(rest) = stmt.strip_prefix("class ") {
        let name: String = rest
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        model.types.push(TypeEntry {
            name,
            methods: vec![],
            start_line: line,
            end_line: line,
            depth: blocks.len() as u32,
        });
        blocks.push(Block {
            indent,
            kind: BlockKind::Type(model.types.len() - 1),
        });
        return;
    }

    if let Some(rest) = stmt.strip_prefix("import ") {
        for part in rest.split(',') {
            let part = part.trim().trim_end_matches(':').trim();
            if part.is_empty() {
                continue;
            }
            let (module, bound) = match part.split_once(" as ") {
                Some((m, alias)) => (m.trim().to_string(), alias.trim().to_string()),
                None => {
                    let m = part.to_string();
                    let head = m.split('.').next().unwrap_or(&m).to_string();
                    (m, head)
                }
            };
            model.imports.push(ImportEntry {
                module,
                bound_name: bound,
                line,
            });
        }
        return;
    }

    if let Some(rest) = stmt.strip_prefix("from ") {
        if let Some((module_part, names_part)) = rest.split_once(" import ") {
            let module = module_part.trim().to_string();
            let names = names_part.trim().trim_start_matches('(').trim_end_matches(')');
            for part in names.split(',') {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                let bound = match part.split_once(" as ") {
                    Some((_, alias)) => alias.trim().to_string(),
                    None => part.to_string(),
                };
                if is_ident(&bound) || bound == "*" {
                    model.imports.push(ImportEntry {
                        module: module.clone(),
                        bound_name: bound,
                        line,
                    });
                }
            }
        }
        return;
    }

    // Module-level binding: `name = ...` outside any block, not `==`.
    if blocks.is_empty() {
        if let Some(eq) = stmt.find('=') {
            let before = stmt[..eq].trim();
            let after_char = stmt[eq + 1..].chars().next();
            if is_ident(before) && after_char != Some('=') {
                model.bindings.push(BindingEntry {
                    name: before.to_string(),
                    line,
                });
            }
        }
    }
}

/// Parse `name(params):` after the `def` keyword, tolerating a missing
/// parameter list or closing parenthesis.
fn parse_def_header(rest: &str, line: u32, model: &mut StructuralModel) -> (String, Vec<String>) {
    let name: String = rest
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    let params_raw = match (rest.find('('), rest.rfind(')')) {
        (Some(open), Some(close)) if close > open => &rest[open + 1..close],
        (Some(open), _) => {
            model.diagnostics.push(Diagnostic::new(
                DiagnosticKind::ParseDegradation,
                Some(line),
                format!("unterminated parameter list for '{name}'"),
            ));
            rest[open + 1..].trim_end_matches(':')
        }
        (None, _) => {
            model.diagnostics.push(Diagnostic::new(
                DiagnosticKind::ParseDegradation,
                Some(line),
                format!("function '{name}' has no parameter list"),
            ));
            ""
        }
    };

    let mut params = Vec::new();
    for chunk in params_raw.split(',') {
        let p = chunk.trim();
        if p.is_empty() {
            continue;
        }
        // Drop annotations and defaults, keep the bare name.
        let bare = p
            .trim_start_matches('*')
            .split([':', '='])
            .next()
            .unwrap_or("")
            .trim();
        if is_ident(bare) {
            params.push(bare.to_string());
        }
    }
    (name, params)
}
