//! Rewrites a regular expression so it can run against ASCII-lowercased
//! input instead of using the engine's case-insensitive mode.
//!
//! Literals and explicit class ranges are lowered. Shorthands such as `\S`,
//! `\W` or `\B` are left alone because lowering their text would change what
//! they mean. Named classes whose meaning depends on case (`\p{Lu}`,
//! `[[:upper:]]`) are scoped with `(?i:...)` instead, which costs nothing at
//! match time for a single class.

use regex_syntax::ast::{
    self, parse::Parser, print::Printer, Ast, ClassAsciiKind, ClassSet, ClassSetItem,
    ClassSetRange, Literal, LiteralKind, Span,
};
use std::mem;

use crate::errors::{SearchError, SearchResult};

/// Parses `expr`, lowers it and prints it back as a pattern string
pub(crate) fn lower_regex_ascii(expr: &str) -> SearchResult<String> {
    // Freshly parsed and owned here, so it is safe to rewrite in place
    let mut ast = Parser::new().parse(expr)?;
    lower_ast(&mut ast);
    let mut out = String::with_capacity(expr.len());
    Printer::new()
        .print(&ast, &mut out)
        .map_err(|e| SearchError::invalid_pattern(e.to_string()))?;
    Ok(out)
}

fn lower_ast(ast: &mut Ast) {
    let case_dependent = match ast {
        Ast::ClassUnicode(_) => true,
        Ast::ClassBracketed(class) => set_is_case_dependent(&class.kind),
        _ => false,
    };
    if case_dependent {
        wrap_case_insensitive(ast);
        return;
    }

    match ast {
        Ast::Literal(lit) => lit.c = lit.c.to_ascii_lowercase(),
        Ast::ClassBracketed(class) => lower_class_set(&mut class.kind),
        Ast::Repetition(rep) => lower_ast(&mut rep.ast),
        Ast::Group(group) => lower_ast(&mut group.ast),
        Ast::Alternation(alt) => alt.asts.iter_mut().for_each(lower_ast),
        Ast::Concat(concat) => concat.asts.iter_mut().for_each(lower_ast),
        // Empty, flags, dot, assertions and perl classes
        _ => {}
    }
}

fn lower_class_set(set: &mut ClassSet) {
    match set {
        ClassSet::Item(item) => {
            let span = *item.span();
            let owned = mem::replace(item, ClassSetItem::Empty(span));
            *item = lower_class_item(owned);
        }
        ClassSet::BinaryOp(op) => {
            lower_class_set(&mut op.lhs);
            lower_class_set(&mut op.rhs);
        }
    }
}

fn lower_class_item(item: ClassSetItem) -> ClassSetItem {
    match item {
        ClassSetItem::Literal(mut lit) => {
            lit.c = lit.c.to_ascii_lowercase();
            ClassSetItem::Literal(lit)
        }
        ClassSetItem::Range(range) => lower_range(range),
        ClassSetItem::Bracketed(mut class) => {
            lower_class_set(&mut class.kind);
            ClassSetItem::Bracketed(class)
        }
        ClassSetItem::Union(ast::ClassSetUnion { span, items }) => {
            ClassSetItem::Union(ast::ClassSetUnion {
                span,
                items: items.into_iter().map(lower_class_item).collect(),
            })
        }
        other => other,
    }
}

/// Ranges inside `A-Z` move to `a-z`. Ranges that straddle `A-Z` keep their
/// original bounds and gain the lowered intersection, so nothing outside the
/// letters is dropped or added.
fn lower_range(range: ClassSetRange) -> ClassSetItem {
    let (start, end) = (range.start.c, range.end.c);
    if start > 'Z' || end < 'A' {
        return ClassSetItem::Range(range);
    }

    if start >= 'A' && end <= 'Z' {
        let mut range = range;
        range.start.c = start.to_ascii_lowercase();
        range.end.c = end.to_ascii_lowercase();
        return ClassSetItem::Range(range);
    }

    let span = range.span;
    let lowered = ClassSetRange {
        span,
        start: verbatim(span, start.max('A').to_ascii_lowercase()),
        end: verbatim(span, end.min('Z').to_ascii_lowercase()),
    };
    ClassSetItem::Union(ast::ClassSetUnion {
        span,
        items: vec![ClassSetItem::Range(range), ClassSetItem::Range(lowered)],
    })
}

fn verbatim(span: Span, c: char) -> Literal {
    Literal {
        span,
        kind: LiteralKind::Verbatim,
        c,
    }
}

fn set_is_case_dependent(set: &ClassSet) -> bool {
    match set {
        ClassSet::Item(item) => item_is_case_dependent(item),
        ClassSet::BinaryOp(op) => set_is_case_dependent(&op.lhs) || set_is_case_dependent(&op.rhs),
    }
}

fn item_is_case_dependent(item: &ClassSetItem) -> bool {
    match item {
        ClassSetItem::Ascii(class) => {
            matches!(class.kind, ClassAsciiKind::Upper | ClassAsciiKind::Lower)
        }
        ClassSetItem::Unicode(_) => true,
        ClassSetItem::Bracketed(class) => set_is_case_dependent(&class.kind),
        ClassSetItem::Union(union) => union.items.iter().any(item_is_case_dependent),
        _ => false,
    }
}

/// Replaces `ast` with `(?i:ast)`
fn wrap_case_insensitive(ast: &mut Ast) {
    let span = *ast.span();
    let inner = mem::replace(ast, Ast::empty(span));
    *ast = Ast::group(ast::Group {
        span,
        kind: ast::GroupKind::NonCapturing(ast::Flags {
            span,
            items: vec![ast::FlagsItem {
                span,
                kind: ast::FlagsItemKind::Flag(ast::Flag::CaseInsensitive),
            }],
        }),
        ast: Box::new(inner),
    });
}
