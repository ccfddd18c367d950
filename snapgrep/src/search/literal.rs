use regex_syntax::hir::{Hir, HirKind};

/// Finds a long substring that appears in every match of `hir`.
///
/// Only literals, captures, repetitions of at least one and concatenations
/// are understood. A concatenation contributes its single longest part, so a
/// longer guaranteed substring may exist (alternations are never analysed).
pub(crate) fn longest_literal(hir: &Hir) -> Vec<u8> {
    match hir.kind() {
        HirKind::Literal(lit) => lit.0.to_vec(),
        HirKind::Capture(cap) => longest_literal(&cap.sub),
        HirKind::Repetition(rep) if rep.min >= 1 => longest_literal(&rep.sub),
        HirKind::Concat(subs) => subs.iter().map(longest_literal).fold(
            Vec::new(),
            |longest, lit| {
                if lit.len() > longest.len() {
                    lit
                } else {
                    longest
                }
            },
        ),
        _ => Vec::new(),
    }
}

/// The literal every match must start with, if any.
///
/// Repetitions are not looked through, unlike in [`longest_literal`], so
/// `(?:foo)+bar` has no prefix and gets a required literal instead.
pub(crate) fn literal_prefix(hir: &Hir) -> &[u8] {
    match hir.kind() {
        HirKind::Literal(lit) => &lit.0,
        HirKind::Capture(cap) => literal_prefix(&cap.sub),
        HirKind::Concat(subs) => subs.first().map_or(&[][..], literal_prefix),
        _ => &[],
    }
}
