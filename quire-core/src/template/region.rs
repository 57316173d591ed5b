//! Literal delimiter scanning for template regions.

use std::ops::Range;

pub const EXPRESSION_OPEN: &str = "{{";
pub const EXPRESSION_CLOSE: &str = "}}";
pub const CODE_OPEN: &str = "<!--%";
pub const CODE_CLOSE: &str = "%-->";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Expression,
    Code,
}

impl RegionKind {
    pub fn delimiters(self) -> (&'static str, &'static str) {
        match self {
            RegionKind::Expression => (EXPRESSION_OPEN, EXPRESSION_CLOSE),
            RegionKind::Code => (CODE_OPEN, CODE_CLOSE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(Range<usize>),
    Region {
        kind: RegionKind,
        /// Whole region, delimiters included
        span: Range<usize>,
        /// Text between the delimiters
        body: Range<usize>,
    },
}

impl Segment {
    pub fn span(&self) -> Range<usize> {
        match self {
            Segment::Text(span) | Segment::Region { span, .. } => span.clone(),
        }
    }
}

/// An opening delimiter with no matching close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unterminated {
    pub kind: RegionKind,
    pub offset: usize,
}

/// Split `text` into literal text and regions of the given kinds.
///
/// The earliest opening delimiter wins; its body runs to the first matching
/// close, so one kind of region may contain the other's delimiters.
pub fn scan(text: &str, kinds: &[RegionKind]) -> Result<Vec<Segment>, Unterminated> {
    let mut segments = Vec::new();
    let mut cursor = 0;

    while cursor < text.len() {
        let next = kinds
            .iter()
            .filter_map(|&kind| {
                let (open, _) = kind.delimiters();
                text[cursor..].find(open).map(|at| (cursor + at, kind))
            })
            .min_by_key(|&(at, _)| at);

        let Some((start, kind)) = next else { break };
        let (open, close) = kind.delimiters();
        let body_start = start + open.len();
        let body_end = text[body_start..]
            .find(close)
            .map(|at| body_start + at)
            .ok_or(Unterminated {
                kind,
                offset: start,
            })?;
        let end = body_end + close.len();

        if start > cursor {
            segments.push(Segment::Text(cursor..start));
        }
        segments.push(Segment::Region {
            kind,
            span: start..end,
            body: body_start..body_end,
        });
        cursor = end;
    }

    if cursor < text.len() {
        segments.push(Segment::Text(cursor..text.len()));
    }

    Ok(segments)
}
