//! Splitting message content into plain-text and fenced-code segments

const FENCE: &str = "```";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Text,
    Code,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment<'a> {
    pub kind: SegmentKind,
    pub value: &'a str,
}

impl<'a> Segment<'a> {
    fn text(value: &'a str) -> Self {
        Self {
            kind: SegmentKind::Text,
            value,
        }
    }

    fn code(value: &'a str) -> Self {
        Self {
            kind: SegmentKind::Code,
            value,
        }
    }
}

/// Split `content` on paired triple-backtick fences.
///
/// Empty text segments are dropped; code segments are kept even when empty.
/// An opening fence with no partner is left in the trailing text segment.
pub fn segments(content: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut cursor = 0;

    while let Some(open) = content[cursor..].find(FENCE) {
        let open = cursor + open;
        let body_start = open + FENCE.len();
        let Some(close) = content[body_start..].find(FENCE) else {
            break;
        };
        let close = body_start + close;

        if open > cursor {
            out.push(Segment::text(&content[cursor..open]));
        }
        out.push(Segment::code(&content[body_start..close]));
        cursor = close + FENCE.len();
    }

    if cursor < content.len() {
        out.push(Segment::text(&content[cursor..]));
    }

    out
}
