//! Line-oriented diff engine for document content.
//!
//! Produces unified-diff payloads that can be applied in either direction,
//! so a stored delta for version K turns the content of K back into K-1.
//!
//! Payload format:
//! ```text
//! --- original
//! +++ modified
//! @@ -<old_start>,<old_len> +<new_start>,<new_len> @@
//!  context line
//! -removed line
//! +added line
//! ```
//!
//! Content is split on `\n` with trailing empty lines preserved; empty
//! content has zero lines. Joining the lines back with `\n` is therefore an
//! exact inverse of splitting, which is what makes reverse application
//! lossless.
//!
//! Reference: Myers, "An O(ND) Difference Algorithm and Its Variations" (1986)

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use similar::{capture_diff_slices, group_diff_ops, Algorithm, DiffTag};

use crate::error::PatchError;

/// Unchanged lines kept around each hunk.
const CONTEXT_LINES: usize = 3;
const OLD_LABEL: &str = "original";
const NEW_LABEL: &str = "modified";

/// Line and character counts describing one content change.
///
/// Informational only: reconstruction never looks at these numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStats {
    pub added_lines: u32,
    pub deleted_lines: u32,
    /// Absolute difference in character count between old and new content.
    pub changed_chars: u32,
}

impl ChangeStats {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn total_changed_lines(&self) -> u32 {
        self.added_lines.saturating_add(self.deleted_lines)
    }

    /// Added minus deleted lines; negative when the document shrank.
    pub fn net_line_change(&self) -> i64 {
        i64::from(self.added_lines) - i64::from(self.deleted_lines)
    }

    pub fn has_changes(&self) -> bool {
        self.added_lines > 0 || self.deleted_lines > 0 || self.changed_chars > 0
    }

    /// Human readable summary, e.g. `+10 -5 (~20 chars)`.
    pub fn summary(&self) -> String {
        if !self.has_changes() {
            return "no changes".to_string();
        }
        format!(
            "+{} -{} (~{} chars)",
            self.added_lines, self.deleted_lines, self.changed_chars
        )
    }
}

impl std::fmt::Display for ChangeStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Lowercase hex SHA-256 of the UTF-8 bytes of `content`.
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Check `content` against a previously computed hash.
///
/// An empty expected hash never matches.
pub fn verify_hash(content: &str, expected: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    content_hash(content).eq_ignore_ascii_case(expected)
}

/// Compute a unified diff turning `old` into `new`.
///
/// Returns an empty string when the contents are identical.
pub fn calculate_diff(old: &str, new: &str) -> String {
    if old == new {
        return String::new();
    }

    let old_lines = split_lines(old);
    let new_lines = split_lines(new);
    let ops = capture_diff_slices(Algorithm::Myers, &old_lines, &new_lines);

    let mut out = vec![format!("--- {OLD_LABEL}"), format!("+++ {NEW_LABEL}")];
    let mut hunks = 0usize;

    for group in group_diff_ops(ops, CONTEXT_LINES) {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        let old_start = first.old_range().start;
        let old_len = last.old_range().end - old_start;
        let new_start = first.new_range().start;
        let new_len = last.new_range().end - new_start;

        out.push(format!(
            "@@ -{} +{} @@",
            header_range(old_start, old_len),
            header_range(new_start, new_len)
        ));

        for op in &group {
            let (tag, old_range, new_range) = op.as_tag_tuple();
            match tag {
                DiffTag::Equal => {
                    out.extend(old_range.map(|i| format!(" {}", old_lines[i])));
                }
                DiffTag::Delete => {
                    out.extend(old_range.map(|i| format!("-{}", old_lines[i])));
                }
                DiffTag::Insert => {
                    out.extend(new_range.map(|i| format!("+{}", new_lines[i])));
                }
                DiffTag::Replace => {
                    out.extend(old_range.map(|i| format!("-{}", old_lines[i])));
                    out.extend(new_range.map(|i| format!("+{}", new_lines[i])));
                }
            }
        }
        hunks += 1;
    }

    if hunks == 0 {
        return String::new();
    }
    out.join("\n")
}

/// Apply a diff forward: content of the old side → content of the new side.
pub fn apply_patch(content: &str, patch: &str) -> Result<String, PatchError> {
    apply(content, patch, Direction::Forward)
}

/// Apply a diff backward: content of the new side → content of the old side.
pub fn reverse_patch(content: &str, patch: &str) -> Result<String, PatchError> {
    apply(content, patch, Direction::Reverse)
}

/// Compute line and character statistics for a change.
pub fn calculate_stats(old: &str, new: &str) -> ChangeStats {
    if old == new {
        return ChangeStats::zero();
    }

    let old_lines = split_lines(old);
    let new_lines = split_lines(new);
    let ops = capture_diff_slices(Algorithm::Myers, &old_lines, &new_lines);

    let mut added = 0usize;
    let mut deleted = 0usize;
    for op in &ops {
        let (tag, old_range, new_range) = op.as_tag_tuple();
        match tag {
            DiffTag::Equal => {}
            DiffTag::Insert => added += new_range.len(),
            DiffTag::Delete => deleted += old_range.len(),
            DiffTag::Replace => {
                added += new_range.len();
                deleted += old_range.len();
            }
        }
    }

    let old_chars = old.chars().count();
    let new_chars = new.chars().count();

    ChangeStats {
        added_lines: saturate(added),
        deleted_lines: saturate(deleted),
        changed_chars: saturate(old_chars.abs_diff(new_chars)),
    }
}

// ─── Internals ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Reverse,
}

#[derive(Debug)]
enum HunkLine<'a> {
    Context(&'a str),
    Removed(&'a str),
    Added(&'a str),
}

#[derive(Debug)]
struct Hunk<'a> {
    /// 0-based line index on the old side where the hunk begins.
    old_start: usize,
    old_len: usize,
    /// 0-based line index on the new side where the hunk begins.
    new_start: usize,
    new_len: usize,
    lines: Vec<HunkLine<'a>>,
}

fn split_lines(content: &str) -> Vec<&str> {
    if content.is_empty() {
        return Vec::new();
    }
    content.split('\n').collect()
}

fn saturate(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Unified-diff range: 1-based start, or the preceding line for empty ranges.
fn header_range(start: usize, len: usize) -> String {
    if len == 0 {
        format!("{start},0")
    } else {
        format!("{},{len}", start + 1)
    }
}

fn parse_range(spec: &str, header: &str) -> Result<(usize, usize), PatchError> {
    let malformed = || PatchError::MalformedHeader(header.to_string());
    let (start, len) = match spec.split_once(',') {
        Some((s, l)) => (
            s.parse::<usize>().map_err(|_| malformed())?,
            l.parse::<usize>().map_err(|_| malformed())?,
        ),
        None => (spec.parse::<usize>().map_err(|_| malformed())?, 1),
    };
    if len == 0 {
        return Ok((start, 0));
    }
    if start == 0 {
        return Err(malformed());
    }
    Ok((start - 1, len))
}

fn parse_header(header: &str) -> Result<(usize, usize, usize, usize), PatchError> {
    let malformed = || PatchError::MalformedHeader(header.to_string());
    let body = header
        .strip_prefix("@@ ")
        .and_then(|rest| rest.strip_suffix(" @@"))
        .ok_or_else(malformed)?;
    let (old, new) = body.split_once(' ').ok_or_else(malformed)?;
    let old = old.strip_prefix('-').ok_or_else(malformed)?;
    let new = new.strip_prefix('+').ok_or_else(malformed)?;
    let (old_start, old_len) = parse_range(old, header)?;
    let (new_start, new_len) = parse_range(new, header)?;
    Ok((old_start, old_len, new_start, new_len))
}

fn parse_patch(patch: &str) -> Result<Vec<Hunk<'_>>, PatchError> {
    let mut lines = patch.split('\n').enumerate();
    let mut hunks = Vec::new();

    while let Some((line_no, line)) = lines.next() {
        if hunks.is_empty() && (line.starts_with("--- ") || line.starts_with("+++ ")) {
            continue;
        }
        if !line.starts_with("@@") {
            return Err(PatchError::MalformedLine {
                line_no: line_no + 1,
                line: line.to_string(),
            });
        }

        let (old_start, old_len, new_start, new_len) = parse_header(line)?;
        let mut hunk = Hunk {
            old_start,
            old_len,
            new_start,
            new_len,
            lines: Vec::new(),
        };

        // Bodies are consumed by count, so content lines that happen to look
        // like headers are never misread.
        let (mut old_seen, mut new_seen) = (0usize, 0usize);
        while old_seen < old_len || new_seen < new_len {
            let (body_no, body) = lines
                .next()
                .ok_or(PatchError::Truncated { line_no: line_no + 1 })?;
            let malformed = || PatchError::MalformedLine {
                line_no: body_no + 1,
                line: body.to_string(),
            };
            let text = body.get(1..).unwrap_or("");
            let entry = match body.as_bytes().first() {
                Some(b' ') => {
                    old_seen += 1;
                    new_seen += 1;
                    HunkLine::Context(text)
                }
                Some(b'-') => {
                    old_seen += 1;
                    HunkLine::Removed(text)
                }
                Some(b'+') => {
                    new_seen += 1;
                    HunkLine::Added(text)
                }
                _ => return Err(malformed()),
            };
            if old_seen > old_len || new_seen > new_len {
                return Err(malformed());
            }
            hunk.lines.push(entry);
        }
        hunks.push(hunk);
    }

    Ok(hunks)
}

fn expect_line(source: &[&str], pos: usize, expected: &str) -> Result<(), PatchError> {
    match source.get(pos) {
        Some(found) if *found == expected => Ok(()),
        Some(found) => Err(PatchError::Mismatch {
            line: pos + 1,
            expected: expected.to_string(),
            found: found.to_string(),
        }),
        None => Err(PatchError::Mismatch {
            line: pos + 1,
            expected: expected.to_string(),
            found: "<end of content>".to_string(),
        }),
    }
}

fn apply<'a>(content: &'a str, patch: &'a str, direction: Direction) -> Result<String, PatchError> {
    if patch.trim().is_empty() {
        return Ok(content.to_string());
    }

    let hunks = parse_patch(patch)?;
    let source = split_lines(content);
    let mut out: Vec<&str> = Vec::with_capacity(source.len());
    let mut cursor = 0usize;

    for hunk in &hunks {
        let (start, len) = match direction {
            Direction::Forward => (hunk.old_start, hunk.old_len),
            Direction::Reverse => (hunk.new_start, hunk.new_len),
        };
        let in_range = start
            .checked_add(len)
            .is_some_and(|end| start >= cursor && end <= source.len());
        if !in_range {
            return Err(PatchError::OutOfRange {
                position: start.saturating_add(1),
                len: source.len(),
            });
        }
        out.extend_from_slice(&source[cursor..start]);

        let mut pos = start;
        for line in &hunk.lines {
            match (line, direction) {
                (HunkLine::Context(text), _) => {
                    expect_line(&source, pos, text)?;
                    out.push(*text);
                    pos += 1;
                }
                (HunkLine::Removed(text), Direction::Forward)
                | (HunkLine::Added(text), Direction::Reverse) => {
                    expect_line(&source, pos, text)?;
                    pos += 1;
                }
                (HunkLine::Added(text), Direction::Forward)
                | (HunkLine::Removed(text), Direction::Reverse) => {
                    out.push(*text);
                }
            }
        }
        cursor = pos;
    }

    out.extend_from_slice(&source[cursor..]);
    Ok(out.join("\n"))
}
