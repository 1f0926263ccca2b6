//! Inline diff of two styled-run sequences.
//!
//! Equal text is compared character by character for formatting changes.
//! Different text is aligned word by word with an LCS over
//! whitespace-separated tokens, and each token re-acquires the formatting of
//! the run it came from.

use std::sync::OnceLock;

use regex::Regex;

use super::types::{DiffSegment, SegmentKind, Style, StyledRun, plain_text};

/// Result of diffing two run sequences.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentDiff {
    /// Ordered, classified segments
    pub segments: Vec<DiffSegment>,
    /// True iff the text is equal and at least one character changed style
    pub is_style_only: bool,
}

/// Diff two run sequences.
///
/// When the concatenated text is equal this reports formatting changes only;
/// otherwise it reports a word-level diff of added, removed and unchanged
/// tokens.
pub fn diff_segments(old: &[StyledRun], new: &[StyledRun]) -> SegmentDiff {
    let old_text = plain_text(old);
    let new_text = plain_text(new);

    if old_text == new_text {
        diff_styles(old, new)
    } else {
        SegmentDiff {
            segments: diff_words(old, new, &old_text, &new_text),
            is_style_only: false,
        }
    }
}

// ==================== Style-only diff ====================

fn char_styles(runs: &[StyledRun]) -> Vec<(char, Style)> {
    runs.iter()
        .flat_map(|run| {
            let style = run.style();
            run.text.chars().map(move |c| (c, style))
        })
        .collect()
}

fn diff_styles(old: &[StyledRun], new: &[StyledRun]) -> SegmentDiff {
    let old_chars = char_styles(old);
    let new_chars = char_styles(new);

    let mut segments: Vec<DiffSegment> = Vec::new();
    let mut is_style_only = false;

    for (&(c, new_style), &(_, old_style)) in new_chars.iter().zip(old_chars.iter()) {
        let kind = if new_style == old_style {
            SegmentKind::Unchanged
        } else {
            is_style_only = true;
            SegmentKind::StyleChanged
        };

        if let Some(last) = segments.last_mut()
            && last.classification == kind
            && last.run.style() == new_style
        {
            last.run.text.push(c);
            if let Some(prior) = last.prior_run.as_mut() {
                prior.text.push(c);
            }
            continue;
        }

        segments.push(match kind {
            SegmentKind::StyleChanged => {
                DiffSegment::style_changed(new_style.run(c), old_style.run(c))
            }
            _ => DiffSegment::new(kind, new_style.run(c)),
        });
    }

    SegmentDiff {
        segments,
        is_style_only,
    }
}

// ==================== Word diff ====================

fn whitespace() -> &'static Regex {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("whitespace pattern is a valid regex"))
}

/// Split into alternating word and whitespace tokens, keeping the separators.
///
/// A leading or trailing separator produces an empty token at that end, so
/// the tokens always concatenate back to the input.
fn tokenize(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut last = 0;
    for sep in whitespace().find_iter(text) {
        tokens.push(&text[last..sep.start()]);
        tokens.push(sep.as_str());
        last = sep.end();
    }
    tokens.push(&text[last..]);
    tokens
}

/// Longest common subsequence of two token lists.
///
/// Backtracking steps toward the old side only when that keeps a strictly
/// longer subsequence, so ties move along the new side.
fn lcs<'a>(old: &[&'a str], new: &[&'a str]) -> Vec<&'a str> {
    let (m, n) = (old.len(), new.len());
    let mut dp = vec![vec![0usize; n + 1]; m + 1];

    for i in 1..=m {
        for j in 1..=n {
            dp[i][j] = if old[i - 1] == new[j - 1] {
                dp[i - 1][j - 1] + 1
            } else {
                dp[i - 1][j].max(dp[i][j - 1])
            };
        }
    }

    let mut common = Vec::with_capacity(dp[m][n]);
    let (mut i, mut j) = (m, n);
    while i > 0 && j > 0 {
        if old[i - 1] == new[j - 1] {
            common.push(old[i - 1]);
            i -= 1;
            j -= 1;
        } else if dp[i - 1][j] > dp[i][j - 1] {
            i -= 1;
        } else {
            j -= 1;
        }
    }
    common.reverse();
    common
}

/// Walk both token lists against their LCS.
///
/// Removals are emitted before the insertions that share an alignment point.
fn align<'a>(old: &[&'a str], new: &[&'a str]) -> Vec<(SegmentKind, &'a str)> {
    let common = lcs(old, new);
    let mut ops = Vec::with_capacity(old.len() + new.len());
    let (mut oi, mut ni, mut ci) = (0, 0, 0);

    while oi < old.len() || ni < new.len() {
        let anchor = common.get(ci).copied();

        if anchor.is_some() && old.get(oi).copied() == anchor {
            if new.get(ni).copied() == anchor {
                ops.push((SegmentKind::Unchanged, old[oi]));
                oi += 1;
                ni += 1;
                ci += 1;
            } else {
                ops.push((SegmentKind::Added, new[ni]));
                ni += 1;
            }
        } else if anchor.is_some() && new.get(ni).copied() == anchor {
            ops.push((SegmentKind::Removed, old[oi]));
            oi += 1;
        } else if oi < old.len() {
            ops.push((SegmentKind::Removed, old[oi]));
            oi += 1;
        } else if ni < new.len() {
            ops.push((SegmentKind::Added, new[ni]));
            ni += 1;
        } else {
            break;
        }
    }

    ops
}

/// Formatting of the run covering a character offset, if any.
fn style_at(runs: &[StyledRun], offset: usize) -> Style {
    let mut pos = 0;
    for run in runs {
        let len = run.text.chars().count();
        if pos + len > offset {
            return run.style();
        }
        pos += len;
    }
    Style::default()
}

fn diff_words(
    old: &[StyledRun],
    new: &[StyledRun],
    old_text: &str,
    new_text: &str,
) -> Vec<DiffSegment> {
    let old_tokens = tokenize(old_text);
    let new_tokens = tokenize(new_text);

    let mut segments = Vec::new();
    let mut old_pos = 0;
    let mut new_pos = 0;

    for (kind, token) in align(&old_tokens, &new_tokens) {
        let len = token.chars().count();
        if len == 0 {
            continue;
        }

        let style = if kind == SegmentKind::Removed {
            style_at(old, old_pos)
        } else {
            style_at(new, new_pos)
        };
        segments.push(DiffSegment::new(kind, style.run(token)));

        match kind {
            SegmentKind::Removed => old_pos += len,
            SegmentKind::Unchanged => {
                old_pos += len;
                new_pos += len;
            }
            _ => new_pos += len,
        }
    }

    segments
}
