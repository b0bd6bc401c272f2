//! Prompt shrinking for backend context limits.
//!
//! [`optimize`] is a pure transformation: the same prompt, descriptor and
//! settings always yield the same output. Prompts that already fit are
//! returned borrowed and unchanged.
//!
//! Shrinking happens in three stages, stopping as soon as the prompt
//! fits:
//!
//! 1. Drop the oldest conversational turns. System instructions (a
//!    leading preamble or `System:`-prefixed turns) and the most recent
//!    exchange are never dropped.
//! 2. Proportionally squeeze the remaining free-text lines middle-out
//!    (head and tail kept, the middle elided), leaving structured
//!    lines — tables, column lists, numeric rows — verbatim.
//! 3. Append [`TRUNCATION_MARKER`] so downstream consumers can detect
//!    information loss.
//!
//! Turns are recognised by `System:` / `User:` / `Assistant:` line
//! prefixes; anything before the first prefix counts as system
//! instructions.

use std::borrow::Cow;

use crate::config::OptimizationSettings;
use crate::registry::BackendDescriptor;

/// Appended to every shrunk prompt.
pub const TRUNCATION_MARKER: &str = "[...content truncated to fit model context...]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    /// Preamble or `System:` turn; preserved in full until the final
    /// hard clamp.
    System,
    /// `User:` / `Assistant:` turn; oldest dropped first.
    History,
}

#[derive(Debug)]
struct Block {
    kind: BlockKind,
    text: String,
}

/// Shrink `prompt` to fit `descriptor.max_prompt_chars`.
///
/// Identity when truncation is disabled or the prompt already fits. The
/// output, marker included, never exceeds the backend limit.
pub fn optimize<'a>(
    prompt: &'a str,
    descriptor: &BackendDescriptor,
    settings: &OptimizationSettings,
) -> Cow<'a, str> {
    let limit = descriptor.max_prompt_chars;
    if !settings.enable_context_truncation || char_len(prompt) <= limit {
        return Cow::Borrowed(prompt);
    }

    // Reserve room for the marker and its separating newline.
    let budget = limit.saturating_sub(char_len(TRUNCATION_MARKER) + 1);

    let mut blocks = parse_blocks(prompt);
    drop_oldest_history(&mut blocks, budget);
    if assembled_len(&blocks) > budget {
        squeeze_prose(&mut blocks, budget);
    }

    let mut out = blocks
        .iter()
        .map(|b| b.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    if char_len(&out) > budget {
        // Structured/system content alone exceeded the limit
        out = take_chars(&out, budget).to_string();
    }
    out.push('\n');
    out.push_str(TRUNCATION_MARKER);
    if char_len(&out) > limit {
        out = take_chars(&out, limit).to_string();
    }
    Cow::Owned(out)
}

/// Whether a line carries structured data that must survive verbatim:
/// table rows, comma-separated column lists, or mostly-numeric content.
fn is_structured_line(line: &str) -> bool {
    if line.contains('|') || line.contains('\t') {
        return true;
    }
    if line.matches(',').count() >= 3 {
        return true;
    }
    let total = char_len(line);
    if total == 0 {
        return false;
    }
    let digits = line.chars().filter(|c| c.is_ascii_digit()).count();
    digits * 10 >= total * 3
}

fn parse_blocks(prompt: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut kind = BlockKind::System;
    let mut text = String::new();

    for line in prompt.lines() {
        let starts = if line.starts_with("System:") {
            Some(BlockKind::System)
        } else if line.starts_with("User:") || line.starts_with("Assistant:") {
            Some(BlockKind::History)
        } else {
            None
        };
        match starts {
            Some(next) => {
                if !text.is_empty() {
                    blocks.push(Block { kind, text });
                }
                kind = next;
                text = line.to_string();
            }
            None => {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(line);
            }
        }
    }
    if !text.is_empty() {
        blocks.push(Block { kind, text });
    }
    blocks
}

/// Total chars once blocks are rejoined with newlines.
fn assembled_len(blocks: &[Block]) -> usize {
    let body: usize = blocks.iter().map(|b| char_len(&b.text)).sum();
    body + blocks.len().saturating_sub(1)
}

/// Stage 1: remove history blocks oldest-first, always keeping the most
/// recent exchange (the last two history turns).
fn drop_oldest_history(blocks: &mut Vec<Block>, budget: usize) {
    while assembled_len(blocks) > budget {
        let history: Vec<usize> = blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.kind == BlockKind::History)
            .map(|(i, _)| i)
            .collect();
        if history.len() <= 2 {
            break;
        }
        blocks.remove(history[0]);
    }
}

/// Stage 2: shrink prose lines in history blocks proportionally so the
/// assembled prompt meets the budget, leaving structured lines intact.
fn squeeze_prose(blocks: &mut [Block], budget: usize) {
    let total = assembled_len(blocks);
    let prose: usize = blocks
        .iter()
        .filter(|b| b.kind == BlockKind::History)
        .flat_map(|b| b.text.lines())
        .filter(|l| !is_structured_line(l))
        .map(char_len)
        .sum();
    if prose == 0 {
        return;
    }

    let fixed = total - prose;
    let keep = budget.saturating_sub(fixed);
    let ratio = keep as f64 / prose as f64;

    for block in blocks.iter_mut().filter(|b| b.kind == BlockKind::History) {
        let squeezed: Vec<String> = block
            .text
            .lines()
            .map(|line| {
                if is_structured_line(line) {
                    line.to_string()
                } else {
                    let target = (char_len(line) as f64 * ratio).floor() as usize;
                    truncate_middle(line, target)
                }
            })
            .collect();
        block.text = squeezed.join("\n");
    }
}

/// Keep the head and tail of `line`, eliding the middle, so the result
/// is at most `target` chars.
fn truncate_middle(line: &str, target: usize) -> String {
    let len = char_len(line);
    if target >= len {
        return line.to_string();
    }
    if target < 8 {
        return take_chars(line, target).to_string();
    }
    let head = target / 2;
    let tail = target - head - 1;
    format!("{}…{}", take_chars(line, head), take_last_chars(line, tail))
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn take_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn take_last_chars(s: &str, n: usize) -> &str {
    let len = char_len(s);
    if n >= len {
        return s;
    }
    match s.char_indices().nth(len - n) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}
