//! Hierarchical chunker (spec §4.1 step 4): splits extracted text at three
//! character budgets (large → medium → small), trying separators in
//! priority order and recursing into oversized pieces, then packs the
//! resulting atoms into budget-sized windows with a preserved overlap.

use crate::domain::{Chunk, ChunkLevel};
use crate::ids::content_hash_16;

const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "! ", "? ", "; ", ", ", " ", ""];

/// (content, char_start, char_end) of one atomic, unsplittable-further unit.
type Atom = (String, usize, usize);

fn split_with_sep(text: &str, start_offset: usize, sep: &str) -> Vec<Atom> {
    let mut out = Vec::new();
    let mut cursor = start_offset;
    for (i, part) in text.split(sep).enumerate() {
        if i > 0 {
            cursor += sep.chars().count();
        }
        let start = cursor;
        let end = start + part.chars().count();
        out.push((part.to_string(), start, end));
        cursor = end;
    }
    out
}

fn hard_split(text: &str, start_offset: usize, budget: usize) -> Vec<Atom> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(budget.max(1))
        .scan(start_offset, |cursor, piece| {
            let start = *cursor;
            let content: String = piece.iter().collect();
            let end = start + content.chars().count();
            *cursor = end;
            Some((content, start, end))
        })
        .collect()
}

/// Recursively splits `text` (whose first character sits at `start_offset`
/// in the original document) so every returned atom is ≤ `budget` chars,
/// trying `SEPARATORS[sep_idx..]` in order.
fn atomize(text: &str, start_offset: usize, sep_idx: usize, budget: usize) -> Vec<Atom> {
    if text.chars().count() <= budget {
        return vec![(text.to_string(), start_offset, start_offset + text.chars().count())];
    }
    if sep_idx >= SEPARATORS.len() || SEPARATORS[sep_idx].is_empty() {
        return hard_split(text, start_offset, budget);
    }

    let sep = SEPARATORS[sep_idx];
    let parts = split_with_sep(text, start_offset, sep);

    if parts.iter().all(|(p, _, _)| p.chars().count() <= budget) {
        parts
    } else {
        let mut out = Vec::new();
        for (content, start, end) in parts {
            if content.chars().count() <= budget {
                out.push((content, start, end));
            } else {
                out.extend(atomize(&content, start, sep_idx + 1, budget));
            }
        }
        out
    }
}

/// Packs atoms into windows of at most `budget` chars, carrying the last
/// `overlap` characters of each window into the start of the next one.
fn pack(atoms: Vec<Atom>, budget: usize, overlap: usize) -> Vec<Atom> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_start: Option<usize> = None;
    let mut current_end = 0usize;

    for (content, start, end) in atoms {
        let prospective_len = current.chars().count() + content.chars().count();
        if !current.is_empty() && prospective_len > budget {
            chunks.push((current.clone(), current_start.unwrap(), current_end));

            let overlap_n = overlap.min(current.chars().count());
            let tail: String = current.chars().rev().take(overlap_n).collect::<Vec<_>>().into_iter().rev().collect();
            current_start = Some(current_end.saturating_sub(overlap_n));
            current = tail;
        }
        if current_start.is_none() {
            current_start = Some(start);
        }
        current.push_str(&content);
        current_end = end;
    }

    if !current.is_empty() {
        chunks.push((current, current_start.unwrap(), current_end));
    }
    chunks
}

/// Splits `file_text` into large, then medium, then small chunks. Indices
/// are sequential across the whole file in that level order (spec §4.1
/// step 4); position ratio is ordinal-within-level / count-in-level.
pub fn chunk_hierarchical(file_id: &str, file_text: &str, budgets: [usize; 3], overlap: usize) -> Vec<Chunk> {
    let levels = [(ChunkLevel::Large, budgets[0]), (ChunkLevel::Medium, budgets[1]), (ChunkLevel::Small, budgets[2])];

    let mut chunks = Vec::new();
    let mut next_index = 0usize;

    for (level, budget) in levels {
        let atoms = atomize(file_text, 0, 0, budget);
        let windows = pack(atoms, budget, overlap);
        let total = windows.len().max(1);

        for (ordinal, (content, char_start, char_end)) in windows.into_iter().enumerate() {
            if content.trim().is_empty() {
                continue;
            }
            chunks.push(Chunk {
                file_id: file_id.to_string(),
                chunk_index: next_index,
                level,
                content_hash: content_hash_16(&content),
                word_count: Chunk::word_count_of(&content),
                position_ratio: ordinal as f64 / total as f64,
                content,
                char_start,
                char_end,
            });
            next_index += 1;
        }
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_all_three_levels() {
        let text = "Paragraph one.\n\nParagraph two is a bit longer with more words in it.\n\nParagraph three.";
        let chunks = chunk_hierarchical("f1", text, [40, 20, 10], 5);
        assert!(chunks.iter().any(|c| c.level == ChunkLevel::Large));
        assert!(chunks.iter().any(|c| c.level == ChunkLevel::Medium));
        assert!(chunks.iter().any(|c| c.level == ChunkLevel::Small));
    }

    #[test]
    fn chunk_indices_are_sequential_and_unique() {
        let text = "a ".repeat(500);
        let chunks = chunk_hierarchical("f1", &text, [100, 50, 25], 10);
        let indices: Vec<usize> = chunks.iter().map(|c| c.chunk_index).collect();
        let mut sorted = indices.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), indices.len());
        assert_eq!(indices, sorted);
    }

    #[test]
    fn position_ratio_stays_in_unit_range() {
        let text = "word ".repeat(1000);
        let chunks = chunk_hierarchical("f1", &text, [200, 100, 50], 20);
        assert!(chunks.iter().all(|c| c.position_ratio >= 0.0 && c.position_ratio <= 1.0));
    }

    #[test]
    fn small_budget_never_exceeds_by_much() {
        let text = "word ".repeat(2000);
        let chunks = chunk_hierarchical("f1", &text, [2000, 1000, 500], 200);
        for c in chunks.iter().filter(|c| c.level == ChunkLevel::Small) {
            assert!(c.content.chars().count() <= 500 + 200);
        }
    }
}
