use crate::{RunStyle, StyledFragment, Suggestion};

/// Rebuild a unit's content as styled fragments: the original text verbatim,
/// except every matched suggestion span is bracketed and followed by the
/// parenthesized replacement in red.
///
/// Suggestions are applied in provider order with a forward-only cursor:
/// each search starts at the cursor, a miss is silently skipped, and a hit
/// advances the cursor past the matched span. Overlapping suggestions
/// therefore resolve as first-matched-wins. Positions are character indices
/// so they line up with the snapshot table.
pub fn annotate(
    text: &str,
    table: &[RunStyle],
    suggestions: &[Suggestion],
) -> Vec<StyledFragment> {
    let chars: Vec<char> = text.chars().collect();
    let mut fragments = Vec::new();
    let mut current_pos = 0usize;

    for suggestion in suggestions {
        let original: Vec<char> = suggestion.original.chars().collect();
        if original.is_empty() {
            continue;
        }
        let pos = match find_from(&chars, &original, current_pos) {
            Some(pos) => pos,
            // 原文未命中则跳过该条建议
            None => continue,
        };

        emit_span(&mut fragments, &chars, table, current_pos, pos);

        let first = pos;
        let last = pos + original.len() - 1;

        fragments.push(StyledFragment {
            text: "[".to_string(),
            style: table.get(first).cloned(),
        });
        emit_span(&mut fragments, &chars, table, pos, pos + original.len());
        fragments.push(StyledFragment {
            text: "]".to_string(),
            style: table.get(last).cloned(),
        });
        fragments.push(StyledFragment {
            text: format!("({})", suggestion.replacement),
            style: Some(
                table
                    .get(last)
                    .map(|style| style.with_red_color())
                    .unwrap_or_else(|| RunStyle::default().with_red_color()),
            ),
        });

        current_pos = pos + original.len();
    }

    emit_span(&mut fragments, &chars, table, current_pos, chars.len());
    fragments
}

/// Emit `[from, to)` one character per fragment, each with the style looked
/// up at its own index.
fn emit_span(
    fragments: &mut Vec<StyledFragment>,
    chars: &[char],
    table: &[RunStyle],
    from: usize,
    to: usize,
) {
    for i in from..to {
        fragments.push(StyledFragment {
            text: chars[i].to_string(),
            style: table.get(i).cloned(),
        });
    }
}

/// First occurrence of `needle` in `haystack` at or after `from`, by
/// character index.
fn find_from(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.len() > haystack.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&i| haystack[i..i + needle.len()] == *needle)
}
