use crate::{Run, RunStyle};

/// Build the per-character style table for one text unit: one entry per
/// character of each run's text, in run order. No merging, no normalization.
///
/// The table length equals the number of characters covered by runs. A unit
/// whose text is longer than its runs (slide shapes contribute `\n`
/// paragraph separators that belong to no run) yields a shorter table;
/// positions past the end resolve to no format.
pub fn snapshot(runs: &[Run]) -> Vec<RunStyle> {
    let mut table = Vec::new();
    for run in runs {
        for _ in run.text.chars() {
            table.push(run.style.clone());
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str, bold: Option<bool>) -> Run {
        Run {
            text: text.to_string(),
            style: RunStyle { bold, ..RunStyle::default() },
        }
    }

    #[test]
    fn one_entry_per_character_in_run_order() {
        let runs = vec![run("ab", Some(true)), run("c", None)];
        let table = snapshot(&runs);
        assert_eq!(table.len(), 3);
        assert_eq!(table[0].bold, Some(true));
        assert_eq!(table[1].bold, Some(true));
        assert_eq!(table[2].bold, None);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let runs = vec![run("错别字", Some(false))];
        let table = snapshot(&runs);
        assert_eq!(table.len(), 3);
        assert!(table.iter().all(|s| s.bold == Some(false)));
    }

    #[test]
    fn empty_run_contributes_nothing() {
        let runs = vec![run("", Some(true)), run("x", None)];
        assert_eq!(snapshot(&runs).len(), 1);
    }

    #[test]
    fn table_covers_every_run_character() {
        let runs = vec![run("第一", Some(true)), run(" and ", None), run("第二", Some(false))];
        let text: String = runs.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(snapshot(&runs).len(), text.chars().count());
    }
}
