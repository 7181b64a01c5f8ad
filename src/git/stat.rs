//! Fixed-width `+`/`-` histograms for per-file change counts.

/// Soft line length limit for a rendered stat line.
pub const LINE_BUDGET: usize = 72;

const PAD: usize = 1;
const SEPARATOR: usize = 1;
const NEWLINE: usize = 1;

/// Change counts for a single file, as fed to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat<'a> {
    pub name: &'a str,
    pub additions: usize,
    pub deletions: usize,
}

impl FileStat<'_> {
    pub fn total(&self) -> usize {
        self.additions + self.deletions
    }
}

/// Room left for the bar once the text around it is accounted for.
///
/// The layout is `<pad><name><pad>|<pad><number><pad><bar><newline>`, with the
/// number's width left out of the budget. Never below one column.
pub fn histogram_height(longest_name: usize) -> usize {
    let left = PAD + longest_name + PAD;
    let right = PAD + PAD + NEWLINE;
    LINE_BUDGET.saturating_sub(left + SEPARATOR + right).max(1)
}

/// Divisor applied to every count so the longest bar fits in `height`.
pub fn scale_factor(longest_change: usize, height: usize) -> f64 {
    if longest_change > height {
        longest_change as f64 / height as f64
    } else {
        1.0
    }
}

fn bar(count: usize, scale: f64, glyph: char) -> String {
    let len = (count as f64 / scale).floor() as usize;
    std::iter::repeat_n(glyph, len).collect()
}

/// One `<total> <+++><--->` fragment per file, all sharing one scale.
fn render_fragments(stats: &[FileStat<'_>]) -> Vec<String> {
    let (longest_name, longest_change) = stats.iter().fold((0, 0), |(name, change), stat| {
        (name.max(stat.name.chars().count()), change.max(stat.total()))
    });
    let scale = scale_factor(longest_change, histogram_height(longest_name));

    stats
        .iter()
        .map(|stat| {
            format!(
                "{} {}{}",
                stat.total(),
                bar(stat.additions, scale, '+'),
                bar(stat.deletions, scale, '-')
            )
        })
        .collect()
}

/// Render the whole batch, one newline-terminated fragment per file.
///
/// Fragments never contain a newline themselves, so line `n` of the output
/// belongs to `stats[n]`.
pub fn render(stats: &[FileStat<'_>]) -> String {
    render_fragments(stats)
        .into_iter()
        .fold(String::new(), |mut out, fragment| {
            out.push_str(&fragment);
            out.push('\n');
            out
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(name: &str, additions: usize, deletions: usize) -> FileStat<'_> {
        FileStat {
            name,
            additions,
            deletions,
        }
    }

    #[test]
    fn small_changes_are_not_scaled() {
        let out = render(&[stat("README.md", 3, 2), stat("src/lib.rs", 1, 0)]);
        assert_eq!(out, "5 +++--\n1 +\n");
    }

    #[test]
    fn scale_is_exactly_one_up_to_the_height() {
        let height = histogram_height(10);
        assert_eq!(height, 56);
        assert_eq!(scale_factor(height, height), 1.0);
        assert_eq!(scale_factor(0, height), 1.0);
        assert!(scale_factor(height + 1, height) > 1.0);
    }

    #[test]
    fn large_changes_are_scaled_by_flooring() {
        let fragments = render_fragments(&[stat("src/main.rs", 75, 37), stat("a.rs", 3, 1)]);
        assert_eq!(histogram_height("src/main.rs".len()), 55);
        let scale = scale_factor(112, 55);
        let plus = (75.0 / scale).floor() as usize;
        let minus = (37.0 / scale).floor() as usize;
        assert_eq!(
            fragments[0],
            format!("112 {}{}", "+".repeat(plus), "-".repeat(minus))
        );
        assert_eq!(fragments[1], "4 +");
    }

    #[test]
    fn lines_never_exceed_the_budget() {
        let cases = [
            (1_000_000, 2_000_000),
            (usize::from(u16::MAX), 0),
            (0, 999_999),
            (71, 71),
        ];
        for (additions, deletions) in cases {
            let stats = [stat("src/git/hist.rs", additions, deletions), stat("b", 1, 1)];
            for line in render(&stats).lines() {
                assert!(line.len() <= LINE_BUDGET, "{} is too long", line);
            }
        }
    }

    #[test]
    fn long_names_still_leave_one_column() {
        let name = "x".repeat(200);
        assert_eq!(histogram_height(name.len()), 1);
        let fragments = render_fragments(&[stat(&name, 0, 10)]);
        assert_eq!(fragments[0], "10 -");
    }

    #[test]
    fn names_are_measured_in_characters() {
        let name = "é".repeat(30);
        assert_eq!(histogram_height(30), 36);
        let fragments = render_fragments(&[stat(&name, 36, 0)]);
        assert_eq!(fragments[0], format!("36 {}", "+".repeat(36)));
    }

    #[test]
    fn empty_batch_renders_nothing() {
        assert_eq!(render(&[]), "");
    }
}
