//! Comparison of generated files against reference files.
//!
//! Generated decks carry a few lines that legitimately vary between runs or
//! machines (writer banners, absolute file names in mesher scripts). Each
//! file format gets a [`VariancePolicy`] naming the lines to skip; everything
//! else must match after line ending normalization.

use std::fs;
use std::io;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariancePolicy {
    /// Only line endings are normalized
    Exact,
    /// CalculiX decks: writer banner and file name comments
    CalculixInput,
    /// Gmsh scripts: comments and merge/save paths
    GmshGeo,
}

impl VariancePolicy {
    pub fn for_path(path: impl AsRef<Path>) -> Self {
        match path.as_ref().extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("inp") => VariancePolicy::CalculixInput,
            Some(ext) if ext.eq_ignore_ascii_case("geo") => VariancePolicy::GmshGeo,
            _ => VariancePolicy::Exact,
        }
    }

    pub fn ignores(&self, line: &str) -> bool {
        match self {
            VariancePolicy::Exact => false,
            VariancePolicy::CalculixInput => ["**   written", "** written", "**   file name"]
                .iter()
                .any(|prefix| line.starts_with(prefix)),
            VariancePolicy::GmshGeo => ["Merge \"", "Save \"", "// "]
                .iter()
                .any(|prefix| line.starts_with(prefix)),
        }
    }

    fn significant_lines<'a>(&self, text: &'a str) -> Vec<&'a str> {
        text.lines()
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .filter(|line| !self.ignores(line))
            .collect()
    }
}

/// `None` when both texts agree under `policy`, a line diff otherwise.
pub fn compare_text(expected: &str, actual: &str, policy: VariancePolicy) -> Option<String> {
    let expected = policy.significant_lines(expected);
    let actual = policy.significant_lines(actual);
    diff_lines(&expected, &actual)
}

pub fn compare_files(
    expected: impl AsRef<Path>,
    actual: impl AsRef<Path>,
    policy: VariancePolicy,
) -> io::Result<Option<String>> {
    let expected_text = fs::read_to_string(expected.as_ref())?;
    let actual_text = fs::read_to_string(actual.as_ref())?;
    Ok(compare_text(&expected_text, &actual_text, policy).map(|diff| {
        format!(
            "--- {}\n+++ {}\n{diff}",
            expected.as_ref().display(),
            actual.as_ref().display()
        )
    }))
}

/// Compare the regular files of two directories, each with the policy its
/// name selects. Differing file sets are reported before any content.
pub fn compare_trees(expected_dir: impl AsRef<Path>, actual_dir: impl AsRef<Path>) -> io::Result<Option<String>> {
    let expected_dir = expected_dir.as_ref();
    let actual_dir = actual_dir.as_ref();
    let expected_files = file_names(expected_dir)?;
    let actual_files = file_names(actual_dir)?;

    if expected_files != actual_files {
        let missing: Vec<_> = expected_files.iter().filter(|f| !actual_files.contains(f)).collect();
        let extra: Vec<_> = actual_files.iter().filter(|f| !expected_files.contains(f)).collect();
        return Ok(Some(format!("file sets differ: missing {missing:?}, unexpected {extra:?}\n")));
    }

    let mut report = String::new();
    for name in &expected_files {
        let policy = VariancePolicy::for_path(name);
        if let Some(diff) = compare_files(expected_dir.join(name), actual_dir.join(name), policy)? {
            report.push_str(&diff);
        }
    }
    Ok((!report.is_empty()).then_some(report))
}

fn file_names(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Largest LCS table `diff_lines` builds (entries of `u32`, 16 MiB).
const MAX_TABLE_CELLS: usize = 4 << 20;

/// Differing line pairs shown when the changed region is too large for an
/// LCS table.
const MAX_LISTED_LINES: usize = 50;

/// Line diff built from a longest common subsequence. Shared head and tail
/// lines are trimmed first so large identical decks stay cheap. When the
/// changed region is still too large for the table, lines are compared by
/// position and only the first differing pairs are listed with a count.
pub fn diff_lines(expected: &[&str], actual: &[&str]) -> Option<String> {
    if expected == actual {
        return None;
    }
    let head = expected
        .iter()
        .zip(actual)
        .take_while(|(a, b)| a == b)
        .count();
    let tail = expected[head..]
        .iter()
        .rev()
        .zip(actual[head..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let old = &expected[head..expected.len() - tail];
    let new = &actual[head..actual.len() - tail];

    if (old.len() + 1).saturating_mul(new.len() + 1) > MAX_TABLE_CELLS {
        return Some(positional_diff(head, old, new));
    }

    let mut lcs = vec![vec![0u32; new.len() + 1]; old.len() + 1];
    for i in (0..old.len()).rev() {
        for j in (0..new.len()).rev() {
            lcs[i][j] = if old[i] == new[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut out = format!("@@ line {} @@\n", head + 1);
    let (mut i, mut j) = (0, 0);
    while i < old.len() || j < new.len() {
        if i < old.len() && j < new.len() && old[i] == new[j] {
            out.push_str(&format!(" {}\n", old[i]));
            i += 1;
            j += 1;
        } else if i < old.len() && (j == new.len() || lcs[i + 1][j] >= lcs[i][j + 1]) {
            out.push_str(&format!("-{}\n", old[i]));
            i += 1;
        } else {
            out.push_str(&format!("+{}\n", new[j]));
            j += 1;
        }
    }
    Some(out)
}

fn positional_diff(head: usize, old: &[&str], new: &[&str]) -> String {
    let len = old.len().max(new.len());
    let differing: Vec<usize> = (0..len).filter(|&k| old.get(k) != new.get(k)).collect();
    let mut out = format!(
        "@@ line {} @@ {} of {} lines differ (compared by position)\n",
        head + 1,
        differing.len(),
        len
    );
    for &k in differing.iter().take(MAX_LISTED_LINES) {
        out.push_str(&format!("@ line {}\n", head + k + 1));
        if let Some(line) = old.get(k) {
            out.push_str(&format!("-{line}\n"));
        }
        if let Some(line) = new.get(k) {
            out.push_str(&format!("+{line}\n"));
        }
    }
    if differing.len() > MAX_LISTED_LINES {
        out.push_str(&format!("... {} more differing lines\n", differing.len() - MAX_LISTED_LINES));
    }
    out
}
