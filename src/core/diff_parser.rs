use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_MIN_CHANGES: usize = 5;
pub const DEFAULT_CONTEXT_LINES: usize = 3;

const FILE_MARKER: &str = "diff --git";

/// One file touched by a diff.
///
/// `additions` and `deletions` always equal the number of added and removed
/// lines across `hunks`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub old_path: String,
    pub new_path: String,
    pub hunks: Vec<DiffHunk>,
    pub additions: usize,
    pub deletions: usize,
}

impl FileChange {
    fn new(old_path: String, new_path: String) -> Self {
        Self {
            old_path,
            new_path,
            ..Self::default()
        }
    }

    /// The path a reviewer cares about: the new path, or the old one for
    /// deleted files.
    pub fn display_path(&self) -> &str {
        if self.new_path.is_empty() {
            &self.old_path
        } else {
            &self.new_path
        }
    }

    pub fn total_changes(&self) -> usize {
        self.additions + self.deletions
    }
}

/// Numbers from a `@@ -a,b +c,d @@` header. All fields are `None` when the
/// header could not be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HunkInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_start: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_start: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_count: Option<usize>,
}

impl HunkInfo {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffHunk {
    pub info: HunkInfo,
    pub lines: Vec<DiffLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    pub change_type: ChangeType,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    #[serde(rename = "addition")]
    Added,
    #[serde(rename = "deletion")]
    Removed,
    Context,
}

impl ChangeType {
    pub fn is_change(self) -> bool {
        matches!(self, ChangeType::Added | ChangeType::Removed)
    }
}

/// Lines surrounding the changes of one hunk, as produced by
/// [`DiffParser::extract_context_lines`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HunkContext {
    pub hunk_info: HunkInfo,
    pub relevant_lines: Vec<DiffLine>,
}

pub struct DiffParser;

impl DiffParser {
    /// Parses `git diff` text into per-file change records.
    ///
    /// Never fails: unreadable headers and stray lines are dropped and the
    /// rest of the input is still parsed.
    pub fn parse_unified_diff(diff_content: &str) -> Vec<FileChange> {
        let mut files = Vec::new();
        let mut current: Option<FileChange> = None;
        // Times the current file has been flushed by a file marker.
        let mut flushes = 0;

        for line in diff_content.split('\n') {
            if line.starts_with(FILE_MARKER) {
                if current.is_some() {
                    flushes += 1;
                }
                // A marker without two paths still flushes the current file
                // but leaves it open, so it is recorded once per flush and the
                // lines that follow are attributed to it.
                if let Some((old_path, new_path)) = Self::parse_file_marker(line) {
                    if let Some(done) = current.take() {
                        record_file(&mut files, done, flushes);
                    }
                    flushes = 0;
                    current = Some(FileChange::new(old_path, new_path));
                }
            } else if line.starts_with("+++") || line.starts_with("---") {
                continue;
            } else if line.starts_with("@@") {
                if let Some(file) = current.as_mut() {
                    file.hunks.push(DiffHunk {
                        info: Self::parse_hunk_header(line),
                        lines: Vec::new(),
                    });
                }
            } else if let Some(file) = current.as_mut() {
                Self::push_body_line(file, line);
            }
        }

        if let Some(done) = current {
            record_file(&mut files, done, flushes + 1);
        }

        files
    }

    fn push_body_line(file: &mut FileChange, line: &str) {
        let Some(hunk) = file.hunks.last_mut() else {
            return;
        };

        let (change_type, content) = if let Some(rest) = line.strip_prefix('+') {
            file.additions += 1;
            (ChangeType::Added, rest)
        } else if let Some(rest) = line.strip_prefix('-') {
            file.deletions += 1;
            (ChangeType::Removed, rest)
        } else if let Some(rest) = line.strip_prefix(' ') {
            (ChangeType::Context, rest)
        } else {
            return;
        };

        hunk.lines.push(DiffLine {
            change_type,
            content: content.to_string(),
        });
    }

    /// Splits `diff --git a/<old> b/<new>`. The old path runs up to the last
    /// ` b/`, so paths containing spaces survive.
    fn parse_file_marker(line: &str) -> Option<(String, String)> {
        let rest = line.strip_prefix("diff --git a/")?;
        let split = rest.rfind(" b/")?;
        let old_path = &rest[..split];
        let new_path = &rest[split + " b/".len()..];
        Some((old_path.to_string(), new_path.to_string()))
    }

    /// Reads `@@ -a[,b] +c[,d] @@`. Omitted counts default to 1.
    fn parse_hunk_header(line: &str) -> HunkInfo {
        line.match_indices("@@ -")
            .find_map(|(idx, _)| Self::parse_hunk_ranges(&line[idx + "@@ -".len()..]))
            .unwrap_or_default()
    }

    fn parse_hunk_ranges(input: &str) -> Option<HunkInfo> {
        let (old_start, old_count, rest) = Self::parse_range(input)?;
        let rest = rest.strip_prefix(" +")?;
        let (new_start, new_count, rest) = Self::parse_range(rest)?;
        if !rest.starts_with(" @@") {
            return None;
        }

        Some(HunkInfo {
            old_start: Some(old_start),
            old_count: Some(old_count.unwrap_or(1)),
            new_start: Some(new_start),
            new_count: Some(new_count.unwrap_or(1)),
        })
    }

    /// `start[,count]`, returning the unconsumed remainder. An empty count
    /// after the comma reads as absent.
    fn parse_range(input: &str) -> Option<(usize, Option<usize>, &str)> {
        let (start, rest) = take_digits(input);
        let start = start.parse().ok()?;
        let rest = rest.strip_prefix(',').unwrap_or(rest);
        let (count, rest) = take_digits(rest);
        let count = if count.is_empty() {
            None
        } else {
            Some(count.parse().ok()?)
        };
        Some((start, count, rest))
    }

    /// Lower-cased text after the last `.` of each file's path.
    pub fn file_extensions(files: &[FileChange]) -> BTreeSet<String> {
        files
            .iter()
            .filter_map(|file| {
                let path = file.display_path();
                path.rfind('.')
                    .map(|idx| path[idx + 1..].to_lowercase())
            })
            .collect()
    }

    /// `(additions, deletions)` summed over all files.
    pub fn total_changes(files: &[FileChange]) -> (usize, usize) {
        files.iter().fold((0, 0), |(adds, dels), file| {
            (adds + file.additions, dels + file.deletions)
        })
    }

    /// Files with at least `min_changes` added plus removed lines, in input
    /// order.
    pub fn filter_significant_changes(files: &[FileChange], min_changes: usize) -> Vec<&FileChange> {
        files
            .iter()
            .filter(|file| file.total_changes() >= min_changes)
            .collect()
    }

    /// Collects a window of `context_lines` lines on each side of every added
    /// or removed line, per hunk.
    ///
    /// Windows of neighbouring changes overlap and the overlapping lines are
    /// repeated, which weights dense change regions more heavily. Hunks
    /// without changes are left out. Every file gets an entry, keyed by its
    /// display path.
    pub fn extract_context_lines(
        files: &[FileChange],
        context_lines: usize,
    ) -> BTreeMap<String, Vec<HunkContext>> {
        let mut context = BTreeMap::new();

        for file in files {
            let mut hunk_contexts = Vec::new();

            for hunk in &file.hunks {
                let lines = &hunk.lines;
                let mut relevant_lines = Vec::new();

                for (i, line) in lines.iter().enumerate() {
                    if !line.change_type.is_change() {
                        continue;
                    }
                    let start = i.saturating_sub(context_lines);
                    let end = lines.len().min(i.saturating_add(context_lines).saturating_add(1));
                    relevant_lines.extend_from_slice(&lines[start..end]);
                }

                if !relevant_lines.is_empty() {
                    hunk_contexts.push(HunkContext {
                        hunk_info: hunk.info,
                        relevant_lines,
                    });
                }
            }

            context.insert(file.display_path().to_string(), hunk_contexts);
        }

        context
    }
}

/// Every copy holds the file's final state.
fn record_file(files: &mut Vec<FileChange>, file: FileChange, times: usize) {
    for _ in 1..times {
        files.push(file.clone());
    }
    files.push(file);
}

fn take_digits(input: &str) -> (&str, &str) {
    let end = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    input.split_at(end)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = "\
diff --git a/x.py b/x.py
--- a/x.py
+++ b/x.py
@@ -1,2 +1,3 @@
 context
-old line
+new line
+added line";

    fn line(change_type: ChangeType, content: &str) -> DiffLine {
        DiffLine {
            change_type,
            content: content.to_string(),
        }
    }

    fn file_with_counts(path: &str, additions: usize, deletions: usize) -> FileChange {
        FileChange {
            old_path: path.to_string(),
            new_path: path.to_string(),
            hunks: Vec::new(),
            additions,
            deletions,
        }
    }

    #[test]
    fn parses_single_file_scenario() {
        let files = DiffParser::parse_unified_diff(SCENARIO);
        assert_eq!(files.len(), 1);

        let file = &files[0];
        assert_eq!(file.old_path, "x.py");
        assert_eq!(file.new_path, "x.py");
        assert_eq!(file.additions, 2);
        assert_eq!(file.deletions, 1);
        assert_eq!(file.hunks.len(), 1);

        let hunk = &file.hunks[0];
        assert_eq!(
            hunk.info,
            HunkInfo {
                old_start: Some(1),
                old_count: Some(2),
                new_start: Some(1),
                new_count: Some(3),
            }
        );
        assert_eq!(
            hunk.lines,
            vec![
                line(ChangeType::Context, "context"),
                line(ChangeType::Removed, "old line"),
                line(ChangeType::Added, "new line"),
                line(ChangeType::Added, "added line"),
            ]
        );
    }

    #[test]
    fn empty_input_yields_no_files() {
        assert!(DiffParser::parse_unified_diff("").is_empty());
        assert_eq!(DiffParser::total_changes(&[]), (0, 0));
    }

    #[test]
    fn counts_match_marked_lines_across_files() {
        let diff = "\
diff --git a/src/lib.rs b/src/lib.rs
index 1111111..2222222 100644
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -10,4 +10,5 @@ impl Foo {
 fn a() {}
-fn b() {}
+fn b() -> u8 { 0 }
+fn c() {}
 fn d() {}
@@ -40 +41,2 @@
-x
+y
+z
diff --git a/README.md b/README.md
--- a/README.md
+++ b/README.md
@@ -1,3 +1,2 @@
 # Title
-old
-older
+new
";
        let files = DiffParser::parse_unified_diff(diff);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].hunks.len(), 2);
        assert_eq!(DiffParser::total_changes(&files), (5, 4));

        let second = files[0].hunks[1].info;
        assert_eq!(second.old_start, Some(40));
        assert_eq!(second.old_count, Some(1));
        assert_eq!(second.new_start, Some(41));
        assert_eq!(second.new_count, Some(2));
    }

    #[test]
    fn parsing_is_idempotent() {
        let first = DiffParser::parse_unified_diff(SCENARIO);
        let second = DiffParser::parse_unified_diff(SCENARIO);
        assert_eq!(first, second);
    }

    #[test]
    fn malformed_hunk_header_keeps_empty_info() {
        let diff = "\
diff --git a/a.txt b/a.txt
@@ garbage @@
+kept
";
        let files = DiffParser::parse_unified_diff(diff);
        assert_eq!(files.len(), 1);
        assert!(files[0].hunks[0].info.is_empty());
        assert_eq!(files[0].additions, 1);
    }

    #[test]
    fn hunk_header_with_empty_count_defaults_to_one() {
        let info = DiffParser::parse_hunk_header("@@ -3, +7 @@ fn main()");
        assert_eq!(info.old_start, Some(3));
        assert_eq!(info.old_count, Some(1));
        assert_eq!(info.new_start, Some(7));
        assert_eq!(info.new_count, Some(1));
    }

    #[test]
    fn hunk_header_with_zero_count_is_kept() {
        let info = DiffParser::parse_hunk_header("@@ -0,0 +1,4 @@");
        assert_eq!(info.old_start, Some(0));
        assert_eq!(info.old_count, Some(0));
        assert_eq!(info.new_count, Some(4));
    }

    #[test]
    fn lines_before_any_hunk_or_file_are_dropped() {
        let diff = "\
+orphan before file
diff --git a/a.txt b/a.txt
+orphan before hunk
@@ -1 +1 @@
+counted
";
        let files = DiffParser::parse_unified_diff(diff);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].additions, 1);
        assert_eq!(files[0].hunks[0].lines.len(), 1);
    }

    #[test]
    fn path_headers_are_never_body_lines() {
        let diff = "\
diff --git a/a.txt b/a.txt
@@ -1,2 +1,2 @@
---- removed dashes
++++ added plus
";
        let files = DiffParser::parse_unified_diff(diff);
        assert_eq!(files[0].additions, 0);
        assert_eq!(files[0].deletions, 0);
    }

    #[test]
    fn unmarked_lines_inside_hunk_are_dropped() {
        let diff = "\
diff --git a/a.txt b/a.txt
@@ -1,2 +1,2 @@
 ctx

\\ No newline at end of file
+new
";
        let files = DiffParser::parse_unified_diff(diff);
        let lines = &files[0].hunks[0].lines;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], line(ChangeType::Added, "new"));
    }

    #[test]
    fn malformed_file_marker_keeps_previous_file_open() {
        // Known quirk: a `diff --git` line without `a/` and `b/` paths flushes
        // the current file without starting a new one. The file is recorded
        // twice and the following hunk lands in both copies.
        let diff = "\
diff --git a/first.rs b/first.rs
@@ -1 +1 @@
+one
diff --git first.rs second.rs
@@ -5 +5 @@
+two
";
        let files = DiffParser::parse_unified_diff(diff);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0], files[1]);
        assert_eq!(files[0].new_path, "first.rs");
        assert_eq!(files[0].hunks.len(), 2);
        assert_eq!(files[0].additions, 2);
        assert_eq!(DiffParser::total_changes(&files), (4, 0));
    }

    #[test]
    fn malformed_file_marker_repeats_are_counted_before_next_file() {
        let diff = "\
diff --git a/first.rs b/first.rs
@@ -1 +1 @@
+one
diff --git broken
diff --git also broken
diff --git a/second.rs b/second.rs
@@ -1 +1 @@
-gone
";
        let files = DiffParser::parse_unified_diff(diff);
        let paths: Vec<&str> = files.iter().map(|file| file.display_path()).collect();
        assert_eq!(paths, vec!["first.rs", "first.rs", "first.rs", "second.rs"]);
        assert_eq!(files[3].deletions, 1);
    }

    #[test]
    fn malformed_file_marker_without_previous_file_drops_body() {
        let diff = "\
diff --git nothing-here
@@ -1 +1 @@
+lost
";
        assert!(DiffParser::parse_unified_diff(diff).is_empty());
    }

    #[test]
    fn file_marker_with_spaces_in_paths() {
        let diff = "diff --git a/my dir/a b.txt b/my dir/a b.txt\n";
        let files = DiffParser::parse_unified_diff(diff);
        assert_eq!(files[0].old_path, "my dir/a b.txt");
        assert_eq!(files[0].new_path, "my dir/a b.txt");
    }

    #[test]
    fn extensions_are_folded_and_deduplicated() {
        let files = vec![
            file_with_counts("a/foo.py", 0, 0),
            file_with_counts("b/bar.PY", 0, 0),
            file_with_counts("c/noext", 0, 0),
        ];
        let extensions = DiffParser::file_extensions(&files);
        assert_eq!(extensions, BTreeSet::from(["py".to_string()]));
    }

    #[test]
    fn extensions_fall_back_to_old_path() {
        let mut deleted = file_with_counts("gone.Go", 0, 3);
        deleted.new_path.clear();
        let extensions = DiffParser::file_extensions(&[deleted]);
        assert!(extensions.contains("go"));
    }

    #[test]
    fn significant_filter_boundary() {
        let files = vec![
            file_with_counts("exact.rs", 3, 2),
            file_with_counts("below.rs", 2, 2),
            file_with_counts("above.rs", 10, 0),
        ];
        let kept: Vec<&str> = DiffParser::filter_significant_changes(&files, 5)
            .into_iter()
            .map(|f| f.display_path())
            .collect();
        assert_eq!(kept, vec!["exact.rs", "above.rs"]);
    }

    #[test]
    fn context_windows_overlap_without_dedup() {
        let files = DiffParser::parse_unified_diff(SCENARIO);
        let context = DiffParser::extract_context_lines(&files, 1);

        let hunks = &context["x.py"];
        assert_eq!(hunks.len(), 1);
        // Changes at 1, 2, 3 with radius 1: [0..3) + [1..4) + [2..4).
        assert_eq!(hunks[0].relevant_lines.len(), 3 + 3 + 2);
        assert_eq!(hunks[0].hunk_info.new_count, Some(3));
    }

    #[test]
    fn context_skips_hunks_without_changes() {
        let diff = "\
diff --git a/a.txt b/a.txt
@@ -1,2 +1,2 @@
 same
 same again
";
        let files = DiffParser::parse_unified_diff(diff);
        let context = DiffParser::extract_context_lines(&files, DEFAULT_CONTEXT_LINES);
        assert!(context["a.txt"].is_empty());
    }

    #[test]
    fn change_type_serializes_with_review_names() {
        let json = serde_json::to_string(&line(ChangeType::Removed, "x")).unwrap();
        assert_eq!(json, r#"{"change_type":"deletion","content":"x"}"#);
    }
}
