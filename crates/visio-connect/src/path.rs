//! Path comparison for documents reported by the application.
//!
//! Visio reports `FullName` in Windows form, while callers may pass either
//! separator style and any case. Comparison is therefore done on a folded,
//! segment-collapsed string rather than on [`std::path::Path`], whose rules
//! depend on the host platform.

use std::fmt;

/// A case-folded, separator-agnostic path with `.` and `..` segments collapsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedPath(String);

impl NormalizedPath {
    pub fn new(raw: &str) -> Self {
        let unified = raw.trim().replace('\\', "/");
        let unc = unified.starts_with("//");

        let mut segments: Vec<&str> = Vec::new();
        for segment in unified.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    // Never pop a drive root such as `c:`
                    if segments.last().map_or(false, |s| !is_drive(s)) {
                        segments.pop();
                    }
                }
                s => segments.push(s),
            }
        }

        let joined = segments.join("/");
        let prefix = if unc {
            "//"
        } else if unified.starts_with('/') {
            "/"
        } else {
            ""
        };
        NormalizedPath(format!("{prefix}{joined}").to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last segment, e.g. `a.vsdx` for `c:/docs/a.vsdx`.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_drive(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// ASCII case-insensitive suffix check.
pub(crate) fn ends_with_ignore_case(name: &str, suffix: &str) -> bool {
    name.len() >= suffix.len()
        && name.as_bytes()[name.len() - suffix.len()..].eq_ignore_ascii_case(suffix.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn case_and_separators_are_ignored() {
        assert_eq!(
            NormalizedPath::new(r"C:\Docs\A.vsdx"),
            NormalizedPath::new("c:/docs/a.vsdx")
        );
    }

    #[test]
    fn dot_segments_collapse() {
        assert_eq!(
            NormalizedPath::new(r"C:\Docs\.\drafts\..\Plan.VSDX").as_str(),
            "c:/docs/plan.vsdx"
        );
        assert_eq!(NormalizedPath::new(r"C:\..\x.vsdx").as_str(), "c:/x.vsdx");
    }

    #[test]
    fn repeated_separators_collapse() {
        assert_eq!(
            NormalizedPath::new("c://docs///a.vsdx"),
            NormalizedPath::new(r"C:\docs\a.vsdx")
        );
    }

    #[test]
    fn unc_and_rooted_prefixes_survive() {
        assert_eq!(
            NormalizedPath::new(r"\\Server\Share\x.vsdx").as_str(),
            "//server/share/x.vsdx"
        );
        assert_eq!(NormalizedPath::new("/home/u/x.vsdx").as_str(), "/home/u/x.vsdx");
    }

    #[test]
    fn file_name_is_last_segment() {
        assert_eq!(NormalizedPath::new(r"Z:\tmp\Org Chart.vsdx").file_name(), "org chart.vsdx");
        assert_eq!(NormalizedPath::new("Drawing1").file_name(), "drawing1");
    }

    #[test]
    fn suffix_check_ignores_case() {
        assert!(ends_with_ignore_case("C:\\A.VSDX", ".vsdx"));
        assert!(!ends_with_ignore_case("vsdx", ".vsdx"));
    }
}
