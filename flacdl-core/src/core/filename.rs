use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

use crate::models::settings::OperatingSystem;

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const WINDOWS_FORBIDDEN: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Makes one path segment safe for `os`. May return an empty string.
pub fn sanitize_segment(name: &str, os: OperatingSystem) -> String {
    let name: String = name.nfc().filter(|c| !c.is_control()).collect();
    let name = WS_RE.replace_all(name.trim(), " ");

    let name = match os {
        OperatingSystem::Windows => name
            .replace(WINDOWS_FORBIDDEN, "_")
            .trim_end_matches(['.', ' '])
            .to_string(),
        OperatingSystem::Posix => name.replace('/', "_"),
    };

    // Relative path components would step out of the target directory.
    if name == "." || name == ".." {
        return "_".to_string();
    }
    name
}

/// Joins `parts` onto `base` with the separator of `os`, dropping empty parts.
pub fn join_path(os: OperatingSystem, base: &str, parts: &[String]) -> String {
    let sep = os.separator();
    let mut out = base.trim_end_matches(['/', '\\']).to_string();
    let rooted = out.is_empty() && base.starts_with(['/', '\\']);
    for part in parts {
        let part = part.trim_matches(['/', '\\']);
        if part.is_empty() {
            continue;
        }
        if !out.is_empty() || rooted {
            out.push(sep);
        }
        out.push_str(part);
    }
    if out.is_empty() && rooted {
        out.push(sep);
    }
    out
}
