//! Cleanup applied to every OCR and text-layer result before scoring.

use std::sync::LazyLock;

use regex::Regex;

static RE_NOISE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[_\-=─━═│┃┄┅┈┉]{3,}\s*$").unwrap());
static RE_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {2,}").unwrap());
static RE_BLANK_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Normalizes extracted text. Idempotent.
pub fn normalize(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n").replace('\t', " ");

    let kept: Vec<String> = unified
        .split('\n')
        .filter(|line| !RE_NOISE_LINE.is_match(line))
        .map(|line| RE_SPACES.replace_all(line, " ").trim_end().to_string())
        .collect();

    let joined = kept.join("\n");
    let collapsed = RE_BLANK_RUN.replace_all(&joined, "\n\n");

    fix_zero_for_o(&collapsed).trim().to_string()
}

/// Replaces `0` with `O` when it sits between two uppercase ASCII letters,
/// the common misread in merchant banners such as `C0STCO`.
fn fix_zero_for_o(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    chars
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let boxed_by_caps = c == '0'
                && i > 0
                && chars[i - 1].is_ascii_uppercase()
                && chars.get(i + 1).is_some_and(|n| n.is_ascii_uppercase());
            if boxed_by_caps {
                'O'
            } else {
                c
            }
        })
        .collect()
}
