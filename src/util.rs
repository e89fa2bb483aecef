//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values in a
/// single pass: inserted values are never scanned for further placeholders,
/// and unknown `{...}` sequences (JSON examples) are copied as-is.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = String::with_capacity(tpl.len());
  let mut rest = tpl;
  while let Some(pos) = rest.find('{') {
    out.push_str(&rest[..pos]);
    let tail = &rest[pos..];
    let hit = pairs
      .iter()
      .find(|(k, _)| tail[1..].starts_with(k) && tail[1 + k.len()..].starts_with('}'));
    match hit {
      Some((k, v)) => {
        out.push_str(v);
        rest = &tail[k.len() + 2..];
      }
      None => {
        out.push('{');
        rest = &tail[1..];
      }
    }
  }
  out.push_str(rest);
  out
}

/// List-bullet glyphs that graders treat as formatting tricks.
const BULLET_GLYPHS: &[char] = &[
  '•', '◦', '‣', '⁃', '∙', '▪', '▫', '●', '○', '■', '□', '◆', '◇', '►', '▶', '▸', '➢', '➤',
];

/// True if the char is a list bullet glyph.
pub fn is_bullet_glyph(ch: char) -> bool {
  BULLET_GLYPHS.contains(&ch)
}

/// Extended_Pictographic code points that sit outside the block ranges below.
const PICTOGRAPHIC_SINGLES: &[char] = &[
  '\u{00A9}', '\u{00AE}', '\u{203C}', '\u{2049}', '\u{2122}', '\u{2139}', '\u{2934}', '\u{2935}',
  '\u{25B6}', '\u{25C0}', '\u{3030}', '\u{303D}', '\u{3297}', '\u{3299}',
];

/// True if unicode char belongs to the pictographic / emoji ranges.
/// Includes the emoji presentation selector and ZWJ so sequences are caught too.
pub fn is_pictographic(ch: char) -> bool {
  (ch >= '\u{1F000}' && ch <= '\u{1FAFF}')
    || (ch >= '\u{2600}' && ch <= '\u{27BF}')
    || (ch >= '\u{2B00}' && ch <= '\u{2BFF}')
    || (ch >= '\u{2194}' && ch <= '\u{21AA}')
    || (ch >= '\u{231A}' && ch <= '\u{23FF}')
    || (ch >= '\u{25FB}' && ch <= '\u{25FE}')
    || ch == '\u{FE0F}'
    || ch == '\u{200D}'
    || PICTOGRAPHIC_SINGLES.contains(&ch)
}

/// Returns the first banned char in `text`, if any.
pub fn find_banned_char(text: &str) -> Option<char> {
  text.chars().find(|&c| is_bullet_glyph(c) || is_pictographic(c))
}

/// Round to two decimals, half away from zero.
pub fn round2(x: f64) -> f64 {
  (x * 100.0).round() / 100.0
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    s.to_string()
  } else {
    let head: String = s.chars().take(max).collect();
    format!("{}… ({} bytes total)", head, s.len())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn template_replaces_every_occurrence() {
    let out = fill_template("{a} and {a} but {b}", &[("a", "x"), ("b", "{a}")]);
    assert_eq!(out, "x and x but {a}");
  }

  #[test]
  fn template_keeps_json_braces_and_does_not_rescan_values() {
    let tpl = "Q: {question}\nA: {answer}\n{ \"score\": 1 }";
    let out = fill_template(tpl, &[("question", "{answer}"), ("answer", "무엇")]);
    assert_eq!(out, "Q: {answer}\nA: 무엇\n{ \"score\": 1 }");
  }

  #[test]
  fn banned_chars_cover_bullets_and_emoji() {
    assert_eq!(find_banned_char("• point one"), Some('•'));
    assert_eq!(find_banned_char("정말 좋아요 😀"), Some('😀'));
    assert_eq!(find_banned_char("✅ done"), Some('✅'));
    assert_eq!(find_banned_char("자유의지는 존재한다. 왜냐하면 - 첫째"), None);
    assert_eq!(find_banned_char("plain ascii, with (parens) and 100%"), None);
  }

  #[test]
  fn pictographic_singles_outside_the_emoji_blocks() {
    for ch in ['©', '®', '‼', '〰', '〽', '㊗', '㊙'] {
      assert!(is_pictographic(ch), "{}", ch.escape_unicode());
    }
    for ch in ['a', '가', '。', '「', '%'] {
      assert!(!is_pictographic(ch), "{}", ch.escape_unicode());
    }
  }

  #[test]
  fn round2_is_half_up_for_positive_values() {
    assert_eq!(round2(75.0), 75.0);
    assert_eq!(round2(66.666_666), 66.67);
    assert_eq!(round2(0.125), 0.13);
    assert_eq!(round2(0.0), 0.0);
  }

  #[test]
  fn truncation_respects_char_boundaries() {
    let s = "가나다라마바사";
    let t = trunc_for_log(s, 3);
    assert!(t.starts_with("가나다…"));
    assert_eq!(trunc_for_log("short", 10), "short");
  }
}
