/// HTMLテキスト・属性値用のエスケープ
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// `<script>` 内に埋め込むJSONのエスケープ
///
/// `</script>` やU+2028/U+2029でスクリプトが途中で切れないようにする。
/// 出力は同じ値を表すJSONのまま。
pub fn escape_json_for_script(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for ch in json.chars() {
        match ch {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a href=\"x\">&'</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;&lt;/a&gt;");
    }

    #[test]
    fn test_script_json_cannot_close_script() {
        let value = json!({ "code": "</script><script>alert(1)</script>", "t": "a\u{2028}b\u{2029}&" });
        let escaped = escape_json_for_script(&serde_json::to_string(&value).unwrap());

        assert!(!escaped.contains("</script"));
        assert!(!escaped.contains('<'));
        assert!(!escaped.contains('\u{2028}'));
        assert!(!escaped.contains('\u{2029}'));
        let parsed: Value = serde_json::from_str(&escaped).unwrap();
        assert_eq!(parsed, value);
    }
}
