//! 模型输出中的 JSON 提取

/// 去掉 ```json ... ``` / ``` ... ``` 代码块包裹；没有代码块时返回去首尾空白的原文
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let rest = &trimmed[start + 3..];
    // 跳过语言标记（json / JSON / 空）
    let rest = match rest.find('\n') {
        Some(nl) if rest[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) => &rest[nl + 1..],
        _ => rest,
    };
    match rest.find("```") {
        Some(end) => rest[..end].trim(),
        None => rest.trim(),
    }
}

/// 整段回复恰好是一个代码块时返回块内内容；块外还有文字时返回 None
pub fn unwrap_code_fence(text: &str) -> Option<&str> {
    let inner = text.trim().strip_prefix("```")?.strip_suffix("```")?;
    let inner = match inner.find('\n') {
        Some(nl) if inner[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) => &inner[nl + 1..],
        _ => inner,
    };
    (!inner.contains("```")).then(|| inner.trim())
}

/// 宽松提取：先去代码块，再取第一个 open 到最后一个 close 之间的片段
pub fn find_json_span(text: &str, open: char, close: char) -> Option<&str> {
    let body = strip_code_fence(text);
    let start = body.find(open)?;
    let end = body.rfind(close)?;
    (end > start).then(|| &body[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(strip_code_fence("Sure:\n```json\n{\"a\":1}\n```\nDone"), "{\"a\":1}");
    }

    #[test]
    fn test_unwrap_code_fence_requires_whole_reply() {
        assert_eq!(unwrap_code_fence(" ```json\n{\"a\":1}\n``` "), Some("{\"a\":1}"));
        assert_eq!(unwrap_code_fence("```\n[1]\n```"), Some("[1]"));
        assert_eq!(unwrap_code_fence("Sure:\n```json\n{\"a\":1}\n```"), None);
        assert_eq!(unwrap_code_fence("```json\n{}\n```\nthen more"), None);
        assert_eq!(unwrap_code_fence("```a``` and ```b```"), None);
        assert_eq!(unwrap_code_fence("{\"a\":1}"), None);
    }

    #[test]
    fn test_find_json_span() {
        assert_eq!(
            find_json_span("The result is {\"from\": \"A\", \"to\": \"B\"} ok", '{', '}'),
            Some("{\"from\": \"A\", \"to\": \"B\"}")
        );
        assert_eq!(find_json_span("Names: [\"Parlament\"]", '[', ']'), Some("[\"Parlament\"]"));
        assert_eq!(find_json_span("nothing here", '{', '}'), None);
    }
}
