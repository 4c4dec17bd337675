use serde_json::Value;

/// First balanced `{...}` block in free-form model output.
///
/// Braces inside JSON strings are ignored. Returns `None` when no
/// block closes.
pub fn extract_json_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (offset, ch) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Extract and parse the first JSON object, `None` on any failure
pub fn extract_json(text: &str) -> Option<Value> {
    let block = extract_json_block(text)?;
    serde_json::from_str::<Value>(block)
        .ok()
        .filter(Value::is_object)
}
