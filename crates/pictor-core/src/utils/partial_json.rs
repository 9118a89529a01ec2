use serde_json::Value;

/// Best-effort parse of a JSON document that may be cut off mid-stream.
///
/// Open strings, objects and arrays are closed and dangling separators are
/// dropped. When the tail cannot be completed it is trimmed back until the
/// remainder parses. Returns `Value::Null` when nothing usable is left.
pub fn parse_partial_json(input: &str) -> Value {
    if let Ok(value) = serde_json::from_str(input) {
        return value;
    }

    let mut end = input.len();
    while end > 0 {
        if input.is_char_boundary(end)
            && let Some(value) = close_and_parse(&input[..end])
        {
            return value;
        }
        end -= 1;
    }

    Value::Null
}

fn close_and_parse(prefix: &str) -> Option<Value> {
    let mut closers = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in prefix.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            '}' | ']' => {
                closers.pop();
            }
            _ => {}
        }
    }

    if escaped {
        return None;
    }

    let mut candidate = String::with_capacity(prefix.len() + closers.len() + 1);
    candidate.push_str(prefix);
    if in_string {
        candidate.push('"');
    } else {
        let kept = candidate.trim_end().trim_end_matches(',').len();
        candidate.truncate(kept);
    }
    candidate.extend(closers.iter().rev());

    serde_json::from_str(&candidate).ok()
}
