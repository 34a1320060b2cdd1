//! ASCII table rendering for the console.

use serde_json::Value;

/// Render `rows` under `headers` as a boxed ASCII table. Rows shorter than
/// the header are padded with blanks.
pub fn render(headers: &[&str], rows: &[Vec<String>]) -> String {
    if headers.is_empty() {
        return String::new();
    }
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(widths.len()) {
            widths[idx] = widths[idx].max(cell.chars().count());
        }
    }

    let rule = {
        let segments: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
        format!("+{}+", segments.join("+"))
    };
    let line = |cells: Vec<&str>| {
        let padded: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(idx, w)| format!(" {:<w$} ", cells.get(idx).copied().unwrap_or(""), w = *w))
            .collect();
        format!("|{}|", padded.join("|"))
    };

    let mut out = vec![rule.clone(), line(headers.to_vec()), rule.clone()];
    for row in rows {
        out.push(line(row.iter().map(String::as_str).collect()));
    }
    out.push(rule);
    out.join("\n")
}

/// Human form of a JSON value: floats trimmed to three decimals, null as "-".
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => {
                let text = format!("{f:.3}");
                text.trim_end_matches('0').trim_end_matches('.').to_string()
            }
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Pick `columns` out of each JSON object. Missing keys render as "-".
pub fn project(items: &[Value], columns: &[&str]) -> Vec<Vec<String>> {
    items
        .iter()
        .map(|item| {
            columns
                .iter()
                .map(|c| stringify(item.get(*c).unwrap_or(&Value::Null)))
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_pads_columns() {
        let table = render(&["Field", "Value"], &[vec!["hunger".into(), "95.5".into()]]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "+--------+-------+");
        assert_eq!(lines[1], "| Field  | Value |");
        assert_eq!(lines[3], "| hunger | 95.5  |");
    }

    #[test]
    fn test_stringify_trims_floats() {
        assert_eq!(stringify(&json!(5.0)), "5");
        assert_eq!(stringify(&json!(0.12345)), "0.123");
        assert_eq!(stringify(&json!(7)), "7");
        assert_eq!(stringify(&json!(null)), "-");
        assert_eq!(stringify(&json!("awake")), "awake");
    }

    #[test]
    fn test_project_missing_key() {
        let rows = project(&[json!({"hunger": 10.5})], &["hunger", "mood"]);
        assert_eq!(rows, vec![vec!["10.5".to_string(), "-".to_string()]]);
    }
}
