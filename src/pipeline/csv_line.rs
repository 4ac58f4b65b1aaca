//! Minimal CSV line handling shared by the source loader, the sink and the query
//!
//! Records are single-line; quoted fields may contain the delimiter and `""`
//! escapes.

pub const DELIMITER: char = ',';

/// Split one line into fields, honouring double quotes
pub fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.trim_end_matches(['\r', '\n']).chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            c if c == DELIMITER && !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            c => current.push(c),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

/// Quote a field if it would otherwise break the record
pub fn escape_field(field: &str) -> String {
    if field.contains([DELIMITER, '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

pub fn join_record<I, S>(fields: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    fields
        .into_iter()
        .map(|f| escape_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain_and_quoted() {
        assert_eq!(split_record("a, b ,c\r\n"), vec!["a", "b", "c"]);
        assert_eq!(
            split_record(r#"x,"hello, world","say ""hi""""#),
            vec!["x", "hello, world", r#"say "hi""#]
        );
        assert_eq!(split_record("a,,"), vec!["a", "", ""]);
    }

    #[test]
    fn test_join_quotes_only_when_needed() {
        let line = join_record(["plain", "with,comma", "q\"uote"]);
        assert_eq!(line, r#"plain,"with,comma","q""uote""#);
        assert_eq!(split_record(&line), vec!["plain", "with,comma", "q\"uote"]);
    }
}
