//! Markdown frontmatter parsing and project note rendering.
//!
//! Notes carry their identity in YAML frontmatter:
//! ```markdown
//! ---
//! TodoistId: 2203306141
//! TodoistUrl: https://app.todoist.com/app/project/2203306141
//! ---
//! ```

use std::collections::HashMap;

/// Frontmatter key holding the remote project id.
pub const IDENTITY_KEY: &str = "TodoistId";

/// Frontmatter key holding the link back to the remote project.
pub const URL_KEY: &str = "TodoistUrl";

/// Parsed markdown document
#[derive(Debug, Clone)]
pub struct ParsedMarkdown {
    /// Frontmatter as key-value pairs (None if no frontmatter)
    pub frontmatter: Option<HashMap<String, serde_yaml::Value>>,
    /// Markdown body (everything after frontmatter)
    pub body: String,
}

/// Parse a markdown file into frontmatter and body.
///
/// Frontmatter must be delimited by `---` at the start of the file.
/// Invalid YAML is treated as no frontmatter.
pub fn parse(content: &str) -> ParsedMarkdown {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    if !content.starts_with("---") {
        return ParsedMarkdown {
            frontmatter: None,
            body: content.to_string(),
        };
    }

    let rest = &content[3..];
    match rest.find("\n---") {
        Some(pos) => {
            let yaml_content = rest[..pos].trim();
            let body_start = pos + 4; // Skip "\n---"
            let body = rest[body_start..].trim_start_matches(['\r', '\n']).to_string();

            let frontmatter =
                match serde_yaml::from_str::<HashMap<String, serde_yaml::Value>>(yaml_content) {
                    Ok(fm) if !fm.is_empty() => Some(fm),
                    Ok(_) => None,
                    Err(_) => None,
                };

            ParsedMarkdown { frontmatter, body }
        }
        None => ParsedMarkdown {
            frontmatter: None,
            body: content.to_string(),
        },
    }
}

/// Read the identity tag from a note's content.
///
/// Accepts both string and integer YAML scalars, so `TodoistId: 1` and
/// `TodoistId: '1'` both yield `"1"`.
pub fn identity_tag(content: &str) -> Option<String> {
    let frontmatter = parse(content).frontmatter?;
    match frontmatter.get(IDENTITY_KEY)? {
        serde_yaml::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_yaml::Value::Number(n) if n.is_u64() || n.is_i64() => Some(n.to_string()),
        _ => None,
    }
}

/// Web link to a remote project.
pub fn project_url(project_id: &str) -> String {
    format!(
        "https://app.todoist.com/app/project/{}",
        urlencoding::encode(project_id)
    )
}

/// Render the initial content of a project note.
pub fn render_project_note(project_id: &str, project_name: &str) -> String {
    let mut out = String::new();
    out.push_str("---\n");
    out.push_str(&format!("{}: {}\n", IDENTITY_KEY, yaml_scalar(project_id)));
    out.push_str(&format!("{}: {}\n", URL_KEY, project_url(project_id)));
    out.push_str("---\n\n");
    out.push_str("```todoist\n");
    out.push_str(&format!("name: {}\n", yaml_double_quoted(project_name)));
    out.push_str(&format!(
        "filter: {}\n",
        yaml_double_quoted(&format!("##{}", project_name))
    ));
    out.push_str("```\n");
    out
}

/// Ids that are canonical decimal integers are written plain so the
/// frontmatter reads `TodoistId: 1`; anything else is single-quoted.
fn yaml_scalar(value: &str) -> String {
    let canonical_int = !value.is_empty()
        && value.chars().all(|c| c.is_ascii_digit())
        && (value == "0" || !value.starts_with('0'))
        && value.parse::<u64>().is_ok();
    if canonical_int {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "''"))
    }
}

fn yaml_double_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c if c.is_control() => out.push(' '),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_frontmatter() {
        let content = r#"---
title: Test Note
tags:
  - rust
---

# Hello World

This is the body."#;

        let parsed = parse(content);
        let fm = parsed.frontmatter.unwrap();
        assert_eq!(
            fm.get("title").unwrap(),
            &serde_yaml::Value::String("Test Note".to_string())
        );
        assert!(parsed.body.starts_with("# Hello World"));
    }

    #[test]
    fn test_parse_without_frontmatter() {
        let content = "# Just a heading\n\nSome content.";
        let parsed = parse(content);
        assert!(parsed.frontmatter.is_none());
        assert_eq!(parsed.body, content);
    }

    #[test]
    fn test_identity_tag_accepts_integers_and_strings() {
        assert_eq!(identity_tag("---\nTodoistId: 1\n---\n"), Some("1".into()));
        assert_eq!(
            identity_tag("---\nTodoistId: '6Jf8VQXxpwv56VQ7'\n---\nbody"),
            Some("6Jf8VQXxpwv56VQ7".into())
        );
        assert_eq!(
            identity_tag("---\nTodoistId: abc123\n---\n"),
            Some("abc123".into())
        );
    }

    #[test]
    fn test_identity_tag_missing_or_unusable() {
        assert_eq!(identity_tag("# no frontmatter"), None);
        assert_eq!(identity_tag("---\ntitle: x\n---\n"), None);
        assert_eq!(identity_tag("---\nTodoistId: [1, 2]\n---\n"), None);
        assert_eq!(identity_tag("---\nTodoistId: ''\n---\n"), None);
        assert_eq!(identity_tag("---\nTodoistId: 1.5\n---\n"), None);
    }

    #[test]
    fn test_rendered_note_round_trips_identity() {
        let note = render_project_note("1", "Alpha");
        assert!(note.contains("TodoistId: 1\n"));
        assert!(note.contains("TodoistUrl: https://app.todoist.com/app/project/1\n"));
        assert!(note.contains("filter: \"##Alpha\""));
        assert_eq!(identity_tag(&note), Some("1".into()));
    }

    #[test]
    fn test_ids_that_would_misparse_are_quoted() {
        for id in ["007", "1e5", "true", "null", "it's"] {
            let note = render_project_note(id, "P");
            assert_eq!(identity_tag(&note).as_deref(), Some(id), "id {id}");
        }
    }

    #[test]
    fn test_project_name_is_escaped_in_query_block() {
        let note = render_project_note("5", "Say \"hi\"");
        assert!(note.contains("name: \"Say \\\"hi\\\"\""));
    }
}
