//! Structured-response parser.
//!
//! Model output follows a tag-delimited convention: an optional free-text
//! `<thinking>` block followed by exactly one tool-call element whose
//! children are parameter name/value pairs:
//!
//! ```text
//! <thinking>I should inspect the directory first.</thinking>
//! <list_files><path>.</path></list_files>
//! ```
//!
//! Parsing is deliberately lenient about free text: reserved markup
//! metacharacters inside the known free-text-bearing fields (`command`,
//! `result`, `question`, `answer`) are escaped before the structural parse,
//! so arbitrary generated content cannot corrupt it. Anything that still
//! fails to parse is a hard error carrying the reason — never a partial or
//! guessed tool name.

use codecrafter_core::error::ParseError;
use codecrafter_core::tool::ToolInvocation;
use regex_lite::Regex;

/// Fields whose bodies routinely carry shell text, prose, or markup and get
/// the lenient escaping pass. This is scoped escaping, not a sanitizer.
const FREE_TEXT_TAGS: [&str; 4] = ["command", "result", "question", "answer"];

/// Wrapper/reasoning tags that can never be a tool name.
const RESERVED_TAGS: [&str; 3] = ["thinking", "root", "tool_result"];

/// The parsed shape of one model turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    /// Free-text reasoning, empty when the model emitted none.
    pub thinking: String,
    /// The single action block, or `None` for a pure-reasoning pause turn.
    pub invocation: Option<ToolInvocation>,
}

/// Parse raw model output into `(thinking, invocation)`.
pub fn parse_response(raw: &str) -> Result<ParsedResponse, ParseError> {
    // Markdown code fences around the markup are tolerated and stripped.
    let cleaned = raw.replace("```xml", "").replace("```", "");
    let cleaned = cleaned.trim();

    let escaped = escape_free_text_fields(cleaned);
    let wrapped = format!("<root>{escaped}</root>");
    let root = parse_element_tree(&wrapped)?;

    let thinking = root
        .children
        .iter()
        .find(|c| c.tag == "thinking")
        .map(|c| c.text.trim().to_string())
        .unwrap_or_default();

    let invocation = root
        .children
        .iter()
        .find(|c| !RESERVED_TAGS.contains(&c.tag.as_str()))
        .map(|tool| {
            let mut inv = ToolInvocation::new(tool.tag.clone());
            for child in &tool.children {
                inv.parameters
                    .insert(child.tag.clone(), child.text.trim().to_string());
            }
            inv
        });

    Ok(ParsedResponse {
        thinking,
        invocation,
    })
}

/// Escape `&`, `<`, `>` inside the bodies of the known free-text fields so
/// their content survives the structural parse.
fn escape_free_text_fields(text: &str) -> String {
    let mut result = text.to_string();
    for tag in FREE_TEXT_TAGS {
        let pattern = format!(r"(?s)<{tag}>(.*?)</{tag}>");
        let regex = Regex::new(&pattern).expect("static field pattern");
        result = regex
            .replace_all(&result, |caps: &regex_lite::Captures<'_>| {
                format!("<{tag}>{}</{tag}>", escape_markup(&caps[1]))
            })
            .into_owned();
    }
    result
}

fn escape_markup(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn unescape_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

// --- Minimal tag-tree parser ---

#[derive(Debug)]
struct Element {
    tag: String,
    /// Direct text content (entities unescaped), excluding child elements.
    text: String,
    children: Vec<Element>,
}

fn malformed(reason: impl Into<String>) -> ParseError {
    ParseError::Malformed {
        reason: reason.into(),
    }
}

fn is_valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn parse_element_tree(input: &str) -> Result<Element, ParseError> {
    let mut pos = 0;
    let element = parse_element(input, &mut pos)?;
    if input[pos..].trim() != "" {
        return Err(malformed("trailing content after root element"));
    }
    Ok(element)
}

fn parse_element(input: &str, pos: &mut usize) -> Result<Element, ParseError> {
    if !input[*pos..].starts_with('<') {
        return Err(malformed("expected element start"));
    }
    let close_rel = input[*pos..]
        .find('>')
        .ok_or_else(|| malformed("unterminated tag"))?;
    let raw_tag = &input[*pos + 1..*pos + close_rel];

    if let Some(stray) = raw_tag.strip_prefix('/') {
        return Err(malformed(format!("unexpected closing tag </{stray}>")));
    }

    let self_closing = raw_tag.ends_with('/');
    let raw_tag = raw_tag.trim_end_matches('/');
    let tag = raw_tag
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_string();
    if !is_valid_tag(&tag) {
        return Err(malformed(format!("invalid tag name '{raw_tag}'")));
    }
    *pos += close_rel + 1;

    let mut element = Element {
        tag: tag.clone(),
        text: String::new(),
        children: Vec::new(),
    };
    if self_closing {
        return Ok(element);
    }

    loop {
        let Some(lt_rel) = input[*pos..].find('<') else {
            return Err(malformed(format!("unclosed tag <{tag}>")));
        };
        let lt = *pos + lt_rel;
        element.text.push_str(&unescape_entities(&input[*pos..lt]));

        if input[lt..].starts_with("</") {
            let end_rel = input[lt..]
                .find('>')
                .ok_or_else(|| malformed("unterminated closing tag"))?;
            let closing = input[lt + 2..lt + end_rel].trim();
            if closing != tag {
                return Err(malformed(format!(
                    "mismatched closing tag: expected </{tag}>, found </{closing}>"
                )));
            }
            *pos = lt + end_rel + 1;
            return Ok(element);
        }

        *pos = lt;
        let child = parse_element(input, pos)?;
        element.children.push(child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_action_with_parameters() {
        let parsed = parse_response(
            "<thinking>I need to see the files.</thinking>\n\
             <list_files><path>.</path></list_files>",
        )
        .unwrap();

        assert_eq!(parsed.thinking, "I need to see the files.");
        let inv = parsed.invocation.unwrap();
        assert_eq!(inv.name, "list_files");
        assert_eq!(inv.parameters.get("path").map(String::as_str), Some("."));
    }

    #[test]
    fn reasoning_only_is_a_valid_pause() {
        let parsed = parse_response("<thinking>Still considering options.</thinking>").unwrap();
        assert_eq!(parsed.thinking, "Still considering options.");
        assert!(parsed.invocation.is_none());
    }

    #[test]
    fn plain_prose_without_markup_is_a_pause() {
        let parsed = parse_response("I am not sure what to do next.").unwrap();
        assert_eq!(parsed.thinking, "");
        assert!(parsed.invocation.is_none());
    }

    #[test]
    fn code_fences_are_stripped() {
        let parsed = parse_response(
            "```xml\n<thinking>go</thinking>\n<read_file><path>a.txt</path></read_file>\n```",
        )
        .unwrap();
        assert_eq!(parsed.invocation.unwrap().name, "read_file");
    }

    #[test]
    fn action_without_thinking() {
        let parsed =
            parse_response("<execute_command><command>ls</command></execute_command>").unwrap();
        assert_eq!(parsed.thinking, "");
        let inv = parsed.invocation.unwrap();
        assert_eq!(inv.name, "execute_command");
        assert_eq!(
            inv.parameters.get("command").map(String::as_str),
            Some("ls")
        );
    }

    #[test]
    fn command_with_shell_metacharacters_roundtrips() {
        let parsed = parse_response(
            "<execute_command><command>grep -r \"a && b\" src/ > out.txt</command></execute_command>",
        )
        .unwrap();
        let inv = parsed.invocation.unwrap();
        assert_eq!(
            inv.parameters.get("command").map(String::as_str),
            Some("grep -r \"a && b\" src/ > out.txt")
        );
    }

    #[test]
    fn question_with_angle_brackets_roundtrips() {
        let parsed = parse_response(
            "<thinking>need input</thinking>\
             <ask_followup_question><question>Use <SQLite> or <Postgres>?</question>\
             <options>SQLite,Postgres</options></ask_followup_question>",
        )
        .unwrap();
        let inv = parsed.invocation.unwrap();
        assert_eq!(inv.name, "ask_followup_question");
        assert_eq!(
            inv.parameters.get("question").map(String::as_str),
            Some("Use <SQLite> or <Postgres>?")
        );
        assert_eq!(
            inv.parameters.get("options").map(String::as_str),
            Some("SQLite,Postgres")
        );
    }

    #[test]
    fn pre_escaped_entities_are_unescaped_in_parameters() {
        let parsed = parse_response(
            "<write_to_file><path>a.sh</path><content>echo &amp;&amp; true</content></write_to_file>",
        )
        .unwrap();
        let inv = parsed.invocation.unwrap();
        assert_eq!(
            inv.parameters.get("content").map(String::as_str),
            Some("echo && true")
        );
    }

    #[test]
    fn unclosed_tag_is_a_hard_failure() {
        let err = parse_response("<thinking>ok</thinking><read_file><path>a.txt").unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }));
    }

    #[test]
    fn mismatched_closing_tag_is_a_hard_failure() {
        let err =
            parse_response("<read_file><path>a.txt</wrong></read_file>").unwrap_err();
        let ParseError::Malformed { reason } = err;
        assert!(reason.contains("mismatched"), "unexpected reason: {reason}");
    }

    #[test]
    fn stray_angle_bracket_outside_free_text_fails_deterministically() {
        let first = parse_response("<new_task><description>a < b</description></new_task>");
        let second = parse_response("<new_task><description>a < b</description></new_task>");
        assert!(first.is_err());
        // Never a silently returned partial tool name, and stable across runs.
        assert_eq!(
            format!("{:?}", first.unwrap_err()),
            format!("{:?}", second.unwrap_err())
        );
    }

    #[test]
    fn tool_result_echo_is_not_mistaken_for_an_action() {
        let parsed = parse_response(
            "<thinking>reviewing</thinking>\
             <tool_result><tool_name>list_files</tool_name><result>a.txt</result></tool_result>\
             <read_file><path>a.txt</path></read_file>",
        )
        .unwrap();
        assert_eq!(parsed.invocation.unwrap().name, "read_file");
    }

    #[test]
    fn unknown_extra_parameters_pass_through() {
        let parsed = parse_response(
            "<execute_command><command>ls</command><working_dir>src</working_dir></execute_command>",
        )
        .unwrap();
        let inv = parsed.invocation.unwrap();
        assert_eq!(inv.parameters.len(), 2);
        assert_eq!(
            inv.parameters.get("working_dir").map(String::as_str),
            Some("src")
        );
    }

    #[test]
    fn self_closing_parameterless_tool() {
        let parsed = parse_response("<show_current_task/>").unwrap();
        let inv = parsed.invocation.unwrap();
        assert_eq!(inv.name, "show_current_task");
        assert!(inv.parameters.is_empty());
    }

    #[test]
    fn empty_element_parameterless_tool() {
        let parsed = parse_response("<show_current_task></show_current_task>").unwrap();
        assert_eq!(parsed.invocation.unwrap().name, "show_current_task");
    }

    #[test]
    fn multiline_content_is_preserved() {
        let parsed = parse_response(
            "<write_to_file><path>f.txt</path><content>line one\nline two\n</content></write_to_file>",
        )
        .unwrap();
        let inv = parsed.invocation.unwrap();
        // Parameter values are trimmed at the edges only.
        assert_eq!(
            inv.parameters.get("content").map(String::as_str),
            Some("line one\nline two")
        );
    }

    #[test]
    fn first_non_reserved_element_wins() {
        let parsed = parse_response(
            "<thinking>two actions by mistake</thinking>\
             <read_file><path>a.txt</path></read_file>\
             <list_files><path>.</path></list_files>",
        )
        .unwrap();
        assert_eq!(parsed.invocation.unwrap().name, "read_file");
    }
}
