//! System prompt construction.
//!
//! The prompt teaches the model the turn protocol (one thinking block, one
//! tool call) and documents every registered tool plus the two loop-handled
//! actions. Built once per session from the registry.

use codecrafter_core::tool::{ToolRegistry, ASK_FOLLOWUP_QUESTION, ATTEMPT_COMPLETION};

const HEADER: &str = "You are Codecrafter, a highly skilled autonomous software engineer. Your goal is to complete the user's task by breaking it down into a sequence of tool calls.

# Tool Use
- You have access to a set of tools defined below in XML format.
- You must call one tool per turn.
- After each tool call, you will receive the result and you must decide on the next step.

# Thinking Process
- Before each tool call, you MUST use `<thinking>` tags to explain your reasoning and your step-by-step plan.

# XML Formatting
- All tool calls and parameters MUST be enclosed in XML tags.
- Special XML characters in parameter values MUST be escaped (e.g., `&` becomes `&amp;`).

# Tools
";

/// Build the full system prompt for a session.
pub fn system_prompt(registry: &ToolRegistry) -> String {
    let mut prompt = String::from(HEADER);

    for tool in registry.iter() {
        prompt.push_str(&format!(
            "\n## {}\nDescription: {}\nUsage: {}\n",
            tool.name(),
            tool.description(),
            tool.usage()
        ));
    }

    prompt.push_str(&format!(
        "\n## {ASK_FOLLOWUP_QUESTION}\nDescription: Asks the user a clarifying question with optional comma-separated choices. Use this if you are blocked or need more information.\nUsage: <{ASK_FOLLOWUP_QUESTION}><question>Your question</question><options>Option 1,Option 2</options></{ASK_FOLLOWUP_QUESTION}>\n"
    ));
    prompt.push_str(&format!(
        "\n## {ATTEMPT_COMPLETION}\nDescription: Use this tool ONLY when the user's request has been fully completed.\nUsage: <{ATTEMPT_COMPLETION}><result>Summary of completion</result></{ATTEMPT_COMPLETION}>\n"
    ));

    prompt
}
