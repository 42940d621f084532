//! Prompt construction for reasoning, branch and reconcile calls.
//!
//! Private state is framed between fixed delimiters so it can be located
//! again without parsing it.

use crate::agent::AgentIdentity;
use crate::percept::Percept;
use crate::store::PrivateContent;

pub const PRIVATE_STATE_OPEN: &str = "<<<PRIVATE_STATE>>>";
pub const PRIVATE_STATE_CLOSE: &str = "<<<END_PRIVATE_STATE>>>";
pub const REASONING_HEADER: &str = "## Reasoning";
pub const RECONCILE_HEADER: &str = "## Reconcile";
pub const STYLE_PREFIX: &str = "Style: ";

const REPLY_INSTRUCTIONS: &str = "Reply with your private notes. To act outside yourself, \
append a ```json block with any of: signals [{topics, payload}], requests [agent ids], \
env_updates {key: value}, expose {field: value}, tool_calls [{tool, args}]. \
Never copy your private state into that block.";

fn header(identity: &AgentIdentity) -> String {
    let mut out = format!(
        "agent_id: {}\nrole: {}\n",
        identity.agent_id, identity.role
    );
    for (name, value) in &identity.behavior_params {
        out.push_str(&format!("param {}: {}\n", name, value));
    }
    out
}

fn private_state_section(prior: Option<&PrivateContent>) -> String {
    format!(
        "{}\n{}\n{}\n",
        PRIVATE_STATE_OPEN,
        prior.map(PrivateContent::as_str).unwrap_or(""),
        PRIVATE_STATE_CLOSE
    )
}

fn tools_section(tools: &[(String, String)]) -> String {
    if tools.is_empty() {
        return String::new();
    }
    let mut out = String::from("Tools available:\n");
    for (name, description) in tools {
        out.push_str(&format!("- {}: {}\n", name, description));
    }
    out
}

/// Prompt for a single reasoning call, or one branch when `style` is set.
///
/// `prior` is `None` in stateless mode; the private-state section is then
/// omitted entirely.
pub fn reasoning_prompt(
    identity: &AgentIdentity,
    percept: &Percept,
    prior: Option<Option<&PrivateContent>>,
    tools: &[(String, String)],
    style: Option<&str>,
) -> String {
    let context = serde_json::to_string_pretty(&percept.to_context())
        .unwrap_or_else(|_| "{}".to_string());
    let mut prompt = format!("{}\n{}", REASONING_HEADER, header(identity));
    if let Some(style) = style {
        prompt.push_str(&format!("{}{}\n", STYLE_PREFIX, style));
    }
    prompt.push_str(&format!("Percept:\n{}\n", context));
    if let Some(prior) = prior {
        prompt.push_str(&private_state_section(prior));
    }
    prompt.push_str(&tools_section(tools));
    prompt.push_str(REPLY_INSTRUCTIONS);
    prompt
}

/// Prompt merging branch notes into the next private state.
///
/// Notes arrive unlabeled; the caller decides their order.
pub fn reconcile_prompt(
    identity: &AgentIdentity,
    prior: Option<&PrivateContent>,
    notes: &[&str],
) -> String {
    let mut prompt = format!("{}\n{}", RECONCILE_HEADER, header(identity));
    prompt.push_str(&private_state_section(prior));
    prompt.push_str("Candidate notes:\n");
    for (i, note) in notes.iter().enumerate() {
        prompt.push_str(&format!("[{}]\n{}\n", i + 1, note));
    }
    prompt.push_str(
        "Write the complete next version of your private state. Reply with the state only.",
    );
    prompt
}

/// The private-state text framed in `prompt`, if any.
pub fn extract_private_state(prompt: &str) -> Option<&str> {
    let open = prompt.find(PRIVATE_STATE_OPEN)? + PRIVATE_STATE_OPEN.len();
    let rest = prompt.get(open..)?.strip_prefix('\n')?;
    let end = rest.find(PRIVATE_STATE_CLOSE)?;
    rest.get(..end)?.strip_suffix('\n')
}

/// The branch style requested in `prompt`, if any.
pub fn extract_style(prompt: &str) -> Option<&str> {
    prompt
        .lines()
        .find_map(|line| line.strip_prefix(STYLE_PREFIX))
}
