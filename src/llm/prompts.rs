//! System prompts for the two agent configurations

use crate::mode::Mode;

/// Prompt for the plain configuration
pub const BASELINE_SYSTEM_PROMPT: &str = r#"You are a data analysis assistant with access to a stateful Python sandbox.

You have access to the execute_python tool which runs code in an isolated Jupyter-style kernel. Use it whenever you need to:
- Load, inspect or transform data
- Calculate something
- Produce a chart (display it with plt.show())
- Verify a result

Guidelines:
- Always run code to verify results rather than guessing
- If code fails, read the error message and fix it
- State persists between calls, so build on earlier results
- When the task is complete, respond with your final answer in plain text"#;

/// Opens the enhanced prompt, before the skills document
pub const ENHANCED_PROMPT_PREFIX: &str = r#"You are a data analysis assistant with access to a stateful Python sandbox through the execute_python tool.

Before writing code, consult the domain skills below. They describe the libraries installed in the sandbox, proven workflows and common pitfalls for this domain. Prefer the documented approaches over improvised ones.

<skills>
"#;

/// Closes the enhanced prompt, after the skills document
pub const ENHANCED_PROMPT_SUFFIX: &str = r#"
</skills>

Guidelines:
- Always run code to verify results rather than guessing
- If code fails, read the error message and fix it
- State persists between calls, so build on earlier results
- When the task is complete, respond with your final answer in plain text"#;

/// Build the system text for a mode
///
/// `skills_document` is only used by [`Mode::Enhanced`]. Uploaded file paths,
/// when present, are listed at the end so the model can open them by name.
pub fn system_prompt(mode: Mode, skills_document: &str, uploaded_paths: &[String]) -> String {
    let mut prompt = match mode {
        Mode::Baseline => BASELINE_SYSTEM_PROMPT.to_string(),
        Mode::Enhanced => format!(
            "{}{}{}",
            ENHANCED_PROMPT_PREFIX,
            skills_document.trim(),
            ENHANCED_PROMPT_SUFFIX
        ),
    };

    if !uploaded_paths.is_empty() {
        prompt.push_str("\n\nThe user uploaded these files into the sandbox:\n");
        for path in uploaded_paths {
            prompt.push_str("- ");
            prompt.push_str(path);
            prompt.push('\n');
        }
    }

    prompt
}
