//! Prompt construction for the first message of a run.
//!
//! The first message carries a context prefix describing where the code
//! will run, the response rules the extractor depends on, and the task.
//! Later messages are feedback and carry no prefix; the conversation
//! already holds it.

use crate::domain::Target;

/// Rules every response must follow; the extractor parses the hint lines.
const RESPONSE_RULES: &str = "Do NOT use emojis or Unicode symbols anywhere in the code or output -- use ASCII only. \
Prefer stdlib modules over third-party packages. \
If third-party packages are required, list them at the top of your response in this exact format: \
DEPENDENCIES: package1, package2, package3 \
If no external packages are needed, do NOT include a DEPENDENCIES line. \
If the program needs longer than 30 seconds to run, include TIMEOUT: <seconds> at the top of your response. \
Put all code inside fenced code blocks (```language ... ```).";

/// Context prefix for `target`, ending in a blank line.
pub fn context_prefix(target: Target, remote_dir: &str) -> String {
    let context = match target {
        Target::Local => "Code will run on Linux with Python. ".to_string(),
        Target::RemotePrimary => format!(
            "Code will run on a Raspberry Pi 5 running Linux (aarch64). \
             Python 3 is available. The code will be deployed and executed remotely via SSH \
             in {}. Any output files should be saved in the same directory as the script. \
             Use platform.node() or similar to prove execution happened on the Pi. ",
            remote_dir
        ),
        Target::RemoteSecondary => "Code targets an STM32 (ARM Cortex-M4) microcontroller. \
             C sources are cross-compiled with arm-none-eabi-gcc on a Raspberry Pi and \
             only checked for compile errors; nothing is flashed or run. \
             Write freestanding C with no hosted-only headers. "
            .to_string(),
    };
    format!("[SYSTEM CONTEXT: {}{}]\n\n", context, RESPONSE_RULES)
}

/// The first message of a run.
pub fn initial_prompt(task: &str, target: Target, remote_dir: &str) -> String {
    format!("{}{}", context_prefix(target, remote_dir), task.trim())
}
