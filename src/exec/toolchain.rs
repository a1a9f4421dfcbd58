//! How each kind of source file is built and run.

use std::path::Path;

use regex::RegexSet;
use std::sync::LazyLock;

use crate::domain::Target;
use crate::domain::block::language_for_extension;

/// Steps needed to execute one saved file. Commands are relative to the
/// work directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunPlan {
    /// Run directly with an interpreter
    Interpret { command: String },
    /// Compile, then run the produced binary
    CompileThenRun { compile: String, run: String },
    /// Compile only; a clean compile is the whole check
    CompileOnly { compile: String },
    /// Header file, nothing to run
    Skip(String),
    /// No way to run this language on the target
    Unrunnable(String),
}

/// Single-quote `s` for POSIX shells.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Script file a direct command named `name` is written to before it runs.
pub fn command_script(name: &str) -> String {
    format!("{}.sh", name)
}

fn file_stem(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "program".to_string())
}

fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Build the run plan for `filename`, falling back to `language` when the
/// extension says nothing.
pub fn plan_for(filename: &str, language: &str, target: Target) -> RunPlan {
    let ext = extension_of(filename);
    if matches!(ext.as_str(), "h" | "hpp") {
        return RunPlan::Skip("header file, nothing to execute".to_string());
    }
    let language = language_for_extension(&ext).unwrap_or(language);
    let file = shell_quote(filename);
    let stem = file_stem(filename);

    if target == Target::RemoteSecondary {
        return match language {
            "c" | "cpp" => RunPlan::CompileOnly {
                compile: format!(
                    "arm-none-eabi-gcc -c -mcpu=cortex-m4 -mthumb -Wall {} -o {}",
                    file,
                    shell_quote(&format!("{}.o", stem))
                ),
            },
            other => RunPlan::Unrunnable(format!(
                "{} sources cannot run on the STM32; only C/C++ is cross-compiled",
                other
            )),
        };
    }

    match language {
        "python" => RunPlan::Interpret {
            command: format!("exec python3 -u {}", file),
        },
        "bash" => RunPlan::Interpret {
            command: format!("exec bash {}", file),
        },
        "javascript" => RunPlan::Interpret {
            command: format!("exec node {}", file),
        },
        "c" | "cpp" => {
            let compiler = if language == "c" { "gcc" } else { "g++" };
            let binary = shell_quote(&stem);
            RunPlan::CompileThenRun {
                compile: format!("{} -Wall -o {} {} -lm", compiler, binary, file),
                run: format!("exec ./{}", binary),
            }
        }
        other => RunPlan::Unrunnable(format!("no runner for '{}' files", other)),
    }
}

static LONG_RUNNING: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"while\s+True\s*:",
        r"while\s*\(\s*(?:1|true)\s*\)",
        r"for\s*\(\s*;\s*;\s*\)",
        r"\bserve_forever\s*\(",
        r"\.listen\s*\(",
        r"\binput\s*\(",
        r"\bsignal\.pause\s*\(",
    ])
    .expect("constant regex pattern is valid")
});

/// Whether the code looks like it runs until killed.
pub fn long_running_hint(code: &str) -> bool {
    LONG_RUNNING.is_match(code)
}
