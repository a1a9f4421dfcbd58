//! Ordered target rules.

use regex::{Regex, RegexSet};
use std::sync::LazyLock;

use crate::domain::{CodeBlock, FilenameOrigin, Target};

fn set(patterns: &[&str]) -> RegexSet {
    RegexSet::new(patterns).expect("constant regex pattern is valid")
}

static CODE_SECONDARY: LazyLock<RegexSet> = LazyLock::new(|| {
    set(&[
        r#"#include\s+["<]stm32"#,
        r"\bHAL_GPIO",
        r"\bHAL_CAN",
        r"\bHAL_SPI",
        r"\bHAL_UART",
    ])
});

static CODE_PRIMARY: LazyLock<RegexSet> = LazyLock::new(|| {
    set(&[
        r"(?:import|from)\s+RPi\b",
        r"\bgpiozero\b",
        r"\bspidev\b",
        r"\bsmbus2?\b",
        r"import\s+can\b",
        r"import\s+serial\b",
        r"socketcan",
        r"/dev/tty",
        r"/dev/spi",
        r"/dev/i2c",
        r"\bGPIO\.",
    ])
});

static PROMPT_SECONDARY: LazyLock<RegexSet> =
    LazyLock::new(|| set(&[r"\bstm32\w*\b", r"\bmcu\b"]));

static PROMPT_PRIMARY: LazyLock<RegexSet> = LazyLock::new(|| {
    set(&[
        r"\braspi\b",
        r"\braspberry\s*pi\b",
        r"\bpi\s*5\b",
        r"\brpi\b",
        r"\bthe\s+pi\b",
        r"\bremote\b",
        r"\bgpio\b",
        r"\bi2c\b",
        r"\bspi\b",
        r"\buart\b",
        r"\bcan\s*bus\b",
        r"\bsensor\b",
        r"\bmotor\b",
        r"\bimu\b",
        r"\bembedded\b",
        r"\bhardware\b",
    ])
});

static PROMPT_LOCAL: LazyLock<RegexSet> = LazyLock::new(|| {
    set(&[
        r"\blocal\b",
        r"\blocally\b",
        r"\bthis\s+machine\b",
        r"\bmy\s+(?:computer|laptop)\b",
        r"\bwindows\b",
        r"\bhere\b",
    ])
});

static FILENAME_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(pi|rpi|raspi|stm32|mcu|local)_").expect("constant regex pattern is valid")
});

/// A named classification rule. `prompt` arrives lowercased.
pub struct TargetRule {
    pub name: &'static str,
    decide: fn(&str, &CodeBlock) -> Option<Target>,
}

impl TargetRule {
    pub fn decide(&self, prompt: &str, block: &CodeBlock) -> Option<Target> {
        (self.decide)(prompt, block)
    }
}

/// Target named by the filename prefix. Only names the response chose
/// count; names generated from the prompt would echo prompt keywords.
fn filename_prefix(block: &CodeBlock) -> Option<Target> {
    if block.origin != FilenameOrigin::Response {
        return None;
    }
    let name = block.filename.to_lowercase();
    let caps = FILENAME_PREFIX.captures(&name)?;
    match caps.get(1)?.as_str() {
        "pi" | "rpi" | "raspi" => Some(Target::RemotePrimary),
        "stm32" | "mcu" => Some(Target::RemoteSecondary),
        _ => Some(Target::Local),
    }
}

fn filename_primary(_: &str, b: &CodeBlock) -> Option<Target> {
    filename_prefix(b).filter(|t| *t == Target::RemotePrimary)
}

fn filename_secondary(_: &str, b: &CodeBlock) -> Option<Target> {
    filename_prefix(b).filter(|t| *t == Target::RemoteSecondary)
}

fn filename_local(_: &str, b: &CodeBlock) -> Option<Target> {
    filename_prefix(b).filter(|t| *t == Target::Local)
}

fn code_secondary(_: &str, b: &CodeBlock) -> Option<Target> {
    CODE_SECONDARY.is_match(&b.code).then_some(Target::RemoteSecondary)
}

fn code_primary(_: &str, b: &CodeBlock) -> Option<Target> {
    CODE_PRIMARY.is_match(&b.code).then_some(Target::RemotePrimary)
}

fn prompt_secondary(p: &str, _: &CodeBlock) -> Option<Target> {
    PROMPT_SECONDARY.is_match(p).then_some(Target::RemoteSecondary)
}

fn prompt_primary(p: &str, _: &CodeBlock) -> Option<Target> {
    PROMPT_PRIMARY.is_match(p).then_some(Target::RemotePrimary)
}

fn prompt_local(p: &str, _: &CodeBlock) -> Option<Target> {
    PROMPT_LOCAL.is_match(p).then_some(Target::Local)
}

/// Rules in precedence order (the command-line override is handled before these).
pub static TARGET_RULES: &[TargetRule] = &[
    TargetRule {
        name: "filename_prefix_primary",
        decide: filename_primary,
    },
    TargetRule {
        name: "filename_prefix_secondary",
        decide: filename_secondary,
    },
    TargetRule {
        name: "filename_prefix_local",
        decide: filename_local,
    },
    TargetRule {
        name: "code_secondary_references",
        decide: code_secondary,
    },
    TargetRule {
        name: "code_primary_references",
        decide: code_primary,
    },
    TargetRule {
        name: "prompt_secondary_keywords",
        decide: prompt_secondary,
    },
    TargetRule {
        name: "prompt_primary_keywords",
        decide: prompt_primary,
    },
    TargetRule {
        name: "prompt_local_keywords",
        decide: prompt_local,
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BlockKind;

    fn block(filename: &str, code: &str) -> CodeBlock {
        CodeBlock {
            language: "python".to_string(),
            code: code.to_string(),
            filename: filename.to_string(),
            origin: FilenameOrigin::Response,
            offset: 0,
            kind: BlockKind::Program,
        }
    }

    fn rule(name: &str) -> &'static TargetRule {
        TARGET_RULES.iter().find(|r| r.name == name).unwrap()
    }

    #[test]
    fn test_rule_names_unique() {
        let mut names: Vec<_> = TARGET_RULES.iter().map(|r| r.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), TARGET_RULES.len());
    }

    #[test]
    fn test_filename_prefix_rules() {
        assert_eq!(filename_prefix(&block("pi_blink.py", "")), Some(Target::RemotePrimary));
        assert_eq!(filename_prefix(&block("RPI_blink.py", "")), Some(Target::RemotePrimary));
        assert_eq!(filename_prefix(&block("mcu_main.c", "")), Some(Target::RemoteSecondary));
        assert_eq!(filename_prefix(&block("local_sum.py", "")), Some(Target::Local));
        assert_eq!(filename_prefix(&block("pipeline.py", "")), None);

        let mut generated = block("pi_blink.py", "");
        generated.origin = FilenameOrigin::Generated;
        assert_eq!(filename_prefix(&generated), None);
    }

    #[test]
    fn test_code_primary_references() {
        let r = rule("code_primary_references");
        assert!(r.decide("", &block("a.py", "import RPi.GPIO as GPIO")).is_some());
        assert!(r.decide("", &block("a.py", "import smbus2")).is_some());
        assert!(r.decide("", &block("a.py", "ser = serial.Serial('/dev/ttyUSB0')")).is_some());
        assert!(r.decide("", &block("a.py", "import canvas")).is_none());
    }

    #[test]
    fn test_code_secondary_references() {
        let r = rule("code_secondary_references");
        assert!(r.decide("", &block("a.c", "HAL_UART_Transmit(&huart2, buf, n, 10);")).is_some());
        assert!(r.decide("", &block("a.c", "#include <stdio.h>")).is_none());
    }

    #[test]
    fn test_prompt_rules() {
        let empty = block("a.py", "");
        assert!(rule("prompt_primary_keywords").decide("spin the motor", &empty).is_some());
        assert!(rule("prompt_primary_keywords").decide("read the can bus", &empty).is_some());
        assert!(rule("prompt_primary_keywords").decide("pick a spicy recipe", &empty).is_none());
        assert!(rule("prompt_local_keywords").decide("on my laptop", &empty).is_some());
        assert!(rule("prompt_secondary_keywords").decide("stm32f4 blink", &empty).is_some());
    }
}
