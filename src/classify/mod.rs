//! Target classification.
//!
//! Decides, per kept block, which machine runs it. Rules are tried in
//! order and the first one with an opinion wins:
//!
//! 1. Explicit override from the command line
//! 2. Filename prefix (`pi_`, `stm32_`, `local_`, ...)
//! 3. Platform references in the code body
//! 4. Platform keywords in the prompt
//! 5. Local

mod rules;

use crate::domain::{CodeBlock, FilenameOrigin, Target};

pub use rules::{TARGET_RULES, TargetRule};

/// Rule name reported when the operator forced a target.
pub const OVERRIDE_RULE: &str = "override";

/// Rule name reported when nothing matched.
pub const DEFAULT_RULE: &str = "default_local";

/// A target and the rule that chose it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub target: Target,
    pub rule: &'static str,
}

/// Picks the target for each block.
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetClassifier {
    override_target: Option<Target>,
}

impl TargetClassifier {
    pub fn new(override_target: Option<Target>) -> Self {
        Self { override_target }
    }

    pub fn override_target(&self) -> Option<Target> {
        self.override_target
    }

    pub fn classify(&self, prompt: &str, block: &CodeBlock) -> Classification {
        if let Some(target) = self.override_target {
            return Classification {
                target,
                rule: OVERRIDE_RULE,
            };
        }

        let prompt = prompt.to_lowercase();
        TARGET_RULES
            .iter()
            .find_map(|rule| {
                rule.decide(&prompt, block).map(|target| Classification {
                    target,
                    rule: rule.name,
                })
            })
            .unwrap_or(Classification {
                target: Target::Local,
                rule: DEFAULT_RULE,
            })
    }

    /// Target for the run as a whole, before any code exists.
    ///
    /// Used to shape the initial prompt and to decide whether remote
    /// credentials are needed up front.
    pub fn classify_prompt(&self, prompt: &str) -> Classification {
        let empty = CodeBlock {
            language: "txt".to_string(),
            code: String::new(),
            filename: String::new(),
            origin: FilenameOrigin::Generated,
            offset: 0,
            kind: crate::domain::BlockKind::Program,
        };
        self.classify(prompt, &empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BlockKind;

    /// A block whose filename the response chose.
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

    #[test]
    fn test_override_wins_over_remote_keywords() {
        let classifier = TargetClassifier::new(Some(Target::Local));
        let result = classifier.classify(
            "read the i2c sensor on the raspberry pi",
            &block("pi_sensor.py", "import smbus\nimport RPi.GPIO as GPIO"),
        );
        assert_eq!(result.target, Target::Local);
        assert_eq!(result.rule, OVERRIDE_RULE);
    }

    #[test]
    fn test_filename_prefix_beats_code() {
        let classifier = TargetClassifier::default();
        let result = classifier.classify("do it", &block("local_gpio.py", "import RPi.GPIO"));
        assert_eq!(result.target, Target::Local);
        assert_eq!(result.rule, "filename_prefix_local");

        let result = classifier.classify("do it", &block("stm32_blink.c", "int main(){}"));
        assert_eq!(result.target, Target::RemoteSecondary);
    }

    #[test]
    fn test_generated_filename_prefix_does_not_beat_code() {
        let classifier = TargetClassifier::default();
        let mut named_from_prompt = block("local_test_gpiozero_led.py", "from gpiozero import LED\nLED(17).on()");
        named_from_prompt.origin = FilenameOrigin::Generated;
        let result = classifier.classify("local test gpiozero led", &named_from_prompt);
        assert_eq!(result.target, Target::RemotePrimary);
        assert_eq!(result.rule, "code_primary_references");
    }

    #[test]
    fn test_code_beats_prompt() {
        let classifier = TargetClassifier::default();
        let result = classifier.classify(
            "run this locally",
            &block("blink.py", "from gpiozero import LED\nLED(17).on()"),
        );
        assert_eq!(result.target, Target::RemotePrimary);
        assert_eq!(result.rule, "code_primary_references");
    }

    #[test]
    fn test_stm32_code() {
        let classifier = TargetClassifier::default();
        let result = classifier.classify(
            "blink",
            &block("main.c", "#include \"stm32f4xx_hal.h\"\nHAL_GPIO_TogglePin(GPIOA, GPIO_PIN_5);"),
        );
        assert_eq!(result.target, Target::RemoteSecondary);
        assert_eq!(result.rule, "code_secondary_references");
    }

    #[test]
    fn test_prompt_keywords() {
        let classifier = TargetClassifier::default();
        let plain = block("a.py", "print(1)");
        assert_eq!(
            classifier.classify("read a sensor on the pi5", &plain).target,
            Target::RemotePrimary
        );
        assert_eq!(
            classifier.classify("write firmware for my STM32", &plain).target,
            Target::RemoteSecondary
        );
        let local = classifier.classify("write a fizzbuzz for local", &plain);
        assert_eq!(local.target, Target::Local);
        assert_eq!(local.rule, "prompt_local_keywords");
    }

    #[test]
    fn test_primary_prompt_keyword_beats_local_keyword() {
        let classifier = TargetClassifier::default();
        let result = classifier.classify("copy the local file to the raspberry pi", &block("a.py", "x = 1"));
        assert_eq!(result.target, Target::RemotePrimary);
    }

    #[test]
    fn test_default_local() {
        let classifier = TargetClassifier::default();
        let result = classifier.classify("sort a list of numbers", &block("sort.py", "print(sorted([3, 1]))"));
        assert_eq!(result.target, Target::Local);
        assert_eq!(result.rule, DEFAULT_RULE);
    }

    #[test]
    fn test_classify_prompt() {
        let classifier = TargetClassifier::default();
        assert_eq!(
            classifier.classify_prompt("blink an led over gpio").target,
            Target::RemotePrimary
        );
        assert_eq!(classifier.classify_prompt("sum two numbers").rule, DEFAULT_RULE);
    }
}
