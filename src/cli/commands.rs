//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: send a task, execute the code, check it, retry
//! - extract: offline extraction of a saved response
//! - login: open the chat page for a manual login

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use verifybot::domain::Target;

/// VerifyBot - generate code in a chat session, run it where it belongs, verify it
#[derive(Parser, Debug)]
#[command(name = "verifybot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a task until its code executes and passes acceptance
    Run(RunArgs),

    /// Extract and classify code blocks from saved responses
    Extract {
        /// Response file, or a glob pattern matching several
        pattern: String,

        /// Task text used for classification and filenames
        #[arg(short, long, default_value = "")]
        prompt: String,

        /// Force every block onto this target
        #[arg(short, long)]
        target: Option<Target>,
    },

    /// Open the chat page in a visible browser and wait for a manual login
    Login,
}

/// Arguments for `run`
#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    /// Task description sent to the assistant
    pub task: String,

    /// Force the target (local, raspi, stm32) instead of classifying
    #[arg(short, long)]
    pub target: Option<Target>,

    /// Total attempts, the first one included
    #[arg(short = 'r', long)]
    pub max_retries: Option<u32>,

    /// Run timeout in seconds when the response gives none
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Run the browser without a window
    #[arg(long)]
    pub headless: bool,

    /// Save the extracted code without running it
    #[arg(long)]
    pub no_run: bool,

    /// Work directory on the remote host
    #[arg(long)]
    pub remote_dir: Option<String>,

    /// Local directory for extracted files
    #[arg(short, long)]
    pub dest: Option<PathBuf>,

    /// Install declared dependencies before running
    #[arg(long)]
    pub install_deps: bool,

    /// Replay saved responses instead of opening a browser
    #[arg(long, num_args = 1..)]
    pub replay: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn run_args(args: &[&str]) -> RunArgs {
        let mut argv = vec!["verifybot", "run"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Run(run) => run,
            other => panic!("Expected run command, got {:?}", other),
        }
    }

    #[test]
    fn test_run_minimal() {
        let run = run_args(&["write a fizzbuzz"]);
        assert_eq!(run.task, "write a fizzbuzz");
        assert!(run.target.is_none());
        assert!(run.max_retries.is_none());
        assert!(!run.no_run);
        assert!(run.replay.is_empty());
    }

    #[test]
    fn test_run_all_flags() {
        let run = run_args(&[
            "blink gpio 17",
            "--target",
            "raspi",
            "--max-retries",
            "5",
            "--timeout",
            "60",
            "--headless",
            "--no-run",
            "--remote-dir",
            "~/scratch",
            "--dest",
            "out",
            "--install-deps",
        ]);
        assert_eq!(run.target, Some(Target::RemotePrimary));
        assert_eq!(run.max_retries, Some(5));
        assert_eq!(run.timeout, Some(60));
        assert!(run.headless);
        assert!(run.no_run);
        assert_eq!(run.remote_dir.as_deref(), Some("~/scratch"));
        assert_eq!(run.dest, Some(PathBuf::from("out")));
        assert!(run.install_deps);
    }

    #[test]
    fn test_run_replay_files() {
        let run = run_args(&["task", "--replay", "a.md", "b.md"]);
        assert_eq!(run.replay, vec![PathBuf::from("a.md"), PathBuf::from("b.md")]);
    }

    #[test]
    fn test_bad_target_rejected() {
        assert!(Cli::try_parse_from(["verifybot", "run", "task", "--target", "toaster"]).is_err());
    }

    #[test]
    fn test_extract_command() {
        let cli = Cli::try_parse_from(["verifybot", "extract", "reply.md", "-p", "kill the counter"]).unwrap();
        match cli.command {
            Commands::Extract { pattern, prompt, target } => {
                assert_eq!(pattern, "reply.md");
                assert_eq!(prompt, "kill the counter");
                assert!(target.is_none());
            }
            _ => panic!("Expected extract command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["verifybot", "login", "-v", "-c", "my.yml"]).unwrap();
        assert!(cli.is_verbose());
        assert_eq!(cli.config, Some(PathBuf::from("my.yml")));
        assert!(matches!(cli.command, Commands::Login));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["verifybot"]).is_err());
    }

    #[test]
    fn test_help_works() {
        Cli::command().debug_assert();
    }
}
