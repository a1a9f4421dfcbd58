//! Acceptance tests: state probes and the pure evaluators that judge them.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AcceptanceSettings;
use super::intent::{Intent, classify_intent, named_files, output_file, target_keywords};
use super::process_list::{PS_COMMAND, ProcessFilter, ProcessInfo, parse_ps};
use crate::domain::AcceptanceReport;
use crate::error::Result;
use crate::exec::snapshot::remote_dir_arg;
use crate::exec::{DirSnapshot, Shell, shell_quote};

/// A predicate over the state before and after execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AcceptanceTest {
    /// Processes matching `keywords` before the run are gone after it
    ProcessesKilled { keywords: Vec<String> },
    /// `path` stops growing once the run is over
    FileStable { path: String },
    /// Every file in `files` that existed before is gone after
    FilesDeleted { files: Vec<String> },
    /// A new file appears in the work directory
    FileCreated,
}

impl AcceptanceTest {
    pub fn name(&self) -> String {
        match self {
            AcceptanceTest::ProcessesKilled { keywords } => {
                format!("Target processes matching {:?} are killed", keywords)
            }
            AcceptanceTest::FileStable { .. } => {
                "Output file stopped growing (process no longer writing)".to_string()
            }
            AcceptanceTest::FilesDeleted { files } => format!("Files {:?} are deleted", files),
            AcceptanceTest::FileCreated => "New output file(s) created".to_string(),
        }
    }
}

/// State captured by one probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateSnapshot {
    Processes(Vec<ProcessInfo>),
    /// Size of each named file; `None` when absent
    Files(BTreeMap<String, Option<u64>>),
    Listing(DirSnapshot),
    /// Probe needs no pre-state
    Empty,
}

/// Tests implied by the prompt's intent.
pub fn tests_for(prompt: &str, settings: &AcceptanceSettings) -> Vec<AcceptanceTest> {
    match classify_intent(prompt) {
        Intent::KillProcess => vec![
            AcceptanceTest::ProcessesKilled {
                keywords: target_keywords(prompt),
            },
            AcceptanceTest::FileStable {
                path: output_file(prompt).unwrap_or_else(|| settings.stability_file.clone()),
            },
        ],
        Intent::DeleteFile => {
            let files = named_files(prompt);
            if files.is_empty() {
                log::info!("Delete task names no files, no acceptance test generated");
                Vec::new()
            } else {
                vec![AcceptanceTest::FilesDeleted { files }]
            }
        }
        Intent::CreateFile => vec![AcceptanceTest::FileCreated],
        Intent::None => Vec::new(),
    }
}

/// Runs probes through a shell, rooted at a work directory.
pub struct Prober<'a> {
    shell: &'a dyn Shell,
    work_dir: &'a str,
    settings: &'a AcceptanceSettings,
}

impl<'a> Prober<'a> {
    pub fn new(shell: &'a dyn Shell, work_dir: &'a str, settings: &'a AcceptanceSettings) -> Self {
        Self {
            shell,
            work_dir,
            settings,
        }
    }

    fn in_work_dir(&self, command: &str) -> String {
        format!("cd {} 2>/dev/null; {}", remote_dir_arg(self.work_dir), command)
    }

    async fn processes(&self) -> Result<Vec<ProcessInfo>> {
        let out = self.shell.run(PS_COMMAND, self.settings.probe_timeout()).await?;
        Ok(parse_ps(&out.stdout))
    }

    async fn file_sizes(&self, files: &[String]) -> Result<BTreeMap<String, Option<u64>>> {
        let quoted: Vec<String> = files.iter().map(|f| remote_dir_arg(f)).collect();
        let command = self.in_work_dir(&format!(
            "stat -c '%n\t%s' -- {} 2>/dev/null; true",
            quoted.join(" ")
        ));
        let out = self.shell.run(&command, self.settings.probe_timeout()).await?;
        let found: BTreeMap<String, u64> = out
            .stdout
            .lines()
            .filter_map(|line| {
                let (name, size) = line.rsplit_once('\t')?;
                Some((name.to_string(), size.trim().parse().ok()?))
            })
            .collect();
        Ok(files
            .iter()
            .map(|f| {
                let size = found
                    .iter()
                    .find(|(name, _)| name.as_str() == f || name.ends_with(f.trim_start_matches("~/")))
                    .map(|(_, size)| *size);
                (f.clone(), size)
            })
            .collect())
    }

    /// Sample the size of `path` twice, `stability_delay` apart.
    async fn growth(&self, path: &str) -> Result<(Option<u64>, Option<u64>)> {
        let stat = format!("stat -c '%s' {} 2>/dev/null || echo MISSING", shell_quote(path));
        let command = self.in_work_dir(&format!(
            "{}; sleep {}; {}",
            stat, self.settings.stability_delay_secs, stat
        ));
        let timeout = self.settings.probe_timeout() + Duration::from_secs(self.settings.stability_delay_secs);
        let out = self.shell.run(&command, timeout).await?;
        let mut samples = out.stdout.lines().map(|l| l.trim().parse::<u64>().ok());
        Ok((samples.next().flatten(), samples.next().flatten()))
    }

    /// Capture pre-execution state for every test.
    pub async fn capture(&self, tests: &[AcceptanceTest]) -> Result<Vec<StateSnapshot>> {
        let mut snapshots = Vec::with_capacity(tests.len());
        for test in tests {
            let snapshot = match test {
                AcceptanceTest::ProcessesKilled { .. } => StateSnapshot::Processes(self.processes().await?),
                AcceptanceTest::FileStable { .. } => StateSnapshot::Empty,
                AcceptanceTest::FilesDeleted { files } => StateSnapshot::Files(self.file_sizes(files).await?),
                AcceptanceTest::FileCreated => StateSnapshot::Listing(self.shell.list_dir(self.work_dir).await?),
            };
            snapshots.push(snapshot);
        }
        Ok(snapshots)
    }

    /// Capture post-execution state and judge every test against `pre`.
    ///
    /// `ignore` lists files the harness itself placed in the work directory.
    pub async fn evaluate(
        &self,
        tests: &[AcceptanceTest],
        pre: &[StateSnapshot],
        ignore: &[String],
    ) -> Result<Vec<AcceptanceReport>> {
        let mut reports = Vec::with_capacity(tests.len());
        for (test, before) in tests.iter().zip(pre) {
            let report = match (test, before) {
                (AcceptanceTest::ProcessesKilled { keywords }, StateSnapshot::Processes(before)) => {
                    let after = self.processes().await?;
                    eval_processes_killed(&test.name(), before, &after, keywords, &self.settings.process_filter())
                }
                (AcceptanceTest::FileStable { path }, _) => {
                    let (first, second) = self.growth(path).await?;
                    eval_file_stable(&test.name(), path, first, second)
                }
                (AcceptanceTest::FilesDeleted { files }, StateSnapshot::Files(before)) => {
                    let after = self.file_sizes(files).await?;
                    eval_files_deleted(&test.name(), before, &after)
                }
                (AcceptanceTest::FileCreated, StateSnapshot::Listing(before)) => {
                    let after = self.shell.list_dir(self.work_dir).await?;
                    eval_file_created(&test.name(), before, &after, ignore)
                }
                _ => AcceptanceReport::fail(test.name(), "pre-state snapshot missing or of the wrong kind"),
            };
            log::info!(
                "Acceptance '{}': {} ({})",
                report.name,
                if report.passed { "PASS" } else { "FAIL" },
                report.reason
            );
            reports.push(report);
        }
        Ok(reports)
    }
}

fn pid_list(procs: &[&ProcessInfo]) -> String {
    procs.iter().map(|p| p.pid.to_string()).collect::<Vec<_>>().join(", ")
}

/// Pass when every matching, user-owned process from before is gone after.
///
/// Processes the filter rejects or that match no keyword are left out of
/// the comparison entirely.
pub fn eval_processes_killed(
    name: &str,
    before: &[ProcessInfo],
    after: &[ProcessInfo],
    keywords: &[String],
    filter: &ProcessFilter,
) -> AcceptanceReport {
    let eligible = |p: &&ProcessInfo| filter.eligible(p);
    let (targets, others): (Vec<&ProcessInfo>, Vec<&ProcessInfo>) =
        before.iter().partition(|p| eligible(p) && p.matches_any(keywords));
    let after_pids: BTreeSet<u32> = after.iter().map(|p| p.pid).collect();

    if targets.is_empty() {
        let before_pids: BTreeSet<u32> = before.iter().map(|p| p.pid).collect();
        let fresh: Vec<&ProcessInfo> = after
            .iter()
            .filter(|p| !before_pids.contains(&p.pid) && eligible(p) && p.matches_any(keywords))
            .collect();
        if !fresh.is_empty() {
            return AcceptanceReport::fail(
                name,
                format!(
                    "No matching processes found in pre-state, but NEW matching processes appeared in post-state (code may have launched them). New PIDs: [{}]",
                    pid_list(&fresh)
                ),
            )
            .with_evidence("new_matching", describe(&fresh));
        }
        return AcceptanceReport::pass(
            name,
            "No matching processes found in pre-state (already dead or never existed).",
        )
        .with_evidence("pre_non_targets_ignored", others.len().to_string());
    }

    let surviving: Vec<&ProcessInfo> = targets
        .iter()
        .copied()
        .filter(|p| after_pids.contains(&p.pid))
        .collect();

    if surviving.is_empty() {
        AcceptanceReport::pass(
            name,
            format!(
                "All {} target process(es) killed successfully. Ignored {} non-matching system process(es).",
                targets.len(),
                others.len()
            ),
        )
        .with_evidence("pre_targets", describe(&targets))
        .with_evidence("pre_non_targets_ignored", others.len().to_string())
    } else {
        AcceptanceReport::fail(
            name,
            format!(
                "{}/{} target process(es) still alive after execution. Surviving PIDs: [{}]",
                surviving.len(),
                targets.len(),
                pid_list(&surviving)
            ),
        )
        .with_evidence("pre_targets", describe(&targets))
        .with_evidence("post_surviving", describe(&surviving))
    }
}

fn describe(procs: &[&ProcessInfo]) -> String {
    procs
        .iter()
        .map(|p| format!("{} ({}): {}", p.pid, p.user, p.args))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Pass unless both samples exist and differ.
pub fn eval_file_stable(name: &str, path: &str, first: Option<u64>, second: Option<u64>) -> AcceptanceReport {
    match (first, second) {
        (Some(a), Some(b)) if a != b => AcceptanceReport::fail(
            name,
            format!("File {} is STILL GROWING ({} -> {} bytes). Process is still alive!", path, a, b),
        )
        .with_evidence("size1", a.to_string())
        .with_evidence("size2", b.to_string()),
        (Some(a), Some(_)) => AcceptanceReport::pass(
            name,
            format!("File {} stopped growing (size stable at {} bytes). Process is dead.", path, a),
        ),
        _ => AcceptanceReport::pass(
            name,
            format!("File {} not found or unreadable (process likely dead).", path),
        ),
    }
}

/// Pass when every named file that existed before is absent after.
pub fn eval_files_deleted(
    name: &str,
    before: &BTreeMap<String, Option<u64>>,
    after: &BTreeMap<String, Option<u64>>,
) -> AcceptanceReport {
    let existed: Vec<&String> = before.iter().filter(|(_, s)| s.is_some()).map(|(f, _)| f).collect();
    if existed.is_empty() {
        return AcceptanceReport::pass(name, "None of the named files existed before execution.")
            .with_evidence("checked", before.keys().cloned().collect::<Vec<_>>().join(", "));
    }
    let remaining: Vec<&String> = existed
        .iter()
        .copied()
        .filter(|f| after.get(*f).copied().flatten().is_some())
        .collect();
    if remaining.is_empty() {
        AcceptanceReport::pass(name, format!("All {} named file(s) were deleted.", existed.len()))
    } else {
        AcceptanceReport::fail(
            name,
            format!(
                "{}/{} file(s) still present after execution: {}",
                remaining.len(),
                existed.len(),
                remaining.iter().map(|f| f.as_str()).collect::<Vec<_>>().join(", ")
            ),
        )
        .with_evidence("still_present", remaining.iter().map(|f| f.as_str()).collect::<Vec<_>>().join(", "))
    }
}

/// Pass when a file other than the ones in `ignore` appeared.
pub fn eval_file_created(
    name: &str,
    before: &DirSnapshot,
    after: &DirSnapshot,
    ignore: &[String],
) -> AcceptanceReport {
    let created: Vec<String> = after
        .added_since(before)
        .into_iter()
        .filter(|f| !ignore.contains(f))
        .collect();
    if created.is_empty() {
        AcceptanceReport::fail(name, "No new files were created.")
            .with_evidence("files_before", before.len().to_string())
            .with_evidence("files_after", after.len().to_string())
    } else {
        AcceptanceReport::pass(name, format!("New file(s) created: {}", created.join(", ")))
            .with_evidence("new_files", created.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ShellOutput;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn proc(pid: u32, user: &str, args: &str) -> ProcessInfo {
        ProcessInfo {
            pid,
            user: user.to_string(),
            args: args.to_string(),
        }
    }

    fn owners() -> ProcessFilter {
        AcceptanceSettings::default().process_filter()
    }

    fn keywords() -> Vec<String> {
        vec!["counter".to_string()]
    }

    #[test]
    fn test_kill_passes_and_ignores_unrelated_system_process() {
        let before = vec![
            proc(1, "root", "/sbin/init"),
            proc(300, "root", "python3 /usr/lib/counter-daemon.py"),
            proc(410, "pi", "wayvnc --gpu"),
            proc(812, "pi", "python3 counter.py"),
        ];
        let after = vec![
            proc(1, "root", "/sbin/init"),
            proc(300, "root", "python3 /usr/lib/counter-daemon.py"),
            proc(410, "pi", "wayvnc --gpu"),
        ];
        let report = eval_processes_killed("kill", &before, &after, &keywords(), &owners());
        assert!(report.passed, "{}", report.reason);
        assert!(report.reason.starts_with("All 1 target process(es) killed successfully."));
    }

    #[test]
    fn test_kill_fails_while_target_alive() {
        let before = vec![proc(812, "pi", "python3 counter.py"), proc(813, "pi", "python3 counter.py")];
        let after = vec![proc(813, "pi", "python3 counter.py")];
        let report = eval_processes_killed("kill", &before, &after, &keywords(), &owners());
        assert!(!report.passed);
        assert!(report.reason.starts_with("1/2 target process(es) still alive"));
        assert!(report.reason.contains("813"));
    }

    #[test]
    fn test_kill_without_targets_fails_on_new_matching_process() {
        let before = vec![proc(1, "root", "/sbin/init")];
        let after = vec![proc(1, "root", "/sbin/init"), proc(900, "pi", "python3 counter.py")];
        let report = eval_processes_killed("kill", &before, &after, &keywords(), &owners());
        assert!(!report.passed);
        assert!(report.reason.contains("900"));
    }

    #[test]
    fn test_kill_without_targets_passes() {
        let before = vec![proc(1, "root", "/sbin/init")];
        let report = eval_processes_killed("kill", &before, &before, &keywords(), &owners());
        assert!(report.passed);
    }

    #[test]
    fn test_file_stable() {
        assert!(!eval_file_stable("s", "log.txt", Some(10), Some(40)).passed);
        assert!(eval_file_stable("s", "log.txt", Some(10), Some(10)).passed);
        assert!(eval_file_stable("s", "log.txt", None, None).passed);
        let growing = eval_file_stable("s", "log.txt", Some(1), Some(2));
        assert_eq!(growing.reason, "File log.txt is STILL GROWING (1 -> 2 bytes). Process is still alive!");
    }

    #[test]
    fn test_files_deleted() {
        let before: BTreeMap<_, _> = [("a.txt".to_string(), Some(3)), ("b.txt".to_string(), None)].into();
        let gone: BTreeMap<_, _> = [("a.txt".to_string(), None), ("b.txt".to_string(), None)].into();
        let kept: BTreeMap<_, _> = [("a.txt".to_string(), Some(3)), ("b.txt".to_string(), None)].into();
        assert!(eval_files_deleted("d", &before, &gone).passed);
        assert!(!eval_files_deleted("d", &before, &kept).passed);
    }

    #[test]
    fn test_file_created_ignores_harness_files() {
        let before = DirSnapshot::parse_listing("old.txt\t1\t1\n");
        let after = DirSnapshot::parse_listing("old.txt\t1\t1\nwriter.py\t2\t10\n");
        assert!(!eval_file_created("c", &before, &after, &["writer.py".to_string()]).passed);

        let after = DirSnapshot::parse_listing("old.txt\t1\t1\nwriter.py\t2\t10\nout.txt\t3\t5\n");
        let report = eval_file_created("c", &before, &after, &["writer.py".to_string()]);
        assert!(report.passed);
        assert_eq!(report.reason, "New file(s) created: out.txt");
    }

    #[test]
    fn test_tests_for_prompt() {
        let settings = AcceptanceSettings::default();
        let tests = tests_for("kill the infinite counter", &settings);
        assert_eq!(tests.len(), 2);
        assert!(matches!(tests[1], AcceptanceTest::FileStable { ref path } if path == "counter_log.txt"));
        assert!(tests_for("write a fizzbuzz for local", &settings).is_empty());
        assert!(tests_for("delete everything", &settings).is_empty());
        assert_eq!(
            tests_for("delete old.txt", &settings),
            vec![AcceptanceTest::FilesDeleted {
                files: vec!["old.txt".to_string()]
            }]
        );
    }

    /// Shell replaying canned `ps` output, one entry per call.
    struct PsReplay {
        outputs: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Shell for PsReplay {
        async fn run(&self, _command: &str, _timeout: Duration) -> Result<ShellOutput> {
            let mut outputs = self.outputs.lock().unwrap();
            let stdout = if outputs.is_empty() { String::new() } else { outputs.remove(0) };
            Ok(ShellOutput {
                exit_code: Some(0),
                stdout,
                ..Default::default()
            })
        }

        fn describe(&self) -> String {
            "replay".into()
        }
    }

    #[tokio::test]
    async fn test_prober_kill_round_trip() {
        let shell = PsReplay {
            outputs: Mutex::new(vec![
                "  1 root /sbin/init\n 812 pi python3 counter.py\n".to_string(),
                "  1 root /sbin/init\n".to_string(),
            ]),
        };
        let settings = AcceptanceSettings::default();
        let prober = Prober::new(&shell, "~/Documents", &settings);
        let tests = vec![AcceptanceTest::ProcessesKilled { keywords: keywords() }];
        let pre = prober.capture(&tests).await.unwrap();
        let reports = prober.evaluate(&tests, &pre, &[]).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].passed);
    }
}
