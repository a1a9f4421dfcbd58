//! Process table snapshots.

use serde::{Deserialize, Serialize};

/// Lists every process as `PID USER ARGS`, without headers.
pub const PS_COMMAND: &str = "ps -eo pid=,user=,args=";

/// Fragment that identifies the probe itself in the process table.
const PROBE_MARK: &str = "pid=,user=,args=";

/// One row of the process table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub user: String,
    pub args: String,
}

impl ProcessInfo {
    /// Case-insensitive match of any keyword against the command line.
    pub fn matches_any(&self, keywords: &[String]) -> bool {
        let args = self.args.to_lowercase();
        keywords.iter().any(|k| args.contains(&k.to_lowercase()))
    }
}

/// Which processes a kill check may consider at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessFilter {
    /// System and daemon accounts
    pub ignored_owners: Vec<String>,
    /// Command-line fragments of processes never treated as targets
    pub ignored_commands: Vec<String>,
}

impl ProcessFilter {
    pub fn eligible(&self, process: &ProcessInfo) -> bool {
        !self.ignored_owners.iter().any(|o| o == &process.user)
            && !self.ignored_commands.iter().any(|c| process.args.contains(c.as_str()))
    }
}

/// Parse `ps -eo pid=,user=,args=` output, dropping the probe's own rows.
pub fn parse_ps(output: &str) -> Vec<ProcessInfo> {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let (pid, rest) = line.split_once(char::is_whitespace)?;
            let pid = pid.parse().ok()?;
            let rest = rest.trim_start();
            let (user, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            Some(ProcessInfo {
                pid,
                user: user.to_string(),
                args: args.trim().to_string(),
            })
        })
        .filter(|p| !p.args.contains(PROBE_MARK))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ps() {
        let out = "    1 root     /sbin/init splash\n  812 pi       python3 counter.py\n 9001 pi       ps -eo pid=,user=,args=\n   77 avahi    avahi-daemon: running\n";
        let procs = parse_ps(out);
        assert_eq!(procs.len(), 3);
        assert_eq!(procs[1].pid, 812);
        assert_eq!(procs[1].user, "pi");
        assert_eq!(procs[1].args, "python3 counter.py");
        assert!(procs.iter().all(|p| p.pid != 9001));
    }

    #[test]
    fn test_parse_ps_skips_garbage() {
        assert!(parse_ps("PID USER ARGS\n\nnot a row").is_empty());
    }

    #[test]
    fn test_filter() {
        let filter = ProcessFilter {
            ignored_owners: vec!["root".into()],
            ignored_commands: vec!["verifybot".into()],
        };
        let own = ProcessInfo {
            pid: 3,
            user: "pi".into(),
            args: "verifybot run kill the counter".into(),
        };
        let daemon = ProcessInfo {
            pid: 4,
            user: "root".into(),
            args: "python3 counter.py".into(),
        };
        let target = ProcessInfo {
            pid: 5,
            user: "pi".into(),
            args: "python3 counter.py".into(),
        };
        assert!(!filter.eligible(&own));
        assert!(!filter.eligible(&daemon));
        assert!(filter.eligible(&target));
    }

    #[test]
    fn test_matches_any() {
        let p = ProcessInfo {
            pid: 5,
            user: "pi".into(),
            args: "python3 /home/pi/Infinite_Counter.py".into(),
        };
        assert!(p.matches_any(&["infinite_counter".to_string()]));
        assert!(!p.matches_any(&["loop".to_string()]));
    }
}
