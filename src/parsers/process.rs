//! Thread table produced by `ps -eLo pid,comm`.

use tracing::debug;

/// One row of the thread table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub comm: String,
}

/// Parse the table, skipping the header row and anything that does not start
/// with a numeric pid.
pub fn parse_process_table(text: &str) -> Vec<ProcessEntry> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|line| {
            let (pid, comm) = line.split_once(char::is_whitespace)?;
            match pid.parse::<u32>() {
                Ok(pid) => Some(ProcessEntry {
                    pid,
                    comm: comm.trim().to_string(),
                }),
                Err(_) => {
                    debug!("skipping process table row: {}", line);
                    None
                }
            }
        })
        .collect()
}

/// Process ids owning a thread named in `names`, deduplicated, in table order.
pub fn find_pids<S: AsRef<str>>(entries: &[ProcessEntry], names: &[S]) -> Vec<u32> {
    let mut pids = Vec::new();
    for entry in entries {
        if names.iter().any(|n| n.as_ref() == entry.comm) && !pids.contains(&entry.pid) {
            pids.push(entry.pid);
        }
    }
    pids
}
