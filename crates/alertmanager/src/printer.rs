//! Human-readable summary for process violations.

use std::collections::BTreeSet;

use crate::types::ProcessViolation;

/// Re-renders `violation.message` from its current set of processes.
///
/// Examples:
/// - `Binary '/usr/bin/apt-get' executed with arguments 'install curl' under user ID 0`
/// - `Binaries '/bin/sh' and '/usr/bin/curl' executed with 2 different arguments under user ID 0`
pub fn update_process_violation_message(violation: &mut ProcessViolation) {
    if violation.processes.is_empty() {
        violation.message.clear();
        return;
    }

    let mut paths = BTreeSet::new();
    let mut args = BTreeSet::new();
    let mut uids = BTreeSet::new();
    for process in &violation.processes {
        paths.insert(process.signal.exec_file_path.as_str());
        if !process.signal.args.is_empty() {
            args.insert(process.signal.args.as_str());
        }
        uids.insert(process.signal.uid);
    }

    let mut message = if paths.len() == 1 {
        format!("Binary {} executed", quoted_sentence(&paths))
    } else {
        format!("Binaries {} executed", quoted_sentence(&paths))
    };

    match args.len() {
        0 => message.push_str(" without arguments"),
        1 => {
            if let Some(only) = args.first() {
                message.push_str(&format!(" with arguments '{only}'"));
            }
        }
        n => message.push_str(&format!(" with {n} different arguments")),
    }

    match uids.len() {
        1 => {
            if let Some(uid) = uids.first() {
                message.push_str(&format!(" under user ID {uid}"));
            }
        }
        n => message.push_str(&format!(" under {n} different user IDs")),
    }

    violation.message = message;
}

/// Joins sorted items as `'a'`, `'a' and 'b'` or `'a', 'b' and 'c'`.
fn quoted_sentence(items: &BTreeSet<&str>) -> String {
    let quoted: Vec<String> = items.iter().map(|item| format!("'{item}'")).collect();
    match quoted.split_last() {
        None => String::new(),
        Some((last, [])) => last.clone(),
        Some((last, rest)) => format!("{} and {last}", rest.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProcessIndicator;
    use chrono::Utc;

    #[test]
    fn test_single_binary_with_arguments() {
        let violation =
            ProcessViolation::new(vec![ProcessIndicator::new("apt-get", Utc::now())
                .with_args("install curl")]);
        assert_eq!(
            violation.message,
            "Binary '/usr/bin/apt-get' executed with arguments 'install curl' under user ID 0"
        );
    }

    #[test]
    fn test_single_binary_without_arguments() {
        let violation = ProcessViolation::new(vec![ProcessIndicator::new("sh", Utc::now())]);
        assert_eq!(
            violation.message,
            "Binary '/usr/bin/sh' executed without arguments under user ID 0"
        );
    }

    #[test]
    fn test_many_binaries_are_sorted_into_a_sentence() {
        let now = Utc::now();
        let mut root = ProcessIndicator::new("wget", now).with_args("-q http://x");
        root.signal.uid = 1000;
        let violation = ProcessViolation::new(vec![
            root,
            ProcessIndicator::new("curl", now).with_args("-s http://y"),
            ProcessIndicator::new("apt-get", now),
        ]);
        assert_eq!(
            violation.message,
            "Binaries '/usr/bin/apt-get', '/usr/bin/curl' and '/usr/bin/wget' executed \
             with 2 different arguments under 2 different user IDs"
        );
    }

    #[test]
    fn test_same_binary_twice_is_singular() {
        let now = Utc::now();
        let violation = ProcessViolation::new(vec![
            ProcessIndicator::new("apt-get", now),
            ProcessIndicator::new("apt-get", now + chrono::Duration::seconds(5)),
        ]);
        assert!(violation.message.starts_with("Binary '/usr/bin/apt-get' executed"));
    }

    #[test]
    fn test_empty_processes_clear_message() {
        let mut violation = ProcessViolation {
            message: "stale".to_string(),
            processes: vec![],
        };
        update_process_violation_message(&mut violation);
        assert!(violation.message.is_empty());
    }
}
