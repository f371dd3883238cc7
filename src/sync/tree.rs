use std::collections::HashMap;

use crate::core::task::{self, Priority, Task};
use crate::sync::google_tasks::RemoteTask;

/// Local id of a task mirrored from a remote record.
pub fn local_id(remote_id: &str) -> String {
    format!("g_{}", remote_id)
}

fn to_task(record: &RemoteTask, list_id: &str, account_id: &str) -> Task {
    let title = record
        .title
        .as_deref()
        .filter(|t| !t.is_empty())
        .unwrap_or("Untitled Task");
    let mut task = Task::new(account_id, title);
    task.id = local_id(&record.id);
    task.description = record.notes.clone().filter(|n| !n.is_empty());
    task.priority = Priority::Medium;
    task.completed = record.status == "completed";
    task.due = record.due.as_deref().and_then(task::parse_due);
    task.google_task_id = Some(record.id.clone());
    task.google_task_list_id = Some(list_id.to_string());
    task.google_parent_id = record.parent.clone();
    task
}

/// Assemble flat remote records into a forest.
///
/// Records whose parent is missing become roots, as does one member of any
/// parent cycle, so every record ends up in the result exactly once.
/// Siblings keep the listing order. A repeated remote id keeps its last
/// record.
pub fn build_task_tree(records: &[RemoteTask], list_id: &str, account_id: &str) -> Vec<Task> {
    let mut last: HashMap<&str, usize> = HashMap::with_capacity(records.len());
    for (i, r) in records.iter().enumerate() {
        last.insert(r.id.as_str(), i);
    }
    let nodes: Vec<&RemoteTask> = records
        .iter()
        .enumerate()
        .filter(|(i, r)| last.get(r.id.as_str()) == Some(i))
        .map(|(_, r)| r)
        .collect();
    let index: HashMap<&str, usize> = nodes.iter().enumerate().map(|(i, r)| (r.id.as_str(), i)).collect();

    let mut parent: Vec<Option<usize>> = nodes
        .iter()
        .enumerate()
        .map(|(i, r)| {
            r.parent
                .as_deref()
                .and_then(|p| index.get(p).copied())
                .filter(|&p| p != i)
        })
        .collect();

    // Break cycles: walk each chain, promoting the first revisited node.
    const FRESH: u8 = 0;
    const ON_PATH: u8 = 1;
    const DONE: u8 = 2;
    let mut state = vec![FRESH; nodes.len()];
    for start in 0..nodes.len() {
        let mut path = Vec::new();
        let mut cur = start;
        loop {
            match state[cur] {
                DONE => break,
                ON_PATH => {
                    log::warn!("Parent cycle at remote task {}; treating it as a root", nodes[cur].id);
                    parent[cur] = None;
                    break;
                }
                _ => {}
            }
            state[cur] = ON_PATH;
            path.push(cur);
            match parent[cur] {
                Some(p) => cur = p,
                None => break,
            }
        }
        for n in path {
            state[n] = DONE;
        }
    }

    // Depth of every node along the now-acyclic parent links.
    let mut depth: Vec<Option<usize>> = vec![None; nodes.len()];
    for start in 0..nodes.len() {
        let mut chain = Vec::new();
        let mut cur = Some(start);
        let mut base = 0;
        while let Some(n) = cur {
            if let Some(d) = depth[n] {
                base = d + 1;
                break;
            }
            chain.push(n);
            cur = parent[n];
        }
        for n in chain.into_iter().rev() {
            depth[n] = Some(base);
            base += 1;
        }
    }

    // Attach deepest nodes first so each subtree is complete before it moves.
    let mut built: Vec<Option<Task>> = nodes.iter().map(|r| Some(to_task(r, list_id, account_id))).collect();
    let mut by_depth: Vec<usize> = (0..nodes.len()).collect();
    by_depth.sort_by_key(|&n| std::cmp::Reverse(depth[n].unwrap_or(0)));
    for n in by_depth {
        let Some(p) = parent[n] else { continue };
        if let Some(child) = built[n].take() {
            if let Some(parent_task) = built[p].as_mut() {
                parent_task.sub_tasks.push(child);
            }
        }
    }

    built.into_iter().flatten().collect()
}
