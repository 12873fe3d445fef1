//! Reading recordings back as step trees

use crate::error::RecordingError;
use crate::recorder::StepEvent;
use crate::step::ROOT_STEP_ID;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Deepest nesting kept under one root; deeper steps start a new root
pub const MAX_STEP_DEPTH: usize = 256;

/// Load every event of a JSON-lines recording, skipping blank lines
///
/// # Errors
/// - [`RecordingError::Io`] if the file cannot be read
/// - [`RecordingError::MalformedLine`] for a line that is not a step event
pub fn read_recording(path: &Path) -> Result<Vec<StepEvent>, RecordingError> {
    let reader = BufReader::new(File::open(path)?);
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event = serde_json::from_str(&line).map_err(|source| RecordingError::MalformedLine {
            path: path.to_path_buf(),
            line: index + 1,
            source,
        })?;
        events.push(event);
    }
    Ok(events)
}

/// Completed step with its nested steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepNode {
    /// The step itself
    pub event: StepEvent,
    /// Steps started while this one was innermost, by sequence id
    pub children: Vec<StepNode>,
}

/// Call tree reconstructed from parent linkage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepTree {
    roots: Vec<StepNode>,
}

impl StepTree {
    /// Link events by parent sequence id
    ///
    /// Steps whose parent is the root sentinel or absent from `events`
    /// (for example cut off by a recording window) become roots. Steps that
    /// cannot be reached from the root, because their parent links form a
    /// cycle or the chain nests deeper than [`MAX_STEP_DEPTH`], are promoted
    /// to roots after the reachable ones.
    #[must_use]
    pub fn build(events: Vec<StepEvent>) -> Self {
        let known: BTreeSet<u64> = events.iter().map(|e| e.sequence_id).collect();
        let mut by_parent: BTreeMap<u64, Vec<StepEvent>> = BTreeMap::new();
        for event in events {
            let parent = if known.contains(&event.parent_sequence_id) {
                event.parent_sequence_id
            } else {
                ROOT_STEP_ID
            };
            by_parent.entry(parent).or_default().push(event);
        }
        for siblings in by_parent.values_mut() {
            siblings.sort_by_key(|e| e.sequence_id);
        }

        let mut roots = attach(ROOT_STEP_ID, 0, &mut by_parent);
        let mut promoted = 0_usize;
        while let Some(event) = take_lowest(&mut by_parent) {
            let children = attach(event.sequence_id, 1, &mut by_parent);
            roots.push(StepNode { event, children });
            promoted += 1;
        }
        if promoted > 0 {
            tracing::warn!(promoted, "steps unreachable from the root were promoted to top level");
        }
        Self { roots }
    }

    /// Top-level steps
    #[inline]
    #[must_use]
    pub fn roots(&self) -> &[StepNode] {
        &self.roots
    }

    /// Number of steps in the tree
    #[must_use]
    pub fn len(&self) -> usize {
        fn count(nodes: &[StepNode]) -> usize {
            nodes.iter().map(|n| 1 + count(&n.children)).sum()
        }
        count(&self.roots)
    }

    /// Check if the tree has no steps
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Indented text rendering, one step per line
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for root in &self.roots {
            render_node(root, 0, &mut out);
        }
        out
    }
}

fn attach(parent: u64, depth: usize, by_parent: &mut BTreeMap<u64, Vec<StepEvent>>) -> Vec<StepNode> {
    if depth >= MAX_STEP_DEPTH {
        return Vec::new();
    }
    by_parent
        .remove(&parent)
        .unwrap_or_default()
        .into_iter()
        .map(|event| {
            let children = attach(event.sequence_id, depth + 1, by_parent);
            StepNode { event, children }
        })
        .collect()
}

/// Remove the leftover event with the lowest sequence id
fn take_lowest(by_parent: &mut BTreeMap<u64, Vec<StepEvent>>) -> Option<StepEvent> {
    let parent = by_parent
        .iter()
        .filter_map(|(parent, siblings)| siblings.first().map(|e| (e.sequence_id, *parent)))
        .min()
        .map(|(_, parent)| parent)?;
    let siblings = by_parent.get_mut(&parent)?;
    let event = siblings.remove(0);
    if siblings.is_empty() {
        by_parent.remove(&parent);
    }
    Some(event)
}

fn render_node(node: &StepNode, depth: usize, out: &mut String) {
    let event = &node.event;
    #[allow(clippy::cast_precision_loss)]
    let millis = event.duration_us as f64 / 1_000.0;
    let _ = write!(
        out,
        "{:indent$}{} #{} {:.3}ms",
        "",
        event.name,
        event.sequence_id,
        millis,
        indent = depth * 2
    );
    if event.tags != "[]" {
        let _ = write!(out, " {}", event.tags);
    }
    out.push('\n');
    for child in &node.children {
        render_node(child, depth + 1, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::STEP_EVENT_NAME;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn event(sequence_id: u64, parent: u64, name: &str, tags: &str) -> StepEvent {
        StepEvent {
            event_name: STEP_EVENT_NAME.to_string(),
            sequence_id,
            parent_sequence_id: parent,
            name: name.to_string(),
            tags: tags.to_string(),
            start_time: Utc::now(),
            duration_us: 2_000,
        }
    }

    #[test]
    fn builds_nested_tree_in_sequence_order() {
        // commit order is child-first
        let tree = StepTree::build(vec![
            event(2, 1, "app.init.beans", "[]"),
            event(3, 1, "app.init.env", "[]"),
            event(1, 0, "app.init", "[count=42]"),
        ]);

        assert_eq!(tree.len(), 3);
        assert_eq!(tree.roots().len(), 1);
        let names: Vec<&str> = tree.roots()[0]
            .children
            .iter()
            .map(|n| n.event.name.as_str())
            .collect();
        assert_eq!(names, vec!["app.init.beans", "app.init.env"]);
        assert_eq!(
            tree.render(),
            "app.init #1 2.000ms [count=42]\n  app.init.beans #2 2.000ms\n  app.init.env #3 2.000ms\n"
        );
    }

    #[test]
    fn orphans_become_roots() {
        let tree = StepTree::build(vec![event(5, 4, "late.step", "[]")]);
        assert_eq!(tree.roots().len(), 1);
        assert_eq!(tree.roots()[0].event.sequence_id, 5);
    }

    #[test]
    fn reads_recording_and_reports_bad_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let line = serde_json::to_string(&event(1, 0, "app.init", "[]")).unwrap();
        writeln!(file, "{line}").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "not json").unwrap();

        let err = read_recording(file.path()).unwrap_err();
        assert!(matches!(err, RecordingError::MalformedLine { line: 3, .. }));
    }

    #[test]
    fn unreachable_steps_are_promoted_to_roots() {
        let tree = StepTree::build(vec![
            event(1, 0, "app.init", "[]"),
            event(7, 7, "self.parented", "[]"),
            event(8, 9, "cycle.a", "[]"),
            event(9, 8, "cycle.b", "[]"),
        ]);

        assert_eq!(tree.len(), 4);
        let roots: Vec<u64> = tree.roots().iter().map(|n| n.event.sequence_id).collect();
        assert_eq!(roots, vec![1, 7, 8]);
        assert_eq!(
            tree.render(),
            "app.init #1 2.000ms\nself.parented #7 2.000ms\ncycle.a #8 2.000ms\n  cycle.b #9 2.000ms\n"
        );
    }

    #[test]
    fn long_chains_are_split_at_max_depth() {
        let count = 10_000_u64;
        let events = (1..=count).map(|id| event(id, id - 1, "nested", "[]")).collect();
        let tree = StepTree::build(events);

        assert_eq!(tree.len(), 10_000);
        assert_eq!(tree.render().lines().count(), 10_000);
        assert_eq!(tree.roots().len(), 40);
        assert_eq!(tree.roots()[1].event.sequence_id, MAX_STEP_DEPTH as u64 + 1);
    }
}
