use std::collections::{HashMap, HashSet};
use std::io::{BufRead, Write};
use std::str::FromStr;

use rand_chacha::ChaCha8Rng;

use crate::solver::action_node::ActionNode;
use crate::solver::belief_node::BeliefNode;
use crate::solver::errors::SerializeError;
use crate::solver::ids::{ActionNodeId, BeliefId};
use crate::solver::mappings::actions::{ActionMapping, ActionPool, ChooserBlob, EntryView};
use crate::solver::mappings::observations::{ObservationMapping, ObservationPool};
use crate::solver::tree::BeliefTree;

const HEADER_TAG: &str = "drifttree tree v1";

type ChooserLoader = Box<dyn Fn(&str) -> Option<ChooserBlob>>;

/// Explicit registry of chooser-data loaders, keyed by the tag written in
/// the tree file. Owned by the serializer; loading a tag that was never
/// registered aborts with `SerializeError::UnknownTag`.
#[derive(Default)]
pub struct ChooserRegistry {
    loaders: HashMap<String, ChooserLoader>,
}

impl ChooserRegistry {
    pub fn new() -> Self {
        ChooserRegistry::default()
    }

    pub fn register(
        &mut self,
        tag: impl Into<String>,
        loader: impl Fn(&str) -> Option<ChooserBlob> + 'static,
    ) {
        self.loaders.insert(tag.into(), Box::new(loader));
    }

    fn load(&self, tag: &str, payload: &str, line: usize) -> Result<ChooserBlob, SerializeError> {
        let loader = self.loaders.get(tag).ok_or_else(|| SerializeError::UnknownTag {
            tag: tag.to_string(),
        })?;
        loader(payload).ok_or_else(|| SerializeError::Malformed {
            line,
            reason: format!("chooser loader for '{tag}' rejected its payload"),
        })
    }
}

/// Text persistence for belief trees. Observation and action pools are not
/// written; loading builds mappings from fresh pools and restores their
/// entry statistics.
#[derive(Default)]
pub struct TreeSerializer {
    registry: ChooserRegistry,
}

impl TreeSerializer {
    pub fn new() -> Self {
        TreeSerializer {
            registry: ChooserRegistry::new(),
        }
    }

    pub fn with_registry(registry: ChooserRegistry) -> Self {
        TreeSerializer { registry }
    }

    pub fn registry_mut(&mut self) -> &mut ChooserRegistry {
        &mut self.registry
    }

    /// Write a tree in the line-oriented text format.
    pub fn save_tree<AM, OM, W>(
        &self,
        tree: &BeliefTree<AM, OM>,
        writer: &mut W,
    ) -> Result<(), SerializeError>
    where
        AM: ActionMapping,
        OM: ObservationMapping,
        W: Write,
    {
        writeln!(writer, "{}; root {}", HEADER_TAG, tree.root().index())?;
        for (id, node) in tree.beliefs() {
            self.save_belief(id, node, writer)?;
        }
        for (id, node) in tree.action_nodes() {
            self.save_action_node(id, node, writer)?;
        }
        Ok(())
    }

    fn save_belief<AM, W>(
        &self,
        id: BeliefId,
        node: &BeliefNode<AM>,
        writer: &mut W,
    ) -> Result<(), SerializeError>
    where
        AM: ActionMapping,
        W: Write,
    {
        let parent = match node.parent() {
            Some(p) => p.index().to_string(),
            None => "-".to_string(),
        };
        writeln!(
            writer,
            "BELIEF {}; parent {}; {} particles; {} starting; {} ending; {} tails; tail={}; value={}/{}",
            id.index(),
            parent,
            node.n_particles(),
            node.n_starting_sequences(),
            node.n_ending_sequences(),
            node.tail_count(),
            node.tail_value_total(),
            node.value_total(),
            node.visit_count(),
        )?;

        // Entries worth persisting: visited ones plus unvisited ones that
        // hold a child.
        let visited = node.actions().visited_entries();
        let mut seen: HashSet<AM::Action> = visited.iter().map(|(a, _)| a.clone()).collect();
        let mut entries = visited;
        for (action, view) in node.actions().child_entries() {
            if seen.insert(action.clone()) {
                entries.push((action, view));
            }
        }

        writeln!(
            writer,
            "{} action children; {} visits {{",
            entries.len(),
            node.actions().total_visits()
        )?;
        let mut lines: Vec<String> = entries
            .iter()
            .map(|(action, view)| {
                let child = match view.child {
                    Some(c) => c.index().to_string(),
                    None => "-".to_string(),
                };
                format!(
                    "\t{} -> NODE {}; {} visits; q={}/{}; {}",
                    action,
                    child,
                    view.visits,
                    view.total_q,
                    view.mean_q,
                    if view.legal { "legal" } else { "illegal" },
                )
            })
            .collect();
        lines.sort();
        for line in lines {
            writeln!(writer, "{line}")?;
        }
        if let Some(blob) = node.actions().chooser_blob() {
            writeln!(writer, "\tchooser {} {}", blob.tag, blob.payload)?;
        }
        writeln!(writer, "}}")?;
        Ok(())
    }

    fn save_action_node<OM, W>(
        &self,
        id: ActionNodeId,
        node: &ActionNode<OM>,
        writer: &mut W,
    ) -> Result<(), SerializeError>
    where
        OM: ObservationMapping,
        W: Write,
    {
        writeln!(
            writer,
            "ACTION {}; parent {}; n={}; q={}/{}",
            id.index(),
            node.parent().index(),
            node.n_particles(),
            node.total_q(),
            node.mean_q(),
        )?;
        writeln!(
            writer,
            "{} observation children; {} visits {{",
            node.observations().entries().len(),
            node.observations().total_visits()
        )?;
        let mut lines: Vec<String> = node
            .observations()
            .entries()
            .iter()
            .map(|entry| {
                format!(
                    "\t{} -> NODE {}; {} visits",
                    entry.observation,
                    entry.child.index(),
                    entry.visits
                )
            })
            .collect();
        lines.sort();
        for line in lines {
            writeln!(writer, "{line}")?;
        }
        writeln!(writer, "}}")?;
        Ok(())
    }

    /// Rebuild a tree from the text format, using fresh pools for the
    /// mappings. Particle sets are not persisted; belief statistics carry
    /// the counts.
    pub fn load_tree<AP, OP, R>(
        &self,
        action_pool: &mut AP,
        observation_pool: &mut OP,
        rng: &mut ChaCha8Rng,
        reader: R,
    ) -> Result<BeliefTree<AP::Mapping, OP::Mapping>, SerializeError>
    where
        AP: ActionPool,
        OP: ObservationPool,
        AP::Action: FromStr,
        OP::Observation: FromStr,
        R: BufRead,
    {
        let lines: Vec<String> = reader.lines().collect::<Result<_, _>>()?;
        let mut cursor = 0usize;

        let header = next_line(&lines, &mut cursor)?;
        let root_index = header
            .strip_prefix(HEADER_TAG)
            .and_then(|rest| rest.strip_prefix("; root "))
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .ok_or_else(|| SerializeError::UnknownTag {
                tag: header.split(';').next().unwrap_or("").trim().to_string(),
            })?;

        let mut tree: BeliefTree<AP::Mapping, OP::Mapping> = BeliefTree::empty();

        while cursor < lines.len() {
            let line = next_line(&lines, &mut cursor)?;
            if line.trim().is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix("BELIEF ") {
                let node = self.load_belief(rest, &lines, &mut cursor, action_pool, rng)?;
                let (id, node) = node;
                tree.insert_belief_at(id, node);
            } else if let Some(rest) = line.strip_prefix("ACTION ") {
                let (id, node) = self.load_action_node(rest, &lines, &mut cursor, observation_pool)?;
                tree.insert_action_at(id, node);
            } else {
                return Err(SerializeError::UnknownTag {
                    tag: line.split_whitespace().next().unwrap_or("").to_string(),
                });
            }
        }

        tree.set_root(BeliefId::from(root_index));
        Ok(tree)
    }

    fn load_belief<AP>(
        &self,
        header_rest: &str,
        lines: &[String],
        cursor: &mut usize,
        action_pool: &mut AP,
        rng: &mut ChaCha8Rng,
    ) -> Result<(BeliefId, BeliefNode<AP::Mapping>), SerializeError>
    where
        AP: ActionPool,
        AP::Action: FromStr,
    {
        let at = *cursor;
        let parts: Vec<&str> = header_rest.split("; ").collect();
        if parts.len() != 8 {
            return Err(malformed(at, "belief header needs 8 fields"));
        }
        let id: usize = parse_field(parts[0].trim(), at)?;
        let parent = match parts[1].strip_prefix("parent ") {
            Some("-") => None,
            Some(raw) => Some(ActionNodeId::from(parse_field::<usize>(raw, at)?)),
            None => return Err(malformed(at, "belief header lacks parent field")),
        };
        let n_particles: i64 = parse_counted(parts[2], "particles", at)?;
        let n_starting: i64 = parse_counted(parts[3], "starting", at)?;
        let n_ending: i64 = parse_counted(parts[4], "ending", at)?;
        let tail_count: i64 = parse_counted(parts[5], "tails", at)?;
        let tail_total: f64 = parts[6]
            .strip_prefix("tail=")
            .ok_or_else(|| malformed(at, "belief header lacks tail total"))
            .and_then(|raw| parse_field(raw, at))?;
        let (value_total, visit_count) = parts[7]
            .strip_prefix("value=")
            .and_then(|raw| raw.split_once('/'))
            .ok_or_else(|| malformed(at, "belief header lacks value totals"))?;
        let value_total: f64 = parse_field(value_total, at)?;
        let visit_count: i64 = parse_field(visit_count, at)?;

        let mut mapping = action_pool.create_mapping(rng);

        let block = next_line(lines, cursor)?;
        let entry_count = parse_block_header(block, "action children", *cursor)?;
        let mut parsed_entries = 0usize;
        loop {
            let at = *cursor;
            let line = next_line(lines, cursor)?;
            if line == "}" {
                break;
            }
            let body = line
                .strip_prefix('\t')
                .ok_or_else(|| malformed(at, "expected an indented mapping entry"))?;
            if let Some(rest) = body.strip_prefix("chooser ") {
                let (tag, payload) = rest.split_once(' ').unwrap_or((rest, ""));
                let blob = self.registry.load(tag, payload, at)?;
                mapping.set_chooser_blob(blob);
                continue;
            }
            let (action_text, rest) = body
                .rsplit_once(" -> NODE ")
                .ok_or_else(|| malformed(at, "action entry lacks a child marker"))?;
            let action = AP::Action::from_str(action_text)
                .map_err(|_| malformed(at, "unparseable action"))?;
            let fields: Vec<&str> = rest.split("; ").collect();
            if fields.len() != 4 {
                return Err(malformed(at, "action entry needs 4 fields"));
            }
            let child = match fields[0] {
                "-" => None,
                raw => Some(ActionNodeId::from(parse_field::<usize>(raw, at)?)),
            };
            let visits: i64 = parse_counted(fields[1], "visits", at)?;
            let (total_q, _mean) = fields[2]
                .strip_prefix("q=")
                .and_then(|raw| raw.split_once('/'))
                .ok_or_else(|| malformed(at, "action entry lacks Q statistics"))?;
            let total_q: f64 = parse_field(total_q, at)?;
            let legal = match fields[3] {
                "legal" => true,
                "illegal" => false,
                _ => return Err(malformed(at, "action entry legality flag unreadable")),
            };
            mapping.restore_entry(
                &action,
                EntryView {
                    visits,
                    total_q,
                    mean_q: 0.0,
                    legal,
                    child,
                },
            );
            parsed_entries += 1;
        }
        if parsed_entries != entry_count {
            return Err(malformed(at, "action entry count mismatch"));
        }

        let mut node = BeliefNode::new(parent, mapping);
        node.set_restored_statistics(
            n_particles,
            n_starting,
            n_ending,
            tail_count,
            tail_total,
            value_total,
            visit_count,
        );
        Ok((BeliefId::from(id), node))
    }

    fn load_action_node<OP>(
        &self,
        header_rest: &str,
        lines: &[String],
        cursor: &mut usize,
        observation_pool: &mut OP,
    ) -> Result<(ActionNodeId, ActionNode<OP::Mapping>), SerializeError>
    where
        OP: ObservationPool,
        OP::Observation: FromStr,
    {
        let at = *cursor;
        let parts: Vec<&str> = header_rest.split("; ").collect();
        if parts.len() != 4 {
            return Err(malformed(at, "action node header needs 4 fields"));
        }
        let id: usize = parse_field(parts[0].trim(), at)?;
        let parent = parts[1]
            .strip_prefix("parent ")
            .ok_or_else(|| malformed(at, "action node header lacks parent"))
            .and_then(|raw| parse_field::<usize>(raw, at))?;
        let n_particles: i64 = parts[2]
            .strip_prefix("n=")
            .ok_or_else(|| malformed(at, "action node header lacks n"))
            .and_then(|raw| parse_field(raw, at))?;
        let (total_q, _mean) = parts[3]
            .strip_prefix("q=")
            .and_then(|raw| raw.split_once('/'))
            .ok_or_else(|| malformed(at, "action node header lacks Q statistics"))?;
        let total_q: f64 = parse_field(total_q, at)?;

        let mut mapping = observation_pool.create_mapping();

        let block = next_line(lines, cursor)?;
        let entry_count = parse_block_header(block, "observation children", *cursor)?;
        let mut parsed_entries = 0usize;
        loop {
            let at = *cursor;
            let line = next_line(lines, cursor)?;
            if line == "}" {
                break;
            }
            let body = line
                .strip_prefix('\t')
                .ok_or_else(|| malformed(at, "expected an indented mapping entry"))?;
            let (obs_text, rest) = body
                .rsplit_once(" -> NODE ")
                .ok_or_else(|| malformed(at, "observation entry lacks a child marker"))?;
            let observation = OP::Observation::from_str(obs_text)
                .map_err(|_| malformed(at, "unparseable observation"))?;
            let (child_raw, visits_raw) = rest
                .split_once("; ")
                .ok_or_else(|| malformed(at, "observation entry lacks visits"))?;
            let child = BeliefId::from(parse_field::<usize>(child_raw, at)?);
            let visits: i64 = parse_counted(visits_raw, "visits", at)?;
            mapping.restore_entry(&observation, child, visits);
            parsed_entries += 1;
        }
        if parsed_entries != entry_count {
            return Err(malformed(at, "observation entry count mismatch"));
        }

        let mut node = ActionNode::new(BeliefId::from(parent), mapping);
        node.set_restored_statistics(n_particles, total_q);
        Ok((ActionNodeId::from(id), node))
    }
}

fn next_line<'a>(lines: &'a [String], cursor: &mut usize) -> Result<&'a str, SerializeError> {
    let line = lines.get(*cursor).ok_or_else(|| SerializeError::Malformed {
        line: *cursor + 1,
        reason: "unexpected end of file".to_string(),
    })?;
    *cursor += 1;
    Ok(line)
}

fn malformed(cursor: usize, reason: &str) -> SerializeError {
    SerializeError::Malformed {
        line: cursor + 1,
        reason: reason.to_string(),
    }
}

fn parse_field<T: FromStr>(raw: &str, cursor: usize) -> Result<T, SerializeError> {
    raw.trim()
        .parse()
        .map_err(|_| malformed(cursor, "unreadable numeric field"))
}

/// Parse `"<number> <label>"`, e.g. `"12 visits"`.
fn parse_counted<T: FromStr>(raw: &str, label: &str, cursor: usize) -> Result<T, SerializeError> {
    raw.strip_suffix(label)
        .map(str::trim)
        .ok_or_else(|| malformed(cursor, "unlabeled count field"))
        .and_then(|n| parse_field(n, cursor))
}

/// Parse `"<count> <label>; <total> visits {"`, returning the entry count.
fn parse_block_header(line: &str, label: &str, cursor: usize) -> Result<usize, SerializeError> {
    let (count_part, rest) = line
        .split_once("; ")
        .ok_or_else(|| malformed(cursor, "unreadable mapping block header"))?;
    if !rest.ends_with('{') {
        return Err(malformed(cursor, "mapping block header lacks opening brace"));
    }
    parse_counted(count_part, label, cursor)
}
