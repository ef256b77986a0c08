use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::warn;

use crate::error::NavError;
use crate::geometry::Rectangle2D;
use crate::map::AreaType;

/// One timed modification of the map.
#[derive(Debug, Clone)]
pub struct MapChange {
    pub kind: AreaType,
    pub id: i64,
    pub area: Rectangle2D,
}

/// Parse a changes file: blocks of `t <time> n <count>` followed by
/// `<count>` lines `ADD <TypeName> <id> <x0> <y0> <x1> <y1>`. Times must be
/// strictly increasing; unknown operations are skipped with a warning.
pub fn parse_changes(text: &str) -> Result<BTreeMap<u64, Vec<MapChange>>, NavError> {
    let mut changes: BTreeMap<u64, Vec<MapChange>> = BTreeMap::new();
    let mut previous_time: Option<u64> = None;
    let mut lines = text.lines().enumerate();

    while let Some((index, raw_line)) = lines.next() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let at = index + 1;
        let mut parts = line.split_whitespace();
        let (time, count) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some("t"), Some(time), Some("n"), Some(count)) => {
                let time: u64 = time
                    .parse()
                    .map_err(|_| malformed(at, "unreadable change time"))?;
                let count: usize = count
                    .parse()
                    .map_err(|_| malformed(at, "unreadable change count"))?;
                (time, count)
            }
            _ => return Err(malformed(at, "expected a 't <time> n <count>' header")),
        };
        if let Some(previous) = previous_time {
            if time <= previous {
                return Err(NavError::NonIncreasingChangeTime { time, previous });
            }
        }
        previous_time = Some(time);

        let block = changes.entry(time).or_default();
        for _ in 0..count {
            let (index, raw_line) = lines
                .next()
                .ok_or_else(|| malformed(at, "change block ends early"))?;
            let at = index + 1;
            let line = raw_line.trim();
            let mut parts = line.splitn(4, char::is_whitespace);
            let operation = parts
                .next()
                .ok_or_else(|| malformed(at, "missing change operation"))?;
            if operation != "ADD" {
                warn!(operation, line = at, "skipping unknown change operation");
                continue;
            }
            let kind: AreaType = parts
                .next()
                .ok_or_else(|| malformed(at, "missing area type"))?
                .parse()?;
            let id: i64 = parts
                .next()
                .and_then(|raw| raw.parse().ok())
                .ok_or_else(|| malformed(at, "missing or unreadable id"))?;
            let area: Rectangle2D = parts
                .next()
                .ok_or_else(|| malformed(at, "missing rectangle"))?
                .parse()
                .map_err(|reason: String| malformed(at, &reason))?;
            block.push(MapChange { kind, id, area });
        }
    }

    Ok(changes)
}

pub fn load_changes(path: impl AsRef<Path>) -> Result<BTreeMap<u64, Vec<MapChange>>, NavError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| NavError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_changes(&text)
}

fn malformed(line: usize, reason: &str) -> NavError {
    NavError::MalformedChanges {
        line,
        reason: reason.to_string(),
    }
}
