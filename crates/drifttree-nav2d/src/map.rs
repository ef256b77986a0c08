use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::NavError;
use crate::geometry::{Point2D, Rectangle2D};

/// Role of a map region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AreaType {
    World,
    Start,
    Observation,
    Goal,
    Obstacle,
    Empty,
    OutOfBounds,
}

impl fmt::Display for AreaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AreaType::World => "World",
            AreaType::Start => "Start",
            AreaType::Observation => "Observation",
            AreaType::Goal => "Goal",
            AreaType::Obstacle => "Obstacle",
            AreaType::Empty => "Empty",
            AreaType::OutOfBounds => "OOB",
        };
        write!(f, "{name}")
    }
}

impl FromStr for AreaType {
    type Err = NavError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "World" => Ok(AreaType::World),
            "Start" => Ok(AreaType::Start),
            "Observation" => Ok(AreaType::Observation),
            "Goal" => Ok(AreaType::Goal),
            "Obstacle" => Ok(AreaType::Obstacle),
            "Empty" => Ok(AreaType::Empty),
            "OOB" => Ok(AreaType::OutOfBounds),
            other => Err(NavError::UnknownAreaType(other.to_string())),
        }
    }
}

/// The parsed map: one world rectangle plus id-keyed regions per type.
#[derive(Debug, Clone)]
pub struct MapSpec {
    world: Rectangle2D,
    areas: BTreeMap<AreaType, BTreeMap<i64, Rectangle2D>>,
}

impl MapSpec {
    pub fn new(world: Rectangle2D) -> Self {
        MapSpec {
            world,
            areas: BTreeMap::new(),
        }
    }

    /// Parse the line-oriented map format: each non-empty line is
    /// `<TypeName> <id> <x0> <y0> <x1> <y1>`, with exactly one `World`.
    pub fn parse(text: &str) -> Result<Self, NavError> {
        let mut world: Option<Rectangle2D> = None;
        let mut areas: BTreeMap<AreaType, BTreeMap<i64, Rectangle2D>> = BTreeMap::new();

        for (index, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }
            let at = index + 1;
            let mut parts = line.splitn(3, char::is_whitespace);
            let kind: AreaType = parts
                .next()
                .ok_or_else(|| malformed(at, "missing area type"))?
                .parse()?;
            let id: i64 = parts
                .next()
                .and_then(|raw| raw.parse().ok())
                .ok_or_else(|| malformed(at, "missing or unreadable id"))?;
            let rect: Rectangle2D = parts
                .next()
                .ok_or_else(|| malformed(at, "missing rectangle"))?
                .parse()
                .map_err(|reason: String| malformed(at, &reason))?;

            if kind == AreaType::World {
                if world.is_some() {
                    return Err(NavError::DuplicateWorld);
                }
                world = Some(rect);
            } else if areas.entry(kind).or_default().insert(id, rect).is_some() {
                return Err(NavError::DuplicateAreaId { kind, id });
            }
        }

        Ok(MapSpec {
            world: world.ok_or(NavError::MissingWorld)?,
            areas,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, NavError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| NavError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn world(&self) -> Rectangle2D {
        self.world
    }

    pub fn areas(&self, kind: AreaType) -> impl Iterator<Item = (i64, Rectangle2D)> + '_ {
        self.areas
            .get(&kind)
            .into_iter()
            .flat_map(|by_id| by_id.iter().map(|(id, rect)| (*id, *rect)))
    }

    pub fn area_count(&self, kind: AreaType) -> usize {
        self.areas.get(&kind).map(BTreeMap::len).unwrap_or(0)
    }

    /// Insert or replace a region. Used when timed changes land.
    pub fn add_area(&mut self, kind: AreaType, id: i64, rect: Rectangle2D) {
        if kind == AreaType::World {
            self.world = rect;
        } else {
            self.areas.entry(kind).or_default().insert(id, rect);
        }
    }

    pub fn is_inside(&self, point: Point2D, kind: AreaType) -> bool {
        self.areas(kind).any(|(_, rect)| rect.contains(point))
    }

    /// Distance from a point to the nearest region of a type; infinite when
    /// none exist.
    pub fn distance_to(&self, point: Point2D, kind: AreaType) -> f64 {
        self.areas(kind)
            .map(|(_, rect)| rect.distance_to(point))
            .fold(f64::INFINITY, f64::min)
    }
}

fn malformed(line: usize, reason: &str) -> NavError {
    NavError::MalformedMap {
        line,
        reason: reason.to_string(),
    }
}
