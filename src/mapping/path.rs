// src/mapping/path.rs

use anyhow::{anyhow, bail, Result};
use serde_json::Value;
use std::{fmt, str::FromStr};

use super::MissingReason;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Object key. A purely numeric key also indexes into an array.
    Key(String),
    Index(usize),
}

/// A dotted/indexed path into a nested record, e.g. `status.zones[0].rt`
/// or `energy.periods.0.hpheat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePath {
    raw: String,
    segments: Vec<Segment>,
}

impl SourcePath {
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Walk `root` along the path. The first step that cannot be taken explains why.
    pub fn resolve<'a>(&self, root: &'a Value) -> Result<&'a Value, MissingReason> {
        let mut current = root;
        for segment in &self.segments {
            current = match (segment, current) {
                (Segment::Key(key), Value::Object(map)) => map
                    .get(key)
                    .ok_or_else(|| MissingReason::AbsentKey(key.clone()))?,
                (Segment::Key(key), Value::Array(items)) => match key.parse::<usize>() {
                    Ok(index) => index_into(items, index)?,
                    Err(_) => return Err(MissingReason::NotIndexable(key.clone())),
                },
                (Segment::Index(index), Value::Array(items)) => index_into(items, *index)?,
                (Segment::Key(key), _) => return Err(MissingReason::NotIndexable(key.clone())),
                (Segment::Index(index), _) => {
                    return Err(MissingReason::NotIndexable(format!("[{}]", index)))
                }
            };
        }
        Ok(current)
    }
}

fn index_into(items: &[Value], index: usize) -> Result<&Value, MissingReason> {
    items.get(index).ok_or(MissingReason::IndexOutOfRange {
        index,
        len: items.len(),
    })
}

impl FromStr for SourcePath {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            bail!("empty source path");
        }

        let mut segments = Vec::new();
        for part in trimmed.split('.') {
            let (key, mut rest) = match part.find('[') {
                Some(open) => (&part[..open], &part[open..]),
                None => (part, ""),
            };
            if key.is_empty() && rest.is_empty() {
                bail!("empty segment in source path `{}`", raw);
            }
            if !key.is_empty() {
                if key.contains(']') {
                    bail!("unbalanced `]` in source path `{}`", raw);
                }
                segments.push(Segment::Key(key.to_string()));
            }
            while !rest.is_empty() {
                let close = rest
                    .find(']')
                    .ok_or_else(|| anyhow!("unclosed `[` in source path `{}`", raw))?;
                let index = rest[1..close].trim().parse::<usize>().map_err(|_| {
                    anyhow!("bad index `{}` in source path `{}`", &rest[1..close], raw)
                })?;
                segments.push(Segment::Index(index));
                rest = &rest[close + 1..];
                if !rest.is_empty() && !rest.starts_with('[') {
                    bail!("unexpected `{}` after index in source path `{}`", rest, raw);
                }
            }
        }

        Ok(Self {
            raw: trimmed.to_string(),
            segments,
        })
    }
}

impl fmt::Display for SourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
