//! Expansion of CMDB templates into concrete records.
//!
//! A template field may hold a numeric range (`host10-12`, `ceph001-006`),
//! a colon-joined multi-range (`1-3:10-12`), a dotted IPv4 range
//! (`10.0.1-2.2-254`), or a JSON array. All expanding fields advance in
//! lockstep and expansion stops as soon as one of them runs out. Fields
//! without a range repeat their value in every record.

use hwm_common::Record;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static RANGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*?)([0-9]+-[0-9]+(:([0-9]+-[0-9]+))*)(.*)$").unwrap());

static IPV4_RANGE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9:\-.]+$").unwrap());

/// Lazily expand a range such as `10-12:20-30` into its members.
///
/// The zero-padding width is taken from the first bound when it starts with
/// `0`. A descending bound pair counts down. Any malformed sub-range yields
/// the whole input unchanged in its place. Members are produced on demand,
/// so a wide range costs nothing until it is walked.
pub fn generate_range(num_range: &str) -> NumRange {
    let segments: Vec<Segment> = num_range
        .split(':')
        .map(|part| {
            parse_bounds(part).unwrap_or_else(|| Segment::Verbatim(num_range.to_string()))
        })
        .collect();
    NumRange {
        segments: segments.into_iter(),
        current: None,
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Bounds { start: i64, stop: i64, width: usize },
    Verbatim(String),
}

#[derive(Debug, Clone, Copy)]
struct Cursor {
    next: i64,
    stop: i64,
    step: i64,
    width: usize,
}

/// Iterator returned by [`generate_range`]. Cloning it before the first
/// `next` gives an independent restart of the same sequence.
#[derive(Debug, Clone)]
pub struct NumRange {
    segments: std::vec::IntoIter<Segment>,
    current: Option<Cursor>,
}

impl Iterator for NumRange {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            if let Some(cursor) = self.current.as_mut() {
                let n = cursor.next;
                let width = cursor.width;
                if n == cursor.stop {
                    self.current = None;
                } else {
                    cursor.next += cursor.step;
                }
                return Some(format!("{n:0width$}"));
            }
            match self.segments.next()? {
                Segment::Verbatim(text) => return Some(text),
                Segment::Bounds { start, stop, width } => {
                    self.current = Some(Cursor {
                        next: start,
                        stop,
                        step: if stop >= start { 1 } else { -1 },
                        width,
                    });
                }
            }
        }
    }
}

fn parse_bounds(part: &str) -> Option<Segment> {
    let (low, high) = part.split_once('-')?;
    if high.contains('-') {
        return None;
    }
    let width = if low.starts_with('0') { low.len() } else { 0 };
    Some(Segment::Bounds {
        start: low.parse().ok()?,
        stop: high.parse().ok()?,
        width,
    })
}

/// Cartesian product over the four octets of a dotted range.
///
/// Each octet keeps a pristine copy of its range so it can restart when the
/// octet to its right wraps.
struct Ipv4Product {
    fresh: Vec<NumRange>,
    live: Vec<NumRange>,
    current: Vec<String>,
    done: bool,
}

impl Ipv4Product {
    fn new(parts: &[&str]) -> Self {
        let fresh: Vec<NumRange> = parts.iter().map(|p| generate_range(p)).collect();
        let mut live = fresh.clone();
        let mut current = Vec::with_capacity(live.len());
        let mut done = false;
        for octet in live.iter_mut() {
            match octet.next() {
                Some(value) => current.push(value),
                None => done = true,
            }
        }
        Self {
            fresh,
            live,
            current,
            done,
        }
    }
}

impl Iterator for Ipv4Product {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.done {
            return None;
        }
        let item = self.current.join(".");

        // odometer, last octet fastest
        let mut i = self.live.len();
        loop {
            if i == 0 {
                self.done = true;
                break;
            }
            i -= 1;
            if let Some(value) = self.live[i].next() {
                self.current[i] = value;
                break;
            }
            self.live[i] = self.fresh[i].clone();
            match self.live[i].next() {
                Some(value) => self.current[i] = value,
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        Some(item)
    }
}

/// The values one template field contributes, in order.
enum Values {
    Finite(Box<dyn Iterator<Item = Value>>),
    Constant(Value),
}

impl Values {
    fn next(&mut self) -> Option<Value> {
        match self {
            Values::Finite(iter) => iter.next(),
            Values::Constant(v) => Some(v.clone()),
        }
    }

    fn is_constant(&self) -> bool {
        matches!(self, Values::Constant(_))
    }
}

fn values_of(pattern: &Value) -> Values {
    match pattern {
        Value::Array(items) => Values::Finite(Box::new(items.clone().into_iter())),
        Value::String(s) => values_of_str(s),
        other => Values::Constant(other.clone()),
    }
}

fn values_of_str(pattern: &str) -> Values {
    let parts: Vec<&str> = pattern.split('.').collect();
    if IPV4_RANGE_RE.is_match(pattern)
        && parts.len() == 4
        && (pattern.contains(':') || pattern.contains('-'))
    {
        return Values::Finite(Box::new(Ipv4Product::new(&parts).map(Value::String)));
    }

    match RANGE_RE.captures(pattern) {
        Some(caps) => {
            let head = caps.get(1).map_or("", |m| m.as_str()).to_string();
            let foot = caps.get(5).map_or("", |m| m.as_str()).to_string();
            let body = caps.get(2).map_or("", |m| m.as_str());
            let items = generate_range(body).map(move |n| Value::String(format!("{head}{n}{foot}")));
            Values::Finite(Box::new(items))
        }
        None => Values::Constant(Value::String(pattern.to_string())),
    }
}

/// Expand a template into one record per generated combination.
///
/// A template with no range or array field is returned as-is.
pub fn generate(model: &Record) -> Vec<Record> {
    let mut fields: Vec<(String, Values)> = model
        .iter()
        .map(|(key, value)| (key.clone(), values_of(value)))
        .collect();

    if fields.iter().all(|(_, values)| values.is_constant()) {
        return vec![model.clone()];
    }

    let mut result = Vec::new();
    'expand: loop {
        let mut entry = Record::new();
        for (key, values) in fields.iter_mut() {
            match values.next() {
                Some(value) => {
                    entry.insert(key.clone(), value);
                }
                None => break 'expand,
            }
        }
        result.push(entry);
    }
    result
}

/// True when every key of `subset` is present in `record` with an equal value.
pub fn is_included(subset: &Record, record: &Record) -> bool {
    subset
        .iter()
        .all(|(key, value)| record.get(key) == Some(value))
}

/// Deep-merge `default` into `user`.
///
/// Missing keys are copied, nested objects merge recursively, arrays are
/// concatenated, and on any other collision `user` keeps its value.
pub fn merge(user: &mut Record, default: &Record) {
    for (key, default_value) in default {
        match (user.get_mut(key), default_value) {
            (None, _) => {
                user.insert(key.clone(), default_value.clone());
            }
            (Some(Value::Object(ours)), Value::Object(theirs)) => merge(ours, theirs),
            (Some(Value::Array(ours)), Value::Array(theirs)) => {
                ours.extend(theirs.iter().cloned());
            }
            (Some(_), _) => {}
        }
    }
}
