//! Predicate functions usable inside spec elements.
//!
//! A spec element such as `gt(100)`, `$size=range(10, 20)` or
//! `and(gt(20), lt(50))` is a call into the [`PredicateRegistry`]. The fact
//! field being tested is passed as an implicit first argument, so `gt(100)`
//! evaluates `field > 100`.
//!
//! Calls are recognised by a regular expression rather than a grammar:
//! `name(first[, rest...])`. Remaining arguments are split on commas,
//! stripped of quotes, and evaluated recursively when they are calls
//! themselves.

use ipnet::Ipv4Net;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use thiserror::Error;

static CALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([^(]+)\(\s*([^,]+)(?:\s*,\s*(.+))?\)$", // name(first, rest...)
    )
    .unwrap()
});

static ARG_SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*,\s*").unwrap());

/// Errors raised while evaluating a predicate. These indicate a malformed
/// spec file, not a hardware mismatch.
#[derive(Debug, Error)]
pub enum PredicateError {
    #[error("{name}() expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("{name}(): {value:?} is not a number")]
    NotNumeric { name: &'static str, value: String },

    #[error("regexp(): invalid pattern {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("network(): invalid IPv4 network {network:?}: {reason}")]
    InvalidNetwork { network: String, reason: String },

    #[error("network(): invalid IPv4 address {address:?}: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },
}

/// An evaluated argument: raw text from the spec, or the result of a nested
/// call.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Text(String),
    Bool(bool),
}

impl Arg {
    /// Empty text is false, everything else follows the boolean.
    pub fn truthy(&self) -> bool {
        match self {
            Arg::Text(s) => !s.is_empty(),
            Arg::Bool(b) => *b,
        }
    }

    fn number(&self, name: &'static str) -> Result<f64, PredicateError> {
        match self {
            Arg::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Arg::Text(s) => s.trim().parse::<f64>().map_err(|_| PredicateError::NotNumeric {
                name,
                value: s.clone(),
            }),
        }
    }

    fn text(&self) -> String {
        match self {
            Arg::Text(s) => s.clone(),
            Arg::Bool(true) => "True".to_string(),
            Arg::Bool(false) => "False".to_string(),
        }
    }
}

/// Accepted argument counts, implicit field included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    fn accepts(self, n: usize) -> bool {
        match self {
            Arity::Exact(k) => n == k,
            Arity::AtLeast(k) => n >= k,
        }
    }
}

impl std::fmt::Display for Arity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arity::Exact(k) => write!(f, "{}", k.saturating_sub(1)),
            Arity::AtLeast(k) => write!(f, "at least {}", k.saturating_sub(1)),
        }
    }
}

pub type PredicateFn = fn(&[Arg]) -> Result<bool, PredicateError>;

#[derive(Debug, Clone, Copy)]
pub struct Predicate {
    pub arity: Arity,
    pub func: PredicateFn,
}

/// A parsed `name(args)` expression whose name is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Call<'a> {
    pub name: &'a str,
    first: &'a str,
    rest: Option<&'a str>,
}

/// Mapping from predicate name to function.
#[derive(Debug, Clone, Default)]
pub struct PredicateRegistry {
    predicates: HashMap<String, Predicate>,
}

impl PredicateRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in predicates: `gt ge lt le range in regexp network not and or`.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register("gt", Arity::Exact(2), gt);
        registry.register("ge", Arity::Exact(2), ge);
        registry.register("lt", Arity::Exact(2), lt);
        registry.register("le", Arity::Exact(2), le);
        registry.register("range", Arity::Exact(3), range);
        registry.register("in", Arity::AtLeast(1), is_in);
        registry.register("regexp", Arity::Exact(2), regexp);
        registry.register("network", Arity::Exact(2), network);
        registry.register("not", Arity::Exact(2), not);
        registry.register("and", Arity::Exact(3), and);
        registry.register("or", Arity::Exact(3), or);
        registry
    }

    /// Add or replace a predicate.
    pub fn register(&mut self, name: impl Into<String>, arity: Arity, func: PredicateFn) {
        self.predicates.insert(name.into(), Predicate { arity, func });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.predicates.contains_key(name)
    }

    /// Parse `expr` as a call to a registered predicate.
    ///
    /// Returns `None` when `expr` is not call-shaped or names an unknown
    /// function; such elements are compared literally by the matcher.
    pub fn parse_call<'a>(&self, expr: &'a str) -> Option<Call<'a>> {
        let caps = CALL_RE.captures(expr)?;
        let name = caps.get(1)?.as_str();
        if !self.contains(name) {
            return None;
        }
        Some(Call {
            name,
            first: caps.get(2)?.as_str(),
            rest: caps.get(3).map(|m| m.as_str()),
        })
    }

    /// Evaluate a call against the fact field `implicit`.
    pub fn eval(&self, call: &Call<'_>, implicit: &str) -> Result<bool, PredicateError> {
        let mut raw: Vec<&str> = vec![implicit, call.first];
        if let Some(rest) = call.rest {
            raw.extend(ARG_SEPARATOR_RE.split(rest));
        }

        let mut args = Vec::with_capacity(raw.len());
        for (idx, expr) in raw.into_iter().enumerate() {
            let expr = expr.trim_matches(|c| c == '\'' || c == '"');
            if idx == 0 {
                args.push(Arg::Text(expr.to_string()));
            } else {
                args.push(self.extract(implicit, expr)?);
            }
        }

        let predicate = self.predicates.get(call.name).ok_or_else(|| PredicateError::Arity {
            name: call.name.to_string(),
            expected: "a registered predicate".to_string(),
            got: args.len(),
        })?;
        if !predicate.arity.accepts(args.len()) {
            return Err(PredicateError::Arity {
                name: call.name.to_string(),
                expected: predicate.arity.to_string(),
                got: args.len() - 1,
            });
        }
        (predicate.func)(&args)
    }

    /// Evaluate `expr` if it is a registered call, otherwise return `None`.
    pub fn evaluate(&self, expr: &str, implicit: &str) -> Result<Option<bool>, PredicateError> {
        match self.parse_call(expr) {
            Some(call) => self.eval(&call, implicit).map(Some),
            None => Ok(None),
        }
    }

    fn extract(&self, implicit: &str, expr: &str) -> Result<Arg, PredicateError> {
        match self.parse_call(expr) {
            Some(call) => self.eval(&call, implicit).map(Arg::Bool),
            None => Ok(Arg::Text(expr.to_string())),
        }
    }
}

fn gt(args: &[Arg]) -> Result<bool, PredicateError> {
    Ok(args[0].number("gt")? > args[1].number("gt")?)
}

fn ge(args: &[Arg]) -> Result<bool, PredicateError> {
    Ok(args[0].number("ge")? >= args[1].number("ge")?)
}

fn lt(args: &[Arg]) -> Result<bool, PredicateError> {
    Ok(args[0].number("lt")? < args[1].number("lt")?)
}

fn le(args: &[Arg]) -> Result<bool, PredicateError> {
    Ok(args[0].number("le")? <= args[1].number("le")?)
}

/// Inclusive on both ends.
fn range(args: &[Arg]) -> Result<bool, PredicateError> {
    let value = args[0].number("range")?;
    Ok(value >= args[1].number("range")? && value <= args[2].number("range")?)
}

fn is_in(args: &[Arg]) -> Result<bool, PredicateError> {
    Ok(args[1..].contains(&args[0]))
}

/// Search anywhere in the field, not a full match.
fn regexp(args: &[Arg]) -> Result<bool, PredicateError> {
    let pattern = args[1].text();
    let re = Regex::new(&pattern).map_err(|source| PredicateError::InvalidRegex {
        pattern: pattern.clone(),
        source,
    })?;
    Ok(re.is_match(&args[0].text()))
}

fn network(args: &[Arg]) -> Result<bool, PredicateError> {
    let address = args[0].text();
    let cidr = args[1].text();
    let addr: Ipv4Addr = address
        .trim()
        .parse()
        .map_err(|source| PredicateError::InvalidAddress {
            address: address.clone(),
            source,
        })?;
    let net: Ipv4Net = cidr
        .trim()
        .parse()
        .map_err(|e: ipnet::AddrParseError| PredicateError::InvalidNetwork {
            network: cidr.clone(),
            reason: e.to_string(),
        })?;
    if net.trunc() != net {
        return Err(PredicateError::InvalidNetwork {
            network: cidr,
            reason: "host bits set".to_string(),
        });
    }
    Ok(net.contains(&addr))
}

fn not(args: &[Arg]) -> Result<bool, PredicateError> {
    Ok(!args[1].truthy())
}

fn and(args: &[Arg]) -> Result<bool, PredicateError> {
    Ok(args[1].truthy() && args[2].truthy())
}

fn or(args: &[Arg]) -> Result<bool, PredicateError> {
    Ok(args[1].truthy() || args[2].truthy())
}
