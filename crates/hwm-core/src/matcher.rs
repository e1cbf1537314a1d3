//! Matching of hardware facts against profile specs.
//!
//! [`Matcher::match_spec`] finds the first fact satisfying one spec and
//! consumes it. [`Matcher::match_all`] unifies an ordered list of specs
//! against an inventory, backtracking over earlier variable bindings when a
//! later spec cannot be satisfied.
//!
//! Results are deterministic for a given inventory order: facts are tried
//! in order, specs in order, and choice points are retried newest first.

use crate::predicate::{Call, PredicateError, PredicateRegistry};
use hwm_common::{Fact, Record, Spec};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{trace, warn};

/// Default recursion cap for backtracking.
pub const DEFAULT_MAX_DEPTH: usize = 50;

static NON_WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\W+").unwrap());

static DEFAULT_MATCHER: Lazy<Matcher> = Lazy::new(Matcher::default);

/// Single-valued bindings. A name bound twice must see the same value.
pub type Bindings = BTreeMap<String, String>;

/// Multi-valued bindings collected by [`Matcher::match_multiple`].
pub type MultiBindings = BTreeMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("predicate failed in {spec}: {source}")]
    Predicate {
        spec: Spec,
        #[source]
        source: PredicateError,
    },
}

/// Strategy for recording a variable binding.
pub trait Adder {
    /// Whether binding `name` to `value` contradicts an earlier binding.
    fn conflicts(&self, name: &str, value: &str) -> bool;

    fn add(&mut self, name: &str, value: &str);
}

impl Adder for Bindings {
    fn conflicts(&self, name: &str, value: &str) -> bool {
        self.get(name).is_some_and(|bound| bound != value)
    }

    fn add(&mut self, name: &str, value: &str) {
        self.insert(name.to_string(), value.to_string());
    }
}

impl Adder for MultiBindings {
    fn conflicts(&self, _name: &str, _value: &str) -> bool {
        false
    }

    fn add(&mut self, name: &str, value: &str) {
        self.entry(name.to_string())
            .or_default()
            .push(value.to_string());
    }
}

/// One classified position of a spec.
#[derive(Debug, Clone, Copy)]
enum Element<'a> {
    Literal(&'a str),
    Var(&'a str),
    Test(Call<'a>),
    BoundTest(&'a str, Call<'a>),
}

/// Saved state to resume from when a later spec fails.
#[derive(Debug, Clone)]
struct ChoicePoint {
    facts: Vec<Fact>,
    specs: Vec<Spec>,
    bindings: Bindings,
}

/// Spec matcher over a predicate registry.
#[derive(Debug, Clone)]
pub struct Matcher {
    registry: PredicateRegistry,
    max_depth: usize,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(PredicateRegistry::standard())
    }
}

impl Matcher {
    pub fn new(registry: PredicateRegistry) -> Self {
        Self {
            registry,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn registry(&self) -> &PredicateRegistry {
        &self.registry
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    fn classify<'a>(&self, element: &'a str) -> Element<'a> {
        if let Some(name) = element.strip_prefix('$') {
            if let Some((var, func)) = name.split_once('=') {
                return match self.registry.parse_call(func) {
                    Some(call) => Element::BoundTest(var, call),
                    None => Element::Literal(element),
                };
            }
            return Element::Var(name);
        }
        match self.registry.parse_call(element) {
            Some(call) => Element::Test(call),
            None => Element::Literal(element),
        }
    }

    /// Test one fact against one spec, returning the positions to bind.
    fn test_fact<'a, A: Adder>(
        &self,
        spec: &'a Spec,
        fact: &Fact,
        bindings: &A,
    ) -> Result<Option<Vec<(usize, &'a str)>>, MatchError> {
        let mut captures = Vec::new();
        for idx in 0..4 {
            let field = fact[idx].as_str();
            let var = match self.classify(&spec[idx]) {
                Element::Literal(s) => {
                    if s != field {
                        return Ok(None);
                    }
                    None
                }
                Element::Var(name) => Some(name),
                Element::Test(call) => {
                    if !self.eval(spec, &call, field)? {
                        return Ok(None);
                    }
                    None
                }
                Element::BoundTest(name, call) => {
                    if !self.eval(spec, &call, field)? {
                        return Ok(None);
                    }
                    Some(name)
                }
            };
            if let Some(name) = var {
                if bindings.conflicts(name, field) {
                    return Ok(None);
                }
                captures.push((idx, name));
            }
        }
        Ok(Some(captures))
    }

    fn eval(&self, spec: &Spec, call: &Call<'_>, field: &str) -> Result<bool, MatchError> {
        self.registry
            .eval(call, field)
            .map_err(|source| MatchError::Predicate {
                spec: spec.clone(),
                source,
            })
    }

    /// Find the first fact satisfying `spec`, record its bindings, and
    /// remove it from `facts`.
    ///
    /// A fact literally equal to the spec wins over any pattern match.
    pub fn match_spec<A: Adder>(
        &self,
        spec: &Spec,
        facts: &mut Vec<Fact>,
        bindings: &mut A,
    ) -> Result<Option<Fact>, MatchError> {
        if let Some(pos) = facts.iter().position(|fact| spec.is_literally(fact)) {
            return Ok(Some(facts.remove(pos)));
        }

        for pos in 0..facts.len() {
            if let Some(captures) = self.test_fact(spec, &facts[pos], bindings)? {
                let fact = facts.remove(pos);
                for (idx, name) in captures {
                    bindings.add(name, &fact[idx]);
                }
                return Ok(Some(fact));
            }
        }
        Ok(None)
    }

    fn unify(
        &self,
        facts: &[Fact],
        specs: &[Spec],
        bindings: &mut Bindings,
        depth: usize,
    ) -> Result<bool, MatchError> {
        if depth >= self.max_depth {
            trace!(depth, "backtracking depth exhausted");
            return Ok(false);
        }

        let mut facts = facts.to_vec();
        let mut snapshot = bindings.clone();
        let mut points: Vec<ChoicePoint> = Vec::new();

        for (pos, spec) in specs.iter().enumerate() {
            match self.match_spec(spec, &mut facts, bindings)? {
                Some(fact) => {
                    trace!(%spec, %fact, "spec matched");
                    if *bindings != snapshot {
                        // Retry later with the consumed fact moved to the end.
                        let mut retry = facts.clone();
                        retry.push(fact);
                        points.push(ChoicePoint {
                            facts: retry,
                            specs: specs[pos..].to_vec(),
                            bindings: std::mem::replace(&mut snapshot, bindings.clone()),
                        });
                    }
                }
                None => {
                    trace!(%spec, depth, choice_points = points.len(), "spec not matched");
                    while let Some(mut point) = points.pop() {
                        if self.unify(&point.facts, &point.specs, &mut point.bindings, depth + 1)? {
                            *bindings = point.bindings;
                            return Ok(true);
                        }
                    }
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Match every spec in order against `facts`.
    ///
    /// On success, `bindings` receives all variables. Variables written
    /// `$$name` are stored as `name` and also copied into `exported`. On
    /// failure neither map is modified.
    pub fn match_all(
        &self,
        facts: &[Fact],
        specs: &[Spec],
        bindings: &mut Bindings,
        exported: &mut Bindings,
    ) -> Result<bool, MatchError> {
        let mut working = bindings.clone();
        if !self.unify(facts, specs, &mut working, 0)? {
            return Ok(false);
        }

        let doubled: Vec<String> = working
            .keys()
            .filter(|key| key.starts_with('$'))
            .cloned()
            .collect();
        for key in doubled {
            if let Some(value) = working.remove(&key) {
                let name = key[1..].to_string();
                exported.insert(name.clone(), value.clone());
                working.insert(name, value);
            }
        }
        *bindings = working;
        Ok(true)
    }

    /// Collect every fact matching `spec`, appending each binding.
    ///
    /// `facts` is not modified.
    pub fn match_multiple(
        &self,
        facts: &[Fact],
        spec: &Spec,
        bindings: &mut MultiBindings,
    ) -> Result<bool, MatchError> {
        let mut facts = facts.to_vec();
        let mut matched = false;
        while self.match_spec(spec, &mut facts, bindings)?.is_some() {
            matched = true;
        }
        Ok(matched)
    }

    /// Derive a system name and MAC list from DMI and network facts.
    ///
    /// The name is `<product name or vendor>-<serial>-<first mac>` with
    /// non-word characters stripped and colons in the MAC turned to dashes.
    pub fn generate_filename_and_macs(&self, facts: &[Fact]) -> Result<Record, MatchError> {
        let mut facts = facts.to_vec();
        let mut vars = Bindings::new();
        let mut sysname = String::new();

        let vendor = Spec::new("system", "product", "vendor", "$sysprodvendor");
        if self.match_spec(&vendor, &mut facts, &mut vars)?.is_some() {
            sysname.push_str(&sanitize(&vars["sysprodvendor"]));
            sysname.push('-');
        }

        let name = Spec::new("system", "product", "name", "$sysprodname");
        if self.match_spec(&name, &mut facts, &mut vars)?.is_some() {
            sysname = format!("{}-", sanitize(&vars["sysprodname"]));
        }

        let serial = Spec::new("system", "product", "serial", "$sysserial");
        if self.match_spec(&serial, &mut facts, &mut vars)?.is_some() {
            sysname.push_str(&sanitize(&vars["sysserial"]));
            sysname.push('-');
        }

        let mut nics = MultiBindings::new();
        let macs = Spec::new("network", "$eth", "serial", "$serial");
        if self.match_multiple(&facts, &macs, &mut nics)? {
            if let Some(first) = nics.get("serial").and_then(|s| s.first()) {
                sysname.push_str(&first.replace(':', "-"));
            }
        } else {
            warn!("unable to detect network macs");
        }

        let mut record = Record::new();
        for (key, value) in vars {
            record.insert(key, Value::String(value));
        }
        for (key, values) in nics {
            record.insert(
                key,
                Value::Array(values.into_iter().map(Value::String).collect()),
            );
        }
        record.insert("sysname".to_string(), Value::String(sysname));
        Ok(record)
    }
}

fn sanitize(value: &str) -> String {
    NON_WORD_RE.replace_all(value, "").into_owned()
}

/// [`Matcher::match_spec`] with the standard predicates.
pub fn match_spec<A: Adder>(
    spec: &Spec,
    facts: &mut Vec<Fact>,
    bindings: &mut A,
) -> Result<Option<Fact>, MatchError> {
    DEFAULT_MATCHER.match_spec(spec, facts, bindings)
}

/// [`Matcher::match_all`] with the standard predicates.
pub fn match_all(
    facts: &[Fact],
    specs: &[Spec],
    bindings: &mut Bindings,
    exported: &mut Bindings,
) -> Result<bool, MatchError> {
    DEFAULT_MATCHER.match_all(facts, specs, bindings, exported)
}

/// [`Matcher::match_multiple`] with the standard predicates.
pub fn match_multiple(
    facts: &[Fact],
    spec: &Spec,
    bindings: &mut MultiBindings,
) -> Result<bool, MatchError> {
    DEFAULT_MATCHER.match_multiple(facts, spec, bindings)
}

/// [`Matcher::generate_filename_and_macs`] with the standard predicates.
pub fn generate_filename_and_macs(facts: &[Fact]) -> Result<Record, MatchError> {
    DEFAULT_MATCHER.generate_filename_and_macs(facts)
}
