//! Query families: one template, one argument grid, lazily rendered.

use crate::enumerate::unravel_index;
use std::fmt;

const SLOT: &str = "{}";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QuerySetError {
    #[error("template for {name} has {slots} slot(s) but {dims} argument set(s)")]
    SlotMismatch {
        name: String,
        slots: usize,
        dims: usize,
    },
    #[error("argument set {dim} of {name} is empty")]
    EmptyDimension { name: String, dim: usize },
    #[error("iteration space of {name} overflows usize")]
    TooLarge { name: String },
}

/// A single generated query and, once executed, its scalar result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRecord {
    pub index: usize,
    pub inputs: Vec<i64>,
    pub raw: String,
    pub output: Option<i64>,
}

impl QueryRecord {
    /// Results-file line: `{output} [{inputs}]`.
    pub fn to_line(&self) -> String {
        let inputs: Vec<String> = self.inputs.iter().map(|v| v.to_string()).collect();
        match self.output {
            Some(out) => format!("{} [{}]", out, inputs.join(" ")),
            None => format!("- [{}]", inputs.join(" ")),
        }
    }
}

/// Template plus argument grid. Immutable once built.
#[derive(Debug, Clone)]
pub struct QuerySet {
    name: String,
    template: String,
    // literal pieces around the slots; always one more than the dimension count
    segments: Vec<String>,
    arg_sets: Vec<Vec<i64>>,
    setup: Option<String>,
    teardown: Option<String>,
    lengths: Vec<usize>,
    iterations: usize,
}

impl QuerySet {
    pub fn new(
        name: impl Into<String>,
        template: impl Into<String>,
        arg_sets: Vec<Vec<i64>>,
    ) -> Result<Self, QuerySetError> {
        let name = name.into();
        let template = template.into();
        let segments: Vec<String> = template.split(SLOT).map(str::to_string).collect();
        let slots = segments.len() - 1;
        if slots != arg_sets.len() {
            return Err(QuerySetError::SlotMismatch {
                name,
                slots,
                dims: arg_sets.len(),
            });
        }
        if let Some(dim) = arg_sets.iter().position(|a| a.is_empty()) {
            return Err(QuerySetError::EmptyDimension { name, dim });
        }
        let lengths: Vec<usize> = arg_sets.iter().map(Vec::len).collect();
        let iterations = lengths
            .iter()
            .try_fold(1usize, |acc, &l| acc.checked_mul(l))
            .ok_or_else(|| QuerySetError::TooLarge { name: name.clone() })?;
        Ok(Self {
            name,
            template,
            segments,
            arg_sets,
            setup: None,
            teardown: None,
            lengths,
            iterations,
        })
    }

    /// Build a set whose runs are bracketed by a setup and a teardown query.
    pub fn with_setup(
        name: impl Into<String>,
        template: impl Into<String>,
        setup: impl Into<String>,
        teardown: impl Into<String>,
        arg_sets: Vec<Vec<i64>>,
    ) -> Result<Self, QuerySetError> {
        let mut qs = Self::new(name, template, arg_sets)?;
        qs.setup = non_empty(setup.into());
        qs.teardown = non_empty(teardown.into());
        Ok(qs)
    }

    /// No-op set with nothing to iterate.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: String::new(),
            segments: vec![String::new()],
            arg_sets: Vec::new(),
            setup: None,
            teardown: None,
            lengths: Vec::new(),
            iterations: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn arg_sets(&self) -> &[Vec<i64>] {
        &self.arg_sets
    }

    pub fn setup(&self) -> Option<&str> {
        self.setup.as_deref()
    }

    pub fn teardown(&self) -> Option<&str> {
        self.teardown.as_deref()
    }

    pub fn dim(&self) -> usize {
        self.lengths.len()
    }

    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    pub fn size(&self) -> usize {
        self.iterations
    }

    pub fn is_empty(&self) -> bool {
        self.iterations == 0
    }

    fn inputs_at(&self, n: usize) -> Vec<i64> {
        unravel_index(n, &self.lengths)
            .into_iter()
            .zip(&self.arg_sets)
            .map(|(i, args)| args[i])
            .collect()
    }

    fn render(&self, inputs: &[i64]) -> String {
        let mut out = String::with_capacity(self.template.len() + inputs.len() * 4 + 1);
        out.push_str(&self.segments[0]);
        for (value, segment) in inputs.iter().zip(&self.segments[1..]) {
            out.push_str(&value.to_string());
            out.push_str(segment);
        }
        out.push('\n');
        out
    }

    /// Render the Nth query as raw text.
    pub fn query_at(&self, n: usize) -> String {
        self.render(&self.inputs_at(n))
    }

    /// Render the Nth query, keeping the inputs alongside the text.
    pub fn record_at(&self, n: usize) -> QueryRecord {
        let inputs = self.inputs_at(n);
        let raw = self.render(&inputs);
        QueryRecord {
            index: n,
            inputs,
            raw,
            output: None,
        }
    }
}

impl fmt::Display for QuerySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} queries of form:\n{}", self.iterations, self.template)
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() { None } else { Some(s) }
}
