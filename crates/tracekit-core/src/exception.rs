// SPDX-License-Identifier: MIT OR Apache-2.0
//! Exception-chain flattening.
//!
//! An error and its causes form a tree: `source()` links contribute single
//! children, [`AggregateError`] contributes an ordered list. The tree is
//! walked depth-first with cycle detection and a node bound, then the flat
//! list is reversed so the root cause sits at index 0 and the outermost
//! wrapper at the end, the order the ingestion backend expects.

use std::collections::HashSet;
use std::error::Error;
use std::fmt;

use tracekit_types::{Exception, Mechanism};

/// An error aggregating several independent causes, in the spirit of joined
/// errors in other ecosystems. Its display form joins the member messages
/// with newlines.
pub struct AggregateError {
    errors: Vec<Box<dyn Error + Send + Sync + 'static>>,
}

impl AggregateError {
    /// Join the given errors into one. An empty list is allowed but carries
    /// no information.
    #[must_use]
    pub fn join(errors: Vec<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        AggregateError { errors }
    }

    /// The aggregated members, in insertion order.
    #[must_use]
    pub fn errors(&self) -> impl Iterator<Item = &(dyn Error + 'static)> {
        self.errors.iter().map(|e| &**e as &(dyn Error + 'static))
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for err in &self.errors {
            if !first {
                writeln!(f)?;
            }
            write!(f, "{err}")?;
            first = false;
        }
        Ok(())
    }
}

impl fmt::Debug for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateError")
            .field("errors", &self.errors.len())
            .finish()
    }
}

impl Error for AggregateError {}

/// How a node exposes its causes.
enum Causes<'a> {
    None,
    /// A single `source()` link.
    Source(&'a (dyn Error + 'static)),
    /// Aggregate members in order.
    List(Vec<&'a (dyn Error + 'static)>),
}

fn causes_of<'a>(err: &'a (dyn Error + 'static)) -> Causes<'a> {
    if let Some(aggregate) = err.downcast_ref::<AggregateError>() {
        return Causes::List(aggregate.errors().collect());
    }
    match err.source() {
        Some(source) => Causes::Source(source),
        None => Causes::None,
    }
}

/// Derive a type name from an error's `Debug` representation: the leading
/// identifier, or `"Error"` when the representation starts with payload.
fn type_name_of(err: &(dyn Error + 'static)) -> String {
    let debug = format!("{err:?}");
    let name: String = debug
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == ':')
        .collect();
    if name.is_empty() {
        "Error".to_owned()
    } else {
        name
    }
}

struct Walker {
    exceptions: Vec<Exception>,
    visited: HashSet<usize>,
    max_depth: usize,
}

impl Walker {
    fn visit(&mut self, err: &(dyn Error + 'static), parent: Option<usize>, source: String) {
        if self.exceptions.len() >= self.max_depth {
            return;
        }
        // Identity by address; unhashable or recurring values terminate the
        // walk instead of panicking or looping.
        let address = err as *const dyn Error as *const () as usize;
        if !self.visited.insert(address) {
            return;
        }

        let index = self.exceptions.len();
        let causes = causes_of(err);
        let has_causes = !matches!(causes, Causes::None);

        self.exceptions.push(Exception {
            ty: type_name_of(err),
            value: err.to_string(),
            mechanism: Some(Mechanism {
                ty: if parent.is_none() { "generic" } else { "chained" }.to_owned(),
                source,
                exception_id: Some(index),
                parent_id: parent,
                is_exception_group: has_causes,
            }),
            ..Exception::default()
        });

        match causes {
            Causes::None => {}
            Causes::Source(child) => self.visit(child, Some(index), "cause".to_owned()),
            Causes::List(children) => {
                for (i, child) in children.into_iter().enumerate() {
                    self.visit(child, Some(index), format!("errors[{i}]"));
                }
            }
        }
    }
}

/// Flatten an error's cause tree into the wire exception list.
///
/// The result is reversed from traversal order: root cause first, outermost
/// wrapper last. A chain of exactly one exception carries no mechanism.
#[must_use]
pub fn exceptions_from_error(err: &(dyn Error + 'static), max_depth: usize) -> Vec<Exception> {
    let mut walker = Walker {
        exceptions: Vec::new(),
        visited: HashSet::new(),
        max_depth: max_depth.max(1),
    };
    walker.visit(err, None, String::new());

    let mut exceptions = walker.exceptions;
    if exceptions.len() == 1 {
        exceptions[0].mechanism = None;
    }
    exceptions.reverse();
    exceptions
}
