//! Lazy filtered views over a table
//!
//! Iteration runs in two passes: candidate keys are pruned with the Index
//! Blobs, then records are fetched in batches and the query is re-checked
//! against each complete record. Only the second pass is authoritative.

use crate::partition;
use crate::table::Table;
use kvtable_core::types::get_path;
use kvtable_core::{Q, Record, Result, Value};
use std::collections::VecDeque;
use std::fmt;

/// Immutable `(table, query, shallow)` view
///
/// Shallow views skip the heavy partition unless the query itself reads a heavy
/// field; heavy fields are never returned from a shallow view.
#[derive(Clone)]
pub struct QuerySet<'a> {
    table: &'a Table,
    query: Q,
    shallow: bool,
}

impl<'a> QuerySet<'a> {
    pub(crate) fn new(table: &'a Table, query: Q) -> Self {
        Self {
            table,
            query,
            shallow: false,
        }
    }

    pub fn query(&self) -> &Q {
        &self.query
    }

    pub fn is_shallow(&self) -> bool {
        self.shallow
    }

    pub fn shallow(mut self, shallow: bool) -> Self {
        self.shallow = shallow;
        self
    }

    /// Narrow the view: the new query is ANDed with the current one.
    pub fn filter(&self, query: Q) -> QuerySet<'a> {
        QuerySet {
            table: self.table,
            query: self.query.clone() & query,
            shallow: self.shallow,
        }
    }

    pub fn filter_by<I, K, V>(&self, pairs: I) -> QuerySet<'a>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.filter(Q::from_pairs(pairs))
    }

    pub fn iter(&self) -> QueryIter<'_> {
        QueryIter {
            table: self.table,
            query: &self.query,
            shallow: self.shallow,
            plan: None,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    pub fn first(&self) -> Result<Option<Record>> {
        self.iter().next().transpose()
    }

    /// Every match, in ascending primary key order
    pub fn list(&self) -> Result<Vec<Record>> {
        self.iter().collect()
    }

    /// One field per match; missing values are `Null`.
    pub fn list_field(&self, name: &str) -> Result<Vec<Value>> {
        let view = self.clone().shallow(!self.table.is_heavy(name));
        view.iter()
            .map(|record| record.map(|r| project(&r, name)))
            .collect()
    }

    /// Several fields per match, in the order requested.
    pub fn list_fields(&self, names: &[&str]) -> Result<Vec<Vec<Value>>> {
        let any_heavy = names.iter().any(|n| self.table.is_heavy(n));
        let view = self.clone().shallow(!any_heavy);
        view.iter()
            .map(|record| record.map(|r| names.iter().map(|n| project(&r, n)).collect()))
            .collect()
    }

    pub fn count(&self) -> Result<usize> {
        let view = self.clone().shallow(true);
        let mut n = 0;
        for record in view.iter() {
            record?;
            n += 1;
        }
        Ok(n)
    }
}

fn project(record: &Record, path: &str) -> Value {
    get_path(record, path).cloned().unwrap_or(Value::Null)
}

impl<'q, 'a> IntoIterator for &'q QuerySet<'a> {
    type Item = Result<Record>;
    type IntoIter = QueryIter<'q>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for QuerySet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.query.is_empty() {
            write!(f, "<QuerySet {} q=>", self.table.name())
        } else {
            write!(f, "<QuerySet {} q={}>", self.table.name(), self.query)
        }
    }
}

impl fmt::Debug for QuerySet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

struct Plan {
    pks: Vec<String>,
    cursor: usize,
    with_heavy: bool,
    strip_heavy: bool,
}

/// Batched iterator over the matches of a [`QuerySet`]
///
/// Engine and codec failures are yielded once as `Err`, after which the
/// iterator is exhausted.
pub struct QueryIter<'q> {
    table: &'q Table,
    query: &'q Q,
    shallow: bool,
    plan: Option<Plan>,
    buffer: VecDeque<Record>,
    done: bool,
}

impl QueryIter<'_> {
    fn make_plan(&self) -> Result<Plan> {
        let pks = self.table.prune_pks(self.query)?;
        let reads_heavy = self.query.fields().iter().any(|p| self.table.is_heavy(p));
        let with_heavy = !self.shallow || reads_heavy;
        Ok(Plan {
            pks,
            cursor: 0,
            with_heavy,
            strip_heavy: self.shallow && with_heavy,
        })
    }

    fn fill(&mut self) -> Result<()> {
        if self.plan.is_none() {
            self.plan = Some(self.make_plan()?);
        }
        let plan = match self.plan.as_mut() {
            Some(plan) => plan,
            None => return Ok(()),
        };

        while self.buffer.is_empty() {
            if plan.cursor >= plan.pks.len() {
                self.done = true;
                return Ok(());
            }
            let end = (plan.cursor + self.table.config().fetch_batch_size).min(plan.pks.len());
            let batch = self.table.fetch(&plan.pks[plan.cursor..end], plan.with_heavy)?;
            plan.cursor = end;

            for (_, mut record) in batch {
                if !self.query.matches(&record) {
                    continue;
                }
                if plan.strip_heavy {
                    partition::strip_heavy(&mut record, self.table.heavy_fields());
                }
                self.buffer.push_back(record);
            }
        }
        Ok(())
    }
}

impl Iterator for QueryIter<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(record) = self.buffer.pop_front() {
            return Some(Ok(record));
        }
        if self.done {
            return None;
        }
        if let Err(e) = self.fill() {
            self.done = true;
            return Some(Err(e));
        }
        self.buffer.pop_front().map(Ok)
    }
}
