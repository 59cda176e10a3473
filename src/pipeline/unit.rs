//! Data types flowing through a stage: units in, unit results out.

/// One bounded piece of an ordered split of input text.
///
/// The index is assigned by the chunker and never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    index: usize,
    payload: String,
}

impl Unit {
    pub(crate) fn new(index: usize, payload: String) -> Self {
        Self { index, payload }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Length of the payload in characters.
    pub fn len(&self) -> usize {
        self.payload.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Outcome of transforming one unit.
///
/// A failed unit resolves to `Absent` rather than an error; the failure has
/// already been logged by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitResult<T> {
    Present { index: usize, value: T },
    Absent { index: usize },
}

impl<T> UnitResult<T> {
    pub fn index(&self) -> usize {
        match self {
            UnitResult::Present { index, .. } | UnitResult::Absent { index } => *index,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, UnitResult::Present { .. })
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            UnitResult::Present { value, .. } => Some(value),
            UnitResult::Absent { .. } => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            UnitResult::Present { value, .. } => Some(value),
            UnitResult::Absent { .. } => None,
        }
    }
}

/// The full ordered sequence of units derived from one input.
///
/// Indices are exactly `0..len`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedBatch {
    units: Vec<Unit>,
}

impl OrderedBatch {
    /// Build a batch from payloads, assigning indices in order.
    pub fn from_payloads<I>(payloads: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let units = payloads
            .into_iter()
            .enumerate()
            .map(|(index, payload)| Unit::new(index, payload))
            .collect();
        Self { units }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn payloads(&self) -> impl Iterator<Item = &str> {
        self.units.iter().map(Unit::payload)
    }
}

impl IntoIterator for OrderedBatch {
    type Item = Unit;
    type IntoIter = std::vec::IntoIter<Unit>;

    fn into_iter(self) -> Self::IntoIter {
        self.units.into_iter()
    }
}

/// Results for one batch, aligned by index with the batch that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedResultBatch<T> {
    results: Vec<UnitResult<T>>,
}

impl<T> OrderedResultBatch<T> {
    /// Assemble from results in any order.
    ///
    /// # Panics
    /// Panics if the indices are not exactly `0..results.len()`.
    pub(crate) fn from_unordered(mut results: Vec<UnitResult<T>>) -> Self {
        results.sort_by_key(UnitResult::index);
        assert!(
            results.iter().enumerate().all(|(i, r)| r.index() == i),
            "unit results must cover every index exactly once"
        );
        Self { results }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, UnitResult<T>> {
        self.results.iter()
    }

    /// Indices of units that resolved to absent, ascending.
    pub fn absent_indices(&self) -> Vec<usize> {
        self.results
            .iter()
            .filter(|r| !r.is_present())
            .map(UnitResult::index)
            .collect()
    }

    pub fn present_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_present()).count()
    }

    /// Present values in index order.
    pub fn into_present_values(self) -> impl Iterator<Item = T> {
        self.results.into_iter().filter_map(UnitResult::into_value)
    }
}

impl<T> IntoIterator for OrderedResultBatch<T> {
    type Item = UnitResult<T>;
    type IntoIter = std::vec::IntoIter<UnitResult<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}
