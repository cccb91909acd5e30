use serde::Serialize;

/// Microseconds per second, the clock unit of timestamped controller logs.
pub const MICROS_PER_SECOND: f64 = 1e6;

fn default_dim_names() -> Vec<String> {
    ["x", "y", "z"].iter().map(|d| d.to_string()).collect()
}

/// Append-only list of opaque items.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlainCollector {
    pub name: String,
    items: Vec<serde_json::Value>,
}

impl PlainCollector {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
        }
    }

    pub fn push(&mut self, item: serde_json::Value) {
        self.items.push(item);
    }

    pub fn items(&self) -> &[serde_json::Value] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Append-only list of numeric vectors, in extraction order.
#[derive(Debug, Clone, Serialize)]
pub struct VectorCollector {
    pub name: String,
    pub dim_names: Vec<String>,
    values: Vec<Vec<f64>>,
}

impl VectorCollector {
    pub fn new(name: impl Into<String>, dim_names: Option<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            dim_names: dim_names.unwrap_or_else(default_dim_names),
            values: Vec::new(),
        }
    }

    pub fn push(&mut self, values: Vec<f64>) {
        self.values.push(values);
    }

    pub fn values(&self) -> &[Vec<f64>] {
        &self.values
    }

    /// One dimension across every sample. Samples too short to have it are
    /// skipped.
    pub fn column(&self, dim: usize) -> Vec<f64> {
        self.values.iter().filter_map(|v| v.get(dim).copied()).collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Vectors paired with the integer timestamp of their block.
///
/// `timestamps` and the vector list always have the same length and are
/// index aligned.
#[derive(Debug, Clone, Serialize)]
pub struct TimedVectorCollector {
    #[serde(flatten)]
    vectors: VectorCollector,
    timestamps: Vec<i64>,
}

impl TimedVectorCollector {
    pub fn new(name: impl Into<String>, dim_names: Option<Vec<String>>) -> Self {
        Self {
            vectors: VectorCollector::new(name, dim_names),
            timestamps: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.vectors.name
    }

    pub fn dim_names(&self) -> &[String] {
        &self.vectors.dim_names
    }

    pub fn push(&mut self, timestamp: i64, values: Vec<f64>) {
        self.vectors.push(values);
        self.timestamps.push(timestamp);
    }

    pub fn values(&self) -> &[Vec<f64>] {
        self.vectors.values()
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    pub fn column(&self, dim: usize) -> Vec<f64> {
        self.vectors.column(dim)
    }

    /// `(t - zero) / scale` for every timestamp. `zero` defaults to the
    /// first timestamp.
    pub fn elapsed(&self, zero: Option<i64>, scale: f64) -> Vec<f64> {
        let Some(zero) = zero.or_else(|| self.timestamps.first().copied()) else {
            return Vec::new();
        };
        self.timestamps
            .iter()
            .map(|&t| (t - zero) as f64 / scale)
            .collect()
    }

    pub fn elapsed_seconds(&self, zero: Option<i64>) -> Vec<f64> {
        self.elapsed(zero, MICROS_PER_SECOND)
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn clear(&mut self) {
        self.vectors.clear();
        self.timestamps.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlainHandle(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VectorHandle(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimedHandle(usize);

/// Handle to any collector kind, as returned by name lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectorHandle {
    Plain(PlainHandle),
    Vector(VectorHandle),
    Timed(TimedHandle),
}

/// Borrowed view of one collector of any kind.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CollectorRef<'a> {
    Plain(&'a PlainCollector),
    Vector(&'a VectorCollector),
    Timed(&'a TimedVectorCollector),
}

impl CollectorRef<'_> {
    pub fn name(&self) -> &str {
        match self {
            CollectorRef::Plain(c) => &c.name,
            CollectorRef::Vector(c) => &c.name,
            CollectorRef::Timed(c) => c.name(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CollectorRef::Plain(c) => c.len(),
            CollectorRef::Vector(c) => c.len(),
            CollectorRef::Timed(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Every collector owned by one dispatcher, addressed by typed handles.
#[derive(Debug, Default)]
pub struct CollectorSet {
    plain: Vec<PlainCollector>,
    vectors: Vec<VectorCollector>,
    timed: Vec<TimedVectorCollector>,
    order: Vec<CollectorHandle>,
}

impl CollectorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_plain(&mut self, collector: PlainCollector) -> PlainHandle {
        let handle = PlainHandle(self.plain.len());
        self.plain.push(collector);
        self.order.push(CollectorHandle::Plain(handle));
        handle
    }

    pub fn add_vector(&mut self, collector: VectorCollector) -> VectorHandle {
        let handle = VectorHandle(self.vectors.len());
        self.vectors.push(collector);
        self.order.push(CollectorHandle::Vector(handle));
        handle
    }

    pub fn add_timed(&mut self, collector: TimedVectorCollector) -> TimedHandle {
        let handle = TimedHandle(self.timed.len());
        self.timed.push(collector);
        self.order.push(CollectorHandle::Timed(handle));
        handle
    }

    // Handles are only minted by this set, so indexing cannot go out of range
    // as long as a handle is used with the set that issued it.

    pub fn plain(&self, handle: PlainHandle) -> &PlainCollector {
        &self.plain[handle.0]
    }

    pub fn plain_mut(&mut self, handle: PlainHandle) -> &mut PlainCollector {
        &mut self.plain[handle.0]
    }

    pub fn vector(&self, handle: VectorHandle) -> &VectorCollector {
        &self.vectors[handle.0]
    }

    pub fn vector_mut(&mut self, handle: VectorHandle) -> &mut VectorCollector {
        &mut self.vectors[handle.0]
    }

    pub fn timed(&self, handle: TimedHandle) -> &TimedVectorCollector {
        &self.timed[handle.0]
    }

    pub fn timed_mut(&mut self, handle: TimedHandle) -> &mut TimedVectorCollector {
        &mut self.timed[handle.0]
    }

    pub fn get(&self, handle: CollectorHandle) -> CollectorRef<'_> {
        match handle {
            CollectorHandle::Plain(h) => CollectorRef::Plain(self.plain(h)),
            CollectorHandle::Vector(h) => CollectorRef::Vector(self.vector(h)),
            CollectorHandle::Timed(h) => CollectorRef::Timed(self.timed(h)),
        }
    }

    pub fn find(&self, name: &str) -> Option<CollectorHandle> {
        self.order
            .iter()
            .copied()
            .find(|&h| self.get(h).name() == name)
    }

    /// Collectors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = CollectorRef<'_>> + '_ {
        self.order.iter().map(|&h| self.get(h))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.plain.iter_mut().for_each(PlainCollector::clear);
        self.vectors.iter_mut().for_each(VectorCollector::clear);
        self.timed.iter_mut().for_each(TimedVectorCollector::clear);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_timed_push_and_clear() {
        let mut c = TimedVectorCollector::new("pos", None);
        c.push(10, vec![1.0, 2.0]);
        c.push(20, vec![3.0, 4.0]);
        assert_eq!(c.timestamps(), &[10, 20]);
        assert_eq!(c.values(), &[vec![1.0, 2.0], vec![3.0, 4.0]]);
        assert_eq!(c.dim_names(), &["x", "y", "z"]);

        c.clear();
        assert!(c.values().is_empty());
        assert!(c.timestamps().is_empty());
    }

    #[test]
    fn test_elapsed() {
        let mut c = TimedVectorCollector::new("pos", None);
        assert!(c.elapsed_seconds(None).is_empty());

        c.push(1_000_000, vec![0.0]);
        c.push(3_500_000, vec![0.0]);
        assert_eq!(c.elapsed_seconds(None), vec![0.0, 2.5]);
        assert_eq!(c.elapsed(Some(0), 1e3), vec![1000.0, 3500.0]);
    }

    #[test]
    fn test_vector_column() {
        let mut c = VectorCollector::new("vel", Some(vec!["vx".into(), "vy".into()]));
        c.push(vec![1.0, 2.0]);
        c.push(vec![3.0]);
        c.push(vec![5.0, 6.0]);
        assert_eq!(c.column(0), vec![1.0, 3.0, 5.0]);
        assert_eq!(c.column(1), vec![2.0, 6.0]);
    }

    #[test]
    fn test_set_lookup_and_clear() {
        let mut set = CollectorSet::new();
        let a = set.add_vector(VectorCollector::new("a", None));
        let b = set.add_plain(PlainCollector::new("b"));
        let t = set.add_timed(TimedVectorCollector::new("t", None));

        set.vector_mut(a).push(vec![1.0]);
        set.plain_mut(b).push(serde_json::json!(["x"]));
        set.timed_mut(t).push(5, vec![2.0]);

        assert_eq!(set.find("a"), Some(CollectorHandle::Vector(a)));
        assert_eq!(set.find("t"), Some(CollectorHandle::Timed(t)));
        assert_eq!(set.find("missing"), None);
        assert_eq!(
            set.iter().map(|c| c.name().to_string()).collect::<Vec<_>>(),
            vec!["a", "b", "t"]
        );

        let json = serde_json::to_value(set.get(CollectorHandle::Timed(t))).unwrap();
        assert_eq!(json["kind"], "timed");
        assert_eq!(json["timestamps"], serde_json::json!([5]));
        assert_eq!(json["values"], serde_json::json!([[2.0]]));

        set.clear();
        assert!(set.iter().all(|c| c.is_empty()));
        assert_eq!(set.len(), 3);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Push(i64, Vec<f64>),
        Clear,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => (any::<i64>(), prop::collection::vec(-1e6f64..1e6, 0..4))
                .prop_map(|(t, v)| Op::Push(t, v)),
            1 => Just(Op::Clear),
        ]
    }

    proptest! {
        #[test]
        fn prop_timed_lists_stay_aligned(ops in prop::collection::vec(op(), 0..64)) {
            let mut c = TimedVectorCollector::new("p", None);
            let mut expected: Vec<(i64, Vec<f64>)> = Vec::new();

            for op in ops {
                match op {
                    Op::Push(t, v) => {
                        c.push(t, v.clone());
                        expected.push((t, v));
                    }
                    Op::Clear => {
                        c.clear();
                        expected.clear();
                    }
                }
                prop_assert_eq!(c.timestamps().len(), c.values().len());
                prop_assert_eq!(c.len(), expected.len());
            }

            for (i, (t, v)) in expected.iter().enumerate() {
                prop_assert_eq!(c.timestamps()[i], *t);
                prop_assert_eq!(&c.values()[i], v);
            }
        }
    }
}
