//! Startup steps and their tags
//!
//! A [`StartupStep`] is the caller-facing handle returned by
//! [`ApplicationStartup::start`](crate::ApplicationStartup::start). It wraps
//! a recorder-specific [`Step`] implementation and guarantees the step is
//! ended exactly once: `end` consumes the handle, and a handle dropped
//! without `end` is ended by its `Drop` impl.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Sequence id of the implicit root step
///
/// Top-level steps report this as their parent sequence id.
pub const ROOT_STEP_ID: u64 = 0;

/// Lazily computed tag value
pub type TagSupplier = Box<dyn FnOnce() -> String + Send + Sync>;

/// Value of a single tag
pub enum TagValue {
    /// Value known at attachment time
    Ready(String),
    /// Value computed when the step is committed
    Deferred(TagSupplier),
}

impl TagValue {
    /// Resolved value, `None` while still deferred
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Deferred(_) => None,
        }
    }
}

impl fmt::Debug for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Key/value pair attached to a step
#[derive(Debug)]
pub struct Tag {
    key: String,
    value: TagValue,
}

impl Tag {
    /// Create a tag
    #[inline]
    #[must_use]
    pub fn new(key: impl Into<String>, value: TagValue) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    /// Tag key
    #[inline]
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Tag value, `None` while deferred
    #[inline]
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.value.as_str()
    }

    /// Evaluate a deferred value. A panicking supplier drops the tag.
    fn resolve(self) -> Option<Self> {
        match self.value {
            TagValue::Ready(_) => Some(self),
            TagValue::Deferred(supplier) => match catch_unwind(AssertUnwindSafe(supplier)) {
                Ok(value) => Some(Self {
                    key: self.key,
                    value: TagValue::Ready(value),
                }),
                Err(_) => {
                    tracing::warn!(key = %self.key, "tag supplier panicked; dropping tag");
                    None
                }
            },
        }
    }
}

/// Ordered tag collection of a step
#[derive(Debug, Default)]
pub struct Tags {
    entries: Vec<Tag>,
}

impl Tags {
    /// Create an empty collection
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append a tag, keeping attachment order
    #[inline]
    pub fn push(&mut self, tag: Tag) {
        self.entries.push(tag);
    }

    /// Number of tags
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no tags
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate tags in attachment order
    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.entries.iter()
    }

    /// First value recorded under `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|tag| tag.key == key)
            .and_then(Tag::value)
    }

    /// Evaluate every deferred supplier exactly once
    pub fn resolve(&mut self) {
        let entries = std::mem::take(&mut self.entries);
        self.entries = entries.into_iter().filter_map(Tag::resolve).collect();
    }
}

impl<'a> IntoIterator for &'a Tags {
    type Item = &'a Tag;
    type IntoIter = std::slice::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Flattened `[key=value, key=value]` rendering
///
/// Recording backends only carry primitive fields, so the whole tag set
/// travels as this single string.
impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, tag) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}=", tag.key)?;
            match &tag.value {
                TagValue::Ready(value) => f.write_str(value)?,
                TagValue::Deferred(_) => f.write_str("<deferred>")?,
            }
        }
        f.write_str("]")
    }
}

/// Recorder-specific step implementation
///
/// Implementations must tolerate `end` being invoked more than once: only
/// the first call has an effect.
pub trait Step: Send {
    /// Sequence id of this step
    fn id(&self) -> u64;

    /// Sequence id of the enclosing step, `None` for top-level steps
    fn parent_id(&self) -> Option<u64>;

    /// Step name
    fn name(&self) -> &str;

    /// Whether attached tags are kept
    ///
    /// When `false`, the handle skips building tag values altogether.
    fn records_tags(&self) -> bool;

    /// Attach a tag
    fn add_tag(&mut self, tag: Tag);

    /// Tags attached so far
    fn tags(&self) -> &Tags;

    /// Complete the step
    fn end(&mut self);
}

static NO_TAGS: Tags = Tags::new();

/// Step that records nothing
///
/// Zero-sized, so boxing it does not allocate.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStep;

impl Step for NoopStep {
    fn id(&self) -> u64 {
        ROOT_STEP_ID
    }

    fn parent_id(&self) -> Option<u64> {
        None
    }

    fn name(&self) -> &str {
        ""
    }

    fn records_tags(&self) -> bool {
        false
    }

    fn add_tag(&mut self, _tag: Tag) {}

    fn tags(&self) -> &Tags {
        &NO_TAGS
    }

    fn end(&mut self) {}
}

/// Handle for a running startup step
///
/// ```rust
/// use sprout_metrics::{ApplicationStartup, DefaultApplicationStartup};
///
/// let startup = DefaultApplicationStartup;
/// let step = startup
///     .start("spring.context.component-classes.register")
///     .tag("classes", "[AppConfig]");
/// // ... timed work ...
/// step.end();
/// ```
#[must_use = "a step is ended when the handle is dropped"]
pub struct StartupStep {
    inner: Box<dyn Step>,
}

impl StartupStep {
    /// Wrap a recorder-specific step
    #[inline]
    pub fn new(inner: Box<dyn Step>) -> Self {
        Self { inner }
    }

    /// Handle that records nothing
    #[inline]
    pub fn noop() -> Self {
        Self::new(Box::new(NoopStep))
    }

    /// Sequence id of this step
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id()
    }

    /// Sequence id of the enclosing step, `None` for top-level steps
    #[inline]
    #[must_use]
    pub fn parent_id(&self) -> Option<u64> {
        self.inner.parent_id()
    }

    /// Step name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Tags attached so far
    #[inline]
    #[must_use]
    pub fn tags(&self) -> &Tags {
        self.inner.tags()
    }

    /// Attach a tag with a known value
    pub fn tag(mut self, key: &str, value: impl Into<String>) -> Self {
        self.add_tag(key, value);
        self
    }

    /// Attach a tag whose value is computed when the step ends
    pub fn tag_with<F>(mut self, key: &str, supplier: F) -> Self
    where
        F: FnOnce() -> String + Send + Sync + 'static,
    {
        self.add_tag_with(key, supplier);
        self
    }

    /// Attach a tag with a known value, in place
    pub fn add_tag(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        if self.inner.records_tags() {
            self.inner.add_tag(Tag::new(key, TagValue::Ready(value.into())));
        }
        self
    }

    /// Attach a deferred tag, in place
    pub fn add_tag_with<F>(&mut self, key: &str, supplier: F) -> &mut Self
    where
        F: FnOnce() -> String + Send + Sync + 'static,
    {
        if self.inner.records_tags() {
            self.inner
                .add_tag(Tag::new(key, TagValue::Deferred(Box::new(supplier))));
        }
        self
    }

    /// Record the end of the step
    pub fn end(mut self) {
        self.inner.end();
    }
}

impl Drop for StartupStep {
    fn drop(&mut self) {
        self.inner.end();
    }
}

impl fmt::Debug for StartupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartupStep")
            .field("id", &self.id())
            .field("parent_id", &self.parent_id())
            .field("name", &self.name())
            .field("tags", self.tags())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn tags_render_bracketed_in_order() {
        let mut tags = Tags::new();
        tags.push(Tag::new("count", TagValue::Ready("42".into())));
        tags.push(Tag::new("mode", TagValue::Ready("eager".into())));

        assert_eq!(tags.to_string(), "[count=42, mode=eager]");
        assert_eq!(Tags::new().to_string(), "[]");
    }

    #[test]
    fn resolve_runs_supplier_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut tags = Tags::new();
        tags.push(Tag::new(
            "lazy",
            TagValue::Deferred(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                "value".to_string()
            })),
        ));

        assert_eq!(tags.get("lazy"), None);
        tags.resolve();
        tags.resolve();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(tags.get("lazy"), Some("value"));
    }

    #[test]
    fn panicking_supplier_drops_only_its_tag() {
        let mut tags = Tags::new();
        tags.push(Tag::new("ok", TagValue::Ready("1".into())));
        tags.push(Tag::new(
            "broken",
            TagValue::Deferred(Box::new(|| -> String { panic!("supplier failure") })),
        ));

        tags.resolve();

        assert_eq!(tags.len(), 1);
        assert_eq!(tags.to_string(), "[ok=1]");
    }

    #[test]
    fn noop_handle_ignores_everything() {
        let step = StartupStep::noop()
            .tag("key", "value")
            .tag_with("lazy", || unreachable!("noop never evaluates suppliers"));

        assert_eq!(step.id(), ROOT_STEP_ID);
        assert_eq!(step.parent_id(), None);
        assert!(step.tags().is_empty());
        step.end();
    }

    #[test]
    fn noop_step_is_zero_sized() {
        assert_eq!(std::mem::size_of::<NoopStep>(), 0);
    }
}
