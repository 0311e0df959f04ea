use crate::error_reporting::check_and_set_error_report;
use crate::extract::{extract_value, Extracted};
use crate::level::Level;
use crate::record::{Attr, Record};
use crate::replace::{replace_attr, LEVEL_KEY, MESSAGE_KEY, SOURCE_KEY, TIME_KEY};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

/// Hook that rewrites attributes before they are written.
///
/// Receives the names of the groups the attribute sits in (empty at the
/// top level) and the attribute itself.
pub type ReplaceAttrFn = Arc<dyn Fn(&[String], Attr) -> Attr + Send + Sync>;

/// Options for [`GcpHandler`].
///
/// **Fields**
/// - `level`: minimum level a record needs to be written.
/// - `add_source`: write the record's call site under
///   `logging.googleapis.com/sourceLocation`.
/// - `replace_attr`: optional hook applied to every attribute before error
///   report detection, so a key can be remapped to the error key.
#[derive(Clone)]
pub struct HandlerOptions {
    pub level: Level,
    pub add_source: bool,
    pub replace_attr: Option<ReplaceAttrFn>,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            add_source: false,
            replace_attr: None,
        }
    }
}

impl fmt::Debug for HandlerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerOptions")
            .field("level", &self.level)
            .field("add_source", &self.add_source)
            .field("replace_attr", &self.replace_attr.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Error returned by [`Handler::handle`] when a record cannot be written.
#[derive(thiserror::Error, Debug)]
pub enum HandlerError {
    #[error("gcp_log_sink handler: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("gcp_log_sink handler: {0}")]
    Write(#[from] std::io::Error),
}

/// The operations a logging front-end drives a handler with.
pub trait Handler: Send + Sync {
    /// Whether records at `level` should be passed to [`Handler::handle`].
    fn enabled(&self, level: Level) -> bool;

    /// Write one record.
    fn handle(&self, record: &Record) -> Result<(), HandlerError>;

    /// A handler that adds `attrs` to every record, at the current group.
    fn with_attrs(&self, attrs: Vec<Attr>) -> Self
    where
        Self: Sized;

    /// A handler that nests every following attribute under `name`.
    fn with_group(&self, name: &str) -> Self
    where
        Self: Sized;
}

/// One scoped derivation: either opens a group or adds attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupOrAttrs {
    Group(String),
    Attrs(Vec<Attr>),
}

/// Entries accumulated by `with_group` / `with_attrs`, oldest first.
///
/// Persistent list: pushing returns a new stack that shares every existing
/// entry with its parent, and no existing stack is ever modified.
#[derive(Debug, Clone, Default)]
pub struct GroupAttrStack {
    head: Option<Arc<StackNode>>,
    len: usize,
}

#[derive(Debug)]
struct StackNode {
    entry: GroupOrAttrs,
    parent: Option<Arc<StackNode>>,
}

impl GroupAttrStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new stack equal to `self` plus `entry`.
    pub fn push(&self, entry: GroupOrAttrs) -> Self {
        GroupAttrStack {
            head: Some(Arc::new(StackNode {
                entry,
                parent: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Entries in derivation order.
    pub fn entries(&self) -> Vec<&GroupOrAttrs> {
        let mut out = Vec::with_capacity(self.len);
        let mut node = self.head.as_deref();
        while let Some(n) = node {
            out.push(&n.entry);
            node = n.parent.as_deref();
        }
        out.reverse();
        out
    }
}

type Output = Arc<Mutex<Box<dyn Write + Send>>>;

/// Handler writing one Cloud Logging compatible JSON object per record.
///
/// Attribute values are encoded following [`extract_value`]. When a
/// top-level attribute is keyed [`ERROR_KEY`], the record becomes an Error
/// Reporting event: `@type` is set, `message` is replaced by the error
/// report message and `reportLocation` is added when known.
///
/// Derived handlers share the writer of the handler they were derived
/// from; writes are serialized by a mutex.
///
/// [`ERROR_KEY`]: crate::error_reporting::ERROR_KEY
#[derive(Clone)]
pub struct GcpHandler {
    opts: Arc<HandlerOptions>,
    goas: GroupAttrStack,
    output: Output,
}

impl GcpHandler {
    pub fn new<W>(writer: W, opts: HandlerOptions) -> Self
    where
        W: Write + Send + 'static,
    {
        GcpHandler {
            opts: Arc::new(opts),
            goas: GroupAttrStack::new(),
            output: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn options(&self) -> &HandlerOptions {
        &self.opts
    }

    pub fn stack(&self) -> &GroupAttrStack {
        &self.goas
    }

    fn replace_attr(&self, groups: &[String], attr: Attr) -> Attr {
        match &self.opts.replace_attr {
            Some(f) => f(groups, attr),
            None => attr,
        }
    }

    fn with_group_or_attrs(&self, goa: GroupOrAttrs) -> Self {
        GcpHandler {
            opts: Arc::clone(&self.opts),
            goas: self.goas.push(goa),
            output: Arc::clone(&self.output),
        }
    }

    /// Compose the output object for `record` without writing it.
    pub fn build(&self, record: &Record) -> BTreeMap<String, Extracted> {
        let mut builtins = Vec::with_capacity(4);
        if let Some(time) = record.time {
            builtins.push(Attr::new(TIME_KEY, time));
        }
        if self.opts.add_source {
            if let Some(source) = &record.source {
                builtins.push(Attr::new(SOURCE_KEY, source.clone()));
            }
        }
        if !record.message.is_empty() {
            builtins.push(Attr::new(MESSAGE_KEY, record.message.as_str()));
        }
        builtins.push(Attr::new(LEVEL_KEY, record.level));

        let mut out = BTreeMap::new();
        for a in builtins {
            let a = replace_attr(&[], a);
            out.insert(a.key, Extracted::Value(a.value));
        }

        let mut goas = self.goas.entries();
        if record.num_attrs() == 0 {
            // Groups at the end would stay empty.
            while matches!(goas.last(), Some(GroupOrAttrs::Group(_))) {
                goas.pop();
            }
        }

        // The hook sees each stack attribute once, with the groups it sits in.
        let mut groups: Vec<String> = Vec::new();
        let mut replaced = Vec::with_capacity(goas.len());
        for goa in &goas {
            match goa {
                GroupOrAttrs::Group(name) => {
                    groups.push(name.clone());
                    replaced.push(GroupOrAttrs::Group(name.clone()));
                }
                GroupOrAttrs::Attrs(attrs) => {
                    let attrs = attrs
                        .iter()
                        .map(|a| self.replace_attr(&groups, a.clone()))
                        .collect();
                    replaced.push(GroupOrAttrs::Attrs(attrs));
                }
            }
        }

        // Only attributes outside of any group can carry the error.
        let mut reported = false;
        'scan: for goa in &replaced {
            let GroupOrAttrs::Attrs(attrs) = goa else {
                break;
            };
            for a in attrs {
                if check_and_set_error_report(a, &mut out) {
                    reported = true;
                    break 'scan;
                }
            }
        }

        groups.clear();
        for goa in replaced {
            match goa {
                GroupOrAttrs::Group(name) => {
                    current_group(&mut out, &groups)
                        .insert(name.clone(), Extracted::Map(BTreeMap::new()));
                    groups.push(name);
                }
                GroupOrAttrs::Attrs(attrs) => {
                    let group = current_group(&mut out, &groups);
                    for a in attrs {
                        let value = extract_value(&a.value);
                        group.insert(a.key, value);
                    }
                }
            }
        }

        for a in record.attrs() {
            let a = self.replace_attr(&groups, a.clone());
            if groups.is_empty() && !reported {
                reported = check_and_set_error_report(&a, &mut out);
            }
            current_group(&mut out, &groups).insert(a.key, extract_value(&a.value));
        }
        out
    }
}

/// The map for the innermost open group, creating missing levels.
fn current_group<'a>(
    out: &'a mut BTreeMap<String, Extracted>,
    groups: &[String],
) -> &'a mut BTreeMap<String, Extracted> {
    let mut map = out;
    for name in groups {
        let slot = map
            .entry(name.clone())
            .or_insert_with(|| Extracted::Map(BTreeMap::new()));
        if let Extracted::Value(_) = slot {
            *slot = Extracted::Map(BTreeMap::new());
        }
        map = match slot {
            Extracted::Map(m) => m,
            Extracted::Value(_) => unreachable!("group slot is always a map"),
        };
    }
    map
}

impl Handler for GcpHandler {
    fn enabled(&self, level: Level) -> bool {
        level >= self.opts.level
    }

    fn handle(&self, record: &Record) -> Result<(), HandlerError> {
        let out = self.build(record);

        let mut writer = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        let mut line = serde_json::to_vec(&out)?;
        line.push(b'\n');
        writer.write_all(&line)?;
        Ok(())
    }

    fn with_attrs(&self, attrs: Vec<Attr>) -> Self {
        if attrs.is_empty() {
            return self.clone();
        }
        self.with_group_or_attrs(GroupOrAttrs::Attrs(attrs))
    }

    fn with_group(&self, name: &str) -> Self {
        if name.is_empty() {
            return self.clone();
        }
        self.with_group_or_attrs(GroupOrAttrs::Group(name.to_string()))
    }
}

impl fmt::Debug for GcpHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcpHandler")
            .field("opts", &self.opts)
            .field("goas", &self.goas.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    #[test]
    fn push_never_touches_the_parent() {
        let root = GroupAttrStack::new();
        let a = root.push(GroupOrAttrs::Group("g".into()));
        let b = a.push(GroupOrAttrs::Attrs(vec![Attr::new("k", 1)]));
        let c = a.push(GroupOrAttrs::Attrs(vec![Attr::new("k", 2)]));

        assert!(root.is_empty());
        assert_eq!(a.len(), 1);
        assert_eq!(
            b.entries(),
            vec![
                &GroupOrAttrs::Group("g".into()),
                &GroupOrAttrs::Attrs(vec![Attr::new("k", 1)])
            ]
        );
        assert_eq!(c.entries()[1], &GroupOrAttrs::Attrs(vec![Attr::new("k", 2)]));
    }

    #[test]
    fn empty_derivations_add_no_entry() {
        let h = GcpHandler::new(MemorySink::default(), HandlerOptions::default());
        assert!(h.with_group("").stack().is_empty());
        assert!(h.with_attrs(Vec::new()).stack().is_empty());
    }

    #[test]
    fn derivation_leaves_parent_output_unchanged() {
        let sink = MemorySink::default();
        let parent = GcpHandler::new(sink.clone(), HandlerOptions::default());
        let _child = parent.with_group("g").with_attrs(vec![Attr::new("a", 1)]);

        parent
            .handle(&Record::new(None, Level::INFO, "hi"))
            .unwrap();
        assert_eq!(sink.lines(), vec![r#"{"message":"hi","severity":"INFO"}"#]);
    }

    #[test]
    fn enabled_respects_minimum_level() {
        let h = GcpHandler::new(MemorySink::default(), HandlerOptions::default());
        assert!(!h.enabled(Level::DEBUG));
        assert!(h.enabled(Level::INFO));
        assert!(h.enabled(Level::EMERGENCY));
    }

    #[test]
    fn nested_groups_materialize_when_record_has_attrs() {
        let h = GcpHandler::new(MemorySink::default(), HandlerOptions::default())
            .with_group("a")
            .with_group("b");
        let out = h.build(&Record::new(None, Level::INFO, "").with_attrs([Attr::new("k", "v")]));
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"severity": "INFO", "a": {"b": {"k": "v"}}})
        );
    }

    #[test]
    fn inner_empty_group_kept_when_followed_by_content() {
        let h = GcpHandler::new(MemorySink::default(), HandlerOptions::default())
            .with_group("a")
            .with_attrs(vec![Attr::new("x", 1)])
            .with_group("b");
        let out = h.build(&Record::new(None, Level::INFO, ""));
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json, serde_json::json!({"severity": "INFO", "a": {"x": 1}}));
    }

    #[test]
    fn grouped_error_key_is_not_reported() {
        let h = GcpHandler::new(MemorySink::default(), HandlerOptions::default())
            .with_group("g")
            .with_attrs(vec![Attr::new("error", "hidden")]);
        let out = h.build(&Record::new(None, Level::ERROR, "msg"));
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"message": "msg", "severity": "ERROR", "g": {"error": "hidden"}})
        );
    }

    #[test]
    fn hook_runs_once_per_stack_attribute() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let opts = HandlerOptions {
            replace_attr: Some(Arc::new(move |_: &[String], a: Attr| {
                counter.fetch_add(1, Ordering::SeqCst);
                a
            })),
            ..HandlerOptions::default()
        };
        let h = GcpHandler::new(MemorySink::default(), opts)
            .with_attrs(vec![Attr::new("top", 1)])
            .with_group("g")
            .with_attrs(vec![Attr::new("inner", 2)]);
        let out = h.build(&Record::new(None, Level::INFO, "msg").with_attrs([Attr::new("k", 3)]));

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["top"], 1);
        assert_eq!(json["g"], serde_json::json!({"inner": 2, "k": 3}));
    }

    #[test]
    fn hook_groups_match_nesting() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let opts = HandlerOptions {
            replace_attr: Some(Arc::new(move |groups: &[String], a: Attr| {
                log.lock().unwrap().push((groups.join("."), a.key.clone()));
                a
            })),
            ..HandlerOptions::default()
        };
        let h = GcpHandler::new(MemorySink::default(), opts)
            .with_attrs(vec![Attr::new("a", 1)])
            .with_group("g")
            .with_group("h")
            .with_attrs(vec![Attr::new("b", 2)]);
        h.build(&Record::new(None, Level::INFO, "").with_attrs([Attr::new("c", 3)]));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (String::new(), "a".to_string()),
                ("g.h".to_string(), "b".to_string()),
                ("g.h".to_string(), "c".to_string()),
            ]
        );
    }

    #[test]
    fn first_error_attribute_wins() {
        let h = GcpHandler::new(MemorySink::default(), HandlerOptions::default())
            .with_attrs(vec![Attr::new("error", "from stack")]);
        let out = h.build(
            &Record::new(None, Level::ERROR, "msg").with_attrs([Attr::new("error", "from record")]),
        );
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["message"], "from stack");
    }
}
