use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Display;
use std::rc::Rc;

use crate::template::render;

/// The capability of producing markup for one kind of object.
///
/// Producers build their output with [`Serializer::format`] and hand shared
/// children back to [`Serializer::store`], which decides whether the child is
/// written in full or as a reference.
pub trait ToMarkup {
    fn to_markup(&self, serializer: &mut Serializer) -> String;
}

impl<T: ToMarkup + ?Sized> ToMarkup for RefCell<T> {
    fn to_markup(&self, serializer: &mut Serializer) -> String {
        self.borrow().to_markup(serializer)
    }
}

/// Identity-preserving encoder state for one serialization call.
///
/// Objects are identified by the address of their `Rc` allocation. The
/// registry lives only as long as the serializer, so nothing is left behind
/// on the objects once a call finishes.
#[derive(Debug, Default)]
pub struct Serializer {
    ids: HashMap<usize, usize>,
    /// Ids of the objects whose producers are currently running, innermost last.
    encoding: Vec<usize>,
    next_id: usize,
}

impl Serializer {
    pub fn new() -> Self {
        Serializer::default()
    }

    /// Encode `object`, or a `<ref>` to it if this call already encoded it.
    pub fn store<T: ToMarkup + ?Sized>(&mut self, object: &Rc<T>) -> String {
        let key = identity(object);
        if let Some(&id) = self.ids.get(&key) {
            log::trace!("object {} already stored, writing reference", id);
            return render("<ref id=\"@\"/>", &[&id], None);
        }

        self.next_id += 1;
        let id = self.next_id;
        self.ids.insert(key, id);

        self.encoding.push(id);
        let markup = object.to_markup(self);
        self.encoding.pop();
        markup
    }

    /// A `<ref>` to `object` if it has been stored during this call.
    pub fn reference<T: ?Sized>(&self, object: &Rc<T>) -> Option<String> {
        self.id_of(object)
            .map(|id| render("<ref id=\"@\"/>", &[&id], None))
    }

    pub fn id_of<T: ?Sized>(&self, object: &Rc<T>) -> Option<usize> {
        self.ids.get(&identity(object)).copied()
    }

    /// Render a pattern for the object currently being stored; `~` becomes
    /// that object's id attribute.
    pub fn format(&self, pattern: &str, args: &[&dyn Display]) -> String {
        render(pattern, args, self.encoding.last().copied())
    }

    /// Number of distinct objects stored so far.
    pub fn stored(&self) -> usize {
        self.ids.len()
    }
}

/// Serialize a root object with a fresh registry.
pub fn serialize<T: ToMarkup + ?Sized>(root: &Rc<T>) -> String {
    let mut serializer = Serializer::new();
    let markup = serializer.store(root);
    log::debug!(
        "serialized {} object(s) into {} bytes",
        serializer.stored(),
        markup.len()
    );
    markup
}

fn identity<T: ?Sized>(object: &Rc<T>) -> usize {
    Rc::as_ptr(object) as *const () as usize
}
