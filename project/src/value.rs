use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::media::{CostumeRef, SoundRef};
use crate::script::Expression;
use crate::target::TargetRef;

pub type ListRef = Rc<RefCell<List>>;
pub type ContextRef = Rc<RefCell<Context>>;
pub type FrameRef = Rc<RefCell<VariableFrame>>;

/// A runtime value stored in a variable, a list item or a block input.
#[derive(Clone)]
pub enum Value {
    Text(String),
    Bool(bool),
    Color(Color),
    List(ListRef),
    Context(ContextRef),
    Costume(CostumeRef),
    Sound(SoundRef),
    /// A sprite or the stage. Only ever written as a reference.
    Target(TargetRef),
}

impl Value {
    /// The value of a variable that was declared without one.
    pub fn zero() -> Self {
        Value::Text("0".to_string())
    }

    pub fn text(text: impl Into<String>) -> Self {
        Value::Text(text.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(List::Array(items))))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListRef> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_context(&self) -> Option<&ContextRef> {
        match self {
            Value::Context(context) => Some(context),
            _ => None,
        }
    }

    /// Whether both values are the same shared object. Plain values never are.
    pub fn same_object(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Context(a), Value::Context(b)) => Rc::ptr_eq(a, b),
            (Value::Costume(a), Value::Costume(b)) => Rc::ptr_eq(a, b),
            (Value::Sound(a), Value::Sound(b)) => Rc::ptr_eq(a, b),
            (Value::Target(a), Value::Target(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Text(String::new())
    }
}

// Shared values can form cycles, so Debug never descends into them.
impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(text) => write!(f, "Text({:?})", text),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Color(color) => write!(f, "Color({})", color),
            Value::List(list) => match list.try_borrow() {
                Ok(list) => write!(f, "List(len={})", list.len()),
                Err(_) => write!(f, "List(..)"),
            },
            Value::Context(_) => write!(f, "Context(..)"),
            Value::Costume(costume) => match costume.try_borrow() {
                Ok(costume) => write!(f, "Costume({:?})", costume.name),
                Err(_) => write!(f, "Costume(..)"),
            },
            Value::Sound(sound) => match sound.try_borrow() {
                Ok(sound) => write!(f, "Sound({:?})", sound.name),
                Err(_) => write!(f, "Sound(..)"),
            },
            Value::Target(target) => match target.try_borrow() {
                Ok(target) => write!(f, "Target({:?})", target.name),
                Err(_) => write!(f, "Target(..)"),
            },
        }
    }
}

/// An RGBA color; channels are 0-255, alpha is 0-1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Color {
    pub const fn rgb(r: f64, g: f64, b: f64) -> Self {
        Color { r, g, b, a: 1.0 }
    }

    /// Parse `r,g,b` or `r,g,b,a`. Returns `None` for anything else.
    pub fn parse(text: &str) -> Option<Self> {
        let fields: Vec<f64> = text
            .split(',')
            .map(|field| field.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .ok()?;
        match fields[..] {
            [r, g, b] => Some(Color::rgb(r, g, b)),
            [r, g, b, a] => Some(Color { r, g, b, a }),
            _ => None,
        }
    }

    /// The three-field form written for opaque colours.
    pub fn to_rgb_string(&self) -> String {
        format!("{},{},{}", self.r, self.g, self.b)
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::rgb(0.0, 0.0, 0.0)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.r, self.g, self.b, self.a)
    }
}

/// A list value. Linked lists are cons chains whose tail is another list.
#[derive(Debug)]
pub enum List {
    Array(Vec<Value>),
    Linked { first: Value, rest: Option<ListRef> },
}

impl List {
    /// Build a cons chain holding `values`; an empty input gives an empty array.
    pub fn linked(values: Vec<Value>) -> List {
        let mut values = values.into_iter();
        let Some(first) = values.next() else {
            return List::Array(Vec::new());
        };
        let mut rest: Option<ListRef> = None;
        for value in values.rev() {
            rest = Some(Rc::new(RefCell::new(List::Linked { first: value, rest })));
        }
        List::Linked { first, rest }
    }

    pub fn is_linked(&self) -> bool {
        matches!(self, List::Linked { .. })
    }

    /// Items in order, following the chain for linked lists.
    pub fn items(&self) -> Vec<Value> {
        match self {
            List::Array(items) => items.clone(),
            List::Linked { first, rest } => {
                let mut items = vec![first.clone()];
                let mut next = rest.clone();
                while let Some(cell) = next {
                    let cell = cell.borrow();
                    match &*cell {
                        List::Linked { first, rest } => {
                            items.push(first.clone());
                            next = rest.clone();
                        }
                        List::Array(tail) => {
                            items.extend(tail.iter().cloned());
                            next = None;
                        }
                    }
                }
                items
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            List::Array(items) => items.len(),
            List::Linked { .. } => self.items().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A scope of named variables with a link to the enclosing scope.
#[derive(Default)]
pub struct VariableFrame {
    pub vars: Vec<(String, Value)>,
    pub parent: Option<FrameRef>,
}

impl VariableFrame {
    pub fn new(parent: Option<FrameRef>) -> Self {
        VariableFrame {
            vars: Vec::new(),
            parent,
        }
    }

    pub fn shared(parent: Option<FrameRef>) -> FrameRef {
        Rc::new(RefCell::new(VariableFrame::new(parent)))
    }

    /// Value of a variable declared directly in this frame.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Declare or overwrite a variable in this frame, keeping declaration order.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.vars.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.vars.push((name, value)),
        }
    }

    /// Look a variable up here, then in each enclosing frame.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.get(name) {
            return Some(value.clone());
        }
        let mut next = self.parent.clone();
        while let Some(frame) = next {
            let frame = frame.borrow();
            if let Some(value) = frame.get(name) {
                return Some(value.clone());
            }
            next = frame.parent.clone();
        }
        None
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.iter().map(|(n, _)| n.as_str())
    }
}

impl fmt::Debug for VariableFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableFrame")
            .field("vars", &self.vars)
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

/// A closure: an expression together with its parameters, captured
/// variables, receiver and enclosing context.
#[derive(Default)]
pub struct Context {
    pub expression: Option<Expression>,
    pub inputs: Vec<String>,
    pub variables: FrameRef,
    pub receiver: Option<TargetRef>,
    pub outer: Option<ContextRef>,
}

impl Context {
    pub fn new(variables: FrameRef) -> Self {
        Context {
            expression: None,
            inputs: Vec::new(),
            variables,
            receiver: None,
            outer: None,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("expression", &self.expression)
            .field("inputs", &self.inputs)
            .field("has_receiver", &self.receiver.is_some())
            .field("has_outer", &self.outer.is_some())
            .finish()
    }
}
