use crate::definition::DefinitionRef;
use crate::operations::Operation;
use crate::value::{Color, Value};

/// A stack of blocks, optionally placed on a scripting area.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub position: Option<(f64, f64)>,
    pub blocks: Vec<Block>,
}

impl Script {
    pub fn new(blocks: Vec<Block>) -> Self {
        Script {
            position: None,
            blocks,
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Some((x, y));
        self
    }

    /// Every block in this script, nested ones included, in document order.
    pub fn walk(&self) -> Vec<&Block> {
        let mut out = Vec::new();
        for block in &self.blocks {
            block.walk_into(&mut out);
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub selector: Selector,
    pub inputs: Vec<Input>,
}

impl Block {
    pub fn new(selector: Selector, inputs: Vec<Input>) -> Self {
        Block { selector, inputs }
    }

    pub fn primitive(operation: Operation, inputs: Vec<Input>) -> Self {
        Block::new(Selector::Primitive(operation), inputs)
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Block::new(Selector::Variable(name.into()), Vec::new())
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.selector, Selector::Obsolete { .. })
    }

    fn walk_into<'a>(&'a self, out: &mut Vec<&'a Block>) {
        out.push(self);
        for input in &self.inputs {
            input.walk_into(out);
        }
    }
}

/// What a block does.
#[derive(Debug, Clone)]
pub enum Selector {
    Primitive(Operation),
    /// A variable getter.
    Variable(String),
    /// A call to a custom block. `scope` names the target owning the called
    /// definition; without it the definition is global, or local to the
    /// target whose code holds the call, which saving writes as the scope.
    Custom {
        definition: DefinitionRef,
        scope: Option<String>,
    },
    /// Stand-in for a block that could not be resolved while loading. The
    /// selector or signature it was loaded with is kept so saving writes the
    /// block back unchanged.
    Obsolete { origin: Origin, spec: String },
}

/// Which kind of element a placeholder was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Primitive,
    Custom { scope: Option<String> },
}

/// One argument slot of a block.
#[derive(Debug, Clone)]
pub enum Input {
    Value(Value),
    Color(Color),
    /// A C-slot holding a nested script.
    Script(Script),
    Reporter(Box<Block>),
    /// A reporter that is wrapped into a ring when the block runs.
    AutoLambda(Box<Block>),
    Variadic(Vec<Input>),
}

impl Input {
    pub fn empty() -> Self {
        Input::Value(Value::default())
    }

    pub fn text(text: impl Into<String>) -> Self {
        Input::Value(Value::text(text))
    }

    fn walk_into<'a>(&'a self, out: &mut Vec<&'a Block>) {
        match self {
            Input::Script(script) => {
                for block in &script.blocks {
                    block.walk_into(out);
                }
            }
            Input::Reporter(block) | Input::AutoLambda(block) => block.walk_into(out),
            Input::Variadic(inputs) => {
                for input in inputs {
                    input.walk_into(out);
                }
            }
            Input::Value(_) | Input::Color(_) => {}
        }
    }
}

/// The code held by a context.
#[derive(Debug, Clone)]
pub enum Expression {
    Script(Script),
    Block(Box<Block>),
    /// A bare slot, written as literal text.
    Slot(String),
}
