use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::Deserialize;

use crate::value::ContextRef;

pub type DefinitionRef = Rc<RefCell<CustomBlockDefinition>>;

/// The shape of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    #[default]
    Command,
    Reporter,
    Predicate,
    Hat,
}

impl BlockKind {
    /// Parse a `type` attribute; anything unrecognized is a command.
    pub fn parse(text: &str) -> Self {
        match text {
            "reporter" => BlockKind::Reporter,
            "predicate" => BlockKind::Predicate,
            "hat" => BlockKind::Hat,
            _ => BlockKind::Command,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BlockKind::Command => "command",
            BlockKind::Reporter => "reporter",
            BlockKind::Predicate => "predicate",
            BlockKind::Hat => "hat",
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an input slot is filled when the document leaves it empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Text,
    Boolean,
    Color,
    /// A C-slot taking a script.
    Script,
    Ring,
    Variadic,
}

impl SlotKind {
    pub fn from_type(slot_type: &str) -> Self {
        match slot_type {
            "%b" | "%boolUE" => SlotKind::Boolean,
            "%clr" => SlotKind::Color,
            "%c" | "%cs" | "%cl" | "%ca" => SlotKind::Script,
            "%cmdRing" | "%repRing" | "%predRing" | "%anyUE" => SlotKind::Ring,
            "%inputs" | "%exp" | "%scriptVars" | "%words" | "%lists" => SlotKind::Variadic,
            other if other.starts_with("%mult") => SlotKind::Variadic,
            _ => SlotKind::Text,
        }
    }
}

/// Declared type and default of one custom block parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDeclaration {
    pub slot_type: String,
    pub default: String,
    /// Menu entries, one per line as written.
    pub options: Option<String>,
    pub read_only: bool,
}

impl Default for ParameterDeclaration {
    fn default() -> Self {
        ParameterDeclaration {
            slot_type: "%s".to_string(),
            default: String::new(),
            options: None,
            read_only: false,
        }
    }
}

/// A user-authored block.
///
/// Definitions are created from their spec string before any script is
/// loaded; `body` is filled in afterwards so bodies may call any definition.
#[derive(Debug, Clone)]
pub struct CustomBlockDefinition {
    pub spec: String,
    pub category: String,
    pub kind: BlockKind,
    pub is_global: bool,
    pub parameters: Vec<String>,
    pub declarations: Vec<(String, ParameterDeclaration)>,
    pub body: Option<ContextRef>,
}

impl CustomBlockDefinition {
    /// Declare a definition from its spec, e.g. `move %'steps' twice`.
    pub fn declare(spec: impl Into<String>, kind: BlockKind, category: impl Into<String>) -> Self {
        let spec = spec.into();
        let parameters = parameter_names(&spec);
        CustomBlockDefinition {
            spec,
            category: category.into(),
            kind,
            is_global: false,
            parameters,
            declarations: Vec::new(),
            body: None,
        }
    }

    pub fn shared(self) -> DefinitionRef {
        Rc::new(RefCell::new(self))
    }

    pub fn declaration(&self, parameter: &str) -> Option<&ParameterDeclaration> {
        self.declarations
            .iter()
            .find(|(name, _)| name == parameter)
            .map(|(_, decl)| decl)
    }

    pub fn slot_type(&self, parameter: &str) -> &str {
        self.declaration(parameter)
            .map(|decl| decl.slot_type.as_str())
            .unwrap_or("%s")
    }

    pub fn declare_parameter(&mut self, name: impl Into<String>, declaration: ParameterDeclaration) {
        let name = name.into();
        match self.declarations.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = declaration,
            None => self.declarations.push((name, declaration)),
        }
    }

    /// The spec with each parameter replaced by its declared slot type. This
    /// is the text call sites use to name the definition.
    pub fn signature(&self) -> String {
        spec_words(&self.spec)
            .into_iter()
            .map(|word| match parameter_name(word) {
                Some(name) => self.slot_type(&name).to_string(),
                None => word.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Slot kinds of the parameters, in order.
    pub fn slot_kinds(&self) -> Vec<SlotKind> {
        self.parameters
            .iter()
            .map(|name| SlotKind::from_type(self.slot_type(name)))
            .collect()
    }
}

/// Parameter names declared by a spec, in order of appearance.
pub fn parameter_names(spec: &str) -> Vec<String> {
    spec_words(spec).into_iter().filter_map(parameter_name).collect()
}

fn parameter_name(word: &str) -> Option<String> {
    let rest = word.strip_prefix('%')?;
    if rest.is_empty() {
        return None;
    }
    let name = rest
        .strip_prefix('\'')
        .and_then(|r| r.strip_suffix('\''))
        .unwrap_or(rest);
    Some(name.to_string())
}

/// Split a spec into words. A quoted parameter name may contain spaces.
fn spec_words(spec: &str) -> Vec<&str> {
    let mut words = Vec::new();
    let mut start: Option<usize> = None;
    let mut quoted = false;
    let mut prev = ' ';
    for (i, ch) in spec.char_indices() {
        match ch {
            '\'' if prev == '%' => quoted = true,
            '\'' if quoted => quoted = false,
            ' ' if !quoted => {
                if let Some(s) = start.take() {
                    words.push(&spec[s..i]);
                }
                prev = ch;
                continue;
            }
            _ => {}
        }
        if start.is_none() {
            start = Some(i);
        }
        prev = ch;
    }
    if let Some(s) = start {
        words.push(&spec[s..]);
    }
    words
}
