use std::cell::RefCell;
use std::rc::Rc;

use markup::Element;

use super::{Loader, Placeholder};
use crate::definition::{BlockKind, CustomBlockDefinition, DefinitionRef, ParameterDeclaration, SlotKind};
use crate::error::LoadError;
use crate::script::{Block, Expression, Input, Origin, Script, Selector};
use crate::target::{TargetRef, find_definition};
use crate::value::{Color, Context, VariableFrame};

/// Create the definitions in a `blocks` section without their bodies.
pub(super) fn declare(section: Option<&Element>, is_global: bool) -> Vec<DefinitionRef> {
    let Some(section) = section else {
        return Vec::new();
    };
    section
        .children_named("block-definition")
        .map(|element| {
            let mut definition = CustomBlockDefinition::declare(
                element.attribute("s").unwrap_or_default(),
                BlockKind::parse(element.attribute("type").unwrap_or_default()),
                element.attribute("category").unwrap_or("other"),
            );
            definition.is_global = is_global;
            if let Some(inputs) = element.child("inputs") {
                let parameters = definition.parameters.clone();
                for (name, input) in parameters.iter().zip(inputs.children_named("input")) {
                    definition.declare_parameter(name.clone(), declaration(input));
                }
            }
            log::trace!("declared custom block {:?}", definition.spec);
            definition.shared()
        })
        .collect()
}

fn declaration(input: &Element) -> ParameterDeclaration {
    ParameterDeclaration {
        slot_type: input.attribute("type").unwrap_or("%s").to_string(),
        default: input.own_text(),
        options: input.child("options").map(Element::contents),
        read_only: input
            .attribute("readonly")
            .is_some_and(|value| value != "false"),
    }
}

fn default_input(kind: SlotKind) -> Input {
    match kind {
        SlotKind::Script => Input::Script(Script::default()),
        SlotKind::Variadic => Input::Variadic(Vec::new()),
        _ => Input::empty(),
    }
}

impl Loader<'_> {
    /// Give each declared definition its body. The body runs with the owner
    /// as receiver, in a frame whose parent is the owner's frame.
    pub(super) fn populate_definitions(
        &mut self,
        section: Option<&Element>,
        definitions: &[DefinitionRef],
        owner: &TargetRef,
    ) -> Result<(), LoadError> {
        let Some(section) = section else {
            return Ok(());
        };
        for (element, definition) in section.children_named("block-definition").zip(definitions) {
            let Some(script) = element.child("script") else {
                continue;
            };
            let script = self.load_script(script, owner)?;
            let frame = VariableFrame::shared(Some(owner.borrow().variables.clone()));
            let mut body = Context::new(frame);
            body.expression = Some(Expression::Script(script));
            body.inputs = definition.borrow().parameters.clone();
            body.receiver = Some(owner.clone());
            definition.borrow_mut().body = Some(Rc::new(RefCell::new(body)));
        }
        Ok(())
    }

    pub(super) fn load_script(&mut self, element: &Element, owner: &TargetRef) -> Result<Script, LoadError> {
        let position = match (element.attribute("x"), element.attribute("y")) {
            (Some(x), Some(y)) => x.trim().parse().ok().zip(y.trim().parse().ok()),
            _ => None,
        };
        let mut blocks = Vec::new();
        for child in element.elements() {
            match child.name.as_str() {
                "block" | "custom-block" => blocks.push(self.load_block(child, owner)?),
                other => log::trace!("skipping <{}> in script", other),
            }
        }
        Ok(Script { position, blocks })
    }

    pub(super) fn load_block(&mut self, element: &Element, owner: &TargetRef) -> Result<Block, LoadError> {
        if let Some(name) = element.attribute("var") {
            return Ok(Block::variable(name));
        }
        let spec = element.attribute("s").unwrap_or_default();
        let (selector, slots) = if element.name == "custom-block" {
            let scope = element.attribute("scope").map(str::to_string);
            match self.find_custom(spec, scope.as_deref()) {
                Some(definition) => {
                    let slots = definition.borrow().slot_kinds();
                    (Selector::Custom { definition, scope }, slots)
                }
                None => {
                    let origin = Origin::Custom { scope };
                    (self.placeholder(element, spec, origin, owner), Vec::new())
                }
            }
        } else {
            match self.operations.get(spec) {
                Some(operation) => (Selector::Primitive(operation.clone()), operation.slot_kinds()),
                None => (self.placeholder(element, spec, Origin::Primitive, owner), Vec::new()),
            }
        };

        let mut inputs = Vec::new();
        for child in element.elements() {
            inputs.push(self.load_input(child, owner)?);
        }
        for &kind in slots.iter().skip(inputs.len()) {
            inputs.push(default_input(kind));
        }
        Ok(Block { selector, inputs })
    }

    /// A scoped call looks in the named target only; an unscoped one in the
    /// global definitions only.
    fn find_custom(&self, signature: &str, scope: Option<&str>) -> Option<DefinitionRef> {
        match scope {
            Some(scope) => self
                .scopes
                .get(scope)
                .and_then(|target| target.borrow().definition(signature)),
            None => find_definition(&self.global_blocks, signature),
        }
    }

    fn placeholder(&mut self, element: &Element, spec: &str, origin: Origin, owner: &TargetRef) -> Selector {
        let owner = owner.borrow().name.clone();
        log::warn!(
            "unresolved <{}> {:?} in {}, substituting a placeholder",
            element.name,
            spec,
            owner
        );
        self.report.placeholders.push(Placeholder {
            spec: spec.to_string(),
            owner,
            span: element.span.clone(),
        });
        Selector::Obsolete {
            origin,
            spec: spec.to_string(),
        }
    }

    fn load_input(&mut self, element: &Element, owner: &TargetRef) -> Result<Input, LoadError> {
        let input = match element.name.as_str() {
            "script" => Input::Script(self.load_script(element, owner)?),
            "autolambda" => match element.elements().next() {
                Some(block) => Input::AutoLambda(Box::new(self.load_block(block, owner)?)),
                None => Input::empty(),
            },
            // lists with an id or a linked flag are list values, not slots
            "list" if !element.has_attribute("id") && !element.has_attribute("linked") => {
                let mut items = Vec::new();
                for item in element.elements() {
                    items.push(self.load_input(item, owner)?);
                }
                Input::Variadic(items)
            }
            "block" | "custom-block" => Input::Reporter(Box::new(self.load_block(element, owner)?)),
            "color" => match Color::parse(&element.contents()) {
                Some(color) => Input::Color(color),
                None => Input::text(element.contents()),
            },
            _ => Input::Value(self.decode_value(element, owner)?),
        };
        Ok(input)
    }
}
