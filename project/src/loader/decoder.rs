use std::cell::RefCell;
use std::rc::Rc;

use markup::Element;

use super::{Loader, Registered, number};
use crate::error::LoadError;
use crate::media::{Costume, Media, MediaKind, Sound};
use crate::script::Expression;
use crate::target::TargetRef;
use crate::value::{Color, Context, List, Value, VariableFrame};

impl Loader<'_> {
    /// Decode a value element. Unknown tags decode as empty text.
    pub(super) fn decode_value(&mut self, element: &Element, owner: &TargetRef) -> Result<Value, LoadError> {
        let value = match element.name.as_str() {
            "ref" => self.resolve(element)?,
            "l" => Value::Text(element.contents()),
            "bool" => Value::Bool(element.contents().trim() == "true"),
            "color" => match Color::parse(&element.contents()) {
                Some(color) => Value::Color(color),
                None => Value::Text(element.contents()),
            },
            "list" => self.decode_list(element, owner)?,
            "context" => self.decode_context(element, owner)?,
            "costume" => self.decode_costume(element),
            "sound" => self.decode_sound(element),
            "sprite" => self.decode_sprite(element)?,
            other => {
                log::trace!("decoding unknown <{}> as empty text", other);
                Value::default()
            }
        };
        Ok(value)
    }

    /// The list is registered before its items so items may refer back to it.
    fn decode_list(&mut self, element: &Element, owner: &TargetRef) -> Result<Value, LoadError> {
        let list = Rc::new(RefCell::new(List::Array(Vec::new())));
        self.register(element, Registered::List(list.clone()));

        let mut items = Vec::new();
        for item in element.children_named("item") {
            let value = match item.elements().next() {
                Some(value) => self.decode_value(value, owner)?,
                None => Value::zero(),
            };
            items.push(value);
        }

        let decoded = if element.has_attribute("linked") {
            List::linked(items)
        } else {
            List::Array(items)
        };
        *list.borrow_mut() = decoded;
        Ok(Value::List(list))
    }

    fn decode_context(&mut self, element: &Element, owner: &TargetRef) -> Result<Value, LoadError> {
        let frame = VariableFrame::shared(None);
        let context = Rc::new(RefCell::new(Context::new(frame.clone())));
        self.register(element, Registered::Context(context.clone()));

        let inputs: Vec<String> = element
            .child("inputs")
            .map(|inputs| inputs.children_named("input").map(Element::contents).collect())
            .unwrap_or_default();
        if let Some(variables) = element.child("variables") {
            self.load_variables(variables, &frame, owner)?;
        }

        let mut expression = None;
        for child in element.elements() {
            expression = match child.name.as_str() {
                "script" => Some(Expression::Script(self.load_script(child, owner)?)),
                "block" | "custom-block" => Some(Expression::Block(Box::new(self.load_block(child, owner)?))),
                "l" => Some(Expression::Slot(child.contents())),
                _ => continue,
            };
            break;
        }

        let mut receiver = None;
        if let Some(target) = element.child("receiver").and_then(|r| r.elements().next()) {
            match self.decode_value(target, owner)? {
                Value::Target(target) => receiver = Some(target),
                other => log::warn!("context receiver is not a target: {:?}", other),
            }
        }

        let mut outer = None;
        if let Some(child) = element
            .elements()
            .find(|child| child.name == "context" || child.name == "ref")
        {
            match self.decode_value(child, owner)? {
                Value::Context(context) => outer = Some(context),
                other => log::warn!("outer context is not a context: {:?}", other),
            }
        }

        {
            let mut context = context.borrow_mut();
            context.inputs = inputs;
            context.expression = expression;
            context.receiver = receiver;
            context.outer = outer;
        }
        Ok(Value::Context(context))
    }

    /// A sprite met as a value is loaded in place; its shell already exists.
    pub(super) fn decode_sprite(&mut self, element: &Element) -> Result<Value, LoadError> {
        let Some(sprite) = self.shells.get(&element.span.start).cloned() else {
            log::warn!("no shell for <sprite> at byte {}", element.span.start);
            return Ok(Value::default());
        };
        self.load_sprite(element, &sprite)?;
        Ok(Value::Target(sprite))
    }

    fn decode_costume(&mut self, element: &Element) -> Value {
        let image = Media::new(MediaKind::Image, element.attribute("image").unwrap_or_default());
        let costume = Costume::new(
            element.attribute("name").unwrap_or_default(),
            (number(element, "center-x", 0.0), number(element, "center-y", 0.0)),
            image.clone(),
        );
        self.register(element, Registered::Costume(costume.clone()));
        self.decoder.request(image);
        Value::Costume(costume)
    }

    fn decode_sound(&mut self, element: &Element) -> Value {
        let audio = Media::new(MediaKind::Audio, element.attribute("sound").unwrap_or_default());
        let sound = Sound::new(element.attribute("name").unwrap_or_default(), audio.clone());
        self.register(element, Registered::Sound(sound.clone()));
        self.decoder.request(audio);
        Value::Sound(sound)
    }
}
