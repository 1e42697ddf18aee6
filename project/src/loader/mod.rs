mod blocks;
mod decoder;

use std::collections::HashMap;
use std::ops::Range;

use markup::{Element, Parser};

use crate::FORMAT_VERSION;
use crate::definition::DefinitionRef;
use crate::error::LoadError;
use crate::media::{CostumeRef, Media, MediaDecoder, MediaKind, NoDecoder, SoundRef};
use crate::operations::OperationTable;
use crate::target::{Project, Target, TargetRef, Watcher, WatcherSubject};
use crate::value::{Color, ContextRef, FrameRef, ListRef, Value, VariableFrame};

/// An object registered under a document id.
#[derive(Clone)]
enum Registered {
    List(ListRef),
    Context(ContextRef),
    Costume(CostumeRef),
    Sound(SoundRef),
    Target(TargetRef),
}

impl Registered {
    fn into_value(self) -> Value {
        match self {
            Registered::List(list) => Value::List(list),
            Registered::Context(context) => Value::Context(context),
            Registered::Costume(costume) => Value::Costume(costume),
            Registered::Sound(sound) => Value::Sound(sound),
            Registered::Target(target) => Value::Target(target),
        }
    }
}

/// A block that could not be resolved and was replaced by a placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct Placeholder {
    pub spec: String,
    /// Name of the sprite or stage whose code contained it.
    pub owner: String,
    pub span: Range<usize>,
}

/// What a load recovered from instead of failing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub placeholders: Vec<Placeholder>,
    /// Descriptions of watchers whose scope named no sprite.
    pub dropped_watchers: Vec<String>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.placeholders.is_empty() && self.dropped_watchers.is_empty()
    }
}

/// State for one load call: the id registry, the custom block scopes and
/// the collaborators that resolve primitives and media.
pub struct Loader<'a> {
    operations: &'a OperationTable,
    decoder: &'a mut dyn MediaDecoder,
    /// Source file ID for codespan-reporting diagnostics.
    pub file_id: usize,
    objects: HashMap<String, Registered>,
    /// Targets by name, for scoped custom block calls and watchers.
    scopes: HashMap<String, TargetRef>,
    /// Sprite shells by the offset of their element, wherever it appears.
    shells: HashMap<usize, TargetRef>,
    global_blocks: Vec<DefinitionRef>,
    report: LoadReport,
}

impl<'a> Loader<'a> {
    pub fn new(operations: &'a OperationTable, decoder: &'a mut dyn MediaDecoder) -> Self {
        Loader {
            operations,
            decoder,
            file_id: 0,
            objects: HashMap::new(),
            scopes: HashMap::new(),
            shells: HashMap::new(),
            global_blocks: Vec::new(),
            report: LoadReport::default(),
        }
    }

    pub fn with_file_id(mut self, file_id: usize) -> Self {
        self.file_id = file_id;
        self
    }

    /// Load a project document.
    pub fn load(mut self, source: &str) -> Result<(Project, LoadReport), LoadError> {
        let root = Parser::new(source, self.file_id).parse()?;
        if root.name != "project" {
            return Err(LoadError::UnexpectedRoot {
                found: root.name.clone(),
                span: root.span.clone(),
            });
        }
        check_version(&root)?;

        let stage_element = required(&root, "stage")?;
        let sprites_element = required(stage_element, "sprites")?;

        // Stage 1: shells for every target and every definition they declare.
        let globals = VariableFrame::shared(None);
        let stage = Target::stage(
            stage_element.attribute("name").unwrap_or("Stage"),
            Some(globals.clone()),
        );
        self.global_blocks = blocks::declare(root.child("blocks"), true);
        stage.borrow_mut().blocks = blocks::declare(stage_element.child("blocks"), false);
        self.add_scope(&stage);

        // A sprite is written where it is first met, which may be a value
        // inside the stage or another sprite rather than `<sprites>`.
        let mut elements = Vec::new();
        sprite_elements(&root, &mut elements);
        for element in elements {
            let sprite = Target::sprite(
                element.attribute("name").unwrap_or("Sprite"),
                Some(globals.clone()),
            );
            sprite.borrow_mut().blocks = blocks::declare(element.child("blocks"), false);
            self.add_scope(&sprite);
            self.shells.insert(element.span.start, sprite);
        }
        log::debug!(
            "declared {} global definition(s) and {} target(s)",
            self.global_blocks.len(),
            self.shells.len() + 1
        );

        // Stage 2: everything else, in document order.
        self.load_stage(stage_element, &stage)?;
        let sprites = self.load_sprite_list(sprites_element)?;
        let watchers = self.load_watchers(sprites_element);
        if let Some(info) = stage.borrow_mut().as_stage_mut() {
            info.sprites = sprites;
            info.watchers = watchers;
        }
        let global_blocks = self.global_blocks.clone();
        self.populate_definitions(root.child("blocks"), &global_blocks, &stage)?;
        if let Some(variables) = root.child("variables") {
            self.load_variables(variables, &globals, &stage)?;
        }

        let thumbnail = root.child("thumbnail").map(|element| {
            let media = Media::new(MediaKind::Image, element.contents());
            self.decoder.request(media.clone());
            media
        });
        let project = Project {
            name: root.attribute("name").unwrap_or_default().to_string(),
            notes: root.child("notes").map(Element::contents).unwrap_or_default(),
            thumbnail,
            stage,
            global_blocks: self.global_blocks,
            globals,
        };
        log::debug!(
            "loaded project {:?}: {} object id(s), {} placeholder(s)",
            project.name,
            self.objects.len(),
            self.report.placeholders.len()
        );
        Ok((project, self.report))
    }

    fn add_scope(&mut self, target: &TargetRef) {
        let name = target.borrow().name.clone();
        self.scopes.entry(name).or_insert_with(|| target.clone());
    }

    fn register(&mut self, element: &Element, object: Registered) {
        if let Some(id) = element.attribute("id") {
            if self.objects.insert(id.to_string(), object).is_some() {
                log::warn!("object id {} is defined more than once", id);
            }
        }
    }

    /// Look up a `ref` element. Ids must be defined earlier in the document.
    fn resolve(&self, element: &Element) -> Result<Value, LoadError> {
        let id = element.attribute("id").unwrap_or_default();
        match self.objects.get(id) {
            Some(object) => {
                log::trace!("resolved reference to object {}", id);
                Ok(object.clone().into_value())
            }
            None => Err(LoadError::UnresolvedReference {
                id: id.to_string(),
                span: element.span.clone(),
            }),
        }
    }

    fn load_stage(&mut self, element: &Element, stage: &TargetRef) -> Result<(), LoadError> {
        self.register(element, Registered::Target(stage.clone()));
        {
            let mut target = stage.borrow_mut();
            if let Some(info) = target.as_stage_mut() {
                info.width = number(element, "width", info.width);
                info.height = number(element, "height", info.height);
                info.tempo = number(element, "tempo", info.tempo);
                info.threadsafe = flag(element, "threadsafe");
                info.pen_trails = element.child("pentrails").map(Element::contents);
            }
        }
        self.load_target_body(element, stage)
    }

    /// The stage's sprites in order. An entry is either the sprite itself or
    /// a reference to one already loaded as a value.
    fn load_sprite_list(&mut self, element: &Element) -> Result<Vec<TargetRef>, LoadError> {
        let mut sprites = Vec::new();
        for child in element.elements() {
            let value = match child.name.as_str() {
                "sprite" => self.decode_sprite(child)?,
                "ref" => self.resolve(child)?,
                _ => continue,
            };
            match value {
                Value::Target(sprite) if sprite.borrow().as_sprite().is_some() => {
                    if let Some(info) = sprite.borrow_mut().as_sprite_mut() {
                        if info.idx == 0 {
                            info.idx = sprites.len() + 1;
                        }
                    }
                    sprites.push(sprite);
                }
                other => log::warn!("ignoring non-sprite entry in <sprites>: {:?}", other),
            }
        }
        Ok(sprites)
    }

    fn load_sprite(&mut self, element: &Element, sprite: &TargetRef) -> Result<(), LoadError> {
        self.register(element, Registered::Target(sprite.clone()));
        {
            let mut target = sprite.borrow_mut();
            if let Some(info) = target.as_sprite_mut() {
                info.idx = element
                    .attribute("idx")
                    .and_then(|idx| idx.trim().parse().ok())
                    .unwrap_or(info.idx);
                info.x = number(element, "x", info.x);
                info.y = number(element, "y", info.y);
                info.heading = number(element, "heading", info.heading);
                info.scale = number(element, "scale", info.scale);
                info.rotation_style = element
                    .attribute("rotation")
                    .and_then(|rotation| rotation.trim().parse().ok())
                    .unwrap_or(info.rotation_style);
                info.draggable = flag(element, "draggable");
                info.hidden = flag(element, "hidden");
                info.color = element
                    .attribute("color")
                    .and_then(Color::parse)
                    .unwrap_or(info.color);
                if let Some(pen) = element.attribute("pen") {
                    info.pen = pen.to_string();
                }
            }
        }
        self.load_target_body(element, sprite)
    }

    /// The sections every target has: costumes, current costume, sounds,
    /// definition bodies, variables and scripts.
    fn load_target_body(&mut self, element: &Element, target: &TargetRef) -> Result<(), LoadError> {
        if let Some(list) = self.load_media_list(element.child("costumes"), target)? {
            target.borrow_mut().costumes = list;
        }
        if let Some(wear) = element.child("wear").and_then(|wear| wear.elements().next()) {
            match self.decode_value(wear, target)? {
                Value::Costume(costume) => target.borrow_mut().current_costume = Some(costume),
                other => log::warn!("ignoring non-costume current costume {:?}", other),
            }
        }
        if let Some(list) = self.load_media_list(element.child("sounds"), target)? {
            target.borrow_mut().sounds = list;
        }

        let definitions = target.borrow().blocks.clone();
        self.populate_definitions(element.child("blocks"), &definitions, target)?;

        let variables = required(element, "variables")?;
        let frame = target.borrow().variables.clone();
        self.load_variables(variables, &frame, target)?;

        let scripts = required(element, "scripts")?;
        let mut loaded = Vec::new();
        for script in scripts.children_named("script") {
            loaded.push(self.load_script(script, target)?);
        }
        target.borrow_mut().scripts = loaded;
        Ok(())
    }

    fn load_media_list(
        &mut self,
        section: Option<&Element>,
        owner: &TargetRef,
    ) -> Result<Option<ListRef>, LoadError> {
        let Some(element) = section.and_then(|section| section.elements().next()) else {
            return Ok(None);
        };
        match self.decode_value(element, owner)? {
            Value::List(list) => Ok(Some(list)),
            other => {
                log::warn!("expected a list in <{}>, found {:?}", element.name, other);
                Ok(None)
            }
        }
    }

    fn load_variables(
        &mut self,
        element: &Element,
        frame: &FrameRef,
        owner: &TargetRef,
    ) -> Result<(), LoadError> {
        for variable in element.children_named("variable") {
            let Some(name) = variable.attribute("name") else {
                log::warn!("skipping variable without a name");
                continue;
            };
            let value = match variable.elements().next() {
                Some(value) => self.decode_value(value, owner)?,
                None => Value::zero(),
            };
            frame.borrow_mut().set(name, value);
        }
        Ok(())
    }

    fn load_watchers(&mut self, sprites: &Element) -> Vec<Watcher> {
        let mut watchers = Vec::new();
        for element in sprites.children_named("watcher") {
            let subject = match (element.attribute("var"), element.attribute("s")) {
                (Some(name), _) => WatcherSubject::Variable(name.to_string()),
                (None, Some(selector)) => WatcherSubject::Reporter(selector.to_string()),
                (None, None) => {
                    log::warn!("dropping watcher with neither var nor s");
                    self.report.dropped_watchers.push("watcher without subject".into());
                    continue;
                }
            };
            let scope = element.attribute("scope").map(str::to_string);
            if let Some(scope) = &scope {
                if !self.scopes.contains_key(scope) {
                    log::warn!("dropping watcher for {:?}: no sprite named {:?}", subject, scope);
                    self.report
                        .dropped_watchers
                        .push(format!("{:?} in {}", subject, scope));
                    continue;
                }
            }

            let mut watcher = match subject {
                WatcherSubject::Variable(name) => Watcher::variable(name),
                reporter => Watcher {
                    subject: reporter,
                    ..Watcher::variable("")
                },
            };
            watcher.scope = scope;
            if let Some(style) = element.attribute("style") {
                watcher.style = style.to_string();
            }
            watcher.position = (
                number(element, "x", watcher.position.0),
                number(element, "y", watcher.position.1),
            );
            watcher.color = element
                .attribute("color")
                .and_then(Color::parse)
                .unwrap_or(watcher.color);
            watcher.hidden = flag(element, "hidden");
            watcher.slider = pair(element, "min", "max");
            watcher.extent = pair(element, "extX", "extY");
            watchers.push(watcher);
        }
        watchers
    }
}

/// Load with the built-in operation table, leaving media payloads undecoded.
pub fn load(source: &str) -> Result<Project, LoadError> {
    let operations = OperationTable::builtin();
    let mut decoder = NoDecoder;
    Loader::new(&operations, &mut decoder)
        .load(source)
        .map(|(project, _)| project)
}

fn check_version(root: &Element) -> Result<(), LoadError> {
    let Some(found) = root.attribute("version") else {
        return Ok(());
    };
    match found.trim().parse::<f64>() {
        Ok(version) if !version.is_finite() || version > f64::from(FORMAT_VERSION) => {
            Err(LoadError::UnsupportedVersion {
                found: found.to_string(),
                supported: FORMAT_VERSION,
                span: root.span.clone(),
            })
        }
        _ => Ok(()),
    }
}

fn sprite_elements<'e>(element: &'e Element, out: &mut Vec<&'e Element>) {
    for child in element.elements() {
        if child.name == "sprite" {
            out.push(child);
        }
        sprite_elements(child, out);
    }
}

fn required<'e>(parent: &'e Element, tag: &str) -> Result<&'e Element, LoadError> {
    parent.child(tag).ok_or_else(|| LoadError::MissingElement {
        tag: tag.to_string(),
        parent: parent.name.clone(),
        span: parent.span.clone(),
    })
}

/// Presence flag: set unless absent or literally `false`.
fn flag(element: &Element, name: &str) -> bool {
    element.attribute(name).is_some_and(|value| value != "false")
}

fn number(element: &Element, name: &str, default: f64) -> f64 {
    element
        .attribute(name)
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn pair(element: &Element, first: &str, second: &str) -> Option<(f64, f64)> {
    let first = element.attribute(first)?.trim().parse().ok()?;
    let second = element.attribute(second)?.trim().parse().ok()?;
    Some((first, second))
}
