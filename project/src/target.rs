use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::definition::DefinitionRef;
use crate::media::{CostumeRef, MediaRef};
use crate::script::Script;
use crate::value::{Color, FrameRef, List, ListRef, VariableFrame};

pub type TargetRef = Rc<RefCell<Target>>;

/// The stage or a sprite.
pub struct Target {
    pub name: String,
    pub kind: TargetKind,
    pub costumes: ListRef,
    pub current_costume: Option<CostumeRef>,
    pub sounds: ListRef,
    /// Local custom block definitions.
    pub blocks: Vec<DefinitionRef>,
    pub variables: FrameRef,
    pub scripts: Vec<Script>,
}

pub enum TargetKind {
    Stage(Stage),
    Sprite(Sprite),
}

#[derive(Debug, Clone)]
pub struct Stage {
    pub width: f64,
    pub height: f64,
    pub tempo: f64,
    pub threadsafe: bool,
    /// Opaque pen trail image payload.
    pub pen_trails: Option<String>,
    pub sprites: Vec<TargetRef>,
    pub watchers: Vec<Watcher>,
}

impl Default for Stage {
    fn default() -> Self {
        Stage {
            width: 480.0,
            height: 360.0,
            tempo: 60.0,
            threadsafe: false,
            pen_trails: None,
            sprites: Vec::new(),
            watchers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sprite {
    /// Position in the sprite corral.
    pub idx: usize,
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub scale: f64,
    pub rotation_style: u8,
    pub draggable: bool,
    pub hidden: bool,
    pub color: Color,
    pub pen: String,
}

impl Default for Sprite {
    fn default() -> Self {
        Sprite {
            idx: 0,
            x: 0.0,
            y: 0.0,
            heading: 90.0,
            scale: 1.0,
            rotation_style: 1,
            draggable: false,
            hidden: false,
            color: Color::rgb(80.0, 80.0, 80.0),
            pen: "tip".to_string(),
        }
    }
}

impl Target {
    fn with_kind(name: impl Into<String>, kind: TargetKind, globals: Option<FrameRef>) -> TargetRef {
        Rc::new(RefCell::new(Target {
            name: name.into(),
            kind,
            costumes: Rc::new(RefCell::new(List::Array(Vec::new()))),
            current_costume: None,
            sounds: Rc::new(RefCell::new(List::Array(Vec::new()))),
            blocks: Vec::new(),
            variables: VariableFrame::shared(globals),
            scripts: Vec::new(),
        }))
    }

    pub fn stage(name: impl Into<String>, globals: Option<FrameRef>) -> TargetRef {
        Target::with_kind(name, TargetKind::Stage(Stage::default()), globals)
    }

    pub fn sprite(name: impl Into<String>, globals: Option<FrameRef>) -> TargetRef {
        Target::with_kind(name, TargetKind::Sprite(Sprite::default()), globals)
    }

    pub fn is_stage(&self) -> bool {
        matches!(self.kind, TargetKind::Stage(_))
    }

    pub fn as_stage(&self) -> Option<&Stage> {
        match &self.kind {
            TargetKind::Stage(stage) => Some(stage),
            TargetKind::Sprite(_) => None,
        }
    }

    pub fn as_stage_mut(&mut self) -> Option<&mut Stage> {
        match &mut self.kind {
            TargetKind::Stage(stage) => Some(stage),
            TargetKind::Sprite(_) => None,
        }
    }

    pub fn as_sprite(&self) -> Option<&Sprite> {
        match &self.kind {
            TargetKind::Sprite(sprite) => Some(sprite),
            TargetKind::Stage(_) => None,
        }
    }

    pub fn as_sprite_mut(&mut self) -> Option<&mut Sprite> {
        match &mut self.kind {
            TargetKind::Sprite(sprite) => Some(sprite),
            TargetKind::Stage(_) => None,
        }
    }

    /// Local definition whose signature is `signature`.
    pub fn definition(&self, signature: &str) -> Option<DefinitionRef> {
        find_definition(&self.blocks, signature)
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_stage() { "stage" } else { "sprite" };
        f.debug_struct("Target")
            .field("name", &self.name)
            .field("kind", &kind)
            .field("blocks", &self.blocks.len())
            .field("scripts", &self.scripts.len())
            .finish()
    }
}

pub(crate) fn find_definition(blocks: &[DefinitionRef], signature: &str) -> Option<DefinitionRef> {
    blocks
        .iter()
        .find(|def| def.borrow().signature() == signature)
        .cloned()
}

/// What a watcher shows.
#[derive(Debug, Clone, PartialEq)]
pub enum WatcherSubject {
    Variable(String),
    /// A reporter selector, e.g. `xPosition`.
    Reporter(String),
}

/// An on-stage readout of a variable or reporter.
#[derive(Debug, Clone, PartialEq)]
pub struct Watcher {
    pub subject: WatcherSubject,
    /// Name of the owning sprite; absent for globals and stage reporters.
    pub scope: Option<String>,
    pub style: String,
    pub position: (f64, f64),
    pub color: Color,
    pub hidden: bool,
    /// Slider range, when shown as a slider.
    pub slider: Option<(f64, f64)>,
    /// Size of a list watcher.
    pub extent: Option<(f64, f64)>,
}

impl Watcher {
    pub fn variable(name: impl Into<String>) -> Self {
        Watcher {
            subject: WatcherSubject::Variable(name.into()),
            scope: None,
            style: "normal".to_string(),
            position: (10.0, 10.0),
            color: Color::rgb(243.0, 118.0, 29.0),
            hidden: false,
            slider: None,
            extent: None,
        }
    }
}

/// A whole project: the stage, its sprites and the global scope.
pub struct Project {
    pub name: String,
    pub notes: String,
    pub thumbnail: Option<MediaRef>,
    pub stage: TargetRef,
    pub global_blocks: Vec<DefinitionRef>,
    pub globals: FrameRef,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        let globals = VariableFrame::shared(None);
        let stage = Target::stage("Stage", Some(globals.clone()));
        Project {
            name: name.into(),
            notes: String::new(),
            thumbnail: None,
            stage,
            global_blocks: Vec::new(),
            globals,
        }
    }

    pub fn sprites(&self) -> Vec<TargetRef> {
        self.stage
            .borrow()
            .as_stage()
            .map(|stage| stage.sprites.clone())
            .unwrap_or_default()
    }

    pub fn sprite_named(&self, name: &str) -> Option<TargetRef> {
        self.sprites()
            .into_iter()
            .find(|sprite| sprite.borrow().name == name)
    }

    /// Create a sprite on the stage, placed after the existing ones.
    pub fn add_sprite(&self, name: impl Into<String>) -> TargetRef {
        let sprite = Target::sprite(name, Some(self.globals.clone()));
        if let Some(stage) = self.stage.borrow_mut().as_stage_mut() {
            if let Some(info) = sprite.borrow_mut().as_sprite_mut() {
                info.idx = stage.sprites.len() + 1;
            }
            stage.sprites.push(sprite.clone());
        }
        sprite
    }

    pub fn global_definition(&self, signature: &str) -> Option<DefinitionRef> {
        find_definition(&self.global_blocks, signature)
    }
}

impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("name", &self.name)
            .field("stage", &self.stage)
            .field("global_blocks", &self.global_blocks.len())
            .finish()
    }
}
