use markup::{EscapeMode, Serializer, ToMarkup, escape, render};

use crate::FORMAT_VERSION;
use crate::definition::{CustomBlockDefinition, DefinitionRef};
use crate::media::{Costume, Sound};
use crate::script::{Block, Expression, Input, Origin, Script, Selector};
use crate::target::{Project, Target, TargetKind, Watcher, WatcherSubject};
use crate::value::{Color, Context, FrameRef, List, ListRef, Value};

/// Write a project as a document.
///
/// Shared objects are written once and referenced afterwards, in the same
/// order the loader reads them back. The stage comes first, so every target
/// value met later is either already written or a sprite written in place.
pub fn save(project: &Project) -> String {
    let mut serializer = Serializer::new();

    let thumbnail = project
        .thumbnail
        .as_ref()
        .map(|media| render("<thumbnail>$</thumbnail>", &[&media.source], None))
        .unwrap_or_default();
    let stage = serializer.store(&project.stage);
    let blocks = if project.global_blocks.is_empty() {
        String::new()
    } else {
        let owner = project.stage.borrow().name.clone();
        render(
            "<blocks>%</blocks>",
            &[&definitions(&project.global_blocks, Some(owner.as_str()), &mut serializer)],
            None,
        )
    };
    let globals = frame(&project.globals, &mut serializer);

    let out = render(
        r#"<project name="@" version="@"><notes>$</notes>%%%<variables>%</variables></project>"#,
        &[
            &project.name,
            &FORMAT_VERSION,
            &project.notes,
            &thumbnail,
            &stage,
            &blocks,
            &globals,
        ],
        None,
    );
    log::debug!(
        "saved project {:?}: {} shared object(s), {} bytes",
        project.name,
        serializer.stored(),
        out.len()
    );
    out
}

/// Markup for a value in a variable, list item or input position.
pub fn value(value: &Value, serializer: &mut Serializer) -> String {
    match value {
        Value::Text(text) => render("<l>$</l>", &[text], None),
        Value::Bool(b) => render("<bool>$</bool>", &[b], None),
        Value::Color(color) => render("<color>$</color>", &[color], None),
        Value::List(list) => serializer.store(list),
        Value::Context(context) => serializer.store(context),
        Value::Costume(costume) => serializer.store(costume),
        Value::Sound(sound) => serializer.store(sound),
        // a sprite not yet written is written here; `<sprites>` then refers to it
        Value::Target(target) => serializer.store(target),
    }
}

/// Three channels when opaque, four otherwise.
fn color(color: &Color) -> String {
    if color.a == 1.0 {
        color.to_rgb_string()
    } else {
        color.to_string()
    }
}

impl ToMarkup for List {
    fn to_markup(&self, serializer: &mut Serializer) -> String {
        let items: String = self
            .items()
            .iter()
            .map(|item| render("<item>%</item>", &[&value(item, serializer)], None))
            .collect();
        if self.is_linked() {
            serializer.format(r#"<list linked="linked" ~>%</list>"#, &[&items])
        } else {
            serializer.format("<list ~>%</list>", &[&items])
        }
    }
}

impl ToMarkup for Context {
    fn to_markup(&self, serializer: &mut Serializer) -> String {
        let inputs: String = self
            .inputs
            .iter()
            .map(|name| render("<input>$</input>", &[name], None))
            .collect();
        let variables = frame(&self.variables, serializer);
        let owner = self
            .receiver
            .as_ref()
            .map(|receiver| receiver.borrow().name.clone());
        let expression = match &self.expression {
            Some(expression) => self::expression(expression, owner.as_deref(), serializer),
            None => String::new(),
        };
        let receiver = self
            .receiver
            .as_ref()
            .map(|receiver| render("<receiver>%</receiver>", &[&serializer.store(receiver)], None))
            .unwrap_or_default();
        let outer = match &self.outer {
            Some(outer) => serializer.store(outer),
            None => String::new(),
        };
        serializer.format(
            "<context ~><inputs>%</inputs><variables>%</variables>%%%</context>",
            &[&inputs, &variables, &expression, &receiver, &outer],
        )
    }
}

impl ToMarkup for Costume {
    fn to_markup(&self, serializer: &mut Serializer) -> String {
        serializer.format(
            r#"<costume name="@" center-x="@" center-y="@" image="@" ~/>"#,
            &[
                &self.name,
                &self.rotation_center.0,
                &self.rotation_center.1,
                &self.image.source,
            ],
        )
    }
}

impl ToMarkup for Sound {
    fn to_markup(&self, serializer: &mut Serializer) -> String {
        serializer.format(
            r#"<sound name="@" sound="@" ~/>"#,
            &[&self.name, &self.audio.source],
        )
    }
}

impl ToMarkup for Target {
    fn to_markup(&self, serializer: &mut Serializer) -> String {
        let pen_trails = self
            .as_stage()
            .and_then(|stage| stage.pen_trails.as_ref())
            .map(|payload| render("<pentrails>$</pentrails>", &[payload], None))
            .unwrap_or_default();
        let costumes = list_section("costumes", &self.costumes, serializer);
        let wear = self
            .current_costume
            .as_ref()
            .map(|costume| render("<wear>%</wear>", &[&serializer.store(costume)], None))
            .unwrap_or_default();
        let sounds = list_section("sounds", &self.sounds, serializer);
        let owner = Some(self.name.as_str());
        let blocks = if self.blocks.is_empty() {
            String::new()
        } else {
            render(
                "<blocks>%</blocks>",
                &[&definitions(&self.blocks, owner, serializer)],
                None,
            )
        };
        let variables = frame(&self.variables, serializer);
        let scripts: String = self
            .scripts
            .iter()
            .map(|script| self::script(script, owner, serializer))
            .collect();
        let body = render(
            "%%%%%<variables>%</variables><scripts>%</scripts>",
            &[&pen_trails, &costumes, &wear, &sounds, &blocks, &variables, &scripts],
            None,
        );

        match &self.kind {
            TargetKind::Stage(stage) => {
                let sprites: String = stage
                    .sprites
                    .iter()
                    .map(|sprite| serializer.store(sprite))
                    .collect();
                let watchers: String = stage.watchers.iter().map(watcher).collect();
                serializer.format(
                    r#"<stage name="@" width="@" height="@" tempo="@"% ~>%<sprites>%%</sprites></stage>"#,
                    &[
                        &self.name,
                        &stage.width,
                        &stage.height,
                        &stage.tempo,
                        &flag("threadsafe", stage.threadsafe),
                        &body,
                        &sprites,
                        &watchers,
                    ],
                )
            }
            TargetKind::Sprite(sprite) => {
                let flags = format!(
                    "{}{}",
                    flag("draggable", sprite.draggable),
                    flag("hidden", sprite.hidden)
                );
                serializer.format(
                    r#"<sprite name="@" idx="@" x="@" y="@" heading="@" scale="@" rotation="@" color="@"% pen="@" ~>%</sprite>"#,
                    &[
                        &self.name,
                        &sprite.idx,
                        &sprite.x,
                        &sprite.y,
                        &sprite.heading,
                        &sprite.scale,
                        &sprite.rotation_style,
                        &color(&sprite.color),
                        &flags,
                        &sprite.pen,
                        &body,
                    ],
                )
            }
        }
    }
}

fn flag(name: &str, set: bool) -> String {
    if set {
        format!(r#" {}="true""#, name)
    } else {
        String::new()
    }
}

fn list_section(tag: &str, list: &ListRef, serializer: &mut Serializer) -> String {
    render("<@0>%1</@0>", &[&tag, &serializer.store(list)], None)
}

fn frame(frame: &FrameRef, serializer: &mut Serializer) -> String {
    let vars = frame.borrow().vars.clone();
    vars.iter()
        .map(|(name, v)| {
            render(
                r#"<variable name="@">%</variable>"#,
                &[name, &value(v, serializer)],
                None,
            )
        })
        .collect()
}

fn definitions(blocks: &[DefinitionRef], owner: Option<&str>, serializer: &mut Serializer) -> String {
    blocks
        .iter()
        .map(|definition| self::definition(&definition.borrow(), owner, serializer))
        .collect()
}

fn definition(
    definition: &CustomBlockDefinition,
    owner: Option<&str>,
    serializer: &mut Serializer,
) -> String {
    let inputs: String = definition
        .parameters
        .iter()
        .map(|name| {
            let declaration = definition.declaration(name).cloned().unwrap_or_default();
            let options = declaration
                .options
                .as_ref()
                .map(|options| render("<options>$</options>", &[options], None))
                .unwrap_or_default();
            render(
                r#"<input type="@"%>$%</input>"#,
                &[
                    &declaration.slot_type,
                    &flag("readonly", declaration.read_only),
                    &declaration.default,
                    &options,
                ],
                None,
            )
        })
        .collect();
    let body = definition
        .body
        .as_ref()
        .and_then(|body| match &body.borrow().expression {
            Some(Expression::Script(script)) => Some(self::script(script, owner, serializer)),
            Some(Expression::Block(block)) => Some(render(
                "<script>%</script>",
                &[&self::block(block, owner, serializer)],
                None,
            )),
            _ => None,
        })
        .unwrap_or_default();
    render(
        r#"<block-definition s="@" type="@" category="@"%><inputs>%</inputs>%</block-definition>"#,
        &[
            &definition.spec,
            &definition.kind,
            &definition.category,
            &flag("global", definition.is_global),
            &inputs,
            &body,
        ],
        None,
    )
}

fn expression(expression: &Expression, owner: Option<&str>, serializer: &mut Serializer) -> String {
    match expression {
        Expression::Script(script) => self::script(script, owner, serializer),
        Expression::Block(block) => self::block(block, owner, serializer),
        Expression::Slot(text) => render("<l>$</l>", &[text], None),
    }
}

/// `owner` names the target whose code this is. Unscoped calls to its local
/// definitions are written with that scope.
fn script(script: &Script, owner: Option<&str>, serializer: &mut Serializer) -> String {
    let blocks: String = script
        .blocks
        .iter()
        .map(|block| self::block(block, owner, serializer))
        .collect();
    match script.position {
        Some((x, y)) => render(r#"<script x="@" y="@">%</script>"#, &[&x, &y, &blocks], None),
        None => render("<script>%</script>", &[&blocks], None),
    }
}

fn block(block: &Block, owner: Option<&str>, serializer: &mut Serializer) -> String {
    let inputs: String = block
        .inputs
        .iter()
        .map(|input| self::input(input, owner, serializer))
        .collect();
    match &block.selector {
        Selector::Primitive(operation) => primitive(&operation.selector, &inputs),
        Selector::Variable(name) => render(r#"<block var="@"/>"#, &[name], None),
        Selector::Custom { definition, scope } => {
            let definition = definition.borrow();
            let scope = match scope {
                Some(scope) => Some(scope.as_str()),
                None if !definition.is_global => owner,
                None => None,
            };
            custom(&definition.signature(), scope, &inputs)
        }
        Selector::Obsolete { origin, spec } => match origin {
            Origin::Primitive => primitive(spec, &inputs),
            Origin::Custom { scope } => custom(spec, scope.as_deref(), &inputs),
        },
    }
}

fn primitive(selector: &str, inputs: &str) -> String {
    if inputs.is_empty() {
        render(r#"<block s="@"/>"#, &[&selector], None)
    } else {
        render(r#"<block s="@">%</block>"#, &[&selector, &inputs], None)
    }
}

fn custom(signature: &str, scope: Option<&str>, inputs: &str) -> String {
    let scope = scope
        .map(|scope| format!(r#" scope="{}""#, escape(scope, EscapeMode::Attribute)))
        .unwrap_or_default();
    render(
        r#"<custom-block s="@"%>%</custom-block>"#,
        &[&signature, &scope, &inputs],
        None,
    )
}

fn input(input: &Input, owner: Option<&str>, serializer: &mut Serializer) -> String {
    match input {
        Input::Value(v) => value(v, serializer),
        Input::Color(color) => render("<color>$</color>", &[color], None),
        Input::Script(script) => self::script(script, owner, serializer),
        Input::Reporter(block) => self::block(block, owner, serializer),
        Input::AutoLambda(block) => render(
            "<autolambda>%</autolambda>",
            &[&self::block(block, owner, serializer)],
            None,
        ),
        Input::Variadic(inputs) => {
            let items: String = inputs
                .iter()
                .map(|item| self::input(item, owner, serializer))
                .collect();
            render("<list>%</list>", &[&items], None)
        }
    }
}

fn watcher(watcher: &Watcher) -> String {
    let subject = match &watcher.subject {
        WatcherSubject::Variable(name) => render(r#"var="@""#, &[name], None),
        WatcherSubject::Reporter(selector) => render(r#"s="@""#, &[selector], None),
    };
    let mut extra = String::new();
    if let Some(scope) = &watcher.scope {
        extra.push_str(&render(r#" scope="@""#, &[scope], None));
    }
    extra.push_str(&flag("hidden", watcher.hidden));
    if let Some((min, max)) = watcher.slider {
        extra.push_str(&render(r#" min="@" max="@""#, &[&min, &max], None));
    }
    if let Some((w, h)) = watcher.extent {
        extra.push_str(&render(r#" extX="@" extY="@""#, &[&w, &h], None));
    }
    render(
        r#"<watcher % style="@" x="@" y="@" color="@"%/>"#,
        &[
            &subject,
            &watcher.style,
            &watcher.position.0,
            &watcher.position.1,
            &color(&watcher.color),
            &extra,
        ],
        None,
    )
}
