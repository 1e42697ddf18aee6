use std::cell::RefCell;
use std::rc::Rc;

use project::{
    Block, BlockKind, Context, Costume, CustomBlockDefinition, Expression, Input, List, Media,
    MediaKind, OperationTable, ParameterDeclaration, Project, Script, Selector, Value,
    VariableFrame, Watcher, load, save,
};

fn op(selector: &str) -> project::Operation {
    OperationTable::builtin()
        .get(selector)
        .expect("builtin operation")
        .clone()
}

fn sample() -> Project {
    let mut project = Project::new("demo");
    project.notes = "notes with <tags> & \"quotes\" and 'apostrophes'".to_string();

    let shared = Rc::new(RefCell::new(List::Array(vec![
        Value::text("x"),
        Value::Bool(true),
    ])));
    project
        .stage
        .borrow()
        .variables
        .borrow_mut()
        .set("inventory", Value::List(shared.clone()));
    project
        .globals
        .borrow_mut()
        .set("again", Value::List(shared.clone()));
    project.globals.borrow_mut().set("score", Value::zero());

    let sprite = project.add_sprite("Alonzo");
    let costume = Costume::new(
        "pose",
        (10.0, 20.0),
        Media::new(MediaKind::Image, "data:image/png;base64,AAAA"),
    );

    let jump = CustomBlockDefinition::declare("jump %'height'", BlockKind::Command, "motion");
    let jump = jump.shared();
    jump.borrow_mut().declare_parameter(
        "height",
        ParameterDeclaration {
            slot_type: "%n".to_string(),
            default: "10".to_string(),
            ..Default::default()
        },
    );
    let body_frame = VariableFrame::shared(Some(sprite.borrow().variables.clone()));
    let mut body = Context::new(body_frame);
    body.expression = Some(Expression::Script(Script::new(vec![Block::primitive(
        op("changeYPosition"),
        vec![Input::Reporter(Box::new(Block::variable("height")))],
    )])));
    body.inputs = vec!["height".to_string()];
    body.receiver = Some(sprite.clone());
    jump.borrow_mut().body = Some(Rc::new(RefCell::new(body)));

    {
        let mut target = sprite.borrow_mut();
        if let Some(info) = target.as_sprite_mut() {
            info.x = 12.5;
            info.y = -3.0;
            info.heading = 45.0;
            info.hidden = true;
        }
        target.costumes = Rc::new(RefCell::new(List::Array(vec![Value::Costume(
            costume.clone(),
        )])));
        target.current_costume = Some(costume);
        target.blocks.push(jump.clone());
        target
            .variables
            .borrow_mut()
            .set("shared", Value::List(shared.clone()));
        target
            .variables
            .borrow_mut()
            .set("home", Value::Target(project.stage.clone()));
        target.scripts.push(
            Script::new(vec![
                Block::primitive(op("receiveGo"), vec![]),
                Block::primitive(op("forward"), vec![Input::text("10")]),
                Block::primitive(
                    op("doRepeat"),
                    vec![
                        Input::text("3"),
                        Input::Script(Script::new(vec![
                            Block::primitive(op("turn"), vec![Input::text("15")]),
                            Block::new(
                                Selector::Custom {
                                    definition: jump.clone(),
                                    scope: None,
                                },
                                vec![Input::text("5")],
                            ),
                        ])),
                    ],
                ),
            ])
            .at(20.0, 30.0),
        );
    }

    if let Some(stage) = project.stage.borrow_mut().as_stage_mut() {
        stage.watchers.push(Watcher::variable("score"));
    }
    project
}

fn selectors(script: &Script) -> Vec<String> {
    script
        .walk()
        .iter()
        .map(|block| match &block.selector {
            Selector::Primitive(operation) => operation.selector.clone(),
            Selector::Variable(name) => format!("var:{}", name),
            Selector::Custom { definition, .. } => format!("custom:{}", definition.borrow().spec),
            Selector::Obsolete { spec, .. } => format!("obsolete:{}", spec),
        })
        .collect()
}

#[test]
fn load_restores_sprite_state() {
    let original = sample();
    let loaded = load(&save(&original)).expect("load failed");

    assert_eq!(loaded.name, "demo");
    assert_eq!(loaded.notes, original.notes);
    let sprite = loaded.sprite_named("Alonzo").expect("sprite missing");
    let sprite = sprite.borrow();
    let info = sprite.as_sprite().unwrap();
    assert_eq!((info.x, info.y, info.heading), (12.5, -3.0, 45.0));
    assert!(info.hidden);
    assert!(!info.draggable);
    assert_eq!(info.idx, 1);
}

#[test]
fn load_restores_script_shapes() {
    let loaded = load(&save(&sample())).unwrap();
    let sprite = loaded.sprite_named("Alonzo").unwrap();
    let sprite = sprite.borrow();

    assert_eq!(sprite.scripts.len(), 1);
    let script = &sprite.scripts[0];
    assert_eq!(script.position, Some((20.0, 30.0)));
    assert_eq!(
        selectors(script),
        [
            "receiveGo",
            "forward",
            "doRepeat",
            "turn",
            "custom:jump %'height'"
        ]
    );

    let repeat = &script.blocks[2];
    assert!(matches!(&repeat.inputs[0], Input::Value(Value::Text(t)) if t == "3"));
    assert!(matches!(&repeat.inputs[1], Input::Script(inner) if inner.blocks.len() == 2));
}

#[test]
fn custom_block_calls_point_at_the_loaded_definition() {
    let loaded = load(&save(&sample())).unwrap();
    let sprite = loaded.sprite_named("Alonzo").unwrap();
    let sprite = sprite.borrow();

    let jump = sprite.blocks[0].clone();
    assert_eq!(jump.borrow().signature(), "jump %n");
    assert_eq!(jump.borrow().declaration("height").unwrap().default, "10");

    let Input::Script(inner) = &sprite.scripts[0].blocks[2].inputs[1] else {
        panic!("expected a C-slot");
    };
    match &inner.blocks[1].selector {
        Selector::Custom { definition, .. } => assert!(Rc::ptr_eq(definition, &jump)),
        other => panic!("expected a custom block call, got {:?}", other),
    }

    let body = jump.borrow().body.clone().expect("body missing");
    let body = body.borrow();
    assert_eq!(body.inputs, ["height"]);
    let receiver = body.receiver.clone().expect("receiver missing");
    assert_eq!(receiver.borrow().name, "Alonzo");
    let parent = body.variables.borrow().parent.clone().expect("frame parent");
    assert!(Rc::ptr_eq(&parent, &sprite.variables));
}

#[test]
fn shared_objects_keep_their_identity() {
    let loaded = load(&save(&sample())).unwrap();
    let stage_list = loaded
        .stage
        .borrow()
        .variables
        .borrow()
        .get("inventory")
        .cloned()
        .unwrap();
    let global_list = loaded.globals.borrow().get("again").cloned().unwrap();
    let sprite = loaded.sprite_named("Alonzo").unwrap();
    let sprite_list = sprite.borrow().variables.borrow().get("shared").cloned().unwrap();

    assert!(stage_list.same_object(&global_list));
    assert!(stage_list.same_object(&sprite_list));
    assert_eq!(stage_list.as_list().unwrap().borrow().len(), 2);

    let sprite = sprite.borrow();
    let worn = sprite.current_costume.clone().expect("current costume");
    let first = sprite.costumes.borrow().items()[0].clone();
    assert!(first.same_object(&Value::Costume(worn)));

    let home = sprite.variables.borrow().get("home").cloned().unwrap();
    assert!(home.same_object(&Value::Target(loaded.stage.clone())));
}

#[test]
fn shared_list_is_encoded_once() {
    let text = save(&sample());
    let tree = markup::parse(&text).unwrap();

    assert_eq!(text.matches("<l>x</l>").count(), 1);

    let stage = tree.child("stage").unwrap();
    let full = stage
        .child("variables")
        .and_then(|v| v.child("variable"))
        .and_then(|v| v.child("list"))
        .expect("first occurrence is the full list");
    let id = full.attribute("id").expect("list id");
    let reference = format!(r#"<ref id="{}"/>"#, id);
    // sprite variable and global variable
    assert_eq!(text.matches(&reference).count(), 2);
}

#[test]
fn globals_and_watchers_round_trip() {
    let loaded = load(&save(&sample())).unwrap();
    assert_eq!(
        loaded.globals.borrow().get("score").and_then(Value::as_text),
        Some("0")
    );
    let stage = loaded.stage.borrow();
    let watchers = &stage.as_stage().unwrap().watchers;
    assert_eq!(watchers, &vec![Watcher::variable("score")]);
}

#[test]
fn save_is_idempotent_through_load() {
    let first = save(&sample());
    let second = save(&load(&first).unwrap());
    assert_eq!(first, second);
    assert!(first.starts_with(r#"<project name="demo" version="1">"#));
}

#[test]
fn cyclic_contexts_serialize_and_load() {
    let project = Project::new("cycles");
    let a = Rc::new(RefCell::new(Context::new(VariableFrame::shared(None))));
    let b = Rc::new(RefCell::new(Context::new(VariableFrame::shared(None))));
    a.borrow_mut().inputs = vec!["a".to_string()];
    a.borrow_mut().expression = Some(Expression::Slot("first".to_string()));
    b.borrow_mut().outer = Some(a.clone());
    a.borrow_mut().outer = Some(b.clone());
    project.globals.borrow_mut().set("loop", Value::Context(a.clone()));

    let text = save(&project);
    assert_eq!(text.matches("<context").count(), 2);

    let loaded = load(&text).expect("cyclic document must load");
    let restored = loaded.globals.borrow().get("loop").cloned().unwrap();
    let restored = restored.as_context().unwrap().clone();
    let outer = restored.borrow().outer.clone().unwrap();
    let back = outer.borrow().outer.clone().unwrap();
    assert!(Rc::ptr_eq(&back, &restored));
    assert_eq!(restored.borrow().inputs, ["a"]);
    assert!(matches!(
        &restored.borrow().expression,
        Some(Expression::Slot(s)) if s == "first"
    ));

    // break both cycles so the test does not leak
    a.borrow_mut().outer = None;
    restored.borrow_mut().outer = None;
}

#[test]
fn linked_lists_and_colors_round_trip() {
    let project = Project::new("values");
    let linked = Rc::new(RefCell::new(List::linked(vec![
        Value::text("1"),
        Value::text("2"),
        Value::text("3"),
    ])));
    project
        .globals
        .borrow_mut()
        .set("chain", Value::List(linked));
    project
        .globals
        .borrow_mut()
        .set("tint", Value::Color(project::Color { r: 1.0, g: 2.0, b: 3.0, a: 0.5 }));

    let text = save(&project);
    assert!(text.contains(r#"linked="linked""#));
    let loaded = load(&text).unwrap();
    let globals = loaded.globals.borrow();

    let chain = globals.get("chain").unwrap().as_list().unwrap().clone();
    let chain = chain.borrow();
    assert!(chain.is_linked());
    let items: Vec<String> = chain
        .items()
        .iter()
        .filter_map(|v| v.as_text().map(str::to_string))
        .collect();
    assert_eq!(items, ["1", "2", "3"]);

    match globals.get("tint") {
        Some(Value::Color(color)) => assert_eq!(color.a, 0.5),
        other => panic!("expected a color, got {:?}", other),
    }
}

#[test]
fn sprite_values_held_by_the_stage_survive_a_round_trip() {
    let project = Project::new("targets");
    let sprite = project.add_sprite("Alonzo");
    let stage_vars = project.stage.borrow().variables.clone();
    stage_vars.borrow_mut().set("who", Value::Target(sprite.clone()));
    let crowd = Rc::new(RefCell::new(List::Array(vec![Value::Target(sprite.clone())])));
    stage_vars.borrow_mut().set("crowd", Value::List(crowd));
    let mut closure = Context::new(VariableFrame::shared(None));
    closure.receiver = Some(sprite.clone());
    stage_vars
        .borrow_mut()
        .set("action", Value::Context(Rc::new(RefCell::new(closure))));

    let text = save(&project);
    let tree = markup::parse(&text).unwrap();
    let entries: Vec<&str> = tree
        .child("stage")
        .and_then(|stage| stage.child("sprites"))
        .map(|sprites| sprites.elements().map(|e| e.name.as_str()).collect())
        .unwrap();
    assert_eq!(entries, ["ref"]);
    assert_eq!(text.matches("<sprite ").count(), 1);

    let loaded = load(&text).expect("load failed");
    let sprites = loaded.sprites();
    assert_eq!(sprites.len(), 1);
    let alonzo = Value::Target(sprites[0].clone());
    assert_eq!(sprites[0].borrow().as_sprite().unwrap().idx, 1);

    let frame = loaded.stage.borrow().variables.clone();
    let frame = frame.borrow();
    assert!(frame.get("who").unwrap().same_object(&alonzo));
    let crowd = frame.get("crowd").unwrap().as_list().unwrap().borrow().items();
    assert!(crowd[0].same_object(&alonzo));
    let action = frame.get("action").unwrap().as_context().unwrap().clone();
    let receiver = action.borrow().receiver.clone().expect("receiver");
    assert!(Rc::ptr_eq(&receiver, &sprites[0]));

    assert_eq!(save(&loaded), text);
}

#[test]
fn local_calls_are_saved_with_their_owner_scope() {
    let text = save(&sample());
    assert!(text.contains(r#"<custom-block s="jump %n" scope="Alonzo">"#));
}

#[test]
fn translucent_colors_keep_their_alpha() {
    let project = Project::new("tints");
    let sprite = project.add_sprite("Ghost");
    if let Some(info) = sprite.borrow_mut().as_sprite_mut() {
        info.color = project::Color { r: 10.0, g: 20.0, b: 30.0, a: 0.5 };
    }
    let mut watcher = Watcher::variable("score");
    watcher.color = project::Color { r: 1.0, g: 2.0, b: 3.0, a: 0.25 };
    if let Some(stage) = project.stage.borrow_mut().as_stage_mut() {
        stage.watchers.push(watcher);
    }

    let text = save(&project);
    assert!(text.contains(r#"color="10,20,30,0.5""#));
    let loaded = load(&text).unwrap();
    let ghost = loaded.sprite_named("Ghost").unwrap();
    assert_eq!(ghost.borrow().as_sprite().unwrap().color.a, 0.5);
    let stage = loaded.stage.borrow();
    assert_eq!(stage.as_stage().unwrap().watchers[0].color.a, 0.25);
}
