use std::rc::Rc;

use project::{
    Costume, DecodedMedia, DeferredDecoder, Input, LoadError, LoadReport, Loader, Media, MediaKind,
    MediaState, NoDecoder, OperationTable, Project, Selector, Value, WatcherSubject, load,
};

fn document(stage: &str, sprites: &str) -> String {
    format!(
        r#"<project name="hand" version="1"><stage name="Stage" id="1">{}<sprites>{}</sprites></stage></project>"#,
        stage, sprites
    )
}

const EMPTY: &str = "<variables/><scripts/>";

fn load_with_report(source: &str) -> (Project, LoadReport) {
    let operations = OperationTable::builtin();
    let mut decoder = NoDecoder;
    Loader::new(&operations, &mut decoder)
        .load(source)
        .expect("load failed")
}

#[test]
fn minimal_document_loads() {
    let project = load(&document(EMPTY, "")).unwrap();
    assert_eq!(project.name, "hand");
    assert!(project.sprites().is_empty());
    assert_eq!(project.stage.borrow().name, "Stage");
}

#[test]
fn forward_reference_is_rejected() {
    let source = document(
        r#"<variables><variable name="a"><ref id="5"/></variable></variables><scripts/>"#,
        r#"<sprite name="S" id="5"><variables/><scripts/></sprite>"#,
    );
    match load(&source) {
        Err(LoadError::UnresolvedReference { id, .. }) => assert_eq!(id, "5"),
        other => panic!("expected an unresolved reference, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn unknown_primitive_becomes_a_placeholder() {
    let source = document(
        EMPTY,
        r#"<sprite name="S"><variables/><scripts><script>
            <block s="forward"><l>10</l></block>
            <block s="doTeleport"><l>1</l></block>
            <block s="turn"><l>15</l></block>
        </script></scripts></sprite>"#,
    );
    let (project, report) = load_with_report(&source);

    let sprite = project.sprite_named("S").unwrap();
    let sprite = sprite.borrow();
    let blocks = &sprite.scripts[0].blocks;
    assert_eq!(blocks.len(), 3);
    assert!(matches!(&blocks[0].selector, Selector::Primitive(op) if op.selector == "forward"));
    assert!(matches!(&blocks[1].selector, Selector::Obsolete { spec, .. } if spec == "doTeleport"));
    assert!(matches!(&blocks[1].inputs[0], Input::Value(Value::Text(t)) if t == "1"));
    assert!(matches!(&blocks[2].selector, Selector::Primitive(op) if op.selector == "turn"));

    assert_eq!(report.placeholders.len(), 1);
    assert_eq!(report.placeholders[0].spec, "doTeleport");
    assert_eq!(report.placeholders[0].owner, "S");
}

#[test]
fn placeholders_save_back_unchanged() {
    let source = document(
        EMPTY,
        r#"<sprite name="S"><variables/><scripts><script><block s="doTeleport"><l>1</l></block><custom-block s="gone %s" scope="Nobody"><l>x</l></custom-block></script></scripts></sprite>"#,
    );
    let (project, report) = load_with_report(&source);
    assert_eq!(report.placeholders.len(), 2);

    let saved = project::save(&project);
    assert!(saved.contains(r#"<block s="doTeleport"><l>1</l></block>"#));
    assert!(saved.contains(r#"<custom-block s="gone %s" scope="Nobody"><l>x</l></custom-block>"#));
}

#[test]
fn mutually_recursive_definitions_load() {
    let source = document(
        EMPTY,
        r#"<sprite name="S"><blocks>
            <block-definition s="ping %'n'" type="command" category="other">
                <inputs><input type="%n"></input></inputs>
                <script><custom-block s="pong %n" scope="S"><block var="n"/></custom-block></script>
            </block-definition>
            <block-definition s="pong %'n'" type="command" category="other">
                <inputs><input type="%n"></input></inputs>
                <script><custom-block s="ping %n" scope="S"><block var="n"/></custom-block></script>
            </block-definition>
        </blocks><variables/><scripts/></sprite>"#,
    );
    let (project, report) = load_with_report(&source);
    assert!(report.is_clean(), "{:?}", report);

    let sprite = project.sprite_named("S").unwrap();
    let sprite = sprite.borrow();
    let ping = sprite.blocks[0].clone();
    let pong = sprite.blocks[1].clone();

    let calls = |from: &project::DefinitionRef, to: &project::DefinitionRef| {
        let body = from.borrow().body.clone().expect("body");
        let body = body.borrow();
        let Some(project::Expression::Script(script)) = &body.expression else {
            panic!("expected a script body");
        };
        matches!(&script.blocks[0].selector, Selector::Custom { definition, .. } if Rc::ptr_eq(definition, to))
    };
    assert!(calls(&ping, &pong));
    assert!(calls(&pong, &ping));
}

#[test]
fn scoped_and_global_custom_blocks_resolve() {
    let source = format!(
        r#"<project name="g" version="1">
            <blocks><block-definition s="shout %'word'" type="command" category="looks"><inputs><input type="%s">hi</input></inputs></block-definition></blocks>
            <stage name="Stage"><variables/><scripts><script>
                <custom-block s="dance" scope="S"/>
                <custom-block s="shout %s"><l>hey</l></custom-block>
            </script></scripts>
            <sprites>{}</sprites></stage></project>"#,
        r#"<sprite name="S"><blocks><block-definition s="dance" type="command" category="motion"/></blocks>
            <variables/><scripts/></sprite>"#
    );
    let (project, report) = load_with_report(&source);
    assert!(report.placeholders.is_empty(), "{:?}", report);
    assert_eq!(project.global_blocks.len(), 1);
    assert!(project.global_blocks[0].borrow().is_global);

    let stage = project.stage.borrow();
    let blocks = &stage.scripts[0].blocks;
    match &blocks[0].selector {
        Selector::Custom { scope, definition } => {
            assert_eq!(scope.as_deref(), Some("S"));
            assert_eq!(definition.borrow().spec, "dance");
        }
        other => panic!("unexpected selector {:?}", other),
    }
    assert!(matches!(&blocks[1].selector, Selector::Custom { scope: None, .. }));
}

#[test]
fn unscoped_calls_bind_to_global_definitions() {
    let source = r#"<project name="g" version="1">
        <stage name="Stage"><blocks><block-definition s="foo" type="command" category="other"/></blocks>
            <variables/><scripts><script>
                <custom-block s="foo"/>
                <custom-block s="foo" scope="Stage"/>
            </script></scripts><sprites/></stage>
        <blocks><block-definition s="foo" type="command" category="other"/></blocks>
    </project>"#;
    let (project, report) = load_with_report(source);
    assert!(report.is_clean(), "{:?}", report);

    {
        let stage = project.stage.borrow();
        let blocks = &stage.scripts[0].blocks;
        match &blocks[0].selector {
            Selector::Custom { definition, scope } => {
                assert!(scope.is_none());
                assert!(definition.borrow().is_global);
                assert!(Rc::ptr_eq(definition, &project.global_blocks[0]));
            }
            other => panic!("unexpected selector {:?}", other),
        }
        match &blocks[1].selector {
            Selector::Custom { definition, .. } => {
                assert!(!definition.borrow().is_global);
                assert!(Rc::ptr_eq(definition, &stage.blocks[0]));
            }
            other => panic!("unexpected selector {:?}", other),
        }
    }

    let saved = project::save(&project);
    assert!(saved.contains(r#"<custom-block s="foo"></custom-block><custom-block s="foo" scope="Stage"></custom-block>"#));
    let (reloaded, report) = load_with_report(&saved);
    assert!(report.is_clean(), "{:?}", report);
    let stage = reloaded.stage.borrow();
    assert!(matches!(
        &stage.scripts[0].blocks[0].selector,
        Selector::Custom { definition, .. } if Rc::ptr_eq(definition, &reloaded.global_blocks[0])
    ));
}

#[test]
fn unscoped_call_to_a_local_only_definition_is_a_placeholder() {
    let source = document(
        EMPTY,
        r#"<sprite name="S"><blocks><block-definition s="dance" type="command" category="motion"/></blocks>
            <variables/><scripts><script><custom-block s="dance"/></script></scripts></sprite>"#,
    );
    let (_, report) = load_with_report(&source);
    assert_eq!(report.placeholders.len(), 1);
    assert_eq!(report.placeholders[0].spec, "dance");
}

#[test]
fn missing_trailing_inputs_get_empty_slots() {
    let source = document(
        r#"<variables/><scripts><script><block s="doIfElse"><block s="reportNot"/></block></script></scripts>"#,
        "",
    );
    let project = load(&source).unwrap();
    let stage = project.stage.borrow();
    let block = &stage.scripts[0].blocks[0];
    assert_eq!(block.inputs.len(), 3);
    assert!(matches!(&block.inputs[0], Input::Reporter(_)));
    assert!(matches!(&block.inputs[1], Input::Script(s) if s.blocks.is_empty()));
    assert!(matches!(&block.inputs[2], Input::Script(_)));
}

#[test]
fn variadic_and_autolambda_inputs() {
    let source = document(
        r#"<variables/><scripts><script><block s="doRun"><autolambda><block s="show"/></autolambda><list><l>1</l><block var="v"/></list></block></script></scripts>"#,
        "",
    );
    let project = load(&source).unwrap();
    let stage = project.stage.borrow();
    let block = &stage.scripts[0].blocks[0];
    assert!(matches!(&block.inputs[0], Input::AutoLambda(inner) if matches!(inner.selector, Selector::Primitive(_))));
    match &block.inputs[1] {
        Input::Variadic(items) => {
            assert_eq!(items.len(), 2);
            assert!(matches!(&items[1], Input::Reporter(b) if matches!(&b.selector, Selector::Variable(v) if v == "v")));
        }
        other => panic!("expected a variadic input, got {:?}", other),
    }
}

#[test]
fn value_decoder_handles_every_kind() {
    let source = document(
        EMPTY,
        r#"<sprite name="S" id="2"><variables>
            <variable name="empty"/>
            <variable name="flag"><bool>true</bool></variable>
            <variable name="odd"><mystery>?</mystery></variable>
            <variable name="self"><list id="3"><item><l>a</l></item><item/><item><ref id="3"/></item></list></variable>
            <variable name="nothing"><list linked="linked" id="4"></list></variable>
            <variable name="closure"><context id="7"><inputs><input>x</input></inputs>
                <variables><variable name="v"><l>1</l></variable></variables>
                <block s="reportSum"><block var="x"/><l>1</l></block>
                <receiver><ref id="2"/></receiver>
            </context></variable>
        </variables><scripts/></sprite>"#,
    );
    let project = load(&source).unwrap();
    let sprite = project.sprite_named("S").unwrap();
    let frame = sprite.borrow().variables.clone();
    let frame = frame.borrow();

    assert_eq!(frame.get("empty").and_then(Value::as_text), Some("0"));
    assert!(matches!(frame.get("flag"), Some(Value::Bool(true))));
    assert_eq!(frame.get("odd").and_then(Value::as_text), Some(""));

    let list = frame.get("self").unwrap();
    let items = list.as_list().unwrap().borrow().items();
    assert_eq!(items[0].as_text(), Some("a"));
    assert_eq!(items[1].as_text(), Some("0"));
    assert!(items[2].same_object(list));

    let nothing = frame.get("nothing").unwrap().as_list().unwrap().clone();
    assert!(nothing.borrow().is_empty());
    assert!(!nothing.borrow().is_linked());

    let closure = frame.get("closure").unwrap().as_context().unwrap().clone();
    let closure = closure.borrow();
    assert_eq!(closure.inputs, ["x"]);
    assert_eq!(
        closure.variables.borrow().get("v").and_then(Value::as_text),
        Some("1")
    );
    assert!(matches!(&closure.expression, Some(project::Expression::Block(_))));
    let receiver = closure.receiver.clone().unwrap();
    assert!(Rc::ptr_eq(&receiver, &sprite));
}

#[test]
fn newer_versions_are_refused() {
    let source = r#"<project name="future" version="2"><stage/></project>"#;
    match load(source) {
        Err(LoadError::UnsupportedVersion { found, supported, .. }) => {
            assert_eq!(found, "2");
            assert_eq!(supported, 1);
        }
        other => panic!("expected a version error, got {:?}", other.map(|_| ())),
    }

    let older = document(EMPTY, "").replace(r#"version="1""#, r#"version="0.9""#);
    assert!(load(&older).is_ok());
    let unversioned = document(EMPTY, "").replace(r#" version="1""#, "");
    assert!(load(&unversioned).is_ok());
}

#[test]
fn non_finite_versions_are_refused() {
    for version in ["NaN", "inf"] {
        let source = document(EMPTY, "").replace(r#"version="1""#, &format!(r#"version="{}""#, version));
        match load(&source) {
            Err(LoadError::UnsupportedVersion { found, .. }) => assert_eq!(found, version),
            other => panic!("expected a version error for {}, got {:?}", version, other.map(|_| ())),
        }
    }
}

#[test]
fn structural_errors_name_the_missing_element() {
    match load(r#"<project name="p"/>"#) {
        Err(LoadError::MissingElement { tag, parent, .. }) => {
            assert_eq!((tag.as_str(), parent.as_str()), ("stage", "project"));
        }
        other => panic!("unexpected result {:?}", other.map(|_| ())),
    }

    let no_scripts = document(EMPTY, r#"<sprite name="S"><variables/></sprite>"#);
    match load(&no_scripts) {
        Err(err @ LoadError::MissingElement { .. }) => {
            assert_eq!(err.to_string(), "missing required <scripts> in <sprite>");
        }
        other => panic!("unexpected result {:?}", other.map(|_| ())),
    }

    assert!(matches!(
        load("<stage/>"),
        Err(LoadError::UnexpectedRoot { .. })
    ));
    assert!(matches!(
        load("<project><stage name=x/></project>"),
        Err(LoadError::Parse(_))
    ));
}

#[test]
fn errors_render_as_diagnostics() {
    let source = document(
        r#"<variables><variable name="a"><ref id="9"/></variable></variables><scripts/>"#,
        "",
    );
    let err = load(&source).unwrap_err();
    let diagnostic = err.to_diagnostic(3);
    assert_eq!(diagnostic.labels[0].file_id, 3);
    assert_eq!(&source[err.span()], r#"<ref id="9"/>"#);
    assert!(!diagnostic.notes.is_empty());
}

#[test]
fn watchers_with_unknown_scope_are_dropped() {
    let source = document(
        EMPTY,
        r#"<sprite name="S"><variables/><scripts/></sprite>
           <watcher var="score" style="slider" x="5" y="6" min="0" max="10"/>
           <watcher var="ghost" scope="Nobody"/>
           <watcher s="xPosition" scope="S" hidden="true"/>"#,
    );
    let (project, report) = load_with_report(&source);
    assert_eq!(report.dropped_watchers.len(), 1);

    let stage = project.stage.borrow();
    let watchers = &stage.as_stage().unwrap().watchers;
    assert_eq!(watchers.len(), 2);
    assert_eq!(watchers[0].subject, WatcherSubject::Variable("score".into()));
    assert_eq!(watchers[0].style, "slider");
    assert_eq!(watchers[0].position, (5.0, 6.0));
    assert_eq!(watchers[0].slider, Some((0.0, 10.0)));
    assert_eq!(watchers[1].subject, WatcherSubject::Reporter("xPosition".into()));
    assert_eq!(watchers[1].scope.as_deref(), Some("S"));
    assert!(watchers[1].hidden);
}

#[test]
fn media_decodes_after_the_graph_is_built() {
    let source = document(
        r#"<costumes><list id="2"><item><costume name="bg" center-x="240" center-y="180" image="data:xyz" id="3"/></item></list></costumes>
           <wear><ref id="3"/></wear>
           <sounds><list id="4"><item><sound name="pop" sound="data:abc" id="5"/></item></list></sounds>
           <variables/><scripts/>"#,
        "",
    );
    let operations = OperationTable::builtin();
    let mut decoder = DeferredDecoder::new();
    let (project, _) = Loader::new(&operations, &mut decoder).load(&source).unwrap();
    assert_eq!(decoder.pending(), 2);

    let costume = project.stage.borrow().current_costume.clone().unwrap();
    assert_eq!(costume.borrow().version(), 0);
    assert!(costume.borrow().image.is_pending());
    assert_eq!(costume.borrow().rotation_center, (240.0, 180.0));

    decoder.drain(|media| {
        if media.source == "data:xyz" {
            Ok(DecodedMedia {
                width: 480,
                height: 360,
                duration: None,
            })
        } else {
            Err("unsupported audio".to_string())
        }
    });
    assert_eq!(decoder.pending(), 0);
    assert_eq!(costume.borrow().version(), 1);
    assert!(matches!(costume.borrow().image.state(), MediaState::Ready(d) if d.width == 480));

    let sounds = project.stage.borrow().sounds.clone();
    let Value::Sound(sound) = sounds.borrow().items()[0].clone() else {
        panic!("expected a sound");
    };
    assert!(matches!(sound.borrow().audio.state(), MediaState::Failed(_)));
}

#[test]
fn costume_version_bumps_while_the_costume_is_borrowed() {
    let image = Media::new(MediaKind::Image, "data:xyz");
    let costume = Costume::new("pose", (0.0, 0.0), image.clone());
    {
        let mut held = costume.borrow_mut();
        held.name = "renamed".to_string();
        image.resolve(DecodedMedia {
            width: 1,
            height: 1,
            duration: None,
        });
    }
    assert_eq!(costume.borrow().version(), 1);
}
