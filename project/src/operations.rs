use std::collections::HashMap;

use serde::Deserialize;

use crate::definition::{BlockKind, SlotKind};

/// A built-in block: selector name plus how it looks in a palette.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Operation {
    pub selector: String,
    #[serde(default)]
    pub kind: BlockKind,
    #[serde(default = "default_category")]
    pub category: String,
    /// Display spec with `%` slot markers, e.g. `move %n steps`.
    #[serde(default)]
    pub spec: String,
}

fn default_category() -> String {
    "other".to_string()
}

impl Operation {
    pub fn new(selector: &str, kind: BlockKind, category: &str, spec: &str) -> Self {
        Operation {
            selector: selector.to_string(),
            kind,
            category: category.to_string(),
            spec: spec.to_string(),
        }
    }

    /// Slot kinds named by the display spec, in order.
    pub fn slot_kinds(&self) -> Vec<SlotKind> {
        self.spec
            .split_whitespace()
            .filter(|word| word.len() > 1 && word.starts_with('%'))
            .map(SlotKind::from_type)
            .collect()
    }
}

/// Selector → operation lookup used to resolve `block s="..."` elements.
#[derive(Debug, Clone, Default)]
pub struct OperationTable {
    operations: HashMap<String, Operation>,
}

impl OperationTable {
    pub fn new() -> Self {
        OperationTable::default()
    }

    /// The operations every project can use.
    pub fn builtin() -> Self {
        use BlockKind::*;
        let entries: &[(&str, BlockKind, &str, &str)] = &[
            ("receiveGo", Hat, "control", "when green flag clicked"),
            ("receiveKey", Hat, "control", "when %keyHat key pressed"),
            ("receiveInteraction", Hat, "control", "when I am %interaction"),
            ("receiveMessage", Hat, "control", "when I receive %msgHat"),
            ("doBroadcast", Command, "control", "broadcast %msg"),
            ("doWait", Command, "control", "wait %n secs"),
            ("doForever", Command, "control", "forever %c"),
            ("doRepeat", Command, "control", "repeat %n %c"),
            ("doUntil", Command, "control", "repeat until %b %c"),
            ("doIf", Command, "control", "if %b %c"),
            ("doIfElse", Command, "control", "if %b %c else %c"),
            ("doReport", Command, "control", "report %s"),
            ("doStopThis", Command, "control", "stop %stopChoices"),
            ("doRun", Command, "control", "run %cmdRing %inputs"),
            ("evaluate", Reporter, "control", "call %repRing %inputs"),
            ("reifyScript", Reporter, "operators", "%rc %ringparms"),
            ("reifyReporter", Reporter, "operators", "%rr %ringparms"),
            ("reifyPredicate", Reporter, "operators", "%rp %ringparms"),
            ("forward", Command, "motion", "move %n steps"),
            ("turn", Command, "motion", "turn right %n degrees"),
            ("turnLeft", Command, "motion", "turn left %n degrees"),
            ("setHeading", Command, "motion", "point in direction %dir"),
            ("gotoXY", Command, "motion", "go to x: %n y: %n"),
            ("changeXPosition", Command, "motion", "change x by %n"),
            ("changeYPosition", Command, "motion", "change y by %n"),
            ("xPosition", Reporter, "motion", "x position"),
            ("yPosition", Reporter, "motion", "y position"),
            ("direction", Reporter, "motion", "direction"),
            ("doSwitchToCostume", Command, "looks", "switch to costume %cst"),
            ("doWearNextCostume", Command, "looks", "next costume"),
            ("bubble", Command, "looks", "say %s"),
            ("doThink", Command, "looks", "think %s"),
            ("show", Command, "looks", "show"),
            ("hide", Command, "looks", "hide"),
            ("playSound", Command, "sound", "play sound %snd"),
            ("down", Command, "pen", "pen down"),
            ("up", Command, "pen", "pen up"),
            ("clear", Command, "pen", "clear"),
            ("reportTouchingObject", Predicate, "sensing", "touching %col ?"),
            ("reportMouseX", Reporter, "sensing", "mouse x"),
            ("reportMouseY", Reporter, "sensing", "mouse y"),
            ("doAsk", Command, "sensing", "ask %s and wait"),
            ("getLastAnswer", Reporter, "sensing", "answer"),
            ("reportSum", Reporter, "operators", "%n + %n"),
            ("reportDifference", Reporter, "operators", "%n \u{2212} %n"),
            ("reportProduct", Reporter, "operators", "%n \u{00D7} %n"),
            ("reportQuotient", Reporter, "operators", "%n / %n"),
            ("reportLessThan", Predicate, "operators", "%s < %s"),
            ("reportEquals", Predicate, "operators", "%s = %s"),
            ("reportGreaterThan", Predicate, "operators", "%s > %s"),
            ("reportAnd", Predicate, "operators", "%b and %b"),
            ("reportOr", Predicate, "operators", "%b or %b"),
            ("reportNot", Predicate, "operators", "not %b"),
            ("reportJoinWords", Reporter, "operators", "join %words"),
            ("reportRandom", Reporter, "operators", "pick random %n to %n"),
            ("doSetVar", Command, "variables", "set %var to %s"),
            ("doChangeVar", Command, "variables", "change %var by %n"),
            ("doDeclareVariables", Command, "variables", "script variables %scriptVars"),
            ("reportNewList", Reporter, "lists", "list %exp"),
            ("reportCONS", Reporter, "lists", "%s in front of %l"),
            ("reportListItem", Reporter, "lists", "item %idx of %l"),
            ("reportListLength", Reporter, "lists", "length of %l"),
            ("doAddToList", Command, "lists", "add %s to %l"),
        ];

        let mut table = OperationTable::new();
        for &(selector, kind, category, spec) in entries {
            table.insert(Operation::new(selector, kind, category, spec));
        }
        table
    }

    /// Add or replace an operation.
    pub fn insert(&mut self, operation: Operation) {
        self.operations.insert(operation.selector.clone(), operation);
    }

    pub fn extend(&mut self, operations: impl IntoIterator<Item = Operation>) {
        for operation in operations {
            self.insert(operation);
        }
    }

    pub fn get(&self, selector: &str) -> Option<&Operation> {
        self.operations.get(selector)
    }

    pub fn contains(&self, selector: &str) -> bool {
        self.operations.contains_key(selector)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
