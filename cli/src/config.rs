use std::path::Path;

use serde::Deserialize;

use project::{Operation, OperationTable};

/// Extra primitives read from a TOML file:
///
/// ```toml
/// [[operation]]
/// selector = "doTeleport"
/// kind = "command"
/// category = "motion"
/// spec = "teleport to %s"
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct OperationFile {
    #[serde(default)]
    pub operation: Vec<Operation>,
}

pub fn parse_operations(text: &str) -> Result<OperationFile, String> {
    toml::from_str(text).map_err(|e| format!("TOML parse error: {}", e))
}

/// The built-in table, extended by the file at `path` when one is given.
pub fn operation_table(path: Option<&Path>) -> Result<OperationTable, String> {
    let mut table = OperationTable::builtin();
    let Some(path) = path else {
        return Ok(table);
    };
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
    let file = parse_operations(&text)?;
    log::debug!(
        "adding {} operation(s) from {}",
        file.operation.len(),
        path.display()
    );
    table.extend(file.operation);
    Ok(table)
}
