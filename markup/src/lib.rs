pub mod cursor;
pub mod escape;
pub mod node;
pub mod parser;
pub mod serializer;
pub mod template;

pub use escape::{EscapeMode, escape, unescape};
pub use node::{Element, Node};
pub use parser::{ParseError, Parser, parse};
pub use serializer::{Serializer, ToMarkup, serialize};
pub use template::render;
