pub mod definition;
pub mod encode;
pub mod error;
pub mod loader;
pub mod media;
pub mod operations;
pub mod script;
pub mod target;
pub mod value;

pub use definition::{
    BlockKind, CustomBlockDefinition, DefinitionRef, ParameterDeclaration, SlotKind,
};
pub use encode::save;
pub use error::LoadError;
pub use loader::{LoadReport, Loader, Placeholder, load};
pub use media::{
    Costume, CostumeRef, DecodedMedia, DeferredDecoder, Media, MediaDecoder, MediaKind, MediaRef,
    MediaState, NoDecoder, Sound, SoundRef,
};
pub use operations::{Operation, OperationTable};
pub use script::{Block, Expression, Input, Origin, Script, Selector};
pub use target::{Project, Sprite, Stage, Target, TargetKind, TargetRef, Watcher, WatcherSubject};
pub use value::{Color, Context, ContextRef, FrameRef, List, ListRef, Value, VariableFrame};

/// Highest document format version this engine reads and the version it writes.
pub const FORMAT_VERSION: u32 = 1;
