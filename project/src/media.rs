use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

pub type MediaRef = Rc<Media>;
pub type CostumeRef = Rc<RefCell<Costume>>;
pub type SoundRef = Rc<RefCell<Sound>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Audio,
}

/// Result of decoding a payload, as reported by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMedia {
    pub width: u32,
    pub height: u32,
    /// Length in seconds for audio.
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaState {
    Pending,
    Ready(DecodedMedia),
    Failed(String),
}

type Listener = Box<dyn FnOnce(&MediaState)>;

/// An opaque media payload whose decoding finishes later.
///
/// The payload text is kept as loaded and written back unchanged; decoding
/// only ever changes `state`.
pub struct Media {
    pub kind: MediaKind,
    pub source: String,
    state: RefCell<MediaState>,
    listeners: RefCell<Vec<Listener>>,
}

impl Media {
    pub fn new(kind: MediaKind, source: impl Into<String>) -> MediaRef {
        Rc::new(Media {
            kind,
            source: source.into(),
            state: RefCell::new(MediaState::Pending),
            listeners: RefCell::new(Vec::new()),
        })
    }

    pub fn state(&self) -> MediaState {
        self.state.borrow().clone()
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.state.borrow(), MediaState::Pending)
    }

    /// Run `listener` once decoding settles, or now if it already has.
    pub fn on_settled(&self, listener: impl FnOnce(&MediaState) + 'static) {
        if self.is_pending() {
            self.listeners.borrow_mut().push(Box::new(listener));
        } else {
            listener(&self.state.borrow());
        }
    }

    pub fn resolve(&self, decoded: DecodedMedia) {
        self.settle(MediaState::Ready(decoded));
    }

    pub fn fail(&self, reason: impl Into<String>) {
        self.settle(MediaState::Failed(reason.into()));
    }

    fn settle(&self, state: MediaState) {
        if !self.is_pending() {
            log::warn!("media payload settled twice, ignoring");
            return;
        }
        *self.state.borrow_mut() = state;
        let listeners = std::mem::take(&mut *self.listeners.borrow_mut());
        let state = self.state();
        for listener in listeners {
            listener(&state);
        }
    }
}

impl fmt::Debug for Media {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Media")
            .field("kind", &self.kind)
            .field("source_len", &self.source.len())
            .field("state", &*self.state.borrow())
            .finish()
    }
}

/// Host-side collaborator that decodes media payloads.
///
/// The loader hands every new payload to `request` and moves on; the graph is
/// usable before any payload settles.
pub trait MediaDecoder {
    fn request(&mut self, media: MediaRef);
}

/// Leaves every payload pending.
#[derive(Debug, Default)]
pub struct NoDecoder;

impl MediaDecoder for NoDecoder {
    fn request(&mut self, _media: MediaRef) {}
}

/// Queues requests until the host drains them.
#[derive(Debug, Default)]
pub struct DeferredDecoder {
    queue: VecDeque<MediaRef>,
}

impl DeferredDecoder {
    pub fn new() -> Self {
        DeferredDecoder::default()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Settle every queued payload with `decode`, in request order.
    pub fn drain(&mut self, mut decode: impl FnMut(&Media) -> Result<DecodedMedia, String>) {
        while let Some(media) = self.queue.pop_front() {
            match decode(&media) {
                Ok(decoded) => media.resolve(decoded),
                Err(reason) => media.fail(reason),
            }
        }
    }
}

impl MediaDecoder for DeferredDecoder {
    fn request(&mut self, media: MediaRef) {
        self.queue.push_back(media);
    }
}

#[derive(Debug)]
pub struct Costume {
    pub name: String,
    pub rotation_center: (f64, f64),
    pub image: MediaRef,
    /// Shared with the image listener.
    version: Rc<Cell<u32>>,
}

impl Costume {
    /// Create a costume and subscribe it to its image's completion.
    pub fn new(name: impl Into<String>, rotation_center: (f64, f64), image: MediaRef) -> CostumeRef {
        let name = name.into();
        let version = Rc::new(Cell::new(0));
        let costume = Rc::new(RefCell::new(Costume {
            name: name.clone(),
            rotation_center,
            image: image.clone(),
            version: version.clone(),
        }));
        let weak: Weak<Cell<u32>> = Rc::downgrade(&version);
        image.on_settled(move |state| {
            let Some(version) = weak.upgrade() else {
                return;
            };
            version.set(version.get() + 1);
            if let MediaState::Failed(reason) = state {
                log::warn!("costume {:?} image failed to decode: {}", name, reason);
            }
        });
        costume
    }

    /// Bumped whenever the image finishes decoding.
    pub fn version(&self) -> u32 {
        self.version.get()
    }
}

#[derive(Debug)]
pub struct Sound {
    pub name: String,
    pub audio: MediaRef,
}

impl Sound {
    pub fn new(name: impl Into<String>, audio: MediaRef) -> SoundRef {
        Rc::new(RefCell::new(Sound {
            name: name.into(),
            audio,
        }))
    }
}
