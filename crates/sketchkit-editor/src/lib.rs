//! # SketchKit Editor
//!
//! Interactive 2D sketch editing on top of the SketchKit geometry model
//! and solver facade: tessellation and render caches, screen-space picking,
//! refcounted selection, constraint glyph layout, and the drag/select state
//! machine, composed by [`SketchEditSession`].

pub mod glyph;
pub mod interaction;
pub mod pick;
pub mod plane;
pub mod rubberband;
pub mod selection;
pub mod session;
pub mod spatial;
pub mod tessellation;
pub mod undo;
pub mod viewport;

pub use glyph::{Glyph, GlyphLabel, GlyphLayout, SubIconBox, ICON_SIZE};
pub use interaction::{
    EditRequest, InteractionState, InteractionStateMachine, ToolHandler,
};
pub use pick::{AxisKind, PickIndex, SketchHit};
pub use plane::SketchPlane;
pub use rubberband::{BoxSelection, RubberBand};
pub use selection::{CrossTarget, SelectionEvent, SelectionManager, SelectionObserver};
pub use session::{RedrawDebounce, SketchEditSession};
pub use spatial::{Bounds, SpatialIndex};
pub use tessellation::{ColorClass, CurveStrip, RenderCache, VertexSlot};
pub use undo::{RecordingSink, TransactionId, TransactionOutcome, TransactionSink};
pub use viewport::Viewport;
