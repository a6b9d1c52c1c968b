//! The edit session composition root.
//!
//! [`SketchEditSession`] owns the committed model, the solver box, the
//! viewport and the derived render state (tessellation cache, pick index,
//! glyph layout). `redraw` regenerates the derived state wholesale; there
//! is no incremental invalidation. Mouse and keyboard events are forwarded
//! to the interaction machine with a borrowed context, then followed by a
//! redraw so the caches never lag the model.

use tracing::{debug, trace};

use sketchkit_core::config::{PreferenceStore, RenderConfig};
use sketchkit_core::model::GeometryModel;
use sketchkit_solver::{SketchSolver, SolveOutcome};

use crate::glyph::GlyphLayout;
use crate::interaction::{EditRequest, InteractionContext, InteractionState, InteractionStateMachine, ToolHandler};
use crate::pick::{PickIndex, SketchHit};
use crate::selection::SelectionManager;
use crate::tessellation::RenderCache;
use crate::undo::TransactionSink;
use crate::viewport::Viewport;

/// Restartable single-shot timer for coalescing preference-change bursts.
///
/// Cooperative: the host calls [`notify`](Self::notify) on every change
/// notification and [`poll`](Self::poll) from its idle loop; `poll` returns
/// true exactly once per burst, after the interval has elapsed with no
/// further notifications.
#[derive(Debug, Clone, Copy)]
pub struct RedrawDebounce {
    interval_ms: u64,
    deadline: Option<u64>,
}

impl RedrawDebounce {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            deadline: None,
        }
    }

    /// Starts or restarts the timer.
    pub fn notify(&mut self, now_ms: u64) {
        self.deadline = Some(now_ms + self.interval_ms);
    }

    /// True once the quiet period has elapsed.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        match self.deadline {
            Some(deadline) if now_ms >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }
}

/// One sketch edit session over a geometry model.
pub struct SketchEditSession {
    model: GeometryModel,
    solver: Box<dyn SketchSolver>,
    undo: Box<dyn TransactionSink>,
    store: PreferenceStore,
    config: RenderConfig,
    viewport: Viewport,
    cache: RenderCache,
    pick: PickIndex,
    glyphs: GlyphLayout,
    selection: SelectionManager,
    machine: InteractionStateMachine,
    outcome: SolveOutcome,
    show_virtual_space: bool,
    debounce: RedrawDebounce,
}

impl std::fmt::Debug for SketchEditSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SketchEditSession")
            .field("state", self.machine.state())
            .field("outcome", &self.outcome)
            .field("show_virtual_space", &self.show_virtual_space)
            .finish()
    }
}

impl SketchEditSession {
    pub fn new(
        mut model: GeometryModel,
        mut solver: Box<dyn SketchSolver>,
        undo: Box<dyn TransactionSink>,
        store: PreferenceStore,
    ) -> Self {
        let config = RenderConfig::from_store(&store);
        let viewport = Viewport::default();
        let outcome = solver.solve(&mut model, true);
        let cache = RenderCache::build(&model, &config, outcome.is_invalid());
        let pick = PickIndex::build(&cache, &viewport, &config);
        let glyphs = GlyphLayout::build(&model, &viewport, &config, false);
        Self {
            model,
            solver,
            undo,
            store,
            config,
            viewport,
            cache,
            pick,
            glyphs,
            selection: SelectionManager::new(),
            machine: InteractionStateMachine::new(),
            outcome,
            show_virtual_space: false,
            debounce: RedrawDebounce::new(100),
        }
    }

    pub fn model(&self) -> &GeometryModel {
        &self.model
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Viewport changes require a redraw; mutate through this and the
    /// session rebuilds on the next event or explicit `redraw` call.
    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn cache(&self) -> &RenderCache {
        &self.cache
    }

    pub fn pick_index(&self) -> &PickIndex {
        &self.pick
    }

    pub fn glyphs(&self) -> &GlyphLayout {
        &self.glyphs
    }

    pub fn selection(&self) -> &SelectionManager {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut SelectionManager {
        &mut self.selection
    }

    pub fn outcome(&self) -> &SolveOutcome {
        &self.outcome
    }

    pub fn state(&self) -> &InteractionState {
        self.machine.state()
    }

    pub fn show_virtual_space(&self) -> bool {
        self.show_virtual_space
    }

    pub fn set_show_virtual_space(&mut self, show: bool) {
        if self.show_virtual_space != show {
            self.show_virtual_space = show;
            self.redraw();
        }
    }

    /// Installs a geometry creation tool; it consumes events until it quits
    /// or Escape dismisses it.
    pub fn set_tool_handler(&mut self, handler: Box<dyn ToolHandler>) {
        self.machine.set_tool_handler(handler);
    }

    /// Regenerates tessellation, pick index and glyph layout wholesale.
    ///
    /// During a drag the derived state reads from the temporary model so
    /// the display tracks the cursor while the committed model stays put.
    pub fn redraw(&mut self) {
        let invalid = self.outcome.is_invalid();
        let model = self.machine.drag_model().unwrap_or(&self.model);
        self.cache = RenderCache::build(model, &self.config, invalid);
        self.pick = PickIndex::build(&self.cache, &self.viewport, &self.config);
        self.glyphs = GlyphLayout::build(model, &self.viewport, &self.config, self.show_virtual_space);
        trace!(
            curves = self.cache.curves.len(),
            vertices = self.cache.vertex_slots.len(),
            glyphs = self.glyphs.glyphs.len(),
            invalid,
            "redraw"
        );
    }

    /// Runs a full solve and refreshes the derived state. A conflicting or
    /// over-determined outcome switches the color buffer to the invalid
    /// palette but the session stays editable.
    pub fn solve(&mut self) {
        self.outcome = self.solver.solve(&mut self.model, false);
        if self.outcome.has_diagnostics() {
            debug!(outcome = ?self.outcome, "solve diagnostics");
        }
        self.redraw();
    }

    /// Applies an edit to the committed model inside a named undo
    /// transaction, then re-solves.
    pub fn apply_edit(&mut self, name: &str, edit: impl FnOnce(&mut GeometryModel)) {
        let id = self.undo.open(name);
        edit(&mut self.model);
        self.outcome = self.solver.solve(&mut self.model, false);
        self.undo.commit(id);
        self.redraw();
    }

    /// What is currently under the cursor, resolved through the pick index.
    pub fn hit_test(&self, x: f64, y: f64) -> Option<SketchHit> {
        self.pick.pick(&self.glyphs, x, y)
    }

    pub fn press(&mut self, x: f64, y: f64, time_ms: u64) -> Option<EditRequest> {
        let request = {
            let mut ctx = Self::context(
                &mut self.model,
                self.solver.as_mut(),
                &self.cache,
                &self.pick,
                &self.glyphs,
                &mut self.selection,
                self.undo.as_mut(),
                &self.viewport,
                &self.config,
            );
            self.machine.press(&mut ctx, x, y, time_ms)
        };
        self.redraw();
        request
    }

    pub fn mouse_move(&mut self, x: f64, y: f64) {
        {
            let mut ctx = Self::context(
                &mut self.model,
                self.solver.as_mut(),
                &self.cache,
                &self.pick,
                &self.glyphs,
                &mut self.selection,
                self.undo.as_mut(),
                &self.viewport,
                &self.config,
            );
            self.machine.mouse_move(&mut ctx, x, y);
        }
        self.redraw();
    }

    pub fn release(&mut self, x: f64, y: f64) {
        {
            let mut ctx = Self::context(
                &mut self.model,
                self.solver.as_mut(),
                &self.cache,
                &self.pick,
                &self.glyphs,
                &mut self.selection,
                self.undo.as_mut(),
                &self.viewport,
                &self.config,
            );
            self.machine.release(&mut ctx, x, y);
        }
        // A committed drag changed the model; refresh the solve diagnostics
        // alongside the derived state.
        self.outcome = self.solver.solve(&mut self.model, false);
        self.redraw();
    }

    pub fn escape(&mut self) {
        {
            let mut ctx = Self::context(
                &mut self.model,
                self.solver.as_mut(),
                &self.cache,
                &self.pick,
                &self.glyphs,
                &mut self.selection,
                self.undo.as_mut(),
                &self.viewport,
                &self.config,
            );
            self.machine.escape(&mut ctx);
        }
        self.redraw();
    }

    /// Host preference store access; call [`preferences_changed`] after
    /// mutating so the session re-derives its config.
    ///
    /// [`preferences_changed`]: Self::preferences_changed
    pub fn store_mut(&mut self) -> &mut PreferenceStore {
        &mut self.store
    }

    /// Notification that one or more preferences changed. Re-derivation is
    /// debounced; call [`tick`](Self::tick) from the idle loop.
    pub fn preferences_changed(&mut self, now_ms: u64) {
        self.debounce.notify(now_ms);
    }

    /// Cooperative timer pump. Returns true when a debounced preference
    /// reload actually ran.
    pub fn tick(&mut self, now_ms: u64) -> bool {
        if self.debounce.poll(now_ms) {
            self.config = RenderConfig::from_store(&self.store);
            debug!("render config re-derived after preference change");
            self.redraw();
            true
        } else {
            false
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn context<'a>(
        model: &'a mut GeometryModel,
        solver: &'a mut dyn SketchSolver,
        cache: &'a RenderCache,
        pick: &'a PickIndex,
        glyphs: &'a GlyphLayout,
        selection: &'a mut SelectionManager,
        undo: &'a mut dyn TransactionSink,
        viewport: &'a Viewport,
        config: &'a RenderConfig,
    ) -> InteractionContext<'a> {
        InteractionContext {
            model,
            solver,
            cache,
            pick,
            glyphs,
            selection,
            undo,
            viewport,
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debounce_fires_once_after_quiet_period() {
        let mut d = RedrawDebounce::new(100);
        assert!(!d.poll(0));
        d.notify(10);
        assert!(!d.poll(50));
        // A second notification restarts the window.
        d.notify(90);
        assert!(!d.poll(140));
        assert!(d.poll(190));
        assert!(!d.poll(200));
    }
}
