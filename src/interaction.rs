// ============================================================================
// CANVAS INTERACTION: hit testing and click-and-drag of layers
// ============================================================================

use crate::layer::LayerId;
use crate::store::LayerStore;

/// Topmost visible, unlocked layer whose bounds contain the layer-space point.
pub fn hit_test(store: &LayerStore, x: f32, y: f32) -> Option<LayerId> {
    store
        .layers()
        .iter()
        .rev()
        .filter(|l| l.visible && !l.locked)
        .find(|l| l.bounds().contains(x, y))
        .map(|l| l.id)
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct DragState {
    layer: LayerId,
    /// Pointer position at pointer-down, layer space.
    start: (f32, f32),
    /// Layer position at pointer-down.
    origin: (f32, f32),
}

/// Pointer state machine for the canvas. Coordinates passed in are surface
/// pixels relative to the canvas' top-left corner.
#[derive(Debug, Default)]
pub struct CanvasInteraction {
    drag: Option<DragState>,
}

impl CanvasInteraction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn dragged_layer(&self) -> Option<LayerId> {
        self.drag.map(|d| d.layer)
    }

    /// Select the layer under the pointer and start dragging it. A miss
    /// clears the selection.
    pub fn pointer_down(&mut self, store: &mut LayerStore, sx: f32, sy: f32) {
        let (x, y) = to_layer_space(store, sx, sy);
        let hit = hit_test(store, x, y);
        store.select(hit);
        self.drag = hit.and_then(|id| {
            let layer = store.layer(id)?;
            Some(DragState { layer: id, start: (x, y), origin: (layer.x, layer.y) })
        });
        if let Some(id) = hit {
            log::debug!("Drag start on {} at ({:.1}, {:.1})", id, x, y);
        }
    }

    /// Move the dragged layer to its original position plus the pointer delta.
    pub fn pointer_move(&mut self, store: &mut LayerStore, sx: f32, sy: f32) {
        let Some(drag) = self.drag else {
            return;
        };
        let (x, y) = to_layer_space(store, sx, sy);
        let nx = drag.origin.0 + (x - drag.start.0);
        let ny = drag.origin.1 + (y - drag.start.1);
        if store.layer(drag.layer).is_some_and(|l| (l.x, l.y) != (nx, ny)) {
            store.set_position(drag.layer, nx, ny);
        }
    }

    pub fn pointer_up(&mut self) {
        self.drag = None;
    }

    pub fn pointer_leave(&mut self) {
        self.drag = None;
    }
}

fn to_layer_space(store: &LayerStore, sx: f32, sy: f32) -> (f32, f32) {
    let zoom = store.zoom();
    (sx / zoom, sy / zoom)
}
