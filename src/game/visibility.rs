use crate::game::beatmap::HitObject;
use crate::game::mods::Mods;

/// Objects are drawn this long before their hit time...
pub const APPROACH_WINDOW_MS: f64 = 1000.0;
/// ...and linger this long after it.
pub const LINGER_WINDOW_MS: f64 = 200.0;

#[derive(Debug, Clone, PartialEq)]
pub enum VisualKind {
    Circle,
    /// Control points already mod-transformed into screen-facing playfield
    /// coordinates.
    Slider { path: Vec<(f32, f32)> },
    /// How far through its span the spinner is, 0..=1.
    Spinner { progress: f32 },
}

/// What the rendering shell needs to draw one object on one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectVisual {
    pub x: f32,
    pub y: f32,
    /// 1.0 when the object just entered the approach window, 0.0 at hit
    /// time; sizes the shrinking approach ring. Always 0.0 for spinners.
    pub approach: f32,
    pub alpha: u8,
    pub kind: VisualKind,
}

/// Classifies one hit object against the current simulated time. Returns
/// `None` when the object is off-screen. Pure and per-object: no
/// cross-object state, NaN inputs degrade to not-visible.
pub fn evaluate(object: &HitObject, current_time: f64, mods: Mods) -> Option<ObjectVisual> {
    let (x, y, object_time) = mods.apply(object.x() as f32, object.y() as f32, object.time() as f64);

    if let HitObject::Spinner { end_time, .. } = object {
        // Spinners hold the whole span, ignoring the approach/linger window.
        let (_, _, end_time) = mods.apply(0.0, 0.0, *end_time as f64);
        let span = end_time - object_time;
        if !(span > 0.0) || !(current_time >= object_time) || !(current_time <= end_time) {
            return None;
        }
        let progress = ((current_time - object_time) / span).clamp(0.0, 1.0) as f32;
        return Some(ObjectVisual {
            x,
            y,
            approach: 0.0,
            alpha: 255,
            kind: VisualKind::Spinner { progress },
        });
    }

    let delta = object_time - current_time;
    if !(delta > -LINGER_WINDOW_MS) || !(delta < APPROACH_WINDOW_MS) {
        return None;
    }

    let approach = (delta / APPROACH_WINDOW_MS).clamp(0.0, 1.0) as f32;
    let alpha = if mods.contains(Mods::HIDDEN) {
        // Fade in toward the hit time, then fade out over the linger window;
        // the object is never shown at full strength while approaching.
        let a = if delta < 0.0 {
            255.0 * (1.0 + delta / LINGER_WINDOW_MS)
        } else {
            255.0 * (1.0 - delta / APPROACH_WINDOW_MS)
        };
        a.round().clamp(0.0, 255.0) as u8
    } else {
        255
    };

    let kind = match object {
        HitObject::Slider { control_points, .. } => VisualKind::Slider {
            path: control_points
                .iter()
                .map(|&(px, py)| {
                    let (tx, ty, _) = mods.apply(px as f32, py as f32, 0.0);
                    (tx, ty)
                })
                .collect(),
        },
        _ => VisualKind::Circle,
    };

    Some(ObjectVisual {
        x,
        y,
        approach,
        alpha,
        kind,
    })
}
